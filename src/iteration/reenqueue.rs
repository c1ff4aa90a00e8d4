use super::record::JobRecord;
use crate::error::{IterationError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Hands an interrupted job back to the host queue.
#[async_trait]
pub trait Reenqueue: Send + Sync {
    /// Schedule `record` to run again after `wait` (immediately when `None`).
    async fn reenqueue(&self, record: &JobRecord, wait: Option<Duration>) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReenqueueRequest {
    pub record: JobRecord,
    pub wait: Option<Duration>,
    pub requested_at: DateTime<Utc>,
}

impl ReenqueueRequest {
    /// Earliest time the job should run again.
    pub fn run_at(&self) -> DateTime<Utc> {
        match self.wait.and_then(|w| chrono::Duration::from_std(w).ok()) {
            Some(wait) => self.requested_at + wait,
            None => self.requested_at,
        }
    }
}

/// Sends re-enqueue requests over an unbounded tokio channel to whatever owns
/// the queue.
#[derive(Debug, Clone)]
pub struct ChannelReenqueuer {
    sender: mpsc::UnboundedSender<ReenqueueRequest>,
}

impl ChannelReenqueuer {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ReenqueueRequest>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl Reenqueue for ChannelReenqueuer {
    async fn reenqueue(&self, record: &JobRecord, wait: Option<Duration>) -> Result<()> {
        debug!(job_id = %record.job_id, wait_secs = ?wait.map(|w| w.as_secs_f64()), "Sending re-enqueue request");
        self.sender
            .send(ReenqueueRequest {
                record: record.clone(),
                wait,
                requested_at: Utc::now(),
            })
            .map_err(|_| IterationError::Reenqueue("re-enqueue channel is closed".to_string()))
    }
}

use super::{BoxProducer, Produced, Producer};
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

/// External health check consulted before each item, e.g. database replication lag.
pub type ThrottleCondition = Box<dyn Fn() -> bool + Send + Sync>;

/// Forwards items from `inner` while the throttle condition is false.
///
/// When the condition holds, the pending item is not pulled: the attempt ends
/// with [`Produced::Throttled`] carrying `backoff`, and the wrapper stays
/// throttled. It keeps no cursor of its own, so the job resumes from the last
/// item that was actually processed.
pub struct ThrottleProducer<T> {
    inner: BoxProducer<T>,
    condition: ThrottleCondition,
    backoff: Duration,
    throttled: bool,
}

impl<T> ThrottleProducer<T> {
    pub fn new<F>(inner: BoxProducer<T>, backoff: Duration, condition: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self {
            inner,
            condition: Box::new(condition),
            backoff,
            throttled: false,
        }
    }
}

impl<T> std::fmt::Debug for ThrottleProducer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThrottleProducer")
            .field("backoff", &self.backoff)
            .field("throttled", &self.throttled)
            .finish()
    }
}

#[async_trait]
impl<T: Send + 'static> Producer for ThrottleProducer<T> {
    type Item = T;

    async fn next(&mut self) -> Result<Produced<T>> {
        if self.throttled || (self.condition)() {
            if !self.throttled {
                info!(backoff_secs = self.backoff.as_secs_f64(), "⏸️ Throttle condition met, pausing iteration");
            }
            self.throttled = true;
            return Ok(Produced::Throttled {
                backoff: self.backoff,
            });
        }
        self.inner.next().await
    }

    async fn size(&self) -> Result<Option<u64>> {
        self.inner.size().await
    }
}

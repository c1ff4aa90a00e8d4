//! The iteration driver.
//!
//! One call to [`IterationDriver::run`] is one execution attempt of a job:
//! build the producer from the persisted cursor, process items one at a time,
//! checkpoint after each, and stop at the first of exhaustion, abort, throttle,
//! retry request, exhausted runtime budget or shutdown request. Interrupted
//! jobs are handed back to the host queue with their cursor and counters
//! updated in the [`JobRecord`].

use super::job::{IterationJob, IterationStep};
use super::record::JobRecord;
use super::reenqueue::Reenqueue;
use crate::config::{CursorValidation, IterationConfig, ResolvedSettings};
use crate::cursor::CursorValue;
use crate::error::{IterationError, Result, RunError};
use crate::interruption::{InterruptionProbe, InterruptionRegistry};
use crate::logging::{log_iteration_event, IterationEvent};
use crate::producer::{Produced, ProducerBuilder};
use crate::state_machine::{DriverEvent, DriverState, IterationStateMachine};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{instrument, warn};

/// Why an attempt stopped before the producer was exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptReason {
    MaxRuntime,
    Shutdown,
    Throttled,
    Retry,
}

/// Result of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// The job built no producer.
    Skipped,
    /// Every item was processed and the completion hook ran.
    Completed,
    /// The job was handed back to the queue to resume after `delay`.
    Reenqueued {
        delay: Option<Duration>,
        reason: InterruptReason,
    },
    /// Per-item work aborted; `completed` tells whether the completion hook ran.
    Aborted { completed: bool },
}

pub struct IterationDriver {
    config: IterationConfig,
    interruptions: Arc<InterruptionRegistry>,
    reenqueuer: Arc<dyn Reenqueue>,
}

impl std::fmt::Debug for IterationDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IterationDriver")
            .field("config", &self.config)
            .field("interruptions", &self.interruptions)
            .finish()
    }
}

impl IterationDriver {
    pub fn new(config: IterationConfig, reenqueuer: Arc<dyn Reenqueue>) -> Self {
        Self {
            config,
            interruptions: Arc::new(InterruptionRegistry::new()),
            reenqueuer,
        }
    }

    pub fn with_interruptions(mut self, registry: Arc<InterruptionRegistry>) -> Self {
        self.interruptions = registry;
        self
    }

    pub fn config(&self) -> &IterationConfig {
        &self.config
    }

    pub fn interruptions(&self) -> &Arc<InterruptionRegistry> {
        &self.interruptions
    }

    /// Producer builder carrying this driver's configured batch size.
    pub fn producers(&self) -> ProducerBuilder {
        ProducerBuilder::from_config(&self.config)
    }

    /// Run one attempt of `job`, updating `record` in place.
    ///
    /// Errors from the job's own hooks and per-item work are returned
    /// unchanged as [`RunError::Job`], after the attempt's running time has
    /// been added to the record. The cursor then reflects only items whose
    /// work succeeded. `on_shutdown` runs only for attempts that iterated
    /// without error.
    #[instrument(skip_all, fields(job_class = %record.job_class, job_id = %record.job_id))]
    pub async fn run<J: IterationJob>(
        &self,
        job: &J,
        record: &mut JobRecord,
    ) -> std::result::Result<IterationOutcome, RunError<J::Error>> {
        let settings = self.config.resolve(job.job_class(), &job.settings())?;
        let args: J::Arguments = record.arguments()?;
        let adapter = record
            .queue_adapter
            .clone()
            .unwrap_or_else(|| self.config.queue_adapter.clone());
        let probe = self.interruptions.resolve(&adapter);

        record.executions += 1;
        let started = Instant::now();
        let mut machine = IterationStateMachine::new();

        let iterated = self
            .iterate(job, &args, record, &settings, probe.as_ref(), started, &mut machine)
            .await;
        record.iteration.add_elapsed(started.elapsed());

        let reason = iterated?;
        if machine.current_state().reached_running() {
            job.on_shutdown(&args).await.map_err(RunError::Job)?;
        }

        self.finish(job, &args, record, &settings, &mut machine, reason)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn iterate<J: IterationJob>(
        &self,
        job: &J,
        args: &J::Arguments,
        record: &mut JobRecord,
        settings: &ResolvedSettings,
        probe: &dyn InterruptionProbe,
        started: Instant,
        machine: &mut IterationStateMachine,
    ) -> std::result::Result<Option<InterruptReason>, RunError<J::Error>> {
        machine.transition(DriverEvent::Build)?;
        log_iteration_event(IterationEvent::BuildProducer, record);

        let cursor = record.iteration.cursor()?;
        let Some(mut producer) = job
            .build_producer(args, cursor)
            .await
            .map_err(RunError::Job)?
        else {
            machine.transition(DriverEvent::BuiltNothing)?;
            log_iteration_event(IterationEvent::NilProducer, record);
            return Ok(None);
        };
        machine.transition(DriverEvent::Built)?;

        if record.executions == 1 && record.iteration.times_interrupted == 0 {
            job.on_start(args).await.map_err(RunError::Job)?;
        } else {
            log_iteration_event(IterationEvent::Resumed, record);
        }

        let mut found = false;
        loop {
            let (value, cursor) = match producer.next().await? {
                Produced::Item { value, cursor } => (value, cursor),
                Produced::Exhausted => {
                    if !found {
                        log_iteration_event(IterationEvent::NotFound, record);
                    }
                    machine.transition(DriverEvent::Exhaust)?;
                    return Ok(None);
                }
                Produced::Throttled { backoff } => {
                    log_iteration_event(IterationEvent::Throttled, record);
                    machine.transition(DriverEvent::Throttle(backoff))?;
                    return Ok(Some(InterruptReason::Throttled));
                }
            };
            found = true;

            match job.each_iteration(value, args).await.map_err(RunError::Job)? {
                IterationStep::Continue => {
                    checkpoint(record, &cursor, settings.cursor_validation)?;
                    log_iteration_event(IterationEvent::EachIteration, record);
                }
                IterationStep::Abort { skip_complete } => {
                    machine.transition(DriverEvent::Abort { skip_complete })?;
                    return Ok(None);
                }
                IterationStep::Retry { backoff } => {
                    machine.transition(DriverEvent::Retry(backoff))?;
                    return Ok(Some(InterruptReason::Retry));
                }
            }

            if let Some(reason) = interruption_reason(started, settings.max_runtime, probe) {
                machine.transition(DriverEvent::Interrupt)?;
                return Ok(Some(reason));
            }
        }
    }

    async fn finish<J: IterationJob>(
        &self,
        job: &J,
        args: &J::Arguments,
        record: &mut JobRecord,
        settings: &ResolvedSettings,
        machine: &mut IterationStateMachine,
        reason: Option<InterruptReason>,
    ) -> std::result::Result<IterationOutcome, RunError<J::Error>> {
        match (machine.current_state(), reason) {
            (DriverState::Skipped, _) => Ok(IterationOutcome::Skipped),
            (DriverState::Completing, _) => {
                job.on_complete(args).await.map_err(RunError::Job)?;
                machine.transition(DriverEvent::Complete)?;
                log_iteration_event(IterationEvent::Completed, record);
                Ok(IterationOutcome::Completed)
            }
            (DriverState::Aborting, _) => {
                let completed = !machine.skip_complete();
                if completed {
                    job.on_complete(args).await.map_err(RunError::Job)?;
                }
                machine.transition(DriverEvent::Stop)?;
                log_iteration_event(IterationEvent::Aborted, record);
                Ok(IterationOutcome::Aborted { completed })
            }
            (DriverState::Interrupting, Some(reason)) => {
                // The record only shows the interruption once it is scheduled.
                let mut interrupted = record.clone();
                interrupted.iteration.times_interrupted += 1;
                // Interruptions do not count against the host's retry budget.
                if interrupted.executions > 1 {
                    interrupted.executions -= 1;
                }
                interrupted.last_interrupted_at = Some(Utc::now());

                let delay = machine
                    .requested_backoff()
                    .or(settings.default_retry_backoff);
                self.reenqueuer.reenqueue(&interrupted, delay).await?;
                *record = interrupted;
                log_iteration_event(IterationEvent::Interrupted, record);
                machine.transition(DriverEvent::Reenqueue)?;
                Ok(IterationOutcome::Reenqueued { delay, reason })
            }
            (state, _) => Err(IterationError::InvalidTransition {
                from: state.to_string(),
                event: "finish".to_string(),
            }
            .into()),
        }
    }
}

/// Validate `cursor` and store it as the job's checkpoint.
fn checkpoint(record: &mut JobRecord, cursor: &CursorValue, validation: CursorValidation) -> Result<()> {
    match cursor.to_json() {
        Ok(raw) => record.iteration.store_cursor(raw, cursor),
        Err(err) => match validation {
            CursorValidation::Strict => Err(err),
            CursorValidation::Warn => {
                warn!(
                    job_class = %record.job_class,
                    cursor = %cursor,
                    error = %err,
                    "⚠️ Cursor cannot round-trip through JSON; persisting its lossy form"
                );
                let raw = cursor.to_json_lossy();
                let lossy = CursorValue::from(raw.clone());
                record.iteration.store_cursor(raw, &lossy)
            }
        },
    }
}

fn interruption_reason(
    started: Instant,
    max_runtime: Option<Duration>,
    probe: &dyn InterruptionProbe,
) -> Option<InterruptReason> {
    if max_runtime.is_some_and(|max| started.elapsed() > max) {
        return Some(InterruptReason::MaxRuntime);
    }
    probe
        .should_interrupt()
        .then_some(InterruptReason::Shutdown)
}

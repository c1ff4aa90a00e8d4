//! Driver lifecycle: resumption, interruption, throttling, abort and hooks.

use async_trait::async_trait;
use job_iteration::config::{CursorValidation, IterationConfig, JobSettings};
use job_iteration::cursor::CursorValue;
use job_iteration::error::RunError;
use job_iteration::interruption::InterruptionRegistry;
use job_iteration::iteration::{
    ChannelReenqueuer, InterruptReason, IterationDriver, IterationJob, IterationOutcome,
    IterationStep, JobRecord,
};
use job_iteration::producer::{BatchRelation, BoxProducer, Produced, Producer, ProducerBuilder};
use job_iteration::source::{MemoryRowSource, Row, RowSource, SharedSource};
use job_iteration::test_utils::{products_source, InterruptEvery, RecordingReenqueuer, StopAfter};
use job_iteration::IterationError;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ShopArgs {
    shop_id: i64,
}

/// Iterates a fixed list and records everything the driver asks of it.
#[derive(Default)]
struct ArrayJob {
    values: Vec<i64>,
    skip: bool,
    abort_at: Option<(i64, bool)>,
    retry_at: Option<(i64, Duration)>,
    fail_at: Option<i64>,
    throttle_backoff: Option<Duration>,
    item_delay: Option<Duration>,
    settings: JobSettings,
    seen: Mutex<Vec<i64>>,
    hooks: Mutex<Vec<&'static str>>,
}

impl ArrayJob {
    fn new(values: Vec<i64>) -> Self {
        Self {
            values,
            ..Self::default()
        }
    }

    fn seen(&self) -> Vec<i64> {
        self.seen.lock().clone()
    }

    fn hooks(&self) -> Vec<&'static str> {
        self.hooks.lock().clone()
    }
}

#[async_trait]
impl IterationJob for ArrayJob {
    type Arguments = ShopArgs;
    type Item = i64;
    type Error = anyhow::Error;

    fn settings(&self) -> JobSettings {
        self.settings
    }

    async fn build_producer(
        &self,
        args: &ShopArgs,
        cursor: Option<CursorValue>,
    ) -> anyhow::Result<Option<BoxProducer<i64>>> {
        assert_eq!(args.shop_id, 1);
        if self.skip {
            return Ok(None);
        }
        let builder = ProducerBuilder::default();
        let producer = builder.array(self.values.clone(), cursor)?;
        Ok(Some(match self.throttle_backoff {
            Some(backoff) => builder.throttle(producer, backoff, || true),
            None => producer,
        }))
    }

    async fn each_iteration(&self, item: i64, _args: &ShopArgs) -> anyhow::Result<IterationStep> {
        self.seen.lock().push(item);
        if let Some(delay) = self.item_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_at == Some(item) {
            anyhow::bail!("item {item} failed");
        }
        if let Some((at, skip_complete)) = self.abort_at {
            if at == item {
                return Ok(IterationStep::Abort { skip_complete });
            }
        }
        if let Some((at, backoff)) = self.retry_at {
            if at == item {
                return Ok(IterationStep::retry_in(backoff));
            }
        }
        Ok(IterationStep::Continue)
    }

    async fn on_start(&self, _args: &ShopArgs) -> anyhow::Result<()> {
        self.hooks.lock().push("start");
        Ok(())
    }

    async fn on_shutdown(&self, _args: &ShopArgs) -> anyhow::Result<()> {
        self.hooks.lock().push("shutdown");
        Ok(())
    }

    async fn on_complete(&self, _args: &ShopArgs) -> anyhow::Result<()> {
        self.hooks.lock().push("complete");
        Ok(())
    }
}

fn record() -> JobRecord {
    JobRecord::new("ArrayJob", json!({"shop_id": 1}))
}

fn driver() -> (IterationDriver, Arc<RecordingReenqueuer>) {
    driver_with(IterationConfig::default())
}

fn driver_with(config: IterationConfig) -> (IterationDriver, Arc<RecordingReenqueuer>) {
    let reenqueuer = Arc::new(RecordingReenqueuer::new());
    (IterationDriver::new(config, reenqueuer.clone()), reenqueuer)
}

/// A driver whose `stop` adapter interrupts from the `n`th check on.
fn stopping_driver(n: usize) -> (IterationDriver, Arc<RecordingReenqueuer>) {
    let registry = InterruptionRegistry::new();
    registry.register("stop", StopAfter::new(n));
    let (driver, reenqueuer) = driver();
    (driver.with_interruptions(Arc::new(registry)), reenqueuer)
}

#[tokio::test]
async fn test_resumes_after_persisted_cursor() {
    let (driver, reenqueuer) = driver();
    let job = ArrayJob::new(vec![10, 20, 30]);
    let mut record = record();
    record.iteration.cursor_position = Some(json!(1));
    record.iteration.times_interrupted = 1;

    let outcome = driver.run(&job, &mut record).await.unwrap();

    assert_eq!(outcome, IterationOutcome::Completed);
    assert_eq!(job.seen(), vec![30]);
    assert_eq!(record.iteration.cursor().unwrap(), Some(CursorValue::Integer(2)));
    // Resumed attempts do not run the start hook again.
    assert_eq!(job.hooks(), vec!["shutdown", "complete"]);
    assert!(reenqueuer.is_empty());
}

#[tokio::test]
async fn test_full_run_invokes_hooks_in_order() {
    let (driver, _) = driver();
    let job = ArrayJob::new(vec![1, 2, 3]);
    let mut record = record();

    let outcome = driver.run(&job, &mut record).await.unwrap();

    assert_eq!(outcome, IterationOutcome::Completed);
    assert_eq!(job.seen(), vec![1, 2, 3]);
    assert_eq!(job.hooks(), vec!["start", "shutdown", "complete"]);
    assert_eq!(record.executions, 1);
    assert_eq!(record.iteration.times_interrupted, 0);
    assert!(record.iteration.total_time >= 0.0);
}

#[tokio::test]
async fn test_interruption_reenqueues_and_next_attempt_resumes() {
    let (driver, reenqueuer) = stopping_driver(2);
    let job = ArrayJob::new(vec![1, 2, 3, 4, 5]);
    let mut record = record().with_queue_adapter("stop");

    let outcome = driver.run(&job, &mut record).await.unwrap();
    assert_eq!(
        outcome,
        IterationOutcome::Reenqueued {
            delay: None,
            reason: InterruptReason::Shutdown
        }
    );
    assert_eq!(job.seen(), vec![1, 2]);
    assert_eq!(record.iteration.times_interrupted, 1);
    assert_eq!(record.iteration.cursor().unwrap(), Some(CursorValue::Integer(1)));
    assert!(record.last_interrupted_at.is_some());
    assert_eq!(reenqueuer.len(), 1);
    assert_eq!(reenqueuer.requests()[0].0, record);

    // The host would pick the job up on a worker that is not shutting down.
    record.queue_adapter = None;
    let outcome = driver.run(&job, &mut record).await.unwrap();
    assert_eq!(outcome, IterationOutcome::Completed);
    assert_eq!(job.seen(), vec![1, 2, 3, 4, 5]);
    assert_eq!(job.hooks(), vec!["start", "shutdown", "shutdown", "complete"]);
    assert_eq!(record.iteration.times_interrupted, 1);
}

#[tokio::test]
async fn test_failed_reenqueue_leaves_interruption_unrecorded() {
    let registry = InterruptionRegistry::new();
    registry.register("stop", StopAfter::immediately());
    let (reenqueuer, requests) = ChannelReenqueuer::new();
    drop(requests);
    let driver = IterationDriver::new(IterationConfig::default(), Arc::new(reenqueuer))
        .with_interruptions(Arc::new(registry));
    let job = ArrayJob::new(vec![1, 2, 3]);
    let mut record = record().with_queue_adapter("stop");
    record.executions = 2;
    record.iteration.times_interrupted = 1;

    let err = driver.run(&job, &mut record).await.unwrap_err();

    assert!(matches!(
        err.as_iteration_error(),
        Some(IterationError::Reenqueue(_))
    ));
    assert_eq!(record.iteration.times_interrupted, 1);
    assert_eq!(record.executions, 3);
    assert!(record.last_interrupted_at.is_none());
    // The processed item is still checkpointed.
    assert_eq!(record.iteration.cursor().unwrap(), Some(CursorValue::Integer(0)));
}

#[tokio::test]
async fn test_interruptions_do_not_consume_executions() {
    let (driver, _) = stopping_driver(1);
    let job = ArrayJob::new((1..=10).collect());
    let mut record = record().with_queue_adapter("stop");

    for attempt in 1..=3u32 {
        let outcome = driver.run(&job, &mut record).await.unwrap();
        assert!(matches!(outcome, IterationOutcome::Reenqueued { .. }));
        assert_eq!(record.iteration.times_interrupted, attempt);
        assert_eq!(record.executions, 1);
    }
    assert_eq!(job.seen(), vec![1, 2, 3]);
    assert_eq!(job.hooks().iter().filter(|h| **h == "start").count(), 1);
}

#[tokio::test]
async fn test_throttle_ends_attempt_with_its_backoff() {
    let (driver, reenqueuer) = driver();
    let job = ArrayJob {
        throttle_backoff: Some(Duration::from_secs(30)),
        ..ArrayJob::new(vec![1, 2, 3])
    };
    let mut record = record();

    let outcome = driver.run(&job, &mut record).await.unwrap();

    assert_eq!(
        outcome,
        IterationOutcome::Reenqueued {
            delay: Some(Duration::from_secs(30)),
            reason: InterruptReason::Throttled
        }
    );
    assert!(job.seen().is_empty());
    assert_eq!(record.iteration.cursor().unwrap(), None);
    assert_eq!(reenqueuer.requests()[0].1, Some(Duration::from_secs(30)));
}

#[tokio::test]
async fn test_abort_runs_complete_hook_unless_skipped() {
    let (driver, _) = driver();

    let job = ArrayJob {
        abort_at: Some((2, false)),
        ..ArrayJob::new(vec![1, 2, 3])
    };
    let mut record = record();
    let outcome = driver.run(&job, &mut record).await.unwrap();
    assert_eq!(outcome, IterationOutcome::Aborted { completed: true });
    assert_eq!(job.seen(), vec![1, 2]);
    // The aborting item is not checkpointed.
    assert_eq!(record.iteration.cursor().unwrap(), Some(CursorValue::Integer(0)));
    assert_eq!(job.hooks(), vec!["start", "shutdown", "complete"]);

    let job = ArrayJob {
        abort_at: Some((1, true)),
        ..ArrayJob::new(vec![1, 2, 3])
    };
    let mut record = self::record();
    let outcome = driver.run(&job, &mut record).await.unwrap();
    assert_eq!(outcome, IterationOutcome::Aborted { completed: false });
    assert_eq!(job.hooks(), vec!["start", "shutdown"]);
    assert_eq!(record.iteration.cursor().unwrap(), None);
}

#[tokio::test]
async fn test_retry_step_reenqueues_without_checkpoint() {
    let (driver, _) = driver();
    let job = ArrayJob {
        retry_at: Some((2, Duration::from_secs(7))),
        ..ArrayJob::new(vec![1, 2, 3])
    };
    let mut record = record();

    let outcome = driver.run(&job, &mut record).await.unwrap();

    assert_eq!(
        outcome,
        IterationOutcome::Reenqueued {
            delay: Some(Duration::from_secs(7)),
            reason: InterruptReason::Retry
        }
    );
    assert_eq!(record.iteration.cursor().unwrap(), Some(CursorValue::Integer(0)));
}

#[tokio::test]
async fn test_nil_producer_skips_the_job() {
    let (driver, reenqueuer) = driver();
    let job = ArrayJob {
        skip: true,
        ..ArrayJob::new(vec![1])
    };
    let mut record = record();

    let outcome = driver.run(&job, &mut record).await.unwrap();

    assert_eq!(outcome, IterationOutcome::Skipped);
    assert!(job.hooks().is_empty());
    assert!(reenqueuer.is_empty());
}

#[tokio::test]
async fn test_empty_producer_completes() {
    let (driver, _) = driver();
    let job = ArrayJob::new(Vec::new());
    let mut record = record();

    assert_eq!(
        driver.run(&job, &mut record).await.unwrap(),
        IterationOutcome::Completed
    );
    assert_eq!(job.hooks(), vec!["start", "shutdown", "complete"]);
}

#[tokio::test]
async fn test_job_errors_propagate_without_shutdown_hook() {
    let (driver, reenqueuer) = driver();
    let job = ArrayJob {
        fail_at: Some(2),
        ..ArrayJob::new(vec![1, 2, 3])
    };
    let mut record = record();

    let err = driver.run(&job, &mut record).await.unwrap_err();

    match err {
        RunError::Job(err) => assert_eq!(err.to_string(), "item 2 failed"),
        other => panic!("expected a job error, got {other:?}"),
    }
    assert_eq!(record.iteration.cursor().unwrap(), Some(CursorValue::Integer(0)));
    // A failed attempt skips the shutdown hook.
    assert_eq!(job.hooks(), vec!["start"]);
    assert!(reenqueuer.is_empty());
}

#[tokio::test]
async fn test_job_may_not_widen_max_runtime() {
    let (driver, _) = driver_with(IterationConfig {
        max_job_runtime_seconds: Some(10),
        ..IterationConfig::default()
    });
    let job = ArrayJob {
        settings: JobSettings::default().with_max_runtime(Duration::from_secs(60)),
        ..ArrayJob::new(vec![1])
    };
    let mut record = record();

    let err = driver.run(&job, &mut record).await.unwrap_err();

    assert!(matches!(
        err.as_iteration_error(),
        Some(IterationError::RuntimeWidened { .. })
    ));
    assert_eq!(record.executions, 0);
    assert!(job.seen().is_empty());
}

#[tokio::test]
async fn test_exhausted_runtime_budget_uses_default_backoff() {
    let (driver, _) = driver_with(IterationConfig {
        default_retry_backoff_seconds: Some(5),
        ..IterationConfig::default()
    });
    let job = ArrayJob {
        settings: JobSettings::default().with_max_runtime(Duration::ZERO),
        ..ArrayJob::new(vec![1, 2, 3])
    };
    let mut record = record();

    let outcome = driver.run(&job, &mut record).await.unwrap();

    assert_eq!(
        outcome,
        IterationOutcome::Reenqueued {
            delay: Some(Duration::from_secs(5)),
            reason: InterruptReason::MaxRuntime
        }
    );
    assert_eq!(job.seen(), vec![1]);
}

#[tokio::test]
async fn test_total_time_accumulates_across_attempts() {
    let delay = Duration::from_millis(20);
    let (driver, _) = stopping_driver(1);
    let job = ArrayJob {
        item_delay: Some(delay),
        ..ArrayJob::new(vec![1, 2, 3])
    };
    let mut record = record().with_queue_adapter("stop");
    record.iteration.total_time = 1.5;

    // Each attempt processes one item, is interrupted, and adds only its own
    // running time to the total.
    for attempt in 1..=2u32 {
        let before = record.iteration.total_time;
        let started = std::time::Instant::now();
        let outcome = driver.run(&job, &mut record).await.unwrap();
        let wall = started.elapsed().as_secs_f64();

        assert!(matches!(outcome, IterationOutcome::Reenqueued { .. }));
        assert_eq!(record.iteration.times_interrupted, attempt);
        let added = record.iteration.total_time - before;
        assert!(added >= delay.as_secs_f64() - 1e-6, "attempt {attempt} added {added}");
        assert!(added <= wall + 1e-6, "attempt {attempt} added {added}, wall {wall}");
    }
    assert_eq!(job.seen(), vec![1, 2]);
    // Stored with microsecond precision.
    let scaled = record.iteration.total_time * 1_000_000.0;
    assert!((scaled - scaled.round()).abs() < 1e-3);
}

/// Yields one item whose cursor cannot be persisted as JSON.
struct InfiniteCursor {
    done: bool,
}

#[async_trait]
impl Producer for InfiniteCursor {
    type Item = i64;

    async fn next(&mut self) -> job_iteration::Result<Produced<i64>> {
        if self.done {
            return Ok(Produced::Exhausted);
        }
        self.done = true;
        Ok(Produced::item(1, CursorValue::Float(f64::INFINITY)))
    }
}

struct FloatCursorJob {
    validation: CursorValidation,
}

#[async_trait]
impl IterationJob for FloatCursorJob {
    type Arguments = serde_json::Value;
    type Item = i64;
    type Error = anyhow::Error;

    fn settings(&self) -> JobSettings {
        JobSettings::default().with_cursor_validation(self.validation)
    }

    async fn build_producer(
        &self,
        _args: &serde_json::Value,
        _cursor: Option<CursorValue>,
    ) -> anyhow::Result<Option<BoxProducer<i64>>> {
        Ok(Some(Box::new(InfiniteCursor { done: false })))
    }

    async fn each_iteration(&self, _item: i64, _args: &serde_json::Value) -> anyhow::Result<IterationStep> {
        Ok(IterationStep::Continue)
    }
}

#[tokio::test]
async fn test_unserializable_cursor_fails_in_strict_mode() {
    let (driver, _) = driver();
    let job = FloatCursorJob {
        validation: CursorValidation::Strict,
    };
    let mut record = JobRecord::new("FloatCursorJob", json!({}));

    let err = driver.run(&job, &mut record).await.unwrap_err();
    assert!(matches!(
        err.as_iteration_error(),
        Some(IterationError::InvalidCursor { .. })
    ));
}

#[tokio::test]
async fn test_unserializable_cursor_is_stored_lossily_in_warn_mode() {
    let (driver, _) = driver();
    let job = FloatCursorJob {
        validation: CursorValidation::Warn,
    };
    let mut record = JobRecord::new("FloatCursorJob", json!({}));

    let outcome = driver.run(&job, &mut record).await.unwrap();
    assert_eq!(outcome, IterationOutcome::Completed);
    assert_eq!(record.iteration.cursor_position, Some(serde_json::Value::Null));
}

#[tokio::test]
async fn test_invalid_arguments_are_reported_before_running() {
    let (driver, _) = driver();
    let job = ArrayJob::new(vec![1]);
    let mut record = JobRecord::new("ArrayJob", json!({"shop": "one"}));

    let err = driver.run(&job, &mut record).await.unwrap_err();
    assert!(matches!(
        err.as_iteration_error(),
        Some(IterationError::Serialization(_))
    ));
    assert_eq!(record.executions, 0);
}

/// Walks product rows, interrupted after every third item.
struct ProductsJob {
    source: SharedSource,
    visited: Mutex<Vec<i64>>,
}

#[async_trait]
impl IterationJob for ProductsJob {
    type Arguments = serde_json::Value;
    type Item = Row;
    type Error = anyhow::Error;

    async fn build_producer(
        &self,
        _args: &serde_json::Value,
        cursor: Option<CursorValue>,
    ) -> anyhow::Result<Option<BoxProducer<Row>>> {
        let producer = ProducerBuilder::default().records(
            self.source.clone(),
            ["created_at", "id"],
            Some(&["id"][..]),
            cursor,
        )?;
        Ok(Some(producer))
    }

    async fn each_iteration(&self, row: Row, _args: &serde_json::Value) -> anyhow::Result<IterationStep> {
        assert!(row.get("created_at").is_none());
        if let Some(id) = row.get("id").and_then(CursorValue::as_i64) {
            self.visited.lock().push(id);
        }
        Ok(IterationStep::Continue)
    }
}

#[tokio::test]
async fn test_record_iteration_survives_repeated_interruptions() {
    let registry = InterruptionRegistry::new();
    registry.register("every_third", InterruptEvery::new(3));

    let (reenqueuer, mut requests) = ChannelReenqueuer::new();
    let driver = IterationDriver::new(IterationConfig::default(), Arc::new(reenqueuer))
        .with_interruptions(Arc::new(registry));
    let job = ProductsJob {
        source: Arc::new(products_source(10)),
        visited: Mutex::new(Vec::new()),
    };
    let mut record = JobRecord::new("ProductsJob", json!({})).with_queue_adapter("every_third");

    let mut attempts = 0;
    loop {
        attempts += 1;
        // Persist and reload between attempts like a real queue would.
        record = JobRecord::from_json(record.to_json().unwrap()).unwrap();
        match driver.run(&job, &mut record).await.unwrap() {
            IterationOutcome::Completed => break,
            IterationOutcome::Reenqueued { .. } => {
                let request = requests.recv().await.unwrap();
                assert_eq!(request.record.job_id, record.job_id);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    assert_eq!(attempts, 4);
    assert_eq!(*job.visited.lock(), (1..=10).collect::<Vec<i64>>());
    assert_eq!(record.iteration.times_interrupted, 3);
}

/// Deletes every batch it is handed until the table is empty.
struct PurgeJob {
    source: Arc<MemoryRowSource>,
    deleted: Mutex<Vec<u64>>,
}

#[async_trait]
impl IterationJob for PurgeJob {
    type Arguments = serde_json::Value;
    type Item = BatchRelation;
    type Error = anyhow::Error;

    async fn build_producer(
        &self,
        _args: &serde_json::Value,
        _cursor: Option<CursorValue>,
    ) -> anyhow::Result<Option<BoxProducer<BatchRelation>>> {
        Ok(Some(
            ProducerBuilder::default().batch_deleting(self.source.clone(), Some(3))?,
        ))
    }

    async fn each_iteration(
        &self,
        batch: BatchRelation,
        _args: &serde_json::Value,
    ) -> anyhow::Result<IterationStep> {
        let removed = batch.delete().await?;
        self.deleted.lock().push(removed);
        Ok(IterationStep::Continue)
    }
}

#[tokio::test]
async fn test_batch_deleting_job_terminates_across_interruptions() {
    let registry = InterruptionRegistry::new();
    registry.register("every_second", InterruptEvery::new(2));
    let (driver, reenqueuer) = driver();
    let driver = driver.with_interruptions(Arc::new(registry));
    let job = PurgeJob {
        source: Arc::new(products_source(7)),
        deleted: Mutex::new(Vec::new()),
    };
    let mut record = JobRecord::new("PurgeJob", json!({})).with_queue_adapter("every_second");

    let first = driver.run(&job, &mut record).await.unwrap();
    assert!(matches!(first, IterationOutcome::Reenqueued { .. }));
    assert_eq!(reenqueuer.len(), 1);

    let second = driver.run(&job, &mut record).await.unwrap();
    assert_eq!(second, IterationOutcome::Completed);
    assert_eq!(*job.deleted.lock(), vec![3, 3, 1]);
    assert_eq!(job.source.count().await.unwrap(), 0);
}

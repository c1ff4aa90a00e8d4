use crate::config::JobSettings;
use crate::cursor::CursorValue;
use crate::producer::BoxProducer;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;

/// What the driver should do after an item's work succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationStep {
    /// Checkpoint this item and move on.
    Continue,
    /// Stop for good without checkpointing this item. The completion hook
    /// still runs unless `skip_complete` is set.
    Abort { skip_complete: bool },
    /// Stop this attempt without checkpointing this item and run the job
    /// again after `backoff`.
    Retry { backoff: Duration },
}

impl IterationStep {
    pub fn abort() -> Self {
        IterationStep::Abort {
            skip_complete: false,
        }
    }

    pub fn abort_without_complete() -> Self {
        IterationStep::Abort {
            skip_complete: true,
        }
    }

    pub fn retry_in(backoff: Duration) -> Self {
        IterationStep::Retry { backoff }
    }
}

/// A job that visits a resumable sequence one item at a time.
///
/// ```rust,ignore
/// struct ReindexProducts { pool: PgPool, producers: ProducerBuilder }
///
/// #[async_trait]
/// impl IterationJob for ReindexProducts {
///     type Arguments = ReindexArgs;
///     type Item = BatchRelation;
///     type Error = anyhow::Error;
///
///     async fn build_producer(&self, args: &ReindexArgs, cursor: Option<CursorValue>)
///         -> anyhow::Result<Option<BoxProducer<BatchRelation>>> {
///         let scope = QueryBuilder::new("products").where_eq("shop_id", args.shop_id);
///         let source = Arc::new(PgRowSource::new(self.pool.clone(), scope, ["id"]));
///         Ok(Some(self.producers.batch_relations(source, ["id"], None, cursor)?))
///     }
///
///     async fn each_iteration(&self, batch: BatchRelation, _args: &ReindexArgs)
///         -> anyhow::Result<IterationStep> {
///         reindex(batch.load().await?).await?;
///         Ok(IterationStep::Continue)
///     }
/// }
/// ```
#[async_trait]
pub trait IterationJob: Send + Sync {
    type Arguments: DeserializeOwned + Send + Sync;
    type Item: Send + 'static;
    type Error: fmt::Display + fmt::Debug + Send + Sync + 'static;

    /// Name used in logs and in `RuntimeWidened` errors.
    fn job_class(&self) -> &str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }

    fn settings(&self) -> JobSettings {
        JobSettings::default()
    }

    /// Build the producer to iterate, starting after `cursor`. Returning
    /// `None` skips the job.
    async fn build_producer(
        &self,
        args: &Self::Arguments,
        cursor: Option<CursorValue>,
    ) -> Result<Option<BoxProducer<Self::Item>>, Self::Error>;

    async fn each_iteration(
        &self,
        item: Self::Item,
        args: &Self::Arguments,
    ) -> Result<IterationStep, Self::Error>;

    /// Runs once, on the first attempt, before any item.
    async fn on_start(&self, _args: &Self::Arguments) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Runs at the end of every attempt that built a producer and iterated
    /// without error.
    async fn on_shutdown(&self, _args: &Self::Arguments) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Runs once, when iteration finishes or is aborted.
    async fn on_complete(&self, _args: &Self::Arguments) -> Result<(), Self::Error> {
        Ok(())
    }
}

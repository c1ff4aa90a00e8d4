use super::{
    ArrayProducer, BatchDeletingProducer, BatchProducer, BatchRelation, BatchRelationProducer,
    BoxProducer,
    NestedFactory, NestedProducer, RecordProducer, ThrottleProducer,
};
use crate::config::IterationConfig;
use crate::cursor::CursorValue;
use crate::error::Result;
use crate::query_builder::{CursorPaginator, KeyColumn, OrderingKey};
use crate::source::{Row, SharedSource};
use std::time::Duration;

/// Builds the producers a job returns from `build_producer`.
///
/// Every constructor over a resumable sequence takes the resumption cursor
/// explicitly so the persisted position always reaches the producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProducerBuilder {
    default_batch_size: usize,
}

impl Default for ProducerBuilder {
    fn default() -> Self {
        Self::from_config(&IterationConfig::default())
    }
}

impl ProducerBuilder {
    pub fn from_config(config: &IterationConfig) -> Self {
        Self {
            default_batch_size: config.default_batch_size,
        }
    }

    pub fn default_batch_size(&self) -> usize {
        self.default_batch_size
    }

    pub fn once(&self, cursor: Option<CursorValue>) -> Result<BoxProducer<()>> {
        Ok(Box::new(ArrayProducer::once(cursor)?))
    }

    pub fn times(&self, count: usize, cursor: Option<CursorValue>) -> Result<BoxProducer<usize>> {
        Ok(Box::new(ArrayProducer::times(count, cursor)?))
    }

    pub fn array<T: Send + Sync + 'static>(
        &self,
        values: Vec<T>,
        cursor: Option<CursorValue>,
    ) -> Result<BoxProducer<T>> {
        Ok(Box::new(ArrayProducer::new(values, cursor)?))
    }

    /// One row per item. `columns` restricts the emitted row; ordering-key
    /// columns are fetched regardless.
    pub fn records<C: Into<KeyColumn>>(
        &self,
        source: SharedSource,
        key: impl IntoIterator<Item = C>,
        columns: Option<&[&str]>,
        cursor: Option<CursorValue>,
    ) -> Result<BoxProducer<Row>> {
        let mut paginator =
            CursorPaginator::new(source, OrderingKey::new(key)?, cursor, self.default_batch_size)?;
        if let Some(columns) = columns {
            paginator = paginator.with_columns(columns);
        }
        Ok(Box::new(RecordProducer::new(paginator)))
    }

    /// Raw pages of up to `batch_size` rows.
    pub fn batches<C: Into<KeyColumn>>(
        &self,
        source: SharedSource,
        key: impl IntoIterator<Item = C>,
        batch_size: Option<usize>,
        cursor: Option<CursorValue>,
    ) -> Result<BoxProducer<Vec<Row>>> {
        let paginator = CursorPaginator::new(
            source,
            OrderingKey::new(key)?,
            cursor,
            batch_size.unwrap_or(self.default_batch_size),
        )?;
        Ok(Box::new(BatchProducer::new(paginator)))
    }

    /// Batches re-queried by identifier when loaded.
    pub fn batch_relations<C: Into<KeyColumn>>(
        &self,
        source: SharedSource,
        key: impl IntoIterator<Item = C>,
        batch_size: Option<usize>,
        cursor: Option<CursorValue>,
    ) -> Result<BoxProducer<BatchRelation>> {
        Ok(Box::new(BatchRelationProducer::new(
            source,
            OrderingKey::new(key)?,
            cursor,
            batch_size.unwrap_or(self.default_batch_size),
        )?))
    }

    /// Identifier batches from the head of `source`, for jobs that delete
    /// each batch they receive. Takes no cursor: the scope shrinks instead.
    pub fn batch_deleting(
        &self,
        source: SharedSource,
        batch_size: Option<usize>,
    ) -> Result<BoxProducer<BatchRelation>> {
        Ok(Box::new(BatchDeletingProducer::new(
            source,
            batch_size.unwrap_or(self.default_batch_size),
        )?))
    }

    pub fn throttle<T, F>(
        &self,
        inner: BoxProducer<T>,
        backoff: Duration,
        condition: F,
    ) -> BoxProducer<T>
    where
        T: Send + 'static,
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Box::new(ThrottleProducer::new(inner, backoff, condition))
    }

    pub fn nested<T: Clone + Send + Sync + 'static>(
        &self,
        factories: Vec<NestedFactory<T>>,
        cursor: Option<CursorValue>,
    ) -> Result<BoxProducer<Vec<T>>> {
        Ok(Box::new(NestedProducer::new(factories, cursor)?))
    }
}

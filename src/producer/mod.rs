//! # Producers
//!
//! Pull-based, resumable sequences of `(value, cursor)` pairs.
//!
//! Every producer is built from an optional cursor and yields, with each item,
//! the cursor that resumes *after* that item. Producers are lazy: database
//! producers fetch one page per demand, and nothing is consumed past the item
//! the driver is currently processing.
//!
//! - [`array`] - index-cursor producers over in-memory values (`once`, `times`, `array`)
//! - [`records`] - keyset-paginated rows, raw pages, identifier-reloaded batches, and
//!   cursorless batches for jobs that delete what they visit
//! - [`nested`] - depth-first composition of producer factories with a per-level cursor
//! - [`throttle`] - health-gated pass-through that ends an attempt with a backoff
//! - [`builder`] - [`ProducerBuilder`], the facade jobs construct producers from

use crate::cursor::CursorValue;
use crate::error::Result;
use async_trait::async_trait;
use futures::stream::{self, Stream};
use std::time::Duration;

pub mod array;
pub mod builder;
pub mod nested;
pub mod records;
pub mod throttle;

pub use array::ArrayProducer;
pub use builder::ProducerBuilder;
pub use nested::{level, NestedFactory, NestedProducer};
pub use records::{
    BatchDeletingProducer, BatchProducer, BatchRelation, BatchRelationProducer, RecordProducer,
};
pub use throttle::ThrottleProducer;

/// One step of a producer.
#[derive(Debug, Clone, PartialEq)]
pub enum Produced<T> {
    Item { value: T, cursor: CursorValue },
    /// The sequence has ended for good.
    Exhausted,
    /// Stop this attempt and resume after `backoff`.
    Throttled { backoff: Duration },
}

impl<T> Produced<T> {
    pub fn item(value: T, cursor: CursorValue) -> Self {
        Produced::Item { value, cursor }
    }

    pub fn is_item(&self) -> bool {
        matches!(self, Produced::Item { .. })
    }
}

#[async_trait]
pub trait Producer: Send + Sync {
    type Item: Send;

    async fn next(&mut self) -> Result<Produced<Self::Item>>;

    /// Estimated number of items. Used for logging only.
    async fn size(&self) -> Result<Option<u64>> {
        Ok(None)
    }
}

pub type BoxProducer<T> = Box<dyn Producer<Item = T>>;

/// Adapt a producer into a stream of `(value, cursor)` pairs.
///
/// The stream ends at exhaustion or throttling; use [`Producer::next`]
/// directly where the difference matters.
pub fn into_stream<T: Send + 'static>(
    producer: BoxProducer<T>,
) -> impl Stream<Item = Result<(T, CursorValue)>> + Send {
    stream::unfold(Some(producer), |state| async move {
        let mut producer = state?;
        match producer.next().await {
            Ok(Produced::Item { value, cursor }) => Some((Ok((value, cursor)), Some(producer))),
            Ok(Produced::Exhausted) | Ok(Produced::Throttled { .. }) => None,
            Err(err) => Some((Err(err), None)),
        }
    })
}

/// Drain a producer, collecting every item until it is exhausted or throttled.
pub async fn collect<T: Send + 'static>(producer: &mut BoxProducer<T>) -> Result<Vec<(T, CursorValue)>> {
    let mut items = Vec::new();
    while let Produced::Item { value, cursor } = producer.next().await? {
        items.push((value, cursor));
    }
    Ok(items)
}

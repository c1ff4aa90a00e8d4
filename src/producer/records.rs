//! Producers over a keyset-paginated [`RowSource`](crate::source::RowSource).

use super::{Produced, Producer};
use crate::cursor::CursorValue;
use crate::error::{IterationError, Result};
use crate::query_builder::{Condition, CursorPaginator, KeyColumn, OrderingKey};
use crate::source::{PageRequest, Row, SharedSource};
use async_trait::async_trait;
use std::collections::VecDeque;
use tracing::debug;

/// One row per item; the cursor is that row's ordering-key values.
#[derive(Debug)]
pub struct RecordProducer {
    paginator: CursorPaginator,
    buffer: VecDeque<(Row, CursorValue)>,
}

impl RecordProducer {
    pub fn new(paginator: CursorPaginator) -> Self {
        Self {
            paginator,
            buffer: VecDeque::new(),
        }
    }
}

#[async_trait]
impl Producer for RecordProducer {
    type Item = Row;

    async fn next(&mut self) -> Result<Produced<Row>> {
        if self.buffer.is_empty() {
            if let Some(page) = self.paginator.next_page().await? {
                self.buffer.extend(page.rows.into_iter().zip(page.positions));
            }
        }
        Ok(match self.buffer.pop_front() {
            Some((row, cursor)) => Produced::item(row, cursor),
            None => Produced::Exhausted,
        })
    }

    async fn size(&self) -> Result<Option<u64>> {
        Ok(Some(self.paginator.source().count().await?))
    }
}

/// Raw pages: each item is the page's rows, the cursor is its last row's key.
#[derive(Debug)]
pub struct BatchProducer {
    paginator: CursorPaginator,
}

impl BatchProducer {
    pub fn new(paginator: CursorPaginator) -> Self {
        Self { paginator }
    }
}

#[async_trait]
impl Producer for BatchProducer {
    type Item = Vec<Row>;

    async fn next(&mut self) -> Result<Produced<Vec<Row>>> {
        Ok(match self.paginator.next_page().await? {
            Some(page) => Produced::item(page.rows, page.cursor),
            None => Produced::Exhausted,
        })
    }

    async fn size(&self) -> Result<Option<u64>> {
        batch_count(&self.paginator).await
    }
}

async fn batch_count(paginator: &CursorPaginator) -> Result<Option<u64>> {
    let rows = paginator.source().count().await?;
    Ok(Some(rows.div_ceil(paginator.page_size() as u64)))
}

/// A page of rows addressed by identifier.
///
/// Only the identifier list is fixed when the page is fetched; [`load`]
/// queries the source again, so field values reflect writes made since then
/// and rows deleted in the meantime are simply absent.
///
/// [`load`]: BatchRelation::load
#[derive(Debug, Clone)]
pub struct BatchRelation {
    source: SharedSource,
    primary_key: Vec<KeyColumn>,
    order_by: Vec<KeyColumn>,
    identifiers: Vec<Vec<CursorValue>>,
}

impl BatchRelation {
    pub fn identifiers(&self) -> &[Vec<CursorValue>] {
        &self.identifiers
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    /// The membership predicate used by [`BatchRelation::load`].
    pub fn condition(&self) -> Condition {
        Condition::identifiers(&self.primary_key, self.identifiers.clone())
    }

    pub async fn load(&self) -> Result<Vec<Row>> {
        let request = PageRequest {
            columns: Vec::new(),
            condition: Some(self.condition()),
            order_by: self.order_by.clone(),
            limit: self.identifiers.len(),
        };
        self.source.fetch(&request).await
    }

    /// Delete the batch's rows by identifier. Returns the number removed.
    pub async fn delete(&self) -> Result<u64> {
        if self.identifiers.is_empty() {
            return Ok(0);
        }
        self.source.delete(&self.condition()).await
    }
}

/// Batches re-materialized by identifier rather than reused from the page.
///
/// Pages pluck only the ordering-key and identifier columns. The identifier
/// is never part of the cursor unless it is also part of the ordering key.
#[derive(Debug)]
pub struct BatchRelationProducer {
    paginator: CursorPaginator,
    primary_key: Vec<KeyColumn>,
}

impl BatchRelationProducer {
    pub fn new(
        source: SharedSource,
        key: OrderingKey,
        cursor: Option<CursorValue>,
        batch_size: usize,
    ) -> Result<Self> {
        let primary_key = source.primary_key().to_vec();
        let plucked: Vec<String> = primary_key.iter().map(|c| c.name.clone()).collect();
        let paginator = CursorPaginator::new(source, key, cursor, batch_size)?.with_columns(&plucked);
        Ok(Self {
            paginator,
            primary_key,
        })
    }
}

#[async_trait]
impl Producer for BatchRelationProducer {
    type Item = BatchRelation;

    async fn next(&mut self) -> Result<Produced<BatchRelation>> {
        let Some(page) = self.paginator.next_page().await? else {
            return Ok(Produced::Exhausted);
        };
        let relation = BatchRelation {
            source: self.paginator.source().clone(),
            primary_key: self.primary_key.clone(),
            order_by: self.paginator.key().columns().to_vec(),
            identifiers: page
                .rows
                .iter()
                .map(|row| row.values_of(&self.primary_key))
                .collect(),
        };
        Ok(Produced::item(relation, page.cursor))
    }

    async fn size(&self) -> Result<Option<u64>> {
        batch_count(&self.paginator).await
    }
}

/// Identifier batches taken from the head of the scope until it is empty.
///
/// There is no cursor: each batch is the first `batch_size` rows in
/// primary-key order, so the job must delete every batch it receives (see
/// [`BatchRelation::delete`]) or the same batch is yielded again.
#[derive(Debug)]
pub struct BatchDeletingProducer {
    source: SharedSource,
    primary_key: Vec<KeyColumn>,
    batch_size: usize,
    exhausted: bool,
}

impl BatchDeletingProducer {
    pub fn new(source: SharedSource, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(IterationError::InvalidPageSize);
        }
        if let Some(clause) = source.ordering_conflict() {
            return Err(IterationError::OrderingConflict { clause });
        }
        let primary_key = source.primary_key().to_vec();
        if primary_key.is_empty() {
            return Err(IterationError::EmptyOrderingKey);
        }
        Ok(Self {
            source,
            primary_key,
            batch_size,
            exhausted: false,
        })
    }
}

#[async_trait]
impl Producer for BatchDeletingProducer {
    type Item = BatchRelation;

    async fn next(&mut self) -> Result<Produced<BatchRelation>> {
        if self.exhausted {
            return Ok(Produced::Exhausted);
        }
        let request = PageRequest {
            columns: self.primary_key.iter().map(|c| c.name.clone()).collect(),
            condition: None,
            order_by: self.primary_key.clone(),
            limit: self.batch_size,
        };
        let rows = self.source.fetch(&request).await?;
        if rows.is_empty() {
            debug!(source = self.source.name(), "Nothing left to delete");
            self.exhausted = true;
            return Ok(Produced::Exhausted);
        }

        let relation = BatchRelation {
            source: self.source.clone(),
            primary_key: self.primary_key.clone(),
            order_by: self.primary_key.clone(),
            identifiers: rows
                .iter()
                .map(|row| row.values_of(&self.primary_key))
                .collect(),
        };
        Ok(Produced::item(relation, CursorValue::Null))
    }

    async fn size(&self) -> Result<Option<u64>> {
        let rows = self.source.count().await?;
        Ok(Some(rows.div_ceil(self.batch_size as u64)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{MemoryRowSource, RowSource};
    use std::sync::Arc;

    fn products(count: i64) -> Arc<MemoryRowSource> {
        Arc::new(MemoryRowSource::new(
            "products",
            (1..=count).map(|id| {
                Row::from_pairs([
                    ("id", CursorValue::Integer(id)),
                    ("title", CursorValue::String(format!("product {id}"))),
                    ("shop_id", CursorValue::Integer(id % 2)),
                ])
            }),
        ))
    }

    #[tokio::test]
    async fn test_records_carry_their_own_cursor() {
        let key = OrderingKey::new(["id"]).unwrap();
        let paginator = CursorPaginator::new(products(3), key, Some(1.into()), 2).unwrap();
        let mut producer = RecordProducer::new(paginator);

        match producer.next().await.unwrap() {
            Produced::Item { value, cursor } => {
                assert_eq!(value.get("id"), Some(&CursorValue::Integer(2)));
                assert_eq!(cursor, CursorValue::Integer(2));
            }
            other => panic!("expected an item, got {other:?}"),
        }
        assert!(producer.next().await.unwrap().is_item());
        assert_eq!(producer.next().await.unwrap(), Produced::Exhausted);
        assert_eq!(producer.size().await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_batch_relation_reloads_current_values() {
        let source = products(5);
        let key = OrderingKey::new(["shop_id", "id"]).unwrap();
        let mut producer = BatchRelationProducer::new(source.clone(), key, None, 2).unwrap();

        let Produced::Item { value: batch, cursor } = producer.next().await.unwrap() else {
            panic!("expected a batch");
        };
        // shop 0 holds ids 2 and 4
        assert_eq!(
            batch.identifiers(),
            &[vec![CursorValue::Integer(2)], vec![CursorValue::Integer(4)]]
        );
        assert_eq!(cursor, CursorValue::Array(vec![0.into(), 4.into()]));

        source.update(
            |row| row.get("id") == Some(&CursorValue::Integer(4)),
            |row| row.insert("title", "renamed".into()),
        );
        let rows = batch.load().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("title"), Some(&CursorValue::from("renamed")));
        assert_eq!(producer.size().await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_identifier_outside_key_is_not_in_cursor() {
        let source = Arc::new(
            MemoryRowSource::new(
                "events",
                (1..=3).map(|n: i64| {
                    Row::from_pairs([
                        ("uuid", CursorValue::String(format!("u{n}"))),
                        ("seq", CursorValue::Integer(n * 10)),
                    ])
                }),
            )
            .with_primary_key(["uuid"]),
        );
        let key = OrderingKey::new(["seq"]).unwrap();
        let mut producer = BatchRelationProducer::new(source, key, None, 2).unwrap();

        let Produced::Item { value: batch, cursor } = producer.next().await.unwrap() else {
            panic!("expected a batch");
        };
        assert_eq!(cursor, CursorValue::Integer(20));
        assert_eq!(batch.identifiers()[0], vec![CursorValue::from("u1")]);
    }

    #[tokio::test]
    async fn test_raw_batches_are_bounded_by_page_size() {
        let key = OrderingKey::new(["id"]).unwrap();
        let paginator = CursorPaginator::new(products(5), key, None, 2).unwrap();
        let mut producer = BatchProducer::new(paginator);

        let mut sizes = Vec::new();
        while let Produced::Item { value, .. } = producer.next().await.unwrap() {
            sizes.push(value.len());
        }
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_batch_deleting_walks_until_scope_is_empty() {
        let source = products(5);
        let mut producer = BatchDeletingProducer::new(source.clone(), 2).unwrap();
        assert_eq!(producer.size().await.unwrap(), Some(3));

        let mut batches = Vec::new();
        while let Produced::Item { value, cursor } = producer.next().await.unwrap() {
            assert_eq!(cursor, CursorValue::Null);
            batches.push(value.identifiers().to_vec());
            assert_eq!(value.delete().await.unwrap(), value.len() as u64);
        }

        let id = |n: i64| vec![CursorValue::Integer(n)];
        assert_eq!(
            batches,
            vec![vec![id(1), id(2)], vec![id(3), id(4)], vec![id(5)]]
        );
        assert_eq!(source.count().await.unwrap(), 0);
        assert!(matches!(producer.next().await.unwrap(), Produced::Exhausted));
    }

    #[tokio::test]
    async fn test_batch_deleting_repeats_undeleted_batch() {
        let mut producer = BatchDeletingProducer::new(products(3), 2).unwrap();
        let first = producer.next().await.unwrap();
        let second = producer.next().await.unwrap();
        match (first, second) {
            (Produced::Item { value: a, .. }, Produced::Item { value: b, .. }) => {
                assert_eq!(a.identifiers(), b.identifiers());
            }
            other => panic!("expected two batches, got {other:?}"),
        }
    }

    #[test]
    fn test_batch_deleting_rejects_zero_batch_size() {
        let err = BatchDeletingProducer::new(products(1), 0).unwrap_err();
        assert_eq!(err, IterationError::InvalidPageSize);
    }
}

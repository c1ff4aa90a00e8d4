//! # Row sources
//!
//! The ordered query abstraction producers paginate over. A source knows its
//! base scope (table, joins, filters) and its unique identifier columns; it
//! takes the projection, keyset condition, ordering and limit from each
//! [`PageRequest`].
//!
//! - [`postgres::PgRowSource`] runs requests through sqlx against PostgreSQL.
//! - [`memory::MemoryRowSource`] evaluates them over rows held in memory.

use crate::cursor::CursorValue;
use crate::error::Result;
use crate::query_builder::{Condition, KeyColumn};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::MemoryRowSource;
#[cfg(feature = "postgres")]
pub use postgres::PgRowSource;

/// A fetched row keyed by unqualified column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: BTreeMap<String, CursorValue>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, CursorValue)>,
        K: Into<String>,
    {
        Self {
            values: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&CursorValue> {
        self.values.get(column)
    }

    pub fn insert(&mut self, column: impl Into<String>, value: CursorValue) {
        self.values.insert(column.into(), value);
    }

    pub fn remove(&mut self, column: &str) -> Option<CursorValue> {
        self.values.remove(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Values of `columns` in order, `Null` where absent.
    pub fn values_of(&self, columns: &[KeyColumn]) -> Vec<CursorValue> {
        columns
            .iter()
            .map(|c| self.get(c.value_name()).cloned().unwrap_or(CursorValue::Null))
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json_lossy()))
                .collect(),
        )
    }
}

impl From<BTreeMap<String, CursorValue>> for Row {
    fn from(values: BTreeMap<String, CursorValue>) -> Self {
        Self { values }
    }
}

/// One page query. An empty `columns` list selects every column.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub columns: Vec<String>,
    pub condition: Option<Condition>,
    pub order_by: Vec<KeyColumn>,
    pub limit: usize,
}

/// An ordered, filterable query source.
#[async_trait]
pub trait RowSource: Send + Sync + fmt::Debug {
    /// Human-readable name used in log fields.
    fn name(&self) -> &str;

    /// Unique identifier columns used to re-materialize batches.
    fn primary_key(&self) -> &[KeyColumn];

    /// `Some("ORDER BY")` or `Some("LIMIT")` when the base scope already
    /// carries a clause that keyset pagination must own.
    fn ordering_conflict(&self) -> Option<&'static str>;

    fn joins_tables(&self) -> bool;

    async fn fetch(&self, request: &PageRequest) -> Result<Vec<Row>>;

    /// Delete the rows of the base scope matching `condition`. Returns the
    /// number of rows removed.
    async fn delete(&self, condition: &Condition) -> Result<u64>;

    /// Row count of the base scope. Observability only.
    async fn count(&self) -> Result<u64>;
}

pub type SharedSource = Arc<dyn RowSource>;

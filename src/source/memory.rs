use super::{PageRequest, Row, RowSource};
use crate::error::Result;
use crate::query_builder::conditions::unqualified;
use crate::query_builder::{Condition, KeyColumn};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

/// Row source backed by a vector of rows.
///
/// Conditions are evaluated with the same SQL comparison rules the PostgreSQL
/// source relies on, and nulls sort last. Rows may be changed between fetches
/// to model concurrent writes.
#[derive(Debug)]
pub struct MemoryRowSource {
    name: String,
    rows: RwLock<Vec<Row>>,
    primary_key: Vec<KeyColumn>,
    order_by: Option<String>,
    limit: Option<usize>,
    joins: Vec<String>,
    fetches: AtomicUsize,
}

impl MemoryRowSource {
    /// A source identified by an `id` column.
    pub fn new(name: &str, rows: impl IntoIterator<Item = Row>) -> Self {
        Self {
            name: name.to_string(),
            rows: RwLock::new(rows.into_iter().collect()),
            primary_key: vec![KeyColumn::new("id")],
            order_by: None,
            limit: None,
            joins: Vec::new(),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_primary_key<C: Into<KeyColumn>>(mut self, columns: impl IntoIterator<Item = C>) -> Self {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Give the base scope an explicit order, which paginators reject.
    pub fn with_order_by(mut self, column: &str) -> Self {
        self.order_by = Some(column.to_string());
        self
    }

    /// Give the base scope a limit, which paginators reject.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Mark the scope as joining `table`. Only affects column validation.
    pub fn with_join(mut self, table: &str) -> Self {
        self.joins.push(table.to_string());
        self
    }

    pub fn push(&self, row: Row) {
        self.rows.write().push(row);
    }

    /// Apply `change` to every row matching `filter`.
    pub fn update<F, G>(&self, filter: F, mut change: G)
    where
        F: Fn(&Row) -> bool,
        G: FnMut(&mut Row),
    {
        for row in self.rows.write().iter_mut().filter(|r| filter(&**r)) {
            change(row);
        }
    }

    pub fn remove_where<F: Fn(&Row) -> bool>(&self, filter: F) {
        self.rows.write().retain(|row| !filter(row));
    }

    /// Number of `fetch` calls served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(AtomicOrdering::SeqCst)
    }
}

fn compare_rows(a: &Row, b: &Row, order_by: &[KeyColumn]) -> Ordering {
    for column in order_by {
        let name = column.value_name();
        let left = a.get(name).cloned().unwrap_or_default();
        let right = b.get(name).cloned().unwrap_or_default();
        match left.sort_cmp(&right) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

#[async_trait]
impl RowSource for MemoryRowSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn primary_key(&self) -> &[KeyColumn] {
        &self.primary_key
    }

    fn ordering_conflict(&self) -> Option<&'static str> {
        if self.order_by.is_some() {
            Some("ORDER BY")
        } else if self.limit.is_some() {
            Some("LIMIT")
        } else {
            None
        }
    }

    fn joins_tables(&self) -> bool {
        !self.joins.is_empty()
    }

    async fn fetch(&self, request: &PageRequest) -> Result<Vec<Row>> {
        self.fetches.fetch_add(1, AtomicOrdering::SeqCst);

        let mut matched: Vec<Row> = self
            .rows
            .read()
            .iter()
            .filter(|row| request.condition.as_ref().map_or(true, |c| c.matches(row)))
            .cloned()
            .collect();

        matched.sort_by(|a, b| compare_rows(a, b, &request.order_by));
        matched.truncate(request.limit);

        if request.columns.is_empty() {
            return Ok(matched);
        }
        Ok(matched
            .into_iter()
            .map(|row| {
                Row::from_pairs(request.columns.iter().filter_map(|column| {
                    let name = unqualified(column);
                    row.get(name).map(|v| (name.to_string(), v.clone()))
                }))
            })
            .collect())
    }

    async fn delete(&self, condition: &Condition) -> Result<u64> {
        let mut rows = self.rows.write();
        let before = rows.len();
        rows.retain(|row| !condition.matches(row));
        Ok((before - rows.len()) as u64)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.rows.read().len() as u64)
    }
}

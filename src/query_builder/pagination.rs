//! Keyset pagination.
//!
//! Pages are addressed by the ordering-key values of the last row seen rather
//! than by an offset, so a resumed paginator issues the same cheap indexed
//! query no matter how far into the table it is.

use super::conditions::{keyset_condition, unqualified, KeyColumn};
use crate::cursor::CursorValue;
use crate::error::{IterationError, Result};
use crate::source::{PageRequest, Row, SharedSource};
use tracing::debug;

/// Ordered list of columns that both sorts the query and seeds the position.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderingKey {
    columns: Vec<KeyColumn>,
}

impl OrderingKey {
    pub fn new<I, C>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = C>,
        C: Into<KeyColumn>,
    {
        let columns: Vec<KeyColumn> = columns.into_iter().map(Into::into).collect();
        if columns.is_empty() {
            return Err(IterationError::EmptyOrderingKey);
        }
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[KeyColumn] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn contains(&self, column: &str) -> bool {
        let wanted = unqualified(column);
        self.columns.iter().any(|c| c.value_name() == wanted)
    }

    /// Key values of `row` in key order.
    pub fn position_of(&self, row: &Row) -> Result<Vec<CursorValue>> {
        self.columns
            .iter()
            .map(|column| {
                row.get(column.value_name()).cloned().ok_or_else(|| {
                    IterationError::configuration(format!(
                        "ordering column '{}' is missing from the fetched row",
                        column.name
                    ))
                })
            })
            .collect()
    }

    fn validate_position(&self, position: &[CursorValue]) -> Result<()> {
        if position.len() > self.columns.len() {
            return Err(IterationError::InvalidPosition {
                columns: self.names(),
                reason: format!(
                    "position has {} components but the key has {} columns",
                    position.len(),
                    self.columns.len()
                ),
            });
        }
        if position.iter().any(CursorValue::is_null) {
            return Err(IterationError::InvalidPosition {
                columns: self.names(),
                reason: "position cannot contain null values".to_string(),
            });
        }
        Ok(())
    }
}

/// One fetched page and the position it leaves the paginator at.
///
/// `positions[i]` is the cursor of `rows[i]`, computed before any key columns
/// were stripped from the row.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub rows: Vec<Row>,
    pub positions: Vec<CursorValue>,
    pub cursor: CursorValue,
}

/// Walks a [`RowSource`](crate::source::RowSource) one ordered page at a time.
#[derive(Debug)]
pub struct CursorPaginator {
    source: SharedSource,
    key: OrderingKey,
    position: Vec<CursorValue>,
    page_size: usize,
    columns: Vec<String>,
    stripped: Vec<String>,
    exhausted: bool,
}

impl CursorPaginator {
    /// Validates the source, key and position up front; every failure here is
    /// a configuration error.
    pub fn new(
        source: SharedSource,
        key: OrderingKey,
        position: Option<CursorValue>,
        page_size: usize,
    ) -> Result<Self> {
        if page_size == 0 {
            return Err(IterationError::InvalidPageSize);
        }
        if let Some(clause) = source.ordering_conflict() {
            return Err(IterationError::OrderingConflict { clause });
        }
        if source.joins_tables() {
            if let Some(column) = key.columns().iter().find(|c| !c.is_qualified()) {
                return Err(IterationError::UnqualifiedJoinColumn {
                    column: column.name.clone(),
                });
            }
        }

        let position = position
            .map(CursorValue::into_components)
            .unwrap_or_default();
        key.validate_position(&position)?;

        Ok(Self {
            source,
            key,
            position,
            page_size,
            columns: Vec::new(),
            stripped: Vec::new(),
            exhausted: false,
        })
    }

    /// Restrict emitted rows to `columns`. Key columns outside the subset are
    /// still selected so the next position can be computed, then removed.
    pub fn with_columns<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        let mut selected: Vec<String> = columns.iter().map(|c| c.as_ref().to_string()).collect();
        let mut stripped = Vec::new();
        for column in self.key.columns() {
            let present = selected
                .iter()
                .any(|s| unqualified(s) == column.value_name());
            if !present {
                selected.push(column.name.clone());
                stripped.push(column.value_name().to_string());
            }
        }
        self.columns = selected;
        self.stripped = stripped;
        self
    }

    pub fn key(&self) -> &OrderingKey {
        &self.key
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn source(&self) -> &SharedSource {
        &self.source
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Current resumption position in cursor form (`Null` before the first page).
    pub fn cursor(&self) -> CursorValue {
        if self.position.is_empty() {
            CursorValue::Null
        } else {
            CursorValue::from_components(self.position.clone())
        }
    }

    /// Fetch the next page strictly after the current position.
    ///
    /// A page shorter than the page size marks the paginator exhausted; later
    /// calls return `None` without querying the source again.
    pub async fn next_page(&mut self) -> Result<Option<Page>> {
        if self.exhausted {
            return Ok(None);
        }

        let request = PageRequest {
            columns: self.columns.clone(),
            condition: keyset_condition(self.key.columns(), &self.position),
            order_by: self.key.columns().to_vec(),
            limit: self.page_size,
        };
        let mut rows = self.source.fetch(&request).await?;

        if rows.len() < self.page_size {
            self.exhausted = true;
        }
        let Some(last) = rows.last() else {
            debug!(columns = ?self.key.names(), "Keyset pagination reached the end of the source");
            return Ok(None);
        };

        let position = self.key.position_of(last)?;
        self.key.validate_position(&position)?;
        self.position = position;

        let positions = rows
            .iter()
            .map(|row| self.key.position_of(row).map(CursorValue::from_components))
            .collect::<Result<Vec<_>>>()?;

        if !self.stripped.is_empty() {
            for row in &mut rows {
                for column in &self.stripped {
                    row.remove(column);
                }
            }
        }

        debug!(
            rows = rows.len(),
            exhausted = self.exhausted,
            position = %self.cursor(),
            "Fetched keyset page"
        );

        Ok(Some(Page {
            rows,
            positions,
            cursor: self.cursor(),
        }))
    }
}

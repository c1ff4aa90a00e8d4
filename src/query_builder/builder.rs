use super::conditions::{Condition, KeyColumn, WhereClause};
use super::joins::Join;
use crate::cursor::CursorValue;
use crate::source::PageRequest;

/// Base scope of an iterated query: table, joins and filters.
///
/// Ordering and limits belong to the paginator. `order_by` and `limit` exist
/// so a scope reused from elsewhere can be detected and rejected when it
/// already carries them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryBuilder {
    base_table: String,
    joins: Vec<Join>,
    where_clauses: Vec<WhereClause>,
    order_by: Vec<String>,
    limit: Option<usize>,
}

impl QueryBuilder {
    /// Create a new query builder for the given table
    pub fn new(table: &str) -> Self {
        Self {
            base_table: table.to_string(),
            ..Self::default()
        }
    }

    pub fn base_table(&self) -> &str {
        &self.base_table
    }

    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    pub fn inner_join(self, table: &str, on_condition: &str) -> Self {
        self.join(Join::inner(table, on_condition))
    }

    pub fn left_join(self, table: &str, on_condition: &str) -> Self {
        self.join(Join::left(table, on_condition))
    }

    pub fn where_clause(mut self, clause: WhereClause) -> Self {
        self.where_clauses.push(clause);
        self
    }

    /// Add a bound equality filter
    pub fn where_eq(self, field: &str, value: impl Into<CursorValue>) -> Self {
        self.where_clause(WhereClause::eq(field, value))
    }

    /// Add caller-written SQL as a filter
    pub fn where_raw(self, sql: &str) -> Self {
        self.where_clause(WhereClause::raw(sql))
    }

    pub fn order_by(mut self, field: &str, direction: &str) -> Self {
        self.order_by.push(format!("{field} {direction}"));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn has_joins(&self) -> bool {
        !self.joins.is_empty()
    }

    /// The clause that prevents keyset pagination over this scope, if any.
    pub fn ordering_conflict(&self) -> Option<&'static str> {
        if !self.order_by.is_empty() {
            Some("ORDER BY")
        } else if self.limit.is_some() {
            Some("LIMIT")
        } else {
            None
        }
    }

    fn push_from_and_where(
        &self,
        sql: &mut String,
        extra: Option<&Condition>,
        params: &mut Vec<CursorValue>,
    ) {
        sql.push_str(&format!(" FROM {}", self.base_table));

        for join in &self.joins {
            sql.push(' ');
            sql.push_str(&join.to_sql());
        }

        let mut where_parts: Vec<String> = self
            .where_clauses
            .iter()
            .map(|clause| clause.to_sql(params))
            .collect();
        if let Some(condition) = extra {
            where_parts.push(condition.to_sql(params));
        }
        if !where_parts.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_parts.join(" AND "));
        }
    }

    /// Render one page query; returns the SQL and its bind values in order.
    pub fn build_page_sql(&self, request: &PageRequest) -> (String, Vec<CursorValue>) {
        let mut params = Vec::new();
        let mut sql = String::from("SELECT ");

        if request.columns.is_empty() {
            if self.has_joins() {
                sql.push_str(&format!("{}.*", table_alias(&self.base_table)));
            } else {
                sql.push('*');
            }
        } else {
            sql.push_str(&request.columns.join(", "));
        }

        self.push_from_and_where(&mut sql, request.condition.as_ref(), &mut params);

        if !request.order_by.is_empty() {
            let order = request
                .order_by
                .iter()
                .map(|c| format!("{} ASC", c.name))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!(" ORDER BY {order}"));
        }
        sql.push_str(&format!(" LIMIT {}", request.limit));

        (sql, params)
    }

    pub fn build_count_sql(&self) -> (String, Vec<CursorValue>) {
        let mut params = Vec::new();
        let mut sql = String::from("SELECT COUNT(*)");
        self.push_from_and_where(&mut sql, None, &mut params);
        (sql, params)
    }

    /// Render a DELETE of the in-scope rows matching `condition`. Joined
    /// scopes select the doomed identifiers in a subquery, since PostgreSQL
    /// DELETE cannot take a JOIN.
    pub fn build_delete_sql(
        &self,
        primary_key: &[KeyColumn],
        condition: &Condition,
    ) -> (String, Vec<CursorValue>) {
        let mut params = Vec::new();
        if !self.has_joins() {
            let mut sql = String::from("DELETE");
            self.push_from_and_where(&mut sql, Some(condition), &mut params);
            return (sql, params);
        }

        let selected = primary_key
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let targets = primary_key
            .iter()
            .map(KeyColumn::value_name)
            .collect::<Vec<_>>()
            .join(", ");
        let mut subquery = format!("SELECT {selected}");
        self.push_from_and_where(&mut subquery, Some(condition), &mut params);
        (
            format!(
                "DELETE FROM {} WHERE ({targets}) IN ({subquery})",
                self.base_table
            ),
            params,
        )
    }
}

/// `products p` selects through its alias `p`.
fn table_alias(base_table: &str) -> &str {
    base_table
        .split_whitespace()
        .last()
        .unwrap_or(base_table)
}

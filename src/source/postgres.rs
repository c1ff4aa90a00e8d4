//! PostgreSQL row source.
//!
//! Page, count and delete queries are rendered by [`QueryBuilder`] with `$n`
//! placeholders and bound from [`CursorValue`]s. Fetched columns are decoded by
//! their PostgreSQL type name; timestamps, dates and UUIDs come back as text
//! so they can be carried in a cursor. Key columns holding those types should
//! declare a cast (`KeyColumn::new("created_at").with_cast("timestamptz")`) so
//! the bound text compares as the original type.

use super::{PageRequest, Row, RowSource};
use crate::cursor::CursorValue;
use crate::error::{IterationError, Result};
use crate::query_builder::{Condition, KeyColumn, QueryBuilder};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{Column, PgPool, Postgres, Row as _, TypeInfo};
use tracing::debug;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
const TIMESTAMPTZ_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f%:z";

#[derive(Debug, Clone)]
pub struct PgRowSource {
    pool: PgPool,
    scope: QueryBuilder,
    primary_key: Vec<KeyColumn>,
}

impl PgRowSource {
    pub fn new<C: Into<KeyColumn>>(
        pool: PgPool,
        scope: QueryBuilder,
        primary_key: impl IntoIterator<Item = C>,
    ) -> Self {
        Self {
            pool,
            scope,
            primary_key: primary_key.into_iter().map(Into::into).collect(),
        }
    }

    pub fn scope(&self) -> &QueryBuilder {
        &self.scope
    }
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &CursorValue,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        CursorValue::Null => query.bind(None::<String>),
        CursorValue::Bool(b) => query.bind(*b),
        CursorValue::Integer(i) => query.bind(*i),
        CursorValue::Float(f) => query.bind(*f),
        CursorValue::String(s) => query.bind(s.clone()),
        CursorValue::Array(_) | CursorValue::Map(_) => {
            query.bind(sqlx::types::Json(value.to_json_lossy()))
        }
    }
}

fn decode_row(row: &PgRow) -> Result<Row> {
    let mut decoded = Row::new();
    for column in row.columns() {
        let index = column.ordinal();
        let type_name = column.type_info().name();
        let value = match type_name {
            "INT2" => row
                .try_get::<Option<i16>, _>(index)?
                .map(|v| CursorValue::Integer(i64::from(v))),
            "INT4" => row
                .try_get::<Option<i32>, _>(index)?
                .map(|v| CursorValue::Integer(i64::from(v))),
            "INT8" => row.try_get::<Option<i64>, _>(index)?.map(CursorValue::Integer),
            "FLOAT4" => row
                .try_get::<Option<f32>, _>(index)?
                .map(|v| CursorValue::Float(f64::from(v))),
            "FLOAT8" => row.try_get::<Option<f64>, _>(index)?.map(CursorValue::Float),
            "BOOL" => row.try_get::<Option<bool>, _>(index)?.map(CursorValue::Bool),
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
                row.try_get::<Option<String>, _>(index)?.map(CursorValue::String)
            }
            "UUID" => row
                .try_get::<Option<uuid::Uuid>, _>(index)?
                .map(|v| CursorValue::String(v.to_string())),
            "TIMESTAMPTZ" => row
                .try_get::<Option<DateTime<Utc>>, _>(index)?
                .map(|v| CursorValue::String(v.format(TIMESTAMPTZ_FORMAT).to_string())),
            "TIMESTAMP" => row
                .try_get::<Option<NaiveDateTime>, _>(index)?
                .map(|v| CursorValue::String(v.format(TIMESTAMP_FORMAT).to_string())),
            "DATE" => row
                .try_get::<Option<NaiveDate>, _>(index)?
                .map(|v| CursorValue::String(v.to_string())),
            "JSON" | "JSONB" => row
                .try_get::<Option<serde_json::Value>, _>(index)?
                .map(CursorValue::from),
            other => {
                return Err(IterationError::UnsupportedColumnType {
                    column: column.name().to_string(),
                    type_name: other.to_string(),
                })
            }
        };
        decoded.insert(column.name(), value.unwrap_or(CursorValue::Null));
    }
    Ok(decoded)
}

#[async_trait]
impl RowSource for PgRowSource {
    fn name(&self) -> &str {
        self.scope.base_table()
    }

    fn primary_key(&self) -> &[KeyColumn] {
        &self.primary_key
    }

    fn ordering_conflict(&self) -> Option<&'static str> {
        self.scope.ordering_conflict()
    }

    fn joins_tables(&self) -> bool {
        self.scope.has_joins()
    }

    async fn fetch(&self, request: &PageRequest) -> Result<Vec<Row>> {
        let (sql, params) = self.scope.build_page_sql(request);
        debug!(sql = %sql, params = params.len(), "Fetching page");

        let query = params
            .iter()
            .fold(sqlx::query(&sql), |query, value| bind_value(query, value));
        let rows = query.fetch_all(&self.pool).await?;

        rows.iter().map(decode_row).collect()
    }

    async fn delete(&self, condition: &Condition) -> Result<u64> {
        let (sql, params) = self.scope.build_delete_sql(&self.primary_key, condition);
        debug!(sql = %sql, params = params.len(), "Deleting batch");

        let query = params
            .iter()
            .fold(sqlx::query(&sql), |query, value| bind_value(query, value));
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn count(&self) -> Result<u64> {
        let (sql, params) = self.scope.build_count_sql();
        let query = params
            .iter()
            .fold(sqlx::query(&sql), |query, value| bind_value(query, value));
        let row = query.fetch_one(&self.pool).await?;
        let count: i64 = row.try_get(0)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

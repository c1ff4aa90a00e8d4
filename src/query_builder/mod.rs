//! # Query Builder
//!
//! SQL construction for resumable iteration.
//!
//! ## Key Components
//!
//! - [`builder`] - Base query scope (table, joins, filters) and page/count SQL rendering
//! - [`conditions`] - Condition tree shared by SQL rendering and in-memory evaluation,
//!   including the keyset predicate
//! - [`joins`] - JOIN clauses for base scopes
//! - [`pagination`] - Ordering keys and the keyset [`CursorPaginator`]
//!
//! ## Keyset predicate
//!
//! For a key `(created_at, id)` and position `(t, 3)` the paginator adds
//!
//! ```text
//! created_at > $1 OR (created_at = $2 AND id > $3)
//! ```
//!
//! and orders by `created_at ASC, id ASC`. No native row-value comparison is
//! used, so the same predicate can also be evaluated against in-memory rows.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use job_iteration::query_builder::{CursorPaginator, OrderingKey, QueryBuilder};
//!
//! let scope = QueryBuilder::new("products").where_eq("shop_id", 7);
//! let source = Arc::new(PgRowSource::new(pool, scope, ["id"]));
//! let key = OrderingKey::new(["created_at", "id"])?;
//! let mut paginator = CursorPaginator::new(source, key, cursor, 100)?;
//! while let Some(page) = paginator.next_page().await? {
//!     // ...
//! }
//! ```

pub mod builder;
pub mod conditions;
pub mod joins;
pub mod pagination;

pub use builder::QueryBuilder;
pub use conditions::{keyset_condition, CompareOp, Condition, KeyColumn, WhereClause};
pub use joins::{Join, JoinType};
pub use pagination::{CursorPaginator, OrderingKey, Page};

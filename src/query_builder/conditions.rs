use crate::cursor::CursorValue;
use crate::source::Row;
use std::cmp::Ordering;

/// A column referenced by a generated condition.
///
/// `name` is what goes into SQL and may be table-qualified (`products.id`).
/// Row values are looked up by the unqualified part. `cast` is appended to the
/// bound placeholder, e.g. `created_at > $1::timestamptz`, for columns whose
/// cursor value is carried as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyColumn {
    pub name: String,
    pub cast: Option<String>,
}

impl KeyColumn {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cast: None,
        }
    }

    pub fn with_cast(mut self, cast: impl Into<String>) -> Self {
        self.cast = Some(cast.into());
        self
    }

    /// Column name without a table qualifier.
    pub fn value_name(&self) -> &str {
        unqualified(&self.name)
    }

    pub fn is_qualified(&self) -> bool {
        self.name.contains('.')
    }

    fn placeholder(&self, params: &mut Vec<CursorValue>, value: &CursorValue) -> String {
        params.push(value.clone());
        match &self.cast {
            Some(cast) => format!("${}::{}", params.len(), cast),
            None => format!("${}", params.len()),
        }
    }
}

impl From<&str> for KeyColumn {
    fn from(name: &str) -> Self {
        KeyColumn::new(name)
    }
}

impl From<String> for KeyColumn {
    fn from(name: String) -> Self {
        KeyColumn::new(name)
    }
}

pub fn unqualified(column: &str) -> &str {
    column.rsplit('.').next().unwrap_or(column)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Gt,
    Gte,
}

impl CompareOp {
    fn as_sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
        }
    }

    fn admits(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Gte => ordering != Ordering::Less,
        }
    }
}

/// Generated conditions. They render to parameterized SQL for PostgreSQL and
/// evaluate directly against a [`Row`] for in-memory sources, so both kinds of
/// source share one predicate construction.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare {
        column: KeyColumn,
        op: CompareOp,
        value: CursorValue,
    },
    In {
        column: KeyColumn,
        values: Vec<CursorValue>,
    },
    TupleIn {
        columns: Vec<KeyColumn>,
        tuples: Vec<Vec<CursorValue>>,
    },
    All(Vec<Condition>),
    Any(Vec<Condition>),
}

impl Condition {
    pub fn compare(column: KeyColumn, op: CompareOp, value: CursorValue) -> Self {
        Condition::Compare { column, op, value }
    }

    /// Membership predicate for identifier re-queries: `col IN (...)` for a
    /// single identifier column, `(a, b) IN ((..), (..))` for a composite one.
    pub fn identifiers(columns: &[KeyColumn], tuples: Vec<Vec<CursorValue>>) -> Self {
        if columns.len() == 1 {
            Condition::In {
                column: columns[0].clone(),
                values: tuples
                    .into_iter()
                    .filter_map(|mut tuple| tuple.pop())
                    .collect(),
            }
        } else {
            Condition::TupleIn {
                columns: columns.to_vec(),
                tuples,
            }
        }
    }

    /// Render to SQL, pushing bound values onto `params` in placeholder order.
    pub fn to_sql(&self, params: &mut Vec<CursorValue>) -> String {
        match self {
            Condition::Compare { column, op, value } => {
                let placeholder = column.placeholder(params, value);
                format!("{} {} {}", column.name, op.as_sql(), placeholder)
            }
            Condition::In { column, values } => {
                if values.is_empty() {
                    return "1=0".to_string();
                }
                let list = values
                    .iter()
                    .map(|v| column.placeholder(params, v))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{} IN ({list})", column.name)
            }
            Condition::TupleIn { columns, tuples } => {
                if tuples.is_empty() {
                    return "1=0".to_string();
                }
                let names = columns
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                let rows = tuples
                    .iter()
                    .map(|tuple| {
                        let values = columns
                            .iter()
                            .zip(tuple.iter())
                            .map(|(c, v)| c.placeholder(params, v))
                            .collect::<Vec<_>>()
                            .join(", ");
                        format!("({values})")
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("({names}) IN ({rows})")
            }
            Condition::All(conditions) => join_sql(conditions, " AND ", params),
            Condition::Any(conditions) => join_sql(conditions, " OR ", params),
        }
    }

    /// Evaluate against a row using SQL comparison semantics (null never matches).
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Condition::Compare { column, op, value } => row
                .get(column.value_name())
                .and_then(|actual| actual.compare(value))
                .is_some_and(|ordering| op.admits(ordering)),
            Condition::In { column, values } => row.get(column.value_name()).is_some_and(|actual| {
                values
                    .iter()
                    .any(|v| actual.compare(v) == Some(Ordering::Equal))
            }),
            Condition::TupleIn { columns, tuples } => tuples.iter().any(|tuple| {
                columns.iter().zip(tuple.iter()).all(|(column, v)| {
                    row.get(column.value_name())
                        .and_then(|actual| actual.compare(v))
                        == Some(Ordering::Equal)
                })
            }),
            Condition::All(conditions) => conditions.iter().all(|c| c.matches(row)),
            Condition::Any(conditions) => conditions.iter().any(|c| c.matches(row)),
        }
    }
}

fn join_sql(conditions: &[Condition], operator: &str, params: &mut Vec<CursorValue>) -> String {
    match conditions.len() {
        0 => "1=1".to_string(),
        1 => conditions[0].to_sql(params),
        _ => {
            let parts = conditions
                .iter()
                .map(|c| c.to_sql(params))
                .collect::<Vec<_>>();
            format!("({})", parts.join(operator))
        }
    }
}

/// Build the keyset ("seek") predicate admitting only rows strictly after
/// `position` in the lexicographic order of `columns`.
///
/// Built from the least significant component outwards:
/// `cN > vN`, then `ci > vi OR (ci = vi AND <inner>)`. A position shorter than
/// the key is a prefix; its innermost comparison is inclusive (`>=`).
/// Returns `None` for an empty position (start from the beginning).
pub fn keyset_condition(columns: &[KeyColumn], position: &[CursorValue]) -> Option<Condition> {
    let last = position.len().checked_sub(1)?;
    let innermost_op = if position.len() == columns.len() {
        CompareOp::Gt
    } else {
        CompareOp::Gte
    };

    let mut condition = Condition::compare(
        columns[last].clone(),
        innermost_op,
        position[last].clone(),
    );
    for i in (0..last).rev() {
        condition = Condition::Any(vec![
            Condition::compare(columns[i].clone(), CompareOp::Gt, position[i].clone()),
            Condition::All(vec![
                Condition::compare(columns[i].clone(), CompareOp::Eq, position[i].clone()),
                condition,
            ]),
        ]);
    }
    Some(condition)
}

/// Conditions accepted in a base query scope.
#[derive(Debug, Clone, PartialEq)]
pub enum WhereClause {
    /// Caller-written SQL, used verbatim.
    Raw(String),
    Condition(Condition),
}

impl WhereClause {
    pub fn raw(sql: &str) -> Self {
        WhereClause::Raw(sql.to_string())
    }

    pub fn eq(column: &str, value: impl Into<CursorValue>) -> Self {
        WhereClause::Condition(Condition::compare(
            KeyColumn::new(column),
            CompareOp::Eq,
            value.into(),
        ))
    }

    pub fn to_sql(&self, params: &mut Vec<CursorValue>) -> String {
        match self {
            WhereClause::Raw(sql) => format!("({sql})"),
            WhereClause::Condition(condition) => condition.to_sql(params),
        }
    }
}

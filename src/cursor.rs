//! # Cursor values
//!
//! A cursor marks the last fully processed item of a producer. Database-backed
//! producers build it from the ordering-key columns of the last row: a scalar
//! for a single-column key, an array for a composite key. Nested producers emit
//! an array with one slot per level, `Null` marking an empty slot.
//!
//! Cursors are persisted into the job record between attempts, so every value
//! must survive a JSON round trip. [`CursorValue::to_json`] is the strict
//! conversion used for that check; [`CursorValue::to_json_lossy`] is what the
//! warn-only validation mode persists instead.

use crate::error::{IterationError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CursorValue {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Array(Vec<CursorValue>),
    Map(BTreeMap<String, CursorValue>),
}

impl CursorValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[CursorValue]> {
        match self {
            Self::Array(values) => Some(values),
            _ => None,
        }
    }

    /// Collapse a list of key values into the cursor shape producers emit:
    /// the bare value for one column, an array otherwise.
    pub fn from_components(mut components: Vec<CursorValue>) -> Self {
        if components.len() == 1 {
            components.remove(0)
        } else {
            Self::Array(components)
        }
    }

    /// Inverse of [`CursorValue::from_components`].
    ///
    /// A scalar is a one-component position. An array is always a tuple of
    /// components, including `[x]` on a single-column key; partial and
    /// over-long tuples pass through for the key to validate.
    pub fn into_components(self) -> Vec<CursorValue> {
        match self {
            Self::Null => Vec::new(),
            Self::Array(values) => values,
            other => vec![other],
        }
    }

    /// Strict JSON conversion. Fails for values JSON cannot represent.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Integer(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .ok_or_else(|| IterationError::InvalidCursor {
                    reason: format!("non-finite float {f}"),
                    cursor: self.clone(),
                })?,
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Array(values) => serde_json::Value::Array(
                values
                    .iter()
                    .map(CursorValue::to_json)
                    .collect::<Result<Vec<_>>>()?,
            ),
            Self::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), v.to_json()?)))
                    .collect::<Result<serde_json::Map<_, _>>>()?,
            ),
        })
    }

    /// JSON conversion that replaces unrepresentable floats with null.
    pub fn to_json_lossy(&self) -> serde_json::Value {
        match self {
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::Array(values) => {
                serde_json::Value::Array(values.iter().map(CursorValue::to_json_lossy).collect())
            }
            Self::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json_lossy()))
                    .collect(),
            ),
            other => other
                .to_json()
                .unwrap_or(serde_json::Value::Null),
        }
    }

    /// Whether the value can be persisted and read back unchanged.
    pub fn validate(&self) -> Result<()> {
        self.to_json().map(|_| ())
    }

    /// Ordering used by in-memory sources and the keyset predicate evaluator.
    ///
    /// Mirrors SQL comparison: anything compared with `Null` is unordered, and
    /// integers and floats compare numerically.
    pub fn compare(&self, other: &CursorValue) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, _) | (_, Self::Null) => None,
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
            (Self::Integer(a), Self::Float(b)) => (*a as f64).partial_cmp(b),
            (Self::Float(a), Self::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Array(a), Self::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.compare(y)? {
                        Ordering::Equal => continue,
                        non_eq => return Some(non_eq),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            _ => None,
        }
    }

    /// Total order for sorting rows; nulls sort last like PostgreSQL's
    /// default `ASC NULLS LAST`.
    pub fn sort_cmp(&self, other: &CursorValue) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => self.compare(other).unwrap_or(Ordering::Equal),
        }
    }
}

impl From<serde_json::Value> for CursorValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(values) => {
                Self::Array(values.into_iter().map(CursorValue::from).collect())
            }
            serde_json::Value::Object(entries) => Self::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, CursorValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<i64> for CursorValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for CursorValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<usize> for CursorValue {
    fn from(value: usize) -> Self {
        Self::Integer(value as i64)
    }
}

impl From<f64> for CursorValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for CursorValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for CursorValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for CursorValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl<T: Into<CursorValue>> From<Option<T>> for CursorValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<CursorValue>> From<Vec<T>> for CursorValue {
    fn from(values: Vec<T>) -> Self {
        Self::Array(values.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for CursorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json_lossy())
    }
}

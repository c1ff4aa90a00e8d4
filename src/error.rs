//! Error types for the iteration engine.
//!
//! Configuration errors are raised synchronously while a producer or driver is
//! being set up and are never retried by this engine. Errors raised by the
//! caller's per-item work are not represented here: the driver hands them back
//! untouched through [`RunError::Job`] so the host framework's own retry policy
//! applies to them.

use crate::cursor::CursorValue;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IterationError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Configuration error: must specify at least one ordering column")]
    EmptyOrderingKey,

    #[error(
        "Configuration error: the query cannot use {clause} because iteration builds its own ordering \
         and page limit; restrict rows with a WHERE condition on the key columns instead"
    )]
    OrderingConflict { clause: &'static str },

    #[error("Configuration error: column '{column}' must be fully qualified when the source joins other tables")]
    UnqualifiedJoinColumn { column: String },

    #[error("Configuration error: page size must be greater than zero")]
    InvalidPageSize,

    #[error("Configuration error: invalid position for ordering key {columns:?}: {reason}")]
    InvalidPosition { columns: Vec<String>, reason: String },

    #[error("Configuration error: nested producer requires at least one factory")]
    EmptyNestedProducer,

    #[error("Configuration error: cursor should have one slot per nested level (expected {expected}, got {actual})")]
    NestedCursorArity { expected: usize, actual: usize },

    #[error(
        "Configuration error: max runtime may only decrease; {job_class} tried to increase it \
         from {global:?} to {requested:?}"
    )]
    RuntimeWidened {
        job_class: String,
        global: Duration,
        requested: Duration,
    },

    #[error(
        "Cursor must be composed of values capable of JSON round-tripping: strings, integers, \
         finite floats, arrays, maps, booleans or null: {reason} ({cursor:?})"
    )]
    InvalidCursor { reason: String, cursor: CursorValue },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Unsupported column type '{type_name}' for column '{column}'")]
    UnsupportedColumnType { column: String, type_name: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid state transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },

    #[error("Reenqueue failed: {0}")]
    Reenqueue(String),
}

/// Coarse classification used in log fields and by hosts deciding whether an
/// attempt should be retried at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Cursor,
    Source,
    Internal,
}

impl IterationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_)
            | Self::EmptyOrderingKey
            | Self::OrderingConflict { .. }
            | Self::UnqualifiedJoinColumn { .. }
            | Self::InvalidPageSize
            | Self::InvalidPosition { .. }
            | Self::EmptyNestedProducer
            | Self::NestedCursorArity { .. }
            | Self::RuntimeWidened { .. } => ErrorKind::Configuration,
            Self::InvalidCursor { .. } => ErrorKind::Cursor,
            Self::Database(_) | Self::UnsupportedColumnType { .. } | Self::Serialization(_) => {
                ErrorKind::Source
            }
            Self::InvalidTransition { .. } | Self::Reenqueue(_) => ErrorKind::Internal,
        }
    }

    /// Configuration and cursor errors describe a broken job definition; running
    /// the same job again cannot succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Source | ErrorKind::Internal)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

impl From<sqlx::Error> for IterationError {
    fn from(err: sqlx::Error) -> Self {
        IterationError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for IterationError {
    fn from(err: serde_json::Error) -> Self {
        IterationError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for IterationError {
    fn from(err: config::ConfigError) -> Self {
        IterationError::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IterationError>;

/// Failure of a single driver run.
///
/// `Job` carries the caller's own error exactly as it was returned from a hook,
/// the producer builder, or per-item work.
#[derive(Debug, Error)]
pub enum RunError<E> {
    #[error(transparent)]
    Iteration(#[from] IterationError),

    #[error("Job error: {0}")]
    Job(E),
}

impl<E> RunError<E> {
    pub fn into_job_error(self) -> Option<E> {
        match self {
            RunError::Job(err) => Some(err),
            RunError::Iteration(_) => None,
        }
    }

    pub fn as_iteration_error(&self) -> Option<&IterationError> {
        match self {
            RunError::Iteration(err) => Some(err),
            RunError::Job(_) => None,
        }
    }
}

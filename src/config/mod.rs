//! # Iteration Configuration
//!
//! Process-wide settings for the iteration engine, plus the per-job overrides a
//! job class may declare.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use job_iteration::config::ConfigLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::new()
//!     .with_file("config/job_iteration.toml")
//!     .load()?;
//! println!("max runtime: {:?}", config.max_job_runtime());
//! # Ok(())
//! # }
//! ```

pub mod loader;

use crate::error::{IterationError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use loader::ConfigLoader;

/// How the driver treats a cursor that cannot round-trip through JSON.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorValidation {
    /// Fail the attempt.
    #[default]
    Strict,
    /// Log a warning and persist the lossy JSON form.
    Warn,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IterationConfig {
    /// Upper bound on a single attempt's running time. Unset means unbounded.
    pub max_job_runtime_seconds: Option<u64>,
    /// Delay before an interrupted job runs again, unless a throttle or retry
    /// step asks for its own.
    pub default_retry_backoff_seconds: Option<u64>,
    /// Name of the interruption adapter to consult between items.
    pub queue_adapter: String,
    pub cursor_validation: CursorValidation,
    /// Page size used by batch producers when a job does not choose one.
    pub default_batch_size: usize,
}

impl Default for IterationConfig {
    fn default() -> Self {
        Self {
            max_job_runtime_seconds: None,
            default_retry_backoff_seconds: None,
            queue_adapter: "inline".to_string(),
            cursor_validation: CursorValidation::Strict,
            default_batch_size: 100,
        }
    }
}

impl IterationConfig {
    pub fn max_job_runtime(&self) -> Option<Duration> {
        self.max_job_runtime_seconds.map(Duration::from_secs)
    }

    pub fn default_retry_backoff(&self) -> Option<Duration> {
        self.default_retry_backoff_seconds.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_batch_size == 0 {
            return Err(IterationError::configuration(
                "default_batch_size must be greater than zero",
            ));
        }
        if self.max_job_runtime_seconds == Some(0) {
            return Err(IterationError::configuration(
                "max_job_runtime_seconds must be greater than zero when set",
            ));
        }
        if self.queue_adapter.trim().is_empty() {
            return Err(IterationError::configuration("queue_adapter cannot be empty"));
        }
        Ok(())
    }

    /// Combine with a job's own settings for one attempt.
    ///
    /// A job may shorten the global runtime limit but never lengthen it.
    pub fn resolve(&self, job_class: &str, settings: &JobSettings) -> Result<ResolvedSettings> {
        let global = self.max_job_runtime();
        let max_runtime = match (global, settings.max_runtime) {
            (Some(global), Some(requested)) if requested > global => {
                return Err(IterationError::RuntimeWidened {
                    job_class: job_class.to_string(),
                    global,
                    requested,
                })
            }
            (_, Some(requested)) => Some(requested),
            (global, None) => global,
        };

        Ok(ResolvedSettings {
            max_runtime,
            cursor_validation: settings
                .cursor_validation
                .unwrap_or(self.cursor_validation),
            default_retry_backoff: self.default_retry_backoff(),
        })
    }
}

/// Per-job overrides declared by a job class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobSettings {
    pub max_runtime: Option<Duration>,
    pub cursor_validation: Option<CursorValidation>,
}

impl JobSettings {
    pub fn with_max_runtime(mut self, max_runtime: Duration) -> Self {
        self.max_runtime = Some(max_runtime);
        self
    }

    pub fn with_cursor_validation(mut self, validation: CursorValidation) -> Self {
        self.cursor_validation = Some(validation);
        self
    }
}

/// Effective settings of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedSettings {
    pub max_runtime: Option<Duration>,
    pub cursor_validation: CursorValidation,
    pub default_retry_backoff: Option<Duration>,
}

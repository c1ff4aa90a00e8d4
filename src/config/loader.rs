//! Configuration loading.
//!
//! Sources are layered in order: built-in defaults, an optional TOML file, then
//! `JOB_ITERATION__*` environment variables (for example
//! `JOB_ITERATION__MAX_JOB_RUNTIME_SECONDS=300`). The merged result is
//! validated before it is returned.

use super::IterationConfig;
use crate::error::Result;
use config::{Config, Environment, File, FileFormat};
use std::path::PathBuf;
use tracing::{debug, info};

pub const ENV_PREFIX: &str = "JOB_ITERATION";

#[derive(Debug, Clone)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    env_prefix: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            file: None,
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    /// Read a TOML file if it exists. A missing file is not an error.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Use a different environment prefix, mainly so tests do not collide.
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = prefix.to_string();
        self
    }

    pub fn load(&self) -> Result<IterationConfig> {
        let defaults = IterationConfig::default();
        let mut builder = Config::builder()
            .set_default("queue_adapter", defaults.queue_adapter.clone())?
            .set_default("cursor_validation", "strict")?
            .set_default("default_batch_size", defaults.default_batch_size as i64)?;

        if let Some(path) = &self.file {
            debug!(path = %path.display(), "Loading iteration configuration file");
            builder = builder.add_source(
                File::from(path.as_path())
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix(&self.env_prefix)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: IterationConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        info!(
            queue_adapter = %config.queue_adapter,
            max_job_runtime_seconds = ?config.max_job_runtime_seconds,
            default_batch_size = config.default_batch_size,
            "⚙️ Iteration configuration loaded"
        );
        Ok(config)
    }
}

//! # Structured Logging Module
//!
//! Environment-aware `tracing` setup and the structured events the iteration
//! driver emits over a job's lifecycle.
//!
//! Hosts that already install a global subscriber can skip
//! [`init_structured_logging`]; the driver's events go to whatever subscriber
//! is active.

use crate::iteration::JobRecord;
use std::fmt;
use std::sync::OnceLock;
use tracing_subscriber::{fmt as fmt_layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration.
///
/// `RUST_LOG` takes precedence over the environment-derived level.
/// `LOG_FORMAT=json` switches to JSON lines.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));
        let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

        let registry = tracing_subscriber::registry().with(filter);
        let result = if json {
            registry
                .with(fmt_layer::layer().with_target(true).json())
                .try_init()
        } else {
            registry
                .with(fmt_layer::layer().with_target(true).with_ansi(true))
                .try_init()
        };

        // A global subscriber may already be set by the host; keep using it.
        if result.is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            environment = %environment,
            json = json,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("JOB_ITERATION_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        "test" => "warn",
        _ => "debug",
    }
}

/// Lifecycle events of an iteration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationEvent {
    BuildProducer,
    NilProducer,
    Resumed,
    EachIteration,
    NotFound,
    Interrupted,
    Throttled,
    Completed,
    Aborted,
}

impl IterationEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::BuildProducer => "build_producer",
            Self::NilProducer => "nil_producer",
            Self::Resumed => "resumed",
            Self::EachIteration => "each_iteration",
            Self::NotFound => "not_found",
            Self::Interrupted => "interrupted",
            Self::Throttled => "throttled",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for IterationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Log structured data for an iteration lifecycle event.
///
/// Per-item events are logged at debug level, everything else at info.
pub fn log_iteration_event(event: IterationEvent, record: &JobRecord) {
    let cursor_position = record
        .iteration
        .cursor_position
        .as_ref()
        .map(|c| c.to_string())
        .unwrap_or_else(|| "null".to_string());

    match event {
        IterationEvent::EachIteration => tracing::debug!(
            event = %event,
            job_class = %record.job_class,
            job_id = %record.job_id,
            cursor_position = %cursor_position,
            "🔁 ITERATION"
        ),
        _ => tracing::info!(
            event = %event,
            job_class = %record.job_class,
            job_id = %record.job_id,
            cursor_position = %cursor_position,
            times_interrupted = record.iteration.times_interrupted,
            total_time = record.iteration.total_time,
            executions = record.executions,
            "🔁 ITERATION"
        ),
    }
}

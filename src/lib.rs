#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Job Iteration
//!
//! Interruptible, resumable background jobs for Rust.
//!
//! ## Overview
//!
//! A long-running job is split into a sequence of small items produced by an
//! enumerator-like [`producer`]. After every item the driver checkpoints a
//! cursor into the persisted [`iteration::JobRecord`]. When the job runs out of
//! its runtime budget, when the host process is shutting down, or when the job
//! is throttled, the driver stops, hands the job back to the queue and the next
//! attempt resumes right after the last checkpoint.
//!
//! ## Module Organization
//!
//! - [`iteration`] - Job contract, persisted record and the driver
//! - [`producer`] - Pull producers: arrays, records, batches, nested, throttled
//! - [`query_builder`] - Keyset pagination over ordered queries
//! - [`source`] - Row sources (PostgreSQL via SQLx, in-memory)
//! - [`cursor`] - Cursor values and their persisted form
//! - [`interruption`] - Shutdown probes per queue adapter
//! - [`state_machine`] - Lifecycle states of a single attempt
//! - [`config`] - Configuration management
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup and lifecycle events
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use job_iteration::config::ConfigLoader;
//! use job_iteration::iteration::{ChannelReenqueuer, IterationDriver};
//! use std::sync::Arc;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! job_iteration::logging::init_structured_logging();
//!
//! let config = ConfigLoader::new().with_file("config/job_iteration.toml").load()?;
//! let (reenqueuer, _requests) = ChannelReenqueuer::new();
//! let driver = IterationDriver::new(config, Arc::new(reenqueuer));
//!
//! println!("default batch size: {}", driver.producers().default_batch_size());
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # All tests; PostgreSQL tests need DATABASE_URL
//! ```

pub mod config;
pub mod cursor;
pub mod error;
pub mod interruption;
pub mod iteration;
pub mod logging;
pub mod producer;
pub mod query_builder;
pub mod source;
pub mod state_machine;
pub mod test_utils;

pub use config::{ConfigLoader, CursorValidation, IterationConfig, JobSettings, ResolvedSettings};
pub use cursor::CursorValue;
pub use error::{ErrorKind, IterationError, Result, RunError};
pub use interruption::{InterruptionProbe, InterruptionRegistry, NeverInterrupt, ShutdownFlag};
pub use iteration::{
    ChannelReenqueuer, InterruptReason, IterationDriver, IterationJob, IterationOutcome,
    IterationState, IterationStep, JobRecord, Reenqueue, ReenqueueRequest,
};
pub use producer::{BoxProducer, Produced, Producer, ProducerBuilder};
pub use query_builder::{CursorPaginator, OrderingKey, QueryBuilder};
pub use source::{MemoryRowSource, Row, RowSource, SharedSource};
pub use state_machine::{DriverEvent, DriverState, IterationStateMachine};

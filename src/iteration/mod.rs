//! # Iteration Jobs
//!
//! The job contract, the persisted job record, the re-enqueue seam and the
//! driver that runs one attempt of a job against all of them.

pub mod driver;
pub mod job;
pub mod record;
pub mod reenqueue;

pub use driver::{InterruptReason, IterationDriver, IterationOutcome};
pub use job::{IterationJob, IterationStep};
pub use record::{IterationState, JobRecord};
pub use reenqueue::{ChannelReenqueuer, Reenqueue, ReenqueueRequest};

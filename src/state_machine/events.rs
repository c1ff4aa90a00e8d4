use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Events that move a driver attempt between states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum DriverEvent {
    /// Start building the producer
    Build,
    /// The builder returned a producer
    Built,
    /// The builder returned nothing to iterate
    BuiltNothing,
    /// The runtime budget ran out or the queue asked the job to stop
    Interrupt,
    /// A throttled producer asked to resume after a backoff
    Throttle(Duration),
    /// Per-item work asked to run the rest later
    Retry(Duration),
    /// Per-item work asked to stop for good
    Abort { skip_complete: bool },
    /// The producer has no more items
    Exhaust,
    /// Re-enqueue has been requested
    Reenqueue,
    /// The completion hook has run
    Complete,
    /// Abort handling is finished
    Stop,
}

impl DriverEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Built => "built",
            Self::BuiltNothing => "built_nothing",
            Self::Interrupt => "interrupt",
            Self::Throttle(_) => "throttle",
            Self::Retry(_) => "retry",
            Self::Abort { .. } => "abort",
            Self::Exhaust => "exhaust",
            Self::Reenqueue => "reenqueue",
            Self::Complete => "complete",
            Self::Stop => "stop",
        }
    }

    /// Re-enqueue delay demanded by this event, overriding the default.
    pub fn backoff(&self) -> Option<Duration> {
        match self {
            Self::Throttle(backoff) | Self::Retry(backoff) => Some(*backoff),
            _ => None,
        }
    }
}

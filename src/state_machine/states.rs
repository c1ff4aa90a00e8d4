use serde::{Deserialize, Serialize};
use std::fmt;

/// States of one driver attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverState {
    /// Attempt accepted, nothing built yet
    #[default]
    Init,
    /// Producer is being constructed from the persisted cursor
    Building,
    /// Consuming items
    Running,
    /// Stopping early; the job will be re-enqueued
    Interrupting,
    /// Per-item work asked to stop for good
    Aborting,
    /// The producer is exhausted
    Completing,
    /// The builder returned no producer
    Skipped,
    /// Re-enqueue was requested with the current cursor
    Reenqueued,
    /// Iteration finished and the completion hook ran
    Completed,
    /// Iteration was aborted
    Aborted,
}

impl DriverState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Skipped | Self::Reenqueued | Self::Completed | Self::Aborted
        )
    }

    /// States in which the producer was built, so the shutdown hook must run.
    pub fn reached_running(&self) -> bool {
        matches!(
            self,
            Self::Running
                | Self::Interrupting
                | Self::Aborting
                | Self::Completing
                | Self::Reenqueued
                | Self::Completed
                | Self::Aborted
        )
    }
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::Building => write!(f, "building"),
            Self::Running => write!(f, "running"),
            Self::Interrupting => write!(f, "interrupting"),
            Self::Aborting => write!(f, "aborting"),
            Self::Completing => write!(f, "completing"),
            Self::Skipped => write!(f, "skipped"),
            Self::Reenqueued => write!(f, "reenqueued"),
            Self::Completed => write!(f, "completed"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

impl std::str::FromStr for DriverState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "init" => Ok(Self::Init),
            "building" => Ok(Self::Building),
            "running" => Ok(Self::Running),
            "interrupting" => Ok(Self::Interrupting),
            "aborting" => Ok(Self::Aborting),
            "completing" => Ok(Self::Completing),
            "skipped" => Ok(Self::Skipped),
            "reenqueued" => Ok(Self::Reenqueued),
            "completed" => Ok(Self::Completed),
            "aborted" => Ok(Self::Aborted),
            _ => Err(format!("Invalid driver state: {s}")),
        }
    }
}

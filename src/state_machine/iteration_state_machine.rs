use super::{events::DriverEvent, states::DriverState};
use crate::error::{IterationError, Result};
use std::time::Duration;
use tracing::trace;

/// A recorded state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: DriverState,
    pub to: DriverState,
    pub event: &'static str,
}

/// In-memory state machine for a single driver attempt.
///
/// Besides the current state it remembers what the leaving events carried:
/// the backoff demanded by a throttle or retry, and whether an abort asked to
/// skip the completion hook.
#[derive(Debug, Clone, Default)]
pub struct IterationStateMachine {
    state: DriverState,
    backoff: Option<Duration>,
    skip_complete: bool,
    history: Vec<Transition>,
}

impl IterationStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_state(&self) -> DriverState {
        self.state
    }

    pub fn history(&self) -> &[Transition] {
        &self.history
    }

    /// Backoff requested by the event that started the interruption, if any.
    pub fn requested_backoff(&self) -> Option<Duration> {
        self.backoff
    }

    pub fn skip_complete(&self) -> bool {
        self.skip_complete
    }

    /// Attempt to transition the attempt state
    pub fn transition(&mut self, event: DriverEvent) -> Result<DriverState> {
        let target = Self::determine_target_state(self.state, &event)?;

        if let Some(backoff) = event.backoff() {
            self.backoff = Some(backoff);
        }
        if let DriverEvent::Abort { skip_complete } = event {
            self.skip_complete = skip_complete;
        }

        trace!(from = %self.state, to = %target, event = event.event_type(), "Driver transition");
        self.history.push(Transition {
            from: self.state,
            to: target,
            event: event.event_type(),
        });
        self.state = target;
        Ok(target)
    }

    /// Determine the target state based on current state and event
    fn determine_target_state(current: DriverState, event: &DriverEvent) -> Result<DriverState> {
        let target = match (current, event) {
            (DriverState::Init, DriverEvent::Build) => DriverState::Building,

            (DriverState::Building, DriverEvent::Built) => DriverState::Running,
            (DriverState::Building, DriverEvent::BuiltNothing) => DriverState::Skipped,

            // Leaving the item loop
            (DriverState::Running, DriverEvent::Interrupt)
            | (DriverState::Running, DriverEvent::Throttle(_))
            | (DriverState::Running, DriverEvent::Retry(_)) => DriverState::Interrupting,
            (DriverState::Running, DriverEvent::Abort { .. }) => DriverState::Aborting,
            (DriverState::Running, DriverEvent::Exhaust) => DriverState::Completing,

            // Finishing
            (DriverState::Interrupting, DriverEvent::Reenqueue) => DriverState::Reenqueued,
            (DriverState::Completing, DriverEvent::Complete) => DriverState::Completed,
            (DriverState::Aborting, DriverEvent::Stop) => DriverState::Aborted,

            // Invalid transitions
            (from_state, _) => {
                return Err(IterationError::InvalidTransition {
                    from: from_state.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }
}

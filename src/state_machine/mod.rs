// State machine for a single iteration attempt.
//
// The driver moves through Init -> Building -> Running, leaves the item loop
// through Interrupting, Aborting or Completing, and ends in one of the terminal
// states Skipped, Reenqueued, Completed or Aborted.

pub mod events;
pub mod iteration_state_machine;
pub mod states;

// Re-export main types for convenient access
pub use events::DriverEvent;
pub use iteration_state_machine::{IterationStateMachine, Transition};
pub use states::DriverState;

//! Core conversation state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions: the
//! runtime feeds inbound voter/volunteer/admin events through `transition`
//! and interprets the resulting effects.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::Event;
pub use state::{RouterContext, VoterState};
pub use transition::{transition, TransitionError, TransitionResult, RE_ENGAGEMENT_THRESHOLD_SECS};

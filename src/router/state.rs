//! Voter conversation states

use crate::store::VoterSession;
use serde::{Deserialize, Serialize};

/// Where a voter is in the conversation flow.
///
/// Not stored redundantly: computed from the session's stored flags at load
/// time, so the flags in the cache stay the single source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoterState {
    /// First-ever inbound message, no session yet
    New,
    /// Session exists, voter has not agreed to the program terms
    AwaitingDisclaimer,
    /// Terms agreed, U.S. state not yet captured
    AwaitingState,
    /// Handed off to a volunteer pool, automated replies still possible
    RoutedAutomated,
    /// A human volunteer has replied; automation permanently off
    VolunteerEngaged,
}

impl VoterState {
    /// Derive the state from stored session flags.
    ///
    /// `push_line` sessions were initiated by us, so disclaimer and state
    /// capture are bypassed entirely.
    pub fn of(session: &VoterSession, push_line: bool) -> Self {
        if session.volunteer_engaged {
            VoterState::VolunteerEngaged
        } else if push_line {
            VoterState::RoutedAutomated
        } else if !session.confirmed_disclaimer {
            VoterState::AwaitingDisclaimer
        } else if session.state_name.is_none() {
            VoterState::AwaitingState
        } else {
            VoterState::RoutedAutomated
        }
    }
}

/// Immutable per-request context for a transition
#[derive(Debug, Clone, Copy)]
pub struct RouterContext {
    /// Whether the gateway line is a push (outbound-initiated) entry point
    pub push_line: bool,
}

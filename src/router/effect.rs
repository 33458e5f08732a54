//! Effects produced by state transitions
//!
//! The transition function is pure; everything with a side effect is
//! described here as data and interpreted by the runtime in order.

use crate::replies::Reply;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Relay the inbound voter text verbatim into the currently active
    /// volunteer thread. Always emitted before any state mutation so
    /// volunteers see the message that caused the transition.
    RelayToActiveThread { text: String },

    /// Send an automated reply to the voter over the SMS gateway
    SendVoter { reply: Reply },

    /// First contact: open this voter's thread in the lobby channel,
    /// announce them, and record the reverse lookup
    OpenLobbyThread,

    /// Session mutation: the voter agreed to the program terms
    SetConfirmedDisclaimer,

    /// Session mutation: the voter's U.S. state was classified
    SetStateName { name: String },

    /// Session mutation: a human volunteer has replied (idempotent)
    MarkVolunteerEngaged,

    /// Session mutation: note when the voter last texted
    TouchLastVoterMessage { secs: i64 },

    /// Hand off to a state volunteer pool chosen by the load balancer
    RouteToPool { state_name: String },

    /// Admin-initiated hand-off to a specific channel
    RouteToChannel {
        channel_name: String,
        channel_id: String,
        actor: String,
        source_channel_id: String,
    },

    /// Relay a volunteer's reply out to the voter over SMS
    RelaySmsToVoter { text: String, sender_name: String },

    /// Tell a volunteer who replied in a stale thread that it is inactive,
    /// naming the channel that is actually active
    NotifyInactiveThread,
}

//! Events fed into the conversation state machine

/// One inbound occurrence the router must react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// An SMS from the voter
    VoterMessage { text: String, now_secs: i64 },

    /// A volunteer (or any human) replied in one of the voter's threads.
    /// `from_active_thread` is resolved by the runtime before dispatch.
    VolunteerReply {
        text: String,
        sender_name: String,
        from_active_thread: bool,
    },

    /// An operator asked to re-route this voter to a specific channel.
    /// The destination was already resolved against the channel directory.
    AdminRoute {
        destination_channel_name: String,
        destination_channel_id: String,
        /// Admin display name, shown in operator-visible notices
        actor: String,
        /// Channel the command was issued from
        source_channel_id: String,
    },
}

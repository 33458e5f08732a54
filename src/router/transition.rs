//! Pure state transition function
//!
//! The whole transition table lives in one match so it can be read
//! top to bottom against the session lifecycle: first contact, disclaimer,
//! state capture, hand-off, engaged relay.

use super::{Event, RouterContext, VoterState};
use crate::classify::classify;
use crate::replies::Reply;
use crate::router::Effect;
use crate::store::VoterSession;
use crate::text::is_agreement;
use thiserror::Error;

/// Quiet period after which a returning voter gets a welcome-back text
pub const RE_ENGAGEMENT_THRESHOLD_SECS: i64 = 60 * 60;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: VoterState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: VoterState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error)]
pub enum TransitionError {
    /// Re-routing to the channel that is already active is a reported
    /// no-op, never a thread open or a session mutation
    #[error("voter is already routed to {channel_name}")]
    DestinationAlreadyActive { channel_name: String },
}

/// Pure transition function: given the same state, session snapshot, and
/// event, always the same next state and effects, with no I/O.
pub fn transition(
    state: VoterState,
    session: &VoterSession,
    context: RouterContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // ============================================================
        // First contact: session was just created by the runtime
        // ============================================================
        (VoterState::New, Event::VoterMessage { now_secs, .. }) => {
            if context.push_line {
                // Push entry point: we initiated contact, consent was
                // collected out of band, skip disclaimer and state capture
                Ok(TransitionResult::new(VoterState::RoutedAutomated)
                    .with_effect(Effect::OpenLobbyThread)
                    .with_effect(Effect::SetConfirmedDisclaimer)
                    .with_effect(Effect::TouchLastVoterMessage { secs: now_secs }))
            } else {
                Ok(TransitionResult::new(VoterState::AwaitingDisclaimer)
                    .with_effect(Effect::OpenLobbyThread)
                    .with_effect(Effect::SendVoter {
                        reply: Reply::Welcome,
                    })
                    .with_effect(Effect::TouchLastVoterMessage { secs: now_secs }))
            }
        }

        // ============================================================
        // Disclaimer confirmation
        // ============================================================
        (VoterState::AwaitingDisclaimer, Event::VoterMessage { text, now_secs }) => {
            let result = TransitionResult::new(VoterState::AwaitingDisclaimer)
                .with_effect(Effect::RelayToActiveThread { text: text.clone() });
            if is_agreement(&text) {
                Ok(TransitionResult {
                    new_state: VoterState::AwaitingState,
                    ..result
                }
                .with_effect(Effect::SetConfirmedDisclaimer)
                .with_effect(Effect::SendVoter {
                    reply: Reply::StateQuestion,
                })
                .with_effect(Effect::TouchLastVoterMessage { secs: now_secs }))
            } else {
                Ok(result
                    .with_effect(Effect::SendVoter {
                        reply: Reply::ClarifyDisclaimer,
                    })
                    .with_effect(Effect::TouchLastVoterMessage { secs: now_secs }))
            }
        }

        // ============================================================
        // State capture and automated hand-off
        // ============================================================
        (VoterState::AwaitingState, Event::VoterMessage { text, now_secs }) => {
            let result = TransitionResult::new(VoterState::AwaitingState)
                .with_effect(Effect::RelayToActiveThread { text: text.clone() });
            if let Some(state_name) = classify(&text) {
                Ok(TransitionResult {
                    new_state: VoterState::RoutedAutomated,
                    ..result
                }
                .with_effect(Effect::SetStateName {
                    name: state_name.to_string(),
                })
                .with_effect(Effect::SendVoter {
                    reply: Reply::StateConfirmation(state_name.to_string()),
                })
                .with_effect(Effect::RouteToPool {
                    state_name: state_name.to_string(),
                })
                .with_effect(Effect::TouchLastVoterMessage { secs: now_secs }))
            } else {
                Ok(result
                    .with_effect(Effect::SendVoter {
                        reply: Reply::ClarifyState,
                    })
                    .with_effect(Effect::TouchLastVoterMessage { secs: now_secs }))
            }
        }

        // ============================================================
        // Routed: relay verbatim; welcome back after a quiet hour.
        // Once a volunteer is engaged automated replies stay off, so the
        // welcome-back text is only sent in RoutedAutomated.
        // ============================================================
        (
            routed @ (VoterState::RoutedAutomated | VoterState::VolunteerEngaged),
            Event::VoterMessage { text, now_secs },
        ) => {
            let mut result = TransitionResult::new(routed)
                .with_effect(Effect::RelayToActiveThread { text });
            let quiet = now_secs - session.last_voter_message_secs;
            if routed == VoterState::RoutedAutomated && quiet > RE_ENGAGEMENT_THRESHOLD_SECS {
                result = result.with_effect(Effect::SendVoter {
                    reply: Reply::WelcomeBack,
                });
            }
            Ok(result.with_effect(Effect::TouchLastVoterMessage { secs: now_secs }))
        }

        // ============================================================
        // Volunteer replies
        // ============================================================
        (
            _,
            Event::VolunteerReply {
                text,
                sender_name,
                from_active_thread: true,
            },
        ) => Ok(TransitionResult::new(VoterState::VolunteerEngaged)
            .with_effect(Effect::MarkVolunteerEngaged)
            .with_effect(Effect::RelaySmsToVoter { text, sender_name })),

        // A reply in a thread that is not the active one is never relayed;
        // the sender is told where the conversation actually lives
        (
            state,
            Event::VolunteerReply {
                from_active_thread: false,
                ..
            },
        ) => Ok(TransitionResult::new(state).with_effect(Effect::NotifyInactiveThread)),

        // ============================================================
        // Admin re-route
        // ============================================================
        (
            state,
            Event::AdminRoute {
                destination_channel_name,
                destination_channel_id,
                actor,
                source_channel_id,
            },
        ) => {
            if session.active_channel_id.as_deref() == Some(destination_channel_id.as_str()) {
                return Err(TransitionError::DestinationAlreadyActive {
                    channel_name: destination_channel_name,
                });
            }
            Ok(TransitionResult::new(state).with_effect(Effect::RouteToChannel {
                channel_name: destination_channel_name,
                channel_id: destination_channel_id,
                actor,
                source_channel_id,
            }))
        }
    }
}

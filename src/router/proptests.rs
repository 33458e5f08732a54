//! Property-based tests for the state machine
//!
//! These verify the key invariants hold across all possible inputs.

use super::state::*;
use super::transition::*;
use super::*;
use crate::replies::Reply;
use crate::store::VoterSession;
use proptest::prelude::*;

const NOW: i64 = 1_700_000_000;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_session() -> impl Strategy<Value = VoterSession> {
    (
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
        proptest::option::of(proptest::sample::select(vec![
            "North Carolina",
            "Ohio",
            "Texas",
        ])),
        0..=NOW,
    )
        .prop_map(|(is_demo, confirmed, engaged, state_name, last)| {
            let mut session = VoterSession::new("+15551234567", is_demo, last);
            session.confirmed_disclaimer = confirmed;
            session.volunteer_engaged = engaged;
            session.state_name = state_name.map(String::from);
            session
        })
}

fn arb_text() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 .,!?]{0,60}"
}

fn arb_voter_event() -> impl Strategy<Value = Event> {
    arb_text().prop_map(|text| Event::VoterMessage {
        text,
        now_secs: NOW,
    })
}

fn sends_automated_reply(effects: &[Effect]) -> bool {
    effects.iter().any(|e| matches!(e, Effect::SendVoter { .. }))
}

// ============================================================================
// Invariants
// ============================================================================

proptest! {
    // Once a volunteer has engaged, no input can produce an automated reply.
    #[test]
    fn engaged_sessions_never_get_automated_replies(
        mut session in arb_session(),
        event in arb_voter_event(),
    ) {
        session.volunteer_engaged = true;
        let state = VoterState::of(&session, false);
        prop_assert_eq!(state, VoterState::VolunteerEngaged);

        let result = transition(state, &session, RouterContext { push_line: false }, event).unwrap();
        prop_assert!(!sends_automated_reply(&result.effects));
    }

    // Volunteer engagement latches: no voter message moves a session out of
    // VolunteerEngaged.
    #[test]
    fn engagement_latches(mut session in arb_session(), event in arb_voter_event()) {
        session.volunteer_engaged = true;
        let result = transition(
            VoterState::VolunteerEngaged,
            &session,
            RouterContext { push_line: false },
            event,
        )
        .unwrap();
        prop_assert_eq!(result.new_state, VoterState::VolunteerEngaged);
    }

    // confirmedDisclaimer is set exactly for inputs that normalize to "agree".
    #[test]
    fn disclaimer_confirmation_matches_normalization(
        session in arb_session(),
        text in arb_text(),
    ) {
        let result = transition(
            VoterState::AwaitingDisclaimer,
            &session,
            RouterContext { push_line: false },
            Event::VoterMessage { text: text.clone(), now_secs: NOW },
        )
        .unwrap();

        let confirmed = result.effects.contains(&Effect::SetConfirmedDisclaimer);
        prop_assert_eq!(confirmed, crate::text::is_agreement(&text));
        if confirmed {
            prop_assert_eq!(result.new_state, VoterState::AwaitingState);
        } else {
            prop_assert_eq!(result.new_state, VoterState::AwaitingDisclaimer);
        }
    }

    // Every inbound voter message on an existing session is relayed to the
    // active thread, verbatim, before anything else.
    #[test]
    fn inbound_text_relays_verbatim(
        session in arb_session(),
        state in proptest::sample::select(vec![
            VoterState::AwaitingDisclaimer,
            VoterState::AwaitingState,
            VoterState::RoutedAutomated,
            VoterState::VolunteerEngaged,
        ]),
        text in arb_text(),
    ) {
        let result = transition(
            state,
            &session,
            RouterContext { push_line: false },
            Event::VoterMessage { text: text.clone(), now_secs: NOW },
        )
        .unwrap();
        // Bound outside the assertion: prop_assert! stringifies its
        // condition into a format string, so braces inside it are rejected
        let relayed_first = matches!(
            result.effects.first(),
            Some(Effect::RelayToActiveThread { text: relayed }) if *relayed == text
        );
        prop_assert!(relayed_first);
    }

    // Every voter message updates the last-contact timestamp.
    #[test]
    fn voter_messages_touch_last_contact(
        session in arb_session(),
        state in proptest::sample::select(vec![
            VoterState::New,
            VoterState::AwaitingDisclaimer,
            VoterState::AwaitingState,
            VoterState::RoutedAutomated,
            VoterState::VolunteerEngaged,
        ]),
        event in arb_voter_event(),
    ) {
        let result = transition(state, &session, RouterContext { push_line: false }, event).unwrap();
        let touched = result
            .effects
            .contains(&Effect::TouchLastVoterMessage { secs: NOW });
        prop_assert!(touched);
    }

    // The welcome-back reply appears only for routed (not yet engaged)
    // voters and only after the quiet threshold.
    #[test]
    fn welcome_back_respects_threshold(
        mut session in arb_session(),
        quiet in 0i64..(4 * RE_ENGAGEMENT_THRESHOLD_SECS),
    ) {
        session.volunteer_engaged = false;
        session.last_voter_message_secs = NOW - quiet;
        let result = transition(
            VoterState::RoutedAutomated,
            &session,
            RouterContext { push_line: false },
            Event::VoterMessage { text: "hi".to_string(), now_secs: NOW },
        )
        .unwrap();

        let welcomed = result
            .effects
            .iter()
            .any(|e| matches!(e, Effect::SendVoter { reply } if *reply == Reply::WelcomeBack));
        prop_assert_eq!(welcomed, quiet > RE_ENGAGEMENT_THRESHOLD_SECS);
    }
}

//! Automated reply copy
//!
//! All voter-facing automated texts live here so the router's transition
//! table can stay data-only and the copy can be reviewed in one place.

/// An automated reply the router can send to a voter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// First-contact welcome plus program disclaimer
    Welcome,
    /// Voter replied something other than "agree" while awaiting disclaimer
    ClarifyDisclaimer,
    /// Disclaimer confirmed, ask which state the voter is in
    StateQuestion,
    /// Free text did not classify to a known state
    ClarifyState,
    /// State captured, confirm and hand off
    StateConfirmation(String),
    /// Voter returned after more than an hour of silence
    WelcomeBack,
}

impl Reply {
    pub fn text(&self) -> String {
        match self {
            Reply::Welcome => concat!(
                "Welcome! A volunteer will be with you shortly. ",
                "By continuing you agree to our program terms and to receive ",
                "messages from us; message and data rates may apply. ",
                "Reply AGREE to continue or STOP to opt out."
            )
            .to_string(),
            Reply::ClarifyDisclaimer => {
                "Please reply AGREE to confirm you accept the program terms, so we can connect you with a volunteer.".to_string()
            }
            Reply::StateQuestion => {
                "Thanks! What U.S. state are you in? You can reply with the full name or the two-letter abbreviation.".to_string()
            }
            Reply::ClarifyState => {
                "Sorry, we didn't recognize that state. Please reply with your U.S. state, like \"North Carolina\" or \"NC\".".to_string()
            }
            Reply::StateConfirmation(state) => format!(
                "Great, connecting you with a volunteer in {state}. They'll reply here as soon as they can."
            ),
            Reply::WelcomeBack => {
                "Welcome back! A volunteer will follow up with you here shortly.".to_string()
            }
        }
    }
}

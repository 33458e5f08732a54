//! Webhook request and response types

use serde::{Deserialize, Serialize};

/// Inbound SMS form body from the gateway (Twilio-style field names)
#[derive(Debug, Clone, Deserialize)]
pub struct SmsInbound {
    /// Voter phone number in E.164
    #[serde(rename = "From")]
    pub from: String,
    /// The gateway line the voter texted
    #[serde(rename = "To")]
    pub to: String,
    #[serde(rename = "Body")]
    pub body: String,
}

/// Top-level chat platform callback envelope
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatCallback {
    /// One-time endpoint ownership handshake; we echo the challenge back
    UrlVerification { challenge: String },
    EventCallback { event: ChatEvent },
}

/// A single chat event inside an `event_callback` envelope
#[derive(Debug, Clone, Deserialize)]
pub struct ChatEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub channel: String,
    /// Sender user id
    pub user: Option<String>,
    /// Sender display name, when the platform includes it
    pub username: Option<String>,
    pub text: Option<String>,
    /// Present on threaded replies (and on thread parents, where it equals
    /// the message's own `ts`)
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub ts: String,
    /// Present when the message was authored by a bot, ours included
    pub bot_id: Option<String>,
}

impl ChatEvent {
    /// Best display name we can attribute a relayed reply to
    pub fn sender_name(&self) -> &str {
        self.username
            .as_deref()
            .or(self.user.as_deref())
            .unwrap_or("volunteer")
    }
}

#[derive(Debug, Serialize)]
pub struct ChallengeResponse {
    pub challenge: String,
}

#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub ok: bool,
}

impl AckResponse {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

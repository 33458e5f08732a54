//! Outbound message delivery
//!
//! Production transports for the two voter-facing directions: the chat
//! platform (volunteer side) and the SMS gateway (voter side). Both sit
//! behind the runtime's transport traits so the router core can be tested
//! without a network.

mod chat;
mod sms;

pub use chat::ChatClient;
pub use sms::SmsClient;

use thiserror::Error;

/// A message accepted by the chat platform. `thread_id` is the platform
/// timestamp that anchors (or identifies) the thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedMessage {
    pub channel_id: String,
    pub thread_id: String,
}

/// Delivery error with classification
#[derive(Debug, Error)]
#[error("{message}")]
pub struct SendError {
    pub kind: SendErrorKind,
    pub message: String,
}

impl SendError {
    pub fn new(kind: SendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(SendErrorKind::Network, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(SendErrorKind::RateLimit, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(SendErrorKind::Auth, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(SendErrorKind::InvalidRequest, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(SendErrorKind::Unknown, message)
    }

    pub fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        match status.as_u16() {
            401 | 403 => Self::auth(body),
            429 => Self::rate_limit(body),
            400..=499 => Self::invalid_request(body),
            500..=599 => Self::network(body),
            _ => Self::unknown(body),
        }
    }
}

impl From<reqwest::Error> for SendError {
    fn from(err: reqwest::Error) -> Self {
        Self::network(err.to_string())
    }
}

/// Delivery error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendErrorKind {
    /// Network issues, timeouts, 5xx
    Network,
    /// Rate limited (429)
    RateLimit,
    /// Authentication failed (401, 403)
    Auth,
    /// Bad request (4xx)
    InvalidRequest,
    /// Unknown error
    Unknown,
}

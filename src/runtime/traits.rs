//! Trait abstractions for runtime I/O
//!
//! These traits are the collaborator contracts the router core consumes;
//! they enable testing the relay with mock implementations.

use crate::outbound::{PostedMessage, SendError};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Volunteer-facing sends to the chat platform
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Post a message; `thread_id = None` opens a new thread anchored at
    /// the posted message. Safe to call multiple times per handler
    /// invocation.
    async fn post_message(
        &self,
        channel_id: &str,
        thread_id: Option<&str>,
        text: &str,
    ) -> Result<PostedMessage, SendError>;
}

/// Voter-facing sends over the SMS gateway
#[async_trait]
pub trait SmsTransport: Send + Sync {
    async fn send_sms(&self, to: &str, from: &str, body: &str) -> Result<(), SendError>;
}

/// Inbound webhook authentication. The core only proceeds on `true`.
pub trait WebhookVerifier: Send + Sync {
    fn passes_auth(&self, provided_secret: Option<&str>) -> bool;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: ChatTransport + ?Sized> ChatTransport for Arc<T> {
    async fn post_message(
        &self,
        channel_id: &str,
        thread_id: Option<&str>,
        text: &str,
    ) -> Result<PostedMessage, SendError> {
        (**self).post_message(channel_id, thread_id, text).await
    }
}

#[async_trait]
impl<T: SmsTransport + ?Sized> SmsTransport for Arc<T> {
    async fn send_sms(&self, to: &str, from: &str, body: &str) -> Result<(), SendError> {
        (**self).send_sms(to, from, body).await
    }
}

impl<T: WebhookVerifier + ?Sized> WebhookVerifier for Arc<T> {
    fn passes_auth(&self, provided_secret: Option<&str>) -> bool {
        (**self).passes_auth(provided_secret)
    }
}

// ============================================================================
// Production Verifier
// ============================================================================

/// Shared-secret webhook verifier. Compares SHA-256 digests rather than the
/// raw strings so the comparison does not leak length or prefix timing.
pub struct SharedSecretVerifier {
    expected_digest: [u8; 32],
}

impl SharedSecretVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            expected_digest: Sha256::digest(secret.as_bytes()).into(),
        }
    }
}

impl WebhookVerifier for SharedSecretVerifier {
    fn passes_auth(&self, provided_secret: Option<&str>) -> bool {
        let Some(provided) = provided_secret else {
            return false;
        };
        let digest: [u8; 32] = Sha256::digest(provided.as_bytes()).into();
        digest == self.expected_digest
    }
}

//! HTTP webhook surface
//!
//! Two inbound directions: the SMS gateway posts voter texts as form data,
//! the chat platform posts volunteer/admin events as JSON callbacks. Both
//! pass the shared-secret gate before any processing.

mod handlers;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::config::Config;
use crate::runtime::{Relay, WebhookVerifier};
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    pub verifier: Arc<dyn WebhookVerifier>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(relay: Arc<Relay>, verifier: Arc<dyn WebhookVerifier>, config: Arc<Config>) -> Self {
        Self {
            relay,
            verifier,
            config,
        }
    }
}

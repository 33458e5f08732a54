//! Switchboard - SMS conversation relay
//!
//! Relays text conversations between anonymous voters on SMS gateway lines
//! and state-organized volunteer pools on a chat platform, driven by a pure
//! per-voter state machine.

mod admin;
mod api;
mod balancer;
mod classify;
mod config;
mod db;
mod outbound;
mod replies;
mod router;
mod runtime;
mod store;
mod text;

use api::{create_router, AppState};
use config::Config;
use db::Database;
use outbound::{ChatClient, SmsClient};
use runtime::{ChatTransport, Relay, SharedSecretVerifier, SmsTransport, WebhookVerifier};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "switchboard=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = Arc::new(Config::from_env()?);

    // Ensure database directory exists
    if let Some(parent) = PathBuf::from(&config.db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path, "Opening database");
    let db = Database::open(&config.db_path)?;

    let chat: Arc<dyn ChatTransport> = Arc::new(ChatClient::new(
        config.chat_token.clone(),
        &config.chat_api_base,
    )?);
    let sms: Arc<dyn SmsTransport> = Arc::new(SmsClient::new(
        config.sms_account_sid.clone(),
        config.sms_auth_token.clone(),
        &config.sms_api_base,
    )?);
    let verifier: Arc<dyn WebhookVerifier> =
        Arc::new(SharedSecretVerifier::new(&config.webhook_secret));

    let relay = Arc::new(Relay::new(config.clone(), db, chat, sms));
    let state = AppState::new(relay, verifier, config.clone());

    let app = create_router(state).layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(
        lines = config.gateway_lines.len(),
        "Switchboard listening on {addr}"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

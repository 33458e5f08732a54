//! HTTP request handlers

use super::types::{AckResponse, ChallengeResponse, ChatCallback, ChatEvent, ErrorResponse, SmsInbound};
use super::AppState;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};

const SECRET_HEADER: &str = "x-webhook-secret";

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/webhook/sms", post(sms_webhook))
        .route("/webhook/chat", post(chat_webhook))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(AckResponse::ok())
}

// ============================================================
// SMS gateway webhook
// ============================================================

async fn sms_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(inbound): Form<SmsInbound>,
) -> Result<Json<AckResponse>, AppError> {
    check_auth(&state, &headers)?;

    state
        .relay
        .handle_voter_message(&inbound.from, &inbound.to, &inbound.body)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(AckResponse::ok()))
}

// ============================================================
// Chat platform webhook
// ============================================================

async fn chat_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(callback): Json<ChatCallback>,
) -> Result<Response, AppError> {
    check_auth(&state, &headers)?;

    match callback {
        ChatCallback::UrlVerification { challenge } => {
            Ok(Json(ChallengeResponse { challenge }).into_response())
        }
        ChatCallback::EventCallback { event } => {
            // Event delivery is at-least-once and the platform retries on
            // non-200; handle errors here rather than returning them
            if let Err(e) = dispatch_event(&state, event).await {
                tracing::error!(error = %e, "Chat event handling failed");
            }
            Ok(Json(AckResponse::ok()).into_response())
        }
    }
}

/// Sort one chat message into admin command, volunteer reply, or noise
async fn dispatch_event(
    state: &AppState,
    event: ChatEvent,
) -> Result<(), crate::runtime::RelayError> {
    // Loop prevention: our own relays and notices come back as bot events
    if event.bot_id.is_some() {
        return Ok(());
    }
    if event.kind != "message" {
        return Ok(());
    }
    let Some(text) = event.text.as_deref() else {
        return Ok(());
    };

    if text.trim_start().starts_with(&state.config.bot_mention) {
        return state
            .relay
            .handle_admin_command(&event.channel, event.sender_name(), text)
            .await;
    }

    if let Some(thread_ts) = event.thread_ts.as_deref() {
        return state
            .relay
            .handle_volunteer_message(&event.channel, thread_ts, event.sender_name(), text)
            .await;
    }

    // Top-level channel chatter that is not addressed to us
    Ok(())
}

fn check_auth(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let provided = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
    if state.verifier.passes_auth(provided) {
        Ok(())
    } else {
        Err(AppError::Unauthorized)
    }
}

// ============================================================
// Error handling
// ============================================================

#[derive(Debug)]
enum AppError {
    Unauthorized,
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(ErrorResponse::new(message))).into_response()
    }
}

//! Chat platform transport
//!
//! Speaks the platform's `chat.postMessage` API: bearer token, JSON body,
//! thread anchoring via the parent message timestamp.

use super::{PostedMessage, SendError};
use crate::runtime::ChatTransport;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub struct ChatClient {
    client: Client,
    token: String,
    base_url: String,
}

impl ChatClient {
    pub fn new(token: String, base_url: &str) -> Result<Self, SendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SendError::unknown(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            token,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Serialize)]
struct PostMessageRequest<'a> {
    channel: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread_ts: Option<&'a str>,
}

#[derive(Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[async_trait]
impl ChatTransport for ChatClient {
    async fn post_message(
        &self,
        channel_id: &str,
        thread_id: Option<&str>,
        text: &str,
    ) -> Result<PostedMessage, SendError> {
        let url = format!("{}/chat.postMessage", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&PostMessageRequest {
                channel: channel_id,
                text,
                thread_ts: thread_id,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SendError::from_status(status, body));
        }

        let body: PostMessageResponse = response.json().await?;
        if !body.ok {
            return Err(SendError::invalid_request(
                body.error.unwrap_or_else(|| "unknown platform error".to_string()),
            ));
        }

        let ts = body
            .ts
            .ok_or_else(|| SendError::unknown("platform response missing ts"))?;
        Ok(PostedMessage {
            channel_id: body.channel.unwrap_or_else(|| channel_id.to_string()),
            // Replies carry the parent's ts as the thread id; parents
            // anchor a new thread with their own ts
            thread_id: thread_id.map_or(ts, str::to_string),
        })
    }
}

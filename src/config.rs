//! Environment configuration
//!
//! Everything is read once at startup and injected into constructors; no
//! process-global client handles.

use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub db_path: String,

    /// Chat platform bot token and API base
    pub chat_token: String,
    pub chat_api_base: String,

    /// SMS gateway credentials and API base
    pub sms_account_sid: String,
    pub sms_auth_token: String,
    pub sms_api_base: String,

    /// Shared secret expected on inbound webhooks
    pub webhook_secret: String,

    /// The literal mention token operators use to address this service,
    /// e.g. `<@U0SWITCH>`
    pub bot_mention: String,

    /// Lobby channel names (resolved through the channel directory)
    pub lobby_channel: String,
    pub demo_lobby_channel: String,

    /// All gateway lines this deployment answers on, in declaration order.
    /// Admin commands probe these to find a voter's session.
    pub gateway_lines: Vec<String>,
    /// Lines whose sessions are demo sessions
    pub demo_lines: HashSet<String>,
    /// Push (outbound-initiated) lines: disclaimer and state capture skipped
    pub push_lines: HashSet<String>,
    /// Voter numbers always treated as demo, regardless of line
    pub test_numbers: HashSet<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let db_path = std::env::var("SWITCHBOARD_DB_PATH").unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            format!("{home}/.switchboard/switchboard.db")
        });

        let port: u16 = std::env::var("SWITCHBOARD_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        Ok(Self {
            port,
            db_path,
            chat_token: required("SWITCHBOARD_CHAT_TOKEN")?,
            chat_api_base: std::env::var("SWITCHBOARD_CHAT_API_BASE")
                .unwrap_or_else(|_| "https://slack.com/api".to_string()),
            sms_account_sid: required("SWITCHBOARD_SMS_ACCOUNT_SID")?,
            sms_auth_token: required("SWITCHBOARD_SMS_AUTH_TOKEN")?,
            sms_api_base: std::env::var("SWITCHBOARD_SMS_API_BASE")
                .unwrap_or_else(|_| "https://api.twilio.com".to_string()),
            webhook_secret: required("SWITCHBOARD_WEBHOOK_SECRET")?,
            bot_mention: required("SWITCHBOARD_BOT_MENTION")?,
            lobby_channel: std::env::var("SWITCHBOARD_LOBBY_CHANNEL")
                .unwrap_or_else(|_| "lobby".to_string()),
            demo_lobby_channel: std::env::var("SWITCHBOARD_DEMO_LOBBY_CHANNEL")
                .unwrap_or_else(|_| "demo-lobby".to_string()),
            gateway_lines: list_var("SWITCHBOARD_GATEWAY_LINES"),
            demo_lines: list_var("SWITCHBOARD_DEMO_LINES").into_iter().collect(),
            push_lines: list_var("SWITCHBOARD_PUSH_LINES").into_iter().collect(),
            test_numbers: list_var("SWITCHBOARD_TEST_NUMBERS").into_iter().collect(),
        })
    }

    /// Demo status is fixed at session creation from the line texted (or a
    /// known test number) and never changes afterwards.
    pub fn is_demo_session(&self, gateway_line: &str, voter_phone: &str) -> bool {
        self.demo_lines.contains(gateway_line) || self.test_numbers.contains(voter_phone)
    }

    pub fn is_push_line(&self, gateway_line: &str) -> bool {
        self.push_lines.contains(gateway_line)
    }

    pub fn lobby_channel_for(&self, is_demo: bool) -> &str {
        if is_demo {
            &self.demo_lobby_channel
        } else {
            &self.lobby_channel
        }
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn list_var(name: &str) -> Vec<String> {
    std::env::var(name)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        port: 0,
        db_path: ":memory:".to_string(),
        chat_token: "test-token".to_string(),
        chat_api_base: "http://chat.invalid".to_string(),
        sms_account_sid: "ACTEST".to_string(),
        sms_auth_token: "secret".to_string(),
        sms_api_base: "http://sms.invalid".to_string(),
        webhook_secret: "hook-secret".to_string(),
        bot_mention: "<@U0SWITCH>".to_string(),
        lobby_channel: "lobby".to_string(),
        demo_lobby_channel: "demo-lobby".to_string(),
        gateway_lines: vec!["+18005550000".to_string(), "+18005550001".to_string()],
        demo_lines: ["+18005550001".to_string()].into_iter().collect(),
        push_lines: HashSet::new(),
        test_numbers: ["+15550009999".to_string()].into_iter().collect(),
    }
}

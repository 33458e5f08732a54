//! Database schema and record types

use serde::{Deserialize, Serialize};

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS cache (
    key TEXT NOT NULL,
    field TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (key, field)
);

CREATE TABLE IF NOT EXISTS audit_log (
    id TEXT PRIMARY KEY,
    voter_id TEXT NOT NULL,
    direction TEXT NOT NULL,
    automated BOOLEAN NOT NULL DEFAULT 0,
    sender_name TEXT,
    body TEXT NOT NULL,
    channel_id TEXT,
    thread_id TEXT,
    successful BOOLEAN NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_audit_voter ON audit_log(voter_id, created_at);
";

/// Message direction relative to the voter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Voter -> us
    Inbound,
    /// Us -> voter (automated or volunteer-relayed)
    Outbound,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "outbound" => Direction::Outbound,
            _ => Direction::Inbound,
        }
    }
}

/// One audit-log row: every inbound and outbound message, with delivery
/// outcome. Also serves as the voter's message history for thread replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub voter_id: String,
    pub direction: Direction,
    pub automated: bool,
    pub sender_name: Option<String>,
    pub body: String,
    pub channel_id: Option<String>,
    pub thread_id: Option<String>,
    pub successful: bool,
    pub created_at_secs: i64,
}

impl AuditEntry {
    pub fn inbound(voter_id: &str, body: &str, now_secs: i64) -> Self {
        Self {
            voter_id: voter_id.to_string(),
            direction: Direction::Inbound,
            automated: false,
            sender_name: None,
            body: body.to_string(),
            channel_id: None,
            thread_id: None,
            successful: true,
            created_at_secs: now_secs,
        }
    }

    pub fn outbound(voter_id: &str, body: &str, automated: bool, now_secs: i64) -> Self {
        Self {
            voter_id: voter_id.to_string(),
            direction: Direction::Outbound,
            automated,
            sender_name: None,
            body: body.to_string(),
            channel_id: None,
            thread_id: None,
            successful: true,
            created_at_secs: now_secs,
        }
    }

    pub fn with_sender(mut self, sender_name: &str) -> Self {
        self.sender_name = Some(sender_name.to_string());
        self
    }

    pub fn with_thread(mut self, channel_id: &str, thread_id: &str) -> Self {
        self.channel_id = Some(channel_id.to_string());
        self.thread_id = Some(thread_id.to_string());
        self
    }

    pub fn with_outcome(mut self, successful: bool) -> Self {
        self.successful = successful;
        self
    }
}

/// A historical message as replayed into volunteer threads,
/// ordered ascending by time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryMessage {
    pub timestamp_secs: i64,
    pub body: String,
    pub direction: Direction,
    pub automated: bool,
    pub sender_name: Option<String>,
}

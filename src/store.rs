//! Session store
//!
//! Durable, keyed memory for the otherwise stateless request handlers. Two
//! independent lookup directions live here: `voterId:gatewayLine` -> session
//! fields, and `channelId:threadId` -> the voter that thread belongs to.
//! All cache access goes through this module; field values are stored as
//! text and coerced back through a static schema on read.

use crate::db::{Database, DbResult};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt::Write as _;

/// Prefix for the dynamic per-channel thread map fields,
/// `thread:<channelId>` -> threadId.
const THREAD_FIELD_PREFIX: &str = "thread:";

const DIRECTORY_KEY: &str = "channelDirectory";
const BLOCKLIST_KEY: &str = "blockedPhones";

/// Watermark reported for a thread that has never seen history (far past)
pub const NO_MESSAGES_SENTINEL_SECS: i64 = 0;

/// How a stored field is typed on the way back out of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Boolean,
    Integer,
}

/// The static field schema. This is the only place type information
/// survives the round trip through the cache; unknown fields are text.
pub fn field_kind(field: &str) -> FieldKind {
    match field {
        "isDemo" | "confirmedDisclaimer" | "volunteerEngaged" => FieldKind::Boolean,
        "lastVoterMessageSecsFromEpoch" => FieldKind::Integer,
        _ => FieldKind::Text,
    }
}

/// A field value coerced through the schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Boolean(bool),
    Integer(i64),
}

fn coerce(field: &str, raw: &str) -> FieldValue {
    match field_kind(field) {
        FieldKind::Text => FieldValue::Text(raw.to_string()),
        FieldKind::Boolean => FieldValue::Boolean(parse_bool(raw)),
        FieldKind::Integer => FieldValue::Integer(raw.parse().unwrap_or(0)),
    }
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw, "true" | "1")
}

fn bool_text(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// Stable pseudonymous identifier for a voter, derived one-way from the
/// phone number. Used in all cross-references instead of the raw number.
pub fn voter_id_for(phone: &str) -> String {
    let digest = Sha256::digest(phone.as_bytes());
    let mut id = String::with_capacity(17);
    id.push('v');
    for byte in digest.iter().take(8) {
        let _ = write!(id, "{byte:02x}");
    }
    id
}

/// One voter's durable conversation state, keyed by
/// `voterId:gatewayLine`. Owned exclusively by the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoterSession {
    pub voter_id: String,
    pub voter_phone_number: String,
    /// Fixed at creation from the gateway line / test number used
    pub is_demo: bool,
    pub confirmed_disclaimer: bool,
    /// Once true, automated replies are permanently suppressed
    pub volunteer_engaged: bool,
    pub state_name: Option<String>,
    pub last_voter_message_secs: i64,
    pub active_channel_id: Option<String>,
    pub active_thread_id: Option<String>,
    /// Every channel this voter has ever had a thread in, so re-routes back
    /// to a previously visited channel reuse the thread instead of opening
    /// a duplicate.
    pub channel_threads: HashMap<String, String>,
}

impl VoterSession {
    pub fn new(phone: &str, is_demo: bool, now_secs: i64) -> Self {
        Self {
            voter_id: voter_id_for(phone),
            voter_phone_number: phone.to_string(),
            is_demo,
            confirmed_disclaimer: false,
            volunteer_engaged: false,
            state_name: None,
            last_voter_message_secs: now_secs,
            active_channel_id: None,
            active_thread_id: None,
            channel_threads: HashMap::new(),
        }
    }

    /// Thread id of this voter's existing thread in a channel, if any
    pub fn thread_in(&self, channel_id: &str) -> Option<&str> {
        self.channel_threads.get(channel_id).map(String::as_str)
    }

    fn from_fields(fields: &HashMap<String, String>) -> Self {
        let text = |name: &str| fields.get(name).cloned().unwrap_or_default();
        let flag = |name: &str| fields.get(name).is_some_and(|v| parse_bool(v));

        let mut channel_threads = HashMap::new();
        for (field, value) in fields {
            if let Some(channel_id) = field.strip_prefix(THREAD_FIELD_PREFIX) {
                channel_threads.insert(channel_id.to_string(), value.clone());
            }
        }

        Self {
            voter_id: text("voterId"),
            voter_phone_number: text("voterPhoneNumber"),
            is_demo: flag("isDemo"),
            confirmed_disclaimer: flag("confirmedDisclaimer"),
            volunteer_engaged: flag("volunteerEngaged"),
            state_name: fields.get("stateName").filter(|v| !v.is_empty()).cloned(),
            last_voter_message_secs: fields
                .get("lastVoterMessageSecsFromEpoch")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            active_channel_id: fields.get("activeChannelId").filter(|v| !v.is_empty()).cloned(),
            active_thread_id: fields.get("activeThreadId").filter(|v| !v.is_empty()).cloned(),
            channel_threads,
        }
    }

    fn to_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("voterId".to_string(), self.voter_id.clone()),
            ("voterPhoneNumber".to_string(), self.voter_phone_number.clone()),
            ("isDemo".to_string(), bool_text(self.is_demo).to_string()),
            (
                "confirmedDisclaimer".to_string(),
                bool_text(self.confirmed_disclaimer).to_string(),
            ),
            (
                "volunteerEngaged".to_string(),
                bool_text(self.volunteer_engaged).to_string(),
            ),
            (
                "lastVoterMessageSecsFromEpoch".to_string(),
                self.last_voter_message_secs.to_string(),
            ),
        ];
        if let Some(state) = &self.state_name {
            fields.push(("stateName".to_string(), state.clone()));
        }
        if let Some(channel) = &self.active_channel_id {
            fields.push(("activeChannelId".to_string(), channel.clone()));
        }
        if let Some(thread) = &self.active_thread_id {
            fields.push(("activeThreadId".to_string(), thread.clone()));
        }
        for (channel_id, thread_id) in &self.channel_threads {
            fields.push((format!("{THREAD_FIELD_PREFIX}{channel_id}"), thread_id.clone()));
        }
        fields
    }
}

/// The voter a volunteer thread belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadOwner {
    pub voter_phone_number: String,
    pub gateway_line: String,
}

/// Typed facade over the shared cache
#[derive(Clone)]
pub struct SessionStore {
    db: Database,
}

impl SessionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn session_key(voter_id: &str, gateway_line: &str) -> String {
        format!("{voter_id}:{gateway_line}")
    }

    /// Load a voter's session, or `None` on first-ever contact
    pub fn load_session(&self, voter_id: &str, gateway_line: &str) -> DbResult<Option<VoterSession>> {
        let key = Self::session_key(voter_id, gateway_line);
        Ok(self
            .db
            .get_hash(&key)?
            .map(|fields| VoterSession::from_fields(&fields)))
    }

    /// Persist a session (merge-upsert; unnamed fields survive)
    pub fn save_session(&self, gateway_line: &str, session: &VoterSession) -> DbResult<()> {
        let key = Self::session_key(&session.voter_id, gateway_line);
        let fields = session.to_fields();
        let borrowed: Vec<(&str, &str)> = fields
            .iter()
            .map(|(f, v)| (f.as_str(), v.as_str()))
            .collect();
        self.db.merge_hash(&key, &borrowed)
    }

    /// Single coerced field of a session hash
    pub fn get_session_field(
        &self,
        voter_id: &str,
        gateway_line: &str,
        field: &str,
    ) -> DbResult<Option<FieldValue>> {
        let key = Self::session_key(voter_id, gateway_line);
        Ok(self.db.get_field(&key, field)?.map(|raw| coerce(field, &raw)))
    }

    pub fn delete_session_field(
        &self,
        voter_id: &str,
        gateway_line: &str,
        field: &str,
    ) -> DbResult<()> {
        let key = Self::session_key(voter_id, gateway_line);
        self.db.delete_field(&key, field)
    }

    // ==================== Thread Reverse Lookup ====================

    /// Record which voter a newly opened thread belongs to
    pub fn record_thread_owner(
        &self,
        channel_id: &str,
        thread_id: &str,
        phone: &str,
        gateway_line: &str,
    ) -> DbResult<()> {
        let key = format!("{channel_id}:{thread_id}");
        self.db.merge_hash(
            &key,
            &[("voterPhoneNumber", phone), ("gatewayLine", gateway_line)],
        )
    }

    /// Resolve an inbound volunteer reply back to its voter
    pub fn thread_owner(&self, channel_id: &str, thread_id: &str) -> DbResult<Option<ThreadOwner>> {
        let key = format!("{channel_id}:{thread_id}");
        let Some(fields) = self.db.get_hash(&key)? else {
            return Ok(None);
        };
        Ok(Some(ThreadOwner {
            voter_phone_number: fields.get("voterPhoneNumber").cloned().unwrap_or_default(),
            gateway_line: fields.get("gatewayLine").cloned().unwrap_or_default(),
        }))
    }

    /// Timestamp of the newest piece of voter history already visible in a
    /// thread (live-relayed or replayed). Far-past sentinel when the thread
    /// has never seen any, so a full replay follows.
    pub fn thread_watermark(&self, channel_id: &str, thread_id: &str) -> DbResult<i64> {
        let key = format!("{channel_id}:{thread_id}");
        Ok(self
            .db
            .get_field(&key, "lastHistoryTimestamp")?
            .and_then(|v| v.parse().ok())
            .unwrap_or(NO_MESSAGES_SENTINEL_SECS))
    }

    /// Advance a thread's watermark. Never moves backwards.
    pub fn advance_thread_watermark(
        &self,
        channel_id: &str,
        thread_id: &str,
        secs: i64,
    ) -> DbResult<()> {
        if secs <= self.thread_watermark(channel_id, thread_id)? {
            return Ok(());
        }
        let key = format!("{channel_id}:{thread_id}");
        self.db
            .merge_hash(&key, &[("lastHistoryTimestamp", &secs.to_string())])
    }

    // ==================== Channel Directory ====================

    /// Channel display-name -> channel-id snapshot. Refreshed by an
    /// external collaborator; read-only here.
    pub fn channel_directory(&self) -> DbResult<HashMap<String, String>> {
        Ok(self.db.get_hash(DIRECTORY_KEY)?.unwrap_or_default())
    }

    /// Reverse directory lookup (channel id -> display name)
    pub fn channel_name_for(&self, channel_id: &str) -> DbResult<Option<String>> {
        let directory = self.channel_directory()?;
        Ok(directory
            .into_iter()
            .find(|(_, id)| id == channel_id)
            .map(|(name, _)| name))
    }

    // ==================== Blocklist ====================

    pub fn is_blocked(&self, phone: &str) -> DbResult<bool> {
        Ok(self.db.get_field(BLOCKLIST_KEY, phone)?.is_some())
    }
}

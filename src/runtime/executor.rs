//! Conversation relay executor
//!
//! One `Relay` handles every inbound webhook: it loads the voter's session,
//! runs the pure transition, interprets the resulting effects in order
//! (relay inbound -> evaluate -> persist), and writes the audit log.
//! Requests for the same voter are serialized through a per-key mutex so a
//! pair of rapid texts cannot race a last-write-wins session update.

use super::traits::{ChatTransport, SmsTransport};
use crate::admin::{self, AdminCommand};
use crate::balancer::{BalancerError, LoadBalancer};
use crate::config::Config;
use crate::db::{AuditEntry, Database, DbError, Direction, HistoryMessage};
use crate::outbound::SendError;
use crate::router::{transition, Effect, Event, RouterContext, TransitionError, VoterState};
use crate::store::{voter_id_for, SessionStore, VoterSession, NO_MESSAGES_SENTINEL_SECS};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("not found: {0}")]
    NotFound(String),
    /// A valid request the router rejected, e.g. re-routing to the channel
    /// that is already active
    #[error("{0}")]
    Rejected(String),
    #[error("delivery failed: {0}")]
    Delivery(#[from] SendError),
    #[error(transparent)]
    Store(#[from] DbError),
}

impl From<TransitionError> for RelayError {
    fn from(err: TransitionError) -> Self {
        RelayError::Rejected(err.to_string())
    }
}

/// Who initiated a hand-off, for operator-visible annotations
enum Routing<'a> {
    Automated,
    Admin {
        name: &'a str,
        source_channel_id: &'a str,
    },
}

/// Per-request ambient data for effect interpretation
struct EffectContext<'a> {
    gateway_line: &'a str,
    now_secs: i64,
    /// Thread the triggering volunteer message came from, if any
    reply_to: Option<(&'a str, &'a str)>,
}

pub struct Relay {
    config: Arc<Config>,
    db: Database,
    store: SessionStore,
    balancer: LoadBalancer,
    chat: Arc<dyn ChatTransport>,
    sms: Arc<dyn SmsTransport>,
    /// Per-voter-key serialization: `voterId:gatewayLine` -> mutex
    voter_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Relay {
    pub fn new(
        config: Arc<Config>,
        db: Database,
        chat: Arc<dyn ChatTransport>,
        sms: Arc<dyn SmsTransport>,
    ) -> Self {
        Self {
            config,
            store: SessionStore::new(db.clone()),
            balancer: LoadBalancer::new(db.clone()),
            db,
            chat,
            sms,
            voter_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    async fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.voter_locks.lock().await;
        // An entry only the map still references has no handler in flight;
        // purging keeps the map bounded by concurrent voters, not by every
        // voter ever seen
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(key.to_string()).or_default().clone()
    }

    #[cfg(test)]
    pub(crate) async fn voter_lock_count(&self) -> usize {
        self.voter_locks.lock().await.len()
    }

    /// Best-effort audit write; failures never abort the handler
    fn audit(&self, entry: &AuditEntry) {
        if let Err(e) = self.db.record_audit(entry) {
            tracing::warn!(voter = %entry.voter_id, error = %e, "Failed to write audit entry");
        }
    }

    // ==================== Inbound Voter Messages ====================

    pub async fn handle_voter_message(
        &self,
        voter_phone: &str,
        gateway_line: &str,
        body: &str,
    ) -> Result<(), RelayError> {
        if self.store.is_blocked(voter_phone)? {
            tracing::info!(line = %gateway_line, "Dropping message from blocked number");
            return Ok(());
        }

        let voter_id = voter_id_for(voter_phone);
        let key = SessionStore::session_key(&voter_id, gateway_line);
        let lock = self.lock_for(&key).await;
        let _guard = lock.lock().await;

        let now_secs = Utc::now().timestamp();
        self.audit(&AuditEntry::inbound(&voter_id, body, now_secs));

        let push_line = self.config.is_push_line(gateway_line);
        let (mut session, state) = match self.store.load_session(&voter_id, gateway_line)? {
            Some(session) => {
                let state = VoterState::of(&session, push_line);
                (session, state)
            }
            None => {
                let is_demo = self.config.is_demo_session(gateway_line, voter_phone);
                tracing::info!(voter = %voter_id, line = %gateway_line, is_demo, "Creating session");
                (
                    VoterSession::new(voter_phone, is_demo, now_secs),
                    VoterState::New,
                )
            }
        };

        let result = transition(
            state,
            &session,
            RouterContext { push_line },
            Event::VoterMessage {
                text: body.to_string(),
                now_secs,
            },
        )?;

        tracing::debug!(voter = %voter_id, from = ?state, to = ?result.new_state, "Voter message transition");

        let context = EffectContext {
            gateway_line,
            now_secs,
            reply_to: None,
        };
        self.apply_effects(&mut session, &context, result.effects)
            .await?;
        self.store.save_session(gateway_line, &session)?;
        Ok(())
    }

    // ==================== Inbound Volunteer Messages ====================

    pub async fn handle_volunteer_message(
        &self,
        channel_id: &str,
        thread_id: &str,
        sender_name: &str,
        text: &str,
    ) -> Result<(), RelayError> {
        let Some(owner) = self.store.thread_owner(channel_id, thread_id)? else {
            // Not a voter thread; nothing for us here
            return Ok(());
        };

        let voter_id = voter_id_for(&owner.voter_phone_number);
        let key = SessionStore::session_key(&voter_id, &owner.gateway_line);
        let lock = self.lock_for(&key).await;
        let _guard = lock.lock().await;

        let Some(mut session) = self
            .store
            .load_session(&voter_id, &owner.gateway_line)?
        else {
            tracing::warn!(voter = %voter_id, channel = %channel_id, "Thread resolves to a voter with no session");
            return Ok(());
        };

        let push_line = self.config.is_push_line(&owner.gateway_line);
        let state = VoterState::of(&session, push_line);
        let from_active_thread = session.active_channel_id.as_deref() == Some(channel_id)
            && session.active_thread_id.as_deref() == Some(thread_id);

        let now_secs = Utc::now().timestamp();
        let result = transition(
            state,
            &session,
            RouterContext { push_line },
            Event::VolunteerReply {
                text: text.to_string(),
                sender_name: sender_name.to_string(),
                from_active_thread,
            },
        )?;

        let context = EffectContext {
            gateway_line: &owner.gateway_line,
            now_secs,
            reply_to: Some((channel_id, thread_id)),
        };
        self.apply_effects(&mut session, &context, result.effects)
            .await?;
        self.store.save_session(&owner.gateway_line, &session)?;
        Ok(())
    }

    // ==================== Admin Commands ====================

    /// Parse and execute an operator command. Every outcome, success or
    /// failure, produces a deterministic notice back in the channel the
    /// command came from.
    pub async fn handle_admin_command(
        &self,
        source_channel_id: &str,
        admin_name: &str,
        text: &str,
    ) -> Result<(), RelayError> {
        let command = match admin::parse_command(text, &self.config.bot_mention) {
            Ok(command) => command,
            Err(failure) => {
                tracing::info!(admin = %admin_name, error = %failure, "Admin command parse failure");
                self.notify_operator(
                    source_channel_id,
                    &format!("{failure}. {}", admin::usage(&self.config.bot_mention)),
                )
                .await;
                return Ok(());
            }
        };

        match command {
            AdminCommand::Reserved { name } => {
                self.notify_operator(
                    source_channel_id,
                    &format!("{name} is recognized but not implemented yet."),
                )
                .await;
                Ok(())
            }
            AdminCommand::RouteVoter {
                voter,
                destination_channel,
                voter_was_wrapped,
            } => {
                if voter_was_wrapped {
                    tracing::debug!(raw = %text, cleaned = %voter, "Unwrapped link-wrapped voter argument");
                }
                self.route_voter_command(
                    source_channel_id,
                    admin_name,
                    &voter,
                    &destination_channel,
                )
                .await
            }
        }
    }

    async fn route_voter_command(
        &self,
        source_channel_id: &str,
        admin_name: &str,
        voter: &str,
        destination_channel: &str,
    ) -> Result<(), RelayError> {
        let directory = self.store.channel_directory()?;
        let Some(destination_id) = directory.get(destination_channel).cloned() else {
            self.notify_operator(
                source_channel_id,
                &format!("Unknown destination channel \"{destination_channel}\"."),
            )
            .await;
            return Ok(());
        };

        // Accept either the pseudonymous id or a raw phone number
        let voter_id = if voter.starts_with('+') {
            voter_id_for(voter)
        } else {
            voter.to_string()
        };

        // The grammar carries no gateway line; probe the configured lines
        // in declaration order and take the first session found
        let mut found: Option<String> = None;
        for line in &self.config.gateway_lines {
            if self.store.load_session(&voter_id, line)?.is_some() {
                found = Some(line.clone());
                break;
            }
        }
        let Some(gateway_line) = found else {
            self.notify_operator(
                source_channel_id,
                &format!("No session found for voter {voter}."),
            )
            .await;
            return Ok(());
        };

        let key = SessionStore::session_key(&voter_id, &gateway_line);
        let lock = self.lock_for(&key).await;
        let _guard = lock.lock().await;

        // Re-read under the lock
        let Some(mut session) = self.store.load_session(&voter_id, &gateway_line)? else {
            self.notify_operator(
                source_channel_id,
                &format!("No session found for voter {voter}."),
            )
            .await;
            return Ok(());
        };

        let push_line = self.config.is_push_line(&gateway_line);
        let state = VoterState::of(&session, push_line);
        let result = match transition(
            state,
            &session,
            RouterContext { push_line },
            Event::AdminRoute {
                destination_channel_name: destination_channel.to_string(),
                destination_channel_id: destination_id,
                actor: admin_name.to_string(),
                source_channel_id: source_channel_id.to_string(),
            },
        ) {
            Ok(result) => result,
            Err(err @ TransitionError::DestinationAlreadyActive { .. }) => {
                self.notify_operator(source_channel_id, &format!("Nothing to do: {err}."))
                    .await;
                return Ok(());
            }
        };

        let now_secs = Utc::now().timestamp();
        let context = EffectContext {
            gateway_line: &gateway_line,
            now_secs,
            reply_to: None,
        };
        if let Err(err) = self
            .apply_effects(&mut session, &context, result.effects)
            .await
        {
            tracing::error!(voter = %voter_id, error = %err, "Admin re-route failed");
            self.notify_operator(source_channel_id, &format!("Routing failed: {err}."))
                .await;
            return Ok(());
        }
        self.store.save_session(&gateway_line, &session)?;

        self.notify_operator(
            source_channel_id,
            &format!("Routed voter {voter_id} to #{destination_channel}."),
        )
        .await;
        Ok(())
    }

    // ==================== Effect Interpretation ====================

    /// Execute effects in order. Informational sends are logged and
    /// swallowed; hand-off failures propagate so the admin path can report
    /// them. Session mutations only touch the in-memory session; the caller
    /// persists once afterwards.
    async fn apply_effects(
        &self,
        session: &mut VoterSession,
        context: &EffectContext<'_>,
        effects: Vec<Effect>,
    ) -> Result<(), RelayError> {
        for effect in effects {
            match effect {
                Effect::RelayToActiveThread { text } => {
                    self.relay_to_active_thread(session, context, &text).await;
                }
                Effect::SendVoter { reply } => {
                    self.send_voter_sms(session, context, &reply.text(), true, None)
                        .await;
                }
                Effect::RelaySmsToVoter { text, sender_name } => {
                    self.send_voter_sms(session, context, &text, false, Some(&sender_name))
                        .await;
                }
                Effect::OpenLobbyThread => {
                    let lobby = self.config.lobby_channel_for(session.is_demo).to_string();
                    if let Err(err) = self
                        .route_to_named_channel(session, context, &lobby, &Routing::Automated)
                        .await
                    {
                        // The voter still gets the welcome and the session
                        // still persists; volunteers just can't see them yet
                        tracing::error!(voter = %session.voter_id, error = %err, "Failed to open lobby thread");
                    }
                }
                Effect::RouteToPool { state_name } => {
                    match self.balancer.select_pod(&state_name, session.is_demo) {
                        Ok(channel_name) => {
                            if let Err(err) = self
                                .route_to_named_channel(
                                    session,
                                    context,
                                    &channel_name,
                                    &Routing::Automated,
                                )
                                .await
                            {
                                tracing::error!(voter = %session.voter_id, channel = %channel_name, error = %err, "Pool hand-off failed");
                            }
                        }
                        Err(err @ BalancerError::Unconfigured { .. }) => {
                            tracing::error!(voter = %session.voter_id, state = %state_name, error = %err, "Pool hand-off rejected");
                        }
                        Err(BalancerError::Store(err)) => return Err(err.into()),
                    }
                }
                Effect::RouteToChannel {
                    channel_name,
                    channel_id,
                    actor,
                    source_channel_id,
                } => {
                    self.route_to_channel(
                        session,
                        context,
                        &channel_name,
                        &channel_id,
                        &Routing::Admin {
                            name: &actor,
                            source_channel_id: &source_channel_id,
                        },
                    )
                    .await?;
                }
                Effect::NotifyInactiveThread => {
                    self.notify_inactive_thread(session, context).await;
                }
                Effect::SetConfirmedDisclaimer => session.confirmed_disclaimer = true,
                Effect::SetStateName { name } => session.state_name = Some(name),
                Effect::MarkVolunteerEngaged => session.volunteer_engaged = true,
                Effect::TouchLastVoterMessage { secs } => {
                    session.last_voter_message_secs = secs;
                }
            }
        }
        Ok(())
    }

    async fn relay_to_active_thread(
        &self,
        session: &VoterSession,
        context: &EffectContext<'_>,
        text: &str,
    ) {
        let (Some(channel_id), Some(thread_id)) =
            (&session.active_channel_id, &session.active_thread_id)
        else {
            tracing::warn!(voter = %session.voter_id, "No active thread to relay into");
            return;
        };
        let line = format!("*{}*: {text}", session.voter_id);
        match self.chat.post_message(channel_id, Some(thread_id), &line).await {
            Ok(_) => {
                if let Err(e) =
                    self.store
                        .advance_thread_watermark(channel_id, thread_id, context.now_secs)
                {
                    tracing::warn!(voter = %session.voter_id, error = %e, "Failed to advance thread watermark");
                }
            }
            Err(e) => {
                tracing::warn!(voter = %session.voter_id, channel = %channel_id, error = %e, "Failed to relay inbound text");
            }
        }
    }

    /// Send to the voter over the SMS gateway, audit the outcome, and never
    /// propagate: a failed welcome must not stop session creation.
    async fn send_voter_sms(
        &self,
        session: &VoterSession,
        context: &EffectContext<'_>,
        body: &str,
        automated: bool,
        sender_name: Option<&str>,
    ) {
        let outcome = self
            .sms
            .send_sms(&session.voter_phone_number, context.gateway_line, body)
            .await;
        let successful = outcome.is_ok();
        if let Err(e) = &outcome {
            tracing::warn!(voter = %session.voter_id, error = %e, "SMS send failed");
        }

        let mut entry = AuditEntry::outbound(&session.voter_id, body, automated, context.now_secs)
            .with_outcome(successful);
        if let Some(sender) = sender_name {
            entry = entry.with_sender(sender);
        }
        if let Some((channel_id, thread_id)) = context.reply_to {
            entry = entry.with_thread(channel_id, thread_id);
        }
        self.audit(&entry);
    }

    async fn notify_operator(&self, channel_id: &str, text: &str) {
        if let Err(e) = self.chat.post_message(channel_id, None, text).await {
            tracing::warn!(channel = %channel_id, error = %e, "Failed to notify operator");
        }
    }

    async fn notify_inactive_thread(&self, session: &VoterSession, context: &EffectContext<'_>) {
        let Some((channel_id, thread_id)) = context.reply_to else {
            return;
        };
        let active_name = match session.active_channel_id.as_deref() {
            Some(active_id) => self
                .store
                .channel_name_for(active_id)
                .ok()
                .flatten()
                .map_or_else(|| active_id.to_string(), |name| format!("#{name}")),
            None => "another channel".to_string(),
        };
        let notice = format!(
            "This thread is no longer active for voter {}. The conversation now lives in {active_name}; your reply was not delivered.",
            session.voter_id
        );
        if let Err(e) = self.chat.post_message(channel_id, Some(thread_id), &notice).await {
            tracing::warn!(channel = %channel_id, error = %e, "Failed to send inactive-thread notice");
        }
    }

    // ==================== Hand-off Sub-protocol ====================

    async fn route_to_named_channel(
        &self,
        session: &mut VoterSession,
        context: &EffectContext<'_>,
        channel_name: &str,
        actor: &Routing<'_>,
    ) -> Result<(), RelayError> {
        let directory = self.store.channel_directory()?;
        let Some(channel_id) = directory.get(channel_name).cloned() else {
            return Err(RelayError::NotFound(format!(
                "channel \"{channel_name}\" is not in the directory"
            )));
        };
        self.route_to_channel(session, context, channel_name, &channel_id, actor)
            .await
    }

    /// Move the voter's active thread to `channel_id`: open or reuse a
    /// thread there, replay the missing history, notify the previously
    /// active thread, then mark the destination active.
    async fn route_to_channel(
        &self,
        session: &mut VoterSession,
        context: &EffectContext<'_>,
        channel_name: &str,
        channel_id: &str,
        actor: &Routing<'_>,
    ) -> Result<(), RelayError> {
        let actor_note = self.describe_actor(actor);
        let previous = session
            .active_channel_id
            .clone()
            .zip(session.active_thread_id.clone());

        let thread_id = if let Some(thread_id) = session.thread_in(channel_id).map(str::to_string)
        {
            // The voter has been here before: reuse the thread and replay
            // only what it has not seen yet
            let since = self.store.thread_watermark(channel_id, &thread_id)?;
            let notice = format!(
                "Voter {} routed back to this thread {actor_note}.",
                session.voter_id
            );
            if let Err(e) = self
                .chat
                .post_message(channel_id, Some(&thread_id), &notice)
                .await
            {
                tracing::warn!(voter = %session.voter_id, channel = %channel_id, error = %e, "Failed to announce re-route in destination thread");
            }
            self.replay_history(session, channel_id, &thread_id, Some(since))
                .await?;
            thread_id
        } else {
            // First visit: the announcement anchors the new thread
            let announcement = format!(
                "New thread for voter {} (via {}) {actor_note}.",
                session.voter_id, context.gateway_line
            );
            let posted = self.chat.post_message(channel_id, None, &announcement).await?;
            self.store.record_thread_owner(
                channel_id,
                &posted.thread_id,
                &session.voter_phone_number,
                context.gateway_line,
            )?;
            session
                .channel_threads
                .insert(channel_id.to_string(), posted.thread_id.clone());
            self.replay_history(session, channel_id, &posted.thread_id, None)
                .await?;
            posted.thread_id
        };

        // Operator-style notice in the thread being left behind;
        // informational, so a failure does not stop the hand-off
        if let Some((old_channel, old_thread)) = previous {
            if old_channel != channel_id {
                let notice = format!(
                    "Voter {} routed to #{channel_name} {actor_note}.",
                    session.voter_id
                );
                if let Err(e) = self
                    .chat
                    .post_message(&old_channel, Some(&old_thread), &notice)
                    .await
                {
                    tracing::warn!(voter = %session.voter_id, channel = %old_channel, error = %e, "Failed to notify previous thread");
                }
            }
        }

        session.active_channel_id = Some(channel_id.to_string());
        session.active_thread_id = Some(thread_id);
        tracing::info!(voter = %session.voter_id, channel = %channel_id, "Voter routed");
        Ok(())
    }

    fn describe_actor(&self, actor: &Routing<'_>) -> String {
        match actor {
            Routing::Automated => "automatically".to_string(),
            Routing::Admin {
                name,
                source_channel_id,
            } => {
                let source = self
                    .store
                    .channel_name_for(source_channel_id)
                    .ok()
                    .flatten()
                    .map_or_else(|| (*source_channel_id).to_string(), |n| format!("#{n}"));
                format!("by {name} from {source}")
            }
        }
    }

    /// Replay voter history into a thread, ascending. `since` of the
    /// sentinel (or `None`) means full history. Individual post failures
    /// are logged and skipped so one bad message cannot wedge a hand-off.
    async fn replay_history(
        &self,
        session: &VoterSession,
        channel_id: &str,
        thread_id: &str,
        since: Option<i64>,
    ) -> Result<(), RelayError> {
        let since = since.filter(|s| *s > NO_MESSAGES_SENTINEL_SECS);
        let messages = self.db.history(&session.voter_id, since)?;
        let mut newest = NO_MESSAGES_SENTINEL_SECS;
        for message in &messages {
            let line = format_history_line(message, &session.voter_id);
            if let Err(e) = self
                .chat
                .post_message(channel_id, Some(thread_id), &line)
                .await
            {
                tracing::warn!(voter = %session.voter_id, channel = %channel_id, error = %e, "Failed to replay history message");
            }
            newest = newest.max(message.timestamp_secs);
        }
        if newest > NO_MESSAGES_SENTINEL_SECS {
            self.store
                .advance_thread_watermark(channel_id, thread_id, newest)?;
        }
        Ok(())
    }
}

fn format_history_line(message: &HistoryMessage, voter_id: &str) -> String {
    let time = chrono::DateTime::from_timestamp(message.timestamp_secs, 0)
        .map_or_else(|| message.timestamp_secs.to_string(), |dt| {
            dt.format("%Y-%m-%d %H:%M UTC").to_string()
        });
    let who = match message.direction {
        Direction::Inbound => voter_id.to_string(),
        Direction::Outbound => match (&message.sender_name, message.automated) {
            (Some(sender), _) => sender.clone(),
            (None, true) => "automated".to_string(),
            (None, false) => "volunteer".to_string(),
        },
    };
    format!("[{time}] *{who}*: {}", message.body)
}

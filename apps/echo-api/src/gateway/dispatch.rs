//! Routes inbound frames: authentication, chat, stream membership, heartbeats.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use echo_common::SnowflakeGenerator;
use tokio::sync::mpsc;

use super::events::{ClientFrame, Outbound, ServerFrame};
use super::registry::{
    Audience, ConnectedUser, ConnectionId, ConnectionRegistry, OUTBOUND_CAPACITY,
};
use crate::assistant::monitor::{
    suggestion_text, ConversationMonitor, LastSpeakers, SuggestionDebounce,
};
use crate::assistant::scheduler::{random_delay, AssistantScheduler};
use crate::assistant::{triggers, ASSISTANT_BLOOM, ASSISTANT_USERNAME};
use crate::auth::gate::{AuthError, SessionGate};
use crate::config::Config;
use crate::db::identities::IdentityStore;
use crate::db::messages::MessageStore;
use crate::models::message::{Author, ChatMessage, ChatTarget, MAX_MESSAGE_CHARS};
use crate::moderation::filter::filter_message;

pub const MAX_STREAM_NAME_CHARS: usize = 50;
pub const MIN_GROTTO_PARTICIPANTS: usize = 2;
pub const MAX_GROTTO_PARTICIPANTS: usize = 10;

const AUTH_REQUIRED: &str = "Authentication required";
const RATE_LIMITED: &str = "Message rate limit exceeded";
const NOT_JOINED: &str = "You must join the stream first";
const SAVE_FAILED: &str = "Failed to save message";
const SEND_FAILED: &str = "Failed to send message";

/// Where a chat frame asked to go, before validation.
enum ChatRequest {
    World,
    Stream(String),
    Grotto(Vec<String>),
}

/// The chat gateway: connection registry plus everything a frame can touch.
pub struct Gateway {
    registry: ConnectionRegistry,
    gate: Arc<SessionGate>,
    identities: Arc<dyn IdentityStore>,
    messages: Arc<dyn MessageStore>,
    snowflake: SnowflakeGenerator,
    monitor: ConversationMonitor,
    suggestions: SuggestionDebounce,
    scheduler: AssistantScheduler,
    /// Last human speaker per audience key.
    last_speakers: LastSpeakers,
    assistant: Author,
    assistant_delay: (Duration, Duration),
}

impl Gateway {
    pub fn new(
        config: &Config,
        gate: Arc<SessionGate>,
        identities: Arc<dyn IdentityStore>,
        messages: Arc<dyn MessageStore>,
    ) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            gate,
            identities,
            messages,
            snowflake: SnowflakeGenerator::new(0),
            monitor: ConversationMonitor::new(),
            suggestions: SuggestionDebounce::new(),
            scheduler: AssistantScheduler::new(),
            last_speakers: LastSpeakers::new(),
            assistant: Author {
                username: ASSISTANT_USERNAME.to_string(),
                avatar: ASSISTANT_BLOOM.to_string(),
            },
            assistant_delay: (config.assistant_delay_min, config.assistant_delay_max),
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn monitor(&self) -> &ConversationMonitor {
        &self.monitor
    }

    pub fn suggestions(&self) -> &SuggestionDebounce {
        &self.suggestions
    }

    pub fn last_speakers(&self) -> &LastSpeakers {
        &self.last_speakers
    }

    pub fn scheduler(&self) -> &AssistantScheduler {
        &self.scheduler
    }

    pub fn messages(&self) -> &Arc<dyn MessageStore> {
        &self.messages
    }

    /// Register a freshly opened, unauthenticated connection.
    pub fn connect(&self) -> (ConnectionId, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let id = self.registry.register(tx);
        tracing::debug!(connection_id = %id, "connection opened");
        (id, rx)
    }

    pub fn disconnect(&self, conn: &ConnectionId) {
        let user = self.registry.identity(conn);
        if self.registry.remove(conn) {
            tracing::info!(
                connection_id = %conn,
                user_id = user.as_ref().map(|u| u.user_id.as_str()).unwrap_or("-"),
                "connection closed"
            );
        }
    }

    /// Handle one inbound text frame. Every failure is reported to `conn` only.
    pub async fn handle_text(self: &Arc<Self>, conn: &ConnectionId, text: &str) {
        self.registry.touch(conn);

        let frame = match ClientFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(connection_id = %conn, error = ?e, "rejected frame");
                self.reply(conn, ServerFrame::error(e.to_string()));
                return;
            }
        };

        match frame {
            ClientFrame::Auth { token } => self.handle_auth(conn, &token).await,
            ClientFrame::WorldChat { message } => {
                self.handle_chat(conn, ChatRequest::World, &message).await
            }
            ClientFrame::StreamChat {
                message,
                stream_name,
            } => {
                self.handle_chat(conn, ChatRequest::Stream(stream_name), &message)
                    .await
            }
            ClientFrame::GrottoChat {
                message,
                participants,
            } => {
                self.handle_chat(conn, ChatRequest::Grotto(participants), &message)
                    .await
            }
            ClientFrame::JoinStream { stream_name } => self.handle_join(conn, &stream_name),
            ClientFrame::LeaveStream { stream_name } => self.handle_leave(conn, &stream_name),
            ClientFrame::Heartbeat => self.reply(conn, ServerFrame::HeartbeatAck),
        }
    }

    fn reply(&self, conn: &ConnectionId, frame: ServerFrame) {
        self.registry.send(conn, &frame);
    }

    async fn handle_auth(&self, conn: &ConnectionId, token: &str) {
        let identity = match self.gate.authenticate(token).await {
            Ok(identity) => identity,
            Err(e) => {
                let reason = match &e {
                    AuthError::Store(inner) => {
                        tracing::error!(connection_id = %conn, error = ?inner, "identity lookup failed");
                        "Authentication unavailable".to_string()
                    }
                    other => {
                        tracing::debug!(connection_id = %conn, error = %other, "authentication rejected");
                        other.to_string()
                    }
                };
                self.reply(
                    conn,
                    ServerFrame::AuthError {
                        message: format!("WebSocket authentication failed: {reason}"),
                    },
                );
                return;
            }
        };

        let user = ConnectedUser {
            user_id: identity.id.clone(),
            username: identity.username.clone(),
            avatar: identity.bloom.clone(),
        };
        if !self.registry.promote(conn, user) {
            return;
        }

        tracing::info!(connection_id = %conn, user_id = %identity.id, "connection authenticated");
        self.reply(
            conn,
            ServerFrame::AuthSuccess {
                user: identity.to_public_profile(),
            },
        );
    }

    async fn handle_chat(self: &Arc<Self>, conn: &ConnectionId, request: ChatRequest, text: &str) {
        let Some(user) = self.registry.identity(conn) else {
            return self.reply(conn, ServerFrame::error(AUTH_REQUIRED));
        };
        if !self.gate.allow(&user.user_id) {
            tracing::debug!(user_id = %user.user_id, "chat rate limited");
            return self.reply(conn, ServerFrame::error(RATE_LIMITED));
        }

        let (target, audience) = match self.resolve_target(conn, &user, request).await {
            Ok(resolved) => resolved,
            Err(message) => return self.reply(conn, ServerFrame::error(message)),
        };
        let text = match validate_text(text) {
            Ok(text) => text,
            Err(message) => return self.reply(conn, ServerFrame::error(message)),
        };

        let author = Author {
            username: user.username.clone(),
            avatar: user.avatar.clone(),
        };
        let message = ChatMessage::from_filtered(
            self.snowflake.generate(),
            &author,
            target,
            filter_message(text),
            Utc::now(),
        );
        let message = self.persist(message, Some(conn)).await;
        let delivered = self.broadcast_message(&message, &audience);

        tracing::info!(
            message_id = message.id,
            user_id = %user.user_id,
            audience = %message.target.audience_key(),
            filtered = message.was_filtered,
            delivered,
            "chat message dispatched"
        );

        self.after_broadcast(&user.username, text, &message.target, &audience)
            .await;
    }

    async fn resolve_target(
        &self,
        conn: &ConnectionId,
        user: &ConnectedUser,
        request: ChatRequest,
    ) -> Result<(ChatTarget, Audience), String> {
        match request {
            ChatRequest::World => Ok((ChatTarget::World, Audience::World)),
            ChatRequest::Stream(name) => {
                let name = validate_stream_name(&name)?;
                if !self.registry.is_subscribed(name, conn) {
                    return Err(NOT_JOINED.to_string());
                }
                Ok((
                    ChatTarget::Stream(name.to_string()),
                    Audience::Stream(name.to_string()),
                ))
            }
            ChatRequest::Grotto(participants) => {
                let target = ChatTarget::grotto(
                    participants
                        .iter()
                        .map(|p| p.trim().to_string())
                        .chain(std::iter::once(user.username.clone())),
                );
                let ChatTarget::Grotto(usernames) = &target else {
                    return Err(SEND_FAILED.to_string());
                };
                if !(MIN_GROTTO_PARTICIPANTS..=MAX_GROTTO_PARTICIPANTS).contains(&usernames.len()) {
                    return Err(format!(
                        "A grotto needs between {MIN_GROTTO_PARTICIPANTS} and {MAX_GROTTO_PARTICIPANTS} participants"
                    ));
                }

                let mut user_ids = Vec::with_capacity(usernames.len());
                for username in usernames {
                    if *username == user.username {
                        user_ids.push(user.user_id.clone());
                        continue;
                    }
                    match self.identities.find_by_username(username).await {
                        Ok(Some(identity)) => user_ids.push(identity.id),
                        Ok(None) => return Err("Grotto participant not found".to_string()),
                        Err(e) => {
                            tracing::error!(error = ?e, "grotto participant lookup failed");
                            return Err(SEND_FAILED.to_string());
                        }
                    }
                }
                Ok((target, Audience::Users(user_ids)))
            }
        }
    }

    fn handle_join(&self, conn: &ConnectionId, stream_name: &str) {
        let Some(user) = self.registry.identity(conn) else {
            return self.reply(conn, ServerFrame::error(AUTH_REQUIRED));
        };
        let name = match validate_stream_name(stream_name) {
            Ok(name) => name,
            Err(message) => return self.reply(conn, ServerFrame::error(message)),
        };

        if self.registry.join_stream(name, conn) {
            tracing::debug!(user_id = %user.user_id, stream = %name, "joined stream");
            self.reply(
                conn,
                ServerFrame::StreamJoined {
                    stream_name: name.to_string(),
                },
            );
        }
    }

    fn handle_leave(&self, conn: &ConnectionId, stream_name: &str) {
        let name = stream_name.trim();
        self.registry.leave_stream(name, conn);
        tracing::debug!(connection_id = %conn, stream = %name, "left stream");
        self.reply(
            conn,
            ServerFrame::StreamLeft {
                stream_name: name.to_string(),
            },
        );
    }

    /// Store the message. A failed write is reported to `origin` but the
    /// message is still returned for broadcast.
    async fn persist(&self, message: ChatMessage, origin: Option<&ConnectionId>) -> ChatMessage {
        match self.messages.create_message(message.clone()).await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::error!(message_id = message.id, error = ?e, "failed to persist chat message");
                if let Some(conn) = origin {
                    self.reply(conn, ServerFrame::error(SAVE_FAILED));
                }
                message
            }
        }
    }

    fn broadcast_message(&self, message: &ChatMessage, audience: &Audience) -> usize {
        self.registry.broadcast(audience, &chat_frame(message))
    }

    /// Assistant follow-ups: a delayed support reply, and a grotto nudge for
    /// pairs trading messages back and forth.
    async fn after_broadcast(
        self: &Arc<Self>,
        speaker: &str,
        raw: &str,
        target: &ChatTarget,
        audience: &Audience,
    ) {
        if speaker == ASSISTANT_USERNAME {
            return;
        }

        let categories = triggers::analyze(raw);
        if let Some(reply) = triggers::respond(&categories) {
            let gateway = Arc::clone(self);
            let (reply_target, reply_audience) = (target.clone(), audience.clone());
            let delay = random_delay(self.assistant_delay.0, self.assistant_delay.1);
            let task_id = self.scheduler.schedule(delay, async move {
                gateway
                    .post_assistant(reply_target, &reply_audience, reply)
                    .await;
            });
            tracing::debug!(%task_id, ?categories, delay_ms = delay.as_millis() as u64, "assistant reply scheduled");
        }

        if matches!(target, ChatTarget::Grotto(_)) {
            return;
        }

        let key = target.audience_key();
        let Some(previous) = self.last_speakers.swap(&key, speaker) else {
            return;
        };

        let suggestion = self.monitor.track(speaker, &previous, &key);
        if suggestion.should_suggest && self.suggestions.try_post(&suggestion.users) {
            self.post_assistant(target.clone(), audience, suggestion_text(&suggestion.users))
                .await;
        }
    }

    /// Persist and broadcast a message written by the assistant.
    pub async fn post_assistant(
        &self,
        target: ChatTarget,
        audience: &Audience,
        text: impl Into<String>,
    ) {
        let message = ChatMessage::trusted(
            self.snowflake.generate(),
            &self.assistant,
            target,
            text,
            Utc::now(),
        );
        let message = self.persist(message, None).await;
        let delivered = self.broadcast_message(&message, audience);
        tracing::info!(
            message_id = message.id,
            audience = %message.target.audience_key(),
            delivered,
            "assistant message posted"
        );
    }
}

/// The outbound frame that carries `message` to its audience.
pub fn chat_frame(message: &ChatMessage) -> ServerFrame {
    let data = message.to_public();
    match &message.target {
        ChatTarget::World => ServerFrame::WorldChatMessage { data },
        ChatTarget::Stream(name) => ServerFrame::StreamChatMessage {
            stream_name: name.clone(),
            data,
        },
        ChatTarget::Grotto(participants) => ServerFrame::GrottoChatMessage {
            participants: participants.clone(),
            data,
        },
    }
}

fn validate_text(text: &str) -> Result<&str, &'static str> {
    let text = text.trim();
    if text.is_empty() {
        return Err("Message cannot be empty");
    }
    if text.chars().count() > MAX_MESSAGE_CHARS {
        return Err("Message cannot exceed 1000 characters");
    }
    Ok(text)
}

fn validate_stream_name(name: &str) -> Result<&str, String> {
    let name = name.trim();
    let len = name.chars().count();
    if len == 0 || len > MAX_STREAM_NAME_CHARS {
        return Err(format!(
            "Stream name must be between 1 and {MAX_STREAM_NAME_CHARS} characters"
        ));
    }
    Ok(name)
}

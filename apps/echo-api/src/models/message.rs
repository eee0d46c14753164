use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::moderation::filter::{FilterOutcome, FilterReason};

/// Text shown in place of a soft-deleted message.
pub const DELETED_PLACEHOLDER: &str = "[Message deleted]";

/// Longest chat message accepted, in characters.
pub const MAX_MESSAGE_CHARS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    World,
    Stream,
    Grotto,
}

/// Where a message was sent. Carries exactly the routing data its kind needs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChatTarget {
    World,
    Stream(String),
    /// Participant usernames, sorted and deduplicated.
    Grotto(Vec<String>),
}

impl ChatTarget {
    /// Build a grotto target with a canonical participant list.
    pub fn grotto<I, S>(participants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut users: Vec<String> = participants.into_iter().map(Into::into).collect();
        users.sort();
        users.dedup();
        ChatTarget::Grotto(users)
    }

    pub fn kind(&self) -> ChannelKind {
        match self {
            ChatTarget::World => ChannelKind::World,
            ChatTarget::Stream(_) => ChannelKind::Stream,
            ChatTarget::Grotto(_) => ChannelKind::Grotto,
        }
    }

    pub fn stream_name(&self) -> Option<&str> {
        match self {
            ChatTarget::Stream(name) => Some(name),
            _ => None,
        }
    }

    /// Stable key identifying the audience, e.g. `stream:peace`.
    pub fn audience_key(&self) -> String {
        match self {
            ChatTarget::World => "world".to_string(),
            ChatTarget::Stream(name) => format!("stream:{name}"),
            ChatTarget::Grotto(users) => format!("grotto:{}", users.join(":")),
        }
    }

    /// Whether a stored message addressed to `self` matches a history query for `query`.
    /// Grotto queries match any grotto containing all queried participants.
    pub fn matches(&self, query: &ChatTarget) -> bool {
        match (self, query) {
            (ChatTarget::World, ChatTarget::World) => true,
            (ChatTarget::Stream(a), ChatTarget::Stream(b)) => a == b,
            (ChatTarget::Grotto(members), ChatTarget::Grotto(wanted)) => {
                wanted.iter().all(|w| members.contains(w))
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SystemMessageType {
    UserJoined,
    UserLeft,
    StreamCreated,
    Announcement,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Reaction {
    pub emoji: String,
    /// Usernames that reacted with this emoji.
    pub users: Vec<String>,
}

/// Who a message is attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub username: String,
    pub avatar: String,
}

/// One persisted unit of chat.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub id: i64,
    /// Text as the author sent it. Never broadcast.
    pub message: String,
    pub filtered_message: String,
    pub username: String,
    pub user_avatar: String,
    pub target: ChatTarget,
    pub timestamp: DateTime<Utc>,
    pub was_filtered: bool,
    pub filter_reasons: Vec<FilterReason>,
    pub reactions: Vec<Reaction>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,
    pub is_system_message: bool,
    pub system_message_type: Option<SystemMessageType>,
}

impl ChatMessage {
    /// A message whose broadcast text is the filter's output for `outcome.original`.
    pub fn from_filtered(
        id: i64,
        author: &Author,
        target: ChatTarget,
        outcome: FilterOutcome,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            message: outcome.original,
            filtered_message: outcome.filtered,
            username: author.username.clone(),
            user_avatar: author.avatar.clone(),
            target,
            timestamp,
            was_filtered: outcome.was_filtered,
            filter_reasons: outcome.reasons,
            reactions: Vec::new(),
            is_deleted: false,
            deleted_at: None,
            deleted_by: None,
            is_system_message: false,
            system_message_type: None,
        }
    }

    /// A message authored by the server itself; its text is already clean.
    pub fn trusted(
        id: i64,
        author: &Author,
        target: ChatTarget,
        text: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let text = text.into();
        Self {
            id,
            filtered_message: text.clone(),
            message: text,
            username: author.username.clone(),
            user_avatar: author.avatar.clone(),
            target,
            timestamp,
            was_filtered: false,
            filter_reasons: Vec::new(),
            reactions: Vec::new(),
            is_deleted: false,
            deleted_at: None,
            deleted_by: None,
            is_system_message: false,
            system_message_type: None,
        }
    }

    pub fn kind(&self) -> ChannelKind {
        self.target.kind()
    }

    /// Add `username` to the reaction for `emoji`. Returns false if already present.
    pub fn add_reaction(&mut self, emoji: &str, username: &str) -> bool {
        let idx = match self.reactions.iter().position(|r| r.emoji == emoji) {
            Some(idx) => idx,
            None => {
                self.reactions.push(Reaction {
                    emoji: emoji.to_string(),
                    users: Vec::new(),
                });
                self.reactions.len() - 1
            }
        };
        let reaction = &mut self.reactions[idx];
        if reaction.users.iter().any(|u| u == username) {
            return false;
        }
        reaction.users.push(username.to_string());
        true
    }

    /// Remove `username` from the reaction for `emoji`, dropping the reaction
    /// once nobody is left. Returns false if nothing changed.
    pub fn remove_reaction(&mut self, emoji: &str, username: &str) -> bool {
        let Some(idx) = self.reactions.iter().position(|r| r.emoji == emoji) else {
            return false;
        };
        let reaction = &mut self.reactions[idx];
        let before = reaction.users.len();
        reaction.users.retain(|u| u != username);
        let changed = reaction.users.len() != before;
        if reaction.users.is_empty() {
            self.reactions.remove(idx);
        }
        changed
    }

    pub fn soft_delete(&mut self, deleted_by: &str, now: DateTime<Utc>) {
        self.is_deleted = true;
        self.deleted_at = Some(now);
        self.deleted_by = Some(deleted_by.to_string());
    }

    pub fn to_public(&self) -> PublicChatMessage {
        PublicChatMessage {
            id: self.id.to_string(),
            message: if self.is_deleted {
                DELETED_PLACEHOLDER.to_string()
            } else {
                self.filtered_message.clone()
            },
            username: self.username.clone(),
            user_avatar: self.user_avatar.clone(),
            chat_type: self.kind(),
            stream_name: self.target.stream_name().map(str::to_string),
            timestamp: self.timestamp,
            reactions: self.reactions.clone(),
            is_system_message: self.is_system_message,
            system_message_type: self.system_message_type,
            is_deleted: self.is_deleted,
        }
    }
}

/// The view of a chat message sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublicChatMessage {
    /// Snowflake ID, serialized as a string.
    pub id: String,
    pub message: String,
    pub username: String,
    pub user_avatar: String,
    pub chat_type: ChannelKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub reactions: Vec<Reaction>,
    pub is_system_message: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_message_type: Option<SystemMessageType>,
    pub is_deleted: bool,
}

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use echo_common::id::{prefix, PrefixedId};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// How many session tokens an identity may hold at once. Issuing another
/// evicts the oldest.
pub const MAX_ACTIVE_TOKENS: usize = 3;

/// A currently valid session token recorded against an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveToken {
    pub token: String,
    pub created_at: DateTime<Utc>,
}

/// A user account as seen by the chat subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub username: String,
    pub bio: String,
    /// Avatar glyph shown next to chat messages.
    pub bloom: String,
    pub bloom_style: String,
    pub color_palette: String,
    pub happy_choice: String,
    pub is_active: bool,
    pub friends_count: u32,
    pub posts_count: u32,
    /// Persisted stream memberships, owned by the profile/stream services.
    pub joined_streams: Vec<String>,
    /// Oldest first; bounded by [`MAX_ACTIVE_TOKENS`].
    pub active_tokens: VecDeque<ActiveToken>,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl PrefixedId for Identity {
    const PREFIX: &'static str = prefix::USER;
}

impl Identity {
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            username: username.into(),
            bio: String::new(),
            bloom: "🌸".to_string(),
            bloom_style: "serene".to_string(),
            color_palette: "sage".to_string(),
            happy_choice: "peaceful".to_string(),
            is_active: true,
            friends_count: 0,
            posts_count: 0,
            joined_streams: Vec::new(),
            active_tokens: VecDeque::new(),
            created_at: now,
            last_seen: now,
        }
    }

    pub fn has_active_token(&self, token: &str) -> bool {
        self.active_tokens.iter().any(|t| t.token == token)
    }

    /// Record a newly issued token, evicting the oldest ones beyond the cap.
    pub fn push_active_token(&mut self, token: impl Into<String>, now: DateTime<Utc>) {
        while self.active_tokens.len() >= MAX_ACTIVE_TOKENS {
            self.active_tokens.pop_front();
        }
        self.active_tokens.push_back(ActiveToken {
            token: token.into(),
            created_at: now,
        });
        self.last_seen = now;
    }

    pub fn to_public_profile(&self) -> PublicProfile {
        PublicProfile {
            username: self.username.clone(),
            bio: self.bio.clone(),
            bloom: self.bloom.clone(),
            bloom_style: self.bloom_style.clone(),
            color_palette: self.color_palette.clone(),
            friends_count: self.friends_count,
            posts_count: self.posts_count,
            join_date: self.created_at,
            last_seen: self.last_seen,
            happy_choice: self.happy_choice.clone(),
        }
    }
}

/// Profile fields safe to show other users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub username: String,
    pub bio: String,
    pub bloom: String,
    pub bloom_style: String,
    pub color_palette: String,
    pub friends_count: u32,
    pub posts_count: u32,
    pub join_date: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub happy_choice: String,
}

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use chrono::{DateTime, Utc};
use echo_common::PrefixedId;
use serde_json::Value;
use tokio::sync::mpsc;

use echo_api::auth::tokens::issue_session_token;
use echo_api::config::Config;
use echo_api::db::identities::{IdentityStore, MemoryIdentityStore};
use echo_api::db::messages::{HistoryQuery, MemoryMessageStore, MessageStore};
use echo_api::db::StoreError;
use echo_api::gateway::events::Outbound;
use echo_api::models::identity::Identity;
use echo_api::models::message::ChatMessage;
use echo_api::AppState;

pub const TEST_SECRET: &str = "echo-test-secret";

/// Defaults with a fixed secret and a known assistant delay window.
pub fn test_config() -> Config {
    let mut config = Config::new(TEST_SECRET);
    config.assistant_delay_min = Duration::from_secs(2);
    config.assistant_delay_max = Duration::from_secs(5);
    config
}

/// Build a test AppState backed by in-memory stores.
pub fn test_state() -> AppState {
    test_state_with(test_config(), Arc::new(MemoryMessageStore::new()))
}

pub fn test_state_with(config: Config, messages: Arc<dyn MessageStore>) -> AppState {
    let identities: Arc<dyn IdentityStore> = Arc::new(MemoryIdentityStore::new());
    AppState::new(config, identities, messages)
}

/// Build the full application router wired to a fresh test state.
pub fn test_app() -> (Router, AppState) {
    let state = test_state();
    let app = echo_api::routes::router().with_state(state.clone());
    (app, state)
}

/// Create an active identity and issue it a session token.
pub async fn seed_user(state: &AppState, username: &str) -> (Identity, String) {
    let identity = Identity::new(Identity::generate(), username);
    state
        .identities
        .save(identity.clone())
        .await
        .expect("save identity");
    let token = login(state, &identity).await;
    (identity, token)
}

/// Issue another session token for an existing identity.
pub async fn login(state: &AppState, identity: &Identity) -> String {
    issue_session_token(&state.tokens, state.identities.as_ref(), identity)
        .await
        .expect("issue token")
}

/// Drain everything queued for a channel-backed connection, decoded as JSON.
pub fn drain(rx: &mut mpsc::Receiver<Outbound>) -> Vec<Value> {
    let mut frames = Vec::new();
    while let Ok(out) = rx.try_recv() {
        if let Outbound::Frame(text) = out {
            frames.push(serde_json::from_str(&text).expect("frame is JSON"));
        }
    }
    frames
}

/// Frames of one `type` from a drained batch.
pub fn of_type<'a>(frames: &'a [Value], kind: &str) -> Vec<&'a Value> {
    frames.iter().filter(|f| f["type"] == kind).collect()
}

/// A message store whose writes always fail.
#[derive(Default)]
pub struct FailingMessageStore;

#[async_trait]
impl MessageStore for FailingMessageStore {
    async fn create_message(&self, _message: ChatMessage) -> Result<ChatMessage, StoreError> {
        Err(StoreError::Unavailable("disk on fire".into()))
    }

    async fn find(&self, _id: i64) -> Result<Option<ChatMessage>, StoreError> {
        Ok(None)
    }

    async fn history(&self, _query: &HistoryQuery) -> Result<Vec<ChatMessage>, StoreError> {
        Err(StoreError::Unavailable("disk on fire".into()))
    }

    async fn update(&self, _message: ChatMessage) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("disk on fire".into()))
    }

    async fn purge_older_than(&self, _cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        Ok(0)
    }
}

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use super::StoreError;
use crate::models::identity::Identity;

/// User accounts as seen by the chat subsystem.
///
/// Account management lives elsewhere; the gateway only reads identities and
/// records newly issued session tokens.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<Identity>, StoreError>;
    /// Active identities only.
    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>, StoreError>;
    /// Insert or replace.
    async fn save(&self, identity: Identity) -> Result<(), StoreError>;
    /// Append a token to the identity's active list, evicting the oldest beyond the cap.
    async fn add_active_token(&self, id: &str, token: &str) -> Result<(), StoreError>;
}

#[derive(Default)]
pub struct MemoryIdentityStore {
    by_id: DashMap<String, Identity>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<Identity>, StoreError> {
        Ok(self.by_id.get(id).map(|e| e.value().clone()))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>, StoreError> {
        Ok(self
            .by_id
            .iter()
            .find(|e| e.is_active && e.username == username)
            .map(|e| e.value().clone()))
    }

    async fn save(&self, identity: Identity) -> Result<(), StoreError> {
        self.by_id.insert(identity.id.clone(), identity);
        Ok(())
    }

    async fn add_active_token(&self, id: &str, token: &str) -> Result<(), StoreError> {
        let mut entry = self.by_id.get_mut(id).ok_or(StoreError::NotFound)?;
        entry.push_active_token(token, Utc::now());
        Ok(())
    }
}

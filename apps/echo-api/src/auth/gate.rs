use std::sync::Arc;

use crate::auth::rate_limit::RateLimiter;
use crate::auth::tokens::TokenCodec;
use crate::db::identities::IdentityStore;
use crate::db::StoreError;
use crate::models::identity::Identity;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("No token provided")]
    MissingToken,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token has expired")]
    Expired,
    #[error("User not found")]
    UserNotFound,
    #[error("User is inactive")]
    Inactive,
    #[error("Token is no longer valid")]
    TokenRevoked,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Admits connections and REST callers, and meters chat actions.
pub struct SessionGate {
    tokens: TokenCodec,
    identities: Arc<dyn IdentityStore>,
    limiter: RateLimiter,
}

impl SessionGate {
    pub fn new(tokens: TokenCodec, identities: Arc<dyn IdentityStore>, limiter: RateLimiter) -> Self {
        Self {
            tokens,
            identities,
            limiter,
        }
    }

    /// Resolve a session token to the identity it was issued to.
    ///
    /// A token must verify, name an existing active identity, and still be in
    /// that identity's active-token list.
    pub async fn authenticate(&self, token: &str) -> Result<Identity, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let claims = self.tokens.verify(token)?;
        let identity = self
            .identities
            .find_by_id(&claims.sub)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !identity.is_active {
            return Err(AuthError::Inactive);
        }
        if !identity.has_active_token(token) {
            return Err(AuthError::TokenRevoked);
        }
        Ok(identity)
    }

    pub fn allow(&self, identity_id: &str) -> bool {
        self.limiter.allow(identity_id)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::auth::tokens::issue_session_token;
    use crate::db::identities::MemoryIdentityStore;

    fn gate(identities: Arc<dyn IdentityStore>, codec: TokenCodec) -> SessionGate {
        SessionGate::new(codec, identities, RateLimiter::new(2, Duration::from_secs(60)))
    }

    #[tokio::test]
    async fn fourth_login_revokes_the_oldest_token() {
        let identities = Arc::new(MemoryIdentityStore::new());
        let codec = TokenCodec::new("secret", Duration::from_secs(3600));
        let identity = Identity::new("usr_1", "river");
        identities.save(identity.clone()).await.unwrap();
        let gate = gate(identities.clone(), codec.clone());

        let mut tokens = Vec::new();
        for _ in 0..4 {
            tokens.push(
                issue_session_token(&codec, identities.as_ref(), &identity)
                    .await
                    .unwrap(),
            );
        }

        assert!(matches!(
            gate.authenticate(&tokens[0]).await,
            Err(AuthError::TokenRevoked)
        ));
        for token in &tokens[1..] {
            assert_eq!(gate.authenticate(token).await.unwrap().id, "usr_1");
        }
    }

    #[tokio::test]
    async fn rejects_missing_unknown_and_inactive() {
        let identities = Arc::new(MemoryIdentityStore::new());
        let codec = TokenCodec::new("secret", Duration::from_secs(3600));
        let gate = gate(identities.clone(), codec.clone());

        assert!(matches!(
            gate.authenticate("  ").await,
            Err(AuthError::MissingToken)
        ));

        let orphan = codec.sign("usr_missing", "nobody").unwrap();
        assert!(matches!(
            gate.authenticate(&orphan).await,
            Err(AuthError::UserNotFound)
        ));

        let mut sleeper = Identity::new("usr_2", "sleeper");
        identities.save(sleeper.clone()).await.unwrap();
        let token = issue_session_token(&codec, identities.as_ref(), &sleeper)
            .await
            .unwrap();
        sleeper = identities.find_by_id("usr_2").await.unwrap().unwrap();
        sleeper.is_active = false;
        identities.save(sleeper).await.unwrap();
        assert!(matches!(
            gate.authenticate(&token).await,
            Err(AuthError::Inactive)
        ));
    }

    #[tokio::test]
    async fn signed_but_unrecorded_token_is_revoked() {
        let identities = Arc::new(MemoryIdentityStore::new());
        let codec = TokenCodec::new("secret", Duration::from_secs(3600));
        identities.save(Identity::new("usr_1", "river")).await.unwrap();
        let gate = gate(identities, codec.clone());

        let token = codec.sign("usr_1", "river").unwrap();
        assert!(matches!(
            gate.authenticate(&token).await,
            Err(AuthError::TokenRevoked)
        ));
    }

    #[tokio::test]
    async fn allow_meters_per_identity() {
        let identities = Arc::new(MemoryIdentityStore::new());
        let gate = gate(identities, TokenCodec::new("secret", Duration::from_secs(60)));
        assert!(gate.allow("usr_1"));
        assert!(gate.allow("usr_1"));
        assert!(!gate.allow("usr_1"));
        assert!(gate.allow("usr_2"));
    }
}

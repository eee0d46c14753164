//! Session tokens: HS256 JWTs carrying the identity they were issued to.

use std::time::Duration;

use chrono::Utc;
use echo_common::id::{prefix, prefixed_ulid};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::auth::gate::AuthError;
use crate::db::identities::IdentityStore;
use crate::error::ApiError;
use crate::models::identity::Identity;

/// Claims embedded in a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Identity ID.
    pub sub: String,
    pub username: String,
    pub iat: i64,
    pub exp: i64,
    /// Unique per token, so two tokens minted in the same second differ.
    pub jti: String,
}

/// Signs and verifies session tokens with a shared secret.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenCodec {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn sign(&self, user_id: &str, username: &str) -> Result<String, ApiError> {
        self.sign_with_ttl(user_id, username, self.ttl)
    }

    pub fn sign_with_ttl(
        &self,
        user_id: &str,
        username: &str,
        ttl: Duration,
    ) -> Result<String, ApiError> {
        let now = Utc::now().timestamp();
        let claims = SessionClaims {
            sub: user_id.to_string(),
            username: username.to_string(),
            iat: now,
            exp: now.saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)),
            jti: prefixed_ulid(prefix::TOKEN),
        };
        self.encode(&claims)
    }

    /// Sign arbitrary claims. Used to mint tokens with a fixed `exp`.
    pub fn encode(&self, claims: &SessionClaims) -> Result<String, ApiError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding).map_err(|e| {
            tracing::error!(?e, "failed to sign session token");
            ApiError::internal("Token signing failed")
        })
    }

    /// Check signature and expiry.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        jsonwebtoken::decode::<SessionClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => {
                    tracing::debug!(?e, "session token rejected");
                    AuthError::InvalidToken
                }
            })
    }
}

/// Sign a token for `identity` and record it in the identity's active-token list.
pub async fn issue_session_token(
    codec: &TokenCodec,
    identities: &dyn IdentityStore,
    identity: &Identity,
) -> Result<String, ApiError> {
    let token = codec.sign(&identity.id, &identity.username)?;
    identities.add_active_token(&identity.id, &token).await?;
    Ok(token)
}

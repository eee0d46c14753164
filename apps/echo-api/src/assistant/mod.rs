//! FINN, the scripted dolphin persona that answers support keywords and
//! nudges chatty pairs toward a private grotto.

pub mod monitor;
pub mod scheduler;
pub mod triggers;

use echo_common::id::PrefixedId;

use crate::db::identities::IdentityStore;
use crate::db::StoreError;
use crate::models::identity::Identity;

pub const ASSISTANT_USERNAME: &str = "FINN";
pub const ASSISTANT_BLOOM: &str = "🐬";

const ASSISTANT_BIO: &str = "Friendly dolphin spreading joy and wisdom across the digital seas. Always here to help fellow Echo travelers find their peaceful path. 🌊✨";

/// A fresh identity carrying the assistant's fixed profile.
pub fn assistant_profile() -> Identity {
    let mut finn = Identity::new(Identity::generate(), ASSISTANT_USERNAME);
    finn.bio = ASSISTANT_BIO.to_string();
    finn.bloom = ASSISTANT_BLOOM.to_string();
    finn.bloom_style = "cosmic".to_string();
    finn.color_palette = "teal".to_string();
    finn.happy_choice = "inspired".to_string();
    finn
}

/// Look up the assistant's identity, creating it on first start.
pub async fn ensure_assistant_identity(
    identities: &dyn IdentityStore,
) -> Result<Identity, StoreError> {
    if let Some(existing) = identities.find_by_username(ASSISTANT_USERNAME).await? {
        return Ok(existing);
    }

    let finn = assistant_profile();
    identities.save(finn.clone()).await?;
    tracing::info!(user_id = %finn.id, "created assistant identity");
    Ok(finn)
}

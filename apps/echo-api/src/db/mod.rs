pub mod identities;
pub mod messages;

/// Failure reported by a storage collaborator.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("record not found")]
    NotFound,
}

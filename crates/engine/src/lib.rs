pub mod dispatcher;
pub mod memory;
pub mod outbox;
pub mod repository;

use thiserror::Error;

/// Persistence failure in the link registry or the outbox.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The row was claimed again (or otherwise rewritten) after this worker
    /// claimed it.
    #[error("link {link_id} no longer at version {expected}")]
    VersionConflict { link_id: i64, expected: i64 },
}

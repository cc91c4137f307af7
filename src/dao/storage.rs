use std::error::Error;
use thiserror::Error;
use uuid::Uuid;

use crate::dao::models::LobbyStatusEntity;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}

/// Result of a conditional lobby write.
///
/// `Conflict` means the stored version no longer matched the expected one and
/// nothing was written; callers re-read the lobby and replan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The lobby (and the booking, when one rode along) was persisted.
    Applied,
    /// Another writer committed first; the store was left untouched.
    Conflict,
}

/// Server-side filter for lobby listings.
#[derive(Debug, Clone, Copy, Default)]
pub struct LobbyFilter {
    /// Restrict to lobbies attached to this facility.
    pub facility_id: Option<Uuid>,
    /// Restrict to lobbies in this lifecycle status.
    pub status: Option<LobbyStatusEntity>,
}

use mongodb::error::{Error as MongoError, TRANSIENT_TRANSACTION_ERROR};
use thiserror::Error;
use uuid::Uuid;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to insert lobby `{id}`")]
    InsertLobby {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to commit lobby `{id}`")]
    CommitLobby {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load lobby `{id}`")]
    LoadLobby {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to list lobbies")]
    ListLobbies {
        #[source]
        source: MongoError,
    },
    #[error("failed to insert booking `{id}`")]
    InsertBooking {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load booking `{id}`")]
    LoadBooking {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load facility `{id}`")]
    LoadFacility {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to save facility `{id}`")]
    SaveFacility {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to open a MongoDB session")]
    StartSession {
        #[source]
        source: MongoError,
    },
    #[error("transaction failed while committing lobby `{id}`")]
    Transaction {
        id: Uuid,
        #[source]
        source: MongoError,
    },
}

impl MongoDaoError {
    /// Whether the driver labelled the wrapped failure transient, meaning
    /// the transaction lost a race with a concurrent writer and the work can
    /// be retried from a fresh snapshot.
    pub(crate) fn is_transient_transaction_error(&self) -> bool {
        match self {
            MongoDaoError::CommitLobby { source, .. }
            | MongoDaoError::InsertBooking { source, .. }
            | MongoDaoError::Transaction { source, .. } => {
                source.contains_label(TRANSIENT_TRANSACTION_ERROR)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlabelled_failures_are_not_transient() {
        let err = MongoDaoError::CommitLobby {
            id: Uuid::new_v4(),
            source: MongoError::custom("connection reset by peer".to_owned()),
        };
        assert!(!err.is_transient_transaction_error());

        let err = MongoDaoError::HealthPing {
            source: MongoError::custom("connection reset by peer".to_owned()),
        };
        assert!(!err.is_transient_transaction_error());
    }
}

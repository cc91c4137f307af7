use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;
use validator::ValidationErrors;

use crate::{
    dao::storage::StorageError,
    state::{lobby::LobbyStatus, machine::TransitionError},
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// No lobby exists under the given identifier.
    #[error("lobby `{0}` not found")]
    LobbyNotFound(Uuid),
    /// No booking exists under the given identifier.
    #[error("booking `{0}` not found")]
    BookingNotFound(Uuid),
    /// The lobby references a facility the catalog does not know.
    #[error("facility `{0}` not found")]
    FacilityNotFound(Uuid),
    /// Join attempted on a cancelled or expired lobby.
    #[error("lobby is {status} and does not accept joins")]
    LobbyNotJoinable {
        /// Status that blocked the join.
        status: LobbyStatus,
    },
    /// Leave or cancel attempted on a lobby in a terminal status.
    #[error("lobby is {status} and can no longer change")]
    LobbyClosed {
        /// Terminal status the lobby already reached.
        status: LobbyStatus,
    },
    /// The user already holds a membership row in the lobby.
    #[error("user `{user_id}` already belongs to this lobby")]
    AlreadyJoined {
        /// User who attempted the duplicate join.
        user_id: Uuid,
    },
    /// The user holds no membership row in the lobby.
    #[error("user `{user_id}` is not a participant of this lobby")]
    NotAParticipant {
        /// User who attempted the operation.
        user_id: Uuid,
    },
    /// The user is not allowed to perform this operation.
    #[error("user `{user_id}` is not authorized for this operation")]
    NotAuthorized {
        /// User who attempted the operation.
        user_id: Uuid,
    },
    /// The conditional update kept losing to concurrent writers.
    #[error("lobby `{0}` is under concurrent modification, try again")]
    Contention(Uuid),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<TransitionError> for ServiceError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::NotJoinable { status } => ServiceError::LobbyNotJoinable { status },
            TransitionError::AlreadyJoined { user_id } => ServiceError::AlreadyJoined { user_id },
            TransitionError::NotAParticipant { user_id } => {
                ServiceError::NotAParticipant { user_id }
            }
            TransitionError::NotCreator { user_id } => ServiceError::NotAuthorized { user_id },
            TransitionError::Closed { status } => ServiceError::LobbyClosed { status },
        }
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(err: ValidationErrors) -> Self {
        ServiceError::InvalidInput(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
///
/// Each error carries a stable machine-readable `kind` so API clients can
/// tell conflict flavors apart without parsing the human-readable message.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {message}")]
    BadRequest {
        /// Stable error kind.
        kind: &'static str,
        /// Human-readable description.
        message: String,
    },
    /// Request carries no usable caller identity.
    #[error("unauthorized: {message}")]
    Unauthorized {
        /// Stable error kind.
        kind: &'static str,
        /// Human-readable description.
        message: String,
    },
    /// The caller is identified but not allowed to do this.
    #[error("forbidden: {message}")]
    Forbidden {
        /// Stable error kind.
        kind: &'static str,
        /// Human-readable description.
        message: String,
    },
    /// Requested resource not found.
    #[error("not found: {message}")]
    NotFound {
        /// Stable error kind.
        kind: &'static str,
        /// Human-readable description.
        message: String,
    },
    /// Conflict with the lobby's current state.
    #[error("conflict: {message}")]
    Conflict {
        /// Stable error kind.
        kind: &'static str,
        /// Human-readable description.
        message: String,
    },
    /// Service unavailable or degraded.
    #[error("service unavailable: {message}")]
    ServiceUnavailable {
        /// Stable error kind.
        kind: &'static str,
        /// Human-readable description.
        message: String,
    },
    /// Internal server error.
    #[error("internal error: {message}")]
    Internal {
        /// Stable error kind.
        kind: &'static str,
        /// Human-readable description.
        message: String,
    },
}

impl AppError {
    /// Build a 401 response with the given kind.
    pub fn unauthorized(kind: &'static str, message: impl Into<String>) -> Self {
        AppError::Unauthorized {
            kind,
            message: message.into(),
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::Unavailable(_) => AppError::ServiceUnavailable {
                kind: "storage_unavailable",
                message,
            },
            ServiceError::Degraded => AppError::ServiceUnavailable {
                kind: "degraded_mode",
                message,
            },
            ServiceError::LobbyNotFound(_) => AppError::NotFound {
                kind: "lobby_not_found",
                message,
            },
            ServiceError::BookingNotFound(_) => AppError::NotFound {
                kind: "booking_not_found",
                message,
            },
            ServiceError::FacilityNotFound(_) => AppError::NotFound {
                kind: "facility_not_found",
                message,
            },
            ServiceError::LobbyNotJoinable { .. } => AppError::Conflict {
                kind: "lobby_not_joinable",
                message,
            },
            ServiceError::LobbyClosed { .. } => AppError::Conflict {
                kind: "lobby_closed",
                message,
            },
            ServiceError::AlreadyJoined { .. } => AppError::Conflict {
                kind: "already_joined",
                message,
            },
            ServiceError::NotAParticipant { .. } => AppError::Conflict {
                kind: "not_a_participant",
                message,
            },
            ServiceError::NotAuthorized { .. } => AppError::Forbidden {
                kind: "not_authorized",
                message,
            },
            ServiceError::Contention(_) => AppError::Conflict {
                kind: "concurrent_update_conflict",
                message,
            },
            ServiceError::InvalidInput(_) => AppError::BadRequest {
                kind: "invalid_input",
                message,
            },
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    kind: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            AppError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let (kind, message) = match self {
            AppError::BadRequest { kind, message }
            | AppError::Unauthorized { kind, message }
            | AppError::Forbidden { kind, message }
            | AppError::NotFound { kind, message }
            | AppError::Conflict { kind, message }
            | AppError::ServiceUnavailable { kind, message }
            | AppError::Internal { kind, message } => (kind, message),
        };

        let payload = Json(ErrorBody { kind, message });

        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_errors_map_to_their_service_kinds() {
        let user_id = Uuid::new_v4();

        let err: ServiceError = TransitionError::NotCreator { user_id }.into();
        assert!(matches!(err, ServiceError::NotAuthorized { user_id: u } if u == user_id));

        let err: ServiceError = TransitionError::NotJoinable {
            status: LobbyStatus::Expired,
        }
        .into();
        assert!(matches!(
            err,
            ServiceError::LobbyNotJoinable {
                status: LobbyStatus::Expired
            }
        ));
    }

    #[test]
    fn service_errors_pick_distinct_conflict_kinds() {
        let joined: AppError = ServiceError::AlreadyJoined {
            user_id: Uuid::new_v4(),
        }
        .into();
        let contended: AppError = ServiceError::Contention(Uuid::new_v4()).into();

        let AppError::Conflict { kind: first, .. } = joined else {
            panic!("expected conflict");
        };
        let AppError::Conflict { kind: second, .. } = contended else {
            panic!("expected conflict");
        };
        assert_eq!(first, "already_joined");
        assert_eq!(second, "concurrent_update_conflict");
    }

    #[test]
    fn authorization_failure_is_forbidden_not_unauthorized() {
        let err: AppError = ServiceError::NotAuthorized {
            user_id: Uuid::new_v4(),
        }
        .into();
        assert!(matches!(err, AppError::Forbidden { .. }));
    }
}

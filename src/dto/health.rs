use serde::Serialize;
use utoipa::ToSchema;

/// Health probe outcome.
#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Storage reachable, all operations available.
    Ok,
    /// Running without storage; mutating operations fail fast.
    Degraded,
}

/// Body returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Overall service health.
    pub status: HealthStatus,
}

impl HealthResponse {
    /// Health response for a fully operational service.
    pub fn ok() -> Self {
        Self {
            status: HealthStatus::Ok,
        }
    }

    /// Health response for a service running in degraded mode.
    pub fn degraded() -> Self {
        Self {
            status: HealthStatus::Degraded,
        }
    }
}

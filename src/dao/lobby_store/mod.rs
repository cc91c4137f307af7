/// In-memory backend for tests and single-node deployments.
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::{BookingEntity, FacilityEntity, LobbyEntity};
use crate::dao::storage::{CommitOutcome, LobbyFilter, StorageResult};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::SystemTime;
use uuid::Uuid;

/// Abstraction over the persistence layer for lobbies and their bookings.
///
/// `commit_lobby` is the concurrency primitive: it persists a new revision of
/// the aggregate only if the stored version still equals `expected_version`,
/// and atomically inserts the booking when the write crosses the fill
/// threshold. All lobby mutations in the service layer go through it.
pub trait LobbyStore: Send + Sync {
    /// Persist a freshly created lobby, with its booking when the lobby
    /// filled at creation time.
    fn insert_lobby(
        &self,
        lobby: LobbyEntity,
        booking: Option<BookingEntity>,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Load one lobby aggregate.
    fn find_lobby(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<LobbyEntity>>>;
    /// List lobbies matching the filter, ordered by window start.
    fn list_lobbies(&self, filter: LobbyFilter)
    -> BoxFuture<'static, StorageResult<Vec<LobbyEntity>>>;
    /// List open lobbies whose window start is at or before `before`.
    fn list_overdue(
        &self,
        before: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Vec<LobbyEntity>>>;
    /// Conditionally replace a lobby revision, inserting `booking` in the
    /// same atomic unit when present.
    fn commit_lobby(
        &self,
        expected_version: u64,
        lobby: LobbyEntity,
        booking: Option<BookingEntity>,
    ) -> BoxFuture<'static, StorageResult<CommitOutcome>>;
    /// Load one booking.
    fn find_booking(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<BookingEntity>>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Read access to the facility catalog, used to price bookings.
pub trait FacilityCatalog: Send + Sync {
    /// Load one facility.
    fn find_facility(&self, id: Uuid)
    -> BoxFuture<'static, StorageResult<Option<FacilityEntity>>>;
    /// Insert or replace a facility. Used by seeding and ops tooling; the
    /// catalog is otherwise written by the facility service.
    fn upsert_facility(&self, facility: FacilityEntity) -> BoxFuture<'static, StorageResult<()>>;
}

/// The storage handles the rest of the application works with.
#[derive(Clone)]
pub struct Backends {
    /// Lobby and booking persistence.
    pub lobbies: Arc<dyn LobbyStore>,
    /// Facility catalog read model.
    pub facilities: Arc<dyn FacilityCatalog>,
}

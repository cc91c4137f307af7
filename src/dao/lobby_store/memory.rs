//! In-memory storage backend.
//!
//! Backs tests and single-node deployments. Per-lobby atomicity comes from
//! the map's shard lock: `commit_lobby` checks the version and swaps the
//! aggregate while holding the entry guard, so two racing commits on the same
//! lobby serialize and the loser sees a conflict.

use crate::dao::lobby_store::{FacilityCatalog, LobbyStore};
use crate::dao::models::{BookingEntity, FacilityEntity, LobbyEntity, LobbyStatusEntity};
use crate::dao::storage::{CommitOutcome, LobbyFilter, StorageResult};
use dashmap::DashMap;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::SystemTime;
use uuid::Uuid;

#[derive(Default)]
struct MemoryInner {
    lobbies: DashMap<Uuid, LobbyEntity>,
    bookings: DashMap<Uuid, BookingEntity>,
    facilities: DashMap<Uuid, FacilityEntity>,
}

/// Process-local implementation of the storage traits.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn booking_count(&self) -> usize {
        self.inner.bookings.len()
    }
}

impl LobbyStore for MemoryStore {
    fn insert_lobby(
        &self,
        lobby: LobbyEntity,
        booking: Option<BookingEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            if let Some(booking) = booking {
                inner.bookings.insert(booking.id, booking);
            }
            inner.lobbies.insert(lobby.id, lobby);
            Ok(())
        })
    }

    fn find_lobby(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<LobbyEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.lobbies.get(&id).map(|entry| entry.clone())) })
    }

    fn list_lobbies(
        &self,
        filter: LobbyFilter,
    ) -> BoxFuture<'static, StorageResult<Vec<LobbyEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut lobbies: Vec<LobbyEntity> = inner
                .lobbies
                .iter()
                .filter(|entry| {
                    filter
                        .facility_id
                        .is_none_or(|facility_id| entry.facility_id == facility_id)
                        && filter.status.is_none_or(|status| entry.status == status)
                })
                .map(|entry| entry.clone())
                .collect();
            lobbies.sort_by_key(|lobby| lobby.window.starts_at);
            Ok(lobbies)
        })
    }

    fn list_overdue(
        &self,
        before: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Vec<LobbyEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let overdue = inner
                .lobbies
                .iter()
                .filter(|entry| {
                    entry.status == LobbyStatusEntity::Open && entry.window.starts_at <= before
                })
                .map(|entry| entry.clone())
                .collect();
            Ok(overdue)
        })
    }

    fn commit_lobby(
        &self,
        expected_version: u64,
        lobby: LobbyEntity,
        booking: Option<BookingEntity>,
    ) -> BoxFuture<'static, StorageResult<CommitOutcome>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            // The guard pins the shard for the whole check-and-swap.
            let Some(mut current) = inner.lobbies.get_mut(&lobby.id) else {
                return Ok(CommitOutcome::Conflict);
            };
            if current.version != expected_version {
                return Ok(CommitOutcome::Conflict);
            }
            if let Some(booking) = booking {
                inner.bookings.insert(booking.id, booking);
            }
            *current = lobby;
            Ok(CommitOutcome::Applied)
        })
    }

    fn find_booking(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<BookingEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.bookings.get(&id).map(|entry| entry.clone())) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

impl FacilityCatalog for MemoryStore {
    fn find_facility(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<FacilityEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.facilities.get(&id).map(|entry| entry.clone())) })
    }

    fn upsert_facility(&self, facility: FacilityEntity) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.facilities.insert(facility.id, facility);
            Ok(())
        })
    }
}

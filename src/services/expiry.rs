//! Time-based expiry of open lobbies.
//!
//! A lobby that never fills must stop accepting joins once its window start
//! has passed. The sweeper scans for such lobbies and retires them one
//! conditional update at a time, so an expiry never tramples a join,
//! cancellation or fill that landed first.

use std::time::SystemTime;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::{
    dao::storage::CommitOutcome,
    error::ServiceError,
    state::{SharedState, lobby::Lobby, machine},
};

/// Mark overdue open lobbies as expired and return how many were retired.
///
/// Lobbies that changed between the scan and the commit lose the conditional
/// update and are left for the next sweep.
pub async fn expire_overdue(state: &SharedState, now: SystemTime) -> Result<usize, ServiceError> {
    let backends = state.require_backends().await?;
    let overdue = backends.lobbies.list_overdue(now).await?;

    let mut expired = 0;
    for entity in overdue {
        let mut lobby = Lobby::from(entity);
        let expected_version = lobby.version;

        // The scan returns open lobbies only; anything else is skipped.
        if machine::expire(&mut lobby).is_err() {
            continue;
        }
        lobby.version += 1;
        lobby.updated_at = now;

        match backends
            .lobbies
            .commit_lobby(expected_version, lobby.clone().into(), None)
            .await?
        {
            CommitOutcome::Applied => {
                info!(lobby_id = %lobby.id, "lobby expired");
                expired += 1;
            }
            CommitOutcome::Conflict => {
                debug!(
                    lobby_id = %lobby.id,
                    "expiry lost the conditional update, leaving the lobby to the next sweep"
                );
            }
        }
    }

    Ok(expired)
}

/// Drive [`expire_overdue`] on the configured interval until shutdown.
///
/// Sweeps are skipped while the application runs degraded; the watch channel
/// flips back once the storage supervisor reinstalls the backends.
pub async fn run_sweeper(state: SharedState) {
    let interval = state.config().expiry_sweep_interval;
    let mut degraded = state.degraded_watcher();
    loop {
        sleep(interval).await;
        if *degraded.borrow_and_update() {
            continue;
        }
        if let Err(err) = expire_overdue(&state, SystemTime::now()).await {
            warn!(error = %err, "expiry sweep failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use time::OffsetDateTime;
    use uuid::Uuid;

    use crate::{
        config::AppConfig,
        dao::{
            lobby_store::{Backends, FacilityCatalog, memory::MemoryStore},
            models::{FacilityEntity, PriceEntity},
        },
        dto::lobby::{CreateLobbyRequest, LobbyStatusDto, TimeWindowInput},
        error::ServiceError,
        services::lobby_service,
        state::{AppState, lobby::LobbyStatus},
    };

    async fn seeded_state() -> (SharedState, Uuid) {
        let state = AppState::new(AppConfig::default());
        let store = MemoryStore::new();
        let facility = FacilityEntity {
            id: Uuid::new_v4(),
            name: "Court 1".into(),
            hourly_price: PriceEntity {
                amount_minor: 3000,
                currency: "EUR".into(),
            },
        };
        store.upsert_facility(facility.clone()).await.unwrap();
        state
            .install_backends(Backends {
                lobbies: Arc::new(store.clone()),
                facilities: Arc::new(store),
            })
            .await;
        (state, facility.id)
    }

    fn request_starting_in(facility_id: Uuid, hours: i64, capacity: u32) -> CreateLobbyRequest {
        let starts_at = OffsetDateTime::now_utc() + time::Duration::hours(hours);
        CreateLobbyRequest {
            facility_id,
            window: TimeWindowInput {
                starts_at,
                ends_at: starts_at + time::Duration::hours(1),
            },
            capacity,
            initial_group_size: 1,
            note: None,
        }
    }

    #[tokio::test]
    async fn sweep_retires_only_overdue_open_lobbies() {
        let (state, facility_id) = seeded_state().await;
        let creator = Uuid::new_v4();

        let overdue =
            lobby_service::create_lobby(&state, creator, request_starting_in(facility_id, -2, 4))
                .await
                .unwrap();
        let upcoming =
            lobby_service::create_lobby(&state, creator, request_starting_in(facility_id, 2, 4))
                .await
                .unwrap();
        // Filled before its start; owns a booking, the sweeper leaves it be.
        let filled = {
            let mut request = request_starting_in(facility_id, -2, 2);
            request.initial_group_size = 2;
            lobby_service::create_lobby(&state, creator, request)
                .await
                .unwrap()
        };

        let count = expire_overdue(&state, SystemTime::now()).await.unwrap();

        assert_eq!(count, 1);
        let retired = lobby_service::get_lobby(&state, overdue.id).await.unwrap();
        assert_eq!(retired.status, LobbyStatusDto::Expired);
        let kept = lobby_service::get_lobby(&state, upcoming.id).await.unwrap();
        assert_eq!(kept.status, LobbyStatusDto::Open);
        let booked = lobby_service::get_lobby(&state, filled.id).await.unwrap();
        assert_eq!(booked.status, LobbyStatusDto::Filled);
    }

    #[tokio::test]
    async fn expired_lobbies_reject_joins() {
        let (state, facility_id) = seeded_state().await;
        let lobby = lobby_service::create_lobby(
            &state,
            Uuid::new_v4(),
            request_starting_in(facility_id, -1, 4),
        )
        .await
        .unwrap();

        expire_overdue(&state, SystemTime::now()).await.unwrap();

        let err = lobby_service::join_lobby(&state, lobby.id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::LobbyNotJoinable {
                status: LobbyStatus::Expired
            }
        ));
    }

    #[tokio::test]
    async fn sweep_is_idempotent() {
        let (state, facility_id) = seeded_state().await;
        lobby_service::create_lobby(
            &state,
            Uuid::new_v4(),
            request_starting_in(facility_id, -1, 4),
        )
        .await
        .unwrap();

        assert_eq!(expire_overdue(&state, SystemTime::now()).await.unwrap(), 1);
        assert_eq!(expire_overdue(&state, SystemTime::now()).await.unwrap(), 0);
    }
}

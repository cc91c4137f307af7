//! Lobby lifecycle coordination.
//!
//! Every mutation follows the same shape: load a snapshot, let
//! [`state::machine`](crate::state::machine) plan the transition on it, then
//! commit the plan through the store's conditional update. A lost commit
//! means another writer landed first; the operation replans from a fresh
//! snapshot until it sticks or the retry budget runs out. The booking
//! produced by a fill transition travels inside the same commit, so a lobby
//! can never be observed filled without its booking.

use std::time::SystemTime;

use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::{
        lobby_store::Backends,
        models::FacilityEntity,
        storage::{CommitOutcome, LobbyFilter},
    },
    dto::lobby::{
        CreateLobbyRequest, JoinResponse, LeaveResponse, ListLobbiesQuery, LobbyDetail,
        LobbySummary, ParticipantStateDto,
    },
    error::ServiceError,
    services::booking_service,
    state::{
        SharedState,
        lobby::{Lobby, LobbyStatus},
        machine::{self, JoinOutcome, LeaveOutcome, NewLobby},
    },
};

/// Open a new lobby for a facility slot.
///
/// The creator becomes the first active participant and their declared
/// companions are folded into `active_count`. A group size equal to the
/// capacity fills the lobby immediately and creates the booking within the
/// same insert.
pub async fn create_lobby(
    state: &SharedState,
    creator_id: Uuid,
    request: CreateLobbyRequest,
) -> Result<LobbySummary, ServiceError> {
    request.validate()?;

    let backends = state.require_backends().await?;
    let facility = find_facility(&backends, request.facility_id).await?;

    let now = SystemTime::now();
    let mut lobby = machine::create(
        NewLobby {
            facility_id: request.facility_id,
            creator_id,
            window: (&request.window).into(),
            capacity: request.capacity,
            initial_group_size: request.initial_group_size,
            note: request.note,
        },
        now,
    );

    let booking = if lobby.status == LobbyStatus::Filled {
        let booking = booking_service::build_pending_booking(&lobby, &facility, now);
        lobby.booking_id = Some(booking.id);
        Some(booking)
    } else {
        None
    };

    backends
        .lobbies
        .insert_lobby(lobby.clone().into(), booking)
        .await?;
    info!(
        lobby_id = %lobby.id,
        facility_id = %lobby.facility_id,
        capacity = lobby.capacity,
        status = %lobby.status,
        "lobby created"
    );

    Ok(lobby.into())
}

/// Join a lobby, taking an active slot when one is free or queueing on the
/// waitlist otherwise.
///
/// When the join reaches capacity for the first time, the booking is built
/// and committed atomically with the fill transition.
pub async fn join_lobby(
    state: &SharedState,
    lobby_id: Uuid,
    user_id: Uuid,
) -> Result<JoinResponse, ServiceError> {
    let backends = state.require_backends().await?;

    for attempt in 1..=state.config().commit_retry_budget {
        let mut lobby = load_lobby(&backends, lobby_id).await?;
        let expected_version = lobby.version;
        let now = SystemTime::now();

        let outcome = machine::admit(&mut lobby, user_id, now)?;

        // A fill only triggers the booking once: a lobby that reverted to
        // open and refills keeps the booking from its first fill.
        let booking = match outcome {
            JoinOutcome::Admitted { filled: true } if lobby.booking_id.is_none() => {
                let facility = find_facility(&backends, lobby.facility_id).await?;
                let booking = booking_service::build_pending_booking(&lobby, &facility, now);
                lobby.booking_id = Some(booking.id);
                Some(booking)
            }
            _ => None,
        };

        lobby.version += 1;
        lobby.updated_at = now;

        match backends
            .lobbies
            .commit_lobby(expected_version, lobby.clone().into(), booking)
            .await?
        {
            CommitOutcome::Applied => {
                let (participant_state, waiting_position, filled) = match outcome {
                    JoinOutcome::Admitted { filled } => (ParticipantStateDto::Active, None, filled),
                    JoinOutcome::Waitlisted { position } => {
                        (ParticipantStateDto::Waiting, Some(position), false)
                    }
                };
                if filled {
                    info!(lobby_id = %lobby_id, "lobby filled, booking created");
                }
                return Ok(JoinResponse {
                    lobby_id,
                    user_id,
                    state: participant_state,
                    waiting_position,
                    filled,
                    booking_id: lobby.booking_id,
                });
            }
            CommitOutcome::Conflict => {
                debug!(lobby_id = %lobby_id, attempt, "join lost the conditional update, replanning");
            }
        }
    }

    warn!(lobby_id = %lobby_id, "join exhausted its commit retry budget");
    Err(ServiceError::Contention(lobby_id))
}

/// Leave a lobby.
///
/// An active leaver hands their slot to the head of the waitlist when one
/// exists; otherwise the active count drops and a filled lobby reopens. A
/// waiting leaver just vacates their queue position.
pub async fn leave_lobby(
    state: &SharedState,
    lobby_id: Uuid,
    user_id: Uuid,
) -> Result<LeaveResponse, ServiceError> {
    let (outcome, lobby) =
        commit_planned(state, lobby_id, |lobby| Ok(machine::release(lobby, user_id)?)).await?;

    let promoted_user_id = match outcome {
        LeaveOutcome::Promoted { user_id } => {
            info!(lobby_id = %lobby_id, promoted = %user_id, "waitlist head promoted");
            Some(user_id)
        }
        LeaveOutcome::SlotFreed { reopened } => {
            if reopened {
                info!(lobby_id = %lobby_id, "lobby reopened after an active member left");
            }
            None
        }
        LeaveOutcome::WaiterRemoved { .. } => None,
    };

    Ok(LeaveResponse {
        lobby_id,
        user_id,
        promoted_user_id,
        status: lobby.status.into(),
    })
}

/// Cancel a lobby on behalf of its creator.
pub async fn cancel_lobby(
    state: &SharedState,
    lobby_id: Uuid,
    user_id: Uuid,
) -> Result<(), ServiceError> {
    commit_planned(state, lobby_id, |lobby| Ok(machine::cancel(lobby, user_id)?)).await?;
    info!(lobby_id = %lobby_id, "lobby cancelled by its creator");
    Ok(())
}

/// Fetch a lobby including its full roster.
pub async fn get_lobby(state: &SharedState, lobby_id: Uuid) -> Result<LobbyDetail, ServiceError> {
    let backends = state.require_backends().await?;
    let lobby = load_lobby(&backends, lobby_id).await?;
    Ok(lobby.into())
}

/// List lobbies, optionally narrowed by facility and status.
pub async fn list_lobbies(
    state: &SharedState,
    query: ListLobbiesQuery,
) -> Result<Vec<LobbySummary>, ServiceError> {
    let backends = state.require_backends().await?;
    let filter = LobbyFilter {
        facility_id: query.facility_id,
        status: query.status.map(LobbyStatus::from).map(Into::into),
    };
    let lobbies = backends.lobbies.list_lobbies(filter).await?;
    Ok(lobbies
        .into_iter()
        .map(Lobby::from)
        .map(LobbySummary::from)
        .collect())
}

/// Plan a transition on a fresh snapshot and commit it, replanning on
/// conflict until the retry budget runs out.
///
/// Joins do not go through here: their fill path must also thread a booking
/// into the commit.
async fn commit_planned<T>(
    state: &SharedState,
    lobby_id: Uuid,
    mut plan: impl FnMut(&mut Lobby) -> Result<T, ServiceError>,
) -> Result<(T, Lobby), ServiceError> {
    let backends = state.require_backends().await?;

    for attempt in 1..=state.config().commit_retry_budget {
        let mut lobby = load_lobby(&backends, lobby_id).await?;
        let expected_version = lobby.version;

        let value = plan(&mut lobby)?;

        lobby.version += 1;
        lobby.updated_at = SystemTime::now();

        match backends
            .lobbies
            .commit_lobby(expected_version, lobby.clone().into(), None)
            .await?
        {
            CommitOutcome::Applied => return Ok((value, lobby)),
            CommitOutcome::Conflict => {
                debug!(lobby_id = %lobby_id, attempt, "commit lost the conditional update, replanning");
            }
        }
    }

    warn!(lobby_id = %lobby_id, "commit retry budget exhausted");
    Err(ServiceError::Contention(lobby_id))
}

async fn load_lobby(backends: &Backends, lobby_id: Uuid) -> Result<Lobby, ServiceError> {
    backends
        .lobbies
        .find_lobby(lobby_id)
        .await?
        .map(Lobby::from)
        .ok_or(ServiceError::LobbyNotFound(lobby_id))
}

async fn find_facility(
    backends: &Backends,
    facility_id: Uuid,
) -> Result<FacilityEntity, ServiceError> {
    backends
        .facilities
        .find_facility(facility_id)
        .await?
        .ok_or(ServiceError::FacilityNotFound(facility_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use futures::future::{BoxFuture, join_all};
    use time::OffsetDateTime;

    use crate::{
        config::AppConfig,
        dao::{
            lobby_store::{FacilityCatalog, LobbyStore, memory::MemoryStore},
            models::{BookingEntity, LobbyEntity, PriceEntity},
            storage::StorageResult,
        },
        dto::lobby::{LobbyStatusDto, TimeWindowInput},
        error::AppError,
        state::AppState,
    };

    async fn test_state() -> (SharedState, MemoryStore, Uuid) {
        state_with_budget(4).await
    }

    async fn state_with_budget(budget: u32) -> (SharedState, MemoryStore, Uuid) {
        let config = AppConfig {
            commit_retry_budget: budget,
            ..AppConfig::default()
        };
        let state = AppState::new(config);
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
                facilities: Arc::new(store.clone()),
            })
            .await;
        (state, store, facility.id)
    }

    fn create_request(facility_id: Uuid, capacity: u32, group_size: u32) -> CreateLobbyRequest {
        let starts_at = OffsetDateTime::now_utc() + time::Duration::hours(2);
        CreateLobbyRequest {
            facility_id,
            window: TimeWindowInput {
                starts_at,
                ends_at: starts_at + time::Duration::hours(1),
            },
            capacity,
            initial_group_size: group_size,
            note: None,
        }
    }

    // Reads come from the wrapped store, but every conditional commit loses,
    // as if another writer always lands first.
    struct ContendedStore(MemoryStore);

    impl LobbyStore for ContendedStore {
        fn insert_lobby(
            &self,
            lobby: LobbyEntity,
            booking: Option<BookingEntity>,
        ) -> BoxFuture<'static, StorageResult<()>> {
            self.0.insert_lobby(lobby, booking)
        }

        fn find_lobby(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<LobbyEntity>>> {
            self.0.find_lobby(id)
        }

        fn list_lobbies(
            &self,
            filter: LobbyFilter,
        ) -> BoxFuture<'static, StorageResult<Vec<LobbyEntity>>> {
            self.0.list_lobbies(filter)
        }

        fn list_overdue(
            &self,
            before: SystemTime,
        ) -> BoxFuture<'static, StorageResult<Vec<LobbyEntity>>> {
            self.0.list_overdue(before)
        }

        fn commit_lobby(
            &self,
            _expected_version: u64,
            _lobby: LobbyEntity,
            _booking: Option<BookingEntity>,
        ) -> BoxFuture<'static, StorageResult<CommitOutcome>> {
            Box::pin(async { Ok(CommitOutcome::Conflict) })
        }

        fn find_booking(
            &self,
            id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Option<BookingEntity>>> {
            self.0.find_booking(id)
        }

        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.0.health_check()
        }

        fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.0.try_reconnect()
        }
    }

    #[tokio::test]
    async fn create_returns_an_open_lobby_with_the_declared_group() {
        let (state, _store, facility_id) = test_state().await;
        let creator = Uuid::new_v4();

        let summary = create_lobby(&state, creator, create_request(facility_id, 4, 2))
            .await
            .unwrap();

        assert_eq!(summary.status, LobbyStatusDto::Open);
        assert_eq!(summary.active_count, 2);
        assert_eq!(summary.waiting_count, 0);
        assert_eq!(summary.creator_id, creator);
        assert_eq!(summary.booking_id, None);

        let detail = get_lobby(&state, summary.id).await.unwrap();
        assert_eq!(detail.participants.len(), 1);
        assert_eq!(detail.participants[0].user_id, creator);
    }

    #[tokio::test]
    async fn create_at_capacity_fills_and_books_immediately() {
        let (state, store, facility_id) = test_state().await;

        let summary = create_lobby(&state, Uuid::new_v4(), create_request(facility_id, 3, 3))
            .await
            .unwrap();

        assert_eq!(summary.status, LobbyStatusDto::Filled);
        let booking_id = summary.booking_id.expect("immediate fill must book");
        assert_eq!(store.booking_count(), 1);

        let booking = booking_service::get_booking(&state, booking_id)
            .await
            .unwrap();
        assert_eq!(booking.lobby_id, summary.id);
        assert_eq!(booking.responsible_user_id, summary.creator_id);
    }

    #[tokio::test]
    async fn create_rejects_group_size_beyond_capacity() {
        let (state, _store, facility_id) = test_state().await;

        let err = create_lobby(&state, Uuid::new_v4(), create_request(facility_id, 2, 3))
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn create_rejects_an_unknown_facility() {
        let (state, _store, _facility_id) = test_state().await;
        let ghost = Uuid::new_v4();

        let err = create_lobby(&state, Uuid::new_v4(), create_request(ghost, 2, 1))
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::FacilityNotFound(id) if id == ghost));
    }

    #[tokio::test]
    async fn join_that_fills_creates_exactly_one_booking() {
        let (state, store, facility_id) = test_state().await;
        let summary = create_lobby(&state, Uuid::new_v4(), create_request(facility_id, 2, 1))
            .await
            .unwrap();

        let response = join_lobby(&state, summary.id, Uuid::new_v4()).await.unwrap();

        assert_eq!(response.state, ParticipantStateDto::Active);
        assert!(response.filled);
        assert!(response.booking_id.is_some());
        assert_eq!(store.booking_count(), 1);

        let detail = get_lobby(&state, summary.id).await.unwrap();
        assert_eq!(detail.status, LobbyStatusDto::Filled);
        assert_eq!(detail.active_count, 2);
    }

    #[tokio::test]
    async fn join_on_a_filled_lobby_queues_in_order() {
        let (state, _store, facility_id) = test_state().await;
        let summary = create_lobby(&state, Uuid::new_v4(), create_request(facility_id, 2, 2))
            .await
            .unwrap();

        let first = join_lobby(&state, summary.id, Uuid::new_v4()).await.unwrap();
        let second = join_lobby(&state, summary.id, Uuid::new_v4()).await.unwrap();

        assert_eq!(first.state, ParticipantStateDto::Waiting);
        assert_eq!(first.waiting_position, Some(1));
        assert_eq!(second.waiting_position, Some(2));
        assert!(!second.filled);
    }

    #[tokio::test]
    async fn duplicate_join_reports_already_joined() {
        let (state, _store, facility_id) = test_state().await;
        let summary = create_lobby(&state, Uuid::new_v4(), create_request(facility_id, 3, 1))
            .await
            .unwrap();
        let user = Uuid::new_v4();
        join_lobby(&state, summary.id, user).await.unwrap();

        let err = join_lobby(&state, summary.id, user).await.unwrap_err();

        assert!(matches!(err, ServiceError::AlreadyJoined { user_id } if user_id == user));
    }

    #[tokio::test]
    async fn join_rejects_missing_and_terminal_lobbies() {
        let (state, _store, facility_id) = test_state().await;

        let ghost = Uuid::new_v4();
        let err = join_lobby(&state, ghost, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ServiceError::LobbyNotFound(id) if id == ghost));

        let creator = Uuid::new_v4();
        let summary = create_lobby(&state, creator, create_request(facility_id, 3, 1))
            .await
            .unwrap();
        cancel_lobby(&state, summary.id, creator).await.unwrap();

        let err = join_lobby(&state, summary.id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::LobbyNotJoinable {
                status: LobbyStatus::Cancelled
            }
        ));
    }

    #[tokio::test]
    async fn leave_promotes_the_waitlist_head_and_keeps_the_booking() {
        let (state, store, facility_id) = test_state().await;
        let creator = Uuid::new_v4();
        let summary = create_lobby(&state, creator, create_request(facility_id, 2, 1))
            .await
            .unwrap();
        let filler = Uuid::new_v4();
        let filled = join_lobby(&state, summary.id, filler).await.unwrap();
        let waiter = Uuid::new_v4();
        join_lobby(&state, summary.id, waiter).await.unwrap();

        let response = leave_lobby(&state, summary.id, filler).await.unwrap();

        assert_eq!(response.promoted_user_id, Some(waiter));
        assert_eq!(response.status, LobbyStatusDto::Filled);
        assert_eq!(store.booking_count(), 1);

        let detail = get_lobby(&state, summary.id).await.unwrap();
        assert_eq!(detail.active_count, 2);
        assert_eq!(detail.waiting_count, 0);
        assert_eq!(detail.booking_id, filled.booking_id);
    }

    #[tokio::test]
    async fn booking_survives_a_fill_open_fill_cycle() {
        let (state, store, facility_id) = test_state().await;
        let summary = create_lobby(&state, Uuid::new_v4(), create_request(facility_id, 2, 1))
            .await
            .unwrap();
        let filler = Uuid::new_v4();
        let first_fill = join_lobby(&state, summary.id, filler).await.unwrap();

        // Nobody waits, so the leave reopens the lobby.
        let left = leave_lobby(&state, summary.id, filler).await.unwrap();
        assert_eq!(left.status, LobbyStatusDto::Open);
        assert_eq!(left.promoted_user_id, None);

        // Refill: the original booking is kept, no second one appears.
        let second_fill = join_lobby(&state, summary.id, Uuid::new_v4()).await.unwrap();
        assert!(second_fill.filled);
        assert_eq!(second_fill.booking_id, first_fill.booking_id);
        assert_eq!(store.booking_count(), 1);
    }

    #[tokio::test]
    async fn leave_of_a_non_member_fails() {
        let (state, _store, facility_id) = test_state().await;
        let summary = create_lobby(&state, Uuid::new_v4(), create_request(facility_id, 3, 1))
            .await
            .unwrap();
        let stranger = Uuid::new_v4();

        let err = leave_lobby(&state, summary.id, stranger).await.unwrap_err();

        assert!(matches!(err, ServiceError::NotAParticipant { user_id } if user_id == stranger));
    }

    #[tokio::test]
    async fn cancel_is_restricted_to_the_creator() {
        let (state, _store, facility_id) = test_state().await;
        let creator = Uuid::new_v4();
        let summary = create_lobby(&state, creator, create_request(facility_id, 3, 1))
            .await
            .unwrap();

        let intruder = Uuid::new_v4();
        let err = cancel_lobby(&state, summary.id, intruder).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotAuthorized { user_id } if user_id == intruder));

        cancel_lobby(&state, summary.id, creator).await.unwrap();
        let detail = get_lobby(&state, summary.id).await.unwrap();
        assert_eq!(detail.status, LobbyStatusDto::Cancelled);

        // A second cancel hits the terminal-state guard.
        let err = cancel_lobby(&state, summary.id, creator).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::LobbyClosed {
                status: LobbyStatus::Cancelled
            }
        ));
    }

    #[tokio::test]
    async fn list_narrows_by_facility_and_status() {
        let (state, store, facility_id) = test_state().await;
        let other_facility = FacilityEntity {
            id: Uuid::new_v4(),
            name: "Court 2".into(),
            hourly_price: PriceEntity {
                amount_minor: 2500,
                currency: "EUR".into(),
            },
        };
        store.upsert_facility(other_facility.clone()).await.unwrap();

        let creator = Uuid::new_v4();
        let open = create_lobby(&state, creator, create_request(facility_id, 4, 1))
            .await
            .unwrap();
        let cancelled = create_lobby(&state, creator, create_request(facility_id, 4, 1))
            .await
            .unwrap();
        cancel_lobby(&state, cancelled.id, creator).await.unwrap();
        create_lobby(&state, creator, create_request(other_facility.id, 4, 1))
            .await
            .unwrap();

        let listed = list_lobbies(
            &state,
            ListLobbiesQuery {
                facility_id: Some(facility_id),
                status: Some(LobbyStatusDto::Open),
            },
        )
        .await
        .unwrap();

        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, open.id);
    }

    #[tokio::test]
    async fn operations_fail_fast_in_degraded_mode() {
        let state = AppState::new(AppConfig::default());

        let err = join_lobby(&state, Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Degraded));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_joins_admit_up_to_capacity_and_book_once() {
        let (state, store, facility_id) = state_with_budget(32).await;
        let summary = create_lobby(&state, Uuid::new_v4(), create_request(facility_id, 3, 1))
            .await
            .unwrap();

        let joiners: Vec<Uuid> = (0..6).map(|_| Uuid::new_v4()).collect();
        let tasks = joiners.iter().map(|user| {
            let state = state.clone();
            let lobby_id = summary.id;
            let user = *user;
            tokio::spawn(async move { join_lobby(&state, lobby_id, user).await })
        });
        let responses: Vec<JoinResponse> = join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect();

        let admitted = responses
            .iter()
            .filter(|r| r.state == ParticipantStateDto::Active)
            .count();
        let mut positions: Vec<u32> = responses
            .iter()
            .filter_map(|r| r.waiting_position)
            .collect();
        positions.sort_unstable();

        // Two free slots, so exactly two racers get in and the other four
        // queue in contiguous order.
        assert_eq!(admitted, 2);
        assert_eq!(positions, vec![1, 2, 3, 4]);
        assert_eq!(
            responses.iter().filter(|r| r.filled).count(),
            1,
            "exactly one join performs the fill transition"
        );
        assert_eq!(store.booking_count(), 1);

        let detail = get_lobby(&state, summary.id).await.unwrap();
        assert_eq!(detail.status, LobbyStatusDto::Filled);
        assert_eq!(detail.active_count, 3);
        assert_eq!(detail.waiting_count, 4);
    }

    #[tokio::test]
    async fn persistent_conflicts_exhaust_the_budget_and_surface_contention() {
        let (state, store, facility_id) = state_with_budget(3).await;
        let creator = Uuid::new_v4();
        let summary = create_lobby(&state, creator, create_request(facility_id, 4, 1))
            .await
            .unwrap();

        state
            .install_backends(Backends {
                lobbies: Arc::new(ContendedStore(store.clone())),
                facilities: Arc::new(store.clone()),
            })
            .await;

        let err = join_lobby(&state, summary.id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Contention(id) if id == summary.id));
        // The losing join left nothing behind.
        assert_eq!(store.booking_count(), 0);

        let app_err: AppError = err.into();
        assert!(matches!(
            app_err,
            AppError::Conflict {
                kind: "concurrent_update_conflict",
                ..
            }
        ));

        // Leaves and cancels run the same bounded loop.
        let err = cancel_lobby(&state, summary.id, creator).await.unwrap_err();
        assert!(matches!(err, ServiceError::Contention(id) if id == summary.id));
    }
}

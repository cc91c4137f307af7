//! Per-lobby transition rules.
//!
//! Every status change and roster mutation goes through this module so the
//! capacity and waitlist invariants are enforced in one place. Functions
//! mutate an in-memory [`Lobby`] plan; nothing persists until the service
//! commits the plan through the store's conditional update, which is also
//! where racing plans for the same lobby are serialized.

use std::time::SystemTime;

use thiserror::Error;
use uuid::Uuid;

use crate::state::{
    lobby::{Lobby, LobbyStatus, Participant, ParticipantState, TimeWindow},
    waitlist,
};

/// Parameters for opening a new lobby.
#[derive(Debug, Clone)]
pub struct NewLobby {
    /// Facility the group wants to book.
    pub facility_id: Uuid,
    /// User opening the lobby.
    pub creator_id: Uuid,
    /// Slot the group is gathering for.
    pub window: TimeWindow,
    /// Number of slots to fill before the booking fires.
    pub capacity: u32,
    /// Slots the creator claims up front for themselves and their
    /// companions; must stay within `1..=capacity`.
    pub initial_group_size: u32,
    /// Free-form note shown to prospective joiners.
    pub note: Option<String>,
}

/// Error returned when an operation is not allowed from the lobby's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// Join attempted on a cancelled or expired lobby.
    #[error("lobby is {status} and does not accept joins")]
    NotJoinable {
        /// Status that blocked the join.
        status: LobbyStatus,
    },
    /// The user already has a membership row in this lobby.
    #[error("user `{user_id}` already belongs to this lobby")]
    AlreadyJoined {
        /// User who attempted the duplicate join.
        user_id: Uuid,
    },
    /// Leave attempted by a user without a membership row.
    #[error("user `{user_id}` is not a participant of this lobby")]
    NotAParticipant {
        /// User who attempted the leave.
        user_id: Uuid,
    },
    /// Cancel attempted by someone other than the creator.
    #[error("user `{user_id}` is not the lobby creator")]
    NotCreator {
        /// User who attempted the cancel.
        user_id: Uuid,
    },
    /// Leave, cancel or expiry attempted on a lobby in a terminal status.
    #[error("lobby is {status} and can no longer change")]
    Closed {
        /// Terminal status the lobby already reached.
        status: LobbyStatus,
    },
}

/// How a join request was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The user took an active slot; `filled` is true when this join was the
    /// one that reached capacity, which obliges the caller to run the
    /// booking trigger inside the same commit.
    Admitted {
        /// Whether this join performed the open-to-filled transition.
        filled: bool,
    },
    /// The lobby was at capacity; the user queued at the given 1-based rank.
    Waitlisted {
        /// Position assigned at the tail of the waitlist.
        position: u32,
    },
}

/// How a leave request was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// An active member left and the head of the waitlist took the freed
    /// slot; counters and status are unchanged.
    Promoted {
        /// User promoted into the freed slot.
        user_id: Uuid,
    },
    /// An active member left with nobody waiting; `reopened` is true when
    /// the lobby reverted from filled to open.
    SlotFreed {
        /// Whether the lobby left the filled status.
        reopened: bool,
    },
    /// A waiting member left; everyone queued behind them moved up.
    WaiterRemoved {
        /// Position the leaver held.
        position: u32,
    },
}

/// Open a new lobby seeded with the creator's declared group size.
///
/// The creator gets the single membership row; declared companions count
/// toward `active_count` but hold no row. A group size equal to capacity
/// fills the lobby immediately, and the caller must run the booking trigger
/// alongside the insert.
pub fn create(spec: NewLobby, now: SystemTime) -> Lobby {
    debug_assert!(
        spec.initial_group_size >= 1 && spec.initial_group_size <= spec.capacity,
        "group size must be validated upstream"
    );

    let status = if spec.initial_group_size == spec.capacity {
        LobbyStatus::Filled
    } else {
        LobbyStatus::Open
    };

    Lobby {
        id: Uuid::new_v4(),
        facility_id: spec.facility_id,
        creator_id: spec.creator_id,
        window: spec.window,
        capacity: spec.capacity,
        active_count: spec.initial_group_size,
        status,
        booking_id: None,
        note: spec.note,
        roster: vec![Participant::active(spec.creator_id, now)],
        version: 0,
        created_at: now,
        updated_at: now,
    }
}

/// Admit a user into the lobby, either into an active slot or onto the
/// waitlist.
///
/// Joins on a filled lobby queue rather than fail: an active member may
/// still leave before the window starts. Only terminal lobbies reject.
pub fn admit(
    lobby: &mut Lobby,
    user_id: Uuid,
    now: SystemTime,
) -> Result<JoinOutcome, TransitionError> {
    if lobby.status.is_terminal() {
        return Err(TransitionError::NotJoinable {
            status: lobby.status,
        });
    }
    if lobby.member(user_id).is_some() {
        return Err(TransitionError::AlreadyJoined { user_id });
    }

    if lobby.active_count < lobby.capacity {
        lobby.roster.push(Participant::active(user_id, now));
        lobby.active_count += 1;
        let filled = lobby.active_count == lobby.capacity;
        if filled {
            lobby.status = LobbyStatus::Filled;
        }
        return Ok(JoinOutcome::Admitted { filled });
    }

    let position = waitlist::next_position(&lobby.roster);
    lobby
        .roster
        .push(Participant::waiting(user_id, position, now));
    Ok(JoinOutcome::Waitlisted { position })
}

/// Remove a user from the lobby, promoting or renumbering waiters as needed.
pub fn release(lobby: &mut Lobby, user_id: Uuid) -> Result<LeaveOutcome, TransitionError> {
    if lobby.status.is_terminal() {
        return Err(TransitionError::Closed {
            status: lobby.status,
        });
    }
    let Some(index) = lobby.roster.iter().position(|row| row.user_id == user_id) else {
        return Err(TransitionError::NotAParticipant { user_id });
    };
    let leaver = lobby.roster.remove(index);

    match leaver.state {
        ParticipantState::Active => {
            if let Some(promoted) = waitlist::promote_first(&mut lobby.roster) {
                // The freed slot goes straight to the head of the waitlist;
                // the active count and the filled status do not change.
                Ok(LeaveOutcome::Promoted { user_id: promoted })
            } else {
                lobby.active_count -= 1;
                let reopened = lobby.status == LobbyStatus::Filled;
                if reopened {
                    lobby.status = LobbyStatus::Open;
                }
                Ok(LeaveOutcome::SlotFreed { reopened })
            }
        }
        ParticipantState::Waiting => {
            // Waiting rows always carry their 1-based position.
            let position = leaver.waiting_position.unwrap_or(1);
            waitlist::remove_and_renumber(&mut lobby.roster, position);
            Ok(LeaveOutcome::WaiterRemoved { position })
        }
    }
}

/// Cancel the lobby on behalf of its creator.
///
/// Works from both open and filled; a booking created by an earlier fill is
/// deliberately left in place.
pub fn cancel(lobby: &mut Lobby, user_id: Uuid) -> Result<(), TransitionError> {
    if lobby.creator_id != user_id {
        return Err(TransitionError::NotCreator { user_id });
    }
    if lobby.status.is_terminal() {
        return Err(TransitionError::Closed {
            status: lobby.status,
        });
    }
    lobby.status = LobbyStatus::Cancelled;
    Ok(())
}

/// Expire an open lobby whose window start has passed.
///
/// Filled lobbies already produced their booking and are left alone.
pub fn expire(lobby: &mut Lobby) -> Result<(), TransitionError> {
    if lobby.status != LobbyStatus::Open {
        return Err(TransitionError::Closed {
            status: lobby.status,
        });
    }
    lobby.status = LobbyStatus::Expired;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn window() -> TimeWindow {
        let starts_at = SystemTime::now() + Duration::from_secs(3600);
        TimeWindow {
            starts_at,
            ends_at: starts_at + Duration::from_secs(5400),
        }
    }

    fn lobby_with(capacity: u32, initial_group_size: u32) -> Lobby {
        create(
            NewLobby {
                facility_id: Uuid::new_v4(),
                creator_id: Uuid::new_v4(),
                window: window(),
                capacity,
                initial_group_size,
                note: None,
            },
            SystemTime::now(),
        )
    }

    fn join(lobby: &mut Lobby) -> (Uuid, JoinOutcome) {
        let user_id = Uuid::new_v4();
        let outcome = admit(lobby, user_id, SystemTime::now()).unwrap();
        (user_id, outcome)
    }

    fn waiting_positions(lobby: &Lobby) -> Vec<u32> {
        lobby
            .waitlist()
            .iter()
            .filter_map(|row| row.waiting_position)
            .collect()
    }

    #[test]
    fn create_seeds_creator_and_declared_group() {
        let lobby = lobby_with(4, 2);

        assert_eq!(lobby.status, LobbyStatus::Open);
        assert_eq!(lobby.active_count, 2);
        assert_eq!(lobby.roster.len(), 1);
        assert_eq!(lobby.roster[0].user_id, lobby.creator_id);
        assert_eq!(lobby.roster[0].state, ParticipantState::Active);
    }

    #[test]
    fn create_at_capacity_fills_immediately() {
        let lobby = lobby_with(3, 3);
        assert_eq!(lobby.status, LobbyStatus::Filled);
        assert_eq!(lobby.active_count, 3);
    }

    #[test]
    fn admit_below_capacity_stays_open() {
        let mut lobby = lobby_with(3, 1);

        let (_, outcome) = join(&mut lobby);

        assert_eq!(outcome, JoinOutcome::Admitted { filled: false });
        assert_eq!(lobby.status, LobbyStatus::Open);
        assert_eq!(lobby.active_count, 2);
    }

    #[test]
    fn admit_that_reaches_capacity_fills_the_lobby() {
        let mut lobby = lobby_with(2, 1);

        let (_, outcome) = join(&mut lobby);

        assert_eq!(outcome, JoinOutcome::Admitted { filled: true });
        assert_eq!(lobby.status, LobbyStatus::Filled);
        assert_eq!(lobby.active_count, 2);
    }

    #[test]
    fn admit_routes_overflow_to_the_waitlist() {
        let mut lobby = lobby_with(2, 2);

        let (_, first) = join(&mut lobby);
        let (_, second) = join(&mut lobby);

        assert_eq!(first, JoinOutcome::Waitlisted { position: 1 });
        assert_eq!(second, JoinOutcome::Waitlisted { position: 2 });
        // Capacity invariant: overflow never bumps the active count.
        assert_eq!(lobby.active_count, lobby.capacity);
        assert_eq!(lobby.status, LobbyStatus::Filled);
    }

    #[test]
    fn admit_rejects_a_user_already_in_the_lobby() {
        let mut lobby = lobby_with(3, 1);
        let (user_id, _) = join(&mut lobby);

        let err = admit(&mut lobby, user_id, SystemTime::now()).unwrap_err();

        assert_eq!(err, TransitionError::AlreadyJoined { user_id });
        assert_eq!(lobby.roster.len(), 2);
    }

    #[test]
    fn admit_rejects_a_waiting_user_rejoining() {
        let mut lobby = lobby_with(1, 1);
        let (user_id, _) = join(&mut lobby);

        let err = admit(&mut lobby, user_id, SystemTime::now()).unwrap_err();

        assert_eq!(err, TransitionError::AlreadyJoined { user_id });
    }

    #[test]
    fn admit_rejects_terminal_lobbies() {
        let mut cancelled = lobby_with(3, 1);
        let creator = cancelled.creator_id;
        cancel(&mut cancelled, creator).unwrap();
        let err = admit(&mut cancelled, Uuid::new_v4(), SystemTime::now()).unwrap_err();
        assert_eq!(
            err,
            TransitionError::NotJoinable {
                status: LobbyStatus::Cancelled
            }
        );

        let mut expired = lobby_with(3, 1);
        expire(&mut expired).unwrap();
        let err = admit(&mut expired, Uuid::new_v4(), SystemTime::now()).unwrap_err();
        assert_eq!(
            err,
            TransitionError::NotJoinable {
                status: LobbyStatus::Expired
            }
        );
    }

    #[test]
    fn release_promotes_the_first_waiter() {
        // Capacity 3, three active users, two waiting.
        let mut lobby = lobby_with(3, 1);
        join(&mut lobby);
        join(&mut lobby);
        let (first_waiter, _) = join(&mut lobby);
        join(&mut lobby);
        assert_eq!(lobby.waiting_count(), 2);

        let creator = lobby.creator_id;
        let outcome = release(&mut lobby, creator).unwrap();

        assert_eq!(
            outcome,
            LeaveOutcome::Promoted {
                user_id: first_waiter
            }
        );
        assert_eq!(lobby.active_count, 3);
        assert_eq!(lobby.status, LobbyStatus::Filled);
        let promoted = lobby.member(first_waiter).unwrap();
        assert_eq!(promoted.state, ParticipantState::Active);
        assert_eq!(promoted.waiting_position, None);
        // The remaining waiter moved up to the head of the queue.
        assert_eq!(waiting_positions(&lobby), vec![1]);
    }

    #[test]
    fn release_reverts_filled_to_open_without_waiters() {
        let mut lobby = lobby_with(2, 1);
        let (other, _) = join(&mut lobby);
        assert_eq!(lobby.status, LobbyStatus::Filled);

        let outcome = release(&mut lobby, other).unwrap();

        assert_eq!(outcome, LeaveOutcome::SlotFreed { reopened: true });
        assert_eq!(lobby.status, LobbyStatus::Open);
        assert_eq!(lobby.active_count, 1);
    }

    #[test]
    fn release_from_an_open_lobby_frees_a_slot() {
        let mut lobby = lobby_with(3, 1);
        let (other, _) = join(&mut lobby);

        let outcome = release(&mut lobby, other).unwrap();

        assert_eq!(outcome, LeaveOutcome::SlotFreed { reopened: false });
        assert_eq!(lobby.status, LobbyStatus::Open);
        assert_eq!(lobby.active_count, 1);
    }

    #[test]
    fn release_of_a_waiter_renumbers_the_queue_behind() {
        let mut lobby = lobby_with(1, 1);
        join(&mut lobby);
        let (middle, _) = join(&mut lobby);
        join(&mut lobby);
        assert_eq!(waiting_positions(&lobby), vec![1, 2, 3]);

        let outcome = release(&mut lobby, middle).unwrap();

        assert_eq!(outcome, LeaveOutcome::WaiterRemoved { position: 2 });
        assert_eq!(waiting_positions(&lobby), vec![1, 2]);
        assert!(lobby.member(middle).is_none());
    }

    #[test]
    fn release_of_an_unknown_user_fails() {
        let mut lobby = lobby_with(2, 1);
        let user_id = Uuid::new_v4();

        let err = release(&mut lobby, user_id).unwrap_err();

        assert_eq!(err, TransitionError::NotAParticipant { user_id });
    }

    #[test]
    fn release_after_cancellation_fails() {
        let mut lobby = lobby_with(2, 1);
        let creator = lobby.creator_id;
        cancel(&mut lobby, creator).unwrap();

        let err = release(&mut lobby, creator).unwrap_err();

        assert_eq!(
            err,
            TransitionError::Closed {
                status: LobbyStatus::Cancelled
            }
        );
    }

    #[test]
    fn cancel_works_from_open_and_filled() {
        let mut open = lobby_with(3, 1);
        let creator = open.creator_id;
        cancel(&mut open, creator).unwrap();
        assert_eq!(open.status, LobbyStatus::Cancelled);

        let mut filled = lobby_with(2, 2);
        let creator = filled.creator_id;
        cancel(&mut filled, creator).unwrap();
        assert_eq!(filled.status, LobbyStatus::Cancelled);
    }

    #[test]
    fn cancel_by_a_non_creator_fails_and_changes_nothing() {
        let mut lobby = lobby_with(3, 1);
        let user_id = Uuid::new_v4();
        let before = lobby.clone();

        let err = cancel(&mut lobby, user_id).unwrap_err();

        assert_eq!(err, TransitionError::NotCreator { user_id });
        assert_eq!(lobby, before);
    }

    #[test]
    fn cancel_on_a_terminal_lobby_fails() {
        let mut lobby = lobby_with(3, 1);
        let creator = lobby.creator_id;
        cancel(&mut lobby, creator).unwrap();

        let err = cancel(&mut lobby, creator).unwrap_err();

        assert_eq!(
            err,
            TransitionError::Closed {
                status: LobbyStatus::Cancelled
            }
        );
    }

    #[test]
    fn expire_marks_an_open_lobby() {
        let mut lobby = lobby_with(3, 1);
        expire(&mut lobby).unwrap();
        assert_eq!(lobby.status, LobbyStatus::Expired);
    }

    #[test]
    fn expire_leaves_filled_lobbies_alone() {
        let mut lobby = lobby_with(2, 2);

        let err = expire(&mut lobby).unwrap_err();

        assert_eq!(
            err,
            TransitionError::Closed {
                status: LobbyStatus::Filled
            }
        );
        assert_eq!(lobby.status, LobbyStatus::Filled);
    }

    #[test]
    fn waitlist_stays_contiguous_through_mixed_churn() {
        let mut lobby = lobby_with(2, 2);
        let (w1, _) = join(&mut lobby);
        let (w2, _) = join(&mut lobby);
        let (w3, _) = join(&mut lobby);
        assert_eq!(waiting_positions(&lobby), vec![1, 2, 3]);

        // Middle waiter gives up.
        release(&mut lobby, w2).unwrap();
        assert_eq!(waiting_positions(&lobby), vec![1, 2]);

        // An active member leaves; w1 is promoted and w3 moves up.
        let creator = lobby.creator_id;
        release(&mut lobby, creator).unwrap();
        assert_eq!(lobby.member(w1).unwrap().state, ParticipantState::Active);
        assert_eq!(lobby.member(w3).unwrap().waiting_position, Some(1));
        assert_eq!(lobby.status, LobbyStatus::Filled);
        assert_eq!(lobby.active_count, 2);
    }
}

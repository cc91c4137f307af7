use std::fmt;
use std::time::SystemTime;

use uuid::Uuid;

use crate::dao::models::{
    LobbyEntity, LobbyStatusEntity, ParticipantEntity, ParticipantStateEntity, TimeWindowEntity,
};

/// Reservation window a lobby is gathering for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    /// Start of the reserved slot.
    pub starts_at: SystemTime,
    /// End of the reserved slot.
    pub ends_at: SystemTime,
}

/// Lifecycle status of a lobby. Transitions happen only in [`crate::state::machine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobbyStatus {
    /// Accepting participants; below capacity.
    Open,
    /// Capacity reached; extra joins go to the waitlist.
    Filled,
    /// Cancelled by its creator. Terminal.
    Cancelled,
    /// Window start passed without the lobby filling. Terminal.
    Expired,
}

impl LobbyStatus {
    /// True once the lobby can no longer accept joins or leaves.
    pub fn is_terminal(self) -> bool {
        matches!(self, LobbyStatus::Cancelled | LobbyStatus::Expired)
    }
}

impl fmt::Display for LobbyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LobbyStatus::Open => "open",
            LobbyStatus::Filled => "filled",
            LobbyStatus::Cancelled => "cancelled",
            LobbyStatus::Expired => "expired",
        };
        f.write_str(label)
    }
}

/// Whether a participant holds a slot or waits for one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantState {
    /// Holds one of the lobby's slots.
    Active,
    /// Queued for the next freed slot.
    Waiting,
}

/// One user's membership in a lobby.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Stable identifier for the membership row.
    pub id: Uuid,
    /// User this row belongs to. At most one row per (lobby, user).
    pub user_id: Uuid,
    /// Active slot holder or waitlisted.
    pub state: ParticipantState,
    /// 1-based FIFO rank; populated exactly for waiting rows.
    pub waiting_position: Option<u32>,
    /// When the user joined the lobby.
    pub joined_at: SystemTime,
}

impl Participant {
    /// Build a participant row holding an active slot.
    pub fn active(user_id: Uuid, joined_at: SystemTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            state: ParticipantState::Active,
            waiting_position: None,
            joined_at,
        }
    }

    /// Build a participant row queued at the given waitlist position.
    pub fn waiting(user_id: Uuid, position: u32, joined_at: SystemTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            state: ParticipantState::Waiting,
            waiting_position: Some(position),
            joined_at,
        }
    }
}

/// In-memory lobby aggregate the state machine operates on.
///
/// `active_count` is stored rather than derived: it is seeded with the
/// creator's declared group size, which may exceed the number of active
/// roster rows (declared companions hold no row of their own). The waiting
/// count, by contrast, always has one row per waiter and is derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lobby {
    /// Primary key of the lobby.
    pub id: Uuid,
    /// Facility the group wants to book.
    pub facility_id: Uuid,
    /// User who opened the lobby; the only one allowed to cancel it.
    pub creator_id: Uuid,
    /// Slot the group is gathering for.
    pub window: TimeWindow,
    /// Number of slots to fill before the booking fires.
    pub capacity: u32,
    /// Occupied slots; never exceeds `capacity`.
    pub active_count: u32,
    /// Current lifecycle status.
    pub status: LobbyStatus,
    /// Booking created when the lobby first filled. Set once, never cleared.
    pub booking_id: Option<Uuid>,
    /// Free-form note from the creator.
    pub note: Option<String>,
    /// Membership rows, in join order.
    pub roster: Vec<Participant>,
    /// Optimistic concurrency token of the revision this aggregate was
    /// loaded from; bumped by the service right before each commit.
    pub version: u64,
    /// Creation timestamp for auditing/debugging.
    pub created_at: SystemTime,
    /// Last time the lobby was updated.
    pub updated_at: SystemTime,
}

impl Lobby {
    /// Membership row of the given user, if any.
    pub fn member(&self, user_id: Uuid) -> Option<&Participant> {
        self.roster.iter().find(|row| row.user_id == user_id)
    }

    /// Number of participants queued on the waitlist.
    pub fn waiting_count(&self) -> u32 {
        self.roster
            .iter()
            .filter(|row| row.state == ParticipantState::Waiting)
            .count() as u32
    }

    /// Waiting rows ordered by their FIFO position.
    pub fn waitlist(&self) -> Vec<&Participant> {
        let mut waiting: Vec<&Participant> = self
            .roster
            .iter()
            .filter(|row| row.state == ParticipantState::Waiting)
            .collect();
        waiting.sort_by_key(|row| row.waiting_position);
        waiting
    }
}

impl From<TimeWindowEntity> for TimeWindow {
    fn from(value: TimeWindowEntity) -> Self {
        Self {
            starts_at: value.starts_at,
            ends_at: value.ends_at,
        }
    }
}

impl From<TimeWindow> for TimeWindowEntity {
    fn from(value: TimeWindow) -> Self {
        Self {
            starts_at: value.starts_at,
            ends_at: value.ends_at,
        }
    }
}

impl From<LobbyStatusEntity> for LobbyStatus {
    fn from(value: LobbyStatusEntity) -> Self {
        match value {
            LobbyStatusEntity::Open => LobbyStatus::Open,
            LobbyStatusEntity::Filled => LobbyStatus::Filled,
            LobbyStatusEntity::Cancelled => LobbyStatus::Cancelled,
            LobbyStatusEntity::Expired => LobbyStatus::Expired,
        }
    }
}

impl From<LobbyStatus> for LobbyStatusEntity {
    fn from(value: LobbyStatus) -> Self {
        match value {
            LobbyStatus::Open => LobbyStatusEntity::Open,
            LobbyStatus::Filled => LobbyStatusEntity::Filled,
            LobbyStatus::Cancelled => LobbyStatusEntity::Cancelled,
            LobbyStatus::Expired => LobbyStatusEntity::Expired,
        }
    }
}

impl From<ParticipantStateEntity> for ParticipantState {
    fn from(value: ParticipantStateEntity) -> Self {
        match value {
            ParticipantStateEntity::Active => ParticipantState::Active,
            ParticipantStateEntity::Waiting => ParticipantState::Waiting,
        }
    }
}

impl From<ParticipantState> for ParticipantStateEntity {
    fn from(value: ParticipantState) -> Self {
        match value {
            ParticipantState::Active => ParticipantStateEntity::Active,
            ParticipantState::Waiting => ParticipantStateEntity::Waiting,
        }
    }
}

impl From<ParticipantEntity> for Participant {
    fn from(value: ParticipantEntity) -> Self {
        Self {
            id: value.id,
            user_id: value.user_id,
            state: value.state.into(),
            waiting_position: value.waiting_position,
            joined_at: value.joined_at,
        }
    }
}

impl From<Participant> for ParticipantEntity {
    fn from(value: Participant) -> Self {
        Self {
            id: value.id,
            user_id: value.user_id,
            state: value.state.into(),
            waiting_position: value.waiting_position,
            joined_at: value.joined_at,
        }
    }
}

impl From<LobbyEntity> for Lobby {
    fn from(value: LobbyEntity) -> Self {
        Self {
            id: value.id,
            facility_id: value.facility_id,
            creator_id: value.creator_id,
            window: value.window.into(),
            capacity: value.capacity,
            active_count: value.active_count,
            status: value.status.into(),
            booking_id: value.booking_id,
            note: value.note,
            roster: value.participants.into_iter().map(Into::into).collect(),
            version: value.version,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

impl From<Lobby> for LobbyEntity {
    fn from(value: Lobby) -> Self {
        Self {
            id: value.id,
            facility_id: value.facility_id,
            creator_id: value.creator_id,
            window: value.window.into(),
            capacity: value.capacity,
            active_count: value.active_count,
            status: value.status.into(),
            booking_id: value.booking_id,
            note: value.note,
            participants: value.roster.into_iter().map(Into::into).collect(),
            version: value.version,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

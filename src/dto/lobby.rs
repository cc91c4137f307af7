use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dto::{
        common::TimeWindowView,
        format_system_time,
        validation::{validate_capacity, validate_group_size, validate_note, validate_window},
    },
    state::lobby::{Lobby, LobbyStatus, Participant, ParticipantState, TimeWindow},
};

/// Payload used to open a new lobby.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateLobbyRequest {
    /// Facility the group wants to book.
    pub facility_id: Uuid,
    /// Slot the group is gathering for.
    pub window: TimeWindowInput,
    /// Number of slots to fill before the booking fires.
    pub capacity: u32,
    /// Slots the creator claims up front for themselves and their companions.
    pub initial_group_size: u32,
    /// Free-form note shown to prospective joiners.
    #[serde(default)]
    pub note: Option<String>,
}

impl Validate for CreateLobbyRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_capacity(self.capacity) {
            errors.add("capacity", e);
        }
        if let Err(e) = validate_group_size(self.initial_group_size, self.capacity) {
            errors.add("initial_group_size", e);
        }
        if let Err(e) = validate_window(self.window.starts_at.into(), self.window.ends_at.into()) {
            errors.add("window", e);
        }
        if let Some(ref note) = self.note {
            if let Err(e) = validate_note(note) {
                errors.add("note", e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Requested booking window, RFC 3339 formatted.
#[derive(Debug, Deserialize, ToSchema)]
pub struct TimeWindowInput {
    /// Start of the reserved slot.
    #[serde(with = "time::serde::rfc3339")]
    pub starts_at: OffsetDateTime,
    /// End of the reserved slot.
    #[serde(with = "time::serde::rfc3339")]
    pub ends_at: OffsetDateTime,
}

impl From<&TimeWindowInput> for TimeWindow {
    fn from(input: &TimeWindowInput) -> Self {
        Self {
            starts_at: input.starts_at.into(),
            ends_at: input.ends_at.into(),
        }
    }
}

/// Query filters accepted by the lobby list endpoint.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListLobbiesQuery {
    /// Only lobbies for this facility.
    pub facility_id: Option<Uuid>,
    /// Only lobbies in this status.
    pub status: Option<LobbyStatusDto>,
}

/// Lifecycle states a lobby exposes to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LobbyStatusDto {
    /// Accepting joins into active slots.
    Open,
    /// At capacity; joins queue on the waitlist.
    Filled,
    /// Cancelled by its creator.
    Cancelled,
    /// Window start passed before the lobby filled.
    Expired,
}

impl From<LobbyStatus> for LobbyStatusDto {
    fn from(status: LobbyStatus) -> Self {
        match status {
            LobbyStatus::Open => LobbyStatusDto::Open,
            LobbyStatus::Filled => LobbyStatusDto::Filled,
            LobbyStatus::Cancelled => LobbyStatusDto::Cancelled,
            LobbyStatus::Expired => LobbyStatusDto::Expired,
        }
    }
}

impl From<LobbyStatusDto> for LobbyStatus {
    fn from(status: LobbyStatusDto) -> Self {
        match status {
            LobbyStatusDto::Open => LobbyStatus::Open,
            LobbyStatusDto::Filled => LobbyStatus::Filled,
            LobbyStatusDto::Cancelled => LobbyStatus::Cancelled,
            LobbyStatusDto::Expired => LobbyStatus::Expired,
        }
    }
}

/// Membership flavors a participant row can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStateDto {
    /// Holds a confirmed slot.
    Active,
    /// Queued for the next freed slot.
    Waiting,
}

impl From<ParticipantState> for ParticipantStateDto {
    fn from(state: ParticipantState) -> Self {
        match state {
            ParticipantState::Active => ParticipantStateDto::Active,
            ParticipantState::Waiting => ParticipantStateDto::Waiting,
        }
    }
}

/// Public projection of a membership row.
#[derive(Debug, Serialize, ToSchema)]
pub struct ParticipantView {
    /// User holding the row.
    pub user_id: Uuid,
    /// Active slot or waitlist.
    pub state: ParticipantStateDto,
    /// 1-based rank on the waitlist, present for waiting rows only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waiting_position: Option<u32>,
    /// When the user joined the lobby.
    pub joined_at: String,
}

impl From<&Participant> for ParticipantView {
    fn from(row: &Participant) -> Self {
        Self {
            user_id: row.user_id,
            state: row.state.into(),
            waiting_position: row.waiting_position,
            joined_at: format_system_time(row.joined_at),
        }
    }
}

/// Summary returned by the create and list endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct LobbySummary {
    pub id: Uuid,
    pub facility_id: Uuid,
    pub creator_id: Uuid,
    pub window: TimeWindowView,
    pub capacity: u32,
    pub active_count: u32,
    pub waiting_count: u32,
    pub status: LobbyStatusDto,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Lobby> for LobbySummary {
    fn from(lobby: Lobby) -> Self {
        Self {
            id: lobby.id,
            facility_id: lobby.facility_id,
            creator_id: lobby.creator_id,
            window: lobby.window.into(),
            capacity: lobby.capacity,
            active_count: lobby.active_count,
            waiting_count: lobby.waiting_count(),
            status: lobby.status.into(),
            booking_id: lobby.booking_id,
            note: lobby.note,
            created_at: format_system_time(lobby.created_at),
            updated_at: format_system_time(lobby.updated_at),
        }
    }
}

/// Full lobby view including the membership roster.
#[derive(Debug, Serialize, ToSchema)]
pub struct LobbyDetail {
    pub id: Uuid,
    pub facility_id: Uuid,
    pub creator_id: Uuid,
    pub window: TimeWindowView,
    pub capacity: u32,
    pub active_count: u32,
    pub waiting_count: u32,
    pub status: LobbyStatusDto,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Active members in join order, then the waitlist in queue order.
    pub participants: Vec<ParticipantView>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Lobby> for LobbyDetail {
    fn from(lobby: Lobby) -> Self {
        let participants = lobby
            .roster
            .iter()
            .filter(|row| row.state == ParticipantState::Active)
            .chain(lobby.waitlist())
            .map(ParticipantView::from)
            .collect();
        Self {
            id: lobby.id,
            facility_id: lobby.facility_id,
            creator_id: lobby.creator_id,
            window: lobby.window.into(),
            capacity: lobby.capacity,
            active_count: lobby.active_count,
            waiting_count: lobby.waiting_count(),
            status: lobby.status.into(),
            booking_id: lobby.booking_id,
            note: lobby.note,
            participants,
            created_at: format_system_time(lobby.created_at),
            updated_at: format_system_time(lobby.updated_at),
        }
    }
}

/// Outcome of a join request.
#[derive(Debug, Serialize, ToSchema)]
pub struct JoinResponse {
    pub lobby_id: Uuid,
    pub user_id: Uuid,
    /// Whether the caller landed in an active slot or on the waitlist.
    pub state: ParticipantStateDto,
    /// 1-based waitlist rank, present when `state` is `waiting`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waiting_position: Option<u32>,
    /// True when this join filled the lobby.
    pub filled: bool,
    /// Booking attached to the lobby, present once it has filled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<Uuid>,
}

/// Outcome of a leave request.
#[derive(Debug, Serialize, ToSchema)]
pub struct LeaveResponse {
    pub lobby_id: Uuid,
    pub user_id: Uuid,
    /// User promoted from the head of the waitlist into the freed slot, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promoted_user_id: Option<Uuid>,
    /// Lobby status after the leave.
    pub status: LobbyStatusDto,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn request(capacity: u32, initial_group_size: u32) -> CreateLobbyRequest {
        let starts_at = OffsetDateTime::now_utc() + Duration::hours(2);
        CreateLobbyRequest {
            facility_id: Uuid::new_v4(),
            window: TimeWindowInput {
                starts_at,
                ends_at: starts_at + Duration::hours(1),
            },
            capacity,
            initial_group_size,
            note: None,
        }
    }

    #[test]
    fn accepts_a_well_formed_request() {
        assert!(request(4, 2).validate().is_ok());
    }

    #[test]
    fn rejects_group_size_exceeding_capacity() {
        let err = request(4, 5).validate().unwrap_err();
        assert!(err.field_errors().contains_key("initial_group_size"));
    }

    #[test]
    fn rejects_zero_capacity() {
        let err = request(0, 0).validate().unwrap_err();
        assert!(err.field_errors().contains_key("capacity"));
    }

    #[test]
    fn rejects_inverted_window() {
        let mut req = request(4, 1);
        std::mem::swap(&mut req.window.starts_at, &mut req.window.ends_at);
        let err = req.validate().unwrap_err();
        assert!(err.field_errors().contains_key("window"));
    }

    #[test]
    fn rejects_oversized_note() {
        let mut req = request(4, 1);
        req.note = Some("x".repeat(crate::dto::validation::MAX_NOTE_CHARS + 1));
        let err = req.validate().unwrap_err();
        assert!(err.field_errors().contains_key("note"));
    }

    #[test]
    fn detail_lists_active_members_before_the_sorted_waitlist() {
        let now = std::time::SystemTime::now();
        let creator = Uuid::new_v4();
        let first_waiter = Uuid::new_v4();
        let second_waiter = Uuid::new_v4();
        let lobby = Lobby {
            id: Uuid::new_v4(),
            facility_id: Uuid::new_v4(),
            creator_id: creator,
            window: TimeWindow {
                starts_at: now,
                ends_at: now,
            },
            capacity: 1,
            active_count: 1,
            status: LobbyStatus::Filled,
            booking_id: None,
            note: None,
            roster: vec![
                Participant::waiting(second_waiter, 2, now),
                Participant::active(creator, now),
                Participant::waiting(first_waiter, 1, now),
            ],
            version: 1,
            created_at: now,
            updated_at: now,
        };

        let detail = LobbyDetail::from(lobby);

        let order: Vec<Uuid> = detail.participants.iter().map(|p| p.user_id).collect();
        assert_eq!(order, vec![creator, first_waiter, second_waiter]);
    }
}

use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

/// Reservation window a lobby (and its eventual booking) targets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeWindowEntity {
    /// Start of the reserved slot.
    pub starts_at: SystemTime,
    /// End of the reserved slot.
    pub ends_at: SystemTime,
}

/// Lifecycle status of a lobby.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LobbyStatusEntity {
    /// Accepting participants; below capacity.
    Open,
    /// Capacity reached; extra joins go to the waitlist.
    Filled,
    /// Cancelled by its creator. Terminal.
    Cancelled,
    /// Window start passed without the lobby filling. Terminal.
    Expired,
}

/// Whether a participant holds a slot or waits for one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStateEntity {
    /// Holds one of the lobby's slots.
    Active,
    /// Queued for the next freed slot.
    Waiting,
}

/// Membership row embedded in the lobby aggregate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantEntity {
    /// Stable identifier for the membership row.
    pub id: Uuid,
    /// User this row belongs to. At most one row per (lobby, user).
    pub user_id: Uuid,
    /// Active slot holder or waitlisted.
    pub state: ParticipantStateEntity,
    /// 1-based FIFO rank; populated exactly for waiting rows.
    pub waiting_position: Option<u32>,
    /// When the user joined (or was promoted into) the lobby.
    pub joined_at: SystemTime,
}

/// Aggregate lobby entity persisted by the storage layer.
///
/// The roster is embedded so that membership changes, the counters, the
/// waitlist renumbering and the status all travel in one conditional write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LobbyEntity {
    /// Primary key of the lobby.
    pub id: Uuid,
    /// Facility the group wants to book.
    pub facility_id: Uuid,
    /// User who opened the lobby; the only one allowed to cancel it.
    pub creator_id: Uuid,
    /// Slot the group is gathering for.
    pub window: TimeWindowEntity,
    /// Number of slots to fill before the booking fires.
    pub capacity: u32,
    /// Occupied slots. Seeded with the creator's declared group size, so it
    /// can exceed the number of active roster rows (companions hold no row).
    pub active_count: u32,
    /// Current lifecycle status.
    pub status: LobbyStatusEntity,
    /// Booking created when the lobby first filled. Set once, never cleared.
    pub booking_id: Option<Uuid>,
    /// Free-form note from the creator.
    pub note: Option<String>,
    /// Membership rows, in join order.
    pub participants: Vec<ParticipantEntity>,
    /// Optimistic concurrency token; bumped on every committed write.
    pub version: u64,
    /// Creation timestamp for auditing/debugging.
    pub created_at: SystemTime,
    /// Last time the lobby entity was updated.
    pub updated_at: SystemTime,
}

/// Lifecycle status of a booking.
///
/// Only `Pending` is ever written here; the downstream booking subsystem owns
/// the later transitions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatusEntity {
    /// Emitted by a filled lobby, awaiting downstream confirmation.
    Pending,
    /// Confirmed by the booking subsystem.
    Confirmed,
    /// Voided by the booking subsystem.
    Cancelled,
}

/// Booking record emitted when a lobby fills.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookingEntity {
    /// Primary key of the booking.
    pub id: Uuid,
    /// Lobby that produced this booking. At most one booking per lobby.
    pub lobby_id: Uuid,
    /// Facility being reserved.
    pub facility_id: Uuid,
    /// Lobby creator, responsible for the reservation.
    pub responsible_user_id: Uuid,
    /// Reserved slot, copied from the lobby.
    pub window: TimeWindowEntity,
    /// Facility price at the moment the lobby filled.
    pub hourly_price: PriceEntity,
    /// Current lifecycle status.
    pub status: BookingStatusEntity,
    /// Creation timestamp for auditing/debugging.
    pub created_at: SystemTime,
}

/// Monetary amount in minor units of its currency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriceEntity {
    /// Amount in minor units (e.g. cents).
    pub amount_minor: i64,
    /// ISO 4217 currency code.
    pub currency: String,
}

/// Facility read model; owned and written by the facility service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FacilityEntity {
    /// Primary key of the facility.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Current hourly price.
    pub hourly_price: PriceEntity,
}

use mongodb::bson::{Binary, DateTime, Document, doc, spec::BinarySubtype};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::{
    BookingEntity, BookingStatusEntity, FacilityEntity, LobbyEntity, LobbyStatusEntity,
    ParticipantEntity, ParticipantStateEntity, PriceEntity, TimeWindowEntity,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MongoTimeWindowDocument {
    starts_at: DateTime,
    ends_at: DateTime,
}

impl From<TimeWindowEntity> for MongoTimeWindowDocument {
    fn from(value: TimeWindowEntity) -> Self {
        Self {
            starts_at: DateTime::from_system_time(value.starts_at),
            ends_at: DateTime::from_system_time(value.ends_at),
        }
    }
}

impl From<MongoTimeWindowDocument> for TimeWindowEntity {
    fn from(value: MongoTimeWindowDocument) -> Self {
        Self {
            starts_at: value.starts_at.to_system_time(),
            ends_at: value.ends_at.to_system_time(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoParticipantDocument {
    id: Uuid,
    user_id: Uuid,
    state: ParticipantStateEntity,
    waiting_position: Option<u32>,
    joined_at: DateTime,
}

impl From<ParticipantEntity> for MongoParticipantDocument {
    fn from(value: ParticipantEntity) -> Self {
        Self {
            id: value.id,
            user_id: value.user_id,
            state: value.state,
            waiting_position: value.waiting_position,
            joined_at: DateTime::from_system_time(value.joined_at),
        }
    }
}

impl From<MongoParticipantDocument> for ParticipantEntity {
    fn from(value: MongoParticipantDocument) -> Self {
        Self {
            id: value.id,
            user_id: value.user_id,
            state: value.state,
            waiting_position: value.waiting_position,
            joined_at: value.joined_at.to_system_time(),
        }
    }
}

/// Lobby aggregate as stored in the `lobbies` collection.
///
/// `version` is kept as `i64` so the conditional-replace filter compares
/// against the exact BSON type the document carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoLobbyDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    facility_id: Uuid,
    creator_id: Uuid,
    window: MongoTimeWindowDocument,
    capacity: u32,
    active_count: u32,
    status: LobbyStatusEntity,
    booking_id: Option<Uuid>,
    note: Option<String>,
    participants: Vec<MongoParticipantDocument>,
    version: i64,
    created_at: DateTime,
    updated_at: DateTime,
}

impl From<LobbyEntity> for MongoLobbyDocument {
    fn from(value: LobbyEntity) -> Self {
        Self {
            id: value.id,
            facility_id: value.facility_id,
            creator_id: value.creator_id,
            window: value.window.into(),
            capacity: value.capacity,
            active_count: value.active_count,
            status: value.status,
            booking_id: value.booking_id,
            note: value.note,
            participants: value.participants.into_iter().map(Into::into).collect(),
            version: value.version as i64,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl From<MongoLobbyDocument> for LobbyEntity {
    fn from(value: MongoLobbyDocument) -> Self {
        Self {
            id: value.id,
            facility_id: value.facility_id,
            creator_id: value.creator_id,
            window: value.window.into(),
            capacity: value.capacity,
            active_count: value.active_count,
            status: value.status,
            booking_id: value.booking_id,
            note: value.note,
            participants: value.participants.into_iter().map(Into::into).collect(),
            version: value.version as u64,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoBookingDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    lobby_id: Uuid,
    facility_id: Uuid,
    responsible_user_id: Uuid,
    window: MongoTimeWindowDocument,
    hourly_price: PriceEntity,
    status: BookingStatusEntity,
    created_at: DateTime,
}

impl From<BookingEntity> for MongoBookingDocument {
    fn from(value: BookingEntity) -> Self {
        Self {
            id: value.id,
            lobby_id: value.lobby_id,
            facility_id: value.facility_id,
            responsible_user_id: value.responsible_user_id,
            window: value.window.into(),
            hourly_price: value.hourly_price,
            status: value.status,
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl From<MongoBookingDocument> for BookingEntity {
    fn from(value: MongoBookingDocument) -> Self {
        Self {
            id: value.id,
            lobby_id: value.lobby_id,
            facility_id: value.facility_id,
            responsible_user_id: value.responsible_user_id,
            window: value.window.into(),
            hourly_price: value.hourly_price,
            status: value.status,
            created_at: value.created_at.to_system_time(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoFacilityDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    name: String,
    hourly_price: PriceEntity,
}

impl From<FacilityEntity> for MongoFacilityDocument {
    fn from(value: FacilityEntity) -> Self {
        Self {
            id: value.id,
            name: value.name,
            hourly_price: value.hourly_price,
        }
    }
}

impl From<MongoFacilityDocument> for FacilityEntity {
    fn from(value: MongoFacilityDocument) -> Self {
        Self {
            id: value.id,
            name: value.name,
            hourly_price: value.hourly_price,
        }
    }
}

pub fn uuid_as_binary(id: Uuid) -> Binary {
    Binary {
        subtype: BinarySubtype::Uuid,
        bytes: id.into_bytes().to_vec(),
    }
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": uuid_as_binary(id)}
}

/// Filter matching one specific revision of a lobby document.
pub fn versioned_id(id: Uuid, version: u64) -> Document {
    doc! {"_id": uuid_as_binary(id), "version": version as i64}
}

/// Status value as it appears in stored documents, for filter clauses.
pub fn status_label(status: LobbyStatusEntity) -> &'static str {
    match status {
        LobbyStatusEntity::Open => "open",
        LobbyStatusEntity::Filled => "filled",
        LobbyStatusEntity::Cancelled => "cancelled",
        LobbyStatusEntity::Expired => "expired",
    }
}

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::models::{BookingEntity, BookingStatusEntity},
    dto::{
        common::{PriceView, TimeWindowView},
        format_system_time,
    },
    state::lobby::TimeWindow,
};

/// Lifecycle states of a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatusDto {
    /// Created by a fill transition, awaiting facility confirmation.
    Pending,
    /// Confirmed by the facility side of the platform.
    Confirmed,
    /// Cancelled downstream.
    Cancelled,
}

impl From<BookingStatusEntity> for BookingStatusDto {
    fn from(status: BookingStatusEntity) -> Self {
        match status {
            BookingStatusEntity::Pending => BookingStatusDto::Pending,
            BookingStatusEntity::Confirmed => BookingStatusDto::Confirmed,
            BookingStatusEntity::Cancelled => BookingStatusDto::Cancelled,
        }
    }
}

/// Public projection of a booking created by a lobby fill.
#[derive(Debug, Serialize, ToSchema)]
pub struct BookingSummary {
    pub id: Uuid,
    /// Lobby whose fill created this booking.
    pub lobby_id: Uuid,
    pub facility_id: Uuid,
    /// User answering for the group, the lobby creator.
    pub responsible_user_id: Uuid,
    pub window: TimeWindowView,
    pub hourly_price: PriceView,
    pub status: BookingStatusDto,
    pub created_at: String,
}

impl From<BookingEntity> for BookingSummary {
    fn from(booking: BookingEntity) -> Self {
        Self {
            id: booking.id,
            lobby_id: booking.lobby_id,
            facility_id: booking.facility_id,
            responsible_user_id: booking.responsible_user_id,
            window: TimeWindow::from(booking.window).into(),
            hourly_price: booking.hourly_price.into(),
            status: booking.status.into(),
            created_at: format_system_time(booking.created_at),
        }
    }
}

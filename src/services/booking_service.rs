use std::time::SystemTime;

use uuid::Uuid;

use crate::{
    dao::models::{BookingEntity, BookingStatusEntity, FacilityEntity},
    dto::booking::BookingSummary,
    error::ServiceError,
    state::{SharedState, lobby::Lobby},
};

/// Build the pending booking that a fill transition persists atomically with
/// the lobby.
///
/// The lobby creator answers for the group; the price is the facility's
/// hourly rate at fill time. The caller hands the result to
/// `LobbyStore::commit_lobby` (or `insert_lobby` for an immediate fill) so
/// the booking never exists without its filled lobby.
pub fn build_pending_booking(
    lobby: &Lobby,
    facility: &FacilityEntity,
    now: SystemTime,
) -> BookingEntity {
    BookingEntity {
        id: Uuid::new_v4(),
        lobby_id: lobby.id,
        facility_id: lobby.facility_id,
        responsible_user_id: lobby.creator_id,
        window: lobby.window.into(),
        hourly_price: facility.hourly_price.clone(),
        status: BookingStatusEntity::Pending,
        created_at: now,
    }
}

/// Fetch a booking by identifier.
pub async fn get_booking(
    state: &SharedState,
    booking_id: Uuid,
) -> Result<BookingSummary, ServiceError> {
    let backends = state.require_backends().await?;
    let booking = backends
        .lobbies
        .find_booking(booking_id)
        .await?
        .ok_or(ServiceError::BookingNotFound(booking_id))?;
    Ok(booking.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::{
        dao::models::PriceEntity,
        state::{
            lobby::TimeWindow,
            machine::{self, NewLobby},
        },
    };

    #[test]
    fn pending_booking_copies_the_lobby_terms() {
        let now = SystemTime::now();
        let starts_at = now + Duration::from_secs(3600);
        let lobby = machine::create(
            NewLobby {
                facility_id: Uuid::new_v4(),
                creator_id: Uuid::new_v4(),
                window: TimeWindow {
                    starts_at,
                    ends_at: starts_at + Duration::from_secs(5400),
                },
                capacity: 4,
                initial_group_size: 4,
                note: None,
            },
            now,
        );
        let facility = FacilityEntity {
            id: lobby.facility_id,
            name: "Center Court".into(),
            hourly_price: PriceEntity {
                amount_minor: 4500,
                currency: "EUR".into(),
            },
        };

        let booking = build_pending_booking(&lobby, &facility, now);

        assert_eq!(booking.lobby_id, lobby.id);
        assert_eq!(booking.facility_id, lobby.facility_id);
        assert_eq!(booking.responsible_user_id, lobby.creator_id);
        assert_eq!(booking.window.starts_at, starts_at);
        assert_eq!(booking.hourly_price, facility.hourly_price);
        assert_eq!(booking.status, BookingStatusEntity::Pending);
    }
}

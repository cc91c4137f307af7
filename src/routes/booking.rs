use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::booking::BookingSummary, error::AppError, services::booking_service, state::SharedState,
};

/// Routes exposing bookings created by lobby fills.
pub fn router() -> Router<SharedState> {
    Router::new().route("/bookings/{id}", get(get_booking))
}

/// Retrieve a booking by its identifier.
#[utoipa::path(
    get,
    path = "/bookings/{id}",
    tag = "booking",
    params(("id" = String, Path, description = "Identifier of the booking")),
    responses(
        (status = 200, description = "Booking", body = BookingSummary),
        (status = 404, description = "No such booking")
    )
)]
pub async fn get_booking(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingSummary>, AppError> {
    Ok(Json(booking_service::get_booking(&state, id).await?))
}

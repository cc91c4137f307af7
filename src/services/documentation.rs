use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Courtside Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::lobby::create_lobby,
        crate::routes::lobby::list_lobbies,
        crate::routes::lobby::get_lobby,
        crate::routes::lobby::join_lobby,
        crate::routes::lobby::leave_lobby,
        crate::routes::lobby::cancel_lobby,
        crate::routes::booking::get_booking,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::HealthStatus,
            crate::dto::lobby::CreateLobbyRequest,
            crate::dto::lobby::TimeWindowInput,
            crate::dto::lobby::LobbyStatusDto,
            crate::dto::lobby::ParticipantStateDto,
            crate::dto::lobby::ParticipantView,
            crate::dto::lobby::LobbySummary,
            crate::dto::lobby::LobbyDetail,
            crate::dto::lobby::JoinResponse,
            crate::dto::lobby::LeaveResponse,
            crate::dto::booking::BookingSummary,
            crate::dto::booking::BookingStatusDto,
            crate::dto::common::TimeWindowView,
            crate::dto::common::PriceView,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "lobby", description = "Group lobby lifecycle"),
        (name = "booking", description = "Bookings created by lobby fills"),
    )
)]
pub struct ApiDoc;

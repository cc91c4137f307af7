use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, Query, State},
    http::{StatusCode, request::Parts},
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::lobby::{
        CreateLobbyRequest, JoinResponse, LeaveResponse, ListLobbiesQuery, LobbyDetail,
        LobbySummary,
    },
    error::AppError,
    services::lobby_service,
    state::SharedState,
};

const USER_ID_HEADER: &str = "x-user-id";

/// Identity of the platform user driving the request, taken from the
/// `X-User-Id` header the API gateway injects.
#[derive(Debug, Clone, Copy)]
pub struct CallerIdentity(pub Uuid);

impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let provided = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                AppError::unauthorized("missing_identity", "missing caller header `X-User-Id`")
            })?;

        let user_id = provided.parse::<Uuid>().map_err(|_| {
            AppError::unauthorized("invalid_identity", "header `X-User-Id` is not a valid UUID")
        })?;

        Ok(CallerIdentity(user_id))
    }
}

/// Routes handling the lobby lifecycle.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/lobbies", get(list_lobbies).post(create_lobby))
        .route("/lobbies/{id}", get(get_lobby))
        .route("/lobbies/{id}/join", post(join_lobby))
        .route("/lobbies/{id}/leave", post(leave_lobby))
        .route("/lobbies/{id}/cancel", post(cancel_lobby))
}

/// Open a new lobby for a facility slot.
#[utoipa::path(
    post,
    path = "/lobbies",
    tag = "lobby",
    params(("X-User-Id" = String, Header, description = "Identity of the requesting user")),
    request_body = CreateLobbyRequest,
    responses(
        (status = 200, description = "Lobby created", body = LobbySummary),
        (status = 400, description = "Invalid lobby parameters"),
        (status = 404, description = "Unknown facility")
    )
)]
pub async fn create_lobby(
    State(state): State<SharedState>,
    caller: CallerIdentity,
    Valid(Json(payload)): Valid<Json<CreateLobbyRequest>>,
) -> Result<Json<LobbySummary>, AppError> {
    let summary = lobby_service::create_lobby(&state, caller.0, payload).await?;
    Ok(Json(summary))
}

/// List lobbies, optionally filtered by facility and status.
#[utoipa::path(
    get,
    path = "/lobbies",
    tag = "lobby",
    params(ListLobbiesQuery),
    responses((status = 200, description = "Matching lobbies", body = [LobbySummary]))
)]
pub async fn list_lobbies(
    State(state): State<SharedState>,
    Query(query): Query<ListLobbiesQuery>,
) -> Result<Json<Vec<LobbySummary>>, AppError> {
    Ok(Json(lobby_service::list_lobbies(&state, query).await?))
}

/// Retrieve a lobby with its full roster.
#[utoipa::path(
    get,
    path = "/lobbies/{id}",
    tag = "lobby",
    params(("id" = String, Path, description = "Identifier of the lobby")),
    responses(
        (status = 200, description = "Lobby detail", body = LobbyDetail),
        (status = 404, description = "No such lobby")
    )
)]
pub async fn get_lobby(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<LobbyDetail>, AppError> {
    Ok(Json(lobby_service::get_lobby(&state, id).await?))
}

/// Join a lobby, taking an active slot or queueing on the waitlist.
#[utoipa::path(
    post,
    path = "/lobbies/{id}/join",
    tag = "lobby",
    params(("X-User-Id" = String, Header, description = "Identity of the requesting user"),
    ("id" = String, Path, description = "Identifier of the lobby to join")),
    responses(
        (status = 200, description = "Joined or waitlisted", body = JoinResponse),
        (status = 404, description = "No such lobby"),
        (status = 409, description = "Already joined, lobby closed, or too much contention")
    )
)]
pub async fn join_lobby(
    State(state): State<SharedState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<JoinResponse>, AppError> {
    let response = lobby_service::join_lobby(&state, id, caller.0).await?;
    Ok(Json(response))
}

/// Leave a lobby, releasing an active slot or a waitlist position.
#[utoipa::path(
    post,
    path = "/lobbies/{id}/leave",
    tag = "lobby",
    params(("X-User-Id" = String, Header, description = "Identity of the requesting user"),
    ("id" = String, Path, description = "Identifier of the lobby to leave")),
    responses(
        (status = 200, description = "Left the lobby", body = LeaveResponse),
        (status = 404, description = "No such lobby"),
        (status = 409, description = "Caller is not a participant or the lobby is closed")
    )
)]
pub async fn leave_lobby(
    State(state): State<SharedState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<LeaveResponse>, AppError> {
    let response = lobby_service::leave_lobby(&state, id, caller.0).await?;
    Ok(Json(response))
}

/// Cancel a lobby; restricted to its creator.
#[utoipa::path(
    post,
    path = "/lobbies/{id}/cancel",
    tag = "lobby",
    params(("X-User-Id" = String, Header, description = "Identity of the requesting user"),
    ("id" = String, Path, description = "Identifier of the lobby to cancel")),
    responses(
        (status = 204, description = "Lobby cancelled"),
        (status = 403, description = "Caller is not the creator"),
        (status = 404, description = "No such lobby")
    )
)]
pub async fn cancel_lobby(
    State(state): State<SharedState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    lobby_service::cancel_lobby(&state, id, caller.0).await?;
    Ok(StatusCode::NO_CONTENT)
}

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::db::directory::with_users;
use crate::error::{ApiError, ApiErrorBody, FieldError};
use crate::models::room::RoomResponse;
use crate::AppState;

/// Longest room name accepted, in characters.
const MAX_NAME_LEN: usize = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/rooms", post(create_room).get(list_rooms))
        .route("/rooms/{code}", get(get_room))
        .route("/rooms/{code}/join", post(join_room))
}

// =========================================================================
// POST /api/rooms — Create a room
// =========================================================================

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    pub name: String,
    #[serde(default = "default_public")]
    pub is_public: bool,
}

fn default_public() -> bool {
    true
}

/// `POST /api/rooms` — Create a room under a fresh short code.
#[utoipa::path(
    post,
    path = "/api/rooms",
    tag = "Rooms",
    request_body = CreateRoomRequest,
    responses(
        (status = 201, description = "Room created", body = RoomResponse),
        (status = 400, description = "Validation error", body = ApiErrorBody),
    ),
)]
pub async fn create_room(
    State(state): State<AppState>,
    body: Result<Json<CreateRoomRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RoomResponse>), ApiError> {
    let Json(body) = body?;

    let name = body.name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(ApiError::validation(vec![FieldError {
            field: "name".into(),
            message: format!("Name must be 1-{MAX_NAME_LEN} characters"),
        }]));
    }

    let room = state.rooms.create(name, body.is_public);
    Ok((
        StatusCode::CREATED,
        Json(with_users(room, &state.presence)),
    ))
}

// =========================================================================
// GET /api/rooms — List public rooms
// =========================================================================

/// `GET /api/rooms` — Public rooms, newest first, with who is in them now.
#[utoipa::path(
    get,
    path = "/api/rooms",
    tag = "Rooms",
    responses(
        (status = 200, description = "Public rooms", body = Vec<RoomResponse>),
    ),
)]
pub async fn list_rooms(State(state): State<AppState>) -> Json<Vec<RoomResponse>> {
    Json(state.rooms.list_public(&state.presence))
}

// =========================================================================
// GET /api/rooms/{code} — Get a room
// =========================================================================

/// `GET /api/rooms/{code}` — Look up a room by code.
#[utoipa::path(
    get,
    path = "/api/rooms/{code}",
    tag = "Rooms",
    params(("code" = String, Path, description = "Room code")),
    responses(
        (status = 200, description = "Room found", body = RoomResponse),
        (status = 404, description = "No such room", body = ApiErrorBody),
    ),
)]
pub async fn get_room(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<RoomResponse>, ApiError> {
    let room = state
        .rooms
        .get(&code)
        .ok_or_else(|| ApiError::room_not_found(&code))?;
    Ok(Json(with_users(room, &state.presence)))
}

// =========================================================================
// POST /api/rooms/{code}/join — Pre-flight check before opening a session
// =========================================================================

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    #[serde(default)]
    pub user_id: Option<String>,
}

/// `POST /api/rooms/{code}/join` — Confirm a room exists before joining it
/// over the gateway. Presence is only created by the WebSocket session.
#[utoipa::path(
    post,
    path = "/api/rooms/{code}/join",
    tag = "Rooms",
    params(("code" = String, Path, description = "Room code")),
    request_body = JoinRoomRequest,
    responses(
        (status = 200, description = "Room found", body = RoomResponse),
        (status = 400, description = "Malformed body", body = ApiErrorBody),
        (status = 404, description = "No such room", body = ApiErrorBody),
    ),
)]
pub async fn join_room(
    State(state): State<AppState>,
    Path(code): Path<String>,
    body: Result<Json<JoinRoomRequest>, JsonRejection>,
) -> Result<Json<RoomResponse>, ApiError> {
    let Json(body) = body?;

    let room = state
        .rooms
        .get(&code)
        .ok_or_else(|| ApiError::room_not_found(&code))?;

    tracing::debug!(
        room_code = %room.code,
        user_id = body.user_id.as_deref().unwrap_or("-"),
        "join pre-flight"
    );
    Ok(Json(with_users(room, &state.presence)))
}

//! Room directory HTTP route handlers
//!
//! Plain CRUD over the in-memory directory. Deleting a room also stops its
//! coordinator and drops every connection, so clients observe an abnormal
//! closure and give up cleanly (a deleted room does not reappear on
//! reconnect).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use uuid::Uuid;

use crate::directory::{CreateRoom, Room, RoomDirectory, UpdateRoom};
use crate::error::ApiResult;
use crate::sync::RoomHub;

/// Shared state for room directory handlers
#[derive(Clone)]
pub struct RoomsState {
    pub directory: RoomDirectory,
    pub hub: RoomHub,
}

impl RoomsState {
    pub fn new(directory: RoomDirectory, hub: RoomHub) -> Self {
        Self { directory, hub }
    }
}

/// Create the `/rooms` router
pub fn rooms_router(state: RoomsState) -> Router {
    Router::new()
        .route("/", get(list_rooms).post(create_room))
        .route("/:id", get(get_room).put(update_room).delete(delete_room))
        .with_state(state)
}

async fn list_rooms(State(state): State<RoomsState>) -> Json<Vec<Room>> {
    Json(state.directory.list())
}

async fn create_room(
    State(state): State<RoomsState>,
    Json(request): Json<CreateRoom>,
) -> ApiResult<impl IntoResponse> {
    let room = state.directory.create(request)?;
    Ok((StatusCode::CREATED, Json(room)))
}

async fn get_room(
    State(state): State<RoomsState>,
    Path(room_id): Path<Uuid>,
) -> ApiResult<Json<Room>> {
    Ok(Json(state.directory.get(room_id)?))
}

async fn update_room(
    State(state): State<RoomsState>,
    Path(room_id): Path<Uuid>,
    Json(request): Json<UpdateRoom>,
) -> ApiResult<Json<Room>> {
    Ok(Json(state.directory.update(room_id, request)?))
}

async fn delete_room(
    State(state): State<RoomsState>,
    Path(room_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if !state.directory.delete(room_id) {
        return Err(crate::error::ApiError::not_found("room", room_id.to_string()));
    }

    state.hub.shutdown_room(room_id);
    Ok(StatusCode::NO_CONTENT)
}

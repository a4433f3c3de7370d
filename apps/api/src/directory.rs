//! In-memory room directory
//!
//! Plain CRUD over the set of rooms plus the participant counters the
//! transport gateway maintains. Rooms live for the process lifetime; an
//! empty room is not deleted, only an explicit delete removes it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

const NAME_MAX_LEN: usize = 100;
const DESCRIPTION_MAX_LEN: usize = 500;

/// A directory entry for one room
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub participant_count: usize,
}

/// Fields accepted when creating a room
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRoom {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Fields accepted when updating a room; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateRoom {
    pub name: Option<String>,
    pub description: Option<String>,
}

fn validate_name(name: &str) -> ApiResult<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ApiError::Validation("room name cannot be empty".to_string()));
    }
    if trimmed.len() > NAME_MAX_LEN {
        return Err(ApiError::Validation(format!(
            "room name must be at most {} characters",
            NAME_MAX_LEN
        )));
    }
    Ok(())
}

fn validate_description(description: &str) -> ApiResult<()> {
    if description.len() > DESCRIPTION_MAX_LEN {
        return Err(ApiError::Validation(format!(
            "room description must be at most {} characters",
            DESCRIPTION_MAX_LEN
        )));
    }
    Ok(())
}

/// Thread-safe room directory shared by routes and the transport gateway
#[derive(Debug, Clone, Default)]
pub struct RoomDirectory {
    rooms: Arc<DashMap<Uuid, Room>>,
}

impl RoomDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a room with a fresh id
    pub fn create(&self, request: CreateRoom) -> ApiResult<Room> {
        validate_name(&request.name)?;
        if let Some(description) = &request.description {
            validate_description(description)?;
        }

        let room = Room {
            id: Uuid::new_v4(),
            name: request.name.trim().to_string(),
            description: request.description,
            created_at: Utc::now(),
            participant_count: 0,
        };

        self.rooms.insert(room.id, room.clone());
        tracing::info!(room_id = %room.id, name = %room.name, "Room created");
        Ok(room)
    }

    /// All rooms, oldest first
    pub fn list(&self) -> Vec<Room> {
        let mut rooms: Vec<Room> = self.rooms.iter().map(|r| r.value().clone()).collect();
        rooms.sort_by_key(|r| r.created_at);
        rooms
    }

    pub fn get(&self, room_id: Uuid) -> ApiResult<Room> {
        self.rooms
            .get(&room_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| ApiError::not_found("room", room_id.to_string()))
    }

    pub fn contains(&self, room_id: Uuid) -> bool {
        self.rooms.contains_key(&room_id)
    }

    /// Update name and/or description
    pub fn update(&self, room_id: Uuid, request: UpdateRoom) -> ApiResult<Room> {
        if let Some(name) = &request.name {
            validate_name(name)?;
        }
        if let Some(description) = &request.description {
            validate_description(description)?;
        }

        let mut room = self
            .rooms
            .get_mut(&room_id)
            .ok_or_else(|| ApiError::not_found("room", room_id.to_string()))?;

        if let Some(name) = request.name {
            room.name = name.trim().to_string();
        }
        if let Some(description) = request.description {
            room.description = Some(description);
        }

        Ok(room.clone())
    }

    /// Remove a room; returns whether it existed
    pub fn delete(&self, room_id: Uuid) -> bool {
        let removed = self.rooms.remove(&room_id).is_some();
        if removed {
            tracing::info!(room_id = %room_id, "Room deleted");
        }
        removed
    }

    /// Adjust a room's participant count, clamping at zero
    pub fn adjust_participants(&self, room_id: Uuid, delta: i64) {
        if let Some(mut room) = self.rooms.get_mut(&room_id) {
            let count = room.participant_count as i64 + delta;
            room.participant_count = count.max(0) as usize;
        }
    }
}

//! WebSocket upgrade handler and per-connection pump
//!
//! Clients open one connection per room at `GET /ws?room_id=...&client_id=...`.
//! The handler validates the target room and client id, registers the
//! connection, asks the room coordinator for a join snapshot, then pumps
//! messages between the socket and the registry channel until either side
//! closes.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension, Query,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use unison_protocol::{ClientCommand, ErrorData, ServerEvent};

use crate::directory::RoomDirectory;
use super::coordinator::RoomHub;

/// Query parameters for the WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQueryParams {
    /// Target room
    room_id: Uuid,
    /// Client-generated identifier, stable across reconnects
    client_id: String,
}

/// Validate client id format
fn validate_client_id(client_id: &str) -> Result<(), &'static str> {
    if client_id.is_empty() {
        return Err("client_id cannot be empty");
    }
    if client_id.len() > 128 {
        return Err("client_id must be at most 128 characters");
    }
    if !client_id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err("client_id contains invalid characters");
    }
    Ok(())
}

/// Send one error event and close the socket
async fn reject(mut socket: WebSocket, error: ErrorData) {
    let event = ServerEvent::Error { data: error };
    if let Ok(json) = serde_json::to_string(&event) {
        let _ = socket.send(Message::Text(json)).await;
    }
    let _ = socket.close().await;
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQueryParams>,
    Extension(hub): Extension<RoomHub>,
    Extension(directory): Extension<RoomDirectory>,
) -> Response {
    if let Err(e) = validate_client_id(&params.client_id) {
        tracing::warn!(client_id = %params.client_id, "Invalid client id: {}", e);
        return ws.on_upgrade(move |socket| reject(socket, ErrorData::invalid_client_id(e)));
    }

    if !directory.contains(params.room_id) {
        tracing::warn!(room_id = %params.room_id, "Connection to unknown room rejected");
        let room_id = params.room_id;
        return ws.on_upgrade(move |socket| reject(socket, ErrorData::room_not_found(room_id)));
    }

    tracing::info!(
        room_id = %params.room_id,
        client_id = %params.client_id,
        "WebSocket connection accepted"
    );

    ws.on_upgrade(move |socket| {
        handle_socket(socket, params.room_id, params.client_id, hub, directory)
    })
}

/// Pump an established connection until it closes
async fn handle_socket(
    socket: WebSocket,
    room_id: Uuid,
    client_id: String,
    hub: RoomHub,
    directory: RoomDirectory,
) {
    let connection_id = Uuid::new_v4();
    let registry = hub.registry().clone();

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    registry.add(room_id, connection_id, client_id.clone(), tx);
    directory.adjust_participants(room_id, 1);

    let room = hub.room(room_id);
    room.join(connection_id);

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Outbound: registry channel -> socket
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize outbound event");
                }
            }
        }
        // Channel closed (reaped or room deleted): say goodbye cleanly
        let _ = ws_sender.close().await;
    });

    // Inbound: socket -> room coordinator
    let recv_registry = registry.clone();
    let recv_room = room.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    recv_registry.touch(room_id, connection_id);
                    match serde_json::from_str::<ClientCommand>(&text) {
                        // Heartbeats turn around at the transport layer
                        Ok(ClientCommand::Ping) => {
                            let _ = recv_registry.send_to(room_id, connection_id, ServerEvent::Pong);
                        }
                        Ok(command) => recv_room.command(connection_id, command),
                        Err(e) => {
                            tracing::debug!(
                                error = %e,
                                connection_id = %connection_id,
                                "Failed to parse client command"
                            );
                            let _ = recv_registry.send_to(
                                room_id,
                                connection_id,
                                ServerEvent::Error { data: ErrorData::invalid_message(e.to_string()) },
                            );
                        }
                    }
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                    recv_registry.touch(room_id, connection_id);
                }
                Ok(Message::Binary(_)) => {
                    tracing::debug!(connection_id = %connection_id, "Ignoring binary frame");
                }
                Ok(Message::Close(_)) => break,
                Err(e) => {
                    tracing::debug!(error = %e, connection_id = %connection_id, "WebSocket error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    // A connection the reaper already removed has also been counted out
    if registry.remove(room_id, connection_id) {
        directory.adjust_participants(room_id, -1);
    }

    tracing::info!(
        room_id = %room_id,
        client_id = %client_id,
        connection_id = %connection_id,
        "WebSocket connection closed"
    );
}

//! Connection registry and fan-out
//!
//! Tracks which client connections belong to which room and delivers
//! outbound events to them. Each connection is represented by an unbounded
//! channel sender; the socket pump on the other end drains it, so a slow
//! consumer never blocks a coordinator or its sibling connections.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use unison_protocol::ServerEvent;

/// Handle for delivering events to one client connection
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Client-provided identifier, stable across reconnects
    pub client_id: String,

    /// Channel into the connection's send task
    sender: mpsc::UnboundedSender<ServerEvent>,

    /// When this connection was established (Unix timestamp ms)
    pub connected_at: i64,

    /// Last heartbeat/command timestamp (atomic for lock-free updates)
    last_activity: Arc<AtomicI64>,
}

impl ConnectionHandle {
    pub fn new(client_id: String, sender: mpsc::UnboundedSender<ServerEvent>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            client_id,
            sender,
            connected_at: now,
            last_activity: Arc::new(AtomicI64::new(now)),
        }
    }

    /// Record activity on this connection
    pub fn touch(&self) {
        self.last_activity
            .store(chrono::Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn last_seen(&self) -> i64 {
        self.last_activity.load(Ordering::Relaxed)
    }

    /// Deliver an event; a closed channel is reported, not panicked on
    pub fn send(&self, event: ServerEvent) -> Result<(), DeliveryError> {
        self.sender
            .send(event)
            .map_err(|_| DeliveryError::ConnectionClosed)
    }

    pub fn is_alive(&self) -> bool {
        !self.sender.is_closed()
    }
}

/// Error type for targeted delivery
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("room not found")]
    RoomNotFound,
    #[error("connection not found")]
    ConnectionNotFound,
    #[error("connection closed")]
    ConnectionClosed,
}

/// Connections of a single room
#[derive(Debug, Default)]
struct RoomConnections {
    connections: DashMap<Uuid, ConnectionHandle>,
}

/// Maps rooms to their live connections
///
/// Thread-safe and cheaply clonable; the registry is the exclusive owner of
/// all connection handles.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    rooms: Arc<DashMap<Uuid, RoomConnections>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection; re-adding an id replaces the stale handle
    pub fn add(
        &self,
        room_id: Uuid,
        connection_id: Uuid,
        client_id: String,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) {
        let handle = ConnectionHandle::new(client_id, sender);
        self.rooms
            .entry(room_id)
            .or_default()
            .connections
            .insert(connection_id, handle);

        tracing::debug!(
            room_id = %room_id,
            connection_id = %connection_id,
            connections = self.connection_count(room_id),
            "Connection added"
        );
    }

    /// Remove a connection; removing twice is a no-op
    pub fn remove(&self, room_id: Uuid, connection_id: Uuid) -> bool {
        let Some(room) = self.rooms.get(&room_id) else {
            return false;
        };

        let removed = room.connections.remove(&connection_id).is_some();
        let is_empty = room.connections.is_empty();
        drop(room);

        if is_empty {
            self.rooms
                .remove_if(&room_id, |_, room| room.connections.is_empty());
        }

        if removed {
            tracing::debug!(
                room_id = %room_id,
                connection_id = %connection_id,
                "Connection removed"
            );
        }

        removed
    }

    /// Drop every connection of a room (room deletion)
    pub fn remove_room(&self, room_id: Uuid) -> usize {
        self.rooms
            .remove(&room_id)
            .map(|(_, room)| room.connections.len())
            .unwrap_or(0)
    }

    pub fn connection_count(&self, room_id: Uuid) -> usize {
        self.rooms
            .get(&room_id)
            .map(|r| r.connections.len())
            .unwrap_or(0)
    }

    pub fn total_connections(&self) -> usize {
        self.rooms.iter().map(|r| r.connections.len()).sum()
    }

    /// Record activity for a connection
    pub fn touch(&self, room_id: Uuid, connection_id: Uuid) {
        if let Some(room) = self.rooms.get(&room_id) {
            if let Some(handle) = room.connections.get(&connection_id) {
                handle.touch();
            }
        }
    }

    /// Deliver an event to one connection
    pub fn send_to(
        &self,
        room_id: Uuid,
        connection_id: Uuid,
        event: ServerEvent,
    ) -> Result<(), DeliveryError> {
        let room = self.rooms.get(&room_id).ok_or(DeliveryError::RoomNotFound)?;
        let handle = room
            .connections
            .get(&connection_id)
            .ok_or(DeliveryError::ConnectionNotFound)?;
        handle.send(event)
    }

    /// Fan an event out to every connection in a room, optionally skipping
    /// the originator; a concurrently-closed connection is skipped, not an
    /// error. Returns the number of deliveries.
    pub fn broadcast(&self, room_id: Uuid, event: &ServerEvent, except: Option<Uuid>) -> usize {
        let Some(room) = self.rooms.get(&room_id) else {
            return 0;
        };

        let mut sent = 0;
        for entry in room.connections.iter() {
            if Some(*entry.key()) == except {
                continue;
            }
            if entry.value().send(event.clone()).is_ok() {
                sent += 1;
            }
        }

        sent
    }

    /// Remove connections with no activity within `max_idle_ms` (or whose
    /// channel already closed). Returns the room of each reaped connection
    /// so callers can settle participant counts.
    pub fn reap_stale(&self, max_idle_ms: i64) -> Vec<Uuid> {
        let now = chrono::Utc::now().timestamp_millis();
        let mut reaped = Vec::new();

        for room_entry in self.rooms.iter() {
            let room_id = *room_entry.key();
            let stale: Vec<Uuid> = room_entry
                .connections
                .iter()
                .filter(|e| now - e.value().last_seen() > max_idle_ms || !e.value().is_alive())
                .map(|e| *e.key())
                .collect();

            for connection_id in stale {
                if room_entry.connections.remove(&connection_id).is_some() {
                    tracing::debug!(
                        room_id = %room_id,
                        connection_id = %connection_id,
                        "Reaped stale connection"
                    );
                    reaped.push(room_id);
                }
            }
        }

        self.rooms.retain(|_, room| !room.connections.is_empty());

        reaped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_conn(
        registry: &ConnectionRegistry,
        room_id: Uuid,
    ) -> (Uuid, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection_id = Uuid::new_v4();
        registry.add(room_id, connection_id, "client".to_string(), tx);
        (connection_id, rx)
    }

    #[test]
    fn test_add_remove_idempotent() {
        let registry = ConnectionRegistry::new();
        let room_id = Uuid::new_v4();
        let (conn, _rx) = add_conn(&registry, room_id);

        assert_eq!(registry.connection_count(room_id), 1);
        assert!(registry.remove(room_id, conn));
        assert!(!registry.remove(room_id, conn));
        assert_eq!(registry.connection_count(room_id), 0);
        assert_eq!(registry.total_connections(), 0);
    }

    #[test]
    fn test_broadcast_reaches_all() {
        let registry = ConnectionRegistry::new();
        let room_id = Uuid::new_v4();
        let (_c1, mut rx1) = add_conn(&registry, room_id);
        let (_c2, mut rx2) = add_conn(&registry, room_id);

        let sent = registry.broadcast(room_id, &ServerEvent::Pong, None);
        assert_eq!(sent, 2);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn test_broadcast_can_skip_originator() {
        let registry = ConnectionRegistry::new();
        let room_id = Uuid::new_v4();
        let (c1, mut rx1) = add_conn(&registry, room_id);
        let (_c2, mut rx2) = add_conn(&registry, room_id);

        let sent = registry.broadcast(room_id, &ServerEvent::Pong, Some(c1));
        assert_eq!(sent, 1);
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn test_broadcast_tolerates_closed_connection() {
        let registry = ConnectionRegistry::new();
        let room_id = Uuid::new_v4();
        let (_c1, rx1) = add_conn(&registry, room_id);
        let (_c2, mut rx2) = add_conn(&registry, room_id);

        drop(rx1);
        let sent = registry.broadcast(room_id, &ServerEvent::Pong, None);
        assert_eq!(sent, 1);
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn test_rooms_are_isolated() {
        let registry = ConnectionRegistry::new();
        let room_a = Uuid::new_v4();
        let room_b = Uuid::new_v4();
        let (_c1, mut rx1) = add_conn(&registry, room_a);
        let (_c2, mut rx2) = add_conn(&registry, room_b);

        registry.broadcast(room_a, &ServerEvent::Pong, None);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
    }

    #[test]
    fn test_send_to_unknown_targets() {
        let registry = ConnectionRegistry::new();
        let room_id = Uuid::new_v4();

        assert_eq!(
            registry.send_to(room_id, Uuid::new_v4(), ServerEvent::Pong),
            Err(DeliveryError::RoomNotFound)
        );

        let (_conn, _rx) = add_conn(&registry, room_id);
        assert_eq!(
            registry.send_to(room_id, Uuid::new_v4(), ServerEvent::Pong),
            Err(DeliveryError::ConnectionNotFound)
        );
    }

    #[test]
    fn test_reap_closed_connections() {
        let registry = ConnectionRegistry::new();
        let room_id = Uuid::new_v4();
        let (_c1, rx1) = add_conn(&registry, room_id);
        let (_c2, _rx2) = add_conn(&registry, room_id);

        drop(rx1);
        // Generous idle budget: only the closed channel is reaped
        let reaped = registry.reap_stale(60_000);
        assert_eq!(reaped, vec![room_id]);
        assert_eq!(registry.connection_count(room_id), 1);
    }

    #[test]
    fn test_remove_room_drops_all_handles() {
        let registry = ConnectionRegistry::new();
        let room_id = Uuid::new_v4();
        let (_c1, mut rx1) = add_conn(&registry, room_id);
        let (_c2, _rx2) = add_conn(&registry, room_id);

        assert_eq!(registry.remove_room(room_id), 2);
        assert_eq!(registry.connection_count(room_id), 0);
        // Senders dropped with the handles: receivers observe closure
        assert!(rx1.try_recv().is_err());
    }
}

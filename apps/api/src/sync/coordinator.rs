//! Per-room coordination
//!
//! Each room is owned by exactly one tokio task. Commands from any number
//! of connections funnel through the room's channel and are applied one at
//! a time in arrival order, so no two mutations ever interleave. The task
//! also drives the reconciler's clock work: heartbeat broadcasts and the
//! advisory-pause grace window, computed as the earliest pending deadline
//! of its select loop.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use uuid::Uuid;

use unison_protocol::{ClientCommand, ErrorData, RoomSnapshot, ServerEvent};

use super::reconcile::{Reconciler, SampleClass, SyncConfig, SyncSample};
use super::registry::ConnectionRegistry;
use super::state::{RoomState, StateError};

/// Messages accepted by a room task
#[derive(Debug)]
pub enum RoomMessage {
    /// A connection joined; it gets a full-state push
    Join { connection_id: Uuid },

    /// A command from a connection
    Command {
        connection_id: Uuid,
        command: ClientCommand,
    },

    /// Read the current state without going through the wire
    Snapshot { reply: oneshot::Sender<RoomSnapshot> },

    /// Stop the task (room deleted)
    Shutdown,
}

/// Clonable handle to one room's command queue
#[derive(Debug, Clone)]
pub struct RoomHandle {
    tx: mpsc::UnboundedSender<RoomMessage>,
}

impl RoomHandle {
    /// Announce a joined connection
    pub fn join(&self, connection_id: Uuid) {
        let _ = self.tx.send(RoomMessage::Join { connection_id });
    }

    /// Enqueue a command; a dead room swallows it
    pub fn command(&self, connection_id: Uuid, command: ClientCommand) {
        let _ = self.tx.send(RoomMessage::Command { connection_id, command });
    }

    /// Current state by value; resolves as soon as the queue drains to it
    pub async fn snapshot(&self) -> Option<RoomSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RoomMessage::Snapshot { reply }).ok()?;
        rx.await.ok()
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(RoomMessage::Shutdown);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawns and tracks room tasks
#[derive(Clone)]
pub struct RoomHub {
    rooms: Arc<DashMap<Uuid, RoomHandle>>,
    registry: ConnectionRegistry,
    config: SyncConfig,
}

impl RoomHub {
    pub fn new(registry: ConnectionRegistry, config: SyncConfig) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            registry,
            config,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Handle to a room's coordinator, spawning it on first use
    pub fn room(&self, room_id: Uuid) -> RoomHandle {
        self.rooms
            .entry(room_id)
            .or_insert_with(|| RoomCoordinator::spawn(room_id, self.registry.clone(), self.config.clone()))
            .clone()
    }

    /// Stop a room's coordinator and drop its connections
    pub fn shutdown_room(&self, room_id: Uuid) {
        if let Some((_, handle)) = self.rooms.remove(&room_id) {
            handle.shutdown();
        }
        self.registry.remove_room(room_id);
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

/// The state-owning task behind a `RoomHandle`
struct RoomCoordinator {
    room_id: Uuid,
    state: RoomState,
    reconciler: Reconciler,
    registry: ConnectionRegistry,
    rx: mpsc::UnboundedReceiver<RoomMessage>,
}

impl RoomCoordinator {
    fn spawn(room_id: Uuid, registry: ConnectionRegistry, config: SyncConfig) -> RoomHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let now = Instant::now();

        let coordinator = Self {
            room_id,
            state: RoomState::new(now),
            reconciler: Reconciler::new(config, now),
            registry,
            rx,
        };

        tokio::spawn(coordinator.run());
        tracing::info!(room_id = %room_id, "Room coordinator started");

        RoomHandle { tx }
    }

    async fn run(mut self) {
        loop {
            let deadline = self.next_deadline();

            tokio::select! {
                message = self.rx.recv() => match message {
                    Some(RoomMessage::Join { connection_id }) => self.handle_join(connection_id),
                    Some(RoomMessage::Command { connection_id, command }) => {
                        self.handle_command(connection_id, command)
                    }
                    Some(RoomMessage::Snapshot { reply }) => {
                        let _ = reply.send(self.snapshot(Instant::now()));
                    }
                    Some(RoomMessage::Shutdown) | None => break,
                },
                _ = tokio::time::sleep_until(deadline) => self.on_tick(Instant::now()),
            }
        }

        tracing::info!(room_id = %self.room_id, "Room coordinator stopped");
    }

    /// Earliest of the heartbeat cadence and a pending pause expiry
    fn next_deadline(&self) -> Instant {
        let heartbeat = self.reconciler.heartbeat_deadline(self.state.is_playing());
        match self.reconciler.pending_pause_deadline() {
            Some(pause) => heartbeat.min(pause),
            None => heartbeat,
        }
    }

    fn handle_join(&mut self, connection_id: Uuid) {
        let snapshot = self.snapshot(Instant::now());
        let _ = self.registry.send_to(
            self.room_id,
            connection_id,
            ServerEvent::StateUpdate { data: snapshot },
        );
    }

    fn handle_command(&mut self, connection_id: Uuid, command: ClientCommand) {
        let now = Instant::now();

        match command {
            ClientCommand::AddTrack { track } => {
                if !track.is_well_formed() {
                    tracing::warn!(room_id = %self.room_id, track_id = %track.id, "Rejected malformed track");
                    self.send_error(connection_id, ErrorData::invalid_track("track id and title are required"));
                    return;
                }
                self.state.add_track(track, now);
                self.broadcast_state(now);
            }

            ClientCommand::Play => {
                // A play always clears any advisory pause waiting out its
                // grace window, even when the transport is already running.
                if let Some(reason) = self.reconciler.cancel_pending_pause() {
                    tracing::debug!(room_id = %self.room_id, %reason, "Advisory pause cancelled by play");
                }
                if self.state.play(now) {
                    self.broadcast_state(now);
                }
            }

            ClientCommand::Pause { reason } => {
                if reason.is_advisory() {
                    if self.state.is_playing() {
                        tracing::debug!(room_id = %self.room_id, %reason, "Advisory pause queued");
                        self.reconciler.queue_pause(reason, now);
                    }
                } else if self.state.pause(now) {
                    self.broadcast_state(now);
                }
            }

            ClientCommand::Seek { position, current_track } => {
                self.handle_seek(connection_id, position, current_track, now)
            }

            ClientCommand::NextTrack => {
                if self.state.next_track(now) {
                    self.broadcast_state(now);
                }
            }

            ClientCommand::PrevTrack => {
                if self.state.prev_track(now) {
                    self.broadcast_state(now);
                }
            }

            ClientCommand::RemoveTrack { index } => match self.state.remove_track(index, now) {
                Ok(()) => self.broadcast_state(now),
                Err(StateError::OutOfRange { index, len }) => {
                    self.send_error(connection_id, ErrorData::out_of_range(index, len));
                }
            },

            ClientCommand::SyncRequest => self.handle_join(connection_id),

            // Answered at the transport layer; harmless if it lands here
            ClientCommand::Ping => {
                let _ = self.registry.send_to(self.room_id, connection_id, ServerEvent::Pong);
            }
        }
    }

    fn handle_seek(
        &mut self,
        connection_id: Uuid,
        position: f64,
        current_track: Option<usize>,
        now: Instant,
    ) {
        // An explicit track selection is always intentional; only bare
        // position reports go through classification.
        if let Some(index) = current_track {
            if !position.is_finite() {
                tracing::warn!(room_id = %self.room_id, "Dropped non-finite seek position");
                return;
            }
            match self.state.seek(position, Some(index), now) {
                Ok(()) => self.broadcast_state(now),
                Err(StateError::OutOfRange { index, len }) => {
                    self.send_error(connection_id, ErrorData::out_of_range(index, len));
                }
            }
            return;
        }

        let sample = SyncSample { position, playing: self.state.is_playing() };
        match self.reconciler.classify(sample, now) {
            SampleClass::Anomaly => {
                tracing::warn!(
                    room_id = %self.room_id,
                    position,
                    "Dropped malformed position sample"
                );
            }
            SampleClass::Suppressed { drift } => {
                tracing::debug!(room_id = %self.room_id, drift, "Suppressed broadcast echo");
            }
            SampleClass::Informational { drift } => {
                tracing::trace!(room_id = %self.room_id, drift, "Informational position sample");
            }
            SampleClass::IntentionalSeek { drift } => {
                tracing::info!(room_id = %self.room_id, position, drift, "Intentional seek");
                // Index already validated as None; cannot fail
                if self.state.seek(position, None, now).is_ok() {
                    self.broadcast_state(now);
                }
            }
        }
    }

    fn on_tick(&mut self, now: Instant) {
        if let Some(reason) = self.reconciler.take_expired_pause(now) {
            if self.state.pause(now) {
                tracing::info!(room_id = %self.room_id, %reason, "Advisory pause applied after grace window");
                self.broadcast_state(now);
                return;
            }
        }

        if now >= self.reconciler.heartbeat_deadline(self.state.is_playing()) {
            let snapshot = self.snapshot(now);
            let position = snapshot.position;
            let timestamp = snapshot.last_update_time;
            self.registry.broadcast(
                self.room_id,
                &ServerEvent::MasterSync { data: snapshot, timestamp },
                None,
            );
            self.reconciler.record_broadcast(position, self.state.is_playing(), now);
        }
    }

    fn snapshot(&self, now: Instant) -> RoomSnapshot {
        let wall_clock = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
        self.state.snapshot_at(now, wall_clock)
    }

    /// Full-state push to every connection after an accepted mutation
    fn broadcast_state(&mut self, now: Instant) {
        let snapshot = self.snapshot(now);
        let position = snapshot.position;
        self.registry
            .broadcast(self.room_id, &ServerEvent::StateUpdate { data: snapshot }, None);
        self.reconciler.record_broadcast(position, self.state.is_playing(), now);
    }

    fn send_error(&self, connection_id: Uuid, error: ErrorData) {
        let _ = self.registry.send_to(
            self.room_id,
            connection_id,
            ServerEvent::Error { data: error },
        );
    }
}

//! Room playback synchronization engine
//!
//! This module keeps every connection in a room on the same playlist,
//! transport state and playback position:
//! - `state`: the authoritative per-room aggregate
//! - `reconcile`: classifies client position reports and owns the debounce
//!   windows
//! - `coordinator`: one task per room, serializing all mutations
//! - `registry`: room -> connection fan-out
//! - `handler`: the WebSocket endpoint

pub mod coordinator;
pub mod handler;
pub mod reconcile;
pub mod registry;
pub mod state;

pub use coordinator::{RoomHandle, RoomHub};
pub use handler::ws_handler;
pub use reconcile::{Reconciler, SampleClass, SyncConfig, SyncSample};
pub use registry::ConnectionRegistry;
pub use state::{RoomPhase, RoomState};

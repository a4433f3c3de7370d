//! Wire protocol for Unison room synchronization
//!
//! This crate defines the message types exchanged between a Unison server
//! and its clients over a persistent per-room connection. Messages are
//! serialized as JSON with a `type` discriminator field, e.g.
//! `{"type":"seek","position":42.0}`.
//!
//! The server and the client crates both depend on these types, so the wire
//! format is defined exactly once.

mod messages;
mod track;

pub use messages::{ClientCommand, ErrorData, PauseReason, RoomSnapshot, ServerEvent};
pub use track::Track;

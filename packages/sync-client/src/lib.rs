//! Client-side transport gateway for Unison rooms
//!
//! Maintains one WebSocket connection to a room, exposes typed command
//! senders and a stream of server events, keeps the connection alive with
//! application-level pings, and reconnects with exponential backoff when
//! the connection drops for any reason other than an explicit leave.
//!
//! # Example
//!
//! ```rust,no_run
//! use unison_sync_client::{RoomClient, ReconnectPolicy};
//! use unison_protocol::ClientCommand;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (client, mut events) = RoomClient::connect(
//!     "ws://localhost:8080",
//!     "e2b4a5d0-0000-0000-0000-000000000000",
//!     "my-device",
//!     ReconnectPolicy::default(),
//! )?;
//!
//! client.send(ClientCommand::Play)?;
//!
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

mod backoff;
mod client;

pub use backoff::ReconnectPolicy;
pub use client::{ClientError, ConnectionEvent, RoomClient};

//! HTTP route handlers for the Unison API
//!
//! - Room directory CRUD (`/rooms`)
//! - Catalog lookup (`/search`, `/videos/:id`)
//! - Health checks (`/health`)
//!
//! The WebSocket endpoint lives in `crate::sync::handler`.

pub mod health;
pub mod rooms;
pub mod search;

pub use health::health_router;
pub use rooms::{rooms_router, RoomsState};
pub use search::{search_router, SearchState};

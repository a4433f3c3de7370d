//! YouTube Data API client for Unison
//!
//! Resolves search queries and video ids to playable track metadata. This
//! crate is a thin catalog wrapper: no caching, no quota management, just
//! typed lookups with bounded retry on transient failures.
//!
//! # Example
//!
//! ```rust,no_run
//! use unison_youtube_client::YoutubeClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = YoutubeClient::new("your_api_key")?;
//!
//! let tracks = client.search("lofi beats", 10).await?;
//! for track in tracks {
//!     println!("{} ({})", track.title, track.channel);
//! }
//!
//! let track = client.video_details("dQw4w9WgXcQ").await?;
//! println!("duration: {:?}", track.duration);
//! # Ok(())
//! # }
//! ```
//!
//! # Environment Variables
//!
//! - `YOUTUBE_API_KEY`: API key for the YouTube Data API (required)

mod client;
mod error;
mod models;

pub use client::YoutubeClient;
pub use error::{YoutubeError, YoutubeResult};
pub use models::parse_iso8601_duration;

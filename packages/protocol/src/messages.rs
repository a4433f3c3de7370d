//! Command and event envelopes for the per-room connection
//!
//! Clients send commands, the server answers with events. Both directions
//! use internally-tagged JSON (`{"type": ..., ...fields}`), so the wire
//! shape is fully determined by the serde attributes here.

use serde::{Deserialize, Serialize};

use crate::track::Track;

// =============================================================================
// Client -> Server Commands
// =============================================================================

/// Commands sent from a client to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Append a track to the room playlist
    AddTrack { track: Track },

    /// Start playback of the current track
    Play,

    /// Pause playback; only a `user` pause is authoritative, the other
    /// reasons are advisory and may be absorbed by the server
    Pause {
        #[serde(default)]
        reason: PauseReason,
    },

    /// Report a playback position, optionally selecting a playlist entry.
    /// Without `current_track` this is a raw position sample that the server
    /// classifies; with it, an explicit track selection.
    Seek {
        position: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        current_track: Option<usize>,
    },

    /// Advance to the next playlist entry (no wraparound)
    NextTrack,

    /// Go back to the previous playlist entry (no wraparound)
    PrevTrack,

    /// Remove a playlist entry by index
    RemoveTrack { index: usize },

    /// Ask for a fresh full-state push
    SyncRequest,

    /// Application-level heartbeat
    Ping,
}

/// Why a client asked to pause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PauseReason {
    /// Deliberate user action; always propagates
    #[default]
    User,
    /// Local player stalled to buffer
    Buffering,
    /// App/tab moved to background
    Backgrounded,
    /// Local player error
    Error,
}

impl PauseReason {
    /// Advisory pauses are debounced by the server rather than applied
    /// immediately.
    pub fn is_advisory(&self) -> bool {
        !matches!(self, PauseReason::User)
    }
}

impl std::fmt::Display for PauseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PauseReason::User => write!(f, "user"),
            PauseReason::Buffering => write!(f, "buffering"),
            PauseReason::Backgrounded => write!(f, "backgrounded"),
            PauseReason::Error => write!(f, "error"),
        }
    }
}

// =============================================================================
// Server -> Client Events
// =============================================================================

/// Events sent from the server to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Full-state push: on join and after any accepted mutation
    StateUpdate { data: RoomSnapshot },

    /// Periodic reconciled-position broadcast with the server send time
    /// (seconds since the Unix epoch), independent of user actions
    MasterSync { data: RoomSnapshot, timestamp: f64 },

    /// Heartbeat reply
    Pong,

    /// Per-connection error surface for rejected commands and malformed
    /// frames; never broadcast
    Error { data: ErrorData },
}

/// A point-in-time copy of a room's authoritative state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    /// Ordered playlist; duplicates allowed
    pub playlist: Vec<Track>,

    /// Index of the selected entry, or null when nothing is selected
    pub current_track: Option<usize>,

    /// Transport flag
    pub playing: bool,

    /// Playback offset in seconds at `last_update_time`
    pub position: f64,

    /// Wall-clock seconds (Unix epoch) at which `position` was accurate;
    /// while playing, observers extrapolate `position + (now - last_update_time)`
    pub last_update_time: f64,

    /// Room-wide default output level
    #[serde(default = "default_volume")]
    pub volume: f64,
}

fn default_volume() -> f64 {
    1.0
}

impl Default for RoomSnapshot {
    fn default() -> Self {
        Self {
            playlist: Vec::new(),
            current_track: None,
            playing: false,
            position: 0.0,
            last_update_time: 0.0,
            volume: 1.0,
        }
    }
}

/// Payload for `ServerEvent::Error`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
    pub code: String,
    pub message: String,
}

impl ErrorData {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn invalid_message(message: impl Into<String>) -> Self {
        Self::new("INVALID_MESSAGE", message)
    }

    pub fn invalid_track(message: impl Into<String>) -> Self {
        Self::new("INVALID_TRACK", message)
    }

    pub fn out_of_range(index: usize, len: usize) -> Self {
        Self::new(
            "OUT_OF_RANGE",
            format!("index {} is out of range for playlist of length {}", index, len),
        )
    }

    pub fn room_not_found(room_id: impl std::fmt::Display) -> Self {
        Self::new("ROOM_NOT_FOUND", format!("room {} not found", room_id))
    }

    pub fn invalid_client_id(message: impl Into<String>) -> Self {
        Self::new("INVALID_CLIENT_ID", message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track() -> Track {
        Track {
            id: "dQw4w9WgXcQ".to_string(),
            title: "Song".to_string(),
            thumbnail: "https://img.example/t.jpg".to_string(),
            channel: "Channel".to_string(),
            duration: None,
            published_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_command_wire_tags() {
        let cases: Vec<(ClientCommand, &str)> = vec![
            (ClientCommand::AddTrack { track: track() }, "add_track"),
            (ClientCommand::Play, "play"),
            (ClientCommand::Pause { reason: PauseReason::User }, "pause"),
            (
                ClientCommand::Seek { position: 40.0, current_track: None },
                "seek",
            ),
            (ClientCommand::NextTrack, "next_track"),
            (ClientCommand::PrevTrack, "prev_track"),
            (ClientCommand::RemoveTrack { index: 1 }, "remove_track"),
            (ClientCommand::SyncRequest, "sync_request"),
            (ClientCommand::Ping, "ping"),
        ];

        for (cmd, tag) in cases {
            let json = serde_json::to_string(&cmd).unwrap();
            assert!(
                json.contains(&format!("\"type\":\"{}\"", tag)),
                "expected tag {} in {}",
                tag,
                json
            );
            let parsed: ClientCommand = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, cmd);
        }
    }

    #[test]
    fn test_pause_reason_defaults_to_user() {
        let parsed: ClientCommand = serde_json::from_str(r#"{"type":"pause"}"#).unwrap();
        assert_eq!(parsed, ClientCommand::Pause { reason: PauseReason::User });

        let parsed: ClientCommand =
            serde_json::from_str(r#"{"type":"pause","reason":"buffering"}"#).unwrap();
        assert_eq!(parsed, ClientCommand::Pause { reason: PauseReason::Buffering });
    }

    #[test]
    fn test_seek_with_track_selection() {
        let json = r#"{"type":"seek","position":12.5,"current_track":1}"#;
        let parsed: ClientCommand = serde_json::from_str(json).unwrap();
        assert_eq!(
            parsed,
            ClientCommand::Seek { position: 12.5, current_track: Some(1) }
        );

        // current_track is omitted from a plain position sample
        let json = serde_json::to_string(&ClientCommand::Seek {
            position: 12.5,
            current_track: None,
        })
        .unwrap();
        assert!(!json.contains("current_track"));
    }

    #[test]
    fn test_state_update_envelope() {
        let event = ServerEvent::StateUpdate {
            data: RoomSnapshot {
                playlist: vec![track()],
                current_track: Some(0),
                playing: true,
                position: 40.0,
                last_update_time: 1_700_000_000.0,
                volume: 1.0,
            },
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"state_update\""));
        assert!(json.contains("\"current_track\":0"));
        assert!(json.contains("\"last_update_time\""));

        let parsed: ServerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_master_sync_carries_timestamp() {
        let event = ServerEvent::MasterSync {
            data: RoomSnapshot::default(),
            timestamp: 1_700_000_000.5,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"master_sync\""));
        assert!(json.contains("\"timestamp\""));

        let parsed: ServerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_pong_round_trip() {
        let json = serde_json::to_string(&ServerEvent::Pong).unwrap();
        assert_eq!(json, r#"{"type":"pong"}"#);
        let parsed: ServerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ServerEvent::Pong);
    }

    #[test]
    fn test_snapshot_volume_defaults() {
        let json = r#"{"playlist":[],"current_track":null,"playing":false,"position":0.0,"last_update_time":0.0}"#;
        let parsed: RoomSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.volume, 1.0);
    }

    #[test]
    fn test_error_data_constructors() {
        let err = ErrorData::out_of_range(5, 2);
        assert_eq!(err.code, "OUT_OF_RANGE");
        assert!(err.message.contains('5'));
        assert!(err.message.contains('2'));

        let err = ErrorData::invalid_message("bad json");
        assert_eq!(err.code, "INVALID_MESSAGE");
    }
}

//! Track metadata as resolved by the catalog lookup

use serde::{Deserialize, Serialize};

/// An externally-hosted track in a room playlist
///
/// Immutable once added; the `id` is the provider's opaque video identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Provider video identifier (unique within the provider)
    pub id: String,

    /// Display title
    pub title: String,

    /// Thumbnail image URL
    pub thumbnail: String,

    /// Channel/author label
    pub channel: String,

    /// Track length in seconds, when the provider reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,

    /// Publication timestamp as reported by the provider (ISO 8601)
    #[serde(rename = "publishedAt")]
    pub published_at: String,
}

impl Track {
    /// Check that the payload is usable as a playlist entry
    ///
    /// A track needs at least a non-empty id and title; everything else is
    /// display metadata.
    pub fn is_well_formed(&self) -> bool {
        !self.id.trim().is_empty()
            && !self.title.trim().is_empty()
            && self.duration.map_or(true, |d| d.is_finite() && d >= 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str, title: &str) -> Track {
        Track {
            id: id.to_string(),
            title: title.to_string(),
            thumbnail: "https://img.example/default.jpg".to_string(),
            channel: "Channel".to_string(),
            duration: None,
            published_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_track_serialization_field_names() {
        let json = serde_json::to_string(&track("abc123", "Song")).unwrap();
        assert!(json.contains("\"publishedAt\""));
        assert!(!json.contains("\"duration\""));

        let parsed: Track = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, "abc123");
        assert_eq!(parsed.published_at, "2024-01-01T00:00:00Z");
    }

    #[test]
    fn test_track_well_formed() {
        assert!(track("abc123", "Song").is_well_formed());
        assert!(!track("", "Song").is_well_formed());
        assert!(!track("abc123", "  ").is_well_formed());

        let mut t = track("abc123", "Song");
        t.duration = Some(f64::NAN);
        assert!(!t.is_well_formed());

        t.duration = Some(185.0);
        assert!(t.is_well_formed());
    }
}

//! YouTube Data API response models

use serde::Deserialize;

// Internal response types for deserialization

#[derive(Debug, Deserialize)]
pub(crate) struct SearchListResponse {
    #[serde(default)]
    pub items: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResult {
    pub id: SearchResultId,
    pub snippet: Snippet,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResultId {
    #[serde(default)]
    pub kind: String,
    #[serde(rename = "videoId")]
    pub video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VideoListResponse {
    #[serde(default)]
    pub items: Vec<VideoResult>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VideoResult {
    pub snippet: Snippet,
    #[serde(rename = "contentDetails")]
    pub content_details: Option<ContentDetails>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Snippet {
    pub title: String,
    #[serde(rename = "channelTitle")]
    pub channel_title: String,
    #[serde(rename = "publishedAt", default)]
    pub published_at: String,
    pub thumbnails: Thumbnails,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Thumbnails {
    pub default: Option<Thumbnail>,
    pub medium: Option<Thumbnail>,
}

impl Thumbnails {
    /// Best available thumbnail URL
    pub fn url(&self) -> String {
        self.default
            .as_ref()
            .or(self.medium.as_ref())
            .map(|t| t.url.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct Thumbnail {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContentDetails {
    pub duration: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorResponse {
    pub error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
}

/// Parse an ISO 8601 duration as used by the YouTube Data API
/// (e.g. `PT3M5S`, `PT1H2M`, `P1DT2H`) into seconds.
///
/// Returns `None` for strings that do not match the format. Fractional
/// components are not produced by the API and are not supported.
pub fn parse_iso8601_duration(input: &str) -> Option<f64> {
    let rest = input.strip_prefix('P')?;
    let (date_part, time_part) = match rest.split_once('T') {
        Some((d, t)) => (d, t),
        None => (rest, ""),
    };

    let mut seconds = 0.0;

    let mut parse_fields = |part: &str, units: &[(char, f64)]| -> Option<()> {
        let mut number = String::new();
        for c in part.chars() {
            if c.is_ascii_digit() {
                number.push(c);
            } else {
                let value: f64 = number.parse().ok()?;
                let scale = units.iter().find(|(u, _)| *u == c)?.1;
                seconds += value * scale;
                number.clear();
            }
        }
        // Trailing digits without a unit designator are malformed
        if number.is_empty() { Some(()) } else { None }
    };

    const DATE_UNITS: &[(char, f64)] = &[('D', 86_400.0), ('W', 604_800.0)];
    const TIME_UNITS: &[(char, f64)] = &[('H', 3_600.0), ('M', 60.0), ('S', 1.0)];

    parse_fields(date_part, DATE_UNITS)?;
    parse_fields(time_part, TIME_UNITS)?;

    Some(seconds)
}

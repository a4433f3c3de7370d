//! YouTube Data API client implementation

use std::fmt;
use std::future::Future;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use unison_protocol::Track;

use crate::error::{YoutubeError, YoutubeResult};
use crate::models::{
    parse_iso8601_duration, ApiErrorResponse, SearchListResponse, VideoListResponse,
};

/// YouTube Data API base URL
const YOUTUBE_API_URL: &str = "https://www.googleapis.com/youtube/v3";

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default connection timeout in seconds
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Maximum search results per request accepted by the API
const MAX_SEARCH_RESULTS: u32 = 50;

/// Maximum query length
const MAX_QUERY_LENGTH: usize = 256;

/// Default number of retry attempts for transient failures
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds)
const RETRY_BASE_DELAY_MS: u64 = 100;

/// YouTube Data API client
#[derive(Clone)]
pub struct YoutubeClient {
    http_client: Client,
    api_key: String,
    base_url: String,
    max_retries: u32,
}

impl fmt::Debug for YoutubeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("YoutubeClient")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl YoutubeClient {
    /// Create a new client with the given API key
    ///
    /// # Errors
    /// Returns `YoutubeError::MissingApiKey` if the API key is empty
    pub fn new(api_key: impl Into<String>) -> YoutubeResult<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(YoutubeError::MissingApiKey);
        }

        let http_client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .user_agent("Unison/1.0")
            .build()?;

        Ok(Self {
            http_client,
            api_key,
            base_url: YOUTUBE_API_URL.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    /// Create a client from the `YOUTUBE_API_KEY` environment variable
    pub fn from_env() -> YoutubeResult<Self> {
        match std::env::var("YOUTUBE_API_KEY") {
            Ok(key) if key.is_empty() => Err(YoutubeError::MissingApiKey),
            Ok(key) => Self::new(key),
            Err(std::env::VarError::NotPresent) => Err(YoutubeError::MissingApiKey),
            Err(std::env::VarError::NotUnicode(_)) => Err(YoutubeError::InvalidInput(
                "YOUTUBE_API_KEY contains invalid UTF-8".to_string(),
            )),
        }
    }

    /// Override the API base URL (for tests against a local mock)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Search for videos matching a query
    ///
    /// Channel and playlist results are skipped; only playable videos are
    /// returned. Results carry no duration (the search endpoint does not
    /// report one); use [`video_details`](Self::video_details) when it is
    /// needed.
    pub async fn search(&self, query: &str, max_results: u32) -> YoutubeResult<Vec<Track>> {
        let query = Self::validate_query(query)?;
        let max_results = max_results.clamp(1, MAX_SEARCH_RESULTS).to_string();

        let response: SearchListResponse = self
            .with_retry(|| async {
                let response = self
                    .http_client
                    .get(format!("{}/search", self.base_url))
                    .query(&[
                        ("part", "snippet"),
                        ("type", "video"),
                        ("q", query),
                        ("maxResults", max_results.as_str()),
                        ("key", self.api_key.as_str()),
                    ])
                    .send()
                    .await?;
                Self::parse_response(response).await
            })
            .await?;

        let tracks: Vec<Track> = response
            .items
            .into_iter()
            .filter_map(|item| {
                // Skip channel results: no videoId to play
                let video_id = item.id.video_id?;
                if item.id.kind == "youtube#channel" {
                    return None;
                }
                Some(Track {
                    id: video_id,
                    title: item.snippet.title,
                    thumbnail: item.snippet.thumbnails.url(),
                    channel: item.snippet.channel_title,
                    duration: None,
                    published_at: item.snippet.published_at,
                })
            })
            .collect();

        debug!(query = query, results = tracks.len(), "YouTube search completed");
        Ok(tracks)
    }

    /// Fetch full details for a single video, including its duration
    pub async fn video_details(&self, video_id: &str) -> YoutubeResult<Track> {
        let video_id = Self::validate_query(video_id)?;

        let response: VideoListResponse = self
            .with_retry(|| async {
                let response = self
                    .http_client
                    .get(format!("{}/videos", self.base_url))
                    .query(&[
                        ("part", "snippet,contentDetails"),
                        ("id", video_id),
                        ("key", self.api_key.as_str()),
                    ])
                    .send()
                    .await?;
                Self::parse_response(response).await
            })
            .await?;

        let item = response
            .items
            .into_iter()
            .next()
            .ok_or_else(|| YoutubeError::NotFound(video_id.to_string()))?;

        let duration = item
            .content_details
            .and_then(|d| d.duration)
            .and_then(|d| parse_iso8601_duration(&d));

        Ok(Track {
            id: video_id.to_string(),
            title: item.snippet.title,
            thumbnail: item.snippet.thumbnails.url(),
            channel: item.snippet.channel_title,
            duration,
            published_at: item.snippet.published_at,
        })
    }

    fn validate_query(input: &str) -> YoutubeResult<&str> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(YoutubeError::InvalidInput("query cannot be empty".to_string()));
        }
        if trimmed.len() > MAX_QUERY_LENGTH {
            return Err(YoutubeError::InvalidInput(format!(
                "query too long (max {} characters)",
                MAX_QUERY_LENGTH
            )));
        }
        Ok(trimmed)
    }

    /// Map an HTTP response to a typed result
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> YoutubeResult<T> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::FORBIDDEN {
            // The Data API reports quota exhaustion as 403
            return Err(YoutubeError::RateLimited);
        }

        let message = match response.json::<ApiErrorResponse>().await {
            Ok(body) => body.error.message,
            Err(_) => status.to_string(),
        };

        Err(YoutubeError::Api { status: status.as_u16(), message })
    }

    /// Execute an operation with retry logic for transient failures
    async fn with_retry<T, F, Fut>(&self, operation: F) -> YoutubeResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = YoutubeResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay_ms = RETRY_BASE_DELAY_MS * 2u64.pow(attempt);
                    warn!(
                        attempt = attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay_ms,
                        error = %e,
                        "YouTube request failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

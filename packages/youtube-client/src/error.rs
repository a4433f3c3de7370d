//! YouTube API error types

use thiserror::Error;

/// YouTube API client errors
#[derive(Error, Debug)]
pub enum YoutubeError {
    /// API key is missing or empty
    #[error("API key is required for YouTube Data API access")]
    MissingApiKey,

    /// Invalid input provided to an API method
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed
    #[error("Failed to parse YouTube response: {0}")]
    Parse(#[from] serde_json::Error),

    /// YouTube API returned an error status
    #[error("YouTube API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Video not found
    #[error("Video not found: {0}")]
    NotFound(String),

    /// Rate limited / quota exceeded
    #[error("Rate limited by YouTube Data API")]
    RateLimited,

    /// Request timeout
    #[error("Request to YouTube timed out")]
    Timeout,
}

impl YoutubeError {
    /// Check if this error is retryable (transient failure)
    ///
    /// Retries on timeouts, rate limiting, transport errors and 5xx
    /// responses; never on other client errors.
    pub fn is_retryable(&self) -> bool {
        match self {
            YoutubeError::Timeout | YoutubeError::RateLimited => true,
            YoutubeError::Http(e) => {
                if e.is_timeout() || e.is_connect() {
                    return true;
                }
                matches!(e.status(), Some(status) if status.is_server_error())
            }
            YoutubeError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Result type for YouTube operations
pub type YoutubeResult<T> = Result<T, YoutubeError>;

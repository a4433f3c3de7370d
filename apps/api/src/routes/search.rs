//! Catalog lookup HTTP route handlers
//!
//! Thin proxy over the YouTube Data API: resolves search queries and video
//! ids to playable track metadata. No caching, no indexing; the upstream is
//! authoritative.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use unison_protocol::Track;
use unison_youtube_client::YoutubeClient;

use crate::error::{ApiError, ApiResult};

/// Shared state for catalog handlers
#[derive(Clone)]
pub struct SearchState {
    client: Option<Arc<YoutubeClient>>,
}

impl SearchState {
    pub fn new(client: Option<YoutubeClient>) -> Self {
        Self {
            client: client.map(Arc::new),
        }
    }

    fn client(&self) -> ApiResult<&YoutubeClient> {
        self.client.as_deref().ok_or_else(|| {
            ApiError::Configuration(
                "catalog lookups require YOUTUBE_API_KEY to be set".to_string(),
            )
        })
    }
}

/// Create the catalog router (`/search`, `/videos/:id`)
pub fn search_router(state: SearchState) -> Router {
    Router::new()
        .route("/search", get(search_videos))
        .route("/videos/:id", get(video_details))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: String,
    #[serde(default = "default_limit")]
    limit: u32,
}

fn default_limit() -> u32 {
    10
}

async fn search_videos(
    State(state): State<SearchState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<Vec<Track>>> {
    if params.q.trim().is_empty() {
        return Err(ApiError::Validation("query cannot be empty".to_string()));
    }

    let tracks = state.client()?.search(&params.q, params.limit).await?;
    Ok(Json(tracks))
}

async fn video_details(
    State(state): State<SearchState>,
    Path(video_id): Path<String>,
) -> ApiResult<Json<Track>> {
    let track = state.client()?.video_details(&video_id).await?;
    Ok(Json(track))
}

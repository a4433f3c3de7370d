use axum::{extract::Extension, http::header, http::Method, routing::get, Router};
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod directory;
mod error;
mod routes;
mod sync;

pub use error::{ApiError, ApiResult, ErrorResponse};

use directory::RoomDirectory;
use routes::{health_router, rooms_router, search_router, RoomsState, SearchState};
use sync::{ws_handler, ConnectionRegistry, RoomHub};
use unison_youtube_client::YoutubeClient;

/// Build the CORS layer based on configuration
///
/// With `CORS_ORIGINS` set, only those origins are allowed; without it the
/// layer is permissive, which is acceptable for a self-hosted deployment
/// behind a reverse proxy.
fn build_cors_layer(config: &config::Config) -> CorsLayer {
    match &config.cors_allowed_origins {
        Some(origins) if !origins.is_empty() => {
            let allowed_origins: Vec<_> = origins
                .iter()
                .filter_map(|origin| {
                    origin.parse().ok().or_else(|| {
                        tracing::warn!("Invalid CORS origin '{}', skipping", origin);
                        None
                    })
                })
                .collect();

            tracing::info!(
                "CORS configured with {} allowed origin(s)",
                allowed_origins.len()
            );
            CorsLayer::new()
                .allow_origin(allowed_origins)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::ORIGIN])
        }
        _ => {
            tracing::warn!(
                "CORS_ORIGINS not set, using permissive CORS. \
                 Set CORS_ORIGINS to restrict cross-origin access."
            );
            CorsLayer::permissive()
        }
    }
}

/// Periodically drop connections whose heartbeats stopped
fn spawn_connection_reaper(
    registry: ConnectionRegistry,
    directory: RoomDirectory,
    config: &config::Config,
) {
    let interval = config.heartbeat_interval;
    let idle_timeout_ms = config.connection_idle_timeout().as_millis() as i64;

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let reaped = registry.reap_stale(idle_timeout_ms);
            if !reaped.is_empty() {
                tracing::info!(count = reaped.len(), "Reaped dead connections");
                for room_id in reaped {
                    directory.adjust_participants(room_id, -1);
                }
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "unison_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = config::Config::from_env()?;

    tracing::info!("Starting Unison API server on port {}", config.port);

    // Core state: registry of connections, hub of room coordinators,
    // directory of rooms
    let registry = ConnectionRegistry::new();
    let hub = RoomHub::new(registry.clone(), config.sync.clone());
    let directory = RoomDirectory::new();

    // Catalog client is optional; without it the sync engine still works
    let youtube_client = match &config.youtube_api_key {
        Some(key) => match YoutubeClient::new(key.clone()) {
            Ok(client) => {
                tracing::info!("Catalog lookups enabled");
                Some(client)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Catalog client unavailable");
                None
            }
        },
        None => {
            tracing::warn!("YOUTUBE_API_KEY not set, catalog lookups disabled");
            None
        }
    };

    spawn_connection_reaper(registry.clone(), directory.clone(), &config);

    let cors_layer = build_cors_layer(&config);

    // Build the router
    let app = Router::new()
        .route("/", get(root))
        .route("/ws", get(ws_handler))
        .nest("/health", health_router())
        .nest(
            "/rooms",
            rooms_router(RoomsState::new(directory.clone(), hub.clone())),
        )
        .merge(search_router(SearchState::new(youtube_client)))
        .layer(Extension(hub))
        .layer(Extension(directory))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn root() -> &'static str {
    "Unison - listen together, in lock-step"
}

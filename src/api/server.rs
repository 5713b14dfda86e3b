//! HTTP control server
//!
//! Builds the axum router for the control surface and runs it with graceful
//! shutdown. Handlers receive everything they need through [`AppContext`];
//! there is no global state.

use crate::api::handlers;
use crate::capture::CaptureSession;
use crate::error::{Error, Result};
use crate::playback::PlaybackController;
use axum::routing::get;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tracing::info;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppContext {
    pub player: Arc<PlaybackController>,
    pub capture: Arc<CaptureSession>,
    pub media_root: PathBuf,
    pub started_at: Instant,
}

impl AppContext {
    pub fn new(
        player: Arc<PlaybackController>,
        capture: Arc<CaptureSession>,
        media_root: PathBuf,
    ) -> Self {
        Self {
            player,
            capture,
            media_root,
            started_at: Instant::now(),
        }
    }
}

/// Build the control router.
pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/music/play", get(handlers::music_play))
        .route("/api/music/stop", get(handlers::music_stop))
        .route("/api/music/volume", get(handlers::music_volume))
        .route("/api/music/status", get(handlers::music_status))
        .route("/api/system/info", get(handlers::system_info))
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

/// Bind and serve the control API until `shutdown` resolves.
pub async fn run(
    addr: SocketAddr,
    ctx: AppContext,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = router(ctx);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("cannot bind {}: {}", addr, e)))?;
    info!("control API on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("server error: {}", e)))?;

    Ok(())
}

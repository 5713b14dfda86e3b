//! Control API handlers
//!
//! Query-parameter GET endpoints. Success replies are JSON; parameter and
//! lookup failures reply with a plain-text body and the matching status code.

use crate::api::server::AppContext;
use crate::error::Error;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;

#[derive(Deserialize)]
pub struct PlayParams {
    file: Option<String>,
}

#[derive(Deserialize)]
pub struct VolumeParams {
    value: Option<String>,
}

fn bad_request(msg: &str) -> Response {
    (StatusCode::BAD_REQUEST, msg.to_string()).into_response()
}

/// GET /health
pub async fn health(State(ctx): State<AppContext>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "uptime_seconds": ctx.started_at.elapsed().as_secs(),
    }))
}

/// GET /api/music/play?file=<path>
///
/// Relative paths resolve against the configured media root.
pub async fn music_play(
    State(ctx): State<AppContext>,
    Query(params): Query<PlayParams>,
) -> Response {
    let Some(file) = params.file else {
        return bad_request("Missing file parameter");
    };
    if file.is_empty() {
        return bad_request("Missing file parameter");
    }

    let path = PathBuf::from(&file);
    let path = if path.is_absolute() {
        path
    } else {
        ctx.media_root.join(path)
    };

    match ctx.player.play(path).await {
        Ok(()) => Json(json!({"status": "playing", "file": file})).into_response(),
        Err(Error::AlreadyRunning(_)) => (
            StatusCode::CONFLICT,
            "Playback is already running".to_string(),
        )
            .into_response(),
        Err(Error::NotFound(path)) => (
            StatusCode::NOT_FOUND,
            format!("File not found: {}", path.display()),
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// GET /api/music/stop
pub async fn music_stop(State(ctx): State<AppContext>) -> Json<serde_json::Value> {
    ctx.player.stop().await;
    Json(json!({"status": "stopped"}))
}

/// GET /api/music/volume?value=<0-100>
///
/// Values above 100 clamp; the reply echoes the effective volume.
pub async fn music_volume(
    State(ctx): State<AppContext>,
    Query(params): Query<VolumeParams>,
) -> Response {
    let Some(value) = params.value else {
        return bad_request("Missing value parameter");
    };

    let requested: u8 = match value.parse::<u64>() {
        Ok(v) => v.min(u8::MAX as u64) as u8,
        Err(_) => return bad_request("Invalid value parameter"),
    };

    let effective = ctx.player.set_volume(requested);
    Json(json!({"status": "volume_set", "volume": effective})).into_response()
}

/// GET /api/music/status
pub async fn music_status(State(ctx): State<AppContext>) -> Json<serde_json::Value> {
    let file = ctx
        .player
        .current_file()
        .map(|p| p.display().to_string());

    Json(json!({
        "state": ctx.player.state().as_str(),
        "volume": ctx.player.volume(),
        "file": file,
    }))
}

/// GET /api/system/info
pub async fn system_info(State(ctx): State<AppContext>) -> Json<serde_json::Value> {
    let format = ctx.capture.format();
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": ctx.started_at.elapsed().as_secs(),
        "player_state": ctx.player.state().as_str(),
        "capture_active": ctx.capture.is_active().await,
        "capture": {
            "width": format.width,
            "height": format.height,
            "fps": format.fps,
        },
    }))
}

//! mediad - embedded media session daemon
//!
//! Serves an HTTP control surface for audio playback and fans captured video
//! out to stream clients on a dedicated port.

use clap::Parser;
use mediad::api::{self, AppContext};
use mediad::capture::{CaptureFormat, CaptureSession, PatternSource};
use mediad::config::Config;
use mediad::playback::{CpalEngineFactory, PlaybackController};
use mediad::stream;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "mediad", version, about = "Embedded media session daemon")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "MEDIAD_CONFIG")]
    config: Option<PathBuf>,

    /// Control API port (overrides config)
    #[arg(short, long, env = "MEDIAD_PORT")]
    port: Option<u16>,

    /// Video stream port (overrides config)
    #[arg(long, env = "MEDIAD_STREAM_PORT")]
    stream_port: Option<u16>,

    /// Media root folder (overrides config)
    #[arg(long, env = "MEDIAD_MEDIA_ROOT")]
    media_root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(stream_port) = args.stream_port {
        config.stream_port = stream_port;
    }
    if let Some(media_root) = args.media_root {
        config.media_root = media_root;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("mediad={},tower_http=info", config.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("mediad {} starting", env!("CARGO_PKG_VERSION"));

    let factory = Arc::new(CpalEngineFactory::new(config.audio.device.clone()));
    let player = Arc::new(PlaybackController::new(factory, config.audio.volume));
    player.set_observer(Arc::new(|state, file| match file {
        Some(file) => info!("player is {} ({})", state.as_str(), file.display()),
        None => info!("player is {}", state.as_str()),
    }));

    let capture = Arc::new(CaptureSession::new(
        CaptureFormat {
            width: config.video.width,
            height: config.video.height,
            fps: config.video.fps,
        },
        config.video.pool_frames,
        Box::new(|| Box::new(PatternSource::new())),
    ));

    // A capture failure degrades streaming to 503 but the daemon still runs.
    if let Err(e) = capture.init().await {
        error!("video capture unavailable: {}", e);
    }

    let stream_addr = SocketAddr::from(([0, 0, 0, 0], config.stream_port));
    let stream_listener = tokio::net::TcpListener::bind(stream_addr).await?;
    let stream_task = tokio::spawn(stream::listener::run(
        stream_listener,
        Arc::clone(&capture),
    ));

    let ctx = AppContext::new(
        Arc::clone(&player),
        Arc::clone(&capture),
        config.media_root.clone(),
    );
    let api_addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    api::server::run(api_addr, ctx, shutdown_signal()).await?;

    info!("shutting down");
    stream_task.abort();
    player.stop().await;
    capture.cleanup().await;
    info!("goodbye");

    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("cannot install Ctrl-C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("cannot install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl-C"),
        _ = terminate => info!("received SIGTERM"),
    }
}

//! Capture session lifecycle
//!
//! Owns the video source, the frame sink, and the pump thread that moves
//! frames between them. `init` and `cleanup` serialize on one lock so the
//! session is either fully active (source running, pump alive, sink open) or
//! fully inactive; a failure partway through `init` rolls the source back
//! before returning.

use crate::capture::sink::{FrameCursor, FrameSink};
use crate::capture::source::{CaptureFormat, VideoSource};
use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Everything that exists only while capture is running.
struct ActiveCapture {
    sink: Arc<FrameSink>,
    stop: Arc<AtomicBool>,
    pump: Option<std::thread::JoinHandle<()>>,
}

type SourceFactory = Box<dyn Fn() -> Box<dyn VideoSource> + Send + Sync>;

/// Video capture session: at most one active capture at a time, fanned out
/// to any number of stream readers through [`FrameCursor`]s.
pub struct CaptureSession {
    active: Mutex<Option<ActiveCapture>>,
    format: CaptureFormat,
    pool_frames: usize,
    make_source: SourceFactory,
}

impl CaptureSession {
    pub fn new(
        format: CaptureFormat,
        pool_frames: usize,
        make_source: SourceFactory,
    ) -> Self {
        Self {
            active: Mutex::new(None),
            format,
            pool_frames,
            make_source,
        }
    }

    /// Bring capture up: open and start the source, then spawn the pump.
    ///
    /// Fails with `AlreadyRunning` when capture is active. A source that
    /// opens but fails to start is closed before the error is returned.
    pub async fn init(&self) -> Result<()> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            return Err(Error::AlreadyRunning("capture"));
        }

        let mut source = (self.make_source)();
        source.open(self.format)?;
        if let Err(e) = source.start() {
            source.close();
            return Err(e);
        }

        let sink = FrameSink::new(self.pool_frames);
        let stop = Arc::new(AtomicBool::new(false));

        let pump_sink = Arc::clone(&sink);
        let pump_stop = Arc::clone(&stop);
        let pump = std::thread::Builder::new()
            .name("capture_pump".into())
            .spawn(move || pump_loop(source, pump_sink, pump_stop))
            .map_err(|e| Error::Capture(format!("cannot spawn pump thread: {}", e)))?;

        info!(
            "capture started: {}x{} @ {} fps, pool depth {}",
            self.format.width, self.format.height, self.format.fps, self.pool_frames
        );

        *active = Some(ActiveCapture {
            sink,
            stop,
            pump: Some(pump),
        });
        Ok(())
    }

    /// Tear capture down: stop the pump, join it, close the sink. Readers
    /// blocked on a cursor observe the close. No-op when already inactive.
    pub async fn cleanup(&self) {
        let Some(mut capture) = self.active.lock().await.take() else {
            return;
        };

        capture.stop.store(true, Ordering::SeqCst);
        if let Some(pump) = capture.pump.take() {
            // The pump blocks in read_frame; join it off the async runtime.
            let joined = tokio::task::spawn_blocking(move || pump.join()).await;
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(_)) => error!("capture pump panicked"),
                Err(e) => error!("failed to join capture pump: {}", e),
            }
        }
        capture.sink.close();
        info!("capture stopped");
    }

    pub async fn is_active(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// New reader into the active capture's frame stream.
    pub async fn cursor(&self) -> Result<FrameCursor> {
        let active = self.active.lock().await;
        match active.as_ref() {
            Some(capture) => Ok(capture.sink.cursor()),
            None => Err(Error::SessionClosed),
        }
    }

    pub fn format(&self) -> CaptureFormat {
        self.format
    }
}

/// Move frames from the source into the sink until stopped or the source
/// fails. Owns the source; tears it down on exit.
fn pump_loop(mut source: Box<dyn VideoSource>, sink: Arc<FrameSink>, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::SeqCst) {
        match source.read_frame() {
            Ok(data) => {
                if sink.push(data).is_none() {
                    break;
                }
            }
            Err(e) => {
                if !stop.load(Ordering::SeqCst) {
                    warn!("capture source failed: {}", e);
                }
                break;
            }
        }
    }
    source.stop();
    source.close();
    sink.close();
}

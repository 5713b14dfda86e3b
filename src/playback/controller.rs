//! Playback controller
//!
//! Owns the audio playback state machine and the single worker task that
//! drives the decode pipeline. The worker builds, configures, and runs a
//! fresh pipeline for each `play()`, then blocks in a bounded-tick poll wait
//! until stopped externally or the pipeline reports completion. The pipeline
//! instance is owned by the worker task for its whole life and destroyed
//! exactly once at loop exit.

use crate::error::{Error, Result};
use crate::playback::pipeline::EngineFactory;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, error, info, warn};

/// Playback states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PlayerState {
    Idle = 0,
    Playing = 1,
    Stopped = 2,
    Error = 3,
}

impl PlayerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerState::Idle => "idle",
            PlayerState::Playing => "playing",
            PlayerState::Stopped => "stopped",
            PlayerState::Error => "error",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => PlayerState::Playing,
            2 => PlayerState::Stopped,
            3 => PlayerState::Error,
            _ => PlayerState::Idle,
        }
    }
}

/// Observer invoked synchronously on every state transition, on whichever
/// thread performed the transition. Implementations must not block.
pub type StateObserver = Arc<dyn Fn(PlayerState, Option<&Path>) + Send + Sync>;

/// Tick between state polls inside the worker's wait loop.
const POLL_TICK: Duration = Duration::from_millis(100);

/// Bound on the cooperative join in `stop()` before the worker is cancelled.
const STOP_DEADLINE: Duration = Duration::from_secs(1);

/// State shared between the controller and its worker task.
struct PlayerShared {
    /// Current state; read lock-free as a snapshot by `state()`.
    state: AtomicU8,

    /// File the current (or last) playback was bound to.
    current_file: Mutex<Option<PathBuf>>,

    /// Transition observer.
    observer: Mutex<Option<StateObserver>>,

    /// Master volume, 0.0-1.0, shared with the pipeline's output stage.
    volume: Arc<Mutex<f32>>,
}

impl PlayerShared {
    fn state(&self) -> PlayerState {
        PlayerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Transition to `next`, notifying the observer on an actual change.
    fn set_state(&self, next: PlayerState) {
        let prev = self.state.swap(next as u8, Ordering::SeqCst);
        if prev == next as u8 {
            return;
        }
        debug!(
            "playback state: {} -> {}",
            PlayerState::from_u8(prev).as_str(),
            next.as_str()
        );

        // Clone the observer out of the lock so a slow callback cannot stall
        // a concurrent set_observer.
        let observer = self.observer.lock().unwrap().clone();
        if let Some(callback) = observer {
            let file = self.current_file.lock().unwrap().clone();
            callback(next, file.as_deref());
        }
    }
}

/// Audio playback controller.
///
/// At most one pipeline and one worker exist at a time; `state()` is
/// `Playing` exactly while a pipeline is running with a worker attached.
pub struct PlaybackController {
    shared: Arc<PlayerShared>,
    factory: Arc<dyn EngineFactory>,

    /// Slot for the single active worker. Serializes `play()` and `stop()`
    /// against each other so a second worker can never be spawned while one
    /// is still winding down.
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl PlaybackController {
    /// Create a controller in `Idle` with the given startup volume (percent).
    pub fn new(factory: Arc<dyn EngineFactory>, volume_percent: u8) -> Self {
        Self {
            shared: Arc::new(PlayerShared {
                state: AtomicU8::new(PlayerState::Idle as u8),
                current_file: Mutex::new(None),
                observer: Mutex::new(None),
                volume: Arc::new(Mutex::new(volume_percent.min(100) as f32 / 100.0)),
            }),
            factory,
            worker: tokio::sync::Mutex::new(None),
        }
    }

    /// Register the transition observer, replacing any previous one.
    pub fn set_observer(&self, observer: StateObserver) {
        *self.shared.observer.lock().unwrap() = Some(observer);
    }

    /// Current state snapshot. May change immediately after returning.
    pub fn state(&self) -> PlayerState {
        self.shared.state()
    }

    /// File bound to the current or most recent playback.
    pub fn current_file(&self) -> Option<PathBuf> {
        self.shared.current_file.lock().unwrap().clone()
    }

    /// Start playing `file` on a fresh pipeline.
    ///
    /// Returns immediately after spawning the worker; pipeline bring-up is
    /// asynchronous and failures surface as a transition to `Error`. Fails
    /// up front with `AlreadyRunning` while a playback is active, and with
    /// `NotFound` (transitioning to `Error`) when the file cannot be opened.
    pub async fn play(&self, file: PathBuf) -> Result<()> {
        let mut slot = self.worker.lock().await;

        if self.state() == PlayerState::Playing {
            warn!("play requested while already playing, ignoring");
            return Err(Error::AlreadyRunning("playback"));
        }

        // Reap a worker that already ran to completion; refuse if one is
        // still winding down (stop() not yet called or still in flight).
        if let Some(handle) = slot.take() {
            if handle.is_finished() {
                let _ = handle.await;
            } else {
                warn!("play requested while previous worker is still exiting");
                *slot = Some(handle);
                return Err(Error::AlreadyRunning("playback"));
            }
        }

        if let Err(e) = std::fs::File::open(&file) {
            error!("cannot open {}: {}", file.display(), e);
            *self.shared.current_file.lock().unwrap() = Some(file.clone());
            self.shared.set_state(PlayerState::Error);
            return Err(Error::NotFound(file));
        }

        info!("starting playback of {}", file.display());
        *self.shared.current_file.lock().unwrap() = Some(file.clone());

        let shared = Arc::clone(&self.shared);
        let factory = Arc::clone(&self.factory);
        *slot = Some(tokio::spawn(playback_worker(shared, factory, file)));

        Ok(())
    }

    /// Stop playback and wait for the worker to exit.
    ///
    /// Cooperative: flips the state flag the worker polls, then joins it. If
    /// the join exceeds its bound the worker is cancelled and the join is
    /// awaited again, so the worker is provably finished (and its pipeline
    /// torn down) before this returns. Idempotent; always leaves `Stopped`.
    pub async fn stop(&self) {
        let mut slot = self.worker.lock().await;

        if self.state() == PlayerState::Playing {
            info!("stopping playback");
            self.shared.set_state(PlayerState::Stopped);
        }

        if let Some(mut handle) = slot.take() {
            match timeout(STOP_DEADLINE, &mut handle).await {
                Ok(join) => {
                    if let Err(e) = join {
                        error!("playback worker panicked: {}", e);
                    }
                }
                Err(_) => {
                    warn!("{}", Error::ShutdownTimeout("playback worker"));
                    handle.abort();
                    if let Err(e) = handle.await {
                        if !e.is_cancelled() {
                            error!("playback worker failed during cancel: {}", e);
                        }
                    }
                }
            }
        }

        self.shared.set_state(PlayerState::Stopped);
    }

    /// Set the master volume, clamped to 0-100. Applies immediately to a
    /// running pipeline; no state transition. Returns the effective volume.
    pub fn set_volume(&self, percent: u8) -> u8 {
        let clamped = percent.min(100);
        *self.shared.volume.lock().unwrap() = clamped as f32 / 100.0;
        debug!("volume set to {}%", clamped);
        clamped
    }

    /// Current volume, percent.
    pub fn volume(&self) -> u8 {
        (*self.shared.volume.lock().unwrap() * 100.0).round() as u8
    }
}

/// Worker task: builds and runs one pipeline, then tears it down.
async fn playback_worker(
    shared: Arc<PlayerShared>,
    factory: Arc<dyn EngineFactory>,
    file: PathBuf,
) {
    let mut pipeline = match factory.create(Arc::clone(&shared.volume)) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("failed to build pipeline: {}", e);
            shared.set_state(PlayerState::Error);
            return;
        }
    };

    if let Err(e) = pipeline.configure(&file) {
        error!("failed to configure pipeline for {}: {}", file.display(), e);
        shared.set_state(PlayerState::Error);
        return; // dropping the pipeline releases anything partially built
    }

    shared.set_state(PlayerState::Playing);

    if let Err(e) = pipeline.start() {
        error!("failed to run pipeline: {}", e);
        shared.set_state(PlayerState::Error);
        return;
    }

    // Wait until stopped externally or the pipeline completes.
    while shared.state() == PlayerState::Playing {
        if pipeline.is_finished() {
            debug!("pipeline reported completion");
            break;
        }
        sleep(POLL_TICK).await;
    }

    pipeline.stop();
    drop(pipeline);

    if shared.state() != PlayerState::Error {
        shared.set_state(PlayerState::Stopped);
    }
    info!("playback worker exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::pipeline::AudioPipeline;
    use crate::playback::SourceFormat;
    use std::io::Write;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    struct MockPipeline {
        fail_configure: bool,
        finished: Arc<AtomicBool>,
    }

    impl AudioPipeline for MockPipeline {
        fn configure(&mut self, file: &Path) -> Result<()> {
            if self.fail_configure {
                return Err(Error::EngineConfig("forced failure".into()));
            }
            SourceFormat::from_path(file)
                .ok_or_else(|| Error::EngineConfig(format!("unrecognized: {}", file.display())))?;
            Ok(())
        }

        fn start(&mut self) -> Result<()> {
            Ok(())
        }

        fn is_finished(&self) -> bool {
            self.finished.load(Ordering::SeqCst)
        }

        fn stop(&mut self) {}
    }

    struct MockFactory {
        fail_build: bool,
        fail_configure: bool,
        finished: Arc<AtomicBool>,
        created: AtomicUsize,
    }

    impl MockFactory {
        fn ok() -> Self {
            Self {
                fail_build: false,
                fail_configure: false,
                finished: Arc::new(AtomicBool::new(false)),
                created: AtomicUsize::new(0),
            }
        }
    }

    impl EngineFactory for MockFactory {
        fn create(&self, _volume: Arc<Mutex<f32>>) -> Result<Box<dyn AudioPipeline>> {
            if self.fail_build {
                return Err(Error::EngineBuild("forced failure".into()));
            }
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MockPipeline {
                fail_configure: self.fail_configure,
                finished: Arc::clone(&self.finished),
            }))
        }
    }

    fn audio_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".mp3").tempfile().unwrap();
        file.write_all(b"not real audio").unwrap();
        file
    }

    async fn wait_for_state(controller: &PlaybackController, state: PlayerState) {
        for _ in 0..50 {
            if controller.state() == state {
                return;
            }
            sleep(Duration::from_millis(20)).await;
        }
        panic!(
            "timed out waiting for {:?}, still {:?}",
            state,
            controller.state()
        );
    }

    #[tokio::test]
    async fn play_missing_file_transitions_to_error() {
        let factory = Arc::new(MockFactory::ok());
        let controller = PlaybackController::new(Arc::clone(&factory) as _, 50);

        let result = controller.play(PathBuf::from("/nonexistent/missing.mp3")).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(controller.state(), PlayerState::Error);

        // No pipeline was ever built.
        assert_eq!(factory.created.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn play_while_playing_is_rejected_without_a_second_worker() {
        let factory = Arc::new(MockFactory::ok());
        let controller = PlaybackController::new(Arc::clone(&factory) as _, 50);
        let file = audio_file();

        controller.play(file.path().to_path_buf()).await.unwrap();
        wait_for_state(&controller, PlayerState::Playing).await;

        let result = controller.play(file.path().to_path_buf()).await;
        assert!(matches!(result, Err(Error::AlreadyRunning(_))));
        assert_eq!(controller.state(), PlayerState::Playing);
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);

        controller.stop().await;
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let factory = Arc::new(MockFactory::ok());
        let controller = PlaybackController::new(factory as _, 50);
        let file = audio_file();

        controller.play(file.path().to_path_buf()).await.unwrap();
        wait_for_state(&controller, PlayerState::Playing).await;

        controller.stop().await;
        assert_eq!(controller.state(), PlayerState::Stopped);

        controller.stop().await;
        assert_eq!(controller.state(), PlayerState::Stopped);
    }

    #[tokio::test]
    async fn stop_without_play_leaves_stopped() {
        let factory = Arc::new(MockFactory::ok());
        let controller = PlaybackController::new(factory as _, 50);

        controller.stop().await;
        assert_eq!(controller.state(), PlayerState::Stopped);
    }

    #[tokio::test]
    async fn volume_clamps() {
        let factory = Arc::new(MockFactory::ok());
        let controller = PlaybackController::new(factory as _, 50);

        assert_eq!(controller.set_volume(150), 100);
        assert_eq!(controller.volume(), 100);

        assert_eq!(controller.set_volume(0), 0);
        assert_eq!(controller.volume(), 0);
    }

    #[tokio::test]
    async fn pipeline_completion_transitions_to_stopped() {
        let factory = Arc::new(MockFactory::ok());
        let controller = PlaybackController::new(Arc::clone(&factory) as _, 50);
        let file = audio_file();

        controller.play(file.path().to_path_buf()).await.unwrap();
        wait_for_state(&controller, PlayerState::Playing).await;

        factory.finished.store(true, Ordering::SeqCst);
        wait_for_state(&controller, PlayerState::Stopped).await;
    }

    #[tokio::test]
    async fn build_failure_transitions_to_error() {
        let factory = Arc::new(MockFactory {
            fail_build: true,
            ..MockFactory::ok()
        });
        let controller = PlaybackController::new(factory as _, 50);
        let file = audio_file();

        controller.play(file.path().to_path_buf()).await.unwrap();
        wait_for_state(&controller, PlayerState::Error).await;
    }

    #[tokio::test]
    async fn configure_failure_transitions_to_error() {
        let factory = Arc::new(MockFactory {
            fail_configure: true,
            ..MockFactory::ok()
        });
        let controller = PlaybackController::new(factory as _, 50);
        let file = audio_file();

        controller.play(file.path().to_path_buf()).await.unwrap();
        wait_for_state(&controller, PlayerState::Error).await;
    }

    #[tokio::test]
    async fn error_state_recovers_on_next_play() {
        let factory = Arc::new(MockFactory::ok());
        let controller = PlaybackController::new(factory as _, 50);

        let result = controller.play(PathBuf::from("/sdcard/missing.mp3")).await;
        assert!(result.is_err());
        assert_eq!(controller.state(), PlayerState::Error);

        let file = audio_file();
        controller.play(file.path().to_path_buf()).await.unwrap();
        wait_for_state(&controller, PlayerState::Playing).await;

        controller.stop().await;
    }

    #[tokio::test]
    async fn observer_sees_transitions_with_file() {
        let factory = Arc::new(MockFactory::ok());
        let controller = PlaybackController::new(factory as _, 50);

        let seen: Arc<Mutex<Vec<(PlayerState, Option<PathBuf>)>>> =
            Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        controller.set_observer(Arc::new(move |state, file| {
            sink.lock()
                .unwrap()
                .push((state, file.map(Path::to_path_buf)));
        }));

        let file = audio_file();
        controller.play(file.path().to_path_buf()).await.unwrap();
        wait_for_state(&controller, PlayerState::Playing).await;
        controller.stop().await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].0, PlayerState::Playing);
        assert_eq!(seen[0].1.as_deref(), Some(file.path()));
        assert!(seen.iter().any(|(s, _)| *s == PlayerState::Stopped));
    }
}

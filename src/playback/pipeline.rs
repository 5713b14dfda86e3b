//! Pipeline engine control interface
//!
//! The decode engine is opaque to the controller: it is built fresh for each
//! playback, bound to a source file, run until stopped or complete, and
//! destroyed by dropping it. These traits are the whole surface the playback
//! worker drives; the shipped implementation lives in [`crate::playback::engine`].

use crate::error::Result;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Container/codec family inferred from a file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Mp3,
    Wav,
    Aac,
}

impl SourceFormat {
    /// Infer the format from a path's extension. Returns `None` for
    /// unrecognized extensions (a configuration failure for the pipeline).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "mp3" => Some(Self::Mp3),
            "wav" => Some(Self::Wav),
            "aac" => Some(Self::Aac),
            _ => None,
        }
    }

    /// Extension string used as a probe hint.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::Aac => "aac",
        }
    }
}

/// One decode-and-render chain for a single audio file.
///
/// Lifecycle: `configure` → `start` → poll `is_finished` → `stop`. Dropping a
/// pipeline releases everything it built, so a partially configured instance
/// can be abandoned safely after a failure.
pub trait AudioPipeline: Send {
    /// Bind the pipeline to a source file. Fails with an engine-config error
    /// on unrecognized containers or unreadable streams.
    fn configure(&mut self, file: &Path) -> Result<()>;

    /// Start rendering to the output device. Returns once the engine is
    /// running; rendering continues on the engine's own thread.
    fn start(&mut self) -> Result<()>;

    /// True once the engine has rendered the whole source.
    fn is_finished(&self) -> bool;

    /// Stop rendering and release engine resources. Idempotent.
    fn stop(&mut self);
}

/// Builds fresh pipeline instances bound to the audio output device.
pub trait EngineFactory: Send + Sync {
    /// Build a new pipeline. `volume` is the shared master volume (0.0-1.0)
    /// applied by the output stage; changes take effect immediately.
    fn create(&self, volume: Arc<Mutex<f32>>) -> Result<Box<dyn AudioPipeline>>;
}

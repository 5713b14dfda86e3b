//! Video frame sources
//!
//! A [`VideoSource`] produces encoded frames for the capture pump. The
//! shipped [`PatternSource`] synthesizes frames at the configured rate; real
//! hardware plugs in behind the same trait.

use crate::error::{Error, Result};
use bytes::Bytes;
use std::time::{Duration, Instant};
use tracing::debug;

/// Capture geometry and rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFormat {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/// A device producing encoded video frames.
///
/// Lifecycle: `open` → `start` → `read_frame` repeatedly → `stop` → `close`.
/// `read_frame` is called from a dedicated pump thread and may block until
/// the next frame is due.
pub trait VideoSource: Send {
    /// Acquire the device and bind the capture format.
    fn open(&mut self, format: CaptureFormat) -> Result<()>;

    /// Begin producing frames.
    fn start(&mut self) -> Result<()>;

    /// Block until the next frame is available and return it encoded.
    fn read_frame(&mut self) -> Result<Bytes>;

    /// Stop producing frames. Idempotent.
    fn stop(&mut self);

    /// Release the device. Idempotent.
    fn close(&mut self);
}

/// Synthetic source emitting counter-stamped frames at the configured rate.
pub struct PatternSource {
    format: Option<CaptureFormat>,
    running: bool,
    counter: u64,
    next_due: Option<Instant>,
}

impl PatternSource {
    pub fn new() -> Self {
        Self {
            format: None,
            running: false,
            counter: 0,
            next_due: None,
        }
    }
}

impl Default for PatternSource {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoSource for PatternSource {
    fn open(&mut self, format: CaptureFormat) -> Result<()> {
        if format.fps == 0 {
            return Err(Error::Capture("fps must be nonzero".into()));
        }
        debug!(
            "pattern source opened: {}x{} @ {} fps",
            format.width, format.height, format.fps
        );
        self.format = Some(format);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        if self.format.is_none() {
            return Err(Error::Capture("start before open".into()));
        }
        self.running = true;
        self.next_due = Some(Instant::now());
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Bytes> {
        if !self.running {
            return Err(Error::Capture("source is not running".into()));
        }
        let format = self.format.expect("running implies open");
        let interval = Duration::from_secs(1) / format.fps;

        let due = self.next_due.expect("running implies scheduled");
        let now = Instant::now();
        if due > now {
            std::thread::sleep(due - now);
        }
        self.next_due = Some(due + interval);

        self.counter += 1;
        let payload = format!(
            "frame {:08} {}x{}",
            self.counter, format.width, format.height
        );
        Ok(Bytes::from(payload))
    }

    fn stop(&mut self) {
        self.running = false;
        self.next_due = None;
    }

    fn close(&mut self) {
        self.stop();
        self.format = None;
        self.counter = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORMAT: CaptureFormat = CaptureFormat {
        width: 640,
        height: 480,
        fps: 100,
    };

    #[test]
    fn lifecycle_order_is_enforced() {
        let mut source = PatternSource::new();
        assert!(source.start().is_err());

        source.open(FORMAT).unwrap();
        assert!(source.read_frame().is_err());

        source.start().unwrap();
        assert!(source.read_frame().is_ok());

        source.stop();
        assert!(source.read_frame().is_err());
        source.close();
    }

    #[test]
    fn frames_carry_increasing_counters() {
        let mut source = PatternSource::new();
        source.open(FORMAT).unwrap();
        source.start().unwrap();

        let a = source.read_frame().unwrap();
        let b = source.read_frame().unwrap();
        assert!(a.starts_with(b"frame 00000001"));
        assert!(b.starts_with(b"frame 00000002"));
    }

    #[test]
    fn zero_fps_is_rejected() {
        let mut source = PatternSource::new();
        let result = source.open(CaptureFormat {
            fps: 0,
            ..FORMAT
        });
        assert!(result.is_err());
    }
}

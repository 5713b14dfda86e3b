//! Video capture: device source, encoded-frame sink, and session lifecycle

pub mod session;
pub mod sink;
pub mod source;

pub use session::CaptureSession;
pub use sink::{Acquired, EncodedFrame, FrameCursor, FrameSink};
pub use source::{CaptureFormat, PatternSource, VideoSource};

//! Video streaming: chunked-HTTP workers and the dedicated stream listener

pub mod listener;
pub mod worker;

pub use worker::{StreamMode, StreamWorker};

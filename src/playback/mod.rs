//! Audio playback: state machine, worker task, and decode pipeline

pub mod controller;
pub mod engine;
pub mod pipeline;

pub use controller::{PlaybackController, PlayerState, StateObserver};
pub use engine::CpalEngineFactory;
pub use pipeline::{AudioPipeline, EngineFactory, SourceFormat};

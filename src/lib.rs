//! # mediad - on-device media session daemon
//!
//! Plays local audio files on the board's output device while serving the
//! hardware video capture as a chunked network stream, controlled over a
//! small HTTP API.
//!
//! **Architecture:** tokio worker tasks around two independently owned
//! hardware sessions (one decode pipeline, one capture device), with an axum
//! control surface and a dedicated raw-socket stream listener.

pub mod api;
pub mod capture;
pub mod config;
pub mod error;
pub mod playback;
pub mod stream;

pub use error::{Error, Result};

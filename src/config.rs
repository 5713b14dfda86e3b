//! Configuration for mediad
//!
//! Minimal TOML bootstrap configuration: listen ports, media root, audio
//! output defaults, capture geometry. These settings cannot change during
//! runtime; the daemon must restart to pick up changes.
//!
//! All fields have built-in defaults so the daemon runs with no file at all.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Bootstrap configuration loaded from a TOML file
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP control surface port
    pub port: u16,

    /// Dedicated video stream listener port
    pub stream_port: u16,

    /// Root folder for audio files; relative play paths resolve against it
    pub media_root: PathBuf,

    /// Audio output defaults
    pub audio: AudioConfig,

    /// Video capture geometry
    pub video: VideoConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Audio output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device name (None = system default)
    pub device: Option<String>,

    /// Startup volume, percent 0-100
    pub volume: u8,
}

/// Video capture configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,

    /// Encoded-frame pool depth shared by all stream clients
    pub pool_frames: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            stream_port: 8081,
            media_root: PathBuf::from("/sdcard"),
            audio: AudioConfig::default(),
            video: VideoConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            volume: 50,
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 15,
            pool_frames: 8,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, or built-in defaults when no
    /// path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {}", path.display(), e))
        })?;

        toml::from_str(&text)
            .map_err(|e| Error::Config(format!("cannot parse {}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = Config::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.stream_port, 8081);
        assert_eq!(config.audio.volume, 50);
        assert_eq!(config.video.pool_frames, 8);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            port = 9000

            [video]
            fps = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.stream_port, 8081);
        assert_eq!(config.video.fps, 30);
        assert_eq!(config.video.width, 640);
    }

    #[test]
    fn load_missing_file_is_an_error() {
        let result = Config::load(Some(Path::new("/nonexistent/mediad.toml")));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn load_without_path_uses_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.port, 8080);
    }
}

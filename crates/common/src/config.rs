//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ScreentapError, ScreentapResult};

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Default capture settings.
    pub capture: CaptureDefaults,

    /// Permission handling.
    pub permission: PermissionConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Which native capture backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Pick the best backend available on this platform.
    #[default]
    Auto,
    /// Generated test pattern, always available.
    Synthetic,
    /// GStreamer `ximagesrc` capture (Linux, X11).
    Gstreamer,
    /// CoreGraphics display polling (macOS).
    Coregraphics,
}

/// Default capture parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureDefaults {
    /// Maximum output width; 0 keeps the native resolution.
    pub max_width: u32,

    /// Maximum output height; 0 keeps the native resolution.
    pub max_height: u32,

    /// Frames buffered between the producer and the callback before
    /// new frames are dropped.
    pub queue_depth: usize,

    /// Backend selection.
    pub backend: BackendKind,

    /// Frame rate for backends that pace themselves (synthetic, polling).
    pub fps: u32,

    /// How long a snapshot waits for its first frame.
    pub frame_timeout_ms: u64,
}

/// Permission handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionConfig {
    /// Grace period after requesting consent before re-polling.
    pub request_wait_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "screentap=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for CaptureDefaults {
    fn default() -> Self {
        Self {
            max_width: 0,
            max_height: 0,
            queue_depth: 2,
            backend: BackendKind::Auto,
            fps: 30,
            frame_timeout_ms: 5_000,
        }
    }
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            request_wait_ms: 500,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if !config_path.exists() {
            return Self::default();
        }
        match Self::load_from(&config_path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config at {:?}: {}", config_path, e);
                Self::default()
            }
        }
    }

    /// Load and validate config from an explicit path.
    pub fn load_from(path: &Path) -> ScreentapResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the standard location.
    pub fn save(&self) -> ScreentapResult<()> {
        self.save_to(&config_file_path())
    }

    /// Save config to an explicit path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> ScreentapResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reject values the capture engine cannot honour.
    pub fn validate(&self) -> ScreentapResult<()> {
        if self.capture.queue_depth == 0 {
            return Err(ScreentapError::config("capture.queue_depth must be at least 1"));
        }
        if !(1..=240).contains(&self.capture.fps) {
            return Err(ScreentapError::config(format!(
                "capture.fps must be within 1..=240, got {}",
                self.capture.fps
            )));
        }
        if self.capture.frame_timeout_ms == 0 {
            return Err(ScreentapError::config(
                "capture.frame_timeout_ms must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("screentap").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.capture.queue_depth, 2);
        assert_eq!(config.permission.request_wait_ms, 500);
        assert_eq!(config.capture.backend, BackendKind::Auto);
    }

    #[test]
    fn zero_queue_depth_is_rejected() {
        let mut config = AppConfig::default();
        config.capture.queue_depth = 0;
        assert!(matches!(
            config.validate(),
            Err(ScreentapError::Config { .. })
        ));
    }

    #[test]
    fn out_of_range_fps_is_rejected() {
        let mut config = AppConfig::default();
        config.capture.fps = 1000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"capture": {"max_width": 1280, "backend": "synthetic"}}"#)
                .unwrap();
        assert_eq!(config.capture.max_width, 1280);
        assert_eq!(config.capture.max_height, 0);
        assert_eq!(config.capture.backend, BackendKind::Synthetic);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn save_then_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = AppConfig::default();
        config.capture.max_width = 1920;
        config.capture.max_height = 1080;
        config.logging.json = true;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.capture.max_width, 1920);
        assert_eq!(loaded.capture.max_height, 1080);
        assert!(loaded.logging.json);
    }

    #[test]
    fn load_from_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"capture": {"queue_depth": 0}}"#).unwrap();
        assert!(AppConfig::load_from(&path).is_err());
    }
}

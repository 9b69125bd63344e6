//! Frontend configuration
//!
//! Per-category driver selection and feature flags, persisted as JSON. Every
//! field has a default so a missing or partial config file still yields a
//! runnable frontend.

use crate::input::BindingTable;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Settings errors
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type SettingsResult<T> = Result<T, SettingsError>;

/// Video driver selection and presentation flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoSettings {
    pub driver: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
    pub vsync: bool,
    /// Lock presentation to the 4:3 aspect ratio.
    pub force_aspect: bool,
    /// Linear texture filtering; nearest-neighbor when off.
    pub smooth: bool,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            driver: "wgpu".to_string(),
            width: 1024,
            height: 768,
            fullscreen: false,
            vsync: true,
            force_aspect: true,
            smooth: true,
        }
    }
}

/// Camera driver selection and capture preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    pub driver: String,
    /// User-facing permission gate; capture never starts while this is off.
    pub allow: bool,
    /// Device selector; the netcam driver reads it as a URL.
    pub device: String,
    /// Requested capture width; 0 defers to the consumer's preference.
    pub width: u32,
    /// Requested capture height; 0 defers to the consumer's preference.
    pub height: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            driver: "netcam".to_string(),
            allow: false,
            device: String::new(),
            width: 0,
            height: 0,
        }
    }
}

/// Input driver selection and per-port bindings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputSettings {
    pub driver: String,
    pub bindings: BindingTable,
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            driver: "winit".to_string(),
            bindings: BindingTable::default(),
        }
    }
}

/// Complete frontend configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub video: VideoSettings,
    pub camera: CameraSettings,
    pub input: InputSettings,
}

impl Settings {
    pub fn load(path: &Path) -> SettingsResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> SettingsResult<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Load from `path` when given, falling back to defaults on a missing or
    /// malformed file. The failure is logged, never fatal.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        match Self::load(path) {
            Ok(settings) => {
                tracing::info!("Loaded config from {:?}", path);
                settings
            }
            Err(e) => {
                tracing::warn!("Couldn't load config {:?}: {}. Using defaults.", path, e);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.video.driver, "wgpu");
        assert_eq!(settings.camera.driver, "netcam");
        assert_eq!(settings.input.driver, "winit");
        // Camera permission is off until the user opts in
        assert!(!settings.camera.allow);
        // Capture size defers to the consumer by default
        assert_eq!(settings.camera.width, 0);
        assert_eq!(settings.camera.height, 0);
        assert!(settings.video.vsync);
        assert!(settings.video.force_aspect);
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relic.json");

        let mut settings = Settings::default();
        settings.video.driver = "null".to_string();
        settings.video.vsync = false;
        settings.camera.allow = true;
        settings.camera.device = "http://camera.local/stream".to_string();
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded.video.driver, "null");
        assert!(!loaded.video.vsync);
        assert!(loaded.camera.allow);
        assert_eq!(loaded.camera.device, "http://camera.local/stream");
        assert_eq!(
            loaded.input.bindings.ports(),
            settings.input.bindings.ports()
        );
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relic.json");
        std::fs::write(&path, r#"{"video": {"driver": "null"}}"#).unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.video.driver, "null");
        // Unspecified fields come from defaults
        assert_eq!(settings.video.width, 1024);
        assert_eq!(settings.camera.driver, "netcam");
    }

    #[test]
    fn test_load_or_default() {
        assert_eq!(Settings::load_or_default(None).video.driver, "wgpu");
        let missing = Path::new("/nonexistent/relic.json");
        assert_eq!(
            Settings::load_or_default(Some(missing)).video.driver,
            "wgpu"
        );
    }
}

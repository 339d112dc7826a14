//! Configuration management for the camera controller
//!
//! Settings are read from a TOML file and may be overridden by
//! `CAMERA_CONTROLLER__<SECTION>__<KEY>` environment variables.

use crate::errors::CameraError;
use crate::types::{
    CameraPosition, DeviceType, FocusMode, PhotoCodec, VideoGravity, VideoOrientation,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "CAMERA_CONTROLLER";

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub discovery: DiscoveryConfig,
    pub capture: CaptureConfig,
    pub preview: PreviewConfig,
    pub dispatch: DispatchConfig,
}

/// Which devices are considered during setup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub device_types: Vec<DeviceType>,
}

/// Input selection and photo output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Position used when both cameras exist
    pub preferred_position: CameraPosition,
    /// Focus mode applied to the rear camera during setup
    pub rear_focus_mode: FocusMode,
    pub photo_codec: PhotoCodec,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    /// How long a photo capture waits for a fresh frame
    pub photo_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub gravity: VideoGravity,
    pub orientation: VideoOrientation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Name of the background setup thread
    pub queue_label: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            device_types: DeviceType::ALL.to_vec(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            preferred_position: CameraPosition::Rear,
            rear_focus_mode: FocusMode::ContinuousAutoFocus,
            photo_codec: PhotoCodec::Jpeg,
            jpeg_quality: 90,
            photo_timeout_ms: 2000,
        }
    }
}

impl CaptureConfig {
    pub fn photo_timeout(&self) -> Duration {
        Duration::from_millis(self.photo_timeout_ms)
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            gravity: VideoGravity::ResizeAspectFill,
            orientation: VideoOrientation::Portrait,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_label: "prepare".to_string(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CameraError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| CameraError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: ControllerConfig = toml::from_str(&contents)
            .map_err(|e| CameraError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load the file (if present) with environment overrides on top.
    pub fn load_layered<P: AsRef<Path>>(path: P) -> Result<Self, CameraError> {
        let settings = ::config::Config::builder()
            .add_source(
                ::config::File::from(path.as_ref())
                    .format(::config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| CameraError::ConfigError(format!("Failed to build config: {}", e)))?;

        let config: ControllerConfig = settings
            .try_deserialize()
            .map_err(|e| CameraError::ConfigError(format!("Invalid configuration: {}", e)))?;
        config.validate().map_err(CameraError::ConfigError)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CameraError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CameraError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| CameraError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| CameraError::ConfigError(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from("camera-controller.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_layered(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.discovery.device_types.is_empty() {
            return Err("At least one device type must be discoverable".to_string());
        }
        if self.capture.jpeg_quality == 0 || self.capture.jpeg_quality > 100 {
            return Err("JPEG quality must be between 1 and 100".to_string());
        }
        if self.capture.photo_timeout_ms == 0 {
            return Err("Photo timeout must be positive".to_string());
        }
        if self.dispatch.queue_label.trim().is_empty() {
            return Err("Queue label must not be empty".to_string());
        }
        Ok(())
    }
}

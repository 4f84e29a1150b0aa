//! Configuration management for boothcam
//!
//! Which camera to open, which backend to open it with, and the viewfinder
//! setting to request once it is running.

use crate::errors::CameraError;
use crate::pixel_format::PixelFormat;
use crate::types::Resolution;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoothConfig {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub viewfinder: ViewfinderConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Device description to start instead of the system default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    /// Capture backend: auto, v4l2, media-foundation or avfoundation
    pub backend: String,
}

/// Viewfinder setting requested after the camera starts. Anything left unset
/// keeps what the driver chose.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewfinderConfig {
    /// [width, height]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<[u32; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<f64>,
    /// Symbolic pixel format name, e.g. "JPG"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixel_format: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// env_logger filter used when RUST_LOG is not set
    pub filter: String,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: None,
            backend: "auto".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "boothcam=info".to_string(),
        }
    }
}

impl ViewfinderConfig {
    pub fn resolution(&self) -> Option<Resolution> {
        self.resolution.map(|[w, h]| Resolution::new(w, h))
    }

    pub fn pixel_format(&self) -> Result<Option<PixelFormat>, CameraError> {
        self.pixel_format
            .as_deref()
            .map(str::parse::<PixelFormat>)
            .transpose()
    }
}

impl BoothConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CameraError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| CameraError::Config(format!("Failed to read config file: {}", e)))?;

        let config: BoothConfig = toml::from_str(&contents)
            .map_err(|e| CameraError::Config(format!("Failed to parse config file: {}", e)))?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CameraError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CameraError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| CameraError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| CameraError::Config(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from("boothcam.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.camera.backend.trim().is_empty() {
            return Err("Camera backend must not be empty".to_string());
        }
        if let Some([w, h]) = self.viewfinder.resolution {
            if w == 0 || h == 0 {
                return Err("Invalid viewfinder resolution".to_string());
            }
        }
        if let Some(rate) = self.viewfinder.frame_rate {
            if !(rate > 0.0 && rate.is_finite()) {
                return Err("Viewfinder frame rate must be positive".to_string());
            }
        }
        self.viewfinder.pixel_format().map_err(|e| e.to_string())?;
        Ok(())
    }
}

//! boothcam: camera selection and capability negotiation for photobooth overlays
//!
//! This crate owns the camera side of a desktop preview overlay: which
//! cameras exist, which one is streaming, what each one supports, and pushing
//! a chosen resolution / frame rate / pixel format back to the device.
//! Window chrome and menus are left to the UI layer.
//!
//! # Features
//! - Device snapshot with start-by-description, start-by-index and
//!   start-by-device
//! - At most one streaming session; switching unloads before starting
//! - One error channel that outlives device switches
//! - Capability index grouped by resolution and rounded frame rate
//! - Native capture through nokhwa, scripted capture for tests
//!
//! # Usage
//! ```rust,no_run
//! use boothcam::{catalog, platform::NullSink, DeviceRegistry, NativeBackend};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), boothcam::CameraError> {
//! let mut registry = DeviceRegistry::new(NativeBackend::new())?;
//! let default = registry.default_device()?.clone();
//! registry.start(default, Arc::new(NullSink))?;
//!
//! let (index, preferred) = catalog::supported_settings(&mut registry, None)?;
//! for resolution in index.resolutions() {
//!     println!("{}", resolution);
//! }
//! println!("preferred: {:?}", preferred);
//! # Ok(())
//! # }
//! ```
pub mod catalog;
pub mod config;
pub mod errors;
pub mod events;
pub mod invariants;
pub mod pixel_format;
pub mod platform;
pub mod registry;
pub mod types;

// Testing utilities - scripted backend for offline testing
pub mod testing;

// Re-exports for convenience
pub use catalog::{CapabilityIndex, PreferredSetting};
pub use config::BoothConfig;
pub use errors::CameraError;
pub use events::{DeviceErrorEvent, DeviceErrorKind};
pub use pixel_format::PixelFormat;
pub use platform::{CameraBackend, CameraStream, CapabilitySource, NativeBackend, OutputSink};
pub use registry::{ActiveSession, DeviceRegistry, DeviceSelector};
pub use types::{
    CaptureMode, Device, FrameRate, Platform, PreviewFrame, RawFormat, Resolution,
    ViewfinderSettings,
};

/// Detect the current platform
pub fn current_platform() -> Platform {
    Platform::current()
}

/// Initialize logging with the default filter
pub fn init_logging() {
    init_logging_with("boothcam=info");
}

/// Initialize logging, using `default_filter` unless RUST_LOG is set
pub fn init_logging_with(default_filter: &str) {
    let env = env_logger::Env::default().default_filter_or(default_filter);
    let _ = env_logger::Builder::from_env(env).try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
        platform: Platform::current(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub platform: Platform,
}

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn test_crate_info() {
        let info = get_info();
        assert_eq!(info.name, "boothcam");
        assert!(!info.version.is_empty());
        assert!(!info.description.is_empty());
        assert_eq!(info.platform, current_platform());
    }

    #[test]
    fn test_init_logging_twice_is_harmless() {
        init_logging();
        init_logging_with("boothcam=debug");
    }
}

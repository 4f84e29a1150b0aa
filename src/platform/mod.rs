//! Boundary to the OS multimedia stack.
//!
//! The registry and the catalog only talk to cameras through these traits.
//! [`native::NativeBackend`] drives real hardware through nokhwa;
//! [`crate::testing::MockBackend`] scripts devices for tests.

pub mod native;

use crate::errors::CameraError;
use crate::events::ErrorReporter;
use crate::types::{CaptureMode, Device, PreviewFrame, RawFormat, ViewfinderSettings};
use std::sync::Arc;

pub use native::NativeBackend;

/// Surface that receives preview frames.
///
/// Frames are delivered on the driver's thread, so implementations hand
/// them off rather than touching UI state directly.
pub trait OutputSink: Send + Sync {
    fn present(&self, frame: PreviewFrame);
}

/// Sink that discards every frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn present(&self, _frame: PreviewFrame) {}
}

/// Anything that can report what a device supports.
pub trait CapabilitySource {
    /// Raw pixel-format codes, in driver order.
    fn pixel_format_codes(&mut self) -> Result<Vec<u32>, CameraError>;

    /// Every supported (resolution, max frame rate, pixel format) entry, in
    /// driver order.
    fn format_entries(&mut self) -> Result<Vec<RawFormat>, CameraError>;
}

/// A camera opened for one session.
pub trait CameraStream: CapabilitySource {
    fn set_capture_mode(&mut self, mode: CaptureMode) -> Result<(), CameraError>;

    /// Request the stream to begin. Failures after this returns arrive on the
    /// session's [`ErrorReporter`].
    fn start(&mut self) -> Result<(), CameraError>;

    /// Stop streaming and release the device. Safe to call more than once.
    fn unload(&mut self) -> Result<(), CameraError>;

    fn viewfinder_settings(&self) -> Result<ViewfinderSettings, CameraError>;

    /// Push new settings. Drivers may clamp or ignore parts of the request;
    /// read the settings back to learn what took effect.
    fn set_viewfinder_settings(&mut self, settings: ViewfinderSettings)
        -> Result<(), CameraError>;
}

pub trait CameraBackend {
    type Stream: CameraStream;

    fn name(&self) -> &str;

    fn enumerate(&self) -> Result<Vec<Device>, CameraError>;

    /// The OS-designated default among `devices`. Backends without such a
    /// designation use the first enumerated device.
    fn default_device(&self, devices: &[Device]) -> Option<Device> {
        devices.first().cloned()
    }

    fn open(
        &self,
        device: &Device,
        sink: Arc<dyn OutputSink>,
        errors: ErrorReporter,
    ) -> Result<Self::Stream, CameraError>;

    /// Query a device's capabilities without starting a session on it.
    fn probe(&self, device: &Device) -> Result<Box<dyn CapabilitySource + '_>, CameraError>;
}

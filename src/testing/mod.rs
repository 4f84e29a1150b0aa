//! Testing utilities for boothcam
//!
//! A scripted camera backend so the registry and the catalog can be exercised
//! without hardware.

pub mod mock_backend;

pub use mock_backend::{FrameRecorder, LifecycleEvent, MockBackend, MockDevice, MockStream};

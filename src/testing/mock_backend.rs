//! Scripted camera backend.
//!
//! Devices, their capability lists and their failure modes are declared up
//! front. Every lifecycle call is appended to a shared log so tests can assert
//! ordering, and the backend keeps handles to the running session's error
//! reporter and sink so tests can inject driver events.

use crate::errors::CameraError;
use crate::events::{DeviceErrorKind, ErrorReporter};
use crate::platform::{CameraBackend, CameraStream, CapabilitySource, OutputSink};
use crate::types::{
    CaptureMode, Device, PreviewFrame, RawFormat, Resolution, ViewfinderSettings,
};
use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Opened(String),
    CaptureMode(String, CaptureMode),
    Started(String),
    Unloaded(String),
    Probed(String),
}

/// One scripted camera.
#[derive(Debug, Clone)]
pub struct MockDevice {
    pub device: Device,
    pub formats: Vec<RawFormat>,
    pub pixel_codes: Option<Vec<u32>>,
    pub fail_open: bool,
    pub fail_start: bool,
}

impl MockDevice {
    pub fn new(description: &str, handle: &str) -> Self {
        Self {
            device: Device::new(description, handle),
            formats: Vec::new(),
            pixel_codes: None,
            fail_open: false,
            fail_start: false,
        }
    }

    pub fn with_formats(mut self, formats: Vec<RawFormat>) -> Self {
        self.formats = formats;
        self
    }

    /// Override the pixel-format list, which otherwise is the distinct codes
    /// of the format entries in order.
    pub fn with_pixel_codes(mut self, codes: Vec<u32>) -> Self {
        self.pixel_codes = Some(codes);
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    fn initial_settings(&self) -> ViewfinderSettings {
        match self.formats.first() {
            Some(format) => ViewfinderSettings::new(format.resolution())
                .with_frame_rate(format.max_frame_rate)
                .with_pixel_format_code(format.pixel_format_code),
            None => ViewfinderSettings::new(Resolution::new(0, 0)),
        }
    }

    /// Clamp a request the way a conservative driver would: the resolution
    /// must exist, the pixel format falls back to one available at that
    /// resolution, and the frame rate is capped at the supported maximum.
    fn clamp(
        &self,
        current: &ViewfinderSettings,
        requested: &ViewfinderSettings,
    ) -> Result<ViewfinderSettings, CameraError> {
        let candidates: Vec<&RawFormat> = self
            .formats
            .iter()
            .filter(|f| f.resolution() == requested.resolution)
            .collect();
        let first = candidates.first().ok_or_else(|| {
            CameraError::Configuration(format!(
                "{} does not support {}",
                self.device, requested.resolution
            ))
        })?;

        let offers = |code: Option<u32>| {
            code.filter(|c| candidates.iter().any(|f| f.pixel_format_code == *c))
        };
        let code = offers(requested.pixel_format_code)
            .or_else(|| offers(current.pixel_format_code))
            .unwrap_or(first.pixel_format_code);

        let max_rate = candidates
            .iter()
            .filter(|f| f.pixel_format_code == code)
            .map(|f| f.max_frame_rate)
            .fold(0.0_f64, f64::max);
        let rate = if requested.max_frame_rate > 0.0 {
            requested.max_frame_rate.min(max_rate)
        } else {
            max_rate
        };

        Ok(ViewfinderSettings::new(requested.resolution)
            .with_frame_rate(rate)
            .with_pixel_format_code(code))
    }
}

impl CapabilitySource for MockDevice {
    fn pixel_format_codes(&mut self) -> Result<Vec<u32>, CameraError> {
        if let Some(codes) = &self.pixel_codes {
            return Ok(codes.clone());
        }
        let mut codes = Vec::new();
        for format in &self.formats {
            if !codes.contains(&format.pixel_format_code) {
                codes.push(format.pixel_format_code);
            }
        }
        Ok(codes)
    }

    fn format_entries(&mut self) -> Result<Vec<RawFormat>, CameraError> {
        Ok(self.formats.clone())
    }
}

#[derive(Default)]
struct Shared {
    log: Vec<LifecycleEvent>,
    reporter: Option<ErrorReporter>,
    sink: Option<Arc<dyn OutputSink>>,
    streaming: usize,
    peak_streaming: usize,
    sequence: u64,
}

#[derive(Clone, Default)]
pub struct MockBackend {
    devices: Vec<MockDevice>,
    default_index: Option<usize>,
    shared: Arc<Mutex<Shared>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, device: MockDevice) -> Self {
        self.devices.push(device);
        self
    }

    /// Designate the default device by position.
    pub fn with_default(mut self, index: usize) -> Self {
        self.default_index = Some(index);
        self
    }

    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn script_for(&self, device: &Device) -> Option<&MockDevice> {
        self.devices.iter().find(|d| d.device == *device)
    }

    pub fn log(&self) -> Vec<LifecycleEvent> {
        self.shared().log.clone()
    }

    pub fn clear_log(&self) {
        self.shared().log.clear();
    }

    /// Number of sessions currently streaming.
    pub fn streaming(&self) -> usize {
        self.shared().streaming
    }

    /// Highest number of sessions that were ever streaming at once.
    pub fn peak_streaming(&self) -> usize {
        self.shared().peak_streaming
    }

    /// Raise a driver error on the most recently opened session.
    pub fn emit_device_error(&self, kind: DeviceErrorKind, message: &str) -> bool {
        let reporter = self.shared().reporter.clone();
        match reporter {
            Some(reporter) => {
                reporter.report(kind, message);
                true
            }
            None => false,
        }
    }

    /// Deliver a frame to the most recently opened session's sink.
    pub fn push_frame(&self, width: u32, height: u32) -> bool {
        let (sink, sequence) = {
            let mut shared = self.shared();
            shared.sequence += 1;
            (shared.sink.clone(), shared.sequence)
        };
        match sink {
            Some(sink) => {
                sink.present(PreviewFrame {
                    sequence,
                    width,
                    height,
                    pixel_format_code: None,
                    data: vec![0; (width * height * 3) as usize],
                    captured_at: Utc::now(),
                });
                true
            }
            None => false,
        }
    }
}

impl CameraBackend for MockBackend {
    type Stream = MockStream;

    fn name(&self) -> &str {
        "mock"
    }

    fn enumerate(&self) -> Result<Vec<Device>, CameraError> {
        Ok(self.devices.iter().map(|d| d.device.clone()).collect())
    }

    fn default_device(&self, devices: &[Device]) -> Option<Device> {
        match self.default_index {
            Some(index) => devices.get(index).cloned(),
            None => devices.first().cloned(),
        }
    }

    fn open(
        &self,
        device: &Device,
        sink: Arc<dyn OutputSink>,
        errors: ErrorReporter,
    ) -> Result<MockStream, CameraError> {
        let script = self
            .script_for(device)
            .cloned()
            .ok_or_else(|| CameraError::DeviceStart(format!("{} is not connected", device)))?;
        if script.fail_open {
            return Err(CameraError::DeviceStart(format!(
                "{} could not be opened",
                device
            )));
        }

        let mut shared = self.shared();
        shared.log.push(LifecycleEvent::Opened(device.description.clone()));
        shared.reporter = Some(errors);
        shared.sink = Some(sink);
        drop(shared);

        Ok(MockStream {
            settings: script.initial_settings(),
            script,
            capture_mode: CaptureMode::Video,
            started: false,
            unloaded: false,
            shared: self.shared.clone(),
        })
    }

    fn probe(&self, device: &Device) -> Result<Box<dyn CapabilitySource + '_>, CameraError> {
        let script = self
            .script_for(device)
            .cloned()
            .ok_or_else(|| CameraError::Query(format!("{} is not connected", device)))?;
        self.shared()
            .log
            .push(LifecycleEvent::Probed(device.description.clone()));
        Ok(Box::new(script))
    }
}

pub struct MockStream {
    script: MockDevice,
    settings: ViewfinderSettings,
    capture_mode: CaptureMode,
    started: bool,
    unloaded: bool,
    shared: Arc<Mutex<Shared>>,
}

impl MockStream {
    pub fn capture_mode(&self) -> CaptureMode {
        self.capture_mode
    }

    pub fn is_streaming(&self) -> bool {
        self.started && !self.unloaded
    }

    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn description(&self) -> String {
        self.script.device.description.clone()
    }
}

impl CapabilitySource for MockStream {
    fn pixel_format_codes(&mut self) -> Result<Vec<u32>, CameraError> {
        self.script.pixel_format_codes()
    }

    fn format_entries(&mut self) -> Result<Vec<RawFormat>, CameraError> {
        self.script.format_entries()
    }
}

impl CameraStream for MockStream {
    fn set_capture_mode(&mut self, mode: CaptureMode) -> Result<(), CameraError> {
        self.capture_mode = mode;
        let description = self.description();
        self.shared()
            .log
            .push(LifecycleEvent::CaptureMode(description, mode));
        Ok(())
    }

    fn start(&mut self) -> Result<(), CameraError> {
        if self.script.fail_start {
            return Err(CameraError::DeviceStart(format!(
                "{} is busy",
                self.script.device
            )));
        }
        if self.started {
            return Ok(());
        }
        self.started = true;
        let description = self.description();
        let mut shared = self.shared();
        shared.log.push(LifecycleEvent::Started(description));
        shared.streaming += 1;
        shared.peak_streaming = shared.peak_streaming.max(shared.streaming);
        Ok(())
    }

    fn unload(&mut self) -> Result<(), CameraError> {
        if self.unloaded {
            return Ok(());
        }
        self.unloaded = true;
        let was_started = self.started;
        let description = self.description();
        let mut shared = self.shared();
        shared.log.push(LifecycleEvent::Unloaded(description));
        if was_started {
            shared.streaming = shared.streaming.saturating_sub(1);
        }
        shared.reporter = None;
        shared.sink = None;
        Ok(())
    }

    fn viewfinder_settings(&self) -> Result<ViewfinderSettings, CameraError> {
        Ok(self.settings)
    }

    fn set_viewfinder_settings(
        &mut self,
        settings: ViewfinderSettings,
    ) -> Result<(), CameraError> {
        self.settings = self.script.clamp(&self.settings, &settings)?;
        Ok(())
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        let _ = self.unload();
    }
}

/// Sink that keeps every frame it receives.
#[derive(Default)]
pub struct FrameRecorder {
    frames: Mutex<Vec<PreviewFrame>>,
}

impl FrameRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn last(&self) -> Option<PreviewFrame> {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

impl OutputSink for FrameRecorder {
    fn present(&self, frame: PreviewFrame) {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(frame);
    }
}

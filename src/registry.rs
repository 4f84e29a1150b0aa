//! Device registry: the device snapshot and the single active session.

use crate::errors::CameraError;
use crate::events::{DeviceErrorEvent, DeviceErrorKind, ErrorReporter, ERROR_CHANNEL_CAPACITY};
use crate::platform::{CameraBackend, CameraStream, OutputSink};
use crate::types::{CaptureMode, Device, ViewfinderSettings};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Ways a caller can name the device to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSelector {
    /// Exact match against the device description
    Description(String),
    /// Position in the device snapshot
    Index(usize),
    /// A device handle, used as-is
    Device(Device),
}

impl From<&str> for DeviceSelector {
    fn from(description: &str) -> Self {
        DeviceSelector::Description(description.to_string())
    }
}

impl From<String> for DeviceSelector {
    fn from(description: String) -> Self {
        DeviceSelector::Description(description)
    }
}

impl From<usize> for DeviceSelector {
    fn from(index: usize) -> Self {
        DeviceSelector::Index(index)
    }
}

impl From<Device> for DeviceSelector {
    fn from(device: Device) -> Self {
        DeviceSelector::Device(device)
    }
}

impl From<&Device> for DeviceSelector {
    fn from(device: &Device) -> Self {
        DeviceSelector::Device(device.clone())
    }
}

/// The one camera stream currently running.
pub struct ActiveSession<S> {
    id: Uuid,
    device: Device,
    stream: S,
    sink: Arc<dyn OutputSink>,
    capture_mode: CaptureMode,
    started_at: DateTime<Utc>,
}

impl<S: CameraStream> ActiveSession<S> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn sink(&self) -> &Arc<dyn OutputSink> {
        &self.sink
    }

    pub fn capture_mode(&self) -> CaptureMode {
        self.capture_mode
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn viewfinder_settings(&self) -> Result<ViewfinderSettings, CameraError> {
        self.stream.viewfinder_settings()
    }
}

/// Owns the device snapshot, the active session and the error channel.
///
/// Not thread-safe: it lives on the caller's event loop, and driver
/// notifications reach that loop through [`DeviceRegistry::subscribe_errors`].
pub struct DeviceRegistry<B: CameraBackend> {
    backend: B,
    devices: Vec<Device>,
    default: Option<Device>,
    active: Option<ActiveSession<B::Stream>>,
    errors: broadcast::Sender<DeviceErrorEvent>,
}

impl<B: CameraBackend> DeviceRegistry<B> {
    /// Take the device snapshot. It is not refreshed afterwards.
    pub fn new(backend: B) -> Result<Self, CameraError> {
        let devices = backend.enumerate()?;
        let default = backend.default_device(&devices);
        let (errors, _) = broadcast::channel(ERROR_CHANNEL_CAPACITY);

        log::info!(
            "Found {} camera(s) via {} backend{}",
            devices.len(),
            backend.name(),
            default
                .as_ref()
                .map(|d| format!(", default: {}", d))
                .unwrap_or_default()
        );

        Ok(Self {
            backend,
            devices,
            default,
            active: None,
            errors,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// `(description, device)` pairs in driver order.
    pub fn list_devices(&self) -> impl Iterator<Item = (&str, &Device)> + '_ {
        self.devices.iter().map(|d| (d.description.as_str(), d))
    }

    pub fn default_device(&self) -> Result<&Device, CameraError> {
        self.default.as_ref().ok_or(CameraError::NoDeviceAvailable)
    }

    /// Resolve a selector against the snapshot without side effects.
    pub fn resolve(&self, selector: &DeviceSelector) -> Option<Device> {
        match selector {
            DeviceSelector::Description(description) => self
                .devices
                .iter()
                .find(|d| d.description == *description)
                .cloned(),
            DeviceSelector::Index(index) => self.devices.get(*index).cloned(),
            DeviceSelector::Device(device) => Some(device.clone()),
        }
    }

    /// Like [`resolve`](Self::resolve), but a miss is a
    /// [`CameraError::DeviceNotFound`].
    pub fn find(&self, selector: &DeviceSelector) -> Result<Device, CameraError> {
        self.resolve(selector).ok_or_else(|| {
            CameraError::DeviceNotFound(match selector {
                DeviceSelector::Description(description) => description.clone(),
                DeviceSelector::Index(index) => format!("#{}", index),
                DeviceSelector::Device(device) => device.to_string(),
            })
        })
    }

    /// Receiver for device errors of every session this registry starts,
    /// including sessions started after subscribing.
    pub fn subscribe_errors(&self) -> broadcast::Receiver<DeviceErrorEvent> {
        self.errors.subscribe()
    }

    pub fn active(&self) -> Option<&ActiveSession<B::Stream>> {
        self.active.as_ref()
    }

    pub fn active_mut(&mut self) -> Option<&mut ActiveSession<B::Stream>> {
        self.active.as_mut()
    }

    pub fn is_active(&self, device: &Device) -> bool {
        self.active
            .as_ref()
            .map(|session| session.device == *device)
            .unwrap_or(false)
    }

    /// Start streaming `selector` into `sink`, unloading any running session
    /// first.
    ///
    /// Returns `Ok(None)` when the selector matches no device; the running
    /// session is then left untouched. Stream start is fire-and-forget: a
    /// stream that fails to begin is reported on the error channel and stays
    /// installed. A device that cannot be opened at all is reported and
    /// returned as `Err`, and leaves no session behind.
    pub fn start(
        &mut self,
        selector: impl Into<DeviceSelector>,
        sink: Arc<dyn OutputSink>,
    ) -> Result<Option<&ActiveSession<B::Stream>>, CameraError> {
        let selector = selector.into();
        let device = match self.resolve(&selector) {
            Some(device) => device,
            None => {
                log::warn!("Camera not found: {:?}", selector);
                return Ok(None);
            }
        };

        self.stop();

        let id = Uuid::new_v4();
        let reporter = ErrorReporter::new(self.errors.clone(), id, device.description.clone());

        let mut stream = match self.backend.open(&device, sink.clone(), reporter.clone()) {
            Ok(stream) => stream,
            Err(e) => {
                reporter.report(DeviceErrorKind::StartFailed, e.to_string());
                return Err(match e {
                    CameraError::DeviceStart(_) => e,
                    other => CameraError::DeviceStart(other.to_string()),
                });
            }
        };

        if let Err(e) = stream.set_capture_mode(CaptureMode::StillImage) {
            reporter.report(
                DeviceErrorKind::Other,
                format!("Failed to select still image capture: {}", e),
            );
        }
        if let Err(e) = stream.start() {
            reporter.report(DeviceErrorKind::StartFailed, e.to_string());
        }

        log::info!("Started camera session {} on {}", id, device);
        self.active = Some(ActiveSession {
            id,
            device,
            stream,
            sink,
            capture_mode: CaptureMode::StillImage,
            started_at: Utc::now(),
        });
        Ok(self.active.as_ref())
    }

    /// Unload the running session, if any. Returns whether one was running.
    pub fn stop(&mut self) -> bool {
        match self.active.take() {
            Some(mut session) => {
                if let Err(e) = session.stream.unload() {
                    log::warn!("Error while unloading {}: {}", session.device, e);
                }
                log::info!("Stopped camera session {} on {}", session.id, session.device);
                true
            }
            None => false,
        }
    }
}

impl<B: CameraBackend> Drop for DeviceRegistry<B> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::NullSink;
    use crate::testing::{LifecycleEvent, MockBackend, MockDevice};

    fn two_cameras() -> MockBackend {
        MockBackend::new()
            .with_device(MockDevice::new("Integrated Camera", "0"))
            .with_device(MockDevice::new("USB Camera", "1"))
    }

    fn sink() -> Arc<dyn OutputSink> {
        Arc::new(NullSink)
    }

    #[test]
    fn test_selectors_resolve_by_description_index_and_device() {
        let registry = DeviceRegistry::new(two_cameras()).unwrap();
        let usb = registry.devices()[1].clone();

        assert_eq!(registry.resolve(&"USB Camera".into()), Some(usb.clone()));
        assert_eq!(registry.resolve(&1usize.into()), Some(usb.clone()));
        assert_eq!(registry.resolve(&(&usb).into()), Some(usb));
        assert_eq!(registry.resolve(&"usb camera".into()), None);
        assert_eq!(registry.resolve(&5usize.into()), None);
    }

    #[test]
    fn test_start_forces_still_image_mode() {
        let backend = two_cameras();
        let mut registry = DeviceRegistry::new(backend.clone()).unwrap();
        let session = registry.start(0usize, sink()).unwrap().unwrap();
        assert_eq!(session.capture_mode(), CaptureMode::StillImage);
        assert_eq!(session.stream().capture_mode(), CaptureMode::StillImage);
        assert_eq!(
            backend.log(),
            vec![
                LifecycleEvent::Opened("Integrated Camera".to_string()),
                LifecycleEvent::CaptureMode("Integrated Camera".to_string(), CaptureMode::StillImage),
                LifecycleEvent::Started("Integrated Camera".to_string()),
            ]
        );
    }

    #[test]
    fn test_stop_is_idempotent() {
        let backend = two_cameras();
        let mut registry = DeviceRegistry::new(backend.clone()).unwrap();
        registry.start("USB Camera", sink()).unwrap();
        assert!(registry.stop());
        assert!(!registry.stop());
        assert!(registry.active().is_none());
        assert_eq!(backend.streaming(), 0);
    }

    #[test]
    fn test_drop_unloads_active_session() {
        let backend = two_cameras();
        {
            let mut registry = DeviceRegistry::new(backend.clone()).unwrap();
            registry.start(0usize, sink()).unwrap();
            assert_eq!(backend.streaming(), 1);
        }
        assert_eq!(backend.streaming(), 0);
    }

    #[test]
    fn test_find_reports_missing_device() {
        let registry = DeviceRegistry::new(two_cameras()).unwrap();
        assert_eq!(
            registry.find(&"USB Camera".into()).unwrap().handle,
            "1"
        );
        let err = registry.find(&"Document Camera".into()).unwrap_err();
        assert_eq!(
            err,
            CameraError::DeviceNotFound("Document Camera".to_string())
        );
        assert!(err.is_not_found());
        assert_eq!(
            registry.find(&7usize.into()),
            Err(CameraError::DeviceNotFound("#7".to_string()))
        );
    }
}

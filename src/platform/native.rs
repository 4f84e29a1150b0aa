use super::{CameraBackend, CameraStream, CapabilitySource, OutputSink};
use crate::errors::CameraError;
use crate::events::{DeviceErrorKind, ErrorReporter};
use crate::types::{
    CaptureMode, Device, PreviewFrame, RawFormat, Resolution, ViewfinderSettings,
};
use chrono::Utc;
use nokhwa::{
    pixel_format::RgbFormat,
    query,
    utils::{
        ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat,
        RequestedFormatType, Resolution as NokhwaResolution,
    },
    Buffer, Camera,
};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How long a query waits for the camera thread to answer.
const QUERY_TIMEOUT: Duration = Duration::from_secs(5);
/// Consecutive failed reads before the stream is declared dead.
const MAX_FRAME_FAILURES: u32 = 10;
const FRAME_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Code reported for frame formats this crate has no driver code for.
pub const UNMAPPED_CODE: u32 = 0;

/// Driver code for a nokhwa frame format.
///
/// YUYV is packed 4:2:2 and is reported under the 4:2:2 code. NV12 and GRAY
/// get their own codes, which the pixel-format table does not know.
#[allow(unreachable_patterns)]
pub fn frame_format_code(format: FrameFormat) -> u32 {
    match format {
        FrameFormat::RAWRGB => 4,
        FrameFormat::RAWBGR => 11,
        FrameFormat::YUYV => 18,
        FrameFormat::MJPEG => 30,
        FrameFormat::NV12 => 22,
        FrameFormat::GRAY => 28,
        _ => UNMAPPED_CODE,
    }
}

/// Inverse of [`frame_format_code`].
pub fn frame_format_for_code(code: u32) -> Option<FrameFormat> {
    match code {
        4 => Some(FrameFormat::RAWRGB),
        11 => Some(FrameFormat::RAWBGR),
        18 => Some(FrameFormat::YUYV),
        30 => Some(FrameFormat::MJPEG),
        22 => Some(FrameFormat::NV12),
        28 => Some(FrameFormat::GRAY),
        _ => None,
    }
}

fn camera_index(handle: &str) -> CameraIndex {
    handle
        .parse::<u32>()
        .map(CameraIndex::Index)
        .unwrap_or_else(|_| CameraIndex::String(handle.to_string()))
}

fn settings_from(format: CameraFormat) -> ViewfinderSettings {
    let resolution = format.resolution();
    ViewfinderSettings::new(Resolution::new(resolution.width_x, resolution.height_y))
        .with_frame_rate(f64::from(format.frame_rate()))
        .with_pixel_format_code(frame_format_code(format.format()))
}

fn raw_format_from(format: CameraFormat) -> RawFormat {
    let resolution = format.resolution();
    RawFormat::new(
        resolution.width_x,
        resolution.height_y,
        f64::from(format.frame_rate()),
        frame_format_code(format.format()),
    )
}

/// Build the nokhwa format for a settings push, keeping whatever part of the
/// current format the request leaves open.
fn requested_format(current: CameraFormat, settings: &ViewfinderSettings) -> CameraFormat {
    let frame_format = settings
        .pixel_format_code
        .and_then(frame_format_for_code)
        .unwrap_or_else(|| current.format());
    let frame_rate = if settings.max_frame_rate > 0.0 {
        settings.max_frame_rate.round() as u32
    } else {
        current.frame_rate()
    };
    CameraFormat::new(
        NokhwaResolution::new(settings.resolution.width, settings.resolution.height),
        frame_format,
        frame_rate,
    )
}

fn read_pixel_format_codes(camera: &mut Camera) -> Result<Vec<u32>, CameraError> {
    camera
        .compatible_fourcc()
        .map(|formats| formats.into_iter().map(frame_format_code).collect())
        .map_err(|e| CameraError::Query(format!("Failed to query pixel formats: {}", e)))
}

fn read_format_entries(camera: &mut Camera) -> Result<Vec<RawFormat>, CameraError> {
    camera
        .compatible_camera_formats()
        .map(|formats| formats.into_iter().map(raw_format_from).collect())
        .map_err(|e| CameraError::Query(format!("Failed to query camera formats: {}", e)))
}

/// Camera backend on the platform's native API, via nokhwa.
#[derive(Debug, Clone, Copy)]
pub struct NativeBackend {
    api: ApiBackend,
}

impl NativeBackend {
    /// Backend on the preferred API for the current platform.
    pub fn new() -> Self {
        Self {
            api: Self::platform_api(),
        }
    }

    pub fn with_api(api: ApiBackend) -> Self {
        Self { api }
    }

    /// Backend from a config name: `auto`, `v4l2`, `media-foundation` or
    /// `avfoundation`.
    pub fn from_name(name: &str) -> Result<Self, CameraError> {
        let api = match name.trim().to_ascii_lowercase().as_str() {
            "" | "auto" | "native" => Self::platform_api(),
            "v4l2" | "video4linux" => ApiBackend::Video4Linux,
            "media-foundation" | "mediafoundation" | "msmf" => ApiBackend::MediaFoundation,
            "avfoundation" => ApiBackend::AVFoundation,
            other => {
                return Err(CameraError::Config(format!(
                    "Unknown camera backend: {}",
                    other
                )))
            }
        };
        Ok(Self::with_api(api))
    }

    pub fn api(&self) -> ApiBackend {
        self.api
    }

    fn platform_api() -> ApiBackend {
        #[cfg(target_os = "linux")]
        return ApiBackend::Video4Linux;

        #[cfg(target_os = "windows")]
        return ApiBackend::MediaFoundation;

        #[cfg(target_os = "macos")]
        return ApiBackend::AVFoundation;

        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        return ApiBackend::Auto;
    }
}

impl Default for NativeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraBackend for NativeBackend {
    type Stream = NativeStream;

    fn name(&self) -> &str {
        match self.api {
            ApiBackend::Video4Linux => "v4l2",
            ApiBackend::MediaFoundation => "media-foundation",
            ApiBackend::AVFoundation => "avfoundation",
            _ => "auto",
        }
    }

    fn enumerate(&self) -> Result<Vec<Device>, CameraError> {
        let cameras = query(self.api)
            .map_err(|e| CameraError::Enumeration(format!("Failed to query cameras: {}", e)))?;

        Ok(cameras
            .into_iter()
            .map(|info| Device::new(info.human_name(), info.index().to_string()))
            .collect())
    }

    fn open(
        &self,
        device: &Device,
        sink: Arc<dyn OutputSink>,
        errors: ErrorReporter,
    ) -> Result<NativeStream, CameraError> {
        let (command_tx, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let index = camera_index(&device.handle);
        let api = self.api;
        let description = device.description.clone();

        // nokhwa::Camera is !Send, so it is created on and never leaves the
        // thread that drives it.
        let worker = thread::Builder::new()
            .name("boothcam-camera".to_string())
            .spawn(move || {
                let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::None);
                let camera = match Camera::with_backend(index, requested, api) {
                    Ok(camera) => camera,
                    Err(e) => {
                        let _ = ready_tx.send(Err(CameraError::DeviceStart(format!(
                            "Failed to open {}: {}",
                            description, e
                        ))));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                Worker {
                    camera,
                    sink,
                    errors,
                    streaming: false,
                    sequence: 0,
                    failures: 0,
                }
                .run(command_rx);
            })
            .map_err(|e| CameraError::DeviceStart(format!("Failed to spawn camera thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = worker.join();
                return Err(e);
            }
            Err(_) => {
                return Err(CameraError::DeviceStart(
                    "Camera thread exited while opening the device".to_string(),
                ))
            }
        }

        log::debug!("Opened {} on {:?}", device.description, self.api);
        Ok(NativeStream {
            device: device.clone(),
            commands: command_tx,
            worker: Some(worker),
            capture_mode: CaptureMode::Video,
        })
    }

    fn probe(&self, device: &Device) -> Result<Box<dyn CapabilitySource + '_>, CameraError> {
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::None);
        let camera = Camera::with_backend(camera_index(&device.handle), requested, self.api)
            .map_err(|e| {
                CameraError::Query(format!("Failed to open {} for probing: {}", device, e))
            })?;
        Ok(Box::new(NativeProbe { camera }))
    }
}

/// Non-streaming handle used only to read a device's capabilities.
struct NativeProbe {
    camera: Camera,
}

impl CapabilitySource for NativeProbe {
    fn pixel_format_codes(&mut self) -> Result<Vec<u32>, CameraError> {
        read_pixel_format_codes(&mut self.camera)
    }

    fn format_entries(&mut self) -> Result<Vec<RawFormat>, CameraError> {
        read_format_entries(&mut self.camera)
    }
}

enum Command {
    PixelFormatCodes {
        respond_to: mpsc::Sender<Result<Vec<u32>, CameraError>>,
    },
    FormatEntries {
        respond_to: mpsc::Sender<Result<Vec<RawFormat>, CameraError>>,
    },
    Viewfinder {
        respond_to: mpsc::Sender<ViewfinderSettings>,
    },
    Configure {
        settings: ViewfinderSettings,
        respond_to: mpsc::Sender<Result<(), CameraError>>,
    },
    Start,
    Shutdown,
}

/// Owns the nokhwa camera on its dedicated thread.
struct Worker {
    camera: Camera,
    sink: Arc<dyn OutputSink>,
    errors: ErrorReporter,
    streaming: bool,
    sequence: u64,
    failures: u32,
}

impl Worker {
    fn run(mut self, commands: mpsc::Receiver<Command>) {
        loop {
            let command = if self.streaming {
                match commands.try_recv() {
                    Ok(command) => Some(command),
                    Err(mpsc::TryRecvError::Empty) => None,
                    Err(mpsc::TryRecvError::Disconnected) => break,
                }
            } else {
                match commands.recv() {
                    Ok(command) => Some(command),
                    Err(_) => break,
                }
            };

            match command {
                Some(Command::Shutdown) => break,
                Some(command) => self.handle(command),
                None => self.pump_frame(),
            }
        }
        self.close_stream();
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::PixelFormatCodes { respond_to } => {
                let _ = respond_to.send(read_pixel_format_codes(&mut self.camera));
            }
            Command::FormatEntries { respond_to } => {
                let _ = respond_to.send(read_format_entries(&mut self.camera));
            }
            Command::Viewfinder { respond_to } => {
                let _ = respond_to.send(settings_from(self.camera.camera_format()));
            }
            Command::Configure {
                settings,
                respond_to,
            } => {
                let _ = respond_to.send(self.configure(&settings));
            }
            Command::Start => self.open_stream(),
            Command::Shutdown => {}
        }
    }

    fn configure(&mut self, settings: &ViewfinderSettings) -> Result<(), CameraError> {
        let was_streaming = self.streaming;
        if was_streaming {
            self.close_stream();
        }

        let format = requested_format(self.camera.camera_format(), settings);
        let result = self
            .camera
            .set_camera_requset(RequestedFormat::new::<RgbFormat>(
                RequestedFormatType::Closest(format),
            ))
            .map(|applied| log::debug!("Camera accepted format {:?}", applied))
            .map_err(|e| CameraError::Configuration(format!("Failed to apply {}: {}", settings, e)));

        if was_streaming {
            self.open_stream();
        }
        result
    }

    fn open_stream(&mut self) {
        if self.streaming {
            return;
        }
        match self.camera.open_stream() {
            Ok(()) => {
                self.streaming = true;
                self.failures = 0;
            }
            Err(e) => self.errors.report(
                DeviceErrorKind::StartFailed,
                format!("Failed to start stream: {}", e),
            ),
        }
    }

    fn close_stream(&mut self) {
        if self.camera.is_stream_open() {
            if let Err(e) = self.camera.stop_stream() {
                log::warn!("Failed to stop camera stream: {}", e);
            }
        }
        self.streaming = false;
    }

    fn pump_frame(&mut self) {
        match self.camera.frame() {
            Ok(buffer) => {
                self.failures = 0;
                self.sequence += 1;
                self.sink.present(preview_frame(self.sequence, &buffer));
            }
            Err(e) => {
                self.failures += 1;
                if self.failures >= MAX_FRAME_FAILURES {
                    self.errors.report(
                        DeviceErrorKind::Disconnected,
                        format!("Camera stopped delivering frames: {}", e),
                    );
                    self.close_stream();
                } else {
                    thread::sleep(FRAME_RETRY_DELAY);
                }
            }
        }
    }
}

fn preview_frame(sequence: u64, buffer: &Buffer) -> PreviewFrame {
    let resolution = buffer.resolution();
    PreviewFrame {
        sequence,
        width: resolution.width_x,
        height: resolution.height_y,
        pixel_format_code: Some(frame_format_code(buffer.source_frame_format())),
        data: buffer.buffer().to_vec(),
        captured_at: Utc::now(),
    }
}

/// A session's camera, driven by its worker thread.
pub struct NativeStream {
    device: Device,
    commands: mpsc::Sender<Command>,
    worker: Option<JoinHandle<()>>,
    capture_mode: CaptureMode,
}

impl NativeStream {
    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn capture_mode(&self) -> CaptureMode {
        self.capture_mode
    }

    fn request<T>(
        &self,
        build: impl FnOnce(mpsc::Sender<T>) -> Command,
    ) -> Result<T, CameraError> {
        let (respond_to, response) = mpsc::channel();
        self.commands
            .send(build(respond_to))
            .map_err(|_| CameraError::Query("Camera thread has stopped".to_string()))?;
        response
            .recv_timeout(QUERY_TIMEOUT)
            .map_err(|e| CameraError::Query(format!("Camera thread did not answer: {}", e)))
    }
}

impl CapabilitySource for NativeStream {
    fn pixel_format_codes(&mut self) -> Result<Vec<u32>, CameraError> {
        self.request(|respond_to| Command::PixelFormatCodes { respond_to })?
    }

    fn format_entries(&mut self) -> Result<Vec<RawFormat>, CameraError> {
        self.request(|respond_to| Command::FormatEntries { respond_to })?
    }
}

impl CameraStream for NativeStream {
    fn set_capture_mode(&mut self, mode: CaptureMode) -> Result<(), CameraError> {
        // nokhwa has no capture-mode switch; the mode only shapes how the
        // session is used.
        self.capture_mode = mode;
        Ok(())
    }

    fn start(&mut self) -> Result<(), CameraError> {
        self.commands
            .send(Command::Start)
            .map_err(|_| CameraError::DeviceStart("Camera thread has stopped".to_string()))
    }

    fn unload(&mut self) -> Result<(), CameraError> {
        if let Some(worker) = self.worker.take() {
            let _ = self.commands.send(Command::Shutdown);
            if worker.join().is_err() {
                log::error!("Camera thread for {} panicked", self.device);
            }
        }
        Ok(())
    }

    fn viewfinder_settings(&self) -> Result<ViewfinderSettings, CameraError> {
        self.request(|respond_to| Command::Viewfinder { respond_to })
    }

    fn set_viewfinder_settings(
        &mut self,
        settings: ViewfinderSettings,
    ) -> Result<(), CameraError> {
        self.request(|respond_to| Command::Configure {
            settings,
            respond_to,
        })?
    }
}

impl Drop for NativeStream {
    fn drop(&mut self) {
        let _ = self.unload();
    }
}

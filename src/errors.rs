use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    #[error("No camera device available")]
    NoDeviceAvailable,
    #[error("Camera device not found: {0}")]
    DeviceNotFound(String),
    #[error("Unknown pixel format code: {0}")]
    UnknownPixelFormat(u32),
    #[error("Unknown pixel format name: {0}")]
    UnknownPixelFormatName(String),
    #[error("No active camera session")]
    NoActiveSession,
    #[error("Camera device is not active: {0}")]
    DeviceNotActive(String),
    #[error("Camera start error: {0}")]
    DeviceStart(String),
    #[error("Camera enumeration error: {0}")]
    Enumeration(String),
    #[error("Capability query error: {0}")]
    Query(String),
    #[error("Viewfinder configuration error: {0}")]
    Configuration(String),
    #[error("Config error: {0}")]
    Config(String),
}

impl CameraError {
    /// Errors that mean the requested thing is simply absent, as opposed to
    /// a driver or table failure.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CameraError::NoDeviceAvailable | CameraError::DeviceNotFound(_)
        )
    }
}

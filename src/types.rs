//! Core value types shared by the registry, the catalog and the backends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One camera source as the OS reports it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Device {
    /// Human-readable description, used for lookup by name
    pub description: String,
    /// Opaque backend identifier
    pub handle: String,
}

impl Device {
    pub fn new(description: impl Into<String>, handle: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            handle: handle.into(),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Parse the `WIDTHxHEIGHT` form used on the command line.
    pub fn parse(text: &str) -> Option<Self> {
        let (w, h) = text.trim().split_once(['x', 'X'])?;
        let width = w.trim().parse().ok()?;
        let height = h.trim().parse().ok()?;
        Some(Self::new(width, height))
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl From<(u32, u32)> for Resolution {
    fn from((width, height): (u32, u32)) -> Self {
        Self::new(width, height)
    }
}

/// Frame rate rounded to one decimal place.
///
/// Drivers report near-duplicate rates (29.97 vs 30.0 vs 30.04); keeping the
/// value as whole tenths makes those collapse into one hashable, ordered key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameRate {
    tenths: i64,
}

impl FrameRate {
    /// Round to the nearest tenth of the exact binary value, ties to even.
    ///
    /// `hz * 10.0` would round twice and push 29.95 (stored just below the
    /// tie) up to 30.0, so the tenths come from the correctly rounded decimal
    /// rendering instead.
    pub fn from_hz(hz: f64) -> Self {
        let tenths = format!("{:.1}", hz)
            .replace('.', "")
            .parse::<i64>()
            .unwrap_or_else(|_| (hz * 10.0).round() as i64);
        Self { tenths }
    }

    pub const fn from_tenths(tenths: i64) -> Self {
        Self { tenths }
    }

    pub fn tenths(&self) -> i64 {
        self.tenths
    }

    pub fn as_hz(&self) -> f64 {
        self.tenths as f64 / 10.0
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}", self.as_hz())
    }
}

impl Serialize for FrameRate {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_hz())
    }
}

impl<'de> Deserialize<'de> for FrameRate {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        f64::deserialize(deserializer).map(FrameRate::from_hz)
    }
}

/// One supported configuration exactly as the driver lists it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawFormat {
    pub width: u32,
    pub height: u32,
    pub max_frame_rate: f64,
    pub pixel_format_code: u32,
}

impl RawFormat {
    pub fn new(width: u32, height: u32, max_frame_rate: f64, pixel_format_code: u32) -> Self {
        Self {
            width,
            height,
            max_frame_rate,
            pixel_format_code,
        }
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

/// Settings currently governing a session's output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewfinderSettings {
    pub resolution: Resolution,
    pub min_frame_rate: f64,
    pub max_frame_rate: f64,
    pub pixel_format_code: Option<u32>,
}

impl ViewfinderSettings {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            min_frame_rate: 0.0,
            max_frame_rate: 0.0,
            pixel_format_code: None,
        }
    }

    pub fn with_frame_rate(mut self, frame_rate: f64) -> Self {
        self.min_frame_rate = frame_rate;
        self.max_frame_rate = frame_rate;
        self
    }

    pub fn with_pixel_format_code(mut self, code: u32) -> Self {
        self.pixel_format_code = Some(code);
        self
    }
}

impl fmt::Display for ViewfinderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @ {:.1}-{:.1} fps",
            self.resolution, self.min_frame_rate, self.max_frame_rate
        )?;
        match self.pixel_format_code {
            Some(code) => match crate::pixel_format::name_of(code) {
                Ok(format) => write!(f, " ({})", format),
                Err(_) => write!(f, " (code {})", code),
            },
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureMode {
    StillImage,
    Video,
}

/// A frame delivered to an output sink.
#[derive(Debug, Clone)]
pub struct PreviewFrame {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub pixel_format_code: Option<u32>,
    pub data: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Platform {
    Windows,
    MacOS,
    Linux,
    Unknown,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOS
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else {
            Platform::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::MacOS => "macos",
            Platform::Linux => "linux",
            Platform::Unknown => "unknown",
        }
    }
}

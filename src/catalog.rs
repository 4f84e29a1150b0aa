//! Capability catalog: what a device can do, and pushing a choice back.
//!
//! Nothing here is cached. Every call asks the device again, because what a
//! driver reports can depend on the format it is currently in.

use crate::errors::CameraError;
use crate::pixel_format::{self, PixelFormat};
use crate::platform::{CameraBackend, CameraStream, CapabilitySource};
use crate::registry::DeviceRegistry;
use crate::types::{Device, FrameRate, RawFormat, Resolution, ViewfinderSettings};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};

/// Supported settings grouped as resolution → frame rate → pixel formats.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityIndex {
    entries: BTreeMap<Resolution, BTreeMap<FrameRate, BTreeSet<PixelFormat>>>,
}

impl CapabilityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, resolution: Resolution, rate: FrameRate, format: PixelFormat) {
        self.entries
            .entry(resolution)
            .or_default()
            .entry(rate)
            .or_default()
            .insert(format);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct resolutions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn resolutions(&self) -> impl Iterator<Item = Resolution> + '_ {
        self.entries.keys().copied()
    }

    pub fn frame_rates(&self, resolution: Resolution) -> Vec<FrameRate> {
        self.entries
            .get(&resolution)
            .map(|rates| rates.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn pixel_formats(&self, resolution: Resolution, rate: FrameRate) -> Vec<PixelFormat> {
        self.entries
            .get(&resolution)
            .and_then(|rates| rates.get(&rate))
            .map(|formats| formats.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, resolution: Resolution, rate: FrameRate, format: PixelFormat) -> bool {
        self.entries
            .get(&resolution)
            .and_then(|rates| rates.get(&rate))
            .map(|formats| formats.contains(&format))
            .unwrap_or(false)
    }

    pub fn get(&self, resolution: Resolution) -> Option<&BTreeMap<FrameRate, BTreeSet<PixelFormat>>> {
        self.entries.get(&resolution)
    }

    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (&Resolution, &BTreeMap<FrameRate, BTreeSet<PixelFormat>>)> {
        self.entries.iter()
    }
}

struct RateTable<'a>(&'a BTreeMap<FrameRate, BTreeSet<PixelFormat>>);

impl Serialize for RateTable<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (rate, formats) in self.0 {
            map.serialize_entry(&rate.to_string(), formats)?;
        }
        map.end()
    }
}

/// Serialized with string keys (`"640x480"`, `"30.0"`) so it maps onto JSON.
impl Serialize for CapabilityIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (resolution, rates) in &self.entries {
            map.serialize_entry(&resolution.to_string(), &RateTable(rates))?;
        }
        map.end()
    }
}

/// The first setting a device lists. A convenience default, not a ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PreferredSetting {
    pub resolution: Resolution,
    pub frame_rate: FrameRate,
    pub pixel_format: PixelFormat,
}

/// Group raw driver entries into an index and note the first entry.
///
/// An empty list is a valid device report and gives an empty index with no
/// preference. An unknown pixel-format code fails the whole build.
pub fn build_index(
    entries: &[RawFormat],
) -> Result<(CapabilityIndex, Option<PreferredSetting>), CameraError> {
    let mut index = CapabilityIndex::new();
    let mut preferred = None;

    for entry in entries {
        let resolution = entry.resolution();
        let rate = FrameRate::from_hz(entry.max_frame_rate);
        let format = pixel_format::name_of(entry.pixel_format_code)?;

        index.insert(resolution, rate, format);
        if preferred.is_none() {
            preferred = Some(PreferredSetting {
                resolution,
                frame_rate: rate,
                pixel_format: format,
            });
        }
    }

    Ok((index, preferred))
}

/// Run `query` against the active session when `device` is `None` or is the
/// active device, otherwise against a probe of `device`.
fn with_source<B, T>(
    registry: &mut DeviceRegistry<B>,
    device: Option<&Device>,
    query: impl FnOnce(&mut dyn CapabilitySource) -> Result<T, CameraError>,
) -> Result<T, CameraError>
where
    B: CameraBackend,
{
    match device {
        Some(device) if !registry.is_active(device) => {
            let mut probe = registry.backend().probe(device)?;
            query(probe.as_mut())
        }
        _ => {
            let session = registry.active_mut().ok_or(CameraError::NoActiveSession)?;
            query(session.stream_mut())
        }
    }
}

/// Symbolic pixel formats the device supports, in driver order.
pub fn supported_pixel_formats<B: CameraBackend>(
    registry: &mut DeviceRegistry<B>,
    device: Option<&Device>,
) -> Result<Vec<PixelFormat>, CameraError> {
    let codes = with_source(registry, device, |source| source.pixel_format_codes())?;
    log::debug!("Device reports pixel format codes {:?}", codes);
    codes.into_iter().map(pixel_format::name_of).collect()
}

/// The device's capability index and its first-listed setting.
pub fn supported_settings<B: CameraBackend>(
    registry: &mut DeviceRegistry<B>,
    device: Option<&Device>,
) -> Result<(CapabilityIndex, Option<PreferredSetting>), CameraError> {
    let entries = with_source(registry, device, |source| source.format_entries())?;
    log::debug!("Device reports {} format entries", entries.len());
    build_index(&entries)
}

/// Current settings of the active session.
pub fn viewfinder_settings<B: CameraBackend>(
    registry: &DeviceRegistry<B>,
) -> Result<ViewfinderSettings, CameraError> {
    registry
        .active()
        .ok_or(CameraError::NoActiveSession)?
        .viewfinder_settings()
}

/// Push new viewfinder settings to `device`'s running session and return
/// the settings that took effect.
///
/// Only the resolution is reliably honored. Frame rate and pixel format are
/// requests the driver may clamp or ignore; compare the result with the
/// request to find out.
pub fn apply_setting<B: CameraBackend>(
    registry: &mut DeviceRegistry<B>,
    device: &Device,
    resolution: Resolution,
    frame_rate: Option<f64>,
    pixel_format: Option<PixelFormat>,
) -> Result<ViewfinderSettings, CameraError> {
    if !registry.is_active(device) {
        return Err(CameraError::DeviceNotActive(device.description.clone()));
    }
    let session = registry.active_mut().ok_or(CameraError::NoActiveSession)?;
    let stream = session.stream_mut();

    let mut requested = stream.viewfinder_settings()?;
    requested.resolution = resolution;
    if let Some(rate) = frame_rate {
        requested.min_frame_rate = rate;
        requested.max_frame_rate = rate;
    }
    if let Some(format) = pixel_format {
        requested.pixel_format_code = Some(pixel_format::code_of(format));
    }

    stream.set_viewfinder_settings(requested)?;
    let effective = stream.viewfinder_settings()?;

    if effective != requested {
        log::info!(
            "Driver adjusted viewfinder settings: requested {}, got {}",
            requested,
            effective
        );
    }
    Ok(effective)
}

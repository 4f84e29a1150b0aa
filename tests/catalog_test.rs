//! Capability queries and viewfinder configuration through the registry.

use boothcam::catalog::{self, CapabilityIndex};
use boothcam::platform::NullSink;
use boothcam::testing::{LifecycleEvent, MockBackend, MockDevice};
use boothcam::{
    CameraError, DeviceRegistry, FrameRate, OutputSink, PixelFormat, RawFormat, Resolution,
};
use std::sync::Arc;

fn photobooth_camera() -> MockDevice {
    MockDevice::new("Booth Camera", "0").with_formats(vec![
        RawFormat::new(640, 480, 30.0, 30),
        RawFormat::new(640, 480, 30.0, 4),
        RawFormat::new(1280, 720, 15.0, 30),
        RawFormat::new(1280, 720, 60.0, 30),
    ])
}

fn backend() -> MockBackend {
    MockBackend::new()
        .with_device(photobooth_camera())
        .with_device(MockDevice::new("Bare Camera", "1"))
        .with_device(
            MockDevice::new("Odd Camera", "2")
                .with_formats(vec![
                    RawFormat::new(320, 240, 30.0, 4),
                    RawFormat::new(320, 240, 30.0, 22),
                ])
                .with_pixel_codes(vec![4, 22]),
        )
}

fn sink() -> Arc<dyn OutputSink> {
    Arc::new(NullSink)
}

fn started(backend: &MockBackend, description: &str) -> DeviceRegistry<MockBackend> {
    let mut registry = DeviceRegistry::new(backend.clone()).unwrap();
    registry.start(description, sink()).unwrap().unwrap();
    registry
}

#[test]
fn test_settings_of_active_session() {
    let mut registry = started(&backend(), "Booth Camera");
    let (index, preferred) = catalog::supported_settings(&mut registry, None).unwrap();

    let vga = Resolution::new(640, 480);
    let hd = Resolution::new(1280, 720);
    assert_eq!(index.resolutions().collect::<Vec<_>>(), vec![vga, hd]);
    assert_eq!(
        index.pixel_formats(vga, FrameRate::from_hz(30.0)),
        vec![PixelFormat::Rgb24, PixelFormat::Jpg]
    );
    assert_eq!(
        index.frame_rates(hd),
        vec![FrameRate::from_hz(15.0), FrameRate::from_hz(60.0)]
    );

    let preferred = preferred.unwrap();
    assert_eq!(preferred.resolution, vga);
    assert_eq!(preferred.frame_rate, FrameRate::from_hz(30.0));
    assert_eq!(preferred.pixel_format, PixelFormat::Jpg);
}

#[test]
fn test_active_device_given_explicitly_uses_the_session() {
    let backend = backend();
    let mut registry = started(&backend, "Booth Camera");
    let device = registry.devices()[0].clone();
    backend.clear_log();

    let (index, _) = catalog::supported_settings(&mut registry, Some(&device)).unwrap();
    assert_eq!(index.len(), 2);
    assert!(backend.log().is_empty());
}

#[test]
fn test_inactive_device_is_probed() {
    let backend = backend();
    let mut registry = started(&backend, "Bare Camera");
    let booth = registry.devices()[0].clone();
    backend.clear_log();

    let formats = catalog::supported_pixel_formats(&mut registry, Some(&booth)).unwrap();
    assert_eq!(formats, vec![PixelFormat::Jpg, PixelFormat::Rgb24]);
    assert_eq!(
        backend.log(),
        vec![LifecycleEvent::Probed("Booth Camera".to_string())]
    );
    assert_eq!(
        registry.active().unwrap().device().description,
        "Bare Camera"
    );
    assert_eq!(backend.streaming(), 1);
}

#[test]
fn test_probe_works_without_a_session() {
    let backend = backend();
    let mut registry = DeviceRegistry::new(backend).unwrap();
    let booth = registry.devices()[0].clone();
    let (index, preferred) = catalog::supported_settings(&mut registry, Some(&booth)).unwrap();
    assert!(!index.is_empty());
    assert!(preferred.is_some());
    assert!(registry.active().is_none());
}

#[test]
fn test_device_without_entries_has_empty_index() {
    let mut registry = started(&backend(), "Bare Camera");
    let (index, preferred) = catalog::supported_settings(&mut registry, None).unwrap();
    assert_eq!(index, CapabilityIndex::new());
    assert!(preferred.is_none());
    assert!(catalog::supported_pixel_formats(&mut registry, None)
        .unwrap()
        .is_empty());
}

#[test]
fn test_unknown_code_fails_the_query() {
    let mut registry = started(&backend(), "Odd Camera");
    assert_eq!(
        catalog::supported_pixel_formats(&mut registry, None),
        Err(CameraError::UnknownPixelFormat(22))
    );
    assert_eq!(
        catalog::supported_settings(&mut registry, None).map(|_| ()),
        Err(CameraError::UnknownPixelFormat(22))
    );
}

#[test]
fn test_queries_need_a_session_when_no_device_given() {
    let mut registry = DeviceRegistry::new(backend()).unwrap();
    assert_eq!(
        catalog::supported_pixel_formats(&mut registry, None),
        Err(CameraError::NoActiveSession)
    );
    assert_eq!(
        catalog::viewfinder_settings(&registry),
        Err(CameraError::NoActiveSession)
    );
}

#[test]
fn test_initial_viewfinder_is_first_entry() {
    let registry = started(&backend(), "Booth Camera");
    let settings = catalog::viewfinder_settings(&registry).unwrap();
    assert_eq!(settings.resolution, Resolution::new(640, 480));
    assert_eq!(settings.pixel_format_code, Some(30));
    assert_eq!(settings.to_string(), "640x480 @ 30.0-30.0 fps (JPG)");
}

#[test]
fn test_apply_setting_returns_what_took_effect() {
    let mut registry = started(&backend(), "Booth Camera");
    let device = registry.devices()[0].clone();

    let effective = catalog::apply_setting(
        &mut registry,
        &device,
        Resolution::new(1280, 720),
        Some(120.0),
        Some(PixelFormat::Rgb24),
    )
    .unwrap();

    assert_eq!(effective.resolution, Resolution::new(1280, 720));
    assert_eq!(effective.max_frame_rate, 60.0);
    assert_eq!(effective.pixel_format_code, Some(30));
    assert_eq!(catalog::viewfinder_settings(&registry).unwrap(), effective);
}

#[test]
fn test_apply_setting_keeps_format_when_not_given() {
    let mut registry = started(&backend(), "Booth Camera");
    let device = registry.devices()[0].clone();

    catalog::apply_setting(
        &mut registry,
        &device,
        Resolution::new(640, 480),
        None,
        Some(PixelFormat::Rgb24),
    )
    .unwrap();
    let effective =
        catalog::apply_setting(&mut registry, &device, Resolution::new(640, 480), Some(15.0), None)
            .unwrap();
    assert_eq!(effective.pixel_format_code, Some(4));
    assert_eq!(effective.max_frame_rate, 15.0);
}

#[test]
fn test_apply_setting_to_other_device_is_rejected() {
    let mut registry = started(&backend(), "Booth Camera");
    let bare = registry.devices()[1].clone();
    assert_eq!(
        catalog::apply_setting(&mut registry, &bare, Resolution::new(640, 480), None, None),
        Err(CameraError::DeviceNotActive("Bare Camera".to_string()))
    );
}

#[test]
fn test_apply_unsupported_resolution_leaves_settings() {
    let mut registry = started(&backend(), "Booth Camera");
    let device = registry.devices()[0].clone();
    let before = catalog::viewfinder_settings(&registry).unwrap();

    let result =
        catalog::apply_setting(&mut registry, &device, Resolution::new(1920, 1080), None, None);
    assert!(matches!(result, Err(CameraError::Configuration(_))));
    assert_eq!(catalog::viewfinder_settings(&registry).unwrap(), before);
}

#[test]
fn test_index_serializes_for_reports() {
    let mut registry = started(&backend(), "Booth Camera");
    let (index, _) = catalog::supported_settings(&mut registry, None).unwrap();
    let json = serde_json::to_value(&index).unwrap();
    assert_eq!(json["640x480"]["30.0"], serde_json::json!(["RGB24", "JPG"]));
    assert_eq!(json["1280x720"]["60.0"], serde_json::json!(["JPG"]));
}

#[test]
fn test_half_tenth_rates_keep_their_own_bucket() {
    let backend = MockBackend::new().with_device(MockDevice::new("NTSC Camera", "0").with_formats(vec![
        RawFormat::new(720, 480, 29.95, 30),
        RawFormat::new(720, 480, 30.0, 4),
        RawFormat::new(720, 480, 14.95, 30),
    ]));
    let mut registry = started(&backend, "NTSC Camera");
    let (index, preferred) = catalog::supported_settings(&mut registry, None).unwrap();

    let sd = Resolution::new(720, 480);
    assert_eq!(
        index.frame_rates(sd),
        vec![
            FrameRate::from_tenths(149),
            FrameRate::from_tenths(299),
            FrameRate::from_tenths(300),
        ]
    );
    assert_eq!(
        index.pixel_formats(sd, FrameRate::from_tenths(299)),
        vec![PixelFormat::Jpg]
    );
    assert_eq!(preferred.unwrap().frame_rate.to_string(), "29.9");
}

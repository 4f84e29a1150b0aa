use anyhow::{anyhow, bail, Context, Result};
use boothcam::catalog;
use boothcam::{
    BoothConfig, CameraBackend, CameraError, DeviceRegistry, DeviceSelector, NativeBackend,
    OutputSink, PixelFormat, PreviewFrame, Resolution,
};
use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

const USAGE: &str = "Usage: boothcam-cli <command> [args]

Commands:
  list                          List cameras, marking the default
  formats [device]              Supported pixel formats
  settings [device] [--json]    Supported resolution / frame rate / format index
  preview [device] [--resolution WxH] [--fps F] [--format NAME]
                                Start a camera and report errors until Ctrl-C

[device] is a camera description or its number from `list`.
Options: --config <path>";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    };

    let config = match option_value(&args, "--config") {
        Some(path) => BoothConfig::load_from_file(path)?,
        None => BoothConfig::load_or_default(),
    };
    config.validate().map_err(|e| anyhow!("Invalid config: {}", e))?;
    boothcam::init_logging_with(&config.logging.filter);

    let backend = NativeBackend::from_name(&config.camera.backend)?;
    let mut registry = DeviceRegistry::new(backend)?;

    let result = match command.as_str() {
        "list" => cmd_list(&registry),
        "formats" => cmd_formats(&mut registry, &args),
        "settings" => cmd_settings(&mut registry, &args),
        "preview" => cmd_preview(&mut registry, &args, &config).await,
        _ => {
            eprintln!("Unknown command: {}\n\n{}", command, USAGE);
            std::process::exit(1);
        }
    };

    if let Err(e) = &result {
        if e.downcast_ref::<CameraError>().map_or(false, CameraError::is_not_found) {
            eprintln!("Run `boothcam-cli list` to see the connected cameras.");
        }
    }
    result
}

fn option_value<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

/// First positional argument after the command, skipping options and their
/// values.
fn device_arg(args: &[String]) -> Option<&str> {
    let mut rest = args.iter().skip(1);
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--json" => {}
            a if a.starts_with("--") => {
                rest.next();
            }
            a => return Some(a),
        }
    }
    None
}

/// A 1-based number picks by position, anything else by description.
fn selector_for(arg: &str) -> DeviceSelector {
    match arg.parse::<usize>() {
        Ok(n) if n > 0 => DeviceSelector::Index(n - 1),
        _ => DeviceSelector::Description(arg.to_string()),
    }
}

fn resolve_target(
    registry: &DeviceRegistry<NativeBackend>,
    arg: Option<&str>,
    configured: Option<&str>,
) -> Result<boothcam::Device> {
    match arg.or(configured) {
        Some(name) => Ok(registry.find(&selector_for(name))?),
        None => Ok(registry.default_device()?.clone()),
    }
}

fn cmd_list(registry: &DeviceRegistry<NativeBackend>) -> Result<()> {
    let default = registry.default_device().ok();
    println!("Camera list:");
    for (i, (description, device)) in registry.list_devices().enumerate() {
        let marker = if Some(device) == default { " (default)" } else { "" };
        println!("{} {}{}", i + 1, description, marker);
    }
    Ok(())
}

fn cmd_formats(registry: &mut DeviceRegistry<NativeBackend>, args: &[String]) -> Result<()> {
    let device = resolve_target(registry, device_arg(args), None)?;
    let formats = catalog::supported_pixel_formats(registry, Some(&device))?;
    for format in formats {
        println!("{}", format);
    }
    Ok(())
}

fn cmd_settings(registry: &mut DeviceRegistry<NativeBackend>, args: &[String]) -> Result<()> {
    let device = resolve_target(registry, device_arg(args), None)?;
    let (index, preferred) = catalog::supported_settings(registry, Some(&device))?;

    if args.iter().any(|a| a == "--json") {
        let report = serde_json::json!({
            "device": device,
            "settings": index,
            "preferred": preferred,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", device);
    for (resolution, rates) in index.iter() {
        for (rate, formats) in rates {
            let names: Vec<&str> = formats.iter().map(PixelFormat::as_str).collect();
            println!("  {} {} fps  {}", resolution, rate, names.join(", "));
        }
    }
    match preferred {
        Some(p) => println!(
            "Preferred: {} {} fps {}",
            p.resolution, p.frame_rate, p.pixel_format
        ),
        None => println!("Preferred: none (device reports no settings)"),
    }
    Ok(())
}

/// Resolution to push: the requested one, or the current one when only a
/// frame rate or pixel format was asked for. `None` means nothing to push.
fn target_resolution<B: CameraBackend>(
    registry: &DeviceRegistry<B>,
    resolution: Option<Resolution>,
    frame_rate: Option<f64>,
    pixel_format: Option<PixelFormat>,
) -> Result<Option<Resolution>, CameraError> {
    match resolution {
        Some(resolution) => Ok(Some(resolution)),
        None if frame_rate.is_some() || pixel_format.is_some() => {
            Ok(Some(catalog::viewfinder_settings(registry)?.resolution))
        }
        None => Ok(None),
    }
}

/// Counts frames without keeping them.
#[derive(Default)]
struct FrameCounter {
    frames: AtomicU64,
}

impl OutputSink for FrameCounter {
    fn present(&self, _frame: PreviewFrame) {
        self.frames.fetch_add(1, Ordering::Relaxed);
    }
}

async fn cmd_preview(
    registry: &mut DeviceRegistry<NativeBackend>,
    args: &[String],
    config: &BoothConfig,
) -> Result<()> {
    let device = resolve_target(registry, device_arg(args), config.camera.device.as_deref())?;
    let mut errors = registry.subscribe_errors();
    let counter = Arc::new(FrameCounter::default());

    if registry.start(&device, counter.clone())?.is_none() {
        bail!("Camera not found: {}", device);
    }
    println!("Started {}", device);
    println!("Viewfinder: {}", catalog::viewfinder_settings(registry)?);

    let resolution = match option_value(args, "--resolution") {
        Some(text) => Some(
            Resolution::parse(text).ok_or_else(|| anyhow!("Invalid resolution: {}", text))?,
        ),
        None => config.viewfinder.resolution(),
    };
    let frame_rate = match option_value(args, "--fps") {
        Some(text) => Some(text.parse::<f64>().context("Invalid frame rate")?),
        None => config.viewfinder.frame_rate,
    };
    let pixel_format = match option_value(args, "--format") {
        Some(text) => Some(text.parse::<PixelFormat>()?),
        None => config.viewfinder.pixel_format()?,
    };

    if let Some(resolution) = target_resolution(registry, resolution, frame_rate, pixel_format)? {
        let effective =
            catalog::apply_setting(registry, &device, resolution, frame_rate, pixel_format)?;
        println!("Viewfinder: {}", effective);
    }

    println!("Press Ctrl-C to stop");
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            event = errors.recv() => match event {
                Ok(event) => eprintln!("Camera error: {}", event),
                Err(RecvError::Lagged(missed)) => {
                    log::warn!("Missed {} camera error notifications", missed)
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    registry.stop();
    println!(
        "Previewed {} frames",
        counter.frames.load(Ordering::Relaxed)
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use boothcam::platform::NullSink;
    use boothcam::testing::{MockBackend, MockDevice};
    use boothcam::RawFormat;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_device_arg_skips_options() {
        let a = args(&["preview", "--resolution", "640x480", "USB Camera"]);
        assert_eq!(device_arg(&a), Some("USB Camera"));
        let a = args(&["settings", "--json"]);
        assert_eq!(device_arg(&a), None);
    }

    #[test]
    fn test_selector_numbers_are_one_based() {
        assert_eq!(selector_for("1"), DeviceSelector::Index(0));
        assert_eq!(
            selector_for("0"),
            DeviceSelector::Description("0".to_string())
        );
        assert_eq!(
            selector_for("FaceTime HD"),
            DeviceSelector::Description("FaceTime HD".to_string())
        );
    }

    fn registry_with_booth_camera() -> DeviceRegistry<MockBackend> {
        let backend = MockBackend::new().with_device(
            MockDevice::new("Booth Camera", "0").with_formats(vec![
                RawFormat::new(1280, 720, 30.0, 30),
                RawFormat::new(1280, 720, 15.0, 4),
            ]),
        );
        DeviceRegistry::new(backend).unwrap()
    }

    #[test]
    fn test_rate_or_format_alone_targets_current_resolution() {
        let mut registry = registry_with_booth_camera();
        registry.start(0usize, Arc::new(NullSink)).unwrap();
        let current = Resolution::new(1280, 720);

        assert_eq!(
            target_resolution(&registry, None, Some(15.0), None),
            Ok(Some(current))
        );
        assert_eq!(
            target_resolution(&registry, None, None, Some(PixelFormat::Rgb24)),
            Ok(Some(current))
        );
        assert_eq!(target_resolution(&registry, None, None, None), Ok(None));

        let requested = Resolution::new(640, 480);
        assert_eq!(
            target_resolution(&registry, Some(requested), Some(15.0), None),
            Ok(Some(requested))
        );
    }

    #[test]
    fn test_rate_alone_needs_a_running_camera() {
        let registry = registry_with_booth_camera();
        assert_eq!(
            target_resolution(&registry, None, Some(15.0), None),
            Err(CameraError::NoActiveSession)
        );
    }

    #[test]
    fn test_option_value() {
        let a = args(&["preview", "--fps", "15"]);
        assert_eq!(option_value(&a, "--fps"), Some("15"));
        assert_eq!(option_value(&a, "--format"), None);
    }
}

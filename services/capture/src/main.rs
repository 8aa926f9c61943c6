//! Scan capture tool
//!
//! ```text
//! scan-capture list                   list captures under output_root
//! scan-capture demo <name> [frames]   write synthetic frames into a new capture
//! ```
//!
//! Configuration is loaded from `config/capture` and `CAPTURE__*` environment
//! variables. See `config.rs`.

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use scan_capture::{
    CameraState, CaptureConfig, CaptureLibrary, CaptureSession, ColorImage, Dimensions,
    FrameChannels, LimitedReason, LoggingConfig, PlaneBuffer, SessionSettings, TrackingState,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_DEMO_FRAMES: u32 = 24;

#[tokio::main]
async fn main() -> Result<()> {
    let config = CaptureConfig::load().context("Failed to load capture configuration")?;
    init_logging(&config.logging)?;
    config.validate().context("Invalid capture configuration")?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("list") => list(&config),
        Some("demo") => {
            let Some(name) = args.get(1) else {
                bail!("usage: scan-capture demo <name> [frames]");
            };
            let frames = match args.get(2) {
                Some(raw) => raw
                    .parse::<u32>()
                    .context("frames must be a non-negative integer")?,
                None => DEFAULT_DEMO_FRAMES,
            };
            demo(&config, name, frames).await
        }
        _ => bail!("usage: scan-capture list | scan-capture demo <name> [frames]"),
    }
}

fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("scan_capture={}", config.level)))
        .context("Invalid log filter")?;

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber.with(fmt::layer().pretty()).init();
    }

    Ok(())
}

fn list(config: &CaptureConfig) -> Result<()> {
    let library = CaptureLibrary::new(&config.output_root);
    let captures = library.list_captures().context("Failed to list captures")?;

    if captures.is_empty() {
        info!(root = %config.output_root.display(), "No captures found");
    }
    for capture in captures {
        println!(
            "{}\t{}\t{}",
            capture.created_at.to_rfc3339(),
            capture.name,
            capture.path.display()
        );
    }
    Ok(())
}

async fn demo(config: &CaptureConfig, name: &str, frames: u32) -> Result<()> {
    let library = CaptureLibrary::new(&config.output_root);
    let directory = library
        .make_capture_directory(name)
        .context("Failed to create capture directory")?;

    let session = CaptureSession::start(&directory, SessionSettings::from(config))
        .context("Failed to start capture session")?;

    info!(
        service = "scan-capture",
        version = env!("CARGO_PKG_VERSION"),
        directory = %directory.display(),
        frames,
        "Writing synthetic capture"
    );

    let mut completions = Vec::with_capacity(frames as usize);
    for step in 0..frames {
        completions.push(session.submit(synthetic_frame(step, frames)).await?);
    }

    for completion in completions {
        match completion.await {
            Ok(Ok(receipt)) if !receipt.dropped.is_empty() => {
                warn!(index = receipt.index, dropped = ?receipt.dropped, "Frame written with gaps");
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => error!(error = %e, "Frame write failed"),
            Err(_) => error!("Capture worker stopped before reporting"),
        }
    }

    let stats = session.shutdown().await;
    info!(
        frames_written = stats.frames_written,
        frames_failed = stats.frames_failed,
        channels_dropped = stats.channels_dropped,
        "Synthetic capture complete"
    );
    Ok(())
}

/// One frame of a camera orbiting a small cube of feature points.
fn synthetic_frame(step: u32, total: u32) -> FrameChannels {
    const COLOR: (u32, u32) = (64, 48);
    const DEPTH: (u32, u32) = (32, 24);

    let angle = step as f32 / total.max(1) as f32 * std::f32::consts::TAU;

    let mut rgb = Vec::with_capacity((COLOR.0 * COLOR.1 * 3) as usize);
    for y in 0..COLOR.1 {
        for x in 0..COLOR.0 {
            rgb.push((x * 4) as u8);
            rgb.push((y * 5) as u8);
            rgb.push((step * 10) as u8);
        }
    }

    let mut depth = Vec::with_capacity((DEPTH.0 * DEPTH.1 * 4) as usize);
    for y in 0..DEPTH.1 {
        for x in 0..DEPTH.0 {
            let meters = 0.5 + (x + y) as f32 * 0.01;
            depth.extend_from_slice(&meters.to_le_bytes());
        }
    }

    let confidence = vec![2u8; (DEPTH.0 * DEPTH.1) as usize];

    // Feature points only once tracking has settled
    let points = if step < 2 {
        Vec::new()
    } else {
        let mut points = Vec::new();
        for i in 0..8 {
            let corner = |bit: u32| if i & bit == 0 { -0.1 } else { 0.1 };
            points.push([corner(1), corner(2), corner(4)]);
        }
        points
    };

    let tracking = if step < 2 {
        TrackingState::Limited(LimitedReason::Initializing)
    } else {
        TrackingState::Normal
    };

    let (sin, cos) = angle.sin_cos();
    let camera = CameraState {
        tracking,
        intrinsics: [[60.0, 0.0, 0.0], [0.0, 60.0, 0.0], [32.0, 24.0, 1.0]],
        image_resolution: Dimensions::new(COLOR.0, COLOR.1),
        transform: [
            [cos, 0.0, -sin, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [sin, 0.0, cos, 0.0],
            [0.5 * sin, 0.0, 0.5 * cos, 1.0],
        ],
    };

    FrameChannels {
        color: Some(ColorImage {
            width: COLOR.0,
            height: COLOR.1,
            rgb: Bytes::from(rgb),
        }),
        depth: Some(PlaneBuffer::packed(DEPTH.0, DEPTH.1, 4, Bytes::from(depth))),
        confidence: Some(PlaneBuffer::packed(
            DEPTH.0,
            DEPTH.1,
            1,
            Bytes::from(confidence),
        )),
        points,
        camera: Some(camera),
    }
}

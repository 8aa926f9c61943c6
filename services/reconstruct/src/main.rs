//! Capture directory inspector
//!
//! ```text
//! scan-reconstruct <capture_dir>
//! ```
//!
//! Probes the directory, prints the probe report as JSON, then decodes every
//! selected sample and its point cloud in turn, logging failures. Ctrl+C stops
//! between samples.
//!
//! Configuration is loaded from `config/reconstruct` and `RECONSTRUCT__*`
//! environment variables. See `config.rs`.

use anyhow::{bail, Context, Result};
use scan_capture::{read_point_cloud, LoggingConfig};
use scan_reconstruct::{FrameProber, FrameSelector, ReconstructConfig, SampleError, SampleSequence};
use std::path::PathBuf;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ReconstructConfig::load().context("Failed to load reconstruct configuration")?;
    init_logging(&config.logging)?;
    config
        .validate()
        .context("Invalid reconstruct configuration")?;

    let Some(root) = std::env::args().nth(1).map(PathBuf::from) else {
        bail!("usage: scan-reconstruct <capture_dir>");
    };

    info!(
        service = "scan-reconstruct",
        version = env!("CARGO_PKG_VERSION"),
        root = %root.display(),
        max_sample_count = config.max_sample_count,
        "Inspecting capture"
    );

    let prober =
        FrameProber::new(&root).require_completion_marker(config.require_completion_marker);
    let report = prober
        .probe_directory(&FrameSelector::new(config.max_sample_count))
        .context("Failed to probe capture directory")?;

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to encode probe report")?
    );

    if !report.has_candidates() {
        warn!("Capture directory holds no frames");
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping after the current sample");
            trigger.cancel();
        }
    });

    let sequence = SampleSequence::new(
        prober,
        report.selected_ids.clone(),
        Box::new(|index: u32, error: &SampleError| {
            warn!(index, error = %error, "Sample could not be decoded");
        }),
    )
    .with_cancellation(cancel);

    let decoded = tokio::task::spawn_blocking(move || {
        let mut decoded = 0usize;
        for sample in sequence {
            let points = match read_point_cloud(&sample.point_cloud) {
                Ok(points) => points.len(),
                Err(e) => {
                    warn!(id = sample.id, error = %e, "Point cloud could not be read");
                    0
                }
            };
            info!(
                id = sample.id,
                width = sample.image.width,
                height = sample.image.height,
                depth_width = sample.depth.width,
                depth_height = sample.depth.height,
                points,
                metadata_keys = sample.metadata.len(),
                "Sample decoded"
            );
            decoded += 1;
        }
        decoded
    })
    .await
    .context("Sample decoding task failed")?;

    info!(
        decoded,
        selected = report.selected_ids.len(),
        usable = report.usable_ids.len(),
        "Capture inspection complete"
    );
    Ok(())
}

fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            EnvFilter::try_new(format!(
                "scan_reconstruct={level},scan_capture={level}",
                level = config.level
            ))
        })
        .context("Invalid log filter")?;

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber.with(fmt::layer().pretty()).init();
    }

    Ok(())
}

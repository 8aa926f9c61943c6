//! Reconstruction job driver.
//!
//! The 3D reconstruction engine itself lives outside this crate. A job probes a
//! capture directory, hands the engine a lazy sample sequence (or the folder
//! itself when no frame is usable), and follows the engine's event stream until a
//! terminal event or cancellation.

use crate::config::ReconstructConfig;
use crate::frame_selector::FrameSelector;
use crate::prober::{FrameProber, ProbeError, ProbeReport};
use crate::sample_loader::{SampleError, SampleSequence};
pub use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use scan_capture::BoundingBox;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// How many ids each summary line shows.
const PREVIEW_IDS: usize = 5;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error("Failed to prepare output directory {path}: {source}")]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Engine rejected the request: {0}")]
    Rejected(String),
}

/// Requested model detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detail {
    Preview,
    Reduced,
    Medium,
    Full,
    Raw,
}

impl Detail {
    pub fn as_str(&self) -> &'static str {
        match self {
            Detail::Preview => "preview",
            Detail::Reduced => "reduced",
            Detail::Medium => "medium",
            Detail::Full => "full",
            Detail::Raw => "raw",
        }
    }
}

impl FromStr for Detail {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().as_str() {
            "preview" => Ok(Detail::Preview),
            "reduced" => Ok(Detail::Reduced),
            "medium" => Ok(Detail::Medium),
            "full" => Ok(Detail::Full),
            "raw" => Ok(Detail::Raw),
            other => Err(format!("unknown detail level: {other}")),
        }
    }
}

impl fmt::Display for Detail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the engine is asked to produce.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconstructionRequest {
    ModelFile {
        output: PathBuf,
        detail: Detail,
        /// Region of interest for the model
        geometry: Option<BoundingBox>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReconstructionResult {
    ModelFile { output: PathBuf },
}

/// Events emitted by the engine while processing.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconstructionEvent {
    RequestProgress { fraction: f64 },
    RequestComplete { result: ReconstructionResult },
    RequestError { message: String },
    InputComplete,
    InvalidSample { id: u32, reason: String },
    ProcessingComplete,
    ProcessingCancelled,
}

/// Input handed to the engine.
pub enum ReconstructionInput {
    /// Lazily decoded samples
    Samples(SampleSequence),
    /// The raw capture folder, used when no sample is usable
    Folder(PathBuf),
}

impl fmt::Debug for ReconstructionInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconstructionInput::Samples(_) => f.write_str("Samples(..)"),
            ReconstructionInput::Folder(path) => f.debug_tuple("Folder").field(path).finish(),
        }
    }
}

/// Downstream 3D reconstruction engine.
#[async_trait]
pub trait ReconstructionEngine: Send + Sync {
    /// Start processing. Events arrive on the returned channel.
    async fn process(
        &self,
        input: ReconstructionInput,
        request: ReconstructionRequest,
    ) -> Result<mpsc::Receiver<ReconstructionEvent>, EngineError>;

    /// Ask a running process to stop.
    async fn cancel(&self) {
        debug!("Engine does not support cancellation");
    }
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    Completed,
    Cancelled,
    Failed(String),
}

/// Result of [`ReconstructionJob::run`].
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub termination: Termination,
    pub output: PathBuf,
    pub report: ProbeReport,
    /// Frames that failed to decode, with the reason
    pub sample_failures: Vec<(u32, String)>,
}

/// One reconstruction run over a capture directory.
pub struct ReconstructionJob {
    capture_dir: PathBuf,
    selector: FrameSelector,
    require_completion_marker: bool,
    output_dir_name: String,
    detail: Detail,
}

impl ReconstructionJob {
    pub fn new(capture_dir: impl Into<PathBuf>, config: &ReconstructConfig) -> Self {
        Self {
            capture_dir: capture_dir.into(),
            selector: FrameSelector::new(config.max_sample_count),
            require_completion_marker: config.require_completion_marker,
            output_dir_name: config.output_dir_name.clone(),
            detail: config.detail.parse().unwrap_or(Detail::Reduced),
        }
    }

    pub fn capture_dir(&self) -> &Path {
        &self.capture_dir
    }

    /// Run the job to a terminal event.
    #[instrument(skip(self, engine, cancel), fields(capture_dir = %self.capture_dir.display()))]
    pub async fn run<E>(
        &self,
        engine: &E,
        cancel: CancellationToken,
    ) -> Result<JobOutcome, EngineError>
    where
        E: ReconstructionEngine + ?Sized,
    {
        let prober = FrameProber::new(&self.capture_dir)
            .require_completion_marker(self.require_completion_marker);
        let report = prober.probe_directory(&self.selector)?;
        log_summary(&report);

        let output = self.prepare_output()?;
        let failures: Arc<Mutex<Vec<(u32, String)>>> = Arc::new(Mutex::new(Vec::new()));

        let (input, geometry) = if report.usable_ids.is_empty() {
            warn!(
                has_candidates = report.has_candidates(),
                "No usable samples, falling back to folder input"
            );
            (ReconstructionInput::Folder(self.capture_dir.clone()), None)
        } else {
            let sink = failures.clone();
            let sequence = SampleSequence::new(
                prober,
                report.selected_ids.clone(),
                Box::new(move |index: u32, error: &SampleError| {
                    sink.lock().push((index, error.to_string()));
                }),
            )
            .with_cancellation(cancel.clone());
            (ReconstructionInput::Samples(sequence), report.aggregate_bbox)
        };

        let request = ReconstructionRequest::ModelFile {
            output: output.clone(),
            detail: self.detail,
            geometry,
        };
        info!(
            output = %output.display(),
            detail = %self.detail,
            ?input,
            "Submitting reconstruction request"
        );

        let mut events = engine.process(input, request).await?;
        let termination = follow_events(engine, &mut events, &cancel).await;

        info!(termination = ?termination, "Reconstruction finished");

        let sample_failures = std::mem::take(&mut *failures.lock());
        Ok(JobOutcome {
            termination,
            output,
            report,
            sample_failures,
        })
    }

    fn prepare_output(&self) -> Result<PathBuf, EngineError> {
        let directory = self.capture_dir.join(&self.output_dir_name);
        std::fs::create_dir_all(&directory).map_err(|source| EngineError::OutputDirectory {
            path: directory.clone(),
            source,
        })?;

        let timestamp = Utc::now().format("%Y-%m-%dT%H-%M-%SZ");
        Ok(directory.join(format!("Model_{}_{}.usdz", timestamp, self.detail)))
    }
}

async fn follow_events<E>(
    engine: &E,
    events: &mut mpsc::Receiver<ReconstructionEvent>,
    cancel: &CancellationToken,
) -> Termination
where
    E: ReconstructionEngine + ?Sized,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Cancellation requested");
                engine.cancel().await;
                return Termination::Cancelled;
            }
            event = events.recv() => {
                match event {
                    Some(ReconstructionEvent::RequestProgress { fraction }) => {
                        debug!(progress = fraction, "Reconstruction progress");
                    }
                    Some(ReconstructionEvent::RequestComplete { result }) => {
                        info!(result = ?result, "Request complete");
                    }
                    Some(ReconstructionEvent::RequestError { message }) => {
                        warn!(error = %message, "Request failed");
                        return Termination::Failed(message);
                    }
                    Some(ReconstructionEvent::InputComplete) => {
                        info!("Engine consumed all input");
                    }
                    Some(ReconstructionEvent::InvalidSample { id, reason }) => {
                        warn!(id, reason = %reason, "Engine rejected sample");
                    }
                    Some(ReconstructionEvent::ProcessingComplete) => {
                        return Termination::Completed;
                    }
                    Some(ReconstructionEvent::ProcessingCancelled) => {
                        return Termination::Cancelled;
                    }
                    None => {
                        return Termination::Failed(
                            "event stream closed before completion".to_string(),
                        );
                    }
                }
            }
        }
    }
}

fn log_summary(report: &ProbeReport) {
    let bbox = report
        .aggregate_bbox
        .map(|bbox| {
            format!(
                "min={:?} max={:?} extent={:?}",
                bbox.min,
                bbox.max,
                bbox.extent()
            )
        })
        .unwrap_or_else(|| "none".to_string());

    info!(
        used = report.usable_ids.len(),
        total = report.total_candidates,
        selected = report.selected_ids.len(),
        dropped = report.dropped_ids.len(),
        dropped_preview = %ProbeReport::preview(&report.dropped_ids, PREVIEW_IDS),
        missing_depth = %ProbeReport::preview(&report.missing_depth_ids, PREVIEW_IDS),
        missing_lidar = %ProbeReport::preview(&report.missing_pointcloud_ids, PREVIEW_IDS),
        bounding_box = %bbox,
        "Loaded capture samples"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use scan_capture::{ColorImage, FrameChannels, FrameWriter, PlaneBuffer, WriterSettings};

    /// Records what it was given and replays a fixed script of events.
    struct ScriptedEngine {
        script: Vec<ReconstructionEvent>,
        keep_open: bool,
        consumed: Arc<Mutex<Vec<u32>>>,
        requests: Arc<Mutex<Vec<(String, ReconstructionRequest)>>>,
        cancelled: Arc<Mutex<bool>>,
    }

    impl ScriptedEngine {
        fn new(script: Vec<ReconstructionEvent>) -> Self {
            Self {
                script,
                keep_open: false,
                consumed: Arc::new(Mutex::new(Vec::new())),
                requests: Arc::new(Mutex::new(Vec::new())),
                cancelled: Arc::new(Mutex::new(false)),
            }
        }
    }

    #[async_trait]
    impl ReconstructionEngine for ScriptedEngine {
        async fn process(
            &self,
            input: ReconstructionInput,
            request: ReconstructionRequest,
        ) -> Result<mpsc::Receiver<ReconstructionEvent>, EngineError> {
            self.requests.lock().push((format!("{:?}", input), request));

            if let ReconstructionInput::Samples(samples) = input {
                let ids: Vec<u32> = samples.map(|sample| sample.id).collect();
                self.consumed.lock().extend(ids);
            }

            let (tx, rx) = mpsc::channel(16);
            for event in self.script.clone() {
                tx.send(event).await.unwrap();
            }
            if self.keep_open {
                tokio::spawn(async move {
                    tx.closed().await;
                });
            }
            Ok(rx)
        }

        async fn cancel(&self) {
            *self.cancelled.lock() = true;
        }
    }

    fn frame(with_points: bool) -> FrameChannels {
        let depth: Vec<u8> = (0..4).flat_map(|_| 2.0f32.to_le_bytes()).collect();
        FrameChannels {
            color: Some(ColorImage {
                width: 2,
                height: 2,
                rgb: Bytes::from(vec![10u8; 12]),
            }),
            depth: Some(PlaneBuffer::packed(2, 2, 4, Bytes::from(depth))),
            points: if with_points {
                vec![[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]]
            } else {
                Vec::new()
            },
            ..Default::default()
        }
    }

    fn capture(dir: &Path, frames: &[bool]) {
        let writer = FrameWriter::new(dir, WriterSettings::default()).unwrap();
        for (index, with_points) in frames.iter().enumerate() {
            writer.write_frame(index as u32, &frame(*with_points)).unwrap();
        }
    }

    fn completion_script() -> Vec<ReconstructionEvent> {
        vec![
            ReconstructionEvent::RequestProgress { fraction: 0.5 },
            ReconstructionEvent::InputComplete,
            ReconstructionEvent::RequestComplete {
                result: ReconstructionResult::ModelFile {
                    output: PathBuf::from("model.usdz"),
                },
            },
            ReconstructionEvent::ProcessingComplete,
        ]
    }

    #[test]
    fn test_detail_parsing() {
        assert_eq!("reduced".parse::<Detail>(), Ok(Detail::Reduced));
        assert_eq!("FULL".parse::<Detail>(), Ok(Detail::Full));
        assert!("ultra".parse::<Detail>().is_err());
        assert_eq!(Detail::Medium.to_string(), "medium");
    }

    #[tokio::test]
    async fn test_job_feeds_samples_and_completes() {
        let dir = tempfile::tempdir().unwrap();
        capture(dir.path(), &[true, false, true]);

        let engine = ScriptedEngine::new(completion_script());
        let job = ReconstructionJob::new(dir.path(), &ReconstructConfig::default());
        let outcome = job.run(&engine, CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.termination, Termination::Completed);
        assert_eq!(*engine.consumed.lock(), vec![0, 2]);
        assert!(outcome.sample_failures.is_empty());
        assert_eq!(outcome.report.usable_ids, vec![0, 2]);

        let requests = engine.requests.lock();
        let (input, ReconstructionRequest::ModelFile { output, detail, geometry }) = &requests[0];
        assert!(input.starts_with("Samples"));
        assert_eq!(*detail, Detail::Reduced);
        assert_eq!(
            *geometry,
            Some(BoundingBox::new([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]))
        );
        assert_eq!(output, &outcome.output);

        let name = output.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("Model_") && name.ends_with("_reduced.usdz"));
        assert!(output.parent().unwrap().ends_with("ReconstructionOutput"));
        assert!(output.parent().unwrap().is_dir());
    }

    #[tokio::test]
    async fn test_no_usable_samples_falls_back_to_folder() {
        let dir = tempfile::tempdir().unwrap();
        capture(dir.path(), &[false, false]);

        let engine = ScriptedEngine::new(completion_script());
        let job = ReconstructionJob::new(dir.path(), &ReconstructConfig::default());
        let outcome = job.run(&engine, CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.termination, Termination::Completed);
        assert!(outcome.report.has_candidates());

        let requests = engine.requests.lock();
        let (input, ReconstructionRequest::ModelFile { geometry, .. }) = &requests[0];
        assert!(input.starts_with("Folder"));
        assert!(geometry.is_none());
    }

    #[tokio::test]
    async fn test_request_error_fails_job() {
        let dir = tempfile::tempdir().unwrap();
        capture(dir.path(), &[true]);

        let engine = ScriptedEngine::new(vec![ReconstructionEvent::RequestError {
            message: "out of memory".to_string(),
        }]);
        let job = ReconstructionJob::new(dir.path(), &ReconstructConfig::default());
        let outcome = job.run(&engine, CancellationToken::new()).await.unwrap();

        assert_eq!(
            outcome.termination,
            Termination::Failed("out of memory".to_string())
        );
    }

    #[tokio::test]
    async fn test_closed_event_stream_fails_job() {
        let dir = tempfile::tempdir().unwrap();
        capture(dir.path(), &[true]);

        let engine = ScriptedEngine::new(vec![ReconstructionEvent::InputComplete]);
        let job = ReconstructionJob::new(dir.path(), &ReconstructConfig::default());
        let outcome = job.run(&engine, CancellationToken::new()).await.unwrap();

        assert!(matches!(outcome.termination, Termination::Failed(_)));
    }

    #[tokio::test]
    async fn test_cancellation_stops_job() {
        let dir = tempfile::tempdir().unwrap();
        capture(dir.path(), &[true]);

        let mut engine = ScriptedEngine::new(vec![ReconstructionEvent::RequestProgress {
            fraction: 0.1,
        }]);
        engine.keep_open = true;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let job = ReconstructionJob::new(dir.path(), &ReconstructConfig::default());
        let outcome = job.run(&engine, cancel).await.unwrap();

        assert_eq!(outcome.termination, Termination::Cancelled);
        assert!(*engine.cancelled.lock());
    }

    #[tokio::test]
    async fn test_missing_capture_directory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ScriptedEngine::new(completion_script());
        let job = ReconstructionJob::new(dir.path().join("absent"), &ReconstructConfig::default());

        assert!(matches!(
            job.run(&engine, CancellationToken::new()).await,
            Err(EngineError::Probe(_))
        ));
    }
}

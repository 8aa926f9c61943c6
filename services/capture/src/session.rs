//! Serial capture worker.
//!
//! A session owns one [`FrameWriter`] and the frame counter for one capture
//! directory. Frames are written strictly in submission order by a single tokio
//! task; disk and compression work runs on the blocking pool so the live capture
//! loop never waits on it. Each submission gets its own completion channel.

use crate::config::CaptureConfig;
use crate::frame_writer::{FrameChannels, FrameReceipt, FrameWriter, WriteError, WriterSettings};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Completion of one submitted frame.
pub type WriteCompletion = oneshot::Receiver<Result<FrameReceipt, WriteError>>;

/// Session settings derived from the capture configuration.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub writer: WriterSettings,
    pub queue_size: usize,
}

impl From<&CaptureConfig> for SessionSettings {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            writer: WriterSettings {
                jpeg_quality: config.jpeg_quality,
                write_completion_marker: config.write_completion_marker,
                ..WriterSettings::default()
            },
            queue_size: config.queue_size,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            writer: WriterSettings::default(),
            queue_size: 32,
        }
    }
}

/// Statistics for a capture session.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    pub frames_submitted: u64,
    pub frames_written: u64,
    pub frames_failed: u64,
    pub channels_dropped: u64,
    pub last_index: Option<u32>,
    pub last_written_at: Option<DateTime<Utc>>,
}

enum Command {
    Write {
        channels: Box<FrameChannels>,
        reply: oneshot::Sender<Result<FrameReceipt, WriteError>>,
    },
    Reset {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a running capture session.
pub struct CaptureSession {
    root: PathBuf,
    commands: mpsc::Sender<Command>,
    stats: Arc<RwLock<SessionStats>>,
    worker: JoinHandle<()>,
}

impl CaptureSession {
    /// Create the capture directory and start the worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(root: impl Into<PathBuf>, settings: SessionSettings) -> Result<Self, WriteError> {
        let writer = Arc::new(FrameWriter::new(root, settings.writer)?);
        let root = writer.root().to_path_buf();
        let (commands, receiver) = mpsc::channel(settings.queue_size.max(1));
        let stats = Arc::new(RwLock::new(SessionStats::default()));

        let worker = tokio::spawn(run_worker(writer, receiver, stats.clone()));

        info!(
            root = %root.display(),
            queue_size = settings.queue_size,
            "Capture session started"
        );

        Ok(Self {
            root,
            commands,
            stats,
            worker,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get current session statistics.
    pub fn stats(&self) -> SessionStats {
        self.stats.read().clone()
    }

    /// Queue a frame, waiting for room if the queue is full.
    pub async fn submit(&self, channels: FrameChannels) -> Result<WriteCompletion, WriteError> {
        let (reply, completion) = oneshot::channel();
        self.commands
            .send(Command::Write {
                channels: Box::new(channels),
                reply,
            })
            .await
            .map_err(|_| WriteError::Shutdown)?;

        self.stats.write().frames_submitted += 1;
        Ok(completion)
    }

    /// Queue a frame without waiting. A full queue drops the frame.
    pub fn try_submit(&self, channels: FrameChannels) -> Result<WriteCompletion, WriteError> {
        let (reply, completion) = oneshot::channel();
        self.commands
            .try_send(Command::Write {
                channels: Box::new(channels),
                reply,
            })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    debug!("Capture queue full, dropping frame");
                    WriteError::QueueFull
                }
                mpsc::error::TrySendError::Closed(_) => WriteError::Shutdown,
            })?;

        self.stats.write().frames_submitted += 1;
        Ok(completion)
    }

    /// Restart frame numbering at zero once every queued frame is written.
    pub async fn reset(&self) -> Result<(), WriteError> {
        let (reply, done) = oneshot::channel();
        self.commands
            .send(Command::Reset { reply })
            .await
            .map_err(|_| WriteError::Shutdown)?;
        done.await.map_err(|_| WriteError::Shutdown)
    }

    /// Write everything still queued, then stop the worker.
    pub async fn shutdown(self) -> SessionStats {
        let CaptureSession {
            root,
            commands,
            stats,
            worker,
        } = self;
        drop(commands);

        if let Err(e) = worker.await {
            warn!(root = %root.display(), error = %e, "Capture worker ended abnormally");
        }

        let stats = stats.read().clone();
        info!(
            root = %root.display(),
            frames_written = stats.frames_written,
            frames_failed = stats.frames_failed,
            "Capture session stopped"
        );
        stats
    }
}

async fn run_worker(
    writer: Arc<FrameWriter>,
    mut commands: mpsc::Receiver<Command>,
    stats: Arc<RwLock<SessionStats>>,
) {
    let mut next_index: u32 = 0;

    while let Some(command) = commands.recv().await {
        match command {
            Command::Write { channels, reply } => {
                let index = next_index;
                next_index = next_index.wrapping_add(1);

                let task_writer = writer.clone();
                let result =
                    tokio::task::spawn_blocking(move || task_writer.write_frame(index, &channels))
                        .await
                        .unwrap_or_else(|e| Err(WriteError::WorkerFailed(e.to_string())));

                {
                    let mut stats = stats.write();
                    stats.last_index = Some(index);
                    match &result {
                        Ok(receipt) => {
                            stats.frames_written += 1;
                            stats.channels_dropped += receipt.dropped.len() as u64;
                            stats.last_written_at = Some(Utc::now());
                        }
                        Err(e) => {
                            stats.frames_failed += 1;
                            warn!(index, error = %e, "Frame write failed");
                        }
                    }
                }

                // The submitter may have stopped listening
                let _ = reply.send(result);
            }
            Command::Reset { reply } => {
                debug!(previous = next_index, "Frame counter reset");
                next_index = 0;
                let _ = reply.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_writer::ColorImage;
    use crate::layout::FrameFile;
    use bytes::Bytes;

    fn frame() -> FrameChannels {
        FrameChannels {
            color: Some(ColorImage {
                width: 4,
                height: 4,
                rgb: Bytes::from(vec![128u8; 48]),
            }),
            points: vec![[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_frames_are_numbered_in_submission_order() {
        let dir = tempfile::tempdir().unwrap();
        let session = CaptureSession::start(dir.path(), SessionSettings::default()).unwrap();

        let mut completions = Vec::new();
        for _ in 0..3 {
            completions.push(session.submit(frame()).await.unwrap());
        }

        let mut indices = Vec::new();
        for completion in completions {
            indices.push(completion.await.unwrap().unwrap().index);
        }
        assert_eq!(indices, vec![0, 1, 2]);

        let stats = session.shutdown().await;
        assert_eq!(stats.frames_submitted, 3);
        assert_eq!(stats.frames_written, 3);
        assert_eq!(stats.last_index, Some(2));

        for index in 0..3 {
            assert!(FrameFile::Image.path_in(dir.path(), index).exists());
        }
    }

    #[tokio::test]
    async fn test_reset_restarts_numbering() {
        let dir = tempfile::tempdir().unwrap();
        let session = CaptureSession::start(dir.path(), SessionSettings::default()).unwrap();

        let first = session.submit(frame()).await.unwrap();
        session.reset().await.unwrap();
        let second = session.submit(frame()).await.unwrap();

        assert_eq!(first.await.unwrap().unwrap().index, 0);
        assert_eq!(second.await.unwrap().unwrap().index, 0);

        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_try_submit_reports_full_queue() {
        let dir = tempfile::tempdir().unwrap();
        let settings = SessionSettings {
            queue_size: 1,
            ..Default::default()
        };
        let session = CaptureSession::start(dir.path(), settings).unwrap();

        // The worker cannot run before the next await on a current-thread runtime
        let accepted = session.try_submit(frame()).unwrap();
        assert!(matches!(
            session.try_submit(frame()),
            Err(WriteError::QueueFull)
        ));

        assert!(accepted.await.unwrap().is_ok());
        let stats = session.shutdown().await;
        assert_eq!(stats.frames_submitted, 1);
        assert_eq!(stats.frames_written, 1);
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue() {
        let dir = tempfile::tempdir().unwrap();
        let session = CaptureSession::start(dir.path(), SessionSettings::default()).unwrap();

        for _ in 0..4 {
            // completions dropped on purpose
            session.submit(frame()).await.unwrap();
        }
        let stats = session.shutdown().await;

        assert_eq!(stats.frames_written, 4);
        assert!(FrameFile::Metadata.path_in(dir.path(), 3).exists());
    }

    #[tokio::test]
    async fn test_start_fails_when_directory_cannot_be_created() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let result = CaptureSession::start(blocker.join("session"), SessionSettings::default());
        assert!(matches!(result, Err(WriteError::DirectoryCreation { .. })));
    }
}

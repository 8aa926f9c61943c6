//! Frame serializer: writes one frame's file set into a capture directory.
//!
//! Every present channel goes to its fixed filename (see [`crate::layout`]), then a
//! single metadata document lists what actually made it to disk. Channel writes
//! are best-effort: a failed channel is logged and left out of the metadata.
//! Compression overflow additionally fails the call once the rest of the frame
//! has been written.

use crate::bbox::BoundingBox;
use crate::codec::{self, CodecError};
use crate::layout::FrameFile;
use crate::metadata::{
    BoundingBoxData, CameraState, Dimensions, FrameInventory, MetadataBuilder, PointCloudInfo,
};
use crate::point_cloud;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Errors raised while writing a frame.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Failed to create output directory {path}: {source}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Compression failed for {channel}: {source}")]
    Compression {
        channel: &'static str,
        #[source]
        source: CodecError,
    },

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode {channel}: {message}")]
    Encode {
        channel: &'static str,
        message: String,
    },

    #[error("Invalid {channel} buffer: {message}")]
    InvalidChannel {
        channel: &'static str,
        message: String,
    },

    #[error("Capture queue full, frame dropped")]
    QueueFull,

    #[error("Capture session shut down")]
    Shutdown,

    #[error("Capture worker failed: {0}")]
    WorkerFailed(String),
}

/// Tightly packed 8-bit RGB color image.
#[derive(Debug, Clone)]
pub struct ColorImage {
    pub width: u32,
    pub height: u32,
    pub rgb: Bytes,
}

/// A single-plane pixel buffer, possibly with row padding.
#[derive(Debug, Clone)]
pub struct PlaneBuffer {
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: usize,
    pub data: Bytes,
}

impl PlaneBuffer {
    /// Buffer without row padding.
    pub fn packed(width: u32, height: u32, component_size: usize, data: Bytes) -> Self {
        Self {
            width,
            height,
            bytes_per_row: width as usize * component_size,
            data,
        }
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    fn check(&self, channel: &'static str, component_size: usize) -> Result<(), WriteError> {
        let invalid = |message: String| WriteError::InvalidChannel { channel, message };

        if self.bytes_per_row < self.width as usize * component_size {
            return Err(invalid(format!(
                "row of {} bytes cannot hold {} components",
                self.bytes_per_row, self.width
            )));
        }
        let needed = self.bytes_per_row * self.height as usize;
        if self.data.len() < needed {
            return Err(invalid(format!(
                "{} bytes supplied, {} needed",
                self.data.len(),
                needed
            )));
        }
        Ok(())
    }
}

/// Buffers extracted from one live frame. Every channel is optional.
#[derive(Debug, Clone, Default)]
pub struct FrameChannels {
    pub color: Option<ColorImage>,
    /// float32 little-endian depth in meters
    pub depth: Option<PlaneBuffer>,
    /// One byte per pixel
    pub confidence: Option<PlaneBuffer>,
    /// Raw feature points in world space; empty means none
    pub points: Vec<[f32; 3]>,
    pub camera: Option<CameraState>,
}

/// What a `write_frame` call put on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReceipt {
    pub index: u32,
    pub written: Vec<FrameFile>,
    pub dropped: Vec<FrameFile>,
    pub point_count: u64,
    pub bounding_box: Option<BoundingBox>,
}

/// Writer settings.
#[derive(Debug, Clone)]
pub struct WriterSettings {
    /// JPEG quality, 1-100
    pub jpeg_quality: u8,
    /// Write `complete_<NNNNNN>` once every other file of the frame succeeded
    pub write_completion_marker: bool,
    /// Thumbnail size advertised in every metadata document
    pub thumbnail: Option<Dimensions>,
}

impl Default for WriterSettings {
    fn default() -> Self {
        Self {
            jpeg_quality: 90,
            write_completion_marker: false,
            thumbnail: Some(Dimensions::new(320, 240)),
        }
    }
}

/// Writes frames into one capture directory.
pub struct FrameWriter {
    root: PathBuf,
    settings: WriterSettings,
    metadata: MetadataBuilder,
}

impl FrameWriter {
    /// Create a writer, creating `root` if needed.
    pub fn new(root: impl Into<PathBuf>, settings: WriterSettings) -> Result<Self, WriteError> {
        let root = root.into();
        ensure_directory(&root)?;

        let mut metadata = MetadataBuilder::new();
        if let Some(size) = settings.thumbnail {
            metadata = metadata.with_thumbnail(size);
        }

        Ok(Self {
            root,
            settings,
            metadata,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write the file set for `index`.
    #[instrument(skip(self, channels), fields(root = %self.root.display()))]
    pub fn write_frame(
        &self,
        index: u32,
        channels: &FrameChannels,
    ) -> Result<FrameReceipt, WriteError> {
        ensure_directory(&self.root)?;

        let mut frame = FrameInProgress::new(index);
        let mut inventory = FrameInventory {
            index,
            ..Default::default()
        };

        if let Some(color) = &channels.color {
            let result = self.write_image(index, color);
            if let Some(size) = frame.record(FrameFile::Image, result) {
                inventory.image = Some(Dimensions::new(color.width, color.height));
                inventory.image_file_size = Some(size);
            }
        }

        if let Some(depth) = &channels.depth {
            let result = self.write_plane(FrameFile::Depth, index, depth, 4);
            if frame.record(FrameFile::Depth, result).is_some() {
                inventory.depth = Some(depth.dimensions());
            }
        }

        if let Some(confidence) = &channels.confidence {
            let result = self.write_plane(FrameFile::Confidence, index, confidence, 1);
            if frame.record(FrameFile::Confidence, result).is_some() {
                inventory.confidence = Some(confidence.dimensions());
            }
        }

        let (point_count, bounding_box) = point_cloud::summarize(&channels.points);
        if point_count > 0 {
            let result = self.write_compressed(
                FrameFile::PointCloud,
                index,
                &point_cloud::encode_points(&channels.points),
            );
            if frame.record(FrameFile::PointCloud, result).is_some() {
                inventory.point_cloud = Some(PointCloudInfo {
                    file_name: FrameFile::PointCloud.file_name(index),
                    point_count,
                    bounding_box: bounding_box.as_ref().map(BoundingBoxData::from),
                });
            }
        }

        if let Some(camera) = &channels.camera {
            let tracking =
                self.write_document(FrameFile::Tracking, index, &camera.tracking.to_document());
            inventory.tracking = frame.record(FrameFile::Tracking, tracking).is_some();

            let calibration = self.write_document(
                FrameFile::Calibration,
                index,
                &camera.calibration_document(),
            );
            inventory.calibration = frame.record(FrameFile::Calibration, calibration).is_some();

            let transform =
                self.write_document(FrameFile::Transform, index, &camera.transform_document());
            inventory.transform = frame.record(FrameFile::Transform, transform).is_some();
        }

        let document = self.metadata.build(&inventory);
        let result = self.write_document(FrameFile::Metadata, index, &document);
        frame.record(FrameFile::Metadata, result);

        if let Some(error) = frame.fatal.take() {
            metrics::counter!("capture.frames.failed").increment(1);
            return Err(error);
        }

        if self.settings.write_completion_marker && frame.dropped.is_empty() {
            let path = FrameFile::CompletionMarker.path_in(&self.root, index);
            let result = write_file(&path, &[]);
            frame.record(FrameFile::CompletionMarker, result);
        }

        metrics::counter!("capture.frames.written").increment(1);
        debug!(
            index,
            written = frame.written.len(),
            dropped = frame.dropped.len(),
            point_count,
            "Frame written"
        );

        Ok(FrameReceipt {
            index,
            written: frame.written,
            dropped: frame.dropped,
            point_count,
            bounding_box,
        })
    }

    fn write_image(&self, index: u32, color: &ColorImage) -> Result<u64, WriteError> {
        let encode_error = |message: String| WriteError::Encode {
            channel: "image",
            message,
        };

        let rgb = RgbImage::from_raw(color.width, color.height, color.rgb.to_vec())
            .ok_or_else(|| {
                encode_error(format!(
                    "{} bytes do not form a {}x{} RGB image",
                    color.rgb.len(),
                    color.width,
                    color.height
                ))
            })?;

        let mut encoded = Vec::new();
        JpegEncoder::new_with_quality(&mut encoded, self.settings.jpeg_quality)
            .encode_image(&rgb)
            .map_err(|e| encode_error(e.to_string()))?;

        let path = FrameFile::Image.path_in(&self.root, index);
        write_file(&path, &encoded)
    }

    fn write_plane(
        &self,
        file: FrameFile,
        index: u32,
        plane: &PlaneBuffer,
        component_size: usize,
    ) -> Result<u64, WriteError> {
        plane.check(file.prefix(), component_size)?;
        let used = plane.bytes_per_row * plane.height as usize;
        self.write_compressed(file, index, &plane.data[..used])
    }

    fn write_compressed(&self, file: FrameFile, index: u32, raw: &[u8]) -> Result<u64, WriteError> {
        let compressed = codec::compress(raw).map_err(|source| WriteError::Compression {
            channel: file.prefix(),
            source,
        })?;
        write_file(&file.path_in(&self.root, index), &compressed)
    }

    fn write_document<T: Serialize>(
        &self,
        file: FrameFile,
        index: u32,
        document: &T,
    ) -> Result<u64, WriteError> {
        let encoded = codec::encode_document(document).map_err(|e| WriteError::Encode {
            channel: file.prefix(),
            message: e.to_string(),
        })?;
        write_file(&file.path_in(&self.root, index), &encoded)
    }
}

/// Per-call bookkeeping of which files landed.
struct FrameInProgress {
    index: u32,
    written: Vec<FrameFile>,
    dropped: Vec<FrameFile>,
    fatal: Option<WriteError>,
}

impl FrameInProgress {
    fn new(index: u32) -> Self {
        Self {
            index,
            written: Vec::new(),
            dropped: Vec::new(),
            fatal: None,
        }
    }

    /// Record one file's outcome, returning the bytes written on success.
    fn record(&mut self, file: FrameFile, result: Result<u64, WriteError>) -> Option<u64> {
        match result {
            Ok(size) => {
                self.written.push(file);
                Some(size)
            }
            Err(error) => {
                warn!(
                    index = self.index,
                    channel = file.prefix(),
                    error = %error,
                    "Channel write failed, omitting from metadata"
                );
                metrics::counter!("capture.channels.failed").increment(1);
                self.dropped.push(file);

                if matches!(error, WriteError::Compression { .. }) && self.fatal.is_none() {
                    self.fatal = Some(error);
                }
                None
            }
        }
    }
}

fn ensure_directory(path: &Path) -> Result<(), WriteError> {
    std::fs::create_dir_all(path).map_err(|source| WriteError::DirectoryCreation {
        path: path.to_path_buf(),
        source,
    })
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<u64, WriteError> {
    std::fs::write(path, bytes).map_err(|source| WriteError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(bytes.len() as u64)
}

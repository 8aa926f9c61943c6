//! Lazy sample reconstruction.
//!
//! A [`SampleSequence`] walks the selected frame indices one at a time. Each step
//! re-probes the frame, skips it if unusable, and otherwise decodes color, depth
//! and the merged metadata payload. Only the sample being handed out is resident.
//! Failures go to the caller's callback and never end the sequence.

use crate::prober::{FrameProber, SampleDescriptor, Unusable};
use image::ImageFormat;
use scan_capture::{
    decode_document, decompress, AuxiliaryTag, CaptureMetadata, CodecError, Dimensions,
    FrameFile,
};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const DEPTH_COMPONENT_SIZE: usize = std::mem::size_of::<f32>();
const BGRA_COMPONENT_SIZE: usize = 4;

/// Per-sample failures. None of these stop the sequence.
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("Color image missing: {path}")]
    MissingImage { path: PathBuf },

    #[error("Failed to decode color image: {0}")]
    ImageDecodeFailed(String),

    #[error("Cannot allocate a {width}x{height} pixel buffer")]
    PixelBufferAllocationFailed { width: u32, height: u32 },

    #[error("Failed to decode {document} document: {message}")]
    DocumentDecodeFailed {
        document: &'static str,
        message: String,
    },

    #[error("Depth payload holds {actual} bytes, {expected} needed")]
    DataSizeMismatch { expected: usize, actual: usize },

    #[error("Frame channels inconsistent: {0}")]
    ChannelInconsistent(String),

    #[error("Failed to decompress channel: {0}")]
    Decompression(#[from] CodecError),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Decoded color image, 8-bit BGRA.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorBuffer {
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: usize,
    pub data: Vec<u8>,
}

/// Decoded depth map in meters, tightly packed row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthMap {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl DepthMap {
    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }
}

/// One reconstruction-ready frame.
#[derive(Debug, Clone)]
pub struct Sample {
    pub id: u32,
    pub image: ColorBuffer,
    pub depth: DepthMap,
    /// Point cloud file; not decoded here
    pub point_cloud: PathBuf,
    pub metadata: Map<String, Value>,
}

/// Called with the frame index and the reason a frame was not yielded.
pub type FailureCallback = Box<dyn FnMut(u32, &SampleError) + Send>;

/// Lazy, finite sequence of samples over selected frame indices.
pub struct SampleSequence {
    prober: FrameProber,
    ids: std::vec::IntoIter<u32>,
    on_failure: FailureCallback,
    cancel: Option<CancellationToken>,
}

impl SampleSequence {
    pub fn new(prober: FrameProber, selected_ids: Vec<u32>, on_failure: FailureCallback) -> Self {
        Self {
            prober,
            ids: selected_ids.into_iter(),
            on_failure,
            cancel: None,
        }
    }

    /// Stop yielding once `token` is cancelled. Checked between samples.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn report(&mut self, index: u32, error: SampleError) {
        warn!(index, error = %error, "Sample failed");
        metrics::counter!("reconstruct.samples.failed").increment(1);
        (self.on_failure)(index, &error);
    }
}

impl Iterator for SampleSequence {
    type Item = Sample;

    fn next(&mut self) -> Option<Sample> {
        loop {
            if self.cancel.as_ref().is_some_and(|token| token.is_cancelled()) {
                debug!("Sample sequence cancelled");
                return None;
            }

            let index = self.ids.next()?;
            let descriptor = self.prober.probe(index);

            match descriptor.unusable_reason() {
                Some(Unusable::Skipped) => {
                    debug!(index, "Skipping unusable frame");
                    metrics::counter!("reconstruct.samples.skipped").increment(1);
                    continue;
                }
                Some(Unusable::Inconsistent(message)) => {
                    self.report(index, SampleError::ChannelInconsistent(message));
                    continue;
                }
                None => {}
            }

            match load_sample(self.prober.root(), &descriptor) {
                Ok(sample) => {
                    metrics::counter!("reconstruct.samples.yielded").increment(1);
                    return Some(sample);
                }
                Err(error) => self.report(index, error),
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.ids.len()))
    }
}

/// Start a fresh sequence over `selected_ids` in `root`.
///
/// Every call re-probes and re-decodes from disk.
pub fn reconstruct(
    root: &Path,
    selected_ids: &[u32],
    on_failure: impl FnMut(u32, &SampleError) + Send + 'static,
) -> SampleSequence {
    SampleSequence::new(
        FrameProber::new(root),
        selected_ids.to_vec(),
        Box::new(on_failure),
    )
}

/// Fully decode one usable frame.
pub fn load_sample(root: &Path, descriptor: &SampleDescriptor) -> Result<Sample, SampleError> {
    let index = descriptor.index;

    let image = decode_color(&FrameFile::Image.path_in(root, index))?;

    let dimensions = descriptor
        .depth_dimensions
        .filter(|dims| !dims.is_empty())
        .ok_or_else(|| SampleError::ChannelInconsistent("depth dimensions missing".to_string()))?;
    let depth = decode_depth(&FrameFile::Depth.path_in(root, index), dimensions)?;

    let (metadata, point_cloud) = build_payload(root, descriptor)?;

    Ok(Sample {
        id: index,
        image,
        depth,
        point_cloud,
        metadata,
    })
}

fn read_file(path: &Path) -> Result<Vec<u8>, SampleError> {
    std::fs::read(path).map_err(|source| SampleError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn allocate(len: usize, width: u32, height: u32) -> Result<Vec<u8>, SampleError> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| SampleError::PixelBufferAllocationFailed { width, height })?;
    Ok(buffer)
}

fn decode_color(path: &Path) -> Result<ColorBuffer, SampleError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SampleError::MissingImage {
                path: path.to_path_buf(),
            })
        }
        Err(source) => {
            return Err(SampleError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let rgba = image::load_from_memory_with_format(&bytes, ImageFormat::Jpeg)
        .map_err(|e| SampleError::ImageDecodeFailed(e.to_string()))?
        .into_rgba8();
    let (width, height) = rgba.dimensions();

    let allocation_failed = SampleError::PixelBufferAllocationFailed { width, height };
    if width == 0 || height == 0 {
        return Err(allocation_failed);
    }
    let bytes_per_row = width as usize * BGRA_COMPONENT_SIZE;
    let Some(len) = bytes_per_row.checked_mul(height as usize) else {
        return Err(allocation_failed);
    };

    let mut data = allocate(len, width, height)?;
    for pixel in rgba.pixels() {
        let [r, g, b, a] = pixel.0;
        data.extend_from_slice(&[b, g, r, a]);
    }

    Ok(ColorBuffer {
        width,
        height,
        bytes_per_row,
        data,
    })
}

/// Decompress and repack a depth payload.
///
/// Source rows may carry padding; the stride is `payload_len / height`.
fn decode_depth(path: &Path, dimensions: Dimensions) -> Result<DepthMap, SampleError> {
    let width = dimensions.width as usize;
    let height = dimensions.height as usize;
    let allocation_failed = || SampleError::PixelBufferAllocationFailed {
        width: dimensions.width,
        height: dimensions.height,
    };

    // Dimensions come from the metadata document and may be arbitrary
    let pixel_count = dimensions.pixel_count().ok_or_else(allocation_failed)?;
    let row_len = width
        .checked_mul(DEPTH_COMPONENT_SIZE)
        .ok_or_else(allocation_failed)?;
    let expected = pixel_count
        .checked_mul(DEPTH_COMPONENT_SIZE)
        .ok_or_else(allocation_failed)?;

    let compressed = read_file(path)?;
    let raw = decompress(&compressed, expected)?;

    let stride = raw.len() / height;
    if raw.len() < expected || stride < row_len {
        return Err(SampleError::DataSizeMismatch {
            expected,
            actual: raw.len(),
        });
    }

    let mut data = Vec::new();
    data.try_reserve_exact(pixel_count)
        .map_err(|_| allocation_failed())?;

    for row in raw.chunks_exact(stride).take(height) {
        data.extend(
            row[..row_len]
                .chunks_exact(DEPTH_COMPONENT_SIZE)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])),
        );
    }

    Ok(DepthMap {
        width: dimensions.width,
        height: dimensions.height,
        data,
    })
}

/// Optional camera document. Absence is not an error; a document that exists
/// but cannot be read or decoded fails the sample.
fn read_optional_document(
    root: &Path,
    file: FrameFile,
    index: u32,
) -> Result<Option<Value>, SampleError> {
    let path = file.path_in(root, index);
    let raw = match std::fs::read(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(index, document = file.prefix(), "Optional document absent");
            return Ok(None);
        }
        Err(source) => return Err(SampleError::Io { path, source }),
    };

    decode_document::<Value>(&raw)
        .map(Some)
        .map_err(|e| SampleError::DocumentDecodeFailed {
            document: file.prefix(),
            message: e.to_string(),
        })
}

fn build_payload(
    root: &Path,
    descriptor: &SampleDescriptor,
) -> Result<(Map<String, Value>, PathBuf), SampleError> {
    let index = descriptor.index;
    let document_error = |e: CodecError| SampleError::DocumentDecodeFailed {
        document: "metadata",
        message: e.to_string(),
    };

    let raw = read_file(&FrameFile::Metadata.path_in(root, index))?;
    let document: Value = decode_document(&raw).map_err(document_error)?;
    let metadata: CaptureMetadata = serde_json::from_value(document.clone()).map_err(|e| {
        SampleError::DocumentDecodeFailed {
            document: "metadata",
            message: e.to_string(),
        }
    })?;

    let mut payload = Map::new();
    payload.insert("ImageIndex".to_string(), json!(index));
    payload.insert(
        "ImageFile".to_string(),
        json!(FrameFile::Image.file_name(index)),
    );
    payload.insert("CaptureMetadata".to_string(), document);

    for (key, file) in [
        ("CameraTrackingState", FrameFile::Tracking),
        ("CameraCalibrationData", FrameFile::Calibration),
        ("CameraTransformData", FrameFile::Transform),
    ] {
        if let Some(value) = read_optional_document(root, file, index)? {
            payload.insert(key.to_string(), value);
        }
    }

    if let Some(dims) = descriptor.depth_dimensions {
        payload.insert(
            "DepthFile".to_string(),
            json!(FrameFile::Depth.file_name(index)),
        );
        payload.insert(
            "DepthDimensions".to_string(),
            json!({ "Width": dims.width, "Height": dims.height }),
        );
    }

    if let Some(bbox) = &descriptor.bounding_box {
        payload.insert("BoundingBoxMin".to_string(), json!(bbox.min));
        payload.insert("BoundingBoxMax".to_string(), json!(bbox.max));
    }

    let point_cloud_info = metadata
        .primary_image()
        .and_then(|image| image.point_cloud.as_ref());
    let point_cloud = match point_cloud_info {
        Some(info) => {
            payload.insert("PointCloudFile".to_string(), json!(info.file_name));
            payload.insert("PointCloudCount".to_string(), json!(info.point_count));
            root.join(&info.file_name)
        }
        None => FrameFile::PointCloud.path_in(root, index),
    };

    let confidence_file = FrameFile::Confidence.path_in(root, index);
    if let Some(dims) = metadata.auxiliary_dimensions(&AuxiliaryTag::DepthConfidenceMap) {
        if confidence_file.is_file() {
            payload.insert(
                "DepthConfidenceMap".to_string(),
                json!({
                    "File": FrameFile::Confidence.file_name(index),
                    "Width": dims.width,
                    "Height": dims.height,
                }),
            );
        }
    }

    Ok((payload, point_cloud))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use scan_capture::metadata::CameraState;
    use scan_capture::{
        compress, ColorImage, FrameChannels, FrameWriter, PlaneBuffer, TrackingState,
        WriterSettings,
    };
    use std::sync::{Arc, Mutex};

    fn depth_bytes(width: u32, height: u32) -> Vec<u8> {
        (0..width * height)
            .flat_map(|i| (i as f32 * 0.5).to_le_bytes())
            .collect()
    }

    fn frame(camera: bool) -> FrameChannels {
        FrameChannels {
            color: Some(ColorImage {
                width: 8,
                height: 4,
                rgb: Bytes::from(vec![200u8; 8 * 4 * 3]),
            }),
            depth: Some(PlaneBuffer::packed(4, 2, 4, Bytes::from(depth_bytes(4, 2)))),
            confidence: Some(PlaneBuffer::packed(4, 2, 1, Bytes::from(vec![1u8; 8]))),
            points: vec![[0.0, 0.0, 0.0], [1.0, 2.0, 3.0]],
            camera: camera.then(|| CameraState {
                tracking: TrackingState::Normal,
                intrinsics: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
                image_resolution: Dimensions::new(8, 4),
                transform: [[0.0; 4]; 4],
            }),
        }
    }

    fn write(root: &Path, index: u32, channels: FrameChannels) {
        FrameWriter::new(root, WriterSettings::default())
            .unwrap()
            .write_frame(index, &channels)
            .unwrap();
    }

    type Failures = Arc<Mutex<Vec<(u32, String)>>>;

    fn collect(root: &Path, ids: &[u32]) -> (Vec<Sample>, Failures) {
        let failures: Failures = Arc::new(Mutex::new(Vec::new()));
        let sink = failures.clone();
        let samples = reconstruct(root, ids, move |index, error| {
            sink.lock().unwrap().push((index, error.to_string()));
        })
        .collect();
        (samples, failures)
    }

    #[test]
    fn test_sample_is_fully_decoded() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), 0, frame(true));

        let (samples, failures) = collect(dir.path(), &[0]);
        assert!(failures.lock().unwrap().is_empty());
        assert_eq!(samples.len(), 1);

        let sample = &samples[0];
        assert_eq!(sample.id, 0);
        assert_eq!((sample.image.width, sample.image.height), (8, 4));
        assert_eq!(sample.image.bytes_per_row, 32);
        assert_eq!(sample.image.data.len(), 8 * 4 * 4);
        assert_eq!(sample.image.data[3], 255);

        assert_eq!((sample.depth.width, sample.depth.height), (4, 2));
        assert_eq!(sample.depth.data.len(), 8);
        assert_eq!(sample.depth.get(3, 1), Some(3.5));
        assert_eq!(sample.depth.get(4, 0), None);
        assert!(sample.point_cloud.ends_with("pointcloud_000000.bin.gz"));

        for key in [
            "ImageIndex",
            "ImageFile",
            "CaptureMetadata",
            "CameraTrackingState",
            "CameraCalibrationData",
            "CameraTransformData",
            "DepthFile",
            "DepthDimensions",
            "BoundingBoxMin",
            "BoundingBoxMax",
            "PointCloudFile",
            "PointCloudCount",
            "DepthConfidenceMap",
        ] {
            assert!(sample.metadata.contains_key(key), "missing {key}");
        }
        assert_eq!(sample.metadata["PointCloudCount"], json!(2));
        assert_eq!(sample.metadata["CameraTrackingState"]["state"], json!("normal"));
    }

    #[test]
    fn test_missing_camera_documents_are_omitted() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), 0, frame(false));

        let (samples, failures) = collect(dir.path(), &[0]);
        assert!(failures.lock().unwrap().is_empty());
        assert_eq!(samples.len(), 1);
        assert!(!samples[0].metadata.contains_key("CameraTrackingState"));
        assert!(!samples[0].metadata.contains_key("CameraCalibrationData"));
        assert!(!samples[0].metadata.contains_key("CameraTransformData"));
    }

    #[test]
    fn test_missing_depth_file_reported_and_sequence_continues() {
        let dir = tempfile::tempdir().unwrap();
        for index in 0..3 {
            write(dir.path(), index, frame(false));
        }
        std::fs::remove_file(FrameFile::Depth.path_in(dir.path(), 1)).unwrap();

        let (samples, failures) = collect(dir.path(), &[0, 1, 2]);
        let ids: Vec<u32> = samples.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![0, 2]);

        let failures = failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, 1);
        assert!(failures[0].1.contains("inconsistent"));
    }

    #[test]
    fn test_oversized_depth_dimensions_reported_and_sequence_continues() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), 0, frame(false));
        write(dir.path(), 1, frame(false));

        let path = FrameFile::Metadata.path_in(dir.path(), 0);
        let mut doc: CaptureMetadata = decode_document(&std::fs::read(&path).unwrap()).unwrap();
        for entry in &mut doc.file_contents.images[0].auxiliary_data {
            if entry.auxiliary_data_type == AuxiliaryTag::Depth {
                entry.width = Some(u32::MAX);
                entry.height = Some(u32::MAX);
            }
        }
        std::fs::write(&path, scan_capture::encode_document(&doc).unwrap()).unwrap();

        let (samples, failures) = collect(dir.path(), &[0, 1]);
        let ids: Vec<u32> = samples.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1]);

        let failures = failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, 0);
    }

    #[test]
    fn test_malformed_camera_document_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), 0, frame(true));
        write(dir.path(), 1, frame(true));
        std::fs::write(FrameFile::Tracking.path_in(dir.path(), 0), b"{ not json").unwrap();

        let descriptor = FrameProber::new(dir.path()).probe(0);
        assert!(matches!(
            load_sample(dir.path(), &descriptor),
            Err(SampleError::DocumentDecodeFailed {
                document: "tracking",
                ..
            })
        ));

        let (samples, failures) = collect(dir.path(), &[0, 1]);
        assert_eq!(samples.iter().map(|s| s.id).collect::<Vec<_>>(), vec![1]);
        let failures = failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, 0);
    }

    #[test]
    fn test_truncated_depth_is_size_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), 0, frame(false));
        std::fs::write(
            FrameFile::Depth.path_in(dir.path(), 0),
            compress(&depth_bytes(4, 1)).unwrap(),
        )
        .unwrap();

        let descriptor = FrameProber::new(dir.path()).probe(0);
        assert!(matches!(
            load_sample(dir.path(), &descriptor),
            Err(SampleError::DataSizeMismatch {
                expected: 32,
                actual: 16
            })
        ));
    }

    #[test]
    fn test_padded_depth_rows_are_repacked() {
        let dir = tempfile::tempdir().unwrap();
        let mut padded = Vec::new();
        for row in 0..2u32 {
            for x in 0..4u32 {
                padded.extend_from_slice(&((row * 4 + x) as f32).to_le_bytes());
            }
            padded.extend_from_slice(&[0xAA; 8]);
        }

        let mut channels = frame(false);
        channels.depth = Some(PlaneBuffer {
            width: 4,
            height: 2,
            bytes_per_row: 24,
            data: Bytes::from(padded),
        });
        write(dir.path(), 0, channels);

        let (samples, _) = collect(dir.path(), &[0]);
        assert_eq!(
            samples[0].depth.data,
            vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]
        );
    }

    #[test]
    fn test_corrupt_image_reported() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), 0, frame(false));
        std::fs::write(FrameFile::Image.path_in(dir.path(), 0), b"not a jpeg").unwrap();

        let descriptor = FrameProber::new(dir.path()).probe(0);
        assert!(matches!(
            load_sample(dir.path(), &descriptor),
            Err(SampleError::ImageDecodeFailed(_))
        ));
    }

    #[test]
    fn test_missing_image_error() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), 0, frame(false));
        let descriptor = FrameProber::new(dir.path()).probe(0);
        std::fs::remove_file(FrameFile::Image.path_in(dir.path(), 0)).unwrap();

        assert!(matches!(
            load_sample(dir.path(), &descriptor),
            Err(SampleError::MissingImage { .. })
        ));
    }

    #[test]
    fn test_sequence_is_restartable() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), 0, frame(false));
        write(dir.path(), 1, frame(false));

        let (first, _) = collect(dir.path(), &[0, 1]);
        let (second, _) = collect(dir.path(), &[0, 1]);
        assert_eq!(first.len(), 2);
        assert_eq!(
            first.iter().map(|s| s.id).collect::<Vec<_>>(),
            second.iter().map(|s| s.id).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_cancellation_stops_between_samples() {
        let dir = tempfile::tempdir().unwrap();
        for index in 0..3 {
            write(dir.path(), index, frame(false));
        }

        let token = CancellationToken::new();
        let mut sequence = reconstruct(dir.path(), &[0, 1, 2], |_, _| {})
            .with_cancellation(token.clone());

        assert_eq!(sequence.next().map(|s| s.id), Some(0));
        token.cancel();
        assert!(sequence.next().is_none());
    }
}

//! Point cloud payloads: packed little-endian float32 triples.

use crate::bbox::BoundingBox;
use crate::codec::{self, CodecError};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Bytes per stored point.
pub const POINT_STRIDE: usize = 3 * std::mem::size_of::<f32>();

#[derive(Debug, Error)]
pub enum PointCloudError {
    #[error("Failed to read point cloud {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("Point cloud payload of {0} bytes is not a whole number of points")]
    Truncated(usize),
}

/// Pack points into the raw (uncompressed) payload.
pub fn encode_points(points: &[[f32; 3]]) -> Vec<u8> {
    let mut raw = Vec::with_capacity(points.len() * POINT_STRIDE);
    for point in points {
        for component in point {
            raw.extend_from_slice(&component.to_le_bytes());
        }
    }
    raw
}

/// Unpack a raw payload.
pub fn decode_points(raw: &[u8]) -> Result<Vec<[f32; 3]>, PointCloudError> {
    if raw.len() % POINT_STRIDE != 0 {
        return Err(PointCloudError::Truncated(raw.len()));
    }

    Ok(raw
        .chunks_exact(POINT_STRIDE)
        .map(|chunk| {
            let component = |i: usize| {
                f32::from_le_bytes([chunk[i], chunk[i + 1], chunk[i + 2], chunk[i + 3]])
            };
            [component(0), component(4), component(8)]
        })
        .collect())
}

/// Read and decompress a `pointcloud_<NNNNNN>.bin.gz` file.
pub fn read_point_cloud(path: &Path) -> Result<Vec<[f32; 3]>, PointCloudError> {
    let compressed = std::fs::read(path).map_err(|source| PointCloudError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let raw = codec::decompress(&compressed, compressed.len() * 4)?;
    decode_points(&raw)
}

/// Point count and bounds, as recorded in the metadata document.
pub fn summarize(points: &[[f32; 3]]) -> (u64, Option<BoundingBox>) {
    (points.len() as u64, BoundingBox::from_points(points))
}

//! Fixed per-frame file naming inside a capture directory.
//!
//! Every file of a frame is named `<prefix>_<NNNNNN>.<ext>` where `NNNNNN` is the
//! zero-padded frame index.

use std::path::{Path, PathBuf};

/// Width of the zero-padded frame index in every filename.
pub const INDEX_WIDTH: usize = 6;

/// One file kind belonging to a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameFile {
    /// Color image, lossy
    Image,
    /// Depth map, compressed raw float32, row-major
    Depth,
    /// Confidence map, compressed raw bytes
    Confidence,
    /// Compressed raw float32 triples
    PointCloud,
    /// Channel inventory document
    Metadata,
    Tracking,
    Calibration,
    Transform,
    /// Empty marker written after the rest of the frame
    CompletionMarker,
}

impl FrameFile {
    pub fn prefix(&self) -> &'static str {
        match self {
            FrameFile::Image => "image",
            FrameFile::Depth => "depth",
            FrameFile::Confidence => "confidence",
            FrameFile::PointCloud => "pointcloud",
            FrameFile::Metadata => "metadata",
            FrameFile::Tracking => "tracking",
            FrameFile::Calibration => "calibration",
            FrameFile::Transform => "transform",
            FrameFile::CompletionMarker => "complete",
        }
    }

    /// Extension including the leading dot, empty for the marker.
    pub fn extension(&self) -> &'static str {
        match self {
            FrameFile::Image => ".jpg",
            FrameFile::Depth | FrameFile::Confidence | FrameFile::PointCloud => ".bin.gz",
            FrameFile::Metadata
            | FrameFile::Tracking
            | FrameFile::Calibration
            | FrameFile::Transform => ".json",
            FrameFile::CompletionMarker => "",
        }
    }

    pub fn file_name(&self, index: u32) -> String {
        format!(
            "{}_{:0width$}{}",
            self.prefix(),
            index,
            self.extension(),
            width = INDEX_WIDTH
        )
    }

    pub fn path_in(&self, root: &Path, index: u32) -> PathBuf {
        root.join(self.file_name(index))
    }
}

/// Extract the frame index from a color image filename.
///
/// Returns `None` for anything that is not `image_<digits>.jpg`.
pub fn parse_image_index(name: &str) -> Option<u32> {
    let digits = name.strip_prefix("image_")?.strip_suffix(".jpg")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

//! Capture directory prober.
//!
//! Probing reads the frame's metadata document and checks that referenced files
//! exist. It never decompresses channel payloads, so scanning thousands of
//! candidate frames stays cheap.

use crate::frame_selector::FrameSelector;
use scan_capture::{
    decode_document, parse_image_index, AuxiliaryTag, BoundingBox, BoundingBoxAggregator,
    CaptureMetadata, Dimensions, FrameFile, INDEX_WIDTH,
};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Directory-level failures. These abort the whole run.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Failed to list capture directory {path}: {source}")]
    ListFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// How one channel of a frame looks on disk relative to its metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    /// Claimed with usable dimensions and the file exists
    Present,
    /// Neither claimed nor on disk
    Absent,
    /// Claimed and unusable, or on disk without a claim
    Inconsistent,
}

impl ChannelState {
    fn from_claim(claimed: bool, usable_claim: bool, file_exists: bool) -> Self {
        match (claimed, usable_claim && file_exists, file_exists) {
            (true, true, _) => ChannelState::Present,
            (false, _, false) => ChannelState::Absent,
            _ => ChannelState::Inconsistent,
        }
    }
}

/// State of the frame's metadata document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    Present,
    Missing,
    Unreadable(String),
}

/// Probe result for one frame index. Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleDescriptor {
    pub index: u32,
    pub image: ChannelState,
    pub depth: ChannelState,
    pub point_cloud: ChannelState,
    pub metadata: DocumentState,
    /// Completion marker found, or not required
    pub complete: bool,
    pub depth_dimensions: Option<Dimensions>,
    pub bounding_box: Option<BoundingBox>,
}

/// Why a probed frame will not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unusable {
    /// A required channel was never there; skipped without a report
    Skipped,
    /// The frame's files contradict each other; reported to the caller
    Inconsistent(String),
}

impl SampleDescriptor {
    pub fn has_image(&self) -> bool {
        self.image == ChannelState::Present
    }

    pub fn has_depth(&self) -> bool {
        self.depth == ChannelState::Present
    }

    pub fn has_point_cloud(&self) -> bool {
        self.point_cloud == ChannelState::Present
    }

    pub fn is_usable(&self) -> bool {
        self.complete && self.has_image() && self.has_depth() && self.has_point_cloud()
    }

    /// `None` when the frame is usable.
    pub fn unusable_reason(&self) -> Option<Unusable> {
        if self.is_usable() {
            return None;
        }

        if let DocumentState::Unreadable(message) = &self.metadata {
            return Some(Unusable::Inconsistent(format!(
                "metadata document unreadable: {message}"
            )));
        }

        let inconsistent: Vec<&str> = [
            ("image", self.image),
            ("depth", self.depth),
            ("point cloud", self.point_cloud),
        ]
        .into_iter()
        .filter(|(_, state)| *state == ChannelState::Inconsistent)
        .map(|(name, _)| name)
        .collect();

        if !self.complete || inconsistent.is_empty() {
            return Some(Unusable::Skipped);
        }

        Some(Unusable::Inconsistent(format!(
            "{} does not match the metadata",
            inconsistent.join(", ")
        )))
    }
}

/// Enumerate frame indices from `image_<NNNNNN>.jpg` filenames.
///
/// Names with a malformed index are ignored.
pub fn list_frame_indices(root: &Path) -> Result<BTreeSet<u32>, ProbeError> {
    let list_error = |source| ProbeError::ListFailed {
        path: root.to_path_buf(),
        source,
    };

    let mut indices = BTreeSet::new();
    for entry in std::fs::read_dir(root).map_err(list_error)? {
        let entry = entry.map_err(list_error)?;
        if let Some(index) = entry.file_name().to_str().and_then(parse_image_index) {
            indices.insert(index);
        }
    }
    Ok(indices)
}

/// Probes frames of one capture directory.
#[derive(Debug, Clone)]
pub struct FrameProber {
    root: PathBuf,
    require_completion_marker: bool,
}

impl FrameProber {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            require_completion_marker: false,
        }
    }

    /// Treat frames without a completion marker as unusable.
    pub fn require_completion_marker(mut self, required: bool) -> Self {
        self.require_completion_marker = required;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Cheap usability check for one frame.
    pub fn probe(&self, index: u32) -> SampleDescriptor {
        let exists = |file: FrameFile| file.path_in(&self.root, index).is_file();

        let image = if exists(FrameFile::Image) {
            ChannelState::Present
        } else {
            ChannelState::Absent
        };

        let complete = !self.require_completion_marker || exists(FrameFile::CompletionMarker);

        let (metadata_state, metadata) = self.read_metadata(index);
        let metadata = metadata.as_ref();

        let depth_dimensions =
            metadata.and_then(|doc| doc.auxiliary_dimensions(&AuxiliaryTag::Depth));
        let depth_claimed = metadata
            .map(|doc| doc.has_auxiliary(&AuxiliaryTag::Depth))
            .unwrap_or(false);
        let depth = ChannelState::from_claim(
            depth_claimed,
            depth_dimensions.is_some_and(|dims| !dims.is_empty()),
            exists(FrameFile::Depth),
        );

        let point_cloud_info = metadata
            .and_then(CaptureMetadata::primary_image)
            .and_then(|image| image.point_cloud.as_ref());
        let point_cloud_file = point_cloud_info
            .map(|info| self.root.join(&info.file_name))
            .unwrap_or_else(|| FrameFile::PointCloud.path_in(&self.root, index));
        let point_cloud_exists = point_cloud_file.is_file();
        let point_cloud = ChannelState::from_claim(
            point_cloud_info.is_some(),
            point_cloud_info.is_some_and(|info| info.point_count > 0),
            point_cloud_exists,
        );

        let mut bounds = BoundingBoxAggregator::new();
        if let Some(image) = metadata.and_then(CaptureMetadata::primary_image) {
            bounds.add(
                image
                    .object_bounding_box
                    .as_ref()
                    .and_then(|data| data.to_bounding_box())
                    .as_ref(),
            );
            if point_cloud_exists {
                bounds.add(
                    point_cloud_info
                        .and_then(|info| info.bounding_box.as_ref())
                        .and_then(|data| data.to_bounding_box())
                        .as_ref(),
                );
            }
        }

        SampleDescriptor {
            index,
            image,
            depth,
            point_cloud,
            metadata: metadata_state,
            complete,
            depth_dimensions,
            bounding_box: bounds.finish(),
        }
    }

    fn read_metadata(&self, index: u32) -> (DocumentState, Option<CaptureMetadata>) {
        let path = FrameFile::Metadata.path_in(&self.root, index);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return (DocumentState::Missing, None)
            }
            Err(e) => return (DocumentState::Unreadable(e.to_string()), None),
        };

        match decode_document::<CaptureMetadata>(&raw) {
            Ok(doc) => (DocumentState::Present, Some(doc)),
            Err(e) => {
                warn!(index, error = %e, "Metadata document could not be decoded");
                (DocumentState::Unreadable(e.to_string()), None)
            }
        }
    }

    /// Probe every candidate, apply the selector, and summarize.
    ///
    /// The aggregate bounding box covers every candidate. Channel counts and
    /// missing-id lists cover the selected frames only.
    #[instrument(skip(self, selector), fields(root = %self.root.display()))]
    pub fn probe_directory(&self, selector: &FrameSelector) -> Result<ProbeReport, ProbeError> {
        let candidates: Vec<u32> = list_frame_indices(&self.root)?.into_iter().collect();
        let selection = selector.select(&candidates);
        let selected: BTreeSet<u32> = selection.selected.iter().copied().collect();

        let mut aggregate = BoundingBoxAggregator::new();
        let mut report = ProbeReport {
            total_candidates: candidates.len(),
            selected_ids: selection.selected.clone(),
            dropped_ids: selection.dropped,
            ..Default::default()
        };

        for &index in &candidates {
            let descriptor = self.probe(index);
            aggregate.add(descriptor.bounding_box.as_ref());

            if !selected.contains(&index) {
                continue;
            }

            if descriptor.has_depth() {
                report.depth_present_count += 1;
            } else {
                report.missing_depth_ids.push(index);
            }
            if descriptor.has_point_cloud() {
                report.pointcloud_present_count += 1;
            } else {
                report.missing_pointcloud_ids.push(index);
            }
            if descriptor.is_usable() {
                report.usable_ids.push(index);
            } else {
                debug!(index, reason = ?descriptor.unusable_reason(), "Frame not usable");
            }
        }

        let bbox_frames = aggregate.contributions();
        report.aggregate_bbox = aggregate.finish();

        info!(
            total = report.total_candidates,
            bbox_frames,
            selected = report.selected_ids.len(),
            usable = report.usable_ids.len(),
            depth_present = report.depth_present_count,
            pointcloud_present = report.pointcloud_present_count,
            "Capture directory probed"
        );

        Ok(report)
    }
}

/// Summary of a probed capture directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProbeReport {
    pub total_candidates: usize,
    pub selected_ids: Vec<u32>,
    pub dropped_ids: Vec<u32>,
    pub depth_present_count: usize,
    pub missing_depth_ids: Vec<u32>,
    pub pointcloud_present_count: usize,
    pub missing_pointcloud_ids: Vec<u32>,
    pub usable_ids: Vec<u32>,
    pub aggregate_bbox: Option<BoundingBox>,
}

impl ProbeReport {
    /// Distinguishes an empty directory from one whose frames were all unusable.
    pub fn has_candidates(&self) -> bool {
        self.total_candidates > 0
    }

    /// First `limit` ids, zero-padded like filenames, for log lines.
    pub fn preview(ids: &[u32], limit: usize) -> String {
        let mut shown: Vec<String> = ids
            .iter()
            .take(limit)
            .map(|id| format!("{:0width$}", id, width = INDEX_WIDTH))
            .collect();
        if ids.len() > limit {
            shown.push("...".to_string());
        }
        shown.join(", ")
    }
}

/// Probe `root` with the default prober settings.
pub fn probe_directory(root: &Path, max_count: usize) -> Result<ProbeReport, ProbeError> {
    FrameProber::new(root).probe_directory(&FrameSelector::new(max_count))
}

//! Capture metadata schema shared by writer and loader.
//!
//! Field names are the on-disk contract; see `metadata_<NNNNNN>.json`:
//!
//! ```text
//! { "{FileContents}": { "ImageCount": 1, "Images": [ {
//!       "ImageIndex", "Width", "Height", "NamedColorSpace",
//!       "AuxiliaryData": [ { "AuxiliaryDataType", "Width"?, "Height"? } ],
//!       "ThumbnailImages"?, "PointCloud"?, "ObjectBoundingBox"? } ] },
//!   "CanAnimate": 0, "FileSize"? }
//! ```

use crate::bbox::BoundingBox;
use serde::{Deserialize, Serialize};

/// Color space recorded for every color image.
pub const SRGB_COLOR_SPACE: &str = "kCGColorSpaceSRGB";

const OBJECT_CAPTURE_TAG: &str = "tag:apple.com,2023:ObjectCapture#";

/// Auxiliary channel tag. Unknown tags are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AuxiliaryTag {
    Depth,
    DepthConfidenceMap,
    CameraTrackingState,
    CameraCalibrationData,
    ObjectTransform,
    ObjectBoundingBox,
    RawFeaturePoints,
    PointCloudData,
    Other(String),
}

impl AuxiliaryTag {
    pub fn as_str(&self) -> &str {
        match self {
            AuxiliaryTag::Depth => "kCGImageAuxiliaryDataTypeDepth",
            AuxiliaryTag::DepthConfidenceMap => {
                "tag:apple.com,2023:ObjectCapture#DepthConfidenceMap"
            }
            AuxiliaryTag::CameraTrackingState => {
                "tag:apple.com,2023:ObjectCapture#CameraTrackingState"
            }
            AuxiliaryTag::CameraCalibrationData => {
                "tag:apple.com,2023:ObjectCapture#CameraCalibrationData"
            }
            AuxiliaryTag::ObjectTransform => "tag:apple.com,2023:ObjectCapture#ObjectTransform",
            AuxiliaryTag::ObjectBoundingBox => {
                "tag:apple.com,2023:ObjectCapture#ObjectBoundingBox"
            }
            AuxiliaryTag::RawFeaturePoints => "tag:apple.com,2023:ObjectCapture#RawFeaturePoints",
            AuxiliaryTag::PointCloudData => "tag:apple.com,2023:ObjectCapture#PointCloudData",
            AuxiliaryTag::Other(raw) => raw,
        }
    }
}

impl From<String> for AuxiliaryTag {
    fn from(raw: String) -> Self {
        if raw == "kCGImageAuxiliaryDataTypeDepth" {
            return AuxiliaryTag::Depth;
        }

        match raw.strip_prefix(OBJECT_CAPTURE_TAG) {
            Some("DepthConfidenceMap") => AuxiliaryTag::DepthConfidenceMap,
            Some("CameraTrackingState") => AuxiliaryTag::CameraTrackingState,
            Some("CameraCalibrationData") => AuxiliaryTag::CameraCalibrationData,
            Some("ObjectTransform") => AuxiliaryTag::ObjectTransform,
            Some("ObjectBoundingBox") => AuxiliaryTag::ObjectBoundingBox,
            Some("RawFeaturePoints") => AuxiliaryTag::RawFeaturePoints,
            Some("PointCloudData") => AuxiliaryTag::PointCloudData,
            _ => AuxiliaryTag::Other(raw),
        }
    }
}

impl From<AuxiliaryTag> for String {
    fn from(tag: AuxiliaryTag) -> Self {
        match tag {
            AuxiliaryTag::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

/// Pixel dimensions of a 2D channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// `width * height`, or `None` if it does not fit in `usize`.
    pub fn pixel_count(&self) -> Option<usize> {
        (self.width as usize).checked_mul(self.height as usize)
    }
}

/// Root of a frame metadata document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureMetadata {
    #[serde(rename = "{FileContents}")]
    pub file_contents: FileContents,

    #[serde(rename = "CanAnimate", default)]
    pub can_animate: i64,

    /// Size of the encoded color image in bytes
    #[serde(rename = "FileSize", default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,

    /// Top-level inventory some writers emit instead of the per-image one
    #[serde(
        rename = "AuxiliaryData",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub auxiliary_data: Vec<AuxiliaryDataInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileContents {
    pub image_count: u32,
    #[serde(default)]
    pub images: Vec<ImageEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageEntry {
    pub image_index: u32,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub named_color_space: String,
    #[serde(default)]
    pub auxiliary_data: Vec<AuxiliaryDataInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_images: Option<Vec<ThumbnailInfo>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point_cloud: Option<PointCloudInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_bounding_box: Option<BoundingBoxData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuxiliaryDataInfo {
    #[serde(rename = "AuxiliaryDataType")]
    pub auxiliary_data_type: AuxiliaryTag,
    #[serde(rename = "Width", default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(rename = "Height", default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl AuxiliaryDataInfo {
    pub fn tag(tag: AuxiliaryTag) -> Self {
        Self {
            auxiliary_data_type: tag,
            width: None,
            height: None,
        }
    }

    pub fn with_dimensions(tag: AuxiliaryTag, dimensions: Dimensions) -> Self {
        Self {
            auxiliary_data_type: tag,
            width: Some(dimensions.width),
            height: Some(dimensions.height),
        }
    }

    /// Both dimensions, when the entry carries them.
    pub fn dimensions(&self) -> Option<Dimensions> {
        Some(Dimensions::new(self.width?, self.height?))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ThumbnailInfo {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PointCloudInfo {
    pub file_name: String,
    pub point_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBoxData>,
}

/// Wire form of a bounding box: two float arrays that should hold three values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BoundingBoxData {
    pub min: Vec<f32>,
    pub max: Vec<f32>,
}

impl BoundingBoxData {
    /// `None` unless both arrays hold exactly three components.
    pub fn to_bounding_box(&self) -> Option<BoundingBox> {
        let min: [f32; 3] = self.min.as_slice().try_into().ok()?;
        let max: [f32; 3] = self.max.as_slice().try_into().ok()?;
        Some(BoundingBox::new(min, max))
    }
}

impl From<&BoundingBox> for BoundingBoxData {
    fn from(bbox: &BoundingBox) -> Self {
        Self {
            min: bbox.min.to_vec(),
            max: bbox.max.to_vec(),
        }
    }
}

impl CaptureMetadata {
    /// The frame's image entry. Documents hold one image per frame.
    pub fn primary_image(&self) -> Option<&ImageEntry> {
        self.file_contents.images.first()
    }

    /// Dimensions recorded for `tag`.
    ///
    /// The top-level inventory is checked first, then every image entry. Entries
    /// missing either dimension are passed over.
    pub fn auxiliary_dimensions(&self, tag: &AuxiliaryTag) -> Option<Dimensions> {
        let find = |entries: &[AuxiliaryDataInfo]| {
            entries
                .iter()
                .filter(|entry| &entry.auxiliary_data_type == tag)
                .find_map(AuxiliaryDataInfo::dimensions)
        };

        find(&self.auxiliary_data).or_else(|| {
            self.file_contents
                .images
                .iter()
                .find_map(|image| find(&image.auxiliary_data))
        })
    }

    /// Whether any inventory lists `tag`, with or without dimensions.
    pub fn has_auxiliary(&self, tag: &AuxiliaryTag) -> bool {
        self.auxiliary_data
            .iter()
            .chain(
                self.file_contents
                    .images
                    .iter()
                    .flat_map(|image| image.auxiliary_data.iter()),
            )
            .any(|entry| &entry.auxiliary_data_type == tag)
    }
}

// Camera documents written next to the metadata document.

/// `tracking_<NNNNNN>.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraTrackingStateData {
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// `calibration_<NNNNNN>.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraCalibrationData {
    /// 3x3 intrinsics, flattened column by column
    pub intrinsic_matrix: Vec<f32>,
    /// `[width, height]`
    pub image_resolution: Vec<u32>,
    /// `[x, y]`
    pub lens_distortion_center: Vec<f32>,
}

/// `transform_<NNNNNN>.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraTransformData {
    /// 4x4 camera-to-world pose, column-major
    pub transform_matrix: Vec<f32>,
}

/// Why tracking is limited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitedReason {
    Initializing,
    Relocalizing,
    ExcessiveMotion,
    InsufficientFeatures,
    Unknown,
}

impl LimitedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitedReason::Initializing => "initializing",
            LimitedReason::Relocalizing => "relocalizing",
            LimitedReason::ExcessiveMotion => "excessiveMotion",
            LimitedReason::InsufficientFeatures => "insufficientFeatures",
            LimitedReason::Unknown => "unknown",
        }
    }
}

/// Camera tracking quality reported by the sensor session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingState {
    NotAvailable,
    Limited(LimitedReason),
    Normal,
}

impl TrackingState {
    pub fn to_document(&self) -> CameraTrackingStateData {
        let (state, reason) = match self {
            TrackingState::NotAvailable => ("notAvailable", None),
            TrackingState::Limited(reason) => ("limited", Some(reason.as_str().to_string())),
            TrackingState::Normal => ("normal", None),
        };

        CameraTrackingStateData {
            state: state.to_string(),
            reason,
        }
    }
}

/// Camera intrinsics, pose and tracking state for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraState {
    pub tracking: TrackingState,
    /// Intrinsics as three columns
    pub intrinsics: [[f32; 3]; 3],
    pub image_resolution: Dimensions,
    /// Camera-to-world pose as four columns
    pub transform: [[f32; 4]; 4],
}

impl CameraState {
    pub fn calibration_document(&self) -> CameraCalibrationData {
        let Dimensions { width, height } = self.image_resolution;

        CameraCalibrationData {
            intrinsic_matrix: self.intrinsics.iter().flatten().copied().collect(),
            image_resolution: vec![width, height],
            // Distortion center is taken as the image center
            lens_distortion_center: vec![(width / 2) as f32, (height / 2) as f32],
        }
    }

    pub fn transform_document(&self) -> CameraTransformData {
        CameraTransformData {
            transform_matrix: self.transform.iter().flatten().copied().collect(),
        }
    }
}

/// What was actually written for a frame; input to [`MetadataBuilder`].
#[derive(Debug, Clone, Default)]
pub struct FrameInventory {
    pub index: u32,
    pub image: Option<Dimensions>,
    pub image_file_size: Option<u64>,
    pub depth: Option<Dimensions>,
    pub confidence: Option<Dimensions>,
    pub tracking: bool,
    pub calibration: bool,
    pub transform: bool,
    pub point_cloud: Option<PointCloudInfo>,
}

/// Builds the metadata document for one frame.
///
/// Auxiliary entries always appear in the same order: depth, confidence, tracking
/// state, calibration, transform, then the point-cloud derived tags.
#[derive(Debug, Clone)]
pub struct MetadataBuilder {
    thumbnail: Option<Dimensions>,
}

impl MetadataBuilder {
    pub fn new() -> Self {
        Self { thumbnail: None }
    }

    /// Advertise a thumbnail size in every document.
    pub fn with_thumbnail(mut self, size: Dimensions) -> Self {
        self.thumbnail = Some(size);
        self
    }

    pub fn build(&self, inventory: &FrameInventory) -> CaptureMetadata {
        let mut auxiliary = Vec::new();

        if let Some(depth) = inventory.depth {
            auxiliary.push(AuxiliaryDataInfo::with_dimensions(AuxiliaryTag::Depth, depth));
        }
        if let Some(confidence) = inventory.confidence {
            auxiliary.push(AuxiliaryDataInfo::with_dimensions(
                AuxiliaryTag::DepthConfidenceMap,
                confidence,
            ));
        }
        if inventory.tracking {
            auxiliary.push(AuxiliaryDataInfo::tag(AuxiliaryTag::CameraTrackingState));
        }
        if inventory.calibration {
            auxiliary.push(AuxiliaryDataInfo::tag(AuxiliaryTag::CameraCalibrationData));
        }
        if inventory.transform {
            auxiliary.push(AuxiliaryDataInfo::tag(AuxiliaryTag::ObjectTransform));
        }

        let object_bounding_box = inventory
            .point_cloud
            .as_ref()
            .and_then(|info| info.bounding_box.clone());

        if inventory.point_cloud.is_some() {
            if object_bounding_box.is_some() {
                auxiliary.push(AuxiliaryDataInfo::tag(AuxiliaryTag::ObjectBoundingBox));
            }
            auxiliary.push(AuxiliaryDataInfo::tag(AuxiliaryTag::RawFeaturePoints));
            auxiliary.push(AuxiliaryDataInfo::tag(AuxiliaryTag::PointCloudData));
        }

        let image = inventory.image.unwrap_or(Dimensions::new(0, 0));

        let entry = ImageEntry {
            image_index: inventory.index,
            width: image.width,
            height: image.height,
            named_color_space: SRGB_COLOR_SPACE.to_string(),
            auxiliary_data: auxiliary,
            thumbnail_images: self.thumbnail.map(|size| {
                vec![ThumbnailInfo {
                    width: size.width,
                    height: size.height,
                }]
            }),
            point_cloud: inventory.point_cloud.clone(),
            object_bounding_box,
        };

        CaptureMetadata {
            file_contents: FileContents {
                image_count: 1,
                images: vec![entry],
            },
            can_animate: 0,
            file_size: inventory.image_file_size,
            auxiliary_data: Vec::new(),
        }
    }
}

impl Default for MetadataBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode_document, encode_document};

    fn point_cloud_info() -> PointCloudInfo {
        PointCloudInfo {
            file_name: "pointcloud_000004.bin.gz".to_string(),
            point_count: 3,
            bounding_box: Some(BoundingBoxData {
                min: vec![-1.0, -1.0, -1.0],
                max: vec![1.0, 2.0, 3.0],
            }),
        }
    }

    fn full_inventory() -> FrameInventory {
        FrameInventory {
            index: 4,
            image: Some(Dimensions::new(1920, 1440)),
            image_file_size: Some(1234),
            depth: Some(Dimensions::new(256, 192)),
            confidence: Some(Dimensions::new(256, 192)),
            tracking: true,
            calibration: true,
            transform: true,
            point_cloud: Some(point_cloud_info()),
        }
    }

    #[test]
    fn test_auxiliary_tag_wire_strings() {
        let tags = [
            AuxiliaryTag::Depth,
            AuxiliaryTag::DepthConfidenceMap,
            AuxiliaryTag::CameraTrackingState,
            AuxiliaryTag::CameraCalibrationData,
            AuxiliaryTag::ObjectTransform,
            AuxiliaryTag::ObjectBoundingBox,
            AuxiliaryTag::RawFeaturePoints,
            AuxiliaryTag::PointCloudData,
        ];
        for tag in tags {
            let raw: String = tag.clone().into();
            assert_eq!(AuxiliaryTag::from(raw), tag);
        }

        let unknown = AuxiliaryTag::from("tag:apple.com,2023:ObjectCapture#SegmentID".to_string());
        assert_eq!(
            unknown,
            AuxiliaryTag::Other("tag:apple.com,2023:ObjectCapture#SegmentID".to_string())
        );
        assert_eq!(unknown.as_str(), "tag:apple.com,2023:ObjectCapture#SegmentID");
    }

    #[test]
    fn test_builder_fixed_auxiliary_order() {
        let metadata = MetadataBuilder::new().build(&full_inventory());
        let image = metadata.primary_image().unwrap();

        let order: Vec<AuxiliaryTag> = image
            .auxiliary_data
            .iter()
            .map(|entry| entry.auxiliary_data_type.clone())
            .collect();
        assert_eq!(
            order,
            vec![
                AuxiliaryTag::Depth,
                AuxiliaryTag::DepthConfidenceMap,
                AuxiliaryTag::CameraTrackingState,
                AuxiliaryTag::CameraCalibrationData,
                AuxiliaryTag::ObjectTransform,
                AuxiliaryTag::ObjectBoundingBox,
                AuxiliaryTag::RawFeaturePoints,
                AuxiliaryTag::PointCloudData,
            ]
        );
        assert_eq!(image.object_bounding_box, point_cloud_info().bounding_box);
        assert_eq!(metadata.file_size, Some(1234));
        assert_eq!(metadata.file_contents.image_count, 1);
    }

    #[test]
    fn test_builder_omits_missing_channels() {
        let inventory = FrameInventory {
            index: 1,
            image: Some(Dimensions::new(640, 480)),
            ..Default::default()
        };
        let metadata = MetadataBuilder::new().build(&inventory);
        let image = metadata.primary_image().unwrap();

        assert!(image.auxiliary_data.is_empty());
        assert!(image.point_cloud.is_none());
        assert!(metadata.auxiliary_dimensions(&AuxiliaryTag::Depth).is_none());
    }

    #[test]
    fn test_wire_field_names() {
        let metadata = MetadataBuilder::new()
            .with_thumbnail(Dimensions::new(320, 240))
            .build(&full_inventory());
        let text = String::from_utf8(encode_document(&metadata).unwrap()).unwrap();

        for key in [
            "\"{FileContents}\"",
            "\"ImageCount\"",
            "\"Images\"",
            "\"ImageIndex\"",
            "\"NamedColorSpace\"",
            "\"AuxiliaryData\"",
            "\"AuxiliaryDataType\"",
            "\"ThumbnailImages\"",
            "\"PointCloud\"",
            "\"FileName\"",
            "\"PointCount\"",
            "\"BoundingBox\"",
            "\"ObjectBoundingBox\"",
            "\"Min\"",
            "\"Max\"",
            "\"CanAnimate\"",
            "\"FileSize\"",
        ] {
            assert!(text.contains(key), "missing {key}");
        }
        assert!(text.contains("kCGImageAuxiliaryDataTypeDepth"));
    }

    #[test]
    fn test_metadata_encoding_is_byte_stable() {
        let metadata = MetadataBuilder::new().build(&full_inventory());
        let first = encode_document(&metadata).unwrap();
        let second = encode_document(&metadata.clone()).unwrap();
        assert_eq!(first, second);

        let decoded: CaptureMetadata = decode_document(&first).unwrap();
        assert_eq!(decoded, metadata);
    }

    #[test]
    fn test_auxiliary_dimensions_lookup() {
        let raw = br#"{
            "{FileContents}": {"ImageCount": 1, "Images": [{
                "ImageIndex": 2, "Width": 10, "Height": 10, "NamedColorSpace": "x",
                "AuxiliaryData": [
                    {"AuxiliaryDataType": "kCGImageAuxiliaryDataTypeDepth"},
                    {"AuxiliaryDataType": "kCGImageAuxiliaryDataTypeDepth", "Width": 4, "Height": 3}
                ]
            }]},
            "CanAnimate": 0
        }"#;
        let metadata: CaptureMetadata = decode_document(raw).unwrap();
        assert_eq!(
            metadata.auxiliary_dimensions(&AuxiliaryTag::Depth),
            Some(Dimensions::new(4, 3))
        );
        assert!(metadata.has_auxiliary(&AuxiliaryTag::Depth));
        assert!(!metadata.has_auxiliary(&AuxiliaryTag::DepthConfidenceMap));
    }

    #[test]
    fn test_top_level_auxiliary_data_takes_precedence() {
        let raw = br#"{
            "AuxiliaryData": [{"AuxiliaryDataType": "kCGImageAuxiliaryDataTypeDepth", "Width": 8, "Height": 6}],
            "{FileContents}": {"ImageCount": 1, "Images": [{
                "ImageIndex": 0,
                "AuxiliaryData": [{"AuxiliaryDataType": "kCGImageAuxiliaryDataTypeDepth", "Width": 4, "Height": 3}]
            }]}
        }"#;
        let metadata: CaptureMetadata = decode_document(raw).unwrap();
        assert_eq!(
            metadata.auxiliary_dimensions(&AuxiliaryTag::Depth),
            Some(Dimensions::new(8, 6))
        );
    }

    #[test]
    fn test_bounding_box_data_requires_three_components() {
        let good = BoundingBoxData {
            min: vec![0.0, 1.0, 2.0],
            max: vec![3.0, 4.0, 5.0],
        };
        assert_eq!(
            good.to_bounding_box(),
            Some(BoundingBox::new([0.0, 1.0, 2.0], [3.0, 4.0, 5.0]))
        );

        let short = BoundingBoxData {
            min: vec![0.0, 1.0],
            max: vec![3.0, 4.0, 5.0],
        };
        assert!(short.to_bounding_box().is_none());
    }

    #[test]
    fn test_pixel_count() {
        assert_eq!(Dimensions::new(256, 192).pixel_count(), Some(49152));
        assert_eq!(Dimensions::new(0, 192).pixel_count(), Some(0));
    }

    #[test]
    fn test_camera_documents() {
        let camera = CameraState {
            tracking: TrackingState::Limited(LimitedReason::ExcessiveMotion),
            intrinsics: [[500.0, 0.0, 0.0], [0.0, 500.0, 0.0], [320.0, 240.0, 1.0]],
            image_resolution: Dimensions::new(640, 480),
            transform: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.5, 0.25, -1.0, 1.0],
            ],
        };

        let tracking = camera.tracking.to_document();
        assert_eq!(tracking.state, "limited");
        assert_eq!(tracking.reason.as_deref(), Some("excessiveMotion"));
        assert!(TrackingState::Normal.to_document().reason.is_none());

        let calibration = camera.calibration_document();
        assert_eq!(calibration.intrinsic_matrix.len(), 9);
        assert_eq!(calibration.intrinsic_matrix[6], 320.0);
        assert_eq!(calibration.image_resolution, vec![640, 480]);
        assert_eq!(calibration.lens_distortion_center, vec![320.0, 240.0]);

        let transform = camera.transform_document();
        assert_eq!(transform.transform_matrix.len(), 16);
        assert_eq!(&transform.transform_matrix[12..15], &[0.5, 0.25, -1.0]);

        let text = String::from_utf8(encode_document(&calibration).unwrap()).unwrap();
        assert!(text.contains("\"intrinsicMatrix\""));
        assert!(text.contains("\"lensDistortionCenter\""));
    }
}

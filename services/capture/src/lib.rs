//! Scan Capture - per-frame writer for depth-camera scan sessions
//!
//! This library writes each captured frame as a fixed set of files in a capture
//! directory. It provides:
//!
//! - Byte and document codecs shared with the reconstruction side
//! - The capture metadata schema (channel inventory, point cloud stats, bounds)
//! - A frame serializer and a serial, queue-backed capture session
//!
//! # Example
//!
//! ```rust,no_run
//! use scan_capture::{CaptureLibrary, CaptureSession, FrameChannels, SessionSettings};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let library = CaptureLibrary::new("captures");
//!     let directory = library.make_capture_directory("desk-scan")?;
//!
//!     let session = CaptureSession::start(directory, SessionSettings::default())?;
//!     let completion = session.submit(FrameChannels::default()).await?;
//!     let receipt = completion.await??;
//!     println!("wrote frame {}", receipt.index);
//!
//!     session.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod bbox;
pub mod codec;
pub mod config;
pub mod frame_writer;
pub mod layout;
pub mod metadata;
pub mod point_cloud;
pub mod session;
pub mod storage;

// Re-export main types
pub use bbox::{BoundingBox, BoundingBoxAggregator};
pub use codec::{compress, decode_document, decompress, encode_document, CodecError};
pub use config::{CaptureConfig, ConfigValidationError, LoggingConfig};
pub use frame_writer::{
    ColorImage, FrameChannels, FrameReceipt, FrameWriter, PlaneBuffer, WriteError,
    WriterSettings,
};
pub use layout::{parse_image_index, FrameFile, INDEX_WIDTH};
pub use metadata::{
    AuxiliaryDataInfo, AuxiliaryTag, BoundingBoxData, CameraCalibrationData, CameraState,
    CameraTrackingStateData, CameraTransformData, CaptureMetadata, Dimensions, ImageEntry,
    LimitedReason, MetadataBuilder, PointCloudInfo, TrackingState,
};
pub use point_cloud::{read_point_cloud, PointCloudError};
pub use session::{CaptureSession, SessionSettings, SessionStats, WriteCompletion};
pub use storage::{CaptureEntry, CaptureLibrary, LibraryError};

//! Scan Reconstruct - capture directory loader for 3D reconstruction
//!
//! Reads capture directories written by `scan-capture` and turns them into a
//! bounded, lazily decoded sample sequence:
//!
//! 1. [`prober`] lists frame indices and checks each frame without decoding it
//! 2. [`frame_selector`] caps the candidates with uniform stride selection
//! 3. [`sample_loader`] decodes one selected frame at a time
//! 4. [`engine`] drives an external reconstruction engine over the samples
//!
//! # Example
//!
//! ```rust,no_run
//! use scan_reconstruct::{probe_directory, reconstruct};
//! use std::path::Path;
//!
//! fn main() -> anyhow::Result<()> {
//!     let root = Path::new("captures/desk-scan");
//!     let report = probe_directory(root, 120)?;
//!
//!     for sample in reconstruct(root, &report.selected_ids, |index, error| {
//!         eprintln!("frame {index} failed: {error}");
//!     }) {
//!         println!("frame {} is {}x{}", sample.id, sample.image.width, sample.image.height);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod frame_selector;
pub mod prober;
pub mod sample_loader;

// Re-export main types
pub use config::ReconstructConfig;
pub use engine::{
    async_trait, Detail, EngineError, JobOutcome, ReconstructionEngine, ReconstructionEvent,
    ReconstructionInput, ReconstructionJob, ReconstructionRequest, ReconstructionResult,
    Termination,
};
pub use frame_selector::{FrameSelector, FrameSelectorBuilder, Selection};
pub use prober::{
    list_frame_indices, probe_directory, ChannelState, FrameProber, ProbeError, ProbeReport,
    SampleDescriptor,
};
pub use sample_loader::{
    load_sample, reconstruct, ColorBuffer, DepthMap, Sample, SampleError, SampleSequence,
};

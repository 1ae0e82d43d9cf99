//! # Volume segmenter
//!
//! This crate runs a 3D segmentation model over a medical image volume that
//! is larger than the model's input, using overlapping sliding windows.
//!
//! A run goes through these stages, one window at a time:
//!  - Normalize raw intensities from the 8-bit range into `[0, 1]`
//!  - Plan cubic window origins (64 voxels wide, stepping by 32 by default)
//!  - Extract each window into a `(1, 1, D, H, W)` tensor
//!  - Run the model on it through an [`InferenceSession`]
//!  - Decode the per-class scores with an arg-max (ties go to the lowest class)
//!  - Stitch the labels into a full-volume [`LabelVolume`]
//!
//! After every window the growing label map is exposed, either lent by
//! [`SlidingWindowRun::next_window`], pushed to a callback, or yielded as an
//! owned snapshot from [`SlidingWindowRun::into_stream`]. Overlapping windows
//! are not blended: the window processed last decides the label.
//!
//!  Volumes are expected in row-major order (z, then y, then x). Windows that
//!  would reach past the far edge of the volume are clipped; their outside
//!  cells are zero-filled on the way in and dropped on the way out.
//!
//! The model itself is opaque. Implement [`ModelRuntime`] and
//! [`InferenceSession`] for your backend, or enable the `onnx` feature to use
//! ONNX Runtime.
//!
//! # Examples
//!
//! ## Segmenting a volume with an ONNX model
//!
//! ```no_run
//! # #[cfg(feature = "onnx")]
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use volume_segmenter::{
//!     PipelineConfig, ProgressEvent, Shape, Volume, onnx::OnnxRuntime, segment_volume,
//! };
//!
//! let voxels = vec![0u8; 128 * 128 * 128];
//! let volume = Volume::from_u8(Shape::cube(128), &voxels)?;
//! let config = PipelineConfig::default().with_model("grace.onnx");
//! let labels = segment_volume(&OnnxRuntime::default(), &volume, &config, |event| {
//!     if let ProgressEvent::Window(progress) = event {
//!         println!("{:.0}% done", progress.percent());
//!     }
//! })
//! .await?;
//! println!("label counts: {:?}", labels.class_counts());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod decoder;
pub mod enums;
pub mod inference;
pub mod normalizer;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod pipeline;
pub mod stitcher;
pub mod volume;
pub mod window_extractor;
pub mod window_planner;

pub use config::{ConfigError, PipelineConfig, RetryPolicy};
pub use decoder::{DecodeError, decode_argmax};
pub use enums::{EdgeCoverage, Orientation, RunState};
pub use inference::{ClassScoreBlock, InferenceError, InferenceSession, ModelRuntime};
pub use normalizer::{NormalizedVolume, normalize};
pub use pipeline::{
    PipelineError, ProgressEvent, SlidingWindowRun, WindowProgress, WindowSnapshot,
    segment_volume,
};
pub use stitcher::{LabelVolume, StitchError};
pub use volume::{RawVolume, Shape, Volume, VolumeError, VolumeSource};
pub use window_extractor::{WindowTensor, extract_window};
pub use window_planner::{WindowPlanner, WindowPosition, plan_windows};

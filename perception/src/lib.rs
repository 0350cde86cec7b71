//! Real-time perception pipeline: detect, localize and track
//!
//! Fuses a black-box neural-network detector, depth-based 3D localization
//! and Kalman-filter tracking into a per-frame tick. The tracking core
//! itself lives in the `kftrack` crate; this crate owns the data model,
//! the letterbox geometry, the depth projector and the frame loop.
//!
//! ## Pipeline
//!
//! ```text
//! color frame ──► letterbox ──► detector ──► inverse mapping ─┐
//!                                                             ▼
//! depth frame + intrinsics ──► pose estimator ──► per-class trackers
//! ```
//!
//! Hosts hand owned frames to [`PerceptionPipeline::process_frame`] in
//! timestamp order; intrinsics arrive asynchronously through
//! [`PerceptionPipeline::update_camera_parameters`].

pub mod detector;
pub mod error;
pub mod letterbox;
pub mod pipeline;
pub mod pose;
pub mod types;

pub use detector::{Detector, ScriptedDetector};
pub use error::{PerceptionError, Result};
pub use letterbox::Letterbox;
pub use pipeline::{LogProfilingSink, PerceptionPipeline, ProfilingSink};
pub use pose::PoseEstimator;
pub use types::{
    BoundingBox2D, BoundingBox3D, BoxRejectionConfig, CameraIntrinsics, DetectionConfig,
    FrameOutput, ImageData, ImageFormat, KalmanConfig, LocalizationConfig, PipelineConfig,
    PipelineMode, TrackingConfig,
};

/// Crate version, for host-side telemetry.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

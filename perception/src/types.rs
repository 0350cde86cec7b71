//! Shared data types and configuration for the perception pipeline

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Axis-aligned 2D bounding box in pixel coordinates, center + extent form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox2D {
    /// Center x
    pub x: f32,
    /// Center y
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
    pub confidence: f32,
    pub class_id: usize,
    pub valid: bool,
}

impl BoundingBox2D {
    /// Build a box from center and extent; degenerate or non-finite inputs
    /// yield an invalid box rather than a panic.
    pub fn new(x: f32, y: f32, w: f32, h: f32, confidence: f32, class_id: usize) -> Self {
        let finite = x.is_finite() && y.is_finite() && w.is_finite() && h.is_finite();
        let valid = finite && w > 0.0 && h > 0.0;
        Self {
            x,
            y,
            w,
            h,
            x_min: x - w / 2.0,
            y_min: y - h / 2.0,
            x_max: x + w / 2.0,
            y_max: y + h / 2.0,
            confidence,
            class_id,
            valid,
        }
    }

    pub fn area(&self) -> f32 {
        self.w * self.h
    }

    /// Recompute the corner fields after the center or extent changed.
    pub fn update_corners(&mut self) {
        self.x_min = self.x - self.w / 2.0;
        self.x_max = self.x + self.w / 2.0;
        self.y_min = self.y - self.h / 2.0;
        self.y_max = self.y + self.h / 2.0;
    }
}

/// 3D bounding box in the camera frame, meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox3D {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
    /// Depth extent
    pub d: f32,
    pub h: f32,
    pub confidence: f32,
    pub class_id: usize,
    pub valid: bool,
}

impl BoundingBox3D {
    #[allow(clippy::too_many_arguments)]
    pub fn new(x: f32, y: f32, z: f32, w: f32, d: f32, h: f32, confidence: f32, class_id: usize) -> Self {
        let finite = [x, y, z, w, d, h].iter().all(|v| v.is_finite());
        Self {
            x,
            y,
            z,
            w,
            d,
            h,
            confidence,
            class_id,
            valid: finite && w > 0.0 && h > 0.0,
        }
    }

    /// Placeholder for a box that could not be localized.
    pub fn invalid(class_id: usize) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 0.0,
            d: 0.0,
            h: 0.0,
            confidence: 0.0,
            class_id,
            valid: false,
        }
    }
}

/// Owned 8-bit image handed into the pipeline.
#[derive(Debug, Clone)]
pub struct ImageData {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Rgb,
    Bgr,
}

impl ImageData {
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: ImageFormat) -> Self {
        Self {
            data,
            width,
            height,
            format,
        }
    }

    /// Check that the buffer length matches the declared dimensions.
    pub fn validate(&self) -> bool {
        self.data.len() == (self.width * self.height * 3) as usize
    }
}

/// Detector-facing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub image_rows: u32,
    pub image_cols: u32,
    pub num_classes: usize,
    /// Human-readable name per class id.
    pub class_map: Vec<String>,
    pub nms_threshold: f32,
    pub confidence_threshold: f32,
    pub max_output_bbox_count: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            image_rows: 480,
            image_cols: 640,
            num_classes: 1,
            class_map: vec!["object".to_string()],
            nms_threshold: 0.45,
            confidence_threshold: 0.25,
            max_output_bbox_count: 1000,
        }
    }
}

/// Kalman measurement/process configuration shared by every class tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KalmanConfig {
    pub use_dim: bool,
    pub use_vel: bool,
    /// Process noise diagonal in state layout.
    pub process_noise: Vec<f32>,
    /// Measurement noise diagonal in state layout.
    pub measurement_noise: Vec<f32>,
}

impl Default for KalmanConfig {
    fn default() -> Self {
        Self {
            use_dim: true,
            use_vel: false,
            process_noise: vec![9.0, 9.0, 200.0, 200.0, 5.0, 5.0],
            measurement_noise: vec![2.0, 2.0, 200.0, 200.0, 2.0, 2.0],
        }
    }
}

/// Data-association and life-cycle parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    pub max_frames_to_skip: u32,
    pub dist_threshold: f32,
    pub center_threshold: f32,
    pub area_threshold: f32,
    /// Expected height/width ratio of tracked bodies; 0 disables the penalty.
    pub body_ratio: f32,
    /// Fallback frame interval when timestamps are unusable, seconds.
    pub dt: f32,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            max_frames_to_skip: 15,
            dist_threshold: 150.0,
            center_threshold: 80.0,
            area_threshold: 3.0,
            body_ratio: 0.5,
            dt: 0.02,
        }
    }
}

/// Size gates applied to detections before they may seed or feed tracks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoxRejectionConfig {
    pub min_bbox_width: f32,
    pub max_bbox_width: f32,
    pub min_bbox_height: f32,
    pub max_bbox_height: f32,
}

impl Default for BoxRejectionConfig {
    fn default() -> Self {
        Self {
            min_bbox_width: 60.0,
            max_bbox_width: 400.0,
            min_bbox_height: 60.0,
            max_bbox_height: 300.0,
        }
    }
}

/// Depth-based localization parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalizationConfig {
    /// Fractional inset of the depth sampling window on each box side.
    pub rejection_threshold: f32,
    /// Valid depth range, meters.
    pub min_range: f32,
    pub max_range: f32,
}

impl Default for LocalizationConfig {
    fn default() -> Self {
        Self {
            rejection_threshold: 0.1,
            min_range: 0.15,
            max_range: 10.0,
        }
    }
}

/// Pinhole camera intrinsics plus the lens distortion vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
    pub distortion: Vec<f32>,
}

/// Which tracking problem the pipeline solves each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineMode {
    /// Track in the image plane; localize tracked states when depth arrives.
    InImage,
    /// Localize detections first, then track in the camera frame.
    Global,
}

/// Full pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub mode: PipelineMode,
    pub detection: DetectionConfig,
    pub kalman: KalmanConfig,
    pub tracking: TrackingConfig,
    pub rejection: BoxRejectionConfig,
    pub localization: LocalizationConfig,
    /// Record per-stage wall times through the profiling sink.
    pub profile: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: PipelineMode::InImage,
            detection: DetectionConfig::default(),
            kalman: KalmanConfig::default(),
            tracking: TrackingConfig::default(),
            rejection: BoxRejectionConfig::default(),
            localization: LocalizationConfig::default(),
            profile: false,
        }
    }
}

impl PipelineConfig {
    /// Load a pipeline configuration from a JSON file.
    pub fn from_json_file<P: AsRef<std::path::Path>>(path: P) -> crate::error::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Everything the pipeline produces for one frame.
#[derive(Debug, Clone, Default)]
pub struct FrameOutput {
    /// Detections per class after letterbox inversion, rejection not applied.
    pub raw_detections: Vec<Vec<BoundingBox2D>>,
    /// Representative depth per detection, meters.
    pub distances: Vec<Vec<Option<f32>>>,
    /// Camera-frame position per detection; `None` when localization failed
    /// or no intrinsics have been received yet.
    pub positions: Vec<Vec<Option<[f32; 3]>>>,
    /// Current filter state per track id, per class.
    pub tracks: Vec<BTreeMap<u32, Vec<f32>>>,
    /// Camera-frame position per tracked id (in-image mode with depth).
    pub track_positions: Vec<BTreeMap<u32, [f32; 3]>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_corners_follow_center() {
        let bbox = BoundingBox2D::new(100.0, 50.0, 40.0, 20.0, 0.9, 0);
        assert!(bbox.valid);
        assert_eq!(bbox.x_min, 80.0);
        assert_eq!(bbox.x_max, 120.0);
        assert_eq!(bbox.y_min, 40.0);
        assert_eq!(bbox.y_max, 60.0);
    }

    #[test]
    fn degenerate_bbox_is_invalid() {
        assert!(!BoundingBox2D::new(10.0, 10.0, 0.0, 5.0, 0.9, 0).valid);
        assert!(!BoundingBox2D::new(10.0, 10.0, -3.0, 5.0, 0.9, 0).valid);
        assert!(!BoundingBox2D::new(f32::NAN, 10.0, 3.0, 5.0, 0.9, 0).valid);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = PipelineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.tracking.max_frames_to_skip, 15);
        assert_eq!(back.detection.image_cols, 640);
    }
}

//! Per-frame tick: detect, un-letterbox, reject, localize, track
//!
//! One `PerceptionPipeline` owns the detector, the letterbox geometry, the
//! pose estimator and one tracker per detector class. A tick runs strictly
//! sequentially; the only state shared with other host threads is the
//! intrinsics snapshot inside the pose estimator.

use crate::detector::Detector;
use crate::error::{PerceptionError, Result};
use crate::letterbox::Letterbox;
use crate::pose::PoseEstimator;
use crate::types::{
    BoundingBox2D, BoundingBox3D, CameraIntrinsics, FrameOutput, ImageData, PipelineConfig,
    PipelineMode,
};
use kftrack::filters::DT_EPSILON;
use kftrack::{MotionModel, Observation, Tracker, TrackerParams};
use ndarray::ArrayView2;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Receives per-stage wall times when profiling is enabled.
pub trait ProfilingSink: Send {
    fn record(&mut self, stage: &str, elapsed: Duration);
}

/// Default sink: stage timings go to the log at debug level.
pub struct LogProfilingSink;

impl ProfilingSink for LogProfilingSink {
    fn record(&mut self, stage: &str, elapsed: Duration) {
        log::debug!(" - {stage} done in {} us", elapsed.as_micros());
    }
}

pub struct PerceptionPipeline {
    config: PipelineConfig,
    detector: Box<dyn Detector>,
    letterbox: Letterbox,
    pose: PoseEstimator,
    trackers: Vec<Tracker>,
    last_stamp: Option<f64>,
    profiler: Box<dyn ProfilingSink>,
}

impl PerceptionPipeline {
    pub fn new(config: PipelineConfig, detector: Box<dyn Detector>) -> Result<Self> {
        let num_classes = config.detection.num_classes;
        if num_classes == 0 {
            return Err(PerceptionError::config("num_classes must be positive"));
        }
        if detector.num_classes() != num_classes {
            log::error!(
                "detector handles {} classes, configuration expects {num_classes}",
                detector.num_classes()
            );
            return Err(PerceptionError::ClassTableMismatch {
                expected: num_classes,
                actual: detector.num_classes(),
            });
        }
        if config.detection.class_map.len() != num_classes {
            return Err(PerceptionError::config(format!(
                "class_map has {} names for {num_classes} classes",
                config.detection.class_map.len()
            )));
        }

        let model = match config.mode {
            PipelineMode::InImage => MotionModel::Linear2D,
            PipelineMode::Global => MotionModel::Linear3D,
        };
        // One tracker per class: identities never cross class boundaries
        let trackers = (0..num_classes)
            .map(|_| {
                Tracker::new(TrackerParams {
                    model,
                    max_frames_to_skip: config.tracking.max_frames_to_skip,
                    dist_threshold: config.tracking.dist_threshold,
                    center_threshold: config.tracking.center_threshold,
                    area_threshold: config.tracking.area_threshold,
                    body_ratio: config.tracking.body_ratio,
                    use_dim: config.kalman.use_dim,
                    use_vel: config.kalman.use_vel,
                    process_noise: config.kalman.process_noise.clone(),
                    measurement_noise: config.kalman.measurement_noise.clone(),
                })
            })
            .collect();

        let letterbox = Letterbox::new(config.detection.image_rows, config.detection.image_cols);
        let pose = PoseEstimator::new(config.localization.clone());

        log::info!(
            "perception pipeline ready: {:?} mode, {} classes, detector '{}'",
            config.mode,
            num_classes,
            detector.name()
        );

        Ok(Self {
            config,
            detector,
            letterbox,
            pose,
            trackers,
            last_stamp: None,
            profiler: Box::new(LogProfilingSink),
        })
    }

    /// Replace the profiling sink (host-provided telemetry).
    pub fn set_profiling_sink(&mut self, sink: Box<dyn ProfilingSink>) {
        self.profiler = sink;
    }

    /// Camera info callback. The intrinsics snapshot is the only state the
    /// host may touch concurrently with a frame tick.
    pub fn update_camera_parameters(&self, intrinsics: CameraIntrinsics) {
        self.pose.update_camera_parameters(intrinsics);
    }

    pub fn pose_estimator(&self) -> &PoseEstimator {
        &self.pose
    }

    /// Run one frame through the pipeline.
    ///
    /// `stamp` is the frame acquisition time in seconds; frames must arrive
    /// in non-decreasing stamp order. `depth` is the aligned depth frame in
    /// meters when available.
    pub fn process_frame(
        &mut self,
        image: &ImageData,
        depth: Option<ArrayView2<f32>>,
        stamp: f64,
    ) -> Result<FrameOutput> {
        let dt = self.frame_dt(stamp);
        let num_classes = self.config.detection.num_classes;

        let t0 = Instant::now();
        let padded = self.letterbox.pad(image)?;
        self.record_stage("image letterbox", t0);

        let t0 = Instant::now();
        let mut bboxes = self.detector.detect(&padded)?;
        if bboxes.len() != num_classes {
            log::error!(
                "detector returned {} class lists, expected {num_classes}; dropping frame",
                bboxes.len()
            );
            return Err(PerceptionError::ClassTableMismatch {
                expected: num_classes,
                actual: bboxes.len(),
            });
        }
        self.letterbox.adjust_boxes(&mut bboxes);
        self.record_stage("object detection", t0);

        let t0 = Instant::now();
        let (distances, positions) = match depth {
            Some(depth) => {
                let distances = self.pose.extract_distances(depth, &bboxes);
                let positions = self.pose.estimate_positions(&distances, &bboxes);
                (distances, positions)
            }
            None => (
                bboxes.iter().map(|c| vec![None; c.len()]).collect(),
                bboxes.iter().map(|c| vec![None; c.len()]).collect(),
            ),
        };
        self.record_stage("localization", t0);

        let t0 = Instant::now();
        let tracks = match self.config.mode {
            PipelineMode::InImage => {
                let observations = self.cast_2d(&bboxes);
                self.run_trackers(dt, &observations)
            }
            PipelineMode::Global => {
                let boxes3d = self.pose.make_3d_boxes(&positions, &bboxes);
                let observations = self.cast_3d(&boxes3d, &bboxes);
                self.run_trackers(dt, &observations)
            }
        };

        let track_positions = match (self.config.mode, depth) {
            (PipelineMode::InImage, Some(depth)) => {
                let track_distances = self.pose.extract_distances_tracked(depth, &tracks);
                self.pose.estimate_positions_tracked(&track_distances, &tracks)
            }
            _ => vec![BTreeMap::new(); num_classes],
        };
        self.record_stage("tracking", t0);

        Ok(FrameOutput {
            raw_detections: bboxes,
            distances,
            positions,
            tracks,
            track_positions,
        })
    }

    fn frame_dt(&mut self, stamp: f64) -> f32 {
        let dt = match self.last_stamp {
            None => self.config.tracking.dt,
            Some(prev) => (stamp - prev) as f32,
        };
        self.last_stamp = Some(stamp);
        if dt <= 0.0 {
            log::warn!("non-increasing frame stamp (dt = {dt}), clamping to {DT_EPSILON}");
            DT_EPSILON
        } else {
            dt
        }
    }

    fn run_trackers(&mut self, dt: f32, observations: &[Vec<Observation>]) -> Vec<BTreeMap<u32, Vec<f32>>> {
        self.trackers
            .iter_mut()
            .zip(observations)
            .map(|(tracker, class_observations)| {
                tracker.update(dt, class_observations);
                tracker.states()
            })
            .collect()
    }

    /// Size-gate detections and lay them out as 2D tracker observations.
    fn cast_2d(&self, bboxes: &[Vec<BoundingBox2D>]) -> Vec<Vec<Observation>> {
        bboxes
            .iter()
            .map(|class_boxes| {
                class_boxes
                    .iter()
                    .filter(|bbox| self.passes_rejection(bbox))
                    .map(|bbox| Observation {
                        position: [bbox.x, bbox.y, 0.0],
                        width: bbox.w,
                        height: bbox.h,
                        ..Default::default()
                    })
                    .collect()
            })
            .collect()
    }

    /// Localized detections as camera-frame observations; boxes that failed
    /// localization or the 2D size gate are dropped.
    fn cast_3d(
        &self,
        boxes3d: &[Vec<BoundingBox3D>],
        bboxes: &[Vec<BoundingBox2D>],
    ) -> Vec<Vec<Observation>> {
        boxes3d
            .iter()
            .zip(bboxes)
            .map(|(class_boxes3d, class_boxes)| {
                class_boxes3d
                    .iter()
                    .zip(class_boxes)
                    .filter(|(b3, b2)| b3.valid && self.passes_rejection(b2))
                    .map(|(b3, _)| Observation {
                        position: [b3.x, b3.y, b3.z],
                        width: b3.w,
                        height: b3.h,
                        depth: b3.d,
                        ..Default::default()
                    })
                    .collect()
            })
            .collect()
    }

    fn passes_rejection(&self, bbox: &BoundingBox2D) -> bool {
        let r = &self.config.rejection;
        bbox.valid
            && bbox.w >= r.min_bbox_width
            && bbox.w <= r.max_bbox_width
            && bbox.h >= r.min_bbox_height
            && bbox.h <= r.max_bbox_height
    }

    fn record_stage(&mut self, stage: &str, start: Instant) {
        if self.config.profile {
            self.profiler.record(stage, start.elapsed());
        }
    }
}

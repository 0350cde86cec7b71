//! Depth-to-position projection
//!
//! Turns 2D boxes plus an aligned depth frame into camera-frame points: a
//! robust distance is extracted from an inset window of each box, then the
//! box center is back-projected through the pinhole intrinsics. Until the
//! first intrinsics update arrives every 3D output is `None`.

use crate::types::{BoundingBox2D, BoundingBox3D, CameraIntrinsics, LocalizationConfig};
use ndarray::ArrayView2;
use std::collections::BTreeMap;
use std::sync::Mutex;

pub struct PoseEstimator {
    config: LocalizationConfig,
    /// Single-writer snapshot: readers always see a fully old or fully new
    /// set of intrinsics, even when the host updates from another thread.
    intrinsics: Mutex<Option<CameraIntrinsics>>,
}

impl PoseEstimator {
    pub fn new(config: LocalizationConfig) -> Self {
        Self {
            config,
            intrinsics: Mutex::new(None),
        }
    }

    /// Swap in a new intrinsics snapshot (camera info callback).
    pub fn update_camera_parameters(&self, intrinsics: CameraIntrinsics) {
        log::debug!(
            "camera intrinsics updated: fx={} fy={} cx={} cy={}",
            intrinsics.fx,
            intrinsics.fy,
            intrinsics.cx,
            intrinsics.cy
        );
        *self.intrinsics.lock().expect("intrinsics lock poisoned") = Some(intrinsics);
    }

    pub fn intrinsics(&self) -> Option<CameraIntrinsics> {
        self.intrinsics.lock().expect("intrinsics lock poisoned").clone()
    }

    pub fn has_intrinsics(&self) -> bool {
        self.intrinsics.lock().expect("intrinsics lock poisoned").is_some()
    }

    /// Representative distance per detection, `None` where the depth window
    /// holds no valid sample.
    pub fn extract_distances(
        &self,
        depth: ArrayView2<f32>,
        bboxes: &[Vec<BoundingBox2D>],
    ) -> Vec<Vec<Option<f32>>> {
        bboxes
            .iter()
            .map(|class_boxes| {
                class_boxes
                    .iter()
                    .map(|bbox| {
                        if bbox.valid {
                            self.window_distance(depth, bbox.x, bbox.y, bbox.w, bbox.h)
                        } else {
                            None
                        }
                    })
                    .collect()
            })
            .collect()
    }

    /// Back-project detections at their extracted distances.
    pub fn estimate_positions(
        &self,
        distances: &[Vec<Option<f32>>],
        bboxes: &[Vec<BoundingBox2D>],
    ) -> Vec<Vec<Option<[f32; 3]>>> {
        let Some(cam) = self.intrinsics() else {
            return bboxes.iter().map(|c| vec![None; c.len()]).collect();
        };
        distances
            .iter()
            .zip(bboxes)
            .map(|(class_distances, class_boxes)| {
                class_distances
                    .iter()
                    .zip(class_boxes)
                    .map(|(z, bbox)| z.map(|z| project(&cam, bbox.x, bbox.y, z)))
                    .collect()
            })
            .collect()
    }

    /// Distance per tracked id, from the 2D tracker state layout
    /// (x, y, vx, vy, w, h).
    pub fn extract_distances_tracked(
        &self,
        depth: ArrayView2<f32>,
        states: &[BTreeMap<u32, Vec<f32>>],
    ) -> Vec<BTreeMap<u32, f32>> {
        states
            .iter()
            .map(|class_states| {
                class_states
                    .iter()
                    .filter_map(|(&id, s)| {
                        self.window_distance(depth, s[0], s[1], s[4], s[5])
                            .map(|z| (id, z))
                    })
                    .collect()
            })
            .collect()
    }

    /// Back-project tracked states at their extracted distances.
    pub fn estimate_positions_tracked(
        &self,
        distances: &[BTreeMap<u32, f32>],
        states: &[BTreeMap<u32, Vec<f32>>],
    ) -> Vec<BTreeMap<u32, [f32; 3]>> {
        let Some(cam) = self.intrinsics() else {
            return vec![BTreeMap::new(); states.len()];
        };
        distances
            .iter()
            .zip(states)
            .map(|(class_distances, class_states)| {
                class_distances
                    .iter()
                    .filter_map(|(&id, &z)| {
                        class_states
                            .get(&id)
                            .map(|s| (id, project(&cam, s[0], s[1], z)))
                    })
                    .collect()
            })
            .collect()
    }

    /// Synthesize 3D boxes by back-projecting the 2D extents at depth z;
    /// the depth extent is taken equal to the width.
    pub fn make_3d_boxes(
        &self,
        positions: &[Vec<Option<[f32; 3]>>],
        bboxes: &[Vec<BoundingBox2D>],
    ) -> Vec<Vec<BoundingBox3D>> {
        let Some(cam) = self.intrinsics() else {
            return bboxes
                .iter()
                .map(|c| c.iter().map(|b| BoundingBox3D::invalid(b.class_id)).collect())
                .collect();
        };
        positions
            .iter()
            .zip(bboxes)
            .map(|(class_positions, class_boxes)| {
                class_positions
                    .iter()
                    .zip(class_boxes)
                    .map(|(point, bbox)| match point {
                        Some([x, y, z]) => {
                            let w = z * bbox.w / cam.fx;
                            let h = z * bbox.h / cam.fy;
                            BoundingBox3D::new(*x, *y, *z, w, w, h, bbox.confidence, bbox.class_id)
                        }
                        None => BoundingBox3D::invalid(bbox.class_id),
                    })
                    .collect()
            })
            .collect()
    }

    /// Median of the valid depth samples inside the inset box window.
    fn window_distance(
        &self,
        depth: ArrayView2<f32>,
        cx: f32,
        cy: f32,
        w: f32,
        h: f32,
    ) -> Option<f32> {
        let inset_x = self.config.rejection_threshold * w;
        let inset_y = self.config.rejection_threshold * h;

        let x0 = (cx - w / 2.0 + inset_x).floor().max(0.0) as usize;
        let y0 = (cy - h / 2.0 + inset_y).floor().max(0.0) as usize;
        let x1 = ((cx + w / 2.0 - inset_x).ceil().max(0.0) as usize).min(depth.ncols());
        let y1 = ((cy + h / 2.0 - inset_y).ceil().max(0.0) as usize).min(depth.nrows());

        let mut samples = Vec::new();
        for row in y0..y1 {
            for col in x0..x1 {
                let d = depth[(row, col)];
                if d.is_finite() && d > 0.0 && d >= self.config.min_range && d <= self.config.max_range
                {
                    samples.push(d);
                }
            }
        }
        median(samples)
    }
}

fn project(cam: &CameraIntrinsics, u: f32, v: f32, z: f32) -> [f32; 3] {
    [(u - cam.cx) * z / cam.fx, (v - cam.cy) * z / cam.fy, z]
}

fn median(mut samples: Vec<f32>) -> Option<f32> {
    if samples.is_empty() {
        return None;
    }
    let mid = samples.len() / 2;
    let (_, value, _) = samples.select_nth_unstable_by(mid, f32::total_cmp);
    Some(*value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;

    fn estimator_with_camera() -> PoseEstimator {
        let estimator = PoseEstimator::new(LocalizationConfig::default());
        estimator.update_camera_parameters(CameraIntrinsics {
            fx: 500.0,
            fy: 500.0,
            cx: 320.0,
            cy: 240.0,
            distortion: vec![0.0; 5],
        });
        estimator
    }

    fn bbox(x: f32, y: f32) -> BoundingBox2D {
        BoundingBox2D::new(x, y, 50.0, 50.0, 0.9, 0)
    }

    #[test]
    fn optical_axis_projects_to_origin() {
        let estimator = estimator_with_camera();
        let depth = Array2::from_elem((480, 640), 2.0f32);

        let bboxes = vec![vec![bbox(320.0, 240.0)]];
        let distances = estimator.extract_distances(depth.view(), &bboxes);
        assert_abs_diff_eq!(distances[0][0].unwrap(), 2.0);

        let positions = estimator.estimate_positions(&distances, &bboxes);
        let [x, y, z] = positions[0][0].unwrap();
        assert_abs_diff_eq!(x, 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(y, 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(z, 2.0);
    }

    #[test]
    fn off_axis_projection() {
        let estimator = estimator_with_camera();
        let depth = Array2::from_elem((480, 640), 2.0f32);

        let bboxes = vec![vec![bbox(420.0, 240.0)]];
        let distances = estimator.extract_distances(depth.view(), &bboxes);
        let positions = estimator.estimate_positions(&distances, &bboxes);
        let [x, y, _] = positions[0][0].unwrap();
        // X = 100 * 2 / 500
        assert_abs_diff_eq!(x, 0.4, epsilon = 1e-5);
        assert_abs_diff_eq!(y, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn median_shrugs_off_outliers() {
        let estimator = estimator_with_camera();
        let mut depth = Array2::from_elem((480, 640), 2.0f32);
        // A hot corner of far-away readings inside the box window
        for row in 220..230 {
            for col in 300..310 {
                depth[(row, col)] = 9.5;
            }
        }

        let bboxes = vec![vec![bbox(320.0, 240.0)]];
        let distances = estimator.extract_distances(depth.view(), &bboxes);
        assert_abs_diff_eq!(distances[0][0].unwrap(), 2.0);
    }

    #[test]
    fn out_of_range_depth_invalidates_localization_only() {
        let estimator = estimator_with_camera();
        let depth = Array2::from_elem((480, 640), 50.0f32); // beyond max_range

        let bboxes = vec![vec![bbox(320.0, 240.0)]];
        let distances = estimator.extract_distances(depth.view(), &bboxes);
        assert!(distances[0][0].is_none());

        let positions = estimator.estimate_positions(&distances, &bboxes);
        assert!(positions[0][0].is_none());
        // The 2D box itself is still usable for tracking
        assert!(bboxes[0][0].valid);
    }

    #[test]
    fn no_intrinsics_means_no_positions() {
        let estimator = PoseEstimator::new(LocalizationConfig::default());
        let depth = Array2::from_elem((480, 640), 2.0f32);

        let bboxes = vec![vec![bbox(320.0, 240.0)]];
        let distances = estimator.extract_distances(depth.view(), &bboxes);
        assert!(distances[0][0].is_some()); // distance extraction needs no camera

        let positions = estimator.estimate_positions(&distances, &bboxes);
        assert!(positions[0][0].is_none());
    }

    #[test]
    fn synthesized_3d_boxes_scale_with_depth() {
        let estimator = estimator_with_camera();
        let bboxes = vec![vec![bbox(320.0, 240.0)]];
        let positions = vec![vec![Some([0.0, 0.0, 2.0])]];

        let boxes3d = estimator.make_3d_boxes(&positions, &bboxes);
        let b = &boxes3d[0][0];
        assert!(b.valid);
        // W3 = z * w2 / fx = 2 * 50 / 500
        assert_abs_diff_eq!(b.w, 0.2, epsilon = 1e-5);
        assert_abs_diff_eq!(b.h, 0.2, epsilon = 1e-5);
        assert_abs_diff_eq!(b.d, b.w);
    }

    #[test]
    fn tracked_states_are_localized_by_id() {
        let estimator = estimator_with_camera();
        let depth = Array2::from_elem((480, 640), 2.0f32);

        let mut class_states = BTreeMap::new();
        class_states.insert(3u32, vec![420.0, 240.0, 0.0, 0.0, 50.0, 50.0]);
        let states = vec![class_states];

        let distances = estimator.extract_distances_tracked(depth.view(), &states);
        let positions = estimator.estimate_positions_tracked(&distances, &states);
        let [x, _, z] = positions[0][&3];
        assert_abs_diff_eq!(x, 0.4, epsilon = 1e-5);
        assert_abs_diff_eq!(z, 2.0);
    }
}

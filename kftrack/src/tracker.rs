//! Per-class track life-cycle: birth, update, coast, death
//!
//! One `Tracker` instance owns the tracks of a single detector class. Each
//! frame it predicts every live track forward, solves a gated assignment
//! between predicted tracks and the frame's observations, corrects matched
//! filters, coasts unmatched tracks and destroys the ones that have been
//! coasting too long. Identifiers are monotonic and never reused within a
//! tracker instance.

use crate::filters::{Filter, MotionFilter, MotionModel, Observation, DT_EPSILON};
use crate::hungarian::{HungarianSolver, SENTINEL_COST};
use ndarray::Array2;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct TrackerParams {
    pub model: MotionModel,
    /// Frames a track may coast before it is destroyed.
    pub max_frames_to_skip: u32,
    /// Gate on the Euclidean center distance in the model's frame.
    pub dist_threshold: f32,
    /// Gate on the in-plane (x, y) center distance.
    pub center_threshold: f32,
    /// Gate on the absolute log ratio of box areas.
    pub area_threshold: f32,
    /// Expected height/width ratio; 0 disables the penalty.
    pub body_ratio: f32,
    pub use_dim: bool,
    pub use_vel: bool,
    /// Process noise diagonal in state layout.
    pub process_noise: Vec<f32>,
    /// Measurement noise diagonal in state layout.
    pub measurement_noise: Vec<f32>,
}

impl Default for TrackerParams {
    fn default() -> Self {
        Self {
            model: MotionModel::Linear2D,
            max_frames_to_skip: 15,
            dist_threshold: 150.0,
            center_threshold: 80.0,
            area_threshold: 3.0,
            body_ratio: 0.5,
            use_dim: true,
            use_vel: false,
            process_noise: vec![9.0, 9.0, 200.0, 200.0, 5.0, 5.0],
            measurement_noise: vec![2.0, 2.0, 200.0, 200.0, 2.0, 2.0],
        }
    }
}

/// A persistent identified trajectory.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: u32,
    filter: MotionFilter,
    /// Consecutive frames without a matched observation.
    pub frames_since_match: u32,
    /// Total matched frames over the track's lifetime.
    pub total_hits: u32,
    /// Tracker clock value of the last matched observation, seconds.
    pub last_observation_time: f64,
}

impl Track {
    pub fn state(&self) -> Vec<f32> {
        self.filter.state()
    }

    pub fn uncertainty(&self) -> Vec<f32> {
        self.filter.uncertainty()
    }

    pub fn position(&self) -> [f32; 3] {
        self.filter.position()
    }

    pub fn dims(&self) -> (f32, f32) {
        self.filter.dims()
    }
}

/// Multi-object tracker for one detector class.
#[derive(Debug, Clone)]
pub struct Tracker {
    params: TrackerParams,
    tracks: BTreeMap<u32, Track>,
    next_id: u32,
    clock: f64,
}

impl Tracker {
    pub fn new(params: TrackerParams) -> Self {
        Self {
            params,
            tracks: BTreeMap::new(),
            next_id: 0,
            clock: 0.0,
        }
    }

    /// Advance one frame: predict, associate, correct, coast, birth, reap.
    pub fn update(&mut self, dt: f32, observations: &[Observation]) {
        self.clock += dt.max(DT_EPSILON) as f64;

        for track in self.tracks.values_mut() {
            track.filter.predict(dt);
        }

        let ids: Vec<u32> = self.tracks.keys().copied().collect();
        let mut cost = Array2::from_elem((ids.len(), observations.len()), SENTINEL_COST);
        for (row, id) in ids.iter().enumerate() {
            let track = &self.tracks[id];
            for (col, obs) in observations.iter().enumerate() {
                cost[(row, col)] = self.pair_cost(track, obs);
            }
        }

        let result = HungarianSolver::solve(cost.view());

        let mut matched = vec![false; observations.len()];
        for (row, col) in result.assignments {
            let id = ids[row];
            matched[col] = true;
            if let Some(track) = self.tracks.get_mut(&id) {
                match track.filter.correct(&observations[col]) {
                    Ok(()) => track.total_hits += 1,
                    Err(err) => {
                        // Degenerate measurement update: restart the filter
                        // from the observation instead of dropping the id
                        log::warn!("track {id}: correction failed ({err}), resetting filter");
                        track.filter.reset(&observations[col]);
                        track.total_hits = 1;
                    }
                }
                track.frames_since_match = 0;
                track.last_observation_time = self.clock;
            }
        }

        for row in result.unassigned_rows {
            if let Some(track) = self.tracks.get_mut(&ids[row]) {
                track.frames_since_match += 1;
            }
        }

        let max_skip = self.params.max_frames_to_skip;
        self.tracks.retain(|id, track| {
            let alive = track.frames_since_match <= max_skip;
            if !alive {
                log::debug!("track {id} destroyed after {} missed frames", track.frames_since_match);
            }
            alive
        });

        for (col, obs) in observations.iter().enumerate() {
            if !matched[col] {
                self.spawn_track(obs);
            }
        }
    }

    /// Current state vector per live track id.
    pub fn states(&self) -> BTreeMap<u32, Vec<f32>> {
        self.tracks
            .iter()
            .map(|(&id, track)| (id, track.state()))
            .collect()
    }

    pub fn track(&self, id: u32) -> Option<&Track> {
        self.tracks.get(&id)
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    pub fn num_tracks(&self) -> usize {
        self.tracks.len()
    }

    fn spawn_track(&mut self, obs: &Observation) {
        if !obs.is_finite() {
            log::warn!("dropping non-finite observation, no track spawned");
            return;
        }
        let filter = MotionFilter::new(
            self.params.model,
            self.params.use_dim,
            self.params.use_vel,
            &self.params.process_noise,
            &self.params.measurement_noise,
            obs,
        );
        log::debug!("track {} born at {:?}", self.next_id, obs.position);
        self.tracks.insert(
            self.next_id,
            Track {
                id: self.next_id,
                filter,
                frames_since_match: 0,
                total_hits: 1,
                last_observation_time: self.clock,
            },
        );
        self.next_id += 1;
    }

    /// Association cost for one track/observation pair; any component over
    /// its own threshold gates the pair to the sentinel.
    fn pair_cost(&self, track: &Track, obs: &Observation) -> f32 {
        let p = track.position();
        let dx = obs.position[0] - p[0];
        let dy = obs.position[1] - p[1];
        let dz = obs.position[2] - p[2];

        let d_euclid = (dx * dx + dy * dy + dz * dz).sqrt();
        if d_euclid > self.params.dist_threshold {
            return SENTINEL_COST;
        }

        let d_center = (dx * dx + dy * dy).sqrt();
        if d_center > self.params.center_threshold {
            return SENTINEL_COST;
        }

        let (tw, th) = track.dims();
        let track_area = tw * th;
        let obs_area = obs.width * obs.height;
        if track_area <= 0.0 || obs_area <= 0.0 {
            return SENTINEL_COST;
        }
        let area_ratio = (obs_area / track_area).ln().abs();
        if area_ratio > self.params.area_threshold {
            return SENTINEL_COST;
        }

        let mut cost = d_euclid / self.params.dist_threshold
            + d_center / self.params.center_threshold
            + area_ratio / self.params.area_threshold;
        if self.params.body_ratio > 0.0 && obs.width > 0.0 {
            cost += (obs.height / obs.width - self.params.body_ratio).abs();
        }

        if cost.is_finite() {
            cost
        } else {
            SENTINEL_COST
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(x: f32, y: f32, w: f32, h: f32) -> Observation {
        Observation {
            position: [x, y, 0.0],
            width: w,
            height: h,
            ..Default::default()
        }
    }

    fn tracker_with_skip(max_frames_to_skip: u32) -> Tracker {
        Tracker::new(TrackerParams {
            max_frames_to_skip,
            ..Default::default()
        })
    }

    #[test]
    fn single_object_steady_motion() {
        let mut tracker = Tracker::new(TrackerParams::default());

        tracker.update(0.1, &[obs(100.0, 100.0, 40.0, 60.0)]);
        tracker.update(0.1, &[obs(110.0, 100.0, 40.0, 60.0)]);
        tracker.update(0.1, &[obs(120.0, 100.0, 40.0, 60.0)]);

        let states = tracker.states();
        assert_eq!(states.len(), 1);
        let state = &states[&0];
        assert!((state[0] - 120.0).abs() < 2.0, "x = {}", state[0]);
        assert!((state[2] - 100.0).abs() < 20.0, "vx = {}", state[2]);
        assert_eq!(tracker.track(0).unwrap().total_hits, 3);
    }

    #[test]
    fn track_coasts_then_dies_past_max_skip() {
        let max_skip = 4;
        let mut tracker = tracker_with_skip(max_skip);
        tracker.update(0.1, &[obs(200.0, 200.0, 50.0, 50.0)]);

        // Coasting: alive while frames_since_match <= max_frames_to_skip
        for _ in 0..max_skip {
            tracker.update(0.1, &[]);
            assert_eq!(tracker.num_tracks(), 1);
        }

        tracker.update(0.1, &[]);
        assert_eq!(tracker.num_tracks(), 0);
    }

    #[test]
    fn rebirth_gets_a_fresh_id() {
        let mut tracker = tracker_with_skip(2);
        tracker.update(0.1, &[obs(200.0, 200.0, 50.0, 50.0)]);
        for _ in 0..3 {
            tracker.update(0.1, &[]);
        }
        assert_eq!(tracker.num_tracks(), 0);

        tracker.update(0.1, &[obs(200.0, 200.0, 50.0, 50.0)]);
        let states = tracker.states();
        assert_eq!(states.len(), 1);
        assert!(states.contains_key(&1), "ids must not be reused");
    }

    #[test]
    fn ids_are_monotonic() {
        let mut tracker = Tracker::new(TrackerParams::default());
        tracker.update(
            0.1,
            &[
                obs(0.0, 0.0, 20.0, 20.0),
                obs(500.0, 0.0, 20.0, 20.0),
                obs(1000.0, 0.0, 20.0, 20.0),
            ],
        );
        let ids: Vec<u32> = tracker.states().keys().copied().collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn two_objects_keep_their_tracks() {
        let mut tracker = Tracker::new(TrackerParams::default());
        tracker.update(0.1, &[obs(100.0, 100.0, 30.0, 30.0), obs(400.0, 100.0, 30.0, 30.0)]);
        tracker.update(0.1, &[obs(105.0, 100.0, 30.0, 30.0), obs(395.0, 100.0, 30.0, 30.0)]);

        let states = tracker.states();
        assert_eq!(states.len(), 2);
        assert!((states[&0][0] - 105.0).abs() < 5.0);
        assert!((states[&1][0] - 395.0).abs() < 5.0);
    }

    #[test]
    fn gating_forbids_distant_matches() {
        let params = TrackerParams {
            center_threshold: 30.0,
            ..Default::default()
        };
        let mut tracker = Tracker::new(params);
        tracker.update(0.1, &[obs(0.0, 0.0, 20.0, 20.0)]);
        // 50 px jump exceeds the 30 px center gate: the detection births a
        // second track instead of stealing the first
        tracker.update(0.1, &[obs(50.0, 0.0, 20.0, 20.0)]);
        assert_eq!(tracker.num_tracks(), 2);
    }

    #[test]
    fn raising_a_threshold_never_unmatches_more() {
        let run = |center_threshold: f32| {
            let mut tracker = Tracker::new(TrackerParams {
                center_threshold,
                ..Default::default()
            });
            tracker.update(0.1, &[obs(0.0, 0.0, 20.0, 20.0)]);
            tracker.update(0.1, &[obs(50.0, 0.0, 20.0, 20.0)]);
            // Every unmatched detection became a birth
            tracker.num_tracks() - 1
        };
        assert!(run(100.0) <= run(30.0));
    }

    #[test]
    fn non_finite_observation_is_dropped() {
        let mut tracker = Tracker::new(TrackerParams::default());
        tracker.update(0.1, &[obs(f32::NAN, 0.0, 20.0, 20.0)]);
        assert_eq!(tracker.num_tracks(), 0);
    }

    #[test]
    fn coasted_track_recovers_on_rematch() {
        let mut tracker = tracker_with_skip(5);
        tracker.update(0.1, &[obs(100.0, 100.0, 30.0, 30.0)]);
        tracker.update(0.1, &[]);
        tracker.update(0.1, &[]);
        assert_eq!(tracker.track(0).unwrap().frames_since_match, 2);

        tracker.update(0.1, &[obs(100.0, 100.0, 30.0, 30.0)]);
        let track = tracker.track(0).unwrap();
        assert_eq!(track.frames_since_match, 0);
        assert_eq!(track.total_hits, 2);
    }
}

//! Motion model family: the four Kalman filter variants behind one interface
//!
//! All variants share the predict/correct skeleton in [`KalmanCore`] and
//! differ only in state layout, transition (linear vs. nonlinear in the
//! heading) and which components the measurement observes. Position is always
//! measured; dimensions and velocity are toggled per filter by `use_dim` and
//! `use_vel`.

use crate::kalman::KalmanCore;
use anyhow::Result;
use nalgebra::{DMatrix, DVector};
use std::f32::consts::{PI, TAU};

/// Smallest admissible prediction interval; non-positive dt clamps here.
pub const DT_EPSILON: f32 = 1e-3;

const INITIAL_VARIANCE: f32 = 100.0;
const INITIAL_VELOCITY_VARIANCE: f32 = 10_000.0;

/// A single detection converted to the tracker's measurement space.
///
/// 2D observations leave `position[2]`, `velocity[2]`, `heading` and `depth`
/// at zero; velocity is only consumed by filters configured with `use_vel`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Observation {
    /// Center position; pixels for image-plane tracking, meters in 3D.
    pub position: [f32; 3],
    pub velocity: [f32; 3],
    /// Heading angle, consumed by the extended 2D variant only.
    pub heading: f32,
    pub width: f32,
    pub height: f32,
    /// Depth extent of a 3D box; carried through, never filtered.
    pub depth: f32,
}

impl Observation {
    pub fn is_finite(&self) -> bool {
        self.position.iter().all(|v| v.is_finite())
            && self.velocity.iter().all(|v| v.is_finite())
            && self.heading.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.depth.is_finite()
    }
}

/// Tag selecting one of the four filter variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionModel {
    /// State (x, y, vx, vy, w, h); constant velocity in the image plane.
    Linear2D,
    /// State (x, y, th, vx, vy, vth, w, h); body-frame velocity rotated by
    /// the heading, linearized through the transition Jacobian.
    Extended2DH,
    /// State (x, y, z, vx, vy, vz, w, h); constant velocity in camera frame.
    Linear3D,
    /// State (x, y, z, w, h); static objects, no velocity components.
    Fixed3D,
}

impl MotionModel {
    pub fn state_dim(&self) -> usize {
        match self {
            MotionModel::Linear2D => 6,
            MotionModel::Extended2DH => 8,
            MotionModel::Linear3D => 8,
            MotionModel::Fixed3D => 5,
        }
    }

    /// Indices of the always-observed pose block.
    fn pos_indices(&self) -> &'static [usize] {
        match self {
            MotionModel::Linear2D => &[0, 1],
            MotionModel::Extended2DH => &[0, 1, 2],
            MotionModel::Linear3D => &[0, 1, 2],
            MotionModel::Fixed3D => &[0, 1, 2],
        }
    }

    fn vel_indices(&self) -> &'static [usize] {
        match self {
            MotionModel::Linear2D => &[2, 3],
            MotionModel::Extended2DH => &[3, 4, 5],
            MotionModel::Linear3D => &[3, 4, 5],
            MotionModel::Fixed3D => &[],
        }
    }

    fn dim_indices(&self) -> &'static [usize] {
        match self {
            MotionModel::Linear2D => &[4, 5],
            MotionModel::Extended2DH => &[6, 7],
            MotionModel::Linear3D => &[6, 7],
            MotionModel::Fixed3D => &[3, 4],
        }
    }

    /// Index of the heading component, extended variant only.
    fn heading_index(&self) -> Option<usize> {
        match self {
            MotionModel::Extended2DH => Some(2),
            _ => None,
        }
    }

    /// Lay an observation out as a full state vector for this model.
    fn to_state(&self, obs: &Observation) -> DVector<f32> {
        let [x, y, z] = obs.position;
        let [vx, vy, vz] = obs.velocity;
        match self {
            MotionModel::Linear2D => {
                DVector::from_vec(vec![x, y, vx, vy, obs.width, obs.height])
            }
            MotionModel::Extended2DH => DVector::from_vec(vec![
                x,
                y,
                wrap_angle(obs.heading),
                vx,
                vy,
                vz,
                obs.width,
                obs.height,
            ]),
            MotionModel::Linear3D => {
                DVector::from_vec(vec![x, y, z, vx, vy, vz, obs.width, obs.height])
            }
            MotionModel::Fixed3D => DVector::from_vec(vec![x, y, z, obs.width, obs.height]),
        }
    }

    fn initial_covariance(&self) -> DMatrix<f32> {
        let dim = self.state_dim();
        let mut p = DMatrix::from_diagonal_element(dim, dim, INITIAL_VARIANCE);
        for &i in self.vel_indices() {
            p[(i, i)] = INITIAL_VELOCITY_VARIANCE;
        }
        p
    }
}

/// Wrap an angle to (-pi, pi].
pub fn wrap_angle(theta: f32) -> f32 {
    let mut t = theta % TAU;
    if t <= -PI {
        t += TAU;
    } else if t > PI {
        t -= TAU;
    }
    t
}

/// Common read/write surface of the filter family.
pub trait Filter {
    fn predict(&mut self, dt: f32);
    fn correct(&mut self, obs: &Observation) -> Result<()>;
    /// Re-initialize from a fresh measurement; used on recovery, not on
    /// ordinary updates.
    fn reset(&mut self, obs: &Observation);
    fn state(&self) -> Vec<f32>;
    fn uncertainty(&self) -> Vec<f32>;
}

/// One filter instance: a motion model over the shared Kalman algebra.
#[derive(Debug, Clone)]
pub struct MotionFilter {
    model: MotionModel,
    use_dim: bool,
    use_vel: bool,
    r_diag: DVector<f32>,
    core: KalmanCore,
}

impl MotionFilter {
    /// Build a filter initialized from its first measurement.
    ///
    /// `process_noise` and `measurement_noise` are diagonals in the state
    /// layout of `model`; short vectors are extended by repeating the last
    /// entry.
    pub fn new(
        model: MotionModel,
        use_dim: bool,
        use_vel: bool,
        process_noise: &[f32],
        measurement_noise: &[f32],
        obs: &Observation,
    ) -> Self {
        let dim = model.state_dim();
        let q = DMatrix::from_diagonal(&noise_diag(process_noise, dim));
        let core = KalmanCore::new(model.to_state(obs), model.initial_covariance(), q);
        Self {
            model,
            use_dim,
            use_vel,
            r_diag: noise_diag(measurement_noise, dim),
            core,
        }
    }

    pub fn model(&self) -> MotionModel {
        self.model
    }

    /// Center position in this model's frame; z is 0 for the 2D variants.
    pub fn position(&self) -> [f32; 3] {
        let idx = self.model.pos_indices();
        let mut pos = [0.0; 3];
        // The extended variant's pose block is (x, y, th); only x, y are spatial.
        let spatial = match self.model {
            MotionModel::Extended2DH => 2,
            _ => idx.len(),
        };
        for (slot, &i) in idx.iter().take(spatial).enumerate() {
            pos[slot] = self.core.x[i];
        }
        pos
    }

    /// Width and height from the state.
    pub fn dims(&self) -> (f32, f32) {
        let idx = self.model.dim_indices();
        (self.core.x[idx[0]], self.core.x[idx[1]])
    }

    /// Indices of the state components the measurement observes.
    fn measurement_indices(&self) -> Vec<usize> {
        let mut idx: Vec<usize> = self.model.pos_indices().to_vec();
        if self.use_vel {
            idx.extend_from_slice(self.model.vel_indices());
        }
        if self.use_dim {
            idx.extend_from_slice(self.model.dim_indices());
        }
        idx
    }

    fn wrap_heading(&mut self) {
        if let Some(i) = self.model.heading_index() {
            self.core.x[i] = wrap_angle(self.core.x[i]);
        }
    }

    fn predict_extended(&mut self, dt: f32) {
        let s = &self.core.x;
        let (vx, vy, vth) = (s[3], s[4], s[5]);
        let (sin_t, cos_t) = s[2].sin_cos();

        let mut fx = s.clone();
        fx[0] = s[0] + dt * (vx * cos_t - vy * sin_t);
        fx[1] = s[1] + dt * (vx * sin_t + vy * cos_t);
        fx[2] = s[2] + vth * dt;

        // Transition Jacobian evaluated at the current estimate
        let mut jac = DMatrix::identity(8, 8);
        jac[(0, 2)] = dt * (-vx * sin_t - vy * cos_t);
        jac[(0, 3)] = dt * cos_t;
        jac[(0, 4)] = -dt * sin_t;
        jac[(1, 2)] = dt * (vx * cos_t - vy * sin_t);
        jac[(1, 3)] = dt * sin_t;
        jac[(1, 4)] = dt * cos_t;
        jac[(2, 5)] = dt;

        self.core.predict_nonlinear(fx, &jac);
    }
}

impl Filter for MotionFilter {
    fn predict(&mut self, dt: f32) {
        let dt = if dt <= 0.0 {
            log::debug!("non-positive dt {dt}, clamping to {DT_EPSILON}");
            DT_EPSILON
        } else {
            dt
        };

        match self.model {
            MotionModel::Extended2DH => self.predict_extended(dt),
            _ => {
                let dim = self.model.state_dim();
                let mut f = DMatrix::identity(dim, dim);
                for (&pi, &vi) in self
                    .model
                    .pos_indices()
                    .iter()
                    .zip(self.model.vel_indices())
                {
                    f[(pi, vi)] = dt;
                }
                self.core.predict_linear(&f);
            }
        }
        self.wrap_heading();
    }

    fn correct(&mut self, obs: &Observation) -> Result<()> {
        let z_full = self.model.to_state(obs);
        let idx = self.measurement_indices();
        let dim = self.model.state_dim();

        let z = DVector::from_iterator(idx.len(), idx.iter().map(|&i| z_full[i]));
        let mut h = DMatrix::zeros(idx.len(), dim);
        let mut r = DMatrix::zeros(idx.len(), idx.len());
        for (row, &i) in idx.iter().enumerate() {
            h[(row, i)] = 1.0;
            r[(row, row)] = self.r_diag[i];
        }

        self.core.correct(&h, &r, &z)?;
        self.wrap_heading();
        Ok(())
    }

    fn reset(&mut self, obs: &Observation) {
        self.core.x = self.model.to_state(obs);
        self.core.p = self.model.initial_covariance();
    }

    fn state(&self) -> Vec<f32> {
        self.core.x.iter().copied().collect()
    }

    fn uncertainty(&self) -> Vec<f32> {
        self.core.uncertainty()
    }
}

fn noise_diag(values: &[f32], dim: usize) -> DVector<f32> {
    if values.is_empty() {
        log::warn!("empty noise diagonal, falling back to identity");
        return DVector::from_element(dim, 1.0);
    }
    if values.len() < dim {
        log::debug!(
            "noise diagonal has {} entries for a {dim}-dim state, repeating the last entry",
            values.len()
        );
    }
    DVector::from_iterator(dim, (0..dim).map(|i| values[i.min(values.len() - 1)]))
}

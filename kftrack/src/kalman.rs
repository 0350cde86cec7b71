//! Shared Kalman filter algebra used by every motion model

use anyhow::{bail, Result};
use nalgebra::{DMatrix, DVector};

/// State estimate and covariance propagation shared by all filter variants.
///
/// The core knows nothing about state layouts: the owning filter supplies the
/// transition matrix (or the propagated state plus its Jacobian for nonlinear
/// models) and the measurement projection on every call.
#[derive(Debug, Clone)]
pub struct KalmanCore {
    pub x: DVector<f32>, // State vector
    pub p: DMatrix<f32>, // State covariance matrix
    pub q: DMatrix<f32>, // Process noise covariance
}

impl KalmanCore {
    pub fn new(x: DVector<f32>, p: DMatrix<f32>, q: DMatrix<f32>) -> Self {
        Self { x, p, q }
    }

    pub fn dim(&self) -> usize {
        self.x.len()
    }

    /// Linear prediction: x = F * x, P = F * P * F^T + Q
    pub fn predict_linear(&mut self, f: &DMatrix<f32>) {
        self.x = f * &self.x;
        self.p = f * &self.p * f.transpose() + &self.q;
    }

    /// Nonlinear prediction: x = f(x), P = J * P * J^T + Q
    ///
    /// `fx` is the propagated state, `jac` the transition Jacobian evaluated
    /// at the previous estimate.
    pub fn predict_nonlinear(&mut self, fx: DVector<f32>, jac: &DMatrix<f32>) {
        self.x = fx;
        self.p = jac * &self.p * jac.transpose() + &self.q;
    }

    /// Correct with observation z projected through H, measurement noise R.
    ///
    /// A NaN measurement or a non-invertible innovation covariance rejects
    /// the observation and leaves the state untouched.
    pub fn correct(&mut self, h: &DMatrix<f32>, r: &DMatrix<f32>, z: &DVector<f32>) -> Result<()> {
        if z.iter().any(|v| !v.is_finite()) {
            bail!("measurement contains non-finite values");
        }

        // Residual: y = z - H * x
        let y = z - h * &self.x;

        // Innovation covariance: S = H * P * H^T + R
        let s = h * &self.p * h.transpose() + r;

        // Kalman gain: K = P * H^T * S^-1
        let s_inv = match s.try_inverse() {
            Some(inv) => inv,
            None => bail!("innovation covariance is singular"),
        };
        let k = &self.p * h.transpose() * s_inv;

        // Update state: x = x + K * y
        self.x += &k * y;

        // Update covariance: P = (I - K * H) * P
        let i = DMatrix::identity(self.dim(), self.dim());
        self.p = (i - k * h) * &self.p;

        Ok(())
    }

    /// Diagonal of P, one uncertainty per state component.
    pub fn uncertainty(&self) -> Vec<f32> {
        self.p.diagonal().iter().copied().collect()
    }
}

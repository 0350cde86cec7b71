//! Multi-object tracking core: Kalman filter family, Hungarian data
//! association and per-class track life-cycle management.
//!
//! The crate is deliberately free of any image or pipeline concern; it
//! consumes [`Observation`]s and hands back identified state vectors.
//! One [`Tracker`] instance is expected per detector class, so identities
//! never leak across classes.
//!
//! ```rust
//! use kftrack::{Observation, Tracker, TrackerParams};
//!
//! let mut tracker = Tracker::new(TrackerParams::default());
//! let obs = Observation {
//!     position: [100.0, 100.0, 0.0],
//!     width: 40.0,
//!     height: 60.0,
//!     ..Default::default()
//! };
//! tracker.update(0.1, &[obs]);
//! assert_eq!(tracker.states().len(), 1);
//! ```

pub mod filters;
pub mod hungarian;
pub mod kalman;
pub mod tracker;

pub use filters::{Filter, MotionFilter, MotionModel, Observation};
pub use hungarian::{AssignmentResult, HungarianSolver, SENTINEL_COST};
pub use kalman::KalmanCore;
pub use tracker::{Track, Tracker, TrackerParams};

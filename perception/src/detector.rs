//! Black-box detector contract
//!
//! Inference itself lives outside this crate (GPU engine, ONNX runtime);
//! the pipeline only cares that something turns a padded square frame into
//! per-class bounding boxes in padded coordinates.

use crate::error::Result;
use crate::types::{BoundingBox2D, ImageData};
use std::collections::VecDeque;

/// Common interface for object detectors.
///
/// `detect` receives an 8-bit, 3-channel, square, pre-padded frame and
/// returns one vector of boxes per class id, in the padded coordinate
/// space. The returned outer vector must have exactly `num_classes`
/// entries.
pub trait Detector: Send {
    fn detect(&mut self, image: &ImageData) -> Result<Vec<Vec<BoundingBox2D>>>;

    fn num_classes(&self) -> usize;

    /// Detector name for logging.
    fn name(&self) -> &str {
        "detector"
    }
}

/// Replays a pre-recorded sequence of detection frames.
///
/// Stands in for the inference engine in tests, examples and benchmarks;
/// once the script runs out it keeps returning empty frames.
pub struct ScriptedDetector {
    num_classes: usize,
    frames: VecDeque<Vec<Vec<BoundingBox2D>>>,
}

impl ScriptedDetector {
    pub fn new(num_classes: usize, frames: Vec<Vec<Vec<BoundingBox2D>>>) -> Self {
        Self {
            num_classes,
            frames: frames.into(),
        }
    }

    /// Append one more scripted frame.
    pub fn push_frame(&mut self, frame: Vec<Vec<BoundingBox2D>>) {
        self.frames.push_back(frame);
    }
}

impl Detector for ScriptedDetector {
    fn detect(&mut self, _image: &ImageData) -> Result<Vec<Vec<BoundingBox2D>>> {
        Ok(self
            .frames
            .pop_front()
            .unwrap_or_else(|| vec![Vec::new(); self.num_classes]))
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

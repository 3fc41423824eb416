//! Per-tick detection: frames in, pressed keys out.

use tracing::{debug, trace};

use super::matching::{match_fingers, FingerPair};
use crate::detector::{Detection, FingerDetector};
use crate::frame::{CameraId, FramePair};
use crate::geometry::{RealPosition, SpaceConverter};
use crate::keyboard::{KeyRegionStore, PressingKeys, VirtualKeyboard};
use crate::tuning::SharedTuning;

/// Everything one detection pass produced.
#[derive(Debug, Clone)]
pub struct TickDetections {
    pub top: Detection,
    pub front: Detection,
    pub pairs: Vec<FingerPair>,
    /// Triangulated fingertips; pairs with degenerate geometry are absent.
    pub positions: Vec<RealPosition>,
    pub pressing: PressingKeys,
}

/// Both finger detectors, the space converter and the virtual keyboard.
#[derive(Debug)]
pub struct DetectionStage<S> {
    top: FingerDetector,
    front: FingerDetector,
    converter: SpaceConverter,
    keyboard: VirtualKeyboard<S>,
    circle_x_distance_threshold: f32,
    tuning_revision: Option<u64>,
}

impl<S: KeyRegionStore> DetectionStage<S> {
    pub fn new(
        top: FingerDetector,
        front: FingerDetector,
        converter: SpaceConverter,
        keyboard: VirtualKeyboard<S>,
        circle_x_distance_threshold: f32,
    ) -> Self {
        Self {
            top,
            front,
            converter,
            keyboard,
            circle_x_distance_threshold,
            tuning_revision: None,
        }
    }

    pub fn detector(&self, camera: CameraId) -> &FingerDetector {
        match camera {
            CameraId::Top => &self.top,
            CameraId::Front => &self.front,
        }
    }

    pub fn keyboard(&self) -> &VirtualKeyboard<S> {
        &self.keyboard
    }

    /// Apply pending tuning, if the shared state changed since the last
    /// call. Must only be called between ticks. Returns whether new
    /// parameters were applied.
    pub fn apply_tuning(&mut self, tuning: &SharedTuning) -> bool {
        let snapshot = {
            let state = tuning.lock();
            match self.tuning_revision {
                Some(seen) => state.snapshot_since(seen),
                None => Some(state.clone()),
            }
        };
        let Some(snapshot) = snapshot else {
            return false;
        };
        let revision = snapshot.revision();
        self.top.apply(snapshot.top);
        self.front.apply(snapshot.front);
        self.tuning_revision = Some(revision);
        debug!(revision = revision, "Detector parameters applied");
        true
    }

    /// Run one tick of detection over a frame pair.
    ///
    /// The two detectors run concurrently and both finish before pairing.
    pub fn process(&mut self, frames: &FramePair) -> TickDetections {
        let (top, front) = rayon::join(
            || self.top.detect(&frames.top),
            || self.front.detect(&frames.front),
        );

        self.keyboard.reset();
        let pairs = match_fingers(&top.circles, &front.circles, self.circle_x_distance_threshold);
        let mut positions = Vec::with_capacity(pairs.len());
        for pair in &pairs {
            let (top_point, front_point) = pair.contact_points();
            let Some(position) = self.converter.convert(top_point, front_point) else {
                trace!(?pair, "Degenerate triangulation, skipping fingertip");
                continue;
            };
            // Forward depth doubles as the stroke depth.
            let hits = self.keyboard.add_test(position.x, position.y, position.z);
            trace!(x = position.x, y = position.y, z = position.z, ?hits, "Fingertip looked up");
            positions.push(position);
        }

        TickDetections {
            top,
            front,
            pairs,
            positions,
            pressing: self.keyboard.pressing_keys().clone(),
        }
    }
}

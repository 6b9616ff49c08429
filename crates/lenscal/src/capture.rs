//! Observation gathering and the estimation trigger.

use std::time::{Duration, Instant};

use log::{debug, info};
use nalgebra::Point2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureState {
    /// Detections are shown but not kept.
    Detection,
    /// Accepted detections are appended to the observation set.
    Capturing,
    /// A model exists; detections are only annotated.
    Calibrated,
}

/// Run-loop state: the capture mode plus the accumulated observations.
///
/// Batch sources start in [`CaptureState::Capturing`] and accept every
/// detection. Live sources start in [`CaptureState::Detection`] and, once
/// reset to capturing, accept at most one detection per `delay`.
#[derive(Debug, Clone)]
pub struct CaptureStateMachine {
    state: CaptureState,
    target: usize,
    live: bool,
    delay: Duration,
    clear_on_failure: bool,
    observations: Vec<Vec<Point2<f32>>>,
    last_accepted: Option<Instant>,
    /// Observation count at the last estimation attempt.
    attempted_at: Option<usize>,
}

impl CaptureStateMachine {
    pub fn new(target: usize, live: bool, delay: Duration, clear_on_failure: bool) -> Self {
        Self {
            state: if live {
                CaptureState::Detection
            } else {
                CaptureState::Capturing
            },
            target,
            live,
            delay,
            clear_on_failure,
            observations: Vec::new(),
            last_accepted: None,
            attempted_at: None,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn observations(&self) -> &[Vec<Point2<f32>>] {
        &self.observations
    }

    /// Offer a refined detection taken at `now`. Returns whether it was kept.
    pub fn offer(&mut self, points: Vec<Point2<f32>>, now: Instant) -> bool {
        if self.state != CaptureState::Capturing {
            return false;
        }
        if self.live {
            if let Some(prev) = self.last_accepted {
                if now.saturating_duration_since(prev) <= self.delay {
                    return false;
                }
            }
        }
        self.observations.push(points);
        self.last_accepted = Some(now);
        debug!(
            "accepted observation {}/{}",
            self.observations.len(),
            self.target
        );
        true
    }

    /// Enough observations, and none of them tried yet in this count.
    pub fn should_estimate(&self) -> bool {
        self.state == CaptureState::Capturing
            && self.observations.len() >= self.target
            && self.attempted_at != Some(self.observations.len())
    }

    /// End of input: one more attempt if something new arrived since the
    /// last one.
    pub fn needs_final_estimation(&self) -> bool {
        self.state != CaptureState::Calibrated
            && !self.observations.is_empty()
            && self.attempted_at != Some(self.observations.len())
    }

    /// Apply the outcome of an estimation over the current observations.
    pub fn record_estimation(&mut self, success: bool) {
        self.attempted_at = Some(self.observations.len());
        if success {
            self.state = CaptureState::Calibrated;
            return;
        }
        self.state = CaptureState::Detection;
        if self.clear_on_failure {
            info!(
                "discarding {} observations after failed calibration",
                self.observations.len()
            );
            self.observations.clear();
            self.attempted_at = None;
        }
    }

    /// Operator reset: back to capturing with an empty observation set.
    pub fn reset(&mut self) {
        self.state = CaptureState::Capturing;
        self.observations.clear();
        self.attempted_at = None;
        self.last_accepted = None;
    }
}

//! Single tracked object with its lifecycle state machine.

use ndarray::{Array1, Array2};

use crate::tracker::bbox::BoundingBox;
use crate::tracker::detection::Detection;
use crate::tracker::kalman_filter::KalmanFilter;
use crate::tracker::track_state::TrackState;

/// One persistent hypothesis about a real-world object.
///
/// A track starts `Tentative` and becomes `Confirmed` after `n_init`
/// consecutive measurement updates. A miss while `Tentative`, or more than
/// `max_age` frames without an update while `Confirmed`, moves it to
/// `Deleted`; the tracker removes deleted tracks at the frame boundary.
///
/// The motion state (`mean`, `covariance`) is owned exclusively by the
/// track and mutated only through the Kalman filter.
#[derive(Debug, Clone)]
pub struct Track {
    /// Unique track identifier, assigned at creation and never reused
    pub track_id: u64,
    /// Frames since the last successful measurement update
    pub time_since_update: u32,
    /// Appearance samples accumulated since the last gallery refresh
    pub features: Vec<Array1<f32>>,
    /// Class label carried from the spawning or last-updating detection
    pub class_id: Option<usize>,

    mean: Array1<f64>,
    covariance: Array2<f64>,
    hits: u32,
    age: u32,
    state: TrackState,
    n_init: u32,
    max_age: u32,
}

impl Track {
    pub fn new(
        mean: Array1<f64>,
        covariance: Array2<f64>,
        track_id: u64,
        n_init: u32,
        max_age: u32,
        feature: Option<Array1<f32>>,
        class_id: Option<usize>,
    ) -> Self {
        Self {
            track_id,
            time_since_update: 0,
            features: feature.into_iter().collect(),
            class_id,
            mean,
            covariance,
            hits: 0,
            age: 1,
            state: TrackState::Tentative,
            n_init,
            max_age,
        }
    }

    /// Current position estimate in TLWH form.
    #[inline]
    pub fn to_tlwh(&self) -> BoundingBox {
        BoundingBox::from_xyah(
            self.mean[0] as f32,
            self.mean[1] as f32,
            self.mean[2] as f32,
            self.mean[3] as f32,
        )
    }

    #[inline]
    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    #[inline]
    pub fn covariance(&self) -> &Array2<f64> {
        &self.covariance
    }

    #[inline]
    pub fn state(&self) -> TrackState {
        self.state
    }

    /// Consecutive successful updates since creation.
    #[inline]
    pub fn hits(&self) -> u32 {
        self.hits
    }

    /// Total frames since creation.
    #[inline]
    pub fn age(&self) -> u32 {
        self.age
    }

    /// Propagate the motion estimate one frame forward. Called once per
    /// frame for every live track, matched or not.
    pub fn predict(&mut self, kf: &KalmanFilter) {
        let (mean, covariance) = kf.predict(&self.mean, &self.covariance);
        self.mean = mean;
        self.covariance = covariance;
        self.age += 1;
        self.time_since_update += 1;
    }

    /// Fold an associated detection into the motion estimate and the
    /// appearance buffer, advancing the lifecycle state machine.
    pub fn update(&mut self, kf: &KalmanFilter, detection: &Detection) {
        let (mean, covariance) = kf.update(&self.mean, &self.covariance, detection.to_xyah_f64());
        self.mean = mean;
        self.covariance = covariance;

        self.features.extend(detection.feature.clone());
        self.class_id = detection.class_id.or(self.class_id);

        self.hits += 1;
        self.time_since_update = 0;
        if self.state == TrackState::Tentative && self.hits >= self.n_init {
            self.state = TrackState::Confirmed;
        }
    }

    /// Record that no detection was associated this frame. A tentative
    /// track dies on its first miss; a confirmed track survives `max_age`
    /// consecutive misses.
    pub fn mark_missed(&mut self) {
        if self.state == TrackState::Tentative {
            self.state = TrackState::Deleted;
        } else if self.time_since_update > self.max_age {
            self.state = TrackState::Deleted;
        }
    }

    #[inline]
    pub fn is_tentative(&self) -> bool {
        self.state == TrackState::Tentative
    }

    #[inline]
    pub fn is_confirmed(&self) -> bool {
        self.state == TrackState::Confirmed
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.state == TrackState::Deleted
    }
}

//! Main Deep SORT tracker: per-frame prediction, tiered association and
//! track lifecycle management.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::Error;
use crate::tracker::detection::Detection;
use crate::tracker::iou_matching::IouCost;
use crate::tracker::kalman_filter::KalmanFilter;
use crate::tracker::linear_assignment::{
    AssociationCost, gate_cost_matrix, matching_cascade, min_cost_matching,
};
use crate::tracker::nn_matching::NearestNeighborDistanceMetric;
use crate::tracker::track::Track;

/// Configuration for the tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Feasibility threshold for the IOU fallback association
    pub max_iou_distance: f32,
    /// Consecutive misses a confirmed track survives before deletion
    pub max_age: u32,
    /// Consecutive updates before a tentative track is confirmed
    pub n_init: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_iou_distance: 0.7,
            max_age: 50,
            n_init: 3,
        }
    }
}

/// Appearance cost with motion gating: nearest-neighbor distance against
/// the metric gallery, with pairs the Kalman state rules out overwritten
/// by the gating sentinel.
pub struct GatedAppearanceCost<'a> {
    pub kf: &'a KalmanFilter,
    pub metric: &'a NearestNeighborDistanceMetric,
}

impl AssociationCost for GatedAppearanceCost<'_> {
    fn compute(
        &self,
        tracks: &[Track],
        detections: &[Detection],
        track_indices: &[usize],
        detection_indices: &[usize],
    ) -> Result<Array2<f32>, Error> {
        let features = detection_indices
            .iter()
            .map(|&i| {
                detections[i]
                    .feature
                    .clone()
                    .ok_or(Error::MissingFeature { index: i })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let targets: Vec<u64> = track_indices.iter().map(|&i| tracks[i].track_id).collect();

        let cost_matrix = self.metric.distance(&features, &targets)?;
        Ok(gate_cost_matrix(
            self.kf,
            cost_matrix,
            tracks,
            detections,
            track_indices,
            detection_indices,
            false,
        ))
    }
}

/// Multi-object tracker.
///
/// Call [`predict`](DeepSort::predict) then [`update`](DeepSort::update)
/// once per frame, in that order, on a single thread. Track ids are
/// allocated from a tracker-owned counter, so independent instances are
/// fully isolated.
pub struct DeepSort {
    tracks: Vec<Track>,
    next_id: u64,
    config: TrackerConfig,
    kalman_filter: KalmanFilter,
    metric: NearestNeighborDistanceMetric,
}

impl DeepSort {
    pub fn new(metric: NearestNeighborDistanceMetric, config: TrackerConfig) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 1,
            config,
            kalman_filter: KalmanFilter::default(),
            metric,
        }
    }

    /// All live tracks, tentative ones included.
    #[inline]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Live confirmed tracks.
    pub fn confirmed_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(|t| t.is_confirmed())
    }

    /// Propagate every live track's state distribution one frame forward.
    pub fn predict(&mut self) {
        for track in &mut self.tracks {
            track.predict(&self.kalman_filter);
        }
    }

    /// Run measurement association and track management for one frame.
    ///
    /// A returned error means a collaborator broke its contract; the track
    /// set is left in an unspecified state for this frame and the session
    /// should be abandoned.
    pub fn update(&mut self, detections: &[Detection]) -> Result<(), Error> {
        let (matches, unmatched_tracks, unmatched_detections) =
            self.match_detections(detections)?;
        debug!(
            matched = matches.len(),
            unmatched_tracks = unmatched_tracks.len(),
            unmatched_detections = unmatched_detections.len(),
            "frame association"
        );

        for &(track_idx, detection_idx) in &matches {
            self.tracks[track_idx].update(&self.kalman_filter, &detections[detection_idx]);
        }
        for &track_idx in &unmatched_tracks {
            self.tracks[track_idx].mark_missed();
        }
        for &detection_idx in &unmatched_detections {
            self.initiate_track(&detections[detection_idx]);
        }

        for track in &self.tracks {
            if track.is_deleted() {
                trace!(track_id = track.track_id, "track deleted");
            }
        }
        self.tracks.retain(|t| !t.is_deleted());

        // Fold the frame's appearance samples into the metric gallery and
        // prune identities that are no longer confirmed.
        let active_targets: Vec<u64> = self.confirmed_tracks().map(|t| t.track_id).collect();
        let mut features = Vec::new();
        let mut targets = Vec::new();
        for track in &mut self.tracks {
            if !track.is_confirmed() {
                continue;
            }
            for feature in track.features.drain(..) {
                features.push(feature);
                targets.push(track.track_id);
            }
        }
        self.metric.partial_fit(features, &targets, &active_targets)
    }

    /// Two-round association: appearance cascade over confirmed tracks,
    /// then an IOU fallback over tentative tracks and confirmed tracks
    /// missed only this frame.
    fn match_detections(
        &self,
        detections: &[Detection],
    ) -> Result<(Vec<(usize, usize)>, Vec<usize>, Vec<usize>), Error> {
        let confirmed: Vec<usize> = (0..self.tracks.len())
            .filter(|&i| self.tracks[i].is_confirmed())
            .collect();
        let unconfirmed: Vec<usize> = (0..self.tracks.len())
            .filter(|&i| !self.tracks[i].is_confirmed())
            .collect();

        let gated_cost = GatedAppearanceCost {
            kf: &self.kalman_filter,
            metric: &self.metric,
        };
        let cascade = matching_cascade(
            &gated_cost,
            self.metric.matching_threshold(),
            self.config.max_age,
            &self.tracks,
            detections,
            &confirmed,
        )?;

        // Confirmed tracks missed only in the current frame get one IOU
        // retry; staler ones stay unmatched this round.
        let mut iou_candidates = unconfirmed;
        let mut unmatched_tracks = Vec::new();
        for track_idx in cascade.unmatched_tracks {
            if self.tracks[track_idx].time_since_update == 1 {
                iou_candidates.push(track_idx);
            } else {
                unmatched_tracks.push(track_idx);
            }
        }

        let fallback = min_cost_matching(
            &IouCost,
            self.config.max_iou_distance,
            &self.tracks,
            detections,
            &iou_candidates,
            &cascade.unmatched_detections,
        )?;

        let mut matches = cascade.matches;
        matches.extend(fallback.matches);
        unmatched_tracks.extend(fallback.unmatched_tracks);
        unmatched_tracks.sort_unstable();
        unmatched_tracks.dedup();

        Ok((matches, unmatched_tracks, fallback.unmatched_detections))
    }

    fn initiate_track(&mut self, detection: &Detection) {
        let (mean, covariance) = self.kalman_filter.initiate(detection.to_xyah_f64());
        trace!(track_id = self.next_id, "spawning tentative track");
        self.tracks.push(Track::new(
            mean,
            covariance,
            self.next_id,
            self.config.n_init,
            self.config.max_age,
            detection.feature.clone(),
            detection.class_id,
        ));
        self.next_id += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::bbox::BoundingBox;
    use crate::tracker::nn_matching::Metric;
    use ndarray::Array1;

    fn feature(dir: usize) -> Array1<f32> {
        let mut v = Array1::zeros(8);
        v[dir] = 1.0;
        v
    }

    fn detection(x: f32, dir: usize) -> Detection {
        Detection::new(
            BoundingBox::new(x, 100.0, 40.0, 80.0),
            0.9,
            Some(feature(dir)),
            None,
        )
    }

    fn tracker() -> DeepSort {
        DeepSort::new(
            NearestNeighborDistanceMetric::new(Metric::Cosine, 0.2, Some(100)),
            TrackerConfig::default(),
        )
    }

    #[test]
    fn test_unmatched_detections_spawn_tentative_tracks() {
        let mut tracker = tracker();
        tracker.predict();
        tracker.update(&[detection(100.0, 0), detection(400.0, 1)]).unwrap();

        assert_eq!(tracker.tracks().len(), 2);
        assert!(tracker.tracks().iter().all(|t| t.is_tentative()));
        assert_eq!(tracker.tracks()[0].track_id, 1);
        assert_eq!(tracker.tracks()[1].track_id, 2);
    }

    #[test]
    fn test_empty_frame_marks_all_missed_and_spawns_nothing() {
        let mut tracker = tracker();
        for _ in 0..4 {
            tracker.predict();
            tracker.update(&[detection(100.0, 0)]).unwrap();
        }
        assert_eq!(tracker.confirmed_tracks().count(), 1);

        tracker.predict();
        tracker.update(&[]).unwrap();

        assert_eq!(tracker.tracks().len(), 1);
        assert_eq!(tracker.tracks()[0].time_since_update, 1);
        assert_eq!(tracker.confirmed_tracks().count(), 1);
    }

    #[test]
    fn test_tentative_track_dies_on_first_miss() {
        let mut tracker = tracker();
        tracker.predict();
        tracker.update(&[detection(100.0, 0)]).unwrap();
        assert_eq!(tracker.tracks().len(), 1);

        tracker.predict();
        tracker.update(&[]).unwrap();
        assert!(tracker.tracks().is_empty());
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut tracker = tracker();
        tracker.predict();
        tracker.update(&[detection(100.0, 0)]).unwrap();
        tracker.predict();
        tracker.update(&[]).unwrap();
        assert!(tracker.tracks().is_empty());

        tracker.predict();
        tracker.update(&[detection(100.0, 0)]).unwrap();
        assert_eq!(tracker.tracks()[0].track_id, 2);
    }

    #[test]
    fn test_independent_trackers_are_isolated() {
        let mut a = tracker();
        let mut b = tracker();

        a.predict();
        a.update(&[detection(100.0, 0)]).unwrap();
        b.predict();
        b.update(&[detection(100.0, 0)]).unwrap();

        assert_eq!(a.tracks()[0].track_id, 1);
        assert_eq!(b.tracks()[0].track_id, 1);
    }

    #[test]
    fn test_confirmed_track_features_folded_into_gallery() {
        let mut tracker = tracker();
        for _ in 0..4 {
            tracker.predict();
            tracker.update(&[detection(100.0, 0)]).unwrap();
        }

        let track = &tracker.tracks()[0];
        assert!(track.is_confirmed());
        // buffer cleared after the gallery refresh
        assert!(track.features.is_empty());
        assert_eq!(tracker.metric.target_count(), 1);
    }

    #[test]
    fn test_missing_feature_is_a_contract_error() {
        let mut tracker = tracker();
        for _ in 0..4 {
            tracker.predict();
            tracker.update(&[detection(100.0, 0)]).unwrap();
        }

        // a confirmed track forces the appearance cascade, which needs
        // the detection's feature
        tracker.predict();
        let bare = Detection::new(BoundingBox::new(100.0, 100.0, 40.0, 80.0), 0.9, None, None);
        assert!(matches!(
            tracker.update(&[bare]),
            Err(Error::MissingFeature { index: 0 })
        ));
    }
}

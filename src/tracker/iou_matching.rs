//! Intersection-over-union association cost, used as the fallback after
//! the appearance cascade.

use ndarray::Array2;

use crate::error::Error;
use crate::tracker::detection::Detection;
use crate::tracker::linear_assignment::AssociationCost;
use crate::tracker::track::Track;

/// Compute the IOU distance matrix between the tracks' predicted boxes and
/// the detection boxes: entry (i, j) is `1 - IOU`. Disjoint pairs cost 1.0.
pub fn iou_cost(
    tracks: &[Track],
    detections: &[Detection],
    track_indices: &[usize],
    detection_indices: &[usize],
) -> Array2<f32> {
    let mut cost_matrix = Array2::zeros((track_indices.len(), detection_indices.len()));
    for (row, &track_idx) in track_indices.iter().enumerate() {
        let track_box = tracks[track_idx].to_tlwh();
        for (col, &detection_idx) in detection_indices.iter().enumerate() {
            cost_matrix[[row, col]] = 1.0 - track_box.iou(&detections[detection_idx].bbox);
        }
    }
    cost_matrix
}

/// [`AssociationCost`] wrapper around [`iou_cost`].
#[derive(Debug, Clone, Copy, Default)]
pub struct IouCost;

impl AssociationCost for IouCost {
    fn compute(
        &self,
        tracks: &[Track],
        detections: &[Detection],
        track_indices: &[usize],
        detection_indices: &[usize],
    ) -> Result<Array2<f32>, Error> {
        Ok(iou_cost(tracks, detections, track_indices, detection_indices))
    }
}

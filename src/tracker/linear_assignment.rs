//! Assignment solver, thresholded matcher and matching cascade.

use std::collections::HashSet;

use ndarray::Array2;

use crate::error::Error;
use crate::tracker::detection::Detection;
use crate::tracker::kalman_filter::{CHI2INV95, KalmanFilter};
use crate::tracker::track::Track;

/// Sentinel cost for associations ruled out by Mahalanobis gating.
pub const INFTY_COST: f32 = 1e5;

/// Association cost over index subsets of the track and detection lists.
///
/// Implementations return a cost matrix with one row per entry of
/// `track_indices` and one column per entry of `detection_indices`. Any
/// other shape is a contract breach and aborts the frame.
pub trait AssociationCost {
    fn compute(
        &self,
        tracks: &[Track],
        detections: &[Detection],
        track_indices: &[usize],
        detection_indices: &[usize],
    ) -> Result<Array2<f32>, Error>;
}

impl<F> AssociationCost for F
where
    F: Fn(&[Track], &[Detection], &[usize], &[usize]) -> Result<Array2<f32>, Error>,
{
    fn compute(
        &self,
        tracks: &[Track],
        detections: &[Detection],
        track_indices: &[usize],
        detection_indices: &[usize],
    ) -> Result<Array2<f32>, Error> {
        self(tracks, detections, track_indices, detection_indices)
    }
}

/// Outcome of one matching round, in the caller's original index space.
#[derive(Debug, Clone, Default)]
pub struct AssignmentResult {
    pub matches: Vec<(usize, usize)>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

/// Minimum-cost one-to-one matching over a rectangular cost matrix,
/// covering `min(R, C)` pairs. Degenerate (empty) matrices yield an empty
/// matching.
pub fn solve_assignment(cost_matrix: &Array2<f32>) -> Result<Vec<(usize, usize)>, Error> {
    let (num_rows, num_cols) = cost_matrix.dim();
    if num_rows == 0 || num_cols == 0 {
        return Ok(vec![]);
    }

    // Pad to square; the padding cost must dominate every real entry so
    // the solver never prefers a padded cell over a real one.
    let pad = cost_matrix
        .iter()
        .fold(1e6_f64, |acc, &c| acc.max(c as f64 + 1.0));
    let size = num_rows.max(num_cols);
    let mut padded = Array2::<f64>::from_elem((size, size), pad);
    for i in 0..num_rows {
        for j in 0..num_cols {
            padded[[i, j]] = cost_matrix[[i, j]] as f64;
        }
    }

    let (row_to_col, _) = lapjv::lapjv(&padded).map_err(|_| Error::Solver)?;

    Ok(row_to_col
        .iter()
        .enumerate()
        .filter(|&(row, &col)| row < num_rows && col < num_cols)
        .map(|(row, &col)| (row, col))
        .collect())
}

/// Run the assignment solver for one subset of tracks against one subset
/// of detections, with a hard feasibility threshold.
///
/// Costs above `max_distance` are clamped just past the threshold before
/// solving so the solver never trades a feasible pair away for an
/// infeasible one; solver-chosen pairs whose original cost still exceeds
/// the threshold are rejected into the unmatched lists. All returned
/// indices are in the original (not subset) index space.
pub fn min_cost_matching<C>(
    cost_fn: &C,
    max_distance: f32,
    tracks: &[Track],
    detections: &[Detection],
    track_indices: &[usize],
    detection_indices: &[usize],
) -> Result<AssignmentResult, Error>
where
    C: AssociationCost + ?Sized,
{
    if track_indices.is_empty() || detection_indices.is_empty() {
        // nothing to match
        return Ok(AssignmentResult {
            matches: vec![],
            unmatched_tracks: track_indices.to_vec(),
            unmatched_detections: detection_indices.to_vec(),
        });
    }

    let cost_matrix = cost_fn.compute(tracks, detections, track_indices, detection_indices)?;
    if cost_matrix.dim() != (track_indices.len(), detection_indices.len()) {
        return Err(Error::CostMatrixShape {
            expected_rows: track_indices.len(),
            expected_cols: detection_indices.len(),
            actual_rows: cost_matrix.dim().0,
            actual_cols: cost_matrix.dim().1,
        });
    }

    let clamped = cost_matrix.mapv(|c| if c > max_distance { max_distance + 1e-5 } else { c });
    let assignment = solve_assignment(&clamped)?;

    let mut matched_rows = vec![false; track_indices.len()];
    let mut matched_cols = vec![false; detection_indices.len()];
    for &(row, col) in &assignment {
        matched_rows[row] = true;
        matched_cols[col] = true;
    }

    let mut result = AssignmentResult::default();
    for (row, &track_idx) in track_indices.iter().enumerate() {
        if !matched_rows[row] {
            result.unmatched_tracks.push(track_idx);
        }
    }
    for (col, &detection_idx) in detection_indices.iter().enumerate() {
        if !matched_cols[col] {
            result.unmatched_detections.push(detection_idx);
        }
    }
    for (row, col) in assignment {
        if cost_matrix[[row, col]] > max_distance {
            result.unmatched_tracks.push(track_indices[row]);
            result.unmatched_detections.push(detection_indices[col]);
        } else {
            result
                .matches
                .push((track_indices[row], detection_indices[col]));
        }
    }
    Ok(result)
}

/// Priority-tiered matching: tracks missed exactly one frame ago get first
/// claim on the detections, then progressively staler tracks compete for
/// whatever is left.
///
/// Level `L` considers tracks with `time_since_update == L + 1` against
/// the detections no earlier level consumed. Levels with no such tracks
/// are skipped without consuming detections; the cascade stops early once
/// every detection is spoken for.
pub fn matching_cascade<C>(
    cost_fn: &C,
    max_distance: f32,
    cascade_depth: u32,
    tracks: &[Track],
    detections: &[Detection],
    track_indices: &[usize],
) -> Result<AssignmentResult, Error>
where
    C: AssociationCost + ?Sized,
{
    let mut unmatched_detections: Vec<usize> = (0..detections.len()).collect();
    let mut matches = Vec::new();

    for level in 0..cascade_depth {
        if unmatched_detections.is_empty() {
            break;
        }

        let level_indices: Vec<usize> = track_indices
            .iter()
            .copied()
            .filter(|&k| tracks[k].time_since_update == level + 1)
            .collect();
        if level_indices.is_empty() {
            continue;
        }

        let level_result = min_cost_matching(
            cost_fn,
            max_distance,
            tracks,
            detections,
            &level_indices,
            &unmatched_detections,
        )?;
        matches.extend(level_result.matches);
        unmatched_detections = level_result.unmatched_detections;
    }

    let matched: HashSet<usize> = matches.iter().map(|&(track_idx, _)| track_idx).collect();
    let unmatched_tracks = track_indices
        .iter()
        .copied()
        .filter(|k| !matched.contains(k))
        .collect();

    Ok(AssignmentResult {
        matches,
        unmatched_tracks,
        unmatched_detections,
    })
}

/// Invalidate cost-matrix entries whose track/detection pair is
/// implausible under the motion model.
///
/// Pairs whose squared Mahalanobis gating distance exceeds the chi-square
/// 95% critical value (2 DoF with `only_position`, else 4 DoF) are
/// overwritten with [`INFTY_COST`], removing them from consideration
/// regardless of appearance similarity. The matrix shape is unchanged.
pub fn gate_cost_matrix(
    kf: &KalmanFilter,
    mut cost_matrix: Array2<f32>,
    tracks: &[Track],
    detections: &[Detection],
    track_indices: &[usize],
    detection_indices: &[usize],
    only_position: bool,
) -> Array2<f32> {
    let gating_threshold = if only_position {
        CHI2INV95[1]
    } else {
        CHI2INV95[3]
    };
    let measurements: Vec<[f64; 4]> = detection_indices
        .iter()
        .map(|&i| detections[i].to_xyah_f64())
        .collect();

    for (row, &track_idx) in track_indices.iter().enumerate() {
        let track = &tracks[track_idx];
        let distances =
            kf.gating_distance(track.mean(), track.covariance(), &measurements, only_position);
        for (col, &distance) in distances.iter().enumerate() {
            if distance > gating_threshold {
                cost_matrix[[row, col]] = INFTY_COST;
            }
        }
    }
    cost_matrix
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::bbox::BoundingBox;
    use ndarray::arr2;

    fn make_tracks(kf: &KalmanFilter, count: usize) -> Vec<Track> {
        (0..count)
            .map(|i| {
                let bbox = BoundingBox::new(100.0 * i as f32, 100.0, 40.0, 80.0);
                let det = Detection::new(bbox, 0.9, None, None);
                let (mean, cov) = kf.initiate(det.to_xyah_f64());
                Track::new(mean, cov, i as u64 + 1, 3, 30, None, None)
            })
            .collect()
    }

    fn make_detections(count: usize) -> Vec<Detection> {
        (0..count)
            .map(|i| {
                let bbox = BoundingBox::new(100.0 * i as f32, 100.0, 40.0, 80.0);
                Detection::new(bbox, 0.9, None, None)
            })
            .collect()
    }

    // cost drawn from a fixed full matrix, indexed by track id and
    // detection index
    fn table_cost(
        table: &'static [[f32; 2]; 2],
    ) -> impl Fn(&[Track], &[Detection], &[usize], &[usize]) -> Result<Array2<f32>, Error> {
        move |tracks, _dets, track_indices, detection_indices| {
            let mut cost = Array2::zeros((track_indices.len(), detection_indices.len()));
            for (row, &ti) in track_indices.iter().enumerate() {
                for (col, &di) in detection_indices.iter().enumerate() {
                    cost[[row, col]] = table[tracks[ti].track_id as usize - 1][di];
                }
            }
            Ok(cost)
        }
    }

    #[test]
    fn test_solver_beats_greedy() {
        // greedy row-wise takes (0,1) then (1,0) for 11; optimal is
        // (0,0)+(1,1) = 4
        let cost = arr2(&[[2.0_f32, 1.0], [10.0, 2.0]]);
        let mut pairs = solve_assignment(&cost).unwrap();
        pairs.sort_unstable();
        assert_eq!(pairs, vec![(0, 0), (1, 1)]);
    }

    #[test]
    fn test_solver_rectangular_covers_min_dim() {
        let cost = arr2(&[[5.0_f32, 1.0, 9.0], [1.0, 5.0, 9.0]]);
        let mut pairs = solve_assignment(&cost).unwrap();
        pairs.sort_unstable();
        assert_eq!(pairs, vec![(0, 1), (1, 0)]);

        let tall = arr2(&[[1.0_f32], [0.5], [2.0]]);
        let pairs = solve_assignment(&tall).unwrap();
        assert_eq!(pairs, vec![(1, 0)]);
    }

    #[test]
    fn test_solver_empty_matrix() {
        let cost = Array2::<f32>::zeros((0, 3));
        assert!(solve_assignment(&cost).unwrap().is_empty());
    }

    #[test]
    fn test_min_cost_matching_rejects_over_threshold() {
        static TABLE: [[f32; 2]; 2] = [[0.1, 0.9], [0.9, 0.9]];
        let kf = KalmanFilter::new();
        let tracks = make_tracks(&kf, 2);
        let detections = make_detections(2);

        let result = min_cost_matching(
            &table_cost(&TABLE),
            0.5,
            &tracks,
            &detections,
            &[0, 1],
            &[0, 1],
        )
        .unwrap();

        assert_eq!(result.matches, vec![(0, 0)]);
        assert_eq!(result.unmatched_tracks, vec![1]);
        assert_eq!(result.unmatched_detections, vec![1]);
    }

    #[test]
    fn test_min_cost_matching_empty_inputs_short_circuit() {
        static TABLE: [[f32; 2]; 2] = [[0.1, 0.1], [0.1, 0.1]];
        let kf = KalmanFilter::new();
        let tracks = make_tracks(&kf, 2);
        let detections = make_detections(2);

        let result = min_cost_matching(
            &table_cost(&TABLE),
            0.5,
            &tracks,
            &detections,
            &[],
            &[0, 1],
        )
        .unwrap();
        assert!(result.matches.is_empty());
        assert!(result.unmatched_tracks.is_empty());
        assert_eq!(result.unmatched_detections, vec![0, 1]);

        let result =
            min_cost_matching(&table_cost(&TABLE), 0.5, &tracks, &detections, &[0, 1], &[])
                .unwrap();
        assert!(result.matches.is_empty());
        assert_eq!(result.unmatched_tracks, vec![0, 1]);
        assert!(result.unmatched_detections.is_empty());
    }

    #[test]
    fn test_min_cost_matching_shape_breach_is_fatal() {
        fn bad_cost(
            _tracks: &[Track],
            _dets: &[Detection],
            _ti: &[usize],
            _di: &[usize],
        ) -> Result<Array2<f32>, Error> {
            Ok(Array2::zeros((1, 1)))
        }

        let kf = KalmanFilter::new();
        let tracks = make_tracks(&kf, 2);
        let detections = make_detections(2);

        let result = min_cost_matching(&bad_cost, 0.5, &tracks, &detections, &[0, 1], &[0, 1]);
        assert!(matches!(result, Err(Error::CostMatrixShape { .. })));
    }

    #[test]
    fn test_cascade_fresh_tracks_claim_detections_first() {
        // track 1 missed one frame ago, track 2 two frames ago; the lone
        // plausible detection goes to track 1 at level 0 and track 2 finds
        // nothing feasible at level 1.
        static TABLE: [[f32; 2]; 2] = [[0.1, 0.9], [0.9, 0.9]];
        let kf = KalmanFilter::new();
        let mut tracks = make_tracks(&kf, 2);
        let detections = make_detections(2);

        tracks[0].predict(&kf);
        tracks[1].predict(&kf);
        tracks[1].predict(&kf);
        assert_eq!(tracks[0].time_since_update, 1);
        assert_eq!(tracks[1].time_since_update, 2);

        let result = matching_cascade(
            &table_cost(&TABLE),
            0.5,
            30,
            &tracks,
            &detections,
            &[0, 1],
        )
        .unwrap();

        assert_eq!(result.matches, vec![(0, 0)]);
        assert_eq!(result.unmatched_tracks, vec![1]);
        assert_eq!(result.unmatched_detections, vec![1]);
    }

    #[test]
    fn test_cascade_consumed_detection_unavailable_to_staler_track() {
        // both tracks would accept detection 0, but the fresher one takes
        // it and the staler one is left with nothing
        static TABLE: [[f32; 2]; 2] = [[0.1, 0.9], [0.1, 0.9]];
        let kf = KalmanFilter::new();
        let mut tracks = make_tracks(&kf, 2);
        let detections = make_detections(1);

        tracks[0].predict(&kf);
        tracks[1].predict(&kf);
        tracks[1].predict(&kf);

        let result = matching_cascade(
            &table_cost(&TABLE),
            0.5,
            30,
            &tracks,
            &detections,
            &[0, 1],
        )
        .unwrap();

        assert_eq!(result.matches, vec![(0, 0)]);
        assert_eq!(result.unmatched_tracks, vec![1]);
        assert!(result.unmatched_detections.is_empty());
    }

    #[test]
    fn test_cascade_partitions_detections_exactly() {
        static TABLE: [[f32; 2]; 2] = [[0.1, 0.2], [0.2, 0.1]];
        let kf = KalmanFilter::new();
        let mut tracks = make_tracks(&kf, 2);
        let detections = make_detections(2);

        for track in &mut tracks {
            track.predict(&kf);
        }

        let result = matching_cascade(
            &table_cost(&TABLE),
            0.5,
            30,
            &tracks,
            &detections,
            &[0, 1],
        )
        .unwrap();

        let mut seen: Vec<usize> = result
            .matches
            .iter()
            .map(|&(_, d)| d)
            .chain(result.unmatched_detections.iter().copied())
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1]);
        assert_eq!(result.matches.len(), 2);
    }

    #[test]
    fn test_gating_invalidates_implausible_pairs() {
        let kf = KalmanFilter::new();
        let mut tracks = make_tracks(&kf, 1);
        tracks[0].predict(&kf);

        // detection 0 sits on the track, detection 1 is far away
        let detections = vec![
            Detection::new(BoundingBox::new(0.0, 100.0, 40.0, 80.0), 0.9, None, None),
            Detection::new(
                BoundingBox::new(5000.0, 5000.0, 40.0, 80.0),
                0.9,
                None,
                None,
            ),
        ];

        let cost = Array2::from_elem((1, 2), 0.1_f32);
        let gated = gate_cost_matrix(&kf, cost, &tracks, &detections, &[0], &[0, 1], false);

        assert!((gated[[0, 0]] - 0.1).abs() < 1e-6);
        assert_eq!(gated[[0, 1]], INFTY_COST);
    }
}

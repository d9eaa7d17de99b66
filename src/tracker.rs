mod bbox;
mod deep_sort;
mod detection;
mod iou_matching;
mod kalman_filter;
mod linear_assignment;
mod nn_matching;
mod track;
mod track_state;

pub use bbox::BoundingBox;
pub use deep_sort::{DeepSort, GatedAppearanceCost, TrackerConfig};
pub use detection::Detection;
pub use iou_matching::{IouCost, iou_cost};
pub use kalman_filter::{CHI2INV95, KalmanFilter};
pub use linear_assignment::{
    AssignmentResult, AssociationCost, INFTY_COST, gate_cost_matrix, matching_cascade,
    min_cost_matching, solve_assignment,
};
pub use nn_matching::{Metric, NearestNeighborDistanceMetric};
pub use track::Track;
pub use track_state::TrackState;

use thiserror::Error;

/// Errors raised when a collaborator breaks its contract.
///
/// Empty inputs and infeasible associations are ordinary matching outcomes
/// and never surface here; a value of this type means the current frame's
/// update cannot be trusted and the tracking session should end.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cost matrix has shape {actual_rows}x{actual_cols}, expected {expected_rows}x{expected_cols}")]
    CostMatrixShape {
        expected_rows: usize,
        expected_cols: usize,
        actual_rows: usize,
        actual_cols: usize,
    },

    #[error("detection {index} carries no appearance feature")]
    MissingFeature { index: usize },

    #[error("feature has dimension {actual}, the metric gallery holds dimension {expected}")]
    FeatureDimension { expected: usize, actual: usize },

    #[error("no gallery samples for target {0}")]
    UnknownTarget(u64),

    #[error("assignment solver rejected the cost matrix")]
    Solver,
}

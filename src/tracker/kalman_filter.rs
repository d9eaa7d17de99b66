//! Constant-velocity Kalman filter over XYAH bounding box state, using
//! ndarray for the 8-dim state and nalgebra for the small dense solves.

use nalgebra::{Cholesky, DMatrix, DVector};
use ndarray::{Array1, Array2};

/// 0.95 quantile of the chi-square distribution, indexed by degrees of
/// freedom minus one. Used as the Mahalanobis gating threshold.
pub const CHI2INV95: [f64; 4] = [3.8415, 5.9915, 7.8147, 9.4877];

/// Kalman filter with state `(x, y, a, h, vx, vy, va, vh)`: bounding box
/// center, aspect ratio and height plus their velocities. Motion follows a
/// constant-velocity model; the observation is the XYAH box directly.
#[derive(Debug, Clone)]
pub struct KalmanFilter {
    motion_mat: Array2<f64>,
    update_mat: Array2<f64>,
    std_weight_position: f64,
    std_weight_velocity: f64,
}

impl Default for KalmanFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl KalmanFilter {
    pub fn new() -> Self {
        let ndim = 4;
        let mut motion_mat = Array2::eye(2 * ndim);
        for i in 0..ndim {
            motion_mat[[i, ndim + i]] = 1.0;
        }

        let mut update_mat = Array2::zeros((ndim, 2 * ndim));
        for i in 0..ndim {
            update_mat[[i, i]] = 1.0;
        }

        Self {
            motion_mat,
            update_mat,
            std_weight_position: 1.0 / 20.0,
            std_weight_velocity: 1.0 / 160.0,
        }
    }

    /// Create a track state distribution from an unassociated measurement.
    /// Velocities start at zero with high uncertainty.
    pub fn initiate(&self, measurement: [f64; 4]) -> (Array1<f64>, Array2<f64>) {
        let mut mean = Array1::zeros(8);
        for i in 0..4 {
            mean[i] = measurement[i];
        }

        let h = measurement[3];
        let std = [
            2.0 * self.std_weight_position * h,
            2.0 * self.std_weight_position * h,
            1e-2,
            2.0 * self.std_weight_position * h,
            10.0 * self.std_weight_velocity * h,
            10.0 * self.std_weight_velocity * h,
            1e-5,
            10.0 * self.std_weight_velocity * h,
        ];

        let mut cov = Array2::zeros((8, 8));
        for i in 0..8 {
            cov[[i, i]] = std[i] * std[i];
        }

        (mean, cov)
    }

    /// Propagate the state distribution one time step forward.
    pub fn predict(
        &self,
        mean: &Array1<f64>,
        covariance: &Array2<f64>,
    ) -> (Array1<f64>, Array2<f64>) {
        let h = mean[3];
        let std = [
            self.std_weight_position * h,
            self.std_weight_position * h,
            1e-2,
            self.std_weight_position * h,
            self.std_weight_velocity * h,
            self.std_weight_velocity * h,
            1e-5,
            self.std_weight_velocity * h,
        ];

        let mut motion_cov = Array2::zeros((8, 8));
        for i in 0..8 {
            motion_cov[[i, i]] = std[i] * std[i];
        }

        let new_mean = self.motion_mat.dot(mean);
        let new_covariance = self.motion_mat.dot(covariance).dot(&self.motion_mat.t()) + motion_cov;

        (new_mean, new_covariance)
    }

    /// Project the state distribution into measurement space.
    pub fn project(
        &self,
        mean: &Array1<f64>,
        covariance: &Array2<f64>,
    ) -> (Array1<f64>, Array2<f64>) {
        let h = mean[3];
        let std = [
            self.std_weight_position * h,
            self.std_weight_position * h,
            1e-1,
            self.std_weight_position * h,
        ];

        let mut innovation_cov = Array2::zeros((4, 4));
        for i in 0..4 {
            innovation_cov[[i, i]] = std[i] * std[i];
        }

        let mean_proj = self.update_mat.dot(mean);
        let covariance_proj =
            self.update_mat.dot(covariance).dot(&self.update_mat.t()) + innovation_cov;

        (mean_proj, covariance_proj)
    }

    /// Run the correction step against an associated measurement.
    pub fn update(
        &self,
        mean: &Array1<f64>,
        covariance: &Array2<f64>,
        measurement: [f64; 4],
    ) -> (Array1<f64>, Array2<f64>) {
        let (projected_mean, projected_cov) = self.project(mean, covariance);

        let measurement_arr = Array1::from_vec(measurement.to_vec());
        let innovation = measurement_arr - projected_mean;

        // Gain via Cholesky: K^T solves S K^T = (P H^T)^T, so no explicit
        // inverse of the innovation covariance is formed.
        let chol = cholesky(&projected_cov, 4);
        let pht = covariance.dot(&self.update_mat.t()); // 8x4
        let pht_t = DMatrix::from_fn(4, 8, |i, j| pht[[j, i]]);
        let gain_t = chol.solve(&pht_t); // 4x8

        let mut kalman_gain = Array2::zeros((8, 4)); // 8x4
        for i in 0..8 {
            for j in 0..4 {
                kalman_gain[[i, j]] = gain_t[(j, i)];
            }
        }

        let new_mean = mean + kalman_gain.dot(&innovation);
        let new_covariance = covariance - kalman_gain.dot(&projected_cov).dot(&kalman_gain.t());

        (new_mean, new_covariance)
    }

    /// Squared Mahalanobis distance between the state distribution and each
    /// measurement, one entry per measurement.
    ///
    /// With `only_position` the distance is computed over the box center
    /// only (2 degrees of freedom); otherwise over the full XYAH box
    /// (4 degrees of freedom). Compare against [`CHI2INV95`] at the
    /// matching degrees of freedom to gate implausible associations.
    pub fn gating_distance(
        &self,
        mean: &Array1<f64>,
        covariance: &Array2<f64>,
        measurements: &[[f64; 4]],
        only_position: bool,
    ) -> Vec<f64> {
        let (projected_mean, projected_cov) = self.project(mean, covariance);
        let dim = if only_position { 2 } else { 4 };

        let chol = cholesky(&projected_cov, dim);
        measurements
            .iter()
            .map(|m| {
                let residual = DVector::from_fn(dim, |i, _| m[i] - projected_mean[i]);
                residual.dot(&chol.solve(&residual))
            })
            .collect()
    }
}

/// Cholesky factorization of the leading `dim`x`dim` block of a covariance
/// matrix. Covariances here are positive definite by construction; a failed
/// factorization means the filter state itself is broken.
fn cholesky(covariance: &Array2<f64>, dim: usize) -> Cholesky<f64, nalgebra::Dyn> {
    let m = DMatrix::from_fn(dim, dim, |i, j| covariance[[i, j]]);
    Cholesky::new(m).expect("projected covariance is not positive definite")
}

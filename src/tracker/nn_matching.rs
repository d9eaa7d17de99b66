//! Nearest-neighbor appearance distance metric with a per-identity sample
//! gallery.

use std::collections::HashMap;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Distance function applied between appearance embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Metric {
    /// 1 - cosine similarity. The usual choice for normalized embeddings.
    Cosine,
    /// Squared Euclidean distance.
    Euclidean,
}

/// For each tracked identity, keeps a gallery of recent appearance samples
/// and scores a query feature by its distance to the closest sample.
///
/// The gallery is refreshed by the tracker once per frame through
/// [`partial_fit`](NearestNeighborDistanceMetric::partial_fit), which also
/// prunes identities that are no longer active and trims each identity to
/// the configured sample budget.
#[derive(Debug, Clone)]
pub struct NearestNeighborDistanceMetric {
    metric: Metric,
    matching_threshold: f32,
    budget: Option<usize>,
    feature_dim: Option<usize>,
    samples: HashMap<u64, Vec<Array1<f32>>>,
}

impl NearestNeighborDistanceMetric {
    /// `budget` caps the number of samples kept per identity; the most
    /// recent samples win. `None` keeps everything.
    pub fn new(metric: Metric, matching_threshold: f32, budget: Option<usize>) -> Self {
        Self {
            metric,
            matching_threshold,
            budget,
            feature_dim: None,
            samples: HashMap::new(),
        }
    }

    /// Gating threshold for the appearance matching cascade. Associations
    /// with a larger distance are disregarded.
    #[inline]
    pub fn matching_threshold(&self) -> f32 {
        self.matching_threshold
    }

    /// Number of identities currently held in the gallery.
    #[inline]
    pub fn target_count(&self) -> usize {
        self.samples.len()
    }

    /// Fold new samples into the gallery and drop identities not listed in
    /// `active_targets`. `features` and `targets` run in parallel, one
    /// target id per feature.
    pub fn partial_fit(
        &mut self,
        features: Vec<Array1<f32>>,
        targets: &[u64],
        active_targets: &[u64],
    ) -> Result<(), Error> {
        for (feature, &target) in features.into_iter().zip(targets) {
            self.check_dim(&feature)?;
            let gallery = self.samples.entry(target).or_default();
            gallery.push(feature);
            if let Some(budget) = self.budget {
                if gallery.len() > budget {
                    gallery.drain(..gallery.len() - budget);
                }
            }
        }
        self.samples.retain(|target, _| active_targets.contains(target));
        Ok(())
    }

    /// Cost matrix of shape (targets, features): entry (i, j) is the
    /// distance between `targets[i]`'s closest gallery sample and
    /// `features[j]`.
    pub fn distance(
        &self,
        features: &[Array1<f32>],
        targets: &[u64],
    ) -> Result<Array2<f32>, Error> {
        if let Some(expected) = self.feature_dim {
            for feature in features {
                if feature.len() != expected {
                    return Err(Error::FeatureDimension {
                        expected,
                        actual: feature.len(),
                    });
                }
            }
        }

        let mut cost_matrix = Array2::zeros((targets.len(), features.len()));
        for (row, &target) in targets.iter().enumerate() {
            let gallery = self
                .samples
                .get(&target)
                .filter(|samples| !samples.is_empty())
                .ok_or(Error::UnknownTarget(target))?;
            for (col, feature) in features.iter().enumerate() {
                cost_matrix[[row, col]] = gallery
                    .iter()
                    .map(|sample| self.pair_distance(sample, feature))
                    .fold(f32::INFINITY, f32::min);
            }
        }
        Ok(cost_matrix)
    }

    fn pair_distance(&self, a: &Array1<f32>, b: &Array1<f32>) -> f32 {
        match self.metric {
            Metric::Cosine => {
                let denom = a.dot(a).sqrt() * b.dot(b).sqrt();
                if denom <= f32::EPSILON {
                    1.0
                } else {
                    1.0 - a.dot(b) / denom
                }
            }
            Metric::Euclidean => {
                let diff = a - b;
                diff.dot(&diff)
            }
        }
    }

    fn check_dim(&mut self, feature: &Array1<f32>) -> Result<(), Error> {
        match self.feature_dim {
            Some(expected) if expected != feature.len() => Err(Error::FeatureDimension {
                expected,
                actual: feature.len(),
            }),
            Some(_) => Ok(()),
            None => {
                self.feature_dim = Some(feature.len());
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(i: usize) -> Array1<f32> {
        let mut v = Array1::zeros(4);
        v[i] = 1.0;
        v
    }

    #[test]
    fn test_cosine_distance() {
        let mut metric = NearestNeighborDistanceMetric::new(Metric::Cosine, 0.2, None);
        metric
            .partial_fit(vec![unit(0)], &[1], &[1])
            .unwrap();

        let cost = metric.distance(&[unit(0), unit(1)], &[1]).unwrap();
        assert!(cost[[0, 0]].abs() < 1e-6); // identical direction
        assert!((cost[[0, 1]] - 1.0).abs() < 1e-6); // orthogonal
    }

    #[test]
    fn test_nearest_sample_wins() {
        let mut metric = NearestNeighborDistanceMetric::new(Metric::Euclidean, 10.0, None);
        metric
            .partial_fit(vec![unit(0), unit(1)], &[1, 1], &[1])
            .unwrap();

        let cost = metric.distance(&[unit(1)], &[1]).unwrap();
        assert!(cost[[0, 0]].abs() < 1e-6);
    }

    #[test]
    fn test_budget_keeps_most_recent() {
        let mut metric = NearestNeighborDistanceMetric::new(Metric::Euclidean, 10.0, Some(1));
        metric
            .partial_fit(vec![unit(0)], &[1], &[1])
            .unwrap();
        metric
            .partial_fit(vec![unit(1)], &[1], &[1])
            .unwrap();

        // only unit(1) survives the budget
        let cost = metric.distance(&[unit(0)], &[1]).unwrap();
        assert!((cost[[0, 0]] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_inactive_targets_pruned() {
        let mut metric = NearestNeighborDistanceMetric::new(Metric::Cosine, 0.2, None);
        metric
            .partial_fit(vec![unit(0), unit(1)], &[1, 2], &[1, 2])
            .unwrap();
        metric.partial_fit(vec![], &[], &[2]).unwrap();

        assert_eq!(metric.target_count(), 1);
        assert!(matches!(
            metric.distance(&[unit(0)], &[1]),
            Err(Error::UnknownTarget(1))
        ));
    }

    #[test]
    fn test_feature_dimension_mismatch() {
        let mut metric = NearestNeighborDistanceMetric::new(Metric::Cosine, 0.2, None);
        metric.partial_fit(vec![unit(0)], &[1], &[1]).unwrap();

        let bad = Array1::zeros(8);
        assert!(matches!(
            metric.distance(&[bad], &[1]),
            Err(Error::FeatureDimension { expected: 4, actual: 8 })
        ));
    }
}

//! TrackerPipeline for combining detection with tracking.

use thiserror::Error;

use crate::tracker::{DeepSort, Track};

use super::DetectionSource;

/// Error from an end-to-end pipeline step: either the detector failed, or
/// a tracking collaborator broke its contract.
#[derive(Debug, Error)]
pub enum PipelineError<E> {
    #[error("detection failed: {0}")]
    Detection(E),
    #[error(transparent)]
    Tracking(#[from] crate::Error),
}

/// A combined tracker that bundles detection inference with Deep SORT.
///
/// This struct provides a convenient way to run end-to-end tracking by
/// combining any `DetectionSource` with the `DeepSort` tracker.
pub struct TrackerPipeline<D: DetectionSource> {
    detector: D,
    tracker: DeepSort,
}

impl<D: DetectionSource> TrackerPipeline<D> {
    /// Create a new tracking pipeline with the given detector and tracker.
    pub fn new(detector: D, tracker: DeepSort) -> Self {
        Self { detector, tracker }
    }

    /// Process a single frame and return the confirmed tracks.
    ///
    /// Runs detection on the input image, advances all track motion
    /// estimates, then updates the tracker with the detected objects.
    ///
    /// # Arguments
    /// * `input` - Raw image bytes
    /// * `width` - Image width in pixels
    /// * `height` - Image height in pixels
    pub fn process_frame(
        &mut self,
        input: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<Track>, PipelineError<D::Error>> {
        let detections = self
            .detector
            .detect(input, width, height)
            .map_err(PipelineError::Detection)?;
        self.tracker.predict();
        self.tracker.update(&detections)?;
        Ok(self.tracker.confirmed_tracks().cloned().collect())
    }

    /// Get a reference to the underlying detector.
    pub fn detector(&self) -> &D {
        &self.detector
    }

    /// Get a mutable reference to the underlying detector.
    pub fn detector_mut(&mut self) -> &mut D {
        &mut self.detector
    }

    /// Get a reference to the underlying tracker.
    pub fn tracker(&self) -> &DeepSort {
        &self.tracker
    }

    /// Get a mutable reference to the underlying tracker.
    pub fn tracker_mut(&mut self) -> &mut DeepSort {
        &mut self.tracker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::DetectionBuilder;
    use crate::tracker::{Detection, Metric, NearestNeighborDistanceMetric, TrackerConfig};

    struct MockDetector {
        detections: Vec<Detection>,
    }

    impl DetectionSource for MockDetector {
        type Error = std::convert::Infallible;

        fn detect(
            &mut self,
            _input: &[u8],
            _width: u32,
            _height: u32,
        ) -> Result<Vec<Detection>, Self::Error> {
            Ok(self.detections.clone())
        }
    }

    #[test]
    fn test_pipeline_confirms_track_after_n_init_updates() {
        let detector = MockDetector {
            detections: vec![
                DetectionBuilder::new()
                    .tlwh(10.0, 20.0, 40.0, 60.0)
                    .confidence(0.9)
                    .feature(vec![1.0, 0.0, 0.0, 0.0])
                    .build(),
            ],
        };

        let tracker = DeepSort::new(
            NearestNeighborDistanceMetric::new(Metric::Cosine, 0.2, Some(100)),
            TrackerConfig::default(),
        );
        let mut pipeline = TrackerPipeline::new(detector, tracker);

        for frame in 0..4 {
            let tracks = pipeline.process_frame(&[], 640, 480).unwrap();
            if frame < 3 {
                assert!(tracks.is_empty());
            } else {
                assert_eq!(tracks.len(), 1);
            }
        }
    }
}

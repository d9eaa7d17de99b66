//! A Rust implementation of the Deep SORT multi-object tracking algorithm.
//!
//! Deep SORT associates per-frame object detections (bounding box plus
//! appearance embedding) with a set of persistent tracks. Confirmed tracks
//! are matched by a priority-tiered appearance cascade with Mahalanobis
//! motion gating; leftovers and tentative tracks fall back to IOU matching.
//! Track identities survive occlusion and missed detections up to a
//! configurable age.
//!
//! ```ignore
//! use deepsort_rs::{DeepSort, DetectionBuilder, Metric, NearestNeighborDistanceMetric, TrackerConfig};
//!
//! let metric = NearestNeighborDistanceMetric::new(Metric::Cosine, 0.2, Some(100));
//! let mut tracker = DeepSort::new(metric, TrackerConfig::default());
//!
//! // once per frame
//! tracker.predict();
//! tracker.update(&detections)?;
//! for track in tracker.confirmed_tracks() {
//!     println!("{}: {:?}", track.track_id, track.to_tlwh());
//! }
//! ```

mod error;
pub mod integration;
pub mod tracker;

pub use error::Error;
pub use integration::{DetectionBuilder, DetectionSource, IntoDetections, TrackerPipeline};
pub use tracker::{
    BoundingBox, DeepSort, Detection, Metric, NearestNeighborDistanceMetric, Track, TrackState,
    TrackerConfig,
};

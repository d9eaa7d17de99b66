//! Integration module for connecting object detection backends with the
//! tracker.
//!
//! This module provides traits and utilities for feeding detections and
//! appearance embeddings from any inference backend into Deep SORT.

mod builder;
mod detector;
mod pipeline;

pub use builder::DetectionBuilder;
pub use detector::{DetectionSource, IntoDetections};
pub use pipeline::{PipelineError, TrackerPipeline};

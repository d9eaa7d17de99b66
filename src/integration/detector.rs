//! Trait for detection + embedding inference backends.

use crate::tracker::Detection;

/// A source of per-frame detections.
///
/// Implement this to connect any detection model to the tracker. Sources
/// feeding the appearance cascade must attach an embedding to every
/// detection; box-only sources are limited to IOU association.
///
/// Any `FnMut(&[u8], u32, u32) -> Result<Vec<Detection>, E>` closure is a
/// `DetectionSource`, which keeps pipelines testable without a model:
///
/// ```ignore
/// use deepsort_rs::{Detection, DetectionSource};
///
/// let mut source = |_input: &[u8], _w: u32, _h: u32| -> Result<Vec<Detection>, std::io::Error> {
///     Ok(vec![])
/// };
/// let detections = source.detect(&[], 640, 480)?;
/// ```
pub trait DetectionSource {
    /// Error type for detection failures.
    type Error;

    /// Run inference on one frame of raw image data.
    ///
    /// `input` is raw image bytes in whatever layout the implementation
    /// expects; `width` and `height` are in pixels.
    fn detect(
        &mut self,
        input: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<Detection>, Self::Error>;
}

impl<F, E> DetectionSource for F
where
    F: FnMut(&[u8], u32, u32) -> Result<Vec<Detection>, E>,
{
    type Error = E;

    fn detect(
        &mut self,
        input: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<Detection>, Self::Error> {
        self(input, width, height)
    }
}

/// Conversion from a model-specific output batch into detections.
pub trait IntoDetections {
    fn into_detections(self) -> Vec<Detection>;
}

impl IntoDetections for Vec<Detection> {
    fn into_detections(self) -> Vec<Detection> {
        self
    }
}

//! Per-frame detector observation consumed by the tracker.

use ndarray::Array1;

use crate::tracker::bbox::BoundingBox;

/// A single detector observation: bounding box, confidence score and,
/// when an appearance model ran, an embedding vector.
///
/// Detections are immutable for the duration of a frame. The appearance
/// feature is optional at the type level, but the appearance matching
/// cascade requires it and reports a contract error when it is absent.
#[derive(Debug, Clone)]
pub struct Detection {
    /// Bounding box in TLWH form
    pub bbox: BoundingBox,
    /// Detector confidence score
    pub confidence: f32,
    /// Appearance embedding, if an embedding extractor ran on this box
    pub feature: Option<Array1<f32>>,
    /// Detector class label, if the detector is multi-class
    pub class_id: Option<usize>,
}

impl Detection {
    pub fn new(
        bbox: BoundingBox,
        confidence: f32,
        feature: Option<Array1<f32>>,
        class_id: Option<usize>,
    ) -> Self {
        Self {
            bbox,
            confidence,
            feature,
            class_id,
        }
    }

    /// Bounding box in the motion model's XYAH measurement space.
    #[inline]
    pub fn to_xyah(&self) -> [f32; 4] {
        self.bbox.to_xyah()
    }

    #[inline]
    pub(crate) fn to_xyah_f64(&self) -> [f64; 4] {
        let xyah = self.bbox.to_xyah();
        [
            xyah[0] as f64,
            xyah[1] as f64,
            xyah[2] as f64,
            xyah[3] as f64,
        ]
    }
}

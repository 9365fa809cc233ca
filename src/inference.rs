// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Per-request detection parameters.
//!
//! [`DetectionParams`] carries the thresholds a request asks for plus the
//! knobs the detector needs to decode its output.

use serde::Serialize;

/// Default confidence threshold.
pub const DEFAULT_CONFIDENCE: f32 = 0.25;

/// Default `IoU` threshold for NMS.
pub const DEFAULT_IOU: f32 = 0.45;

/// Parameters for a single detection call.
///
/// # Example
///
/// ```rust
/// use yolo_web::DetectionParams;
///
/// let params = DetectionParams::new()
///     .with_confidence(0.5)
///     .with_iou(0.45)
///     .with_max_detections(100);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DetectionParams {
    /// Confidence threshold (0.0 to 1.0).
    /// Candidates scoring below this are discarded before NMS.
    pub confidence_threshold: f32,
    /// `IoU` threshold for per-class Non-Maximum Suppression (0.0 to 1.0).
    pub iou_threshold: f32,
    /// Maximum number of detections kept after NMS, highest confidence first.
    pub max_detections: usize,
    /// Explicit input size (height, width). `None` uses the model metadata.
    pub imgsz: Option<(usize, usize)>,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE,
            iou_threshold: DEFAULT_IOU,
            max_detections: 300,
            imgsz: None,
        }
    }
}

impl DetectionParams {
    /// Create parameters with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the confidence threshold.
    #[must_use]
    pub const fn with_confidence(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Set the `IoU` threshold for NMS.
    #[must_use]
    pub const fn with_iou(mut self, threshold: f32) -> Self {
        self.iou_threshold = threshold;
        self
    }

    /// Set the maximum number of detections to return.
    #[must_use]
    pub const fn with_max_detections(mut self, max: usize) -> Self {
        self.max_detections = max;
        self
    }

    /// Set the input image size as (height, width).
    #[must_use]
    pub const fn with_imgsz(mut self, height: usize, width: usize) -> Self {
        self.imgsz = Some((height, width));
        self
    }
}

/// Whether a threshold value is usable: finite and within [0, 1].
#[must_use]
pub fn is_valid_threshold(value: f32) -> bool {
    value.is_finite() && (0.0..=1.0).contains(&value)
}

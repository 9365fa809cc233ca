// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Raw detector output.
//!
//! A [`Prediction`] is what a [`crate::Detector`] hands back. Both the class
//! map and the boxes are optional, so a detector that cannot provide one of
//! them still produces a valid prediction; `detect::to_detections` turns it
//! into the public [`crate::Detection`] shape.

use std::collections::HashMap;

use ndarray::Array2;

/// Stage timings of one prediction, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Speed {
    pub preprocess: f64,
    pub inference: f64,
    pub postprocess: f64,
}

impl Speed {
    #[must_use]
    pub const fn new(preprocess: f64, inference: f64, postprocess: f64) -> Self {
        Self {
            preprocess,
            inference,
            postprocess,
        }
    }

    /// End-to-end time.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.preprocess + self.inference + self.postprocess
    }
}

/// Surviving boxes as an (N, 6) array of `[x1, y1, x2, y2, conf, cls]` rows,
/// in source image pixels.
#[derive(Debug, Clone)]
pub struct Boxes {
    pub data: Array2<f32>,
    /// Source image shape (height, width).
    pub orig_shape: (u32, u32),
}

impl Boxes {
    /// Pack `(xyxy, confidence, class_id)` rows.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_rows(rows: &[([f32; 4], f32, usize)], orig_shape: (u32, u32)) -> Self {
        let mut data = Array2::zeros((rows.len(), 6));
        for (mut out, (xyxy, conf, cls)) in data.rows_mut().into_iter().zip(rows) {
            for (k, v) in xyxy.iter().enumerate() {
                out[k] = *v;
            }
            out[4] = *conf;
            out[5] = *cls as f32;
        }
        Self { data, orig_shape }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.nrows()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row `i` split into `(xyxy, confidence, class_id)`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.len()`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn row(&self, i: usize) -> ([f32; 4], f32, usize) {
        let r = self.data.row(i);
        ([r[0], r[1], r[2], r[3]], r[4], r[5].max(0.0) as usize)
    }
}

/// Output of a single detector call.
#[derive(Debug, Clone, Default)]
pub struct Prediction {
    /// Class ID to name mapping, if the detector knows it.
    pub names: Option<HashMap<usize, String>>,
    /// Boxes left after thresholding and NMS, if the model produced any output.
    pub boxes: Option<Boxes>,
    /// Source image shape (height, width).
    pub orig_shape: (u32, u32),
    pub speed: Speed,
}

impl Prediction {
    /// Number of boxes, zero when none were produced.
    #[must_use]
    pub fn len(&self) -> usize {
        self.boxes.as_ref().map_or(0, Boxes::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

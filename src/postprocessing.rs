// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Post-processing for YOLO detection outputs.
//!
//! Decodes the raw `[1, 4 + nc, N]` (or transposed `[1, N, 4 + nc]`) output
//! into boxes in original image coordinates, applying the confidence filter,
//! per-class NMS and the detection cap.

use ndarray::{s, Array2, ArrayView2};

use crate::inference::DetectionParams;
use crate::preprocessing::Letterbox;
use crate::results::Boxes;
use crate::utils::{cmp_nan_low, nms_per_class, Candidate};

/// Post-process a detection model output.
///
/// Returns `None` when the output holds no predictions at all, and an empty
/// [`Boxes`] when predictions exist but none survive the thresholds.
#[must_use]
pub fn postprocess_detect(
    output: &[f32],
    output_shape: &[usize],
    letterbox: &Letterbox,
    params: &DetectionParams,
    num_classes: usize,
) -> Option<Boxes> {
    let (num_classes, num_predictions, is_transposed) =
        parse_detect_shape(output_shape, num_classes);

    if output.is_empty() || num_predictions == 0 {
        return None;
    }

    let num_features = 4 + num_classes;
    let output_2d = if is_transposed {
        Array2::from_shape_vec((num_predictions, num_features), output.to_vec()).ok()?
    } else {
        Array2::from_shape_vec((num_features, num_predictions), output.to_vec())
            .ok()?
            .reversed_axes()
    };

    let rows = extract_detect_boxes(output_2d.view(), letterbox, params);
    Some(Boxes::from_rows(&rows, letterbox.source))
}

/// Parse detection output shape to determine its layout.
///
/// Returns `(num_classes, num_predictions, is_transposed)`. The class count is
/// derived from the shape when metadata has no names (`expected_classes == 0`).
fn parse_detect_shape(shape: &[usize], expected_classes: usize) -> (usize, usize, bool) {
    let (a, b) = match shape.len() {
        2 => (shape[0], shape[1]),
        3 => (shape[1], shape[2]),
        _ => return (expected_classes.max(1), 0, false),
    };

    if a < 5 && b < 5 {
        return (expected_classes.max(1), 0, false);
    }

    if expected_classes == 0 {
        // Typically num_features < num_preds (e.g. 84 < 8400)
        let (num_features, num_preds, transposed) = if a < b { (a, b, false) } else { (b, a, true) };
        return (num_features.saturating_sub(4).max(1), num_preds, transposed);
    }

    if a == 4 + expected_classes {
        (expected_classes, b, false)
    } else if b == 4 + expected_classes {
        (expected_classes, a, true)
    } else if a < b {
        (a.saturating_sub(4), b, false)
    } else {
        (b.saturating_sub(4), a, true)
    }
}

/// Extract `(xyxy, score, class)` rows from a `[num_preds, 4 + nc]` view.
fn extract_detect_boxes(
    output: ArrayView2<f32>,
    letterbox: &Letterbox,
    params: &DetectionParams,
) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    for row in output.rows() {
        let (best_class, best_score) = row
            .slice(s![4..])
            .iter()
            .copied()
            .enumerate()
            .max_by(|(_, a), (_, b)| cmp_nan_low(*a, *b))
            .map_or((0, 0.0), |(idx, score)| (idx, if score.is_nan() { 0.0 } else { score }));

        if best_score < params.confidence_threshold {
            continue;
        }

        // xywh -> xyxy
        let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
        let xyxy = [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0];

        candidates.push((letterbox.restore(xyxy), best_score, best_class));
    }

    nms_per_class(&candidates, params.iou_threshold)
        .into_iter()
        .take(params.max_detections)
        .map(|i| candidates[i])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(h: u32, w: u32) -> Letterbox {
        Letterbox::fit(w, h, (h as usize, w as usize))
    }

    /// Build a `[1, 4 + nc, n]` output from `(cx, cy, w, h, scores)` predictions.
    fn channel_first(preds: &[([f32; 4], Vec<f32>)]) -> (Vec<f32>, Vec<usize>) {
        let nc = preds[0].1.len();
        let n = preds.len();
        let mut data = vec![0.0; (4 + nc) * n];
        for (i, (xywh, scores)) in preds.iter().enumerate() {
            for (f, v) in xywh.iter().chain(scores.iter()).enumerate() {
                data[f * n + i] = *v;
            }
        }
        (data, vec![1, 4 + nc, n])
    }

    #[test]
    fn test_parse_detect_shape() {
        assert_eq!(parse_detect_shape(&[1, 84, 8400], 80), (80, 8400, false));
        assert_eq!(parse_detect_shape(&[1, 8400, 84], 80), (80, 8400, true));
        assert_eq!(parse_detect_shape(&[1, 6, 8400], 0), (2, 8400, false));
        assert_eq!(parse_detect_shape(&[1, 2, 3], 80).1, 0);
    }

    #[test]
    fn test_postprocess_filters_and_suppresses() {
        let (data, shape) = channel_first(&[
            ([50.0, 50.0, 20.0, 20.0], vec![0.9, 0.1]),
            ([51.0, 51.0, 20.0, 20.0], vec![0.8, 0.1]), // duplicate of the first
            ([10.0, 10.0, 8.0, 8.0], vec![0.1, 0.7]),
            ([80.0, 80.0, 8.0, 8.0], vec![0.05, 0.1]), // below threshold
        ]);
        let params = DetectionParams::default();
        let boxes =
            postprocess_detect(&data, &shape, &identity(100, 100), &params, 2).unwrap();

        assert_eq!(boxes.len(), 2);
        let (first, conf, _) = boxes.row(0);
        assert!((conf - 0.9).abs() < 1e-6);
        assert_eq!(boxes.row(1).2, 1);
        assert!((first[0] - 40.0).abs() < 1e-4);
        assert!((first[3] - 60.0).abs() < 1e-4);
    }

    #[test]
    fn test_postprocess_respects_max_detections() {
        let (data, shape) = channel_first(&[
            ([10.0, 10.0, 4.0, 4.0], vec![0.9]),
            ([50.0, 50.0, 4.0, 4.0], vec![0.8]),
            ([90.0, 90.0, 4.0, 4.0], vec![0.7]),
        ]);
        let params = DetectionParams::default().with_max_detections(2);
        let boxes =
            postprocess_detect(&data, &shape, &identity(100, 100), &params, 1).unwrap();
        assert_eq!(boxes.len(), 2);
    }

    #[test]
    fn test_postprocess_nothing_above_threshold() {
        let (data, shape) = channel_first(&[([10.0, 10.0, 4.0, 4.0], vec![0.1])]);
        let params = DetectionParams::default();
        let boxes =
            postprocess_detect(&data, &shape, &identity(100, 100), &params, 1).unwrap();
        assert!(boxes.is_empty());
    }

    #[test]
    fn test_postprocess_empty_output() {
        let params = DetectionParams::default();
        assert!(postprocess_detect(&[], &[1, 84, 0], &identity(1, 1), &params, 80)
            .is_none());
    }
}

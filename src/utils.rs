// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Box overlap and suppression.

use std::cmp::Ordering;

/// A scored candidate: `[x1, y1, x2, y2]`, score, class index.
pub type Candidate = ([f32; 4], f32, usize);

fn area(b: &[f32; 4]) -> f32 {
    (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0)
}

/// Intersection over union of two `[x1, y1, x2, y2]` boxes, 0.0 when either is empty.
#[must_use]
pub fn calculate_iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let overlap = [a[0].max(b[0]), a[1].max(b[1]), a[2].min(b[2]), a[3].min(b[3])];
    let inter = area(&overlap);
    let union = area(a) + area(b) - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

/// Greedy non-maximum suppression within each class.
///
/// Returns indices into `candidates`, best score first. A candidate is dropped
/// when it overlaps an already kept one of the same class by more than
/// `iou_threshold`.
#[must_use]
pub fn nms_per_class(candidates: &[Candidate], iou_threshold: f32) -> Vec<usize> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| cmp_nan_low(candidates[b].1, candidates[a].1));

    let mut keep: Vec<usize> = Vec::new();
    for i in order {
        let (bbox, _, class) = &candidates[i];
        let overlaps_kept = keep.iter().any(|&k| {
            let (kept_box, _, kept_class) = &candidates[k];
            kept_class == class && calculate_iou(kept_box, bbox) > iou_threshold
        });
        if !overlaps_kept {
            keep.push(i);
        }
    }
    keep
}

/// Total order on scores where NaN ranks below every number.
#[must_use]
pub fn cmp_nan_low(a: f32, b: f32) -> Ordering {
    a.partial_cmp(&b).unwrap_or_else(|| b.is_nan().cmp(&a.is_nan()))
}

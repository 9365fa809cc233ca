// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! The inference adapter: stored image in, detections and annotated image out.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ab_glyph::FontArc;
use image::ImageReader;
use serde::Serialize;
use utoipa::ToSchema;

use crate::annotate::annotate_image;
use crate::error::{Error, Result};
use crate::inference::DetectionParams;
use crate::loader::ModelLoader;
use crate::results::Prediction;
use crate::storage::{ImageStore, StoredImage};

/// A single detected object, in source image pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Detection {
    /// Class name, or the class index as text when the model has no names.
    pub label: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
    /// `[x1, y1, x2, y2]` with `x1 <= x2` and `y1 <= y2`.
    #[serde(rename = "box")]
    #[schema(value_type = Vec<f32>)]
    pub bbox: [f32; 4],
    /// Class index, used for colouring.
    #[serde(skip)]
    pub class_id: usize,
}

/// Convert a raw [`Prediction`] into ordered [`Detection`]s.
///
/// Missing boxes yield an empty list; missing names fall back to the class index.
#[must_use]
pub fn to_detections(prediction: &Prediction) -> Vec<Detection> {
    let Some(boxes) = prediction.boxes.as_ref() else {
        return Vec::new();
    };

    (0..boxes.len())
        .map(|i| {
            let ([x1, y1, x2, y2], conf, class_id) = boxes.row(i);
            let label = prediction
                .names
                .as_ref()
                .and_then(|names| names.get(&class_id))
                .cloned()
                .unwrap_or_else(|| class_id.to_string());
            let confidence = if conf.is_nan() { 0.0 } else { conf.clamp(0.0, 1.0) };

            Detection {
                label,
                confidence,
                bbox: [x1.min(x2), y1.min(y2), x1.max(x2), y1.max(y2)],
                class_id,
            }
        })
        .collect()
}

/// Result of running the adapter on one image.
#[derive(Debug, Clone)]
pub struct DetectOutcome {
    /// Annotated render in the outputs namespace.
    pub annotated: StoredImage,
    /// Detections in detector order.
    pub detections: Vec<Detection>,
}

/// Runs the shared detector on stored images and persists annotated renders.
pub struct InferenceAdapter {
    loader: Arc<ModelLoader>,
    store: Arc<ImageStore>,
    font: Option<FontArc>,
}

impl InferenceAdapter {
    /// Create an adapter. Without a font, boxes are drawn unlabelled.
    #[must_use]
    pub const fn new(loader: Arc<ModelLoader>, store: Arc<ImageStore>, font: Option<FontArc>) -> Self {
        Self { loader, store, font }
    }

    /// The model loader.
    #[must_use]
    pub fn loader(&self) -> &ModelLoader {
        &self.loader
    }

    /// The image store.
    #[must_use]
    pub fn store(&self) -> &ImageStore {
        &self.store
    }

    /// Detect objects in the image at `image_path`.
    ///
    /// # Errors
    ///
    /// Model loading errors pass through unchanged. Decoding, detector and
    /// rendering failures become [`Error::InferenceError`].
    pub async fn detect(&self, image_path: &Path, params: DetectionParams) -> Result<DetectOutcome> {
        let detector = self.loader.get_model().await?;
        let store = Arc::clone(&self.store);
        let font = self.font.clone();
        let path: PathBuf = image_path.to_path_buf();

        tokio::task::spawn_blocking(move || {
            // Decode by content; the stored extension is only the client's claim
            let image = ImageReader::open(&path)
                .and_then(ImageReader::with_guessed_format)
                .map_err(|e| e.to_string())
                .and_then(|reader| reader.decode().map_err(|e| e.to_string()))
                .map_err(|e| {
                    Error::InferenceError(format!("failed to read image {}: {e}", path.display()))
                })?;

            let prediction = detector
                .predict(&image, &params)
                .map_err(Error::into_inference)?;
            let detections = to_detections(&prediction);
            tracing::debug!(
                image = %path.display(),
                count = detections.len(),
                inference_ms = prediction.speed.inference,
                "Detection finished"
            );

            let annotated = annotate_image(&image, &detections, font.as_ref());
            let annotated = store
                .save_annotated(&annotated)
                .map_err(Error::into_inference)?;

            Ok(DetectOutcome {
                annotated,
                detections,
            })
        })
        .await
        .map_err(|e| Error::InferenceError(format!("detection task failed: {e}")))?
    }
}

impl std::fmt::Debug for InferenceAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceAdapter")
            .field("loader", &self.loader)
            .field("store", &self.store)
            .field("font", &self.font.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use image::{DynamicImage, Rgb, RgbImage};

    use super::*;
    use crate::loader::DetectorFactory;
    use crate::model::Detector;
    use crate::results::Boxes;

    fn prediction(rows: &[([f32; 4], f32, usize)], names: Option<&[&str]>) -> Prediction {
        Prediction {
            names: names.map(|n| {
                n.iter()
                    .enumerate()
                    .map(|(i, s)| (i, (*s).to_string()))
                    .collect::<HashMap<_, _>>()
            }),
            boxes: Some(Boxes::from_rows(rows, (100, 100))),
            ..Prediction::default()
        }
    }

    #[test]
    fn test_zero_boxes_is_empty() {
        assert!(to_detections(&prediction(&[], Some(&["cat"]))).is_empty());
    }

    #[test]
    fn test_missing_boxes_is_empty() {
        assert!(to_detections(&Prediction::default()).is_empty());
    }

    #[test]
    fn test_boxes_become_ordered_detections() {
        let rows = [
            ([10.0, 20.0, 30.0, 40.0], 0.9, 1),
            ([50.0, 60.0, 5.0, 6.0], 1.2, 0),
            ([1.0, 1.0, 2.0, 2.0], -0.1, 0),
        ];
        let detections = to_detections(&prediction(&rows, Some(&["cat", "dog"])));

        assert_eq!(detections.len(), 3);
        assert_eq!(detections[0].label, "dog");
        assert_eq!(detections[0].bbox, [10.0, 20.0, 30.0, 40.0]);
        assert_eq!(detections[1].label, "cat");
        assert_eq!(detections[1].bbox, [5.0, 6.0, 50.0, 60.0]);
        for d in &detections {
            assert!((0.0..=1.0).contains(&d.confidence));
        }
    }

    #[test]
    fn test_missing_names_fall_back_to_index() {
        let detections = to_detections(&prediction(&[([0.0, 0.0, 1.0, 1.0], 0.5, 7)], None));
        assert_eq!(detections[0].label, "7");
    }

    #[test]
    fn test_detection_serializes_box_field() {
        let detection = Detection {
            label: "cat".to_string(),
            confidence: 0.5,
            bbox: [1.0, 2.0, 3.0, 4.0],
            class_id: 3,
        };
        let json = serde_json::to_value(&detection).unwrap();
        assert_eq!(json["box"], serde_json::json!([1.0, 2.0, 3.0, 4.0]));
        assert!(json.get("class_id").is_none());
    }

    struct FixedDetector(Result<Prediction>);

    impl Detector for FixedDetector {
        fn predict(&self, _: &DynamicImage, _: &DetectionParams) -> Result<Prediction> {
            match &self.0 {
                Ok(p) => Ok(p.clone()),
                Err(e) => Err(Error::DependencyError(e.to_string())),
            }
        }
    }

    struct FixedFactory(Arc<dyn Detector>);

    impl DetectorFactory for FixedFactory {
        fn build(&self, _: &Path) -> Result<Arc<dyn Detector>> {
            Ok(Arc::clone(&self.0))
        }
    }

    fn adapter(dir: &Path, detector: FixedDetector) -> InferenceAdapter {
        let model = dir.join("best.onnx");
        std::fs::write(&model, b"weights").unwrap();
        let loader = ModelLoader::new(model, Arc::new(FixedFactory(Arc::new(detector))));
        let store = ImageStore::new(dir.join("uploads"), dir.join("outputs")).unwrap();
        InferenceAdapter::new(Arc::new(loader), Arc::new(store), None)
    }

    #[tokio::test]
    async fn test_detect_writes_annotated_output() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = adapter(
            dir.path(),
            FixedDetector(Ok(prediction(&[([2.0, 2.0, 12.0, 12.0], 0.8, 0)], Some(&["cat"])))),
        );
        let input = dir.path().join("in.png");
        RgbImage::from_pixel(16, 16, Rgb([0, 0, 0])).save(&input).unwrap();

        let outcome = adapter.detect(&input, DetectionParams::default()).await.unwrap();
        assert_eq!(outcome.detections.len(), 1);
        assert_eq!(outcome.detections[0].label, "cat");
        assert!(outcome.annotated.path.exists());
        assert!(outcome.annotated.name.ends_with(".jpg"));
    }

    #[tokio::test]
    async fn test_detect_failures_are_inference_errors() {
        let dir = tempfile::tempdir().unwrap();
        let failing = adapter(
            dir.path(),
            FixedDetector(Err(Error::DependencyError("boom".to_string()))),
        );
        let input = dir.path().join("in.png");
        RgbImage::new(4, 4).save(&input).unwrap();

        let err = failing.detect(&input, DetectionParams::default()).await.unwrap_err();
        assert!(matches!(err, Error::InferenceError(ref m) if m.contains("boom")));

        let garbage = dir.path().join("garbage.jpg");
        std::fs::write(&garbage, b"not an image").unwrap();
        let err = failing.detect(&garbage, DetectionParams::default()).await.unwrap_err();
        assert!(matches!(err, Error::InferenceError(_)));
    }
}

// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! YOLO model loading and inference.
//!
//! [`Detector`] is the seam between the web application and whatever runs
//! the model. [`YOLOModel`] is the ONNX Runtime implementation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use image::DynamicImage;
use ndarray::Array4;
use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;

use crate::error::{Error, Result};
use crate::inference::DetectionParams;
use crate::metadata::{ModelMetadata, METADATA_KEYS};
use crate::postprocessing::postprocess_detect;
use crate::preprocessing::preprocess_image;
use crate::results::{Prediction, Speed};

/// Something that can find objects in an image.
///
/// Implementations own every algorithmic decision: box regression, class
/// scoring, confidence filtering and overlap suppression.
pub trait Detector: Send + Sync {
    /// Run detection on a decoded image.
    ///
    /// # Errors
    ///
    /// Returns an error if the model fails to run on this input.
    fn predict(&self, image: &DynamicImage, params: &DetectionParams) -> Result<Prediction>;
}

/// YOLO detection model backed by an ONNX Runtime session.
///
/// The session needs exclusive access to run, so calls are serialized through
/// an internal lock.
///
/// # Example
///
/// ```no_run
/// use yolo_web::{DetectionParams, Detector, YOLOModel};
///
/// let model = YOLOModel::load("models/best.onnx")?;
/// let image = image::open("bus.jpg").expect("readable image");
/// let prediction = model.predict(&image, &DetectionParams::default())?;
/// println!("Found {} detections", prediction.len());
/// # Ok::<(), yolo_web::Error>(())
/// ```
pub struct YOLOModel {
    session: Mutex<Session>,
    metadata: ModelMetadata,
    input_name: String,
    output_name: String,
    model_path: PathBuf,
}

impl YOLOModel {
    /// Load a YOLO detection model from an ONNX file.
    ///
    /// Class names, input size and stride come from the model's Ultralytics
    /// metadata. The session always runs on the CPU execution provider.
    ///
    /// # Errors
    ///
    /// * [`Error::ConfigurationError`] if the file does not exist or is not a
    ///   detection model.
    /// * [`Error::DependencyError`] if ONNX Runtime cannot create the session.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_with_threads(path, 0)
    }

    /// Load a model with an explicit intra-op thread count (`0` lets ONNX Runtime decide).
    ///
    /// # Errors
    ///
    /// See [`YOLOModel::load`].
    pub fn load_with_threads<P: AsRef<Path>>(path: P, num_threads: usize) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(Error::ConfigurationError(format!(
                "Model file not found at {}. Place your trained model there or set MODEL_PATH.",
                path.display()
            )));
        }

        let dependency = |what: &str, e: ort::Error| Error::DependencyError(format!("{what}: {e}"));

        let session = Session::builder()
            .map_err(|e| dependency("Failed to initialize ONNX Runtime", e))?
            .with_execution_providers([CPUExecutionProvider::default().build()])
            .map_err(|e| dependency("Failed to register CPU execution provider", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| dependency("Failed to set optimization level", e))?
            .with_intra_threads(num_threads)
            .map_err(|e| dependency("Failed to set intra-thread count", e))?
            .commit_from_file(path)
            .map_err(|e| {
                dependency(&format!("Error loading YOLO model from {}", path.display()), e)
            })?;

        let metadata = Self::extract_metadata(&session)?;
        if !metadata.is_detect() {
            return Err(Error::ConfigurationError(format!(
                "Model at {} is a '{}' model, only detection models are supported",
                path.display(),
                metadata.task
            )));
        }

        let input_name = session
            .inputs
            .first()
            .map_or_else(|| "images".to_string(), |i| i.name.clone());
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| Error::DependencyError("Model declares no outputs".to_string()))?;

        tracing::info!(
            path = %path.display(),
            classes = metadata.num_classes(),
            imgsz = ?metadata.imgsz,
            "Loaded detection model"
        );

        Ok(Self {
            session: Mutex::new(session),
            metadata,
            input_name,
            output_name,
            model_path: path.to_path_buf(),
        })
    }

    /// Extract Ultralytics metadata from the ONNX session.
    fn extract_metadata(session: &Session) -> Result<ModelMetadata> {
        let model_metadata = session
            .metadata()
            .map_err(|e| Error::DependencyError(format!("Failed to get model metadata: {e}")))?;

        let fields: Vec<(&str, String)> = METADATA_KEYS
            .iter()
            .filter_map(|&key| match model_metadata.custom(key) {
                Ok(Some(value)) => Some((key, value)),
                _ => None,
            })
            .collect();

        if fields.is_empty() {
            tracing::warn!("Model has no Ultralytics metadata, using defaults");
            return Ok(ModelMetadata::default());
        }

        ModelMetadata::from_fields(fields.iter().map(|(key, value)| (*key, value.as_str())))
    }

    /// Run the session on a preprocessed tensor, returning `(data, shape)` of the first output.
    fn run_inference(&self, input: &Array4<f32>) -> Result<(Vec<f32>, Vec<usize>)> {
        let input_contiguous = input.as_standard_layout();
        let input_tensor = TensorRef::from_array_view(&input_contiguous)
            .map_err(|e| Error::InferenceError(format!("Failed to create input tensor: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| Error::InferenceError("Model session lock poisoned".to_string()))?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .map_err(|e| Error::InferenceError(format!("Inference failed: {e}")))?;

        let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            Error::InferenceError(format!("Output '{}' not found", self.output_name))
        })?;

        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| Error::InferenceError(format!("Failed to extract output: {e}")))?;

        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let shape_vec: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        Ok((data.to_vec(), shape_vec))
    }

    /// Get the model's class names.
    #[must_use]
    pub fn names(&self) -> &HashMap<usize, String> {
        &self.metadata.names
    }

    /// Get the model's input size.
    #[must_use]
    pub const fn imgsz(&self) -> (usize, usize) {
        self.metadata.imgsz
    }

    /// Get the model metadata.
    #[must_use]
    pub const fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    /// Path the model was loaded from.
    #[must_use]
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }
}

impl Detector for YOLOModel {
    fn predict(&self, image: &DynamicImage, params: &DetectionParams) -> Result<Prediction> {
        let target_size = params.imgsz.unwrap_or(self.metadata.imgsz);

        let start_preprocess = Instant::now();
        let preprocess = preprocess_image(image, target_size);
        let preprocess_time = start_preprocess.elapsed().as_secs_f64() * 1000.0;

        let start_inference = Instant::now();
        let (output, shape) = self.run_inference(&preprocess.tensor)?;
        let inference_time = start_inference.elapsed().as_secs_f64() * 1000.0;

        let start_postprocess = Instant::now();
        let boxes = postprocess_detect(
            &output,
            &shape,
            &preprocess.letterbox,
            params,
            self.metadata.num_classes(),
        );
        let postprocess_time = start_postprocess.elapsed().as_secs_f64() * 1000.0;

        let names = (!self.metadata.names.is_empty()).then(|| self.metadata.names.clone());

        Ok(Prediction {
            names,
            boxes,
            orig_shape: preprocess.letterbox.source,
            speed: Speed::new(preprocess_time, inference_time, postprocess_time),
        })
    }
}

impl std::fmt::Debug for YOLOModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YOLOModel")
            .field("model_path", &self.model_path)
            .field("num_classes", &self.metadata.num_classes())
            .field("imgsz", &self.metadata.imgsz)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_not_found() {
        let result = YOLOModel::load("nonexistent.onnx");
        assert!(matches!(result, Err(Error::ConfigurationError(_))));
    }

    #[test]
    fn test_garbage_model_is_dependency_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"not an onnx model").unwrap();
        let result = YOLOModel::load(file.path());
        assert!(matches!(result, Err(Error::DependencyError(_))));
    }
}

// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Lazy, process-wide model loading.
//!
//! The detector is built the first time it is needed. Concurrent callers that
//! arrive before construction finishes wait for the same build rather than
//! starting their own, and a failed build leaves the slot empty so the next
//! request tries again.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::error::{Error, Result};
use crate::model::{Detector, YOLOModel};

/// Builds a detector from a model file.
pub trait DetectorFactory: Send + Sync {
    /// Construct the detector. Called from a blocking thread.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DependencyError`] if the file cannot be turned into a detector.
    fn build(&self, path: &Path) -> Result<Arc<dyn Detector>>;
}

/// Factory producing ONNX Runtime backed [`YOLOModel`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnnxDetectorFactory {
    /// Intra-op thread count, `0` for the runtime default.
    pub num_threads: usize,
}

impl DetectorFactory for OnnxDetectorFactory {
    fn build(&self, path: &Path) -> Result<Arc<dyn Detector>> {
        let model = YOLOModel::load_with_threads(path, self.num_threads)?;
        Ok(Arc::new(model))
    }
}

async fn build_detector(factory: Arc<dyn DetectorFactory>, path: PathBuf) -> Result<Arc<dyn Detector>> {
    if !path.is_file() {
        return Err(Error::ConfigurationError(format!(
            "Model file not found at {}. Place your trained model there or set MODEL_PATH.",
            path.display()
        )));
    }

    tracing::info!(path = %path.display(), "Loading model");
    tokio::task::spawn_blocking(move || factory.build(&path))
        .await
        .map_err(|e| Error::DependencyError(format!("Model loading task failed: {e}")))?
}

/// Holds at most one detector for the lifetime of the process.
pub struct ModelLoader {
    model_path: PathBuf,
    factory: Arc<dyn DetectorFactory>,
    cell: Arc<OnceCell<Arc<dyn Detector>>>,
}

impl ModelLoader {
    /// Create a loader for the model at `model_path`. Nothing is read yet.
    pub fn new(model_path: impl Into<PathBuf>, factory: Arc<dyn DetectorFactory>) -> Self {
        Self {
            model_path: model_path.into(),
            factory,
            cell: Arc::new(OnceCell::new()),
        }
    }

    /// Loader using the ONNX Runtime factory.
    pub fn onnx(model_path: impl Into<PathBuf>) -> Self {
        Self::new(model_path, Arc::new(OnnxDetectorFactory::default()))
    }

    /// Return the detector, building it on first use.
    ///
    /// # Errors
    ///
    /// * [`Error::ConfigurationError`] if no file exists at the configured path.
    /// * [`Error::DependencyError`] if the file cannot be loaded as a model.
    pub async fn get_model(&self) -> Result<Arc<dyn Detector>> {
        if let Some(detector) = self.cell.get() {
            return Ok(Arc::clone(detector));
        }

        // Initialization runs in its own task so that a caller dropped mid-build
        // (client disconnect) cannot abandon it and force a second build.
        let cell = Arc::clone(&self.cell);
        let factory = Arc::clone(&self.factory);
        let path = self.model_path.clone();
        tokio::spawn(async move {
            cell.get_or_try_init(|| build_detector(factory, path))
                .await
                .map(Arc::clone)
        })
        .await
        .map_err(|e| Error::DependencyError(format!("Model loading task failed: {e}")))?
    }

    /// Configured model path.
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Whether a file exists at the configured path. Never loads the model.
    pub fn model_exists(&self) -> bool {
        self.model_path.is_file()
    }

    /// Whether the detector has already been built.
    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }
}

impl std::fmt::Debug for ModelLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelLoader")
            .field("model_path", &self.model_path)
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use image::DynamicImage;
    use tokio::task::JoinSet;

    use super::*;
    use crate::inference::DetectionParams;
    use crate::results::Prediction;

    struct NullDetector;

    impl Detector for NullDetector {
        fn predict(&self, _: &DynamicImage, _: &DetectionParams) -> Result<Prediction> {
            Ok(Prediction::default())
        }
    }

    #[derive(Default)]
    struct CountingFactory {
        builds: AtomicUsize,
        fail_first: bool,
        extra_delay: Duration,
    }

    impl DetectorFactory for CountingFactory {
        fn build(&self, _: &Path) -> Result<Arc<dyn Detector>> {
            let n = self.builds.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50) + self.extra_delay);
            if self.fail_first && n == 0 {
                return Err(Error::DependencyError("corrupt model".to_string()));
            }
            Ok(Arc::new(NullDetector))
        }
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_build() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let factory = Arc::new(CountingFactory::default());
        let loader = Arc::new(ModelLoader::new(file.path(), factory.clone()));

        let mut set = JoinSet::new();
        for _ in 0..8 {
            let loader = Arc::clone(&loader);
            set.spawn(async move { loader.get_model().await.is_ok() });
        }
        while let Some(ok) = set.join_next().await {
            assert!(ok.unwrap());
        }

        assert_eq!(factory.builds.load(Ordering::SeqCst), 1);
        assert!(loader.is_loaded());
    }

    #[tokio::test]
    async fn test_missing_model_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(CountingFactory::default());
        let loader = ModelLoader::new(dir.path().join("best.onnx"), factory.clone());

        assert!(!loader.model_exists());
        let err = loader.get_model().await.err().unwrap();
        assert!(matches!(err, Error::ConfigurationError(_)));
        assert_eq!(factory.builds.load(Ordering::SeqCst), 0);
        assert!(!loader.is_loaded());
    }

    #[tokio::test]
    async fn test_failed_build_is_retried() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let factory = Arc::new(CountingFactory {
            fail_first: true,
            ..CountingFactory::default()
        });
        let loader = ModelLoader::new(file.path(), factory.clone());

        assert!(matches!(loader.get_model().await, Err(Error::DependencyError(_))));
        assert!(!loader.is_loaded());
        assert!(loader.get_model().await.is_ok());
        assert_eq!(factory.builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_abandoned_first_caller_still_builds_once() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let factory = Arc::new(CountingFactory {
            extra_delay: Duration::from_millis(250),
            ..CountingFactory::default()
        });
        let loader = Arc::new(ModelLoader::new(file.path(), factory.clone()));

        let first = {
            let loader = Arc::clone(&loader);
            tokio::spawn(async move { loader.get_model().await.is_ok() })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        first.abort();
        assert!(first.await.unwrap_err().is_cancelled());

        assert!(loader.get_model().await.is_ok());
        assert_eq!(factory.builds.load(Ordering::SeqCst), 1);
        assert!(loader.is_loaded());
    }
}

// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

#![allow(clippy::multiple_crate_versions)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # YOLO Detection Web
//!
//! A small web application that accepts an uploaded image, runs it through an
//! [Ultralytics](https://ultralytics.com) YOLO detection model exported to ONNX,
//! and returns the detections as an annotated HTML page or as JSON.
//!
//! ## Features
//!
//! - **Browser flow** - upload form at `/`, result page with the annotated image
//! - **JSON API** - `POST /api/predict` returns labels, confidences and boxes
//! - **Lazy model loading** - the model is built once, on the first request that needs it
//! - **ONNX Runtime** - CPU execution, class names and input size read from model metadata
//! - **Retention** - optional background sweep of stored uploads and renders
//!
//! ## Running the server
//!
//! ```bash
//! # Export a detection model from Python first
//! yolo export model=best.pt format=onnx
//!
//! MODEL_PATH=models/best.onnx yolo-web serve --port 8080
//!
//! curl -F image=@bus.jpg -F conf=0.4 http://localhost:8080/api/predict
//! ```
//!
//! ## Library usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use yolo_web::{DetectionParams, ImageStore, InferenceAdapter, ModelLoader};
//!
//! # async fn run() -> yolo_web::Result<()> {
//! let loader = Arc::new(ModelLoader::onnx("models/best.onnx"));
//! let store = Arc::new(ImageStore::new("uploads", "outputs")?);
//! let adapter = InferenceAdapter::new(loader, store, None);
//!
//! let params = DetectionParams::new().with_confidence(0.5);
//! let outcome = adapter.detect("bus.jpg".as_ref(), params).await?;
//! for d in &outcome.detections {
//!     println!("{} {:.2} {:?}", d.label, d.confidence, d.bbox);
//! }
//! println!("annotated: {}", outcome.annotated.url());
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`loader`] | [`ModelLoader`]: lazy, shared detector construction |
//! | [`model`] | [`Detector`] trait and the ONNX [`YOLOModel`] |
//! | [`detect`] | [`InferenceAdapter`] and the public [`Detection`] shape |
//! | [`storage`] | [`ImageStore`]: validated uploads and annotated outputs |
//! | [`annotate`] | Box and label rendering |
//! | [`server`] | Axum routes, pages, JSON responses |
//! | [`config`] | [`AppConfig`] flags and environment variables |
//! | [`error`] | [`Error`] and [`Result`] |
//!
//! ## License
//!
//! This project is licensed under [AGPL-3.0](https://github.com/ultralytics/inference/blob/main/LICENSE).

// Modules
pub mod annotate;
pub mod cli;
pub mod config;
pub mod detect;
pub mod error;
pub mod inference;
pub mod loader;
pub mod metadata;
pub mod model;
pub mod postprocessing;
pub mod preprocessing;
pub mod results;
pub mod server;
pub mod storage;
pub mod utils;

// Re-export main types for convenience
pub use config::AppConfig;
pub use detect::{DetectOutcome, Detection, InferenceAdapter};
pub use error::{Error, Result};
pub use inference::DetectionParams;
pub use loader::{DetectorFactory, ModelLoader, OnnxDetectorFactory};
pub use model::{Detector, YOLOModel};
pub use results::{Boxes, Prediction, Speed};
pub use storage::{ImageStore, StoredImage};

// Re-export metadata for advanced use
pub use metadata::ModelMetadata;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

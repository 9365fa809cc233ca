// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Error types for the detection web application.
//!
//! Every failure a request can hit is one of these variants. Route handlers
//! map them to an HTTP status with [`Error::status_code`].

use axum::http::StatusCode;
use thiserror::Error;

/// Result type alias for detection and storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the application.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid configuration (e.g. the weights file does not exist).
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    /// The detection runtime could not be initialized or the model could not be loaded.
    #[error("Dependency error: {0}")]
    DependencyError(String),
    /// Bad or missing upload input. User-correctable.
    #[error("Validation error: {0}")]
    ValidationError(String),
    /// The detector failed while predicting.
    #[error("Inference error: {0}")]
    InferenceError(String),
    /// Request body exceeded the configured payload cap.
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),
    /// Wrapped `std::io::Error`.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// HTTP status used when this error crosses the route boundary.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::ConfigurationError(_)
            | Self::DependencyError(_)
            | Self::InferenceError(_)
            | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the client can fix this by changing its request.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Re-tag any failure raised while running the detector as an inference failure.
    #[must_use]
    pub fn into_inference(self) -> Self {
        match self {
            Self::InferenceError(_) => self,
            other => Self::InferenceError(other.to_string()),
        }
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Self::InferenceError(format!("image processing failed: {err}"))
    }
}

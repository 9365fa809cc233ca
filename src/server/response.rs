// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! JSON payloads, the API error type and the OpenAPI document.

use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use utoipa::{OpenApi, ToSchema};

use crate::detect::Detection;
use crate::error::Error;

/// Successful `/api/predict` response.
#[derive(Debug, Serialize, ToSchema)]
pub struct PredictResponse {
    /// Detections in detector order
    pub detections: Vec<Detection>,
    /// Confidence threshold used
    pub conf: f32,
    /// `IoU` threshold used for NMS
    pub iou: f32,
    /// Absolute URL of the annotated JPEG
    pub annotated_image_url: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Whether the model file exists
    pub ok: bool,
    /// Configured model path
    pub model_path: String,
}

/// An [`Error`] on its way out of the JSON API.
#[derive(Debug)]
pub struct ApiError {
    error: Error,
    message: String,
}

impl ApiError {
    /// Use `message` as the response body instead of the error's display text.
    #[must_use]
    pub const fn with_message(error: Error, message: String) -> Self {
        Self {
            error,
            message,
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let message = match &error {
            Error::ValidationError(m) | Error::PayloadTooLarge(m) => m.clone(),
            other => other.to_string(),
        };
        Self::with_message(error, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.error.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self.error, "Request failed");
        } else {
            tracing::debug!(error = %self.error, "Request rejected");
        }
        (status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

/// Absolute base URL (`scheme://host`) for links in API responses.
///
/// Prefers the configured public URL, then the request's host, then
/// `localhost` on the bound port.
#[must_use]
pub fn base_url(public_url: Option<&str>, host: Option<&str>, headers: &HeaderMap, port: u16) -> String {
    if let Some(url) = public_url {
        return url.to_string();
    }

    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| matches!(*v, "http" | "https"))
        .unwrap_or("http");

    match host.filter(|h| !h.is_empty()) {
        Some(host) => format!("{scheme}://{host}"),
        None => format!("{scheme}://localhost:{port}"),
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "YOLO Detection Web",
        description = "Upload an image and get object detections back.\n\n## Form fields\n- `image`: file (png, jpg, jpeg, webp, bmp)\n- `conf`: confidence threshold (0.0-1.0, default 0.25)\n- `iou`: IoU threshold for NMS (0.0-1.0, default 0.45)",
        license(name = "AGPL-3.0", url = "https://github.com/ultralytics/inference/blob/main/LICENSE")
    ),
    paths(super::handlers::health, super::handlers::api_predict),
    components(schemas(Detection, PredictResponse, ErrorResponse, HealthResponse)),
    tags(
        (name = "inference", description = "Object detection endpoints"),
        (name = "health", description = "Health check endpoints")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use axum::http::{HeaderValue, StatusCode};

    use super::*;

    #[test]
    fn test_base_url_precedence() {
        let mut headers = HeaderMap::new();
        assert_eq!(
            base_url(Some("https://public.example"), Some("internal:8080"), &headers, 8080),
            "https://public.example"
        );
        assert_eq!(base_url(None, Some("example.com"), &headers, 8080), "http://example.com");
        assert_eq!(base_url(None, None, &headers, 9000), "http://localhost:9000");

        headers.insert("x-forwarded-proto", HeaderValue::from_static("https, http"));
        assert_eq!(base_url(None, Some("example.com"), &headers, 8080), "https://example.com");
    }

    #[test]
    fn test_api_error_status_and_body() {
        let response = ApiError::from(Error::ValidationError("empty filename".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ApiError::from(Error::InferenceError("boom".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_openapi_lists_routes() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/predict"));
        assert!(doc.paths.paths.contains_key("/health"));
    }
}

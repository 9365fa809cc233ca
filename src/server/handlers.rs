// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Route handlers.

use axum::body::Bytes;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Host, Multipart, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Json, Response};
use axum_extra::extract::cookie::SignedCookieJar;
use utoipa::OpenApi;

use super::flash;
use super::pages::{render_index, render_result, IndexPage, ResultPage};
use super::response::{base_url, ApiDoc, ApiError, ErrorResponse, HealthResponse, PredictResponse};
use super::AppState;
use crate::error::{Error, Result};
use crate::inference::{is_valid_threshold, DetectionParams};
use crate::storage::allowed_extension;

const MSG_NO_FILE_PART: &str = "No file part in the request.";
const MSG_NO_FILE_CHOSEN: &str = "Please choose an image to upload.";
const MSG_UNSUPPORTED: &str = "Unsupported file type. Please upload png/jpg/jpeg/webp/bmp.";

/// File part of an upload form.
#[derive(Debug)]
struct ImageUpload {
    filename: Option<String>,
    bytes: Bytes,
}

/// Fields of the `/predict` and `/api/predict` forms.
#[derive(Debug, Default)]
struct UploadForm {
    image: Option<ImageUpload>,
    conf: Option<String>,
    iou: Option<String>,
}

fn multipart_error(status: StatusCode, detail: String) -> Error {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge("request body too large".to_string())
    } else {
        Error::ValidationError(format!("invalid multipart body: {detail}"))
    }
}

impl From<MultipartError> for Error {
    fn from(err: MultipartError) -> Self {
        multipart_error(err.status(), err.body_text())
    }
}

impl From<MultipartRejection> for Error {
    fn from(rejection: MultipartRejection) -> Self {
        multipart_error(rejection.status(), rejection.body_text())
    }
}

/// Read the whole form. Unknown fields are drained and ignored; the first `image` wins.
async fn read_form(multipart: std::result::Result<Multipart, MultipartRejection>) -> Result<UploadForm> {
    let mut multipart = multipart?;
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("image") if form.image.is_none() => {
                let filename = field.file_name().map(str::to_string);
                let bytes = field.bytes().await?;
                form.image = Some(ImageUpload { filename, bytes });
            }
            Some("conf") => form.conf = Some(field.text().await?),
            Some("iou") => form.iou = Some(field.text().await?),
            _ => {
                field.bytes().await?;
            }
        }
    }

    Ok(form)
}

/// Lenient threshold parsing for the browser form: anything unusable becomes `default`.
fn form_threshold(raw: Option<&str>, default: f32) -> f32 {
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<f32>().ok())
        .filter(|v| is_valid_threshold(*v))
        .unwrap_or(default)
}

/// Strict threshold parsing for the JSON API.
fn api_threshold(raw: Option<&str>, default: f32, name: &str) -> Result<f32> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(v) => v
            .parse::<f32>()
            .ok()
            .filter(|v| is_valid_threshold(*v))
            .ok_or_else(|| {
                Error::ValidationError(format!("invalid {name}: expected a number between 0 and 1"))
            }),
    }
}

fn redirect_with_flash(jar: SignedCookieJar, message: &str) -> Response {
    let jar = flash::push(jar, message);
    (StatusCode::FOUND, jar, [(header::LOCATION, "/")]).into_response()
}

/// Health check endpoint
///
/// Reports whether the model file exists. Never loads the model.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Server is up", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let loader = state.adapter.loader();
    Json(HealthResponse {
        ok: loader.model_exists(),
        model_path: loader.model_path().display().to_string(),
    })
}

/// Landing page with the upload form.
pub async fn index(State(state): State<AppState>, jar: SignedCookieJar) -> (SignedCookieJar, Html<String>) {
    let (jar, messages) = flash::take(jar);
    let loader = state.adapter.loader();
    let model_path = loader.model_path().display().to_string();
    let defaults = state.config.default_params();

    let html = render_index(&IndexPage {
        model_exists: loader.model_exists(),
        model_path: &model_path,
        conf_default: defaults.confidence_threshold,
        iou_default: defaults.iou_threshold,
        messages: &messages,
    });
    (jar, Html(html))
}

/// Browser form submission. Renders the result page, or redirects home with a flash message.
pub async fn predict_form(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Response {
    let form = match read_form(multipart).await {
        Ok(form) => form,
        Err(e) => return redirect_with_flash(jar, &format!("Upload failed: {e}")),
    };

    let Some(upload) = form.image else {
        return redirect_with_flash(jar, MSG_NO_FILE_PART);
    };
    let filename = upload.filename.as_deref().unwrap_or_default();
    if filename.is_empty() {
        return redirect_with_flash(jar, MSG_NO_FILE_CHOSEN);
    }
    if allowed_extension(filename).is_none() {
        return redirect_with_flash(jar, MSG_UNSUPPORTED);
    }

    let stored = match state.adapter.store().accept(Some(filename), &upload.bytes).await {
        Ok(stored) => stored,
        Err(e) => return redirect_with_flash(jar, &format!("Upload failed: {e}")),
    };

    let defaults = state.config.default_params();
    let conf = form_threshold(form.conf.as_deref(), defaults.confidence_threshold);
    let iou = form_threshold(form.iou.as_deref(), defaults.iou_threshold);
    let params = defaults.with_confidence(conf).with_iou(iou);

    match state.adapter.detect(&stored.path, params).await {
        Ok(outcome) => {
            let input_image = stored.url();
            let output_image = outcome.annotated.url();
            Html(render_result(&ResultPage {
                input_image: &input_image,
                output_image: &output_image,
                detections: &outcome.detections,
                conf,
                iou,
            }))
            .into_response()
        }
        Err(e) => {
            tracing::warn!(error = %e, "Prediction failed");
            redirect_with_flash(jar, &format!("Prediction failed: {e}"))
        }
    }
}

/// Run detection on an uploaded image
///
/// Multipart fields: `image` (file), optional `conf` and `iou` in `[0, 1]`.
#[utoipa::path(
    post,
    path = "/api/predict",
    tag = "inference",
    request_body(content = String, content_type = "multipart/form-data", description = "Image file plus optional conf/iou"),
    responses(
        (status = 200, description = "Detection succeeded", body = PredictResponse),
        (status = 400, description = "Missing or invalid upload", body = ErrorResponse),
        (status = 413, description = "Upload exceeds the size limit", body = ErrorResponse),
        (status = 500, description = "Model unavailable or prediction failed", body = ErrorResponse)
    )
)]
pub async fn api_predict(
    State(state): State<AppState>,
    host: Option<Host>,
    headers: HeaderMap,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> std::result::Result<Json<PredictResponse>, ApiError> {
    let form = read_form(multipart).await?;

    let upload = form
        .image
        .ok_or_else(|| Error::ValidationError("missing file 'image'".to_string()))?;
    let defaults = state.config.default_params();
    let conf = api_threshold(form.conf.as_deref(), defaults.confidence_threshold, "conf")?;
    let iou = api_threshold(form.iou.as_deref(), defaults.iou_threshold, "iou")?;
    let params: DetectionParams = defaults.with_confidence(conf).with_iou(iou);

    let stored = state
        .adapter
        .store()
        .accept(upload.filename.as_deref(), &upload.bytes)
        .await?;

    let outcome = state.adapter.detect(&stored.path, params).await.map_err(|e| {
        let message = format!("prediction failed: {e}");
        ApiError::with_message(e, message)
    })?;

    let base = base_url(
        state.config.public_base_url(),
        host.as_ref().map(|Host(h)| h.as_str()),
        &headers,
        state.config.port,
    );

    Ok(Json(PredictResponse {
        detections: outcome.detections,
        conf,
        iou,
        annotated_image_url: format!("{base}{}", outcome.annotated.url()),
    }))
}

/// OpenAPI document as JSON.
pub async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_threshold_falls_back() {
        assert!((form_threshold(Some("0.6"), 0.25) - 0.6).abs() < f32::EPSILON);
        assert!((form_threshold(Some(" 0.6 "), 0.25) - 0.6).abs() < f32::EPSILON);
        for raw in [None, Some(""), Some("abc"), Some("1.5"), Some("-0.1"), Some("NaN")] {
            assert!((form_threshold(raw, 0.25) - 0.25).abs() < f32::EPSILON, "{raw:?}");
        }
    }

    #[test]
    fn test_api_threshold_is_strict() {
        assert!((api_threshold(None, 0.45, "iou").unwrap() - 0.45).abs() < f32::EPSILON);
        assert!((api_threshold(Some("0"), 0.45, "iou").unwrap()).abs() < f32::EPSILON);
        let err = api_threshold(Some("high"), 0.45, "iou").unwrap_err();
        assert!(matches!(err, Error::ValidationError(ref m) if m.contains("iou")));
        assert!(api_threshold(Some("2"), 0.25, "conf").is_err());
    }

    #[test]
    fn test_payload_too_large_mapping() {
        let err = multipart_error(StatusCode::PAYLOAD_TOO_LARGE, String::new());
        assert!(matches!(err, Error::PayloadTooLarge(_)));
        let err = multipart_error(StatusCode::BAD_REQUEST, "bad boundary".to_string());
        assert!(matches!(err, Error::ValidationError(ref m) if m.contains("bad boundary")));
    }
}

// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Web application configuration.
//!
//! Every field can be set by flag or environment variable. The [`Default`]
//! impl mirrors the clap defaults so tests and embedders get the same values
//! without parsing anything.

use std::path::PathBuf;

use clap::Args;

use crate::inference::{is_valid_threshold, DetectionParams, DEFAULT_CONFIDENCE, DEFAULT_IOU};

/// Default model location.
pub const DEFAULT_MODEL_PATH: &str = "models/best.onnx";

/// Default signing secret. Override it anywhere reachable from the outside.
pub const DEFAULT_SECRET_KEY: &str = "replace-me-in-production";

/// Arguments for the `serve` command.
#[derive(Args, Debug, Clone)]
pub struct AppConfig {
    /// Path to the ONNX detection model
    #[arg(long, env = "MODEL_PATH", default_value = DEFAULT_MODEL_PATH)]
    pub model_path: PathBuf,

    /// Directory for uploaded images
    #[arg(long, env = "UPLOAD_DIR", default_value = "uploads")]
    pub upload_dir: PathBuf,

    /// Directory for annotated images
    #[arg(long, env = "OUTPUT_DIR", default_value = "outputs")]
    pub output_dir: PathBuf,

    /// Maximum request body size in megabytes
    #[arg(long, env = "MAX_CONTENT_LENGTH_MB", default_value_t = 10.0)]
    pub max_content_length_mb: f64,

    /// Default confidence threshold
    #[arg(long, env = "CONF_DEFAULT", default_value_t = DEFAULT_CONFIDENCE)]
    pub conf_default: f32,

    /// Default `IoU` threshold for NMS
    #[arg(long, env = "IOU_DEFAULT", default_value_t = DEFAULT_IOU)]
    pub iou_default: f32,

    /// Secret used to sign flash message cookies
    #[arg(long, env = "SECRET_KEY", default_value = DEFAULT_SECRET_KEY, hide_env_values = true)]
    pub secret_key: String,

    /// Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Public base URL used for absolute links (derived from the Host header if unset)
    #[arg(long, env = "PUBLIC_URL")]
    pub public_url: Option<String>,

    /// Delete stored images older than this many seconds
    #[arg(long, env = "STORAGE_TTL_SECS")]
    pub storage_ttl_secs: Option<u64>,

    /// TrueType font for labels (downloads Arial.ttf if unset)
    #[arg(long, env = "FONT_PATH")]
    pub font_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            upload_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("outputs"),
            max_content_length_mb: 10.0,
            conf_default: DEFAULT_CONFIDENCE,
            iou_default: DEFAULT_IOU,
            secret_key: DEFAULT_SECRET_KEY.to_string(),
            host: "0.0.0.0".to_string(),
            port: 8080,
            public_url: None,
            storage_ttl_secs: None,
            font_path: None,
        }
    }
}

impl AppConfig {
    /// Request body cap in bytes.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn max_body_bytes(&self) -> usize {
        (self.max_content_length_mb.max(0.0) * 1024.0 * 1024.0) as usize
    }

    /// Detection parameters built from the configured defaults.
    ///
    /// Out-of-range defaults fall back to the built-in ones.
    #[must_use]
    pub fn default_params(&self) -> DetectionParams {
        let conf = if is_valid_threshold(self.conf_default) {
            self.conf_default
        } else {
            DEFAULT_CONFIDENCE
        };
        let iou = if is_valid_threshold(self.iou_default) {
            self.iou_default
        } else {
            DEFAULT_IOU
        };
        DetectionParams::new().with_confidence(conf).with_iou(iou)
    }

    /// `host:port` to bind.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Configured public URL without a trailing slash.
    #[must_use]
    pub fn public_base_url(&self) -> Option<&str> {
        self.public_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
            .filter(|url| !url.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_body_bytes() {
        let config = AppConfig::default();
        assert_eq!(config.max_body_bytes(), 10 * 1024 * 1024);

        let half = AppConfig {
            max_content_length_mb: 0.5,
            ..AppConfig::default()
        };
        assert_eq!(half.max_body_bytes(), 512 * 1024);
    }

    #[test]
    fn test_default_params_fall_back() {
        let config = AppConfig {
            conf_default: 3.0,
            iou_default: 0.6,
            ..AppConfig::default()
        };
        let params = config.default_params();
        assert!((params.confidence_threshold - DEFAULT_CONFIDENCE).abs() < f32::EPSILON);
        assert!((params.iou_threshold - 0.6).abs() < f32::EPSILON);
    }

    #[test]
    fn test_public_base_url() {
        let mut config = AppConfig::default();
        assert_eq!(config.public_base_url(), None);
        config.public_url = Some("https://detect.example.com/".to_string());
        assert_eq!(config.public_base_url(), Some("https://detect.example.com"));
        config.public_url = Some(String::new());
        assert_eq!(config.public_base_url(), None);
    }
}

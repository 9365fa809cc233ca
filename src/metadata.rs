// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Ultralytics ONNX metadata.
//!
//! The exporter writes each field as its own custom metadata property, with
//! Python literal values: `imgsz` is `[640, 640]` and `names` is
//! `{0: 'person', 1: 'bicycle'}`.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// The only task this application serves.
pub const DETECT_TASK: &str = "detect";

/// Custom metadata keys read from the model.
pub const METADATA_KEYS: [&str; 5] = ["description", "stride", "task", "imgsz", "names"];

/// Metadata of an Ultralytics YOLO ONNX export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelMetadata {
    pub description: String,
    /// Task name as written by the exporter (`detect`, `segment`, ...).
    pub task: String,
    pub stride: u32,
    /// Input size as (height, width).
    pub imgsz: (usize, usize),
    /// Class ID to class name mapping.
    pub names: HashMap<usize, String>,
}

impl ModelMetadata {
    /// Build metadata from `(key, value)` custom properties. Unknown keys are
    /// ignored and absent ones keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationError`] if `stride` or `imgsz` is malformed.
    pub fn from_fields<'a, I>(fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut metadata = Self::default();

        for (key, value) in fields {
            let value = value.trim();
            match key {
                "description" => metadata.description = unquote(value).to_string(),
                "task" => metadata.task = unquote(value).to_lowercase(),
                "stride" => {
                    metadata.stride = value.parse().map_err(|_| {
                        Error::ConfigurationError(format!("Invalid stride in model metadata: {value}"))
                    })?;
                }
                "imgsz" => metadata.imgsz = parse_imgsz(value)?,
                "names" => metadata.names = parse_names(value),
                _ => {}
            }
        }

        Ok(metadata)
    }

    /// Whether the model is a plain detection model.
    #[must_use]
    pub fn is_detect(&self) -> bool {
        self.task == DETECT_TASK
    }

    #[must_use]
    pub fn num_classes(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn class_name(&self, class_id: usize) -> Option<&str> {
        self.names.get(&class_id).map(String::as_str)
    }
}

impl Default for ModelMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            task: DETECT_TASK.to_string(),
            stride: 32,
            imgsz: (640, 640),
            names: HashMap::new(),
        }
    }
}

fn unquote(value: &str) -> &str {
    value.trim().trim_matches(&['\'', '"'][..])
}

/// `[h, w]`, or a single `n` meaning `n x n`.
fn parse_imgsz(value: &str) -> Result<(usize, usize)> {
    let dims: Vec<usize> = value
        .trim_matches(&['[', ']', '(', ')'][..])
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse::<usize>)
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| Error::ConfigurationError(format!("Invalid imgsz in model metadata: {value}")))?;

    match dims.as_slice() {
        [n] => Ok((*n, *n)),
        [h, w] => Ok((*h, *w)),
        _ => Err(Error::ConfigurationError(format!(
            "Invalid imgsz in model metadata: {value}"
        ))),
    }
}

/// `{0: 'person', 1: 'bicycle'}`. Entries that do not parse are skipped.
fn parse_names(value: &str) -> HashMap<usize, String> {
    value
        .trim()
        .trim_start_matches('{')
        .trim_end_matches('}')
        .split(',')
        .filter_map(|entry| {
            let (id, name) = entry.split_once(':')?;
            Some((id.trim().parse().ok()?, unquote(name).to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_fields() {
        let metadata = ModelMetadata::from_fields([
            ("description", "Ultralytics YOLO11n model trained on coco.yaml"),
            ("stride", "32"),
            ("task", "detect"),
            ("imgsz", "[640, 640]"),
            ("names", "{0: 'person', 1: 'bicycle', 2: 'car'}"),
        ])
        .unwrap();

        assert!(metadata.is_detect());
        assert_eq!(metadata.stride, 32);
        assert_eq!(metadata.imgsz, (640, 640));
        assert_eq!(metadata.num_classes(), 3);
        assert_eq!(metadata.class_name(0), Some("person"));
        assert_eq!(metadata.class_name(2), Some("car"));
    }

    #[test]
    fn test_rectangular_and_square_imgsz() {
        assert_eq!(parse_imgsz("[320, 480]").unwrap(), (320, 480));
        assert_eq!(parse_imgsz("416").unwrap(), (416, 416));
        assert!(parse_imgsz("[1, 2, 3]").is_err());
        assert!(parse_imgsz("big").is_err());
    }

    #[test]
    fn test_missing_fields_keep_defaults() {
        let metadata = ModelMetadata::from_fields([("author", "Ultralytics")]).unwrap();
        assert_eq!(metadata, ModelMetadata::default());
    }

    #[test]
    fn test_non_detect_task() {
        let metadata = ModelMetadata::from_fields([("task", "segment")]).unwrap();
        assert!(!metadata.is_detect());
    }

    #[test]
    fn test_bad_stride() {
        let result = ModelMetadata::from_fields([("stride", "wide")]);
        assert!(matches!(result, Err(Error::ConfigurationError(_))));
    }

    #[test]
    fn test_names_skip_garbage() {
        let names = parse_names("{0: \"crack\", x: 'dent', 2: 'scratch'}");
        assert_eq!(names.len(), 2);
        assert_eq!(names[&2], "scratch");
    }
}

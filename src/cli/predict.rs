// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::annotate::load_font;
use crate::cli::args::PredictArgs;
use crate::cli::logging;
use crate::detect::{Detection, InferenceAdapter};
use crate::error::{Error, Result};
use crate::inference::{is_valid_threshold, DetectionParams};
use crate::loader::ModelLoader;
use crate::storage::ImageStore;
use crate::{section, success, verbose, VERSION};

#[derive(Serialize)]
struct PredictOutput<'a> {
    source: String,
    detections: &'a [Detection],
    params: DetectionParams,
    annotated_image: String,
}

/// Run detection once on a local image and report the result.
///
/// # Errors
///
/// Returns an error for invalid thresholds, a missing source or model, or a
/// failed prediction.
pub async fn run_prediction(args: &PredictArgs) -> Result<()> {
    logging::set_verbose(args.verbose);
    logging::set_json(args.json);

    for (name, value) in [("conf", args.conf), ("iou", args.iou)] {
        if !is_valid_threshold(value) {
            return Err(Error::ValidationError(format!(
                "--{name} must be between 0 and 1, got {value}"
            )));
        }
    }
    if !args.source.is_file() {
        return Err(Error::ValidationError(format!(
            "source image not found: {}",
            args.source.display()
        )));
    }

    section!("yolo-web {VERSION} 🚀 predict");
    verbose!("Model:  {}", args.model.display());
    verbose!("Source: {}", args.source.display());

    let store = ImageStore::new(args.output_dir.clone(), args.output_dir.clone())?;
    let font_path = args.font_path.clone();
    let font = tokio::task::spawn_blocking(move || load_font(font_path.as_deref()))
        .await
        .map_err(|e| Error::DependencyError(format!("font loading task failed: {e}")))?;
    let adapter = InferenceAdapter::new(
        Arc::new(ModelLoader::onnx(args.model.clone())),
        Arc::new(store),
        font,
    );

    let params = DetectionParams::new()
        .with_confidence(args.conf)
        .with_iou(args.iou);

    let start = Instant::now();
    let outcome = adapter.detect(&args.source, params).await?;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

    if args.json {
        let output = PredictOutput {
            source: args.source.display().to_string(),
            detections: &outcome.detections,
            params,
            annotated_image: outcome.annotated.path.display().to_string(),
        };
        let json = serde_json::to_string_pretty(&output)
            .map_err(|e| Error::InferenceError(format!("failed to serialize detections: {e}")))?;
        println!("{json}");
        return Ok(());
    }

    let summary = format_detection_summary(&outcome.detections);
    verbose!(
        "{}: {}, {elapsed_ms:.1}ms",
        args.source.display(),
        if summary.is_empty() { "(no detections)" } else { summary.as_str() }
    );
    for d in &outcome.detections {
        let [x1, y1, x2, y2] = d.bbox;
        verbose!(
            "  {:<16} {:.2}  [{x1:.1}, {y1:.1}, {x2:.1}, {y2:.1}]",
            d.label,
            d.confidence
        );
    }
    success!("Annotated image saved to {}", outcome.annotated.path.display());

    Ok(())
}

/// Format detection counts like "4 persons, 1 bus", in order of first appearance.
fn format_detection_summary(detections: &[Detection]) -> String {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for d in detections {
        match counts.iter_mut().find(|(label, _)| *label == d.label) {
            Some((_, n)) => *n += 1,
            None => counts.push((d.label.as_str(), 1)),
        }
    }

    counts
        .iter()
        .map(|(label, n)| {
            let name = if *n > 1 { pluralize(label) } else { (*label).to_string() };
            format!("{n} {name}")
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// English plural for a class label.
fn pluralize(word: &str) -> String {
    match word {
        "person" => "persons".to_string(),
        "knife" => "knives".to_string(),
        "mouse" => "mice".to_string(),
        "sheep" | "skis" => word.to_string(),
        _ if word.ends_with('s') || word.ends_with("ch") || word.ends_with("sh") => {
            format!("{word}es")
        }
        _ if word.ends_with('y') && !word.ends_with("ey") && !word.ends_with("ay") => {
            format!("{}ies", &word[..word.len() - 1])
        }
        _ => format!("{word}s"),
    }
}

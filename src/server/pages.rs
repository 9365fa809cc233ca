// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! HTML pages for the browser flow.
//!
//! Every interpolated value goes through [`ammonia::clean_text`].

use std::fmt::Write;

use ammonia::clean_text;

use crate::detect::Detection;

const STYLE: &str = "body{font-family:system-ui,sans-serif;max-width:960px;margin:2rem auto;padding:0 1rem;color:#111}\
h1{font-size:1.6rem}.flash{background:#fff3cd;border:1px solid #ffe69c;padding:.6rem 1rem;margin:.4rem 0;border-radius:4px}\
.warn{background:#f8d7da;border:1px solid #f1aeb5;padding:.6rem 1rem;border-radius:4px}\
form{display:grid;gap:.8rem;max-width:420px}label{display:grid;gap:.2rem}\
.images{display:grid;grid-template-columns:1fr 1fr;gap:1rem}.images img{max-width:100%;border:1px solid #ddd}\
table{border-collapse:collapse;width:100%;margin-top:1rem}td,th{border:1px solid #ddd;padding:.3rem .5rem;text-align:left}";

/// Values shown on the landing page.
#[derive(Debug, Clone)]
pub struct IndexPage<'a> {
    /// Whether the model file is present.
    pub model_exists: bool,
    /// Configured model path.
    pub model_path: &'a str,
    /// Default confidence threshold for the form.
    pub conf_default: f32,
    /// Default `IoU` threshold for the form.
    pub iou_default: f32,
    /// Pending flash messages.
    pub messages: &'a [String],
}

/// Values shown on the result page.
#[derive(Debug, Clone)]
pub struct ResultPage<'a> {
    /// URL of the uploaded image.
    pub input_image: &'a str,
    /// URL of the annotated image.
    pub output_image: &'a str,
    /// Detections in detector order.
    pub detections: &'a [Detection],
    /// Confidence threshold used.
    pub conf: f32,
    /// `IoU` threshold used.
    pub iou: f32,
}

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!doctype html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n{body}</body>\n</html>\n",
        clean_text(title)
    )
}

/// Render the upload form.
#[must_use]
pub fn render_index(page: &IndexPage<'_>) -> String {
    let mut body = String::from("<h1>YOLO Object Detection</h1>\n");

    for message in page.messages {
        let _ = writeln!(body, "<div class=\"flash\">{}</div>", clean_text(message));
    }

    if !page.model_exists {
        let _ = writeln!(
            body,
            "<p class=\"warn\">Model file not found at <code>{}</code>. \
             Place your trained model there or set MODEL_PATH.</p>",
            clean_text(page.model_path)
        );
    }

    let _ = write!(
        body,
        "<form action=\"/predict\" method=\"post\" enctype=\"multipart/form-data\">\n\
         <label>Image <input type=\"file\" name=\"image\" accept=\".png,.jpg,.jpeg,.webp,.bmp\"></label>\n\
         <label>Confidence <input type=\"number\" name=\"conf\" min=\"0\" max=\"1\" step=\"0.01\" value=\"{}\"></label>\n\
         <label>IoU <input type=\"number\" name=\"iou\" min=\"0\" max=\"1\" step=\"0.01\" value=\"{}\"></label>\n\
         <button type=\"submit\">Detect</button>\n</form>\n\
         <p>JSON API: <code>POST /api/predict</code> with the same fields.</p>\n",
        page.conf_default, page.iou_default
    );

    layout("YOLO Object Detection", &body)
}

/// Render detection results.
#[must_use]
pub fn render_result(page: &ResultPage<'_>) -> String {
    let mut body = String::from("<h1>Detection Results</h1>\n");

    let _ = writeln!(
        body,
        "<p>Confidence {:.2} &middot; IoU {:.2} &middot; {} object(s)</p>",
        page.conf,
        page.iou,
        page.detections.len()
    );
    let _ = writeln!(
        body,
        "<div class=\"images\">\n<figure><img src=\"{}\" alt=\"Input image\"><figcaption>Input</figcaption></figure>\n\
         <figure><img src=\"{}\" alt=\"Annotated image\"><figcaption>Detections</figcaption></figure>\n</div>",
        clean_text(page.input_image),
        clean_text(page.output_image)
    );

    if page.detections.is_empty() {
        body.push_str("<p>No objects detected.</p>\n");
    } else {
        body.push_str(
            "<table>\n<thead><tr><th>#</th><th>Label</th><th>Confidence</th><th>Box [x1, y1, x2, y2]</th></tr></thead>\n<tbody>\n",
        );
        for (i, d) in page.detections.iter().enumerate() {
            let [x1, y1, x2, y2] = d.bbox;
            let _ = writeln!(
                body,
                "<tr><td>{}</td><td>{}</td><td>{:.3}</td><td>[{x1:.1}, {y1:.1}, {x2:.1}, {y2:.1}]</td></tr>",
                i + 1,
                clean_text(&d.label),
                d.confidence
            );
        }
        body.push_str("</tbody>\n</table>\n");
    }

    body.push_str("<p><a href=\"/\">Run another image</a></p>\n");
    layout("Detection Results", &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_escapes_messages() {
        let messages = vec!["<script>alert(1)</script>".to_string()];
        let html = render_index(&IndexPage {
            model_exists: false,
            model_path: "models/best.onnx",
            conf_default: 0.25,
            iou_default: 0.45,
            messages: &messages,
        });

        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("Model file not found"));
        assert!(html.contains("value=\"0.25\""));
    }

    #[test]
    fn test_result_lists_detections() {
        let detections = vec![Detection {
            label: "cat".to_string(),
            confidence: 0.875,
            bbox: [1.0, 2.0, 30.0, 40.0],
            class_id: 0,
        }];
        let html = render_result(&ResultPage {
            input_image: "/uploads/a.png",
            output_image: "/outputs/b.jpg",
            detections: &detections,
            conf: 0.25,
            iou: 0.45,
        });

        // Slashes are entity-encoded inside attributes
        assert!(html.contains("&#47;outputs&#47;b.jpg"));
        assert!(html.contains("<td>cat</td>"));
        assert!(html.contains("[1.0, 2.0, 30.0, 40.0]"));
    }

    #[test]
    fn test_result_without_detections() {
        let html = render_result(&ResultPage {
            input_image: "/uploads/a.png",
            output_image: "/outputs/b.jpg",
            detections: &[],
            conf: 0.5,
            iou: 0.5,
        });
        assert!(html.contains("No objects detected."));
    }
}

// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{AppConfig, DEFAULT_MODEL_PATH};
use crate::inference::{DEFAULT_CONFIDENCE, DEFAULT_IOU};

/// CLI arguments parser.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = r#"Examples:
    yolo-web serve
    yolo-web serve --model-path models/best.onnx --port 8000
    MODEL_PATH=models/best.onnx STORAGE_TTL_SECS=3600 yolo-web serve
    yolo-web predict --model models/best.onnx --source bus.jpg
    yolo-web predict -m models/best.onnx -s bus.jpg --conf 0.5 --json"#)]
pub struct Cli {
    #[command(subcommand)]
    /// Subcommand to execute.
    pub command: Commands,
}

/// Commands for the CLI.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the detection web application
    Serve(AppConfig),
    /// Run detection once on a local image
    Predict(PredictArgs),
}

/// Arguments for the predict command.
#[derive(Args, Debug, Clone)]
pub struct PredictArgs {
    /// Path to ONNX model file
    #[arg(short, long, default_value = DEFAULT_MODEL_PATH)]
    pub model: PathBuf,

    /// Image to run detection on
    #[arg(short, long)]
    pub source: PathBuf,

    /// Confidence threshold
    #[arg(long, default_value_t = DEFAULT_CONFIDENCE)]
    pub conf: f32,

    /// `IoU` threshold for NMS
    #[arg(long, default_value_t = DEFAULT_IOU)]
    pub iou: f32,

    /// Directory for the annotated image
    #[arg(long, default_value = "outputs")]
    pub output_dir: PathBuf,

    /// TrueType font for labels
    #[arg(long, env = "FONT_PATH")]
    pub font_path: Option<PathBuf>,

    /// Print detections as JSON on stdout
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Show verbose output
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub verbose: bool,
}

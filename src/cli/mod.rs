// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Command-line interface: the `serve` and `predict` commands.

/// CLI arguments.
pub mod args;

/// Coloured console output.
pub mod logging;

/// One-shot prediction.
pub mod predict;

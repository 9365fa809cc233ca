// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Human-facing CLI output.
//!
//! In JSON mode stdout carries only the JSON document, so every macro here
//! writes to stderr instead and the chatty ones go quiet.

use std::sync::atomic::{AtomicBool, Ordering};

static VERBOSE: AtomicBool = AtomicBool::new(true);
static JSON_MODE: AtomicBool = AtomicBool::new(false);

/// Set the global verbosity flag.
pub fn set_verbose(verbose: bool) {
    VERBOSE.store(verbose, Ordering::Relaxed);
}

/// Check if verbose output is enabled. Always false in JSON mode.
pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed) && !is_json()
}

/// Route human output away from stdout.
pub fn set_json(json: bool) {
    JSON_MODE.store(json, Ordering::Relaxed);
}

/// Whether stdout is reserved for JSON.
pub fn is_json() -> bool {
    JSON_MODE.load(Ordering::Relaxed)
}

/// Print a line to stdout, or stderr in JSON mode.
#[doc(hidden)]
pub fn emit(line: &str) {
    if is_json() {
        eprintln!("{line}");
    } else {
        println!("{line}");
    }
}

/// Macro for warning messages.
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {{
        use colored::Colorize;
        eprintln!("{} {}", "WARNING ⚠️".yellow().bold(), format!($($arg)*));
    }}
}

/// Macro for error messages.
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {{
        use colored::Colorize;
        eprintln!("{} {}", "Error:".red().bold(), format!($($arg)*));
    }}
}

/// Macro for success messages.
#[macro_export]
macro_rules! success {
    ($($arg:tt)*) => {{
        use colored::Colorize;
        $crate::cli::logging::emit(&format!("{} {}", "✅".green(), format!($($arg)*)));
    }}
}

/// Macro for verbose messages.
#[macro_export]
macro_rules! verbose {
    ($($arg:tt)*) => {
        if $crate::cli::logging::is_verbose() {
            $crate::cli::logging::emit(&format!($($arg)*));
        }
    }
}

/// Macro for section headers.
#[macro_export]
macro_rules! section {
    ($($arg:tt)*) => {{
        use colored::Colorize;
        if $crate::cli::logging::is_verbose() {
            $crate::cli::logging::emit("");
            $crate::cli::logging::emit(&format!($($arg)*).cyan().bold().to_string());
        }
    }}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_mode_silences_verbose() {
        set_verbose(true);
        set_json(false);
        assert!(is_verbose());

        set_json(true);
        assert!(is_json());
        assert!(!is_verbose());

        set_json(false);
        set_verbose(false);
        assert!(!is_verbose());
        set_verbose(true);
    }
}

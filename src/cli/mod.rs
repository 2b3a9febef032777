//! Command-line front end
//!
//! Contains the logic behind the `upload-session` binary. Argument parsing
//! lives in the binary; this module receives plain argument structs.

pub mod commands;
pub mod output;

pub use commands::{Command, GlobalArgs, run};

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::settings::LoggingSettings;

/// Install the stderr subscriber; stdout is reserved for command output
pub fn init_logging(settings: &LoggingSettings) {
    // A subscriber may already be set when embedded in a larger program
    let _ = tracing_subscriber::registry()
        .with(log_filter(settings))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// `--verbose` beats `RUST_LOG`, which beats the configured level
fn log_filter(settings: &LoggingSettings) -> EnvFilter {
    if settings.verbose {
        return EnvFilter::new("debug");
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level))
}

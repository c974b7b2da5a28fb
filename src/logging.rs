//! Logging setup on top of `tracing-subscriber`.
//!
//! The configuration is built by the caller and handed to [`init_logging`];
//! nothing here reads global state except the `WEBRCON_LOG` override.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::RconError;

/// Environment variable that overrides the verbosity-derived filter.
pub const LOG_ENV: &str = "WEBRCON_LOG";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Filter directive, e.g. "info" or "webrcon=debug,tungstenite=warn"
    pub filter: String,
    /// Include file/line in log lines
    pub file_line: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".into(),
            file_line: false,
        }
    }
}

impl LogConfig {
    pub fn for_verbosity(verbose: bool) -> Self {
        let fallback = if verbose { "debug" } else { "info" };
        Self::with_override(verbose, std::env::var(LOG_ENV).ok())
            .unwrap_or_else(|| Self {
                filter: fallback.into(),
                file_line: verbose,
            })
    }

    fn with_override(verbose: bool, filter: Option<String>) -> Option<Self> {
        filter
            .filter(|f| !f.trim().is_empty())
            .map(|filter| Self {
                filter,
                file_line: verbose,
            })
    }
}

/// Installs a stderr subscriber; fails rather than panicking if one already exists.
pub fn init_logging(config: &LogConfig) -> Result<(), RconError> {
    let filter = EnvFilter::try_new(&config.filter)
        .map_err(|e| RconError::Internal(format!("Invalid log filter: {}", e)))?;

    let fmt_layer = fmt::layer()
        .with_target(config.file_line)
        .with_file(config.file_line)
        .with_line_number(config.file_line)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| RconError::Internal(format!("Failed to init logging: {}", e)))
}

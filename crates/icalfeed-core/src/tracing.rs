//! Logging setup shared by the icalfeed crates.
//!
//! Library crates only emit `tracing` events. Binaries install a subscriber
//! once at startup:
//!
//! ```ignore
//! use icalfeed_core::tracing::{init_tracing, TracingConfig};
//!
//! init_tracing(TracingConfig::cli())?;
//! ```

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    prelude::*,
};

/// Target prefix matching every icalfeed crate.
const TARGET_PREFIX: &str = "icalfeed";

/// Errors that can occur while installing the subscriber.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("failed to parse env filter: {0}")]
    EnvFilter(#[from] tracing_subscriber::filter::ParseError),
}

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingOutputFormat {
    /// Multi-line human-readable output.
    Pretty,
    /// Single-line human-readable output.
    #[default]
    Compact,
    /// One JSON object per line.
    Json,
}

/// Subscriber settings.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Level for icalfeed targets when `RUST_LOG` is not set.
    pub default_level: Level,
    pub output_format: TracingOutputFormat,
    /// Include file and line number.
    pub include_location: bool,
    /// Include the module path.
    pub include_target: bool,
    pub include_timestamp: bool,
    /// Log span open/close (useful to follow pipeline tasks).
    pub include_span_events: bool,
    /// Explicit filter directive, overrides both `RUST_LOG` and `default_level`.
    pub env_filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_level: Level::INFO,
            output_format: TracingOutputFormat::Compact,
            include_location: false,
            include_target: true,
            include_timestamp: true,
            include_span_events: false,
            env_filter: None,
        }
    }
}

impl TracingConfig {
    /// Quiet settings for interactive CLI use: warnings only, no timestamps.
    #[must_use]
    pub fn cli() -> Self {
        Self {
            default_level: Level::WARN,
            include_target: false,
            include_timestamp: false,
            ..Self::default()
        }
    }

    /// Verbose CLI settings used with `--debug`.
    #[must_use]
    pub fn cli_debug() -> Self {
        Self {
            default_level: Level::DEBUG,
            include_location: true,
            include_timestamp: false,
            ..Self::default()
        }
    }

    /// Structured JSON output for batch or service use.
    #[must_use]
    pub fn structured() -> Self {
        Self {
            output_format: TracingOutputFormat::Json,
            include_location: true,
            include_span_events: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingOutputFormat) -> Self {
        self.output_format = format;
        self
    }

    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// The filter directive used when `RUST_LOG` is not set.
    pub fn default_directive(&self) -> String {
        format!("{TARGET_PREFIX}={}", self.default_level)
    }
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Fails if a global subscriber is already set or the filter directive is
/// invalid.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let env_filter = match config.env_filter {
        Some(ref filter) => EnvFilter::try_new(filter)?,
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.default_directive())),
    };

    let span_events = if config.include_span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    match config.output_format {
        TracingOutputFormat::Pretty => {
            let subscriber = tracing_subscriber::registry().with(env_filter).with(
                fmt::layer()
                    .pretty()
                    .with_writer(std::io::stderr)
                    .with_file(config.include_location)
                    .with_line_number(config.include_location)
                    .with_target(config.include_target)
                    .with_span_events(span_events),
            );
            tracing::subscriber::set_global_default(subscriber)?;
        }
        TracingOutputFormat::Compact => {
            let layer = fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_target(config.include_target)
                .with_span_events(span_events);

            let layer = if config.include_timestamp {
                layer.boxed()
            } else {
                layer.without_time().boxed()
            };

            let subscriber = tracing_subscriber::registry().with(env_filter).with(layer);
            tracing::subscriber::set_global_default(subscriber)?;
        }
        TracingOutputFormat::Json => {
            let subscriber = tracing_subscriber::registry().with(env_filter).with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_file(config.include_location)
                    .with_line_number(config.include_location)
                    .with_target(config.include_target)
                    .with_span_events(span_events),
            );
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_quiet() {
        let config = TracingConfig::cli();
        assert_eq!(config.default_level, Level::WARN);
        assert_eq!(config.output_format, TracingOutputFormat::Compact);
        assert!(!config.include_timestamp);
        assert_eq!(config.default_directive(), "icalfeed=WARN");
    }

    #[test]
    fn cli_debug_includes_location() {
        let config = TracingConfig::cli_debug();
        assert_eq!(config.default_level, Level::DEBUG);
        assert!(config.include_location);
    }

    #[test]
    fn structured_is_json() {
        let config = TracingConfig::structured();
        assert_eq!(config.output_format, TracingOutputFormat::Json);
        assert!(config.include_span_events);
    }

    #[test]
    fn builder_methods() {
        let config = TracingConfig::default()
            .with_level(Level::TRACE)
            .with_format(TracingOutputFormat::Pretty)
            .with_env_filter("icalfeed_parser=trace");

        assert_eq!(config.default_level, Level::TRACE);
        assert_eq!(config.output_format, TracingOutputFormat::Pretty);
        assert_eq!(config.env_filter.as_deref(), Some("icalfeed_parser=trace"));
    }
}

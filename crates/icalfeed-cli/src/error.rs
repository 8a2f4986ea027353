//! CLI error types.

use icalfeed_pipeline::PipelineError;
use thiserror::Error;

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// Errors that end a CLI run.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Nothing to ingest.
    #[error("no calendar sources given (pass paths or URLs, or set `sources` in the config file)")]
    NoSources,

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Output could not be produced.
    #[error("output error: {0}")]
    Output(String),

    /// At least one source could not be read; the rest was printed.
    #[error("{0} source(s) failed")]
    SourcesFailed(usize),
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        Self::Output(err.to_string())
    }
}

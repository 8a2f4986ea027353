//! Pipeline error types.

use icalfeed_sources::SourceError;
use thiserror::Error;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors returned by the pipeline itself.
///
/// Per-source retrieval failures are not returned here; they are collected
/// and exposed through [`Pipeline::errors`](crate::Pipeline::errors).
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Results were requested while sources are still in flight.
    #[error("results not ready: {in_flight} source(s) still in flight")]
    NotReady { in_flight: usize },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The default content source could not be built.
    #[error("Source setup failed: {0}")]
    Source(#[from] SourceError),
}

impl PipelineError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns true for the early-access usage error.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::NotReady { .. })
    }
}

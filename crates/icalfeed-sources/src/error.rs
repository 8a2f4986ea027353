//! Error types for content retrieval.

use std::fmt;
use thiserror::Error;

/// The category of a retrieval failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceErrorCode {
    /// The file or remote resource does not exist.
    NotFound,
    /// Connection failed, timed out, DNS resolution failed, etc.
    Network,
    /// Local filesystem error (temp directory, permissions, ...).
    Io,
    /// The content could not be used, e.g. it is not UTF-8.
    InvalidResponse,
    /// The server answered with a 5xx status.
    ServerError,
    /// The source identifier or client setup is invalid.
    Configuration,
}

impl SourceErrorCode {
    /// Returns true if the failure is transient and a later attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::ServerError)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Network => "network_error",
            Self::Io => "io_error",
            Self::InvalidResponse => "invalid_response",
            Self::ServerError => "server_error",
            Self::Configuration => "configuration_error",
        }
    }
}

impl fmt::Display for SourceErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A source could not be retrieved.
#[derive(Debug, Error)]
pub struct SourceError {
    code: SourceErrorCode,
    message: String,
    /// The path or URL that failed.
    source_id: Option<String>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl SourceError {
    pub fn new(code: SourceErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source_id: None,
            source: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(SourceErrorCode::NotFound, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(SourceErrorCode::Network, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(SourceErrorCode::Io, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(SourceErrorCode::InvalidResponse, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(SourceErrorCode::ServerError, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(SourceErrorCode::Configuration, message)
    }

    /// Classifies a filesystem error.
    pub fn from_io(err: std::io::Error, message: impl Into<String>) -> Self {
        let code = match err.kind() {
            std::io::ErrorKind::NotFound => SourceErrorCode::NotFound,
            std::io::ErrorKind::InvalidData => SourceErrorCode::InvalidResponse,
            _ => SourceErrorCode::Io,
        };
        Self::new(code, message).with_source(err)
    }

    /// Records which source failed.
    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    /// Sets the underlying cause.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> SourceErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn source_id(&self) -> Option<&str> {
        self.source_id.as_deref()
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref source_id) = self.source_id {
            write!(f, "[{}] ", source_id)?;
        }
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// A specialized Result type for retrieval.
pub type SourceResult<T> = Result<T, SourceError>;

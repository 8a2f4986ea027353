//! The [`ContentSource`] trait and the local implementations.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use tracing::{debug, trace};
use url::Url;

use crate::error::{SourceError, SourceResult};

/// A boxed future for async trait methods.
///
/// Boxing keeps [`ContentSource`] object-safe so a pipeline can hold an
/// `Arc<dyn ContentSource>`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Retrieves the text of a calendar document.
///
/// `source_id` is whatever the caller submitted: a path, a URL or a key.
/// Implementations must be `Send + Sync`; one instance serves many
/// concurrent fetches.
pub trait ContentSource: Send + Sync {
    /// Short name used in logs (e.g. "file", "http").
    fn name(&self) -> &str;

    /// Fetches the document identified by `source_id`.
    ///
    /// # Errors
    ///
    /// Returns a [`SourceError`] when the document cannot be read. Errors
    /// carry `source_id`.
    fn fetch<'a>(&'a self, source_id: &'a str) -> BoxFuture<'a, SourceResult<String>>;
}

/// Returns true for `http://` and `https://` identifiers.
pub fn is_remote(source_id: &str) -> bool {
    let lower = source_id.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Reads documents from the local filesystem.
///
/// Accepts plain paths and `file://` URLs.
#[derive(Debug, Clone, Default)]
pub struct FileSource;

impl FileSource {
    pub fn new() -> Self {
        Self
    }

    fn resolve(source_id: &str) -> SourceResult<PathBuf> {
        if !source_id.starts_with("file://") {
            return Ok(PathBuf::from(source_id));
        }
        Url::parse(source_id)
            .ok()
            .and_then(|url| url.to_file_path().ok())
            .ok_or_else(|| SourceError::configuration("invalid file URL"))
    }
}

impl ContentSource for FileSource {
    fn name(&self) -> &str {
        "file"
    }

    fn fetch<'a>(&'a self, source_id: &'a str) -> BoxFuture<'a, SourceResult<String>> {
        Box::pin(async move {
            let path = Self::resolve(source_id).map_err(|e| e.with_source_id(source_id))?;
            trace!(path = %path.display(), "Reading calendar file");

            let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
                let message = match e.kind() {
                    std::io::ErrorKind::NotFound => {
                        format!("file {} does not exist", path.display())
                    }
                    _ => format!("failed to read {}", path.display()),
                };
                SourceError::from_io(e, message).with_source_id(source_id)
            })?;

            debug!(path = %path.display(), bytes = text.len(), "Read calendar file");
            Ok(text)
        })
    }
}

/// Serves documents from memory, keyed by source id.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    documents: HashMap<String, String>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to register a document.
    pub fn with_document(mut self, source_id: impl Into<String>, text: impl Into<String>) -> Self {
        self.documents.insert(source_id.into(), text.into());
        self
    }

    pub fn insert(&mut self, source_id: impl Into<String>, text: impl Into<String>) {
        self.documents.insert(source_id.into(), text.into());
    }
}

impl ContentSource for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    fn fetch<'a>(&'a self, source_id: &'a str) -> BoxFuture<'a, SourceResult<String>> {
        let result = self.documents.get(source_id).cloned().ok_or_else(|| {
            SourceError::not_found("no document registered").with_source_id(source_id)
        });
        Box::pin(async move { result })
    }
}

/// Dispatches to [`HttpSource`](crate::HttpSource) for `http(s)://`
/// identifiers and to [`FileSource`] for everything else.
pub struct AutoSource {
    file: FileSource,
    #[cfg(feature = "http")]
    http: crate::http::HttpSource,
}

impl AutoSource {
    #[cfg(feature = "http")]
    pub fn new(http: crate::http::HttpSource) -> Self {
        Self {
            file: FileSource::new(),
            http,
        }
    }

    #[cfg(not(feature = "http"))]
    pub fn new() -> Self {
        Self {
            file: FileSource::new(),
        }
    }

    #[cfg(feature = "http")]
    fn fetch_remote<'a>(&'a self, source_id: &'a str) -> BoxFuture<'a, SourceResult<String>> {
        self.http.fetch(source_id)
    }

    #[cfg(not(feature = "http"))]
    fn fetch_remote<'a>(&'a self, source_id: &'a str) -> BoxFuture<'a, SourceResult<String>> {
        Box::pin(async move {
            Err(SourceError::configuration("remote sources require the http feature")
                .with_source_id(source_id))
        })
    }
}

impl ContentSource for AutoSource {
    fn name(&self) -> &str {
        "auto"
    }

    fn fetch<'a>(&'a self, source_id: &'a str) -> BoxFuture<'a, SourceResult<String>> {
        if is_remote(source_id) {
            self.fetch_remote(source_id)
        } else {
            self.file.fetch(source_id)
        }
    }
}

//! Remote calendar retrieval over HTTP(S).
//!
//! Downloads are written to a temp directory, read back, and removed again
//! unless `delete_temp_files` is off (useful when debugging a feed).

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use tracing::{debug, trace, warn};
use url::Url;
use uuid::Uuid;

use crate::error::{SourceError, SourceResult};
use crate::source::{BoxFuture, ContentSource};

/// File name used when the URL path has no usable last segment.
const FALLBACK_FILE_NAME: &str = "calendar.ics";

/// Configuration for [`HttpSource`].
#[derive(Debug, Clone)]
pub struct HttpSourceConfig {
    /// Where downloads are stored before parsing.
    pub temp_dir: PathBuf,
    /// Remove each download once it has been read.
    pub delete_temp_files: bool,
    /// Request timeout.
    pub timeout: Duration,
    pub user_agent: String,
}

impl HttpSourceConfig {
    /// Default timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Default download directory, relative to the working directory.
    pub const DEFAULT_TEMP_DIR: &'static str = "tmp/";

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    pub fn with_delete_temp_files(mut self, delete: bool) -> Self {
        self.delete_temp_files = delete;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

impl Default for HttpSourceConfig {
    fn default() -> Self {
        Self {
            temp_dir: PathBuf::from(Self::DEFAULT_TEMP_DIR),
            delete_temp_files: true,
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            user_agent: format!("icalfeed/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Downloads calendar documents with `reqwest`.
pub struct HttpSource {
    client: Client,
    config: HttpSourceConfig,
}

impl HttpSource {
    /// Creates a source with its own HTTP client.
    pub fn new(config: HttpSourceConfig) -> SourceResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| {
                SourceError::configuration(format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &HttpSourceConfig {
        &self.config
    }

    async fn download(&self, url: &str) -> SourceResult<String> {
        let parsed = Url::parse(url)
            .map_err(|e| SourceError::configuration(format!("invalid URL: {}", e)).with_source(e))?;

        trace!(url = %parsed, "Sending request");
        let response = self
            .client
            .get(parsed.clone())
            .send()
            .await
            .map_err(|e| SourceError::network(format!("request failed: {}", e)).with_source(e))?;

        let body = handle_response(response).await?;

        let path = self.config.temp_dir.join(temp_file_name(&parsed));
        tokio::fs::create_dir_all(&self.config.temp_dir)
            .await
            .map_err(|e| {
                SourceError::from_io(
                    e,
                    format!("failed to create {}", self.config.temp_dir.display()),
                )
            })?;
        tokio::fs::write(&path, &body)
            .await
            .map_err(|e| SourceError::from_io(e, format!("failed to write {}", path.display())))?;
        debug!(path = %path.display(), bytes = body.len(), "Stored download");

        let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
            SourceError::from_io(e, format!("failed to read {}", path.display()))
        });

        if self.config.delete_temp_files {
            remove_temp_file(&path).await;
        }

        text
    }
}

impl ContentSource for HttpSource {
    fn name(&self) -> &str {
        "http"
    }

    fn fetch<'a>(&'a self, source_id: &'a str) -> BoxFuture<'a, SourceResult<String>> {
        Box::pin(async move {
            self.download(source_id)
                .await
                .map_err(|e| e.with_source_id(source_id))
        })
    }
}

/// Maps the response status to a body or an error.
async fn handle_response(response: Response) -> SourceResult<Vec<u8>> {
    let status = response.status();
    trace!(status = %status, "Received response");

    match status {
        s if s.is_success() => response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| SourceError::network(format!("failed to read response: {}", e))),
        StatusCode::NOT_FOUND | StatusCode::GONE => {
            Err(SourceError::not_found("calendar not found on server"))
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SourceError::configuration(
            format!("access denied ({})", status),
        )),
        s if s.is_server_error() => {
            let body = response.text().await.unwrap_or_default();
            Err(SourceError::server(format!("server error ({}): {}", s, body)))
        }
        s => {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %s, body = %body, "Unexpected response status");
            Err(SourceError::invalid_response(format!(
                "unexpected status {}: {}",
                s, body
            )))
        }
    }
}

/// A unique file name for one download, ending with the URL's last path
/// segment.
fn temp_file_name(url: &Url) -> String {
    let segment: String = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    let segment = if segment.is_empty() {
        FALLBACK_FILE_NAME
    } else {
        segment.as_str()
    };
    format!("{}_{}", Uuid::new_v4().simple(), segment)
}

async fn remove_temp_file(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "Failed to remove temp file");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceErrorCode;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves a single canned HTTP response on a local port.
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
        });
        format!("http://{addr}/calendars/basic.ics")
    }

    fn source(dir: &Path, delete: bool) -> HttpSource {
        let config = HttpSourceConfig::default()
            .with_temp_dir(dir.join("downloads"))
            .with_delete_temp_files(delete)
            .with_timeout(Duration::from_secs(5));
        HttpSource::new(config).unwrap()
    }

    #[test]
    fn config_defaults() {
        let config = HttpSourceConfig::default();
        assert_eq!(config.temp_dir, PathBuf::from("tmp/"));
        assert!(config.delete_temp_files);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.user_agent.starts_with("icalfeed/"));
    }

    #[test]
    fn temp_file_names() {
        let url = Url::parse("https://example.com/calendar/ical/basic.ics").unwrap();
        let name = temp_file_name(&url);
        assert!(name.ends_with("_basic.ics"));
        assert_ne!(name, temp_file_name(&url));

        let url = Url::parse("https://example.com/").unwrap();
        assert!(temp_file_name(&url).ends_with("_calendar.ics"));

        let url = Url::parse("https://example.com/a/b%20c?.ics").unwrap();
        assert!(temp_file_name(&url).ends_with("_b20c"));
    }

    #[tokio::test]
    async fn downloads_and_deletes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let url = serve_once("200 OK", "BEGIN:VCALENDAR\nVERSION:2.0\nEND:VCALENDAR\n").await;

        let text = source(dir.path(), true).fetch(&url).await.unwrap();
        assert!(text.contains("VERSION:2.0"));

        let leftovers = std::fs::read_dir(dir.path().join("downloads")).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn keeps_temp_file_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let url = serve_once("200 OK", "VERSION:2.0\n").await;

        source(dir.path(), false).fetch(&url).await.unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path().join("downloads"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with("_basic.ics"));
    }

    #[tokio::test]
    async fn not_found_status() {
        let dir = tempfile::tempdir().unwrap();
        let url = serve_once("404 Not Found", "").await;

        let err = source(dir.path(), true).fetch(&url).await.unwrap_err();
        assert_eq!(err.code(), SourceErrorCode::NotFound);
        assert_eq!(err.source_id(), Some(url.as_str()));
    }

    #[tokio::test]
    async fn server_error_is_retryable() {
        let dir = tempfile::tempdir().unwrap();
        let url = serve_once("503 Service Unavailable", "maintenance").await;

        let err = source(dir.path(), true).fetch(&url).await.unwrap_err();
        assert_eq!(err.code(), SourceErrorCode::ServerError);
        assert!(err.is_retryable());
        assert!(err.message().contains("maintenance"));
    }

    #[tokio::test]
    async fn invalid_url_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = source(dir.path(), true).fetch("http://").await.unwrap_err();
        assert_eq!(err.code(), SourceErrorCode::Configuration);
    }
}

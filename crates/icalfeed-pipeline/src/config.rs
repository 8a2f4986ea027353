//! Pipeline configuration.

use std::path::PathBuf;
use std::time::Duration;

use icalfeed_parser::ParseOptions;
use icalfeed_sources::HttpSourceConfig;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// Settings for one [`Pipeline`](crate::Pipeline) instance.
///
/// Every field has a default, so a partial TOML table is enough:
///
/// ```toml
/// temp_dir = "/var/tmp/icalfeed"
/// expand_recurrences = true
/// max_repeats = 25
/// http_timeout = 10
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Where remote documents are downloaded before parsing.
    pub temp_dir: PathBuf,

    /// Expand `RRULE` events into occurrences.
    pub expand_recurrences: bool,

    /// Upper bound on occurrences per recurring event.
    pub max_repeats: usize,

    /// Remove downloads once read.
    pub delete_temp_files: bool,

    /// HTTP request timeout, in seconds when read from a file.
    #[serde(with = "duration_secs")]
    pub http_timeout: Duration,

    pub user_agent: String,
}

impl PipelineConfig {
    pub const DEFAULT_MAX_REPEATS: usize = 10;

    /// Builder: set the download directory.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    /// Builder: turn recurrence expansion on or off.
    pub fn with_expand_recurrences(mut self, expand: bool) -> Self {
        self.expand_recurrences = expand;
        self
    }

    /// Builder: set the per-event occurrence bound.
    pub fn with_max_repeats(mut self, max: usize) -> Self {
        self.max_repeats = max;
        self
    }

    pub fn with_delete_temp_files(mut self, delete: bool) -> Self {
        self.delete_temp_files = delete;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Checks values that would make the pipeline useless.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] for a zero repeat bound while
    /// expansion is on, or a zero HTTP timeout.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.expand_recurrences && self.max_repeats == 0 {
            return Err(PipelineError::config(
                "max_repeats must be at least 1 when expanding recurrences",
            ));
        }
        if self.http_timeout.is_zero() {
            return Err(PipelineError::config("http_timeout must be positive"));
        }
        Ok(())
    }

    /// The parser options these settings imply.
    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            expand_recurrences: self.expand_recurrences,
            max_repeats: self.max_repeats,
        }
    }

    /// The HTTP source settings these settings imply.
    pub fn http_source_config(&self) -> HttpSourceConfig {
        HttpSourceConfig::default()
            .with_temp_dir(&self.temp_dir)
            .with_delete_temp_files(self.delete_temp_files)
            .with_timeout(self.http_timeout)
            .with_user_agent(&self.user_agent)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let http = HttpSourceConfig::default();
        Self {
            temp_dir: http.temp_dir,
            expand_recurrences: false,
            max_repeats: Self::DEFAULT_MAX_REPEATS,
            delete_temp_files: http.delete_temp_files,
            http_timeout: http.timeout,
            user_agent: http.user_agent,
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

//! CLI configuration.
//!
//! Settings live in `~/.config/icalfeed/config.toml` by default:
//!
//! ```toml
//! sources = ["~/calendars/team.ics", "https://example.com/holidays.ics"]
//!
//! [pipeline]
//! expand_recurrences = true
//! max_repeats = 20
//!
//! [output]
//! upcoming = 5
//! ```
//!
//! Command-line flags override file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use icalfeed_pipeline::PipelineConfig;
use serde::{Deserialize, Serialize};

use crate::cli::Cli;
use crate::error::{CliError, CliResult};

/// Contents of `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Debug mode.
    pub debug: bool,

    /// Sources read when none are given on the command line.
    pub sources: Vec<String>,

    /// Parsing and download settings.
    pub pipeline: PipelineConfig,

    /// Output settings.
    pub output: OutputSettings,
}

/// Output settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Print JSON instead of text.
    pub json: bool,

    /// Only show the next N events of each calendar.
    pub upcoming: Option<usize>,
}

impl CliConfig {
    /// Loads configuration from the default path, if it exists.
    pub fn load() -> CliResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> CliResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            CliError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("icalfeed")
    }
}

/// What to show from each calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Selection {
    /// Every event, in commit order.
    #[default]
    All,
    /// The next N events after now.
    Upcoming(usize),
    /// Events spanning one day.
    Day(NaiveDate),
}

/// Effective settings for one run: the file merged with the flags.
#[derive(Debug, Clone)]
pub struct Settings {
    pub debug: bool,
    pub sources: Vec<String>,
    pub pipeline: PipelineConfig,
    pub json: bool,
    pub selection: Selection,
}

impl Settings {
    /// Applies command-line overrides on top of the file configuration.
    pub fn resolve(cli: &Cli, file: CliConfig) -> Self {
        let mut pipeline = file.pipeline;
        if cli.expand {
            pipeline = pipeline.with_expand_recurrences(true);
        }
        if let Some(max) = cli.max_repeats {
            pipeline = pipeline.with_max_repeats(max);
        }
        if let Some(ref dir) = cli.temp_dir {
            pipeline = pipeline.with_temp_dir(dir);
        }
        if cli.keep_temp_files {
            pipeline = pipeline.with_delete_temp_files(false);
        }
        if let Some(secs) = cli.timeout {
            pipeline = pipeline.with_http_timeout(Duration::from_secs(secs));
        }

        let sources = if cli.sources.is_empty() {
            file.sources
        } else {
            cli.sources.clone()
        };

        let selection = match (cli.day, cli.upcoming.or(file.output.upcoming)) {
            (Some(day), _) => Selection::Day(day),
            (None, Some(n)) => Selection::Upcoming(n),
            (None, None) => Selection::All,
        };

        Self {
            debug: cli.debug || file.debug,
            sources,
            pipeline,
            json: cli.json || file.output.json,
            selection,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    const FILE: &str = r#"
debug = true
sources = ["team.ics"]

[pipeline]
expand_recurrences = true
max_repeats = 20
temp_dir = "/var/tmp/icalfeed"

[output]
upcoming = 5
"#;

    #[test]
    fn parse_config_file() {
        let config: CliConfig = toml::from_str(FILE).unwrap();
        assert!(config.debug);
        assert_eq!(config.sources, vec!["team.ics"]);
        assert!(config.pipeline.expand_recurrences);
        assert_eq!(config.pipeline.max_repeats, 20);
        assert_eq!(config.pipeline.http_timeout, Duration::from_secs(30));
        assert_eq!(config.output.upcoming, Some(5));
        assert!(!config.output.json);
    }

    #[test]
    fn empty_file_is_default() {
        let config: CliConfig = toml::from_str("").unwrap();
        assert!(config.sources.is_empty());
        assert_eq!(config.pipeline, PipelineConfig::default());
    }

    #[test]
    fn load_from_reports_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        assert!(matches!(
            CliConfig::load_from(&path),
            Err(CliError::Config(_))
        ));

        std::fs::write(&path, "sources = 3\n").unwrap();
        let err = CliConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("failed to parse"));

        std::fs::write(&path, FILE).unwrap();
        assert!(CliConfig::load_from(&path).unwrap().debug);
    }

    #[test]
    fn dump_round_trips() {
        let config: CliConfig = toml::from_str(FILE).unwrap();
        let dumped = toml::to_string_pretty(&config).unwrap();
        let again: CliConfig = toml::from_str(&dumped).unwrap();
        assert_eq!(again.pipeline, config.pipeline);
        assert_eq!(again.sources, config.sources);
    }

    #[test]
    fn file_values_without_flags() {
        let cli = Cli::parse_from(["icalfeed"]);
        let settings = Settings::resolve(&cli, toml::from_str(FILE).unwrap());

        assert!(settings.debug);
        assert_eq!(settings.sources, vec!["team.ics"]);
        assert_eq!(settings.selection, Selection::Upcoming(5));
        assert_eq!(settings.pipeline.temp_dir, PathBuf::from("/var/tmp/icalfeed"));
    }

    #[test]
    fn flags_override_file() {
        let cli = Cli::parse_from([
            "icalfeed",
            "--max-repeats",
            "2",
            "--temp-dir",
            "downloads",
            "--keep-temp-files",
            "--timeout",
            "3",
            "--json",
            "--day",
            "2025-01-13",
            "other.ics",
        ]);
        let settings = Settings::resolve(&cli, toml::from_str(FILE).unwrap());

        assert_eq!(settings.sources, vec!["other.ics"]);
        assert_eq!(settings.pipeline.max_repeats, 2);
        assert_eq!(settings.pipeline.temp_dir, PathBuf::from("downloads"));
        assert!(!settings.pipeline.delete_temp_files);
        assert_eq!(settings.pipeline.http_timeout, Duration::from_secs(3));
        assert!(settings.json);
        assert_eq!(
            settings.selection,
            Selection::Day(NaiveDate::from_ymd_opt(2025, 1, 13).unwrap())
        );
    }

    #[test]
    fn defaults_without_file() {
        let cli = Cli::parse_from(["icalfeed", "--expand", "a.ics"]);
        let settings = Settings::resolve(&cli, CliConfig::default());

        assert!(settings.pipeline.expand_recurrences);
        assert_eq!(settings.pipeline.max_repeats, 10);
        assert_eq!(settings.selection, Selection::All);
        assert!(!settings.json);
    }
}

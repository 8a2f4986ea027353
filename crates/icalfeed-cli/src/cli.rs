//! Command-line interface definition.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

/// icalfeed - Read iCalendar feeds and show what is in them
#[derive(Debug, Parser)]
#[command(name = "icalfeed")]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "ICALFEED_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    // --- Parsing flags ---
    /// Expand recurring events into occurrences
    #[arg(long)]
    pub expand: bool,

    /// Maximum occurrences generated per recurring event
    #[arg(long)]
    pub max_repeats: Option<usize>,

    // --- Download flags ---
    /// Directory for downloaded calendars
    #[arg(long)]
    pub temp_dir: Option<PathBuf>,

    /// Keep downloaded calendars instead of deleting them after parsing
    #[arg(long)]
    pub keep_temp_files: bool,

    /// HTTP timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    // --- Output flags ---
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Only show the next N events of each calendar
    #[arg(long, conflicts_with = "day")]
    pub upcoming: Option<usize>,

    /// Only show events on this day (YYYY-MM-DD)
    #[arg(long)]
    pub day: Option<NaiveDate>,

    /// Calendar files or http(s) URLs
    pub sources: Vec<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn sources_and_flags() {
        let cli = Cli::parse_from([
            "icalfeed",
            "--expand",
            "--max-repeats",
            "5",
            "--day",
            "2025-01-13",
            "a.ics",
            "https://example.com/b.ics",
        ]);
        assert!(cli.expand);
        assert_eq!(cli.max_repeats, Some(5));
        assert_eq!(cli.day, NaiveDate::from_ymd_opt(2025, 1, 13));
        assert_eq!(cli.sources, vec!["a.ics", "https://example.com/b.ics"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn config_subcommand() {
        let cli = Cli::parse_from(["icalfeed", "config", "path"]);
        assert!(matches!(
            cli.command,
            Some(Command::Config {
                action: ConfigAction::Path
            })
        ));
        assert!(cli.sources.is_empty());
    }

    #[test]
    fn upcoming_conflicts_with_day() {
        let result =
            Cli::try_parse_from(["icalfeed", "--upcoming", "3", "--day", "2025-01-13", "a.ics"]);
        assert!(result.is_err());
    }
}

//! Subcommand and default-run implementations.

pub mod config;
pub mod ingest;

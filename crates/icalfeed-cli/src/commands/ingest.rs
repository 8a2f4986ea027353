//! The default command: ingest every source and print the result.

use std::sync::Arc;

use chrono::Utc;
use icalfeed_core::Calendar;
use icalfeed_pipeline::Pipeline;
use icalfeed_sources::SourceError;
use tracing::{debug, info};

use crate::config::Settings;
use crate::error::{CliError, CliResult};
use crate::render::Report;

/// Calendars and failures from one ingestion run.
#[derive(Debug, Default)]
pub struct Ingested {
    pub calendars: Vec<Arc<Calendar>>,
    pub errors: Vec<Arc<SourceError>>,
}

/// Fetches and parses every configured source concurrently.
pub async fn ingest(settings: &Settings) -> CliResult<Ingested> {
    if settings.sources.is_empty() {
        return Err(CliError::NoSources);
    }

    let pipeline = Pipeline::with_config(settings.pipeline.clone())?;
    for source in &settings.sources {
        pipeline.submit(source.as_str());
    }
    debug!(sources = settings.sources.len(), "Waiting for sources");
    pipeline.wait().await;

    Ok(Ingested {
        calendars: pipeline.calendars()?,
        errors: pipeline.errors()?,
    })
}

/// Ingests, prints the report and fails if any source failed.
pub async fn run(settings: &Settings) -> CliResult<()> {
    let ingested = ingest(settings).await?;
    info!(
        calendars = ingested.calendars.len(),
        errors = ingested.errors.len(),
        "Ingestion finished"
    );

    let report = Report::new(
        &ingested.calendars,
        &ingested.errors,
        settings.selection,
        Utc::now(),
    );
    if settings.json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report.to_text());
    }

    match ingested.errors.len() {
        0 => Ok(()),
        n => Err(CliError::SourcesFailed(n)),
    }
}

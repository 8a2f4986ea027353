//! Concurrent ingestion of calendar sources.
//!
//! A [`Pipeline`] fans out one task per submitted source, parses what comes
//! back into [`Calendar`](icalfeed_core::Calendar)s and collects failures
//! alongside. Results become readable once every submission has finished,
//! while [`Pipeline::subscribe`] streams events as calendars complete.
//!
//! # Example
//!
//! ```rust,no_run
//! use icalfeed_pipeline::{Pipeline, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::default().with_expand_recurrences(true);
//!     let pipeline = Pipeline::with_config(config)?;
//!
//!     pipeline.submit("calendars/team.ics");
//!     pipeline.wait().await;
//!
//!     for calendar in pipeline.calendars()? {
//!         println!("{}: {} events", calendar.name, calendar.len());
//!     }
//!     Ok(())
//! }
//! ```

mod alarm;
mod config;
mod error;
mod pipeline;

pub use alarm::Alarm;
pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use pipeline::{EventStream, Pipeline};

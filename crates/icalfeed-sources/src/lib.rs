//! Content sources: where calendar documents come from.
//!
//! - [`ContentSource`] - the object-safe retrieval trait
//! - [`FileSource`] - local paths and `file://` URLs
//! - [`HttpSource`] - `http(s)://` downloads through a temp directory
//! - [`AutoSource`] - picks one of the above per identifier
//! - [`StaticSource`] - in-memory documents
//!
//! ```ignore
//! use icalfeed_sources::{AutoSource, ContentSource, HttpSource, HttpSourceConfig};
//!
//! let source = AutoSource::new(HttpSource::new(HttpSourceConfig::default())?);
//! let text = source.fetch("calendars/team.ics").await?;
//! ```

pub mod error;
#[cfg(feature = "http")]
pub mod http;
pub mod source;

pub use error::{SourceError, SourceErrorCode, SourceResult};
#[cfg(feature = "http")]
pub use http::{HttpSource, HttpSourceConfig};
pub use source::{AutoSource, BoxFuture, ContentSource, FileSource, StaticSource, is_remote};

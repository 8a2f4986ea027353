//! Concurrent ingestion of calendar sources.
//!
//! Each submitted source runs as its own Tokio task: fetch, parse, then a
//! short critical section that records the outcome. The in-flight counter
//! and both result lists live behind one lock; the counter is mirrored
//! into a `watch` channel so [`Pipeline::wait`] can sleep until it hits
//! zero.
//!
//! Parsed events are also pushed to every [`Pipeline::subscribe`] stream as
//! each calendar completes, until [`Pipeline::close`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use icalfeed_core::{Calendar, Event};
use icalfeed_parser::{ParseOptions, parse_document};
use icalfeed_sources::{AutoSource, ContentSource, HttpSource, SourceError};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};

/// Outcome of one source.
enum Outcome {
    Parsed(Calendar),
    Failed(SourceError),
}

/// Receiving end of [`Pipeline::subscribe`].
pub type EventStream = mpsc::UnboundedReceiver<Arc<Event>>;

/// Results collected so far.
#[derive(Default)]
struct ResultSet {
    calendars: Vec<Arc<Calendar>>,
    errors: Vec<Arc<SourceError>>,
    in_flight: usize,
    subscribers: Vec<mpsc::UnboundedSender<Arc<Event>>>,
    closed: bool,
}

impl ResultSet {
    fn add_calendar(&mut self, calendar: Calendar) {
        if !self.subscribers.is_empty() {
            for event in calendar.events() {
                let event = Arc::new(event.clone());
                // Dropped receivers unsubscribe
                self.subscribers.retain(|tx| tx.send(Arc::clone(&event)).is_ok());
            }
        }
        self.calendars.push(Arc::new(calendar));
    }
}

struct Shared {
    results: Mutex<ResultSet>,
    /// Mirrors `ResultSet::in_flight`; only written with `results` locked.
    in_flight_tx: watch::Sender<usize>,
    source: Arc<dyn ContentSource>,
    options: ParseOptions,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ResultSet> {
        // Critical sections only push and count, so a poisoned set is intact
        self.results.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self) -> usize {
        let mut results = self.lock();
        results.in_flight += 1;
        self.in_flight_tx.send_replace(results.in_flight);
        results.in_flight
    }

    fn finish(&self, outcome: Outcome) {
        let mut results = self.lock();
        match outcome {
            Outcome::Parsed(calendar) => results.add_calendar(calendar),
            Outcome::Failed(err) => results.errors.push(Arc::new(err)),
        }
        results.in_flight = results.in_flight.saturating_sub(1);
        self.in_flight_tx.send_replace(results.in_flight);
    }
}

/// One submitted source that has not been recorded yet.
///
/// Dropping it unsettled, because the task panicked or was cancelled,
/// records a failure so the in-flight count still reaches zero.
struct Submission {
    shared: Arc<Shared>,
    source_id: String,
    settled: bool,
}

impl Submission {
    fn settle(mut self, outcome: Outcome) {
        self.settled = true;
        self.shared.finish(outcome);
    }
}

impl Drop for Submission {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        error!(source_id = %self.source_id, "Source task ended without a result");
        self.shared.finish(Outcome::Failed(
            SourceError::invalid_response("processing stopped before a result was recorded")
                .with_source_id(self.source_id.clone()),
        ));
    }
}

/// Fetches and parses calendar sources in parallel.
///
/// Cloning is cheap; clones share the same result set.
///
/// ```ignore
/// let pipeline = Pipeline::with_config(PipelineConfig::default())?;
/// pipeline.submit("calendars/team.ics");
/// pipeline.submit("https://example.com/holidays.ics");
/// pipeline.wait().await;
/// for calendar in pipeline.calendars()? {
///     println!("{} ({} events)", calendar.name, calendar.len());
/// }
/// ```
#[derive(Clone)]
pub struct Pipeline {
    shared: Arc<Shared>,
}

impl Pipeline {
    /// Creates a pipeline that reads through `source`.
    pub fn new(config: &PipelineConfig, source: Arc<dyn ContentSource>) -> Self {
        let (in_flight_tx, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                results: Mutex::new(ResultSet::default()),
                in_flight_tx,
                source,
                options: config.parse_options(),
            }),
        }
    }

    /// Creates a pipeline reading local paths from disk and `http(s)://`
    /// URLs over the network.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid or the HTTP client cannot be
    /// built.
    pub fn with_config(config: PipelineConfig) -> PipelineResult<Self> {
        config.validate()?;
        let http = HttpSource::new(config.http_source_config())?;
        Ok(Self::new(&config, Arc::new(AutoSource::new(http))))
    }

    /// Starts fetching and parsing `source_id` in the background.
    ///
    /// Never blocks. Outside a Tokio runtime the submission is recorded as
    /// an error right away instead of being run.
    pub fn submit(&self, source_id: impl Into<String>) {
        let source_id = source_id.into();

        let Ok(handle) = Handle::try_current() else {
            warn!(source_id = %source_id, "Submitted outside a Tokio runtime");
            self.shared.begin();
            self.shared.finish(Outcome::Failed(
                SourceError::configuration("no async runtime to fetch on")
                    .with_source_id(source_id),
            ));
            return;
        };

        let in_flight = self.shared.begin();
        debug!(source_id = %source_id, in_flight, "Submitted source");

        let submission = Submission {
            shared: Arc::clone(&self.shared),
            source_id,
            settled: false,
        };
        handle.spawn(async move {
            let shared = &submission.shared;
            let source_id = submission.source_id.as_str();
            let outcome = match shared.source.fetch(source_id).await {
                Ok(text) => Outcome::Parsed(parse_document(&text, source_id, &shared.options)),
                Err(err) => {
                    warn!(source_id = %source_id, error = %err, "Failed to fetch source");
                    Outcome::Failed(err)
                }
            };
            submission.settle(outcome);
        });
    }

    /// Parses an already retrieved document and records it immediately.
    pub fn load(&self, text: &str) {
        let calendar = parse_document(text, "", &self.shared.options);
        debug!(events = calendar.len(), "Loaded document");
        self.shared.lock().add_calendar(calendar);
    }

    /// Streams every event parsed from now on.
    ///
    /// Events arrive calendar by calendar, in completion order. The stream
    /// ends once the pipeline is [closed](Self::close); subscribing to a
    /// closed pipeline yields an already finished stream.
    pub fn subscribe(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut results = self.shared.lock();
        if !results.closed {
            results.subscribers.push(tx);
        }
        rx
    }

    /// Ends all event streams.
    ///
    /// Sources submitted afterwards are still collected, they are just no
    /// longer streamed.
    pub fn close(&self) {
        let mut results = self.shared.lock();
        results.closed = true;
        results.subscribers.clear();
    }

    /// Waits for every submitted source, then [closes](Self::close) the
    /// event streams.
    pub async fn wait_and_close(&self) {
        self.wait().await;
        self.close();
    }

    /// Returns true when no submitted source is still in flight.
    pub fn done(&self) -> bool {
        self.in_flight() == 0
    }

    /// Number of sources currently being fetched or parsed.
    pub fn in_flight(&self) -> usize {
        self.shared.lock().in_flight
    }

    /// Waits until every submitted source has finished.
    ///
    /// Afterwards [`done`](Self::done) is true until something new is
    /// submitted.
    pub async fn wait(&self) {
        let mut rx = self.shared.in_flight_tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail
        let _ = rx.wait_for(|in_flight| *in_flight == 0).await;

        let results = self.shared.lock();
        info!(
            calendars = results.calendars.len(),
            errors = results.errors.len(),
            "All sources finished"
        );
    }

    /// Parsed calendars, in completion order.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotReady`] while sources are in flight.
    pub fn calendars(&self) -> PipelineResult<Vec<Arc<Calendar>>> {
        let results = self.shared.lock();
        match results.in_flight {
            0 => Ok(results.calendars.clone()),
            in_flight => Err(PipelineError::NotReady { in_flight }),
        }
    }

    /// Retrieval failures, in completion order.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotReady`] while sources are in flight.
    pub fn errors(&self) -> PipelineResult<Vec<Arc<SourceError>>> {
        let results = self.shared.lock();
        match results.in_flight {
            0 => Ok(results.errors.clone()),
            in_flight => Err(PipelineError::NotReady { in_flight }),
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let results = self.shared.lock();
        f.debug_struct("Pipeline")
            .field("source", &self.shared.source.name())
            .field("in_flight", &results.in_flight)
            .field("calendars", &results.calendars.len())
            .field("errors", &results.errors.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use icalfeed_sources::{SourceErrorCode, StaticSource};

    const DOC: &str = "BEGIN:VCALENDAR\nVERSION:2.0\nX-WR-CALNAME:Static\n\
        BEGIN:VEVENT\nUID:a\nDTSTART:20250106T070000Z\nDTEND:20250106T080000Z\n\
        SUMMARY:Standup\nRRULE:FREQ=DAILY;COUNT=2\nEND:VEVENT\nEND:VCALENDAR\n";

    fn pipeline(config: &PipelineConfig) -> Pipeline {
        let source = StaticSource::new().with_document("static.ics", DOC);
        Pipeline::new(config, Arc::new(source))
    }

    #[test]
    fn empty_pipeline_is_done() {
        let pipeline = pipeline(&PipelineConfig::default());
        assert!(pipeline.done());
        assert!(pipeline.calendars().unwrap().is_empty());
        assert!(pipeline.errors().unwrap().is_empty());
    }

    #[test]
    fn load_is_visible_immediately() {
        let pipeline = pipeline(&PipelineConfig::default());
        pipeline.load(DOC);

        let calendars = pipeline.calendars().unwrap();
        assert_eq!(calendars.len(), 1);
        assert_eq!(calendars[0].name, "Static");
        assert_eq!(calendars[0].len(), 1);
    }

    #[test]
    fn load_honors_expansion() {
        let config = PipelineConfig::default().with_expand_recurrences(true);
        let pipeline = pipeline(&config);
        pipeline.load(DOC);
        assert_eq!(pipeline.calendars().unwrap()[0].len(), 3);
    }

    #[test]
    fn submit_without_runtime_records_error() {
        let pipeline = pipeline(&PipelineConfig::default());
        pipeline.submit("static.ics");

        assert!(pipeline.done());
        let errors = pipeline.errors().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code(), SourceErrorCode::Configuration);
        assert_eq!(errors[0].source_id(), Some("static.ics"));
    }

    #[tokio::test]
    async fn submit_then_wait() {
        let pipeline = pipeline(&PipelineConfig::default());
        pipeline.submit("static.ics");
        pipeline.submit("missing.ics");
        pipeline.wait().await;

        assert!(pipeline.done());
        assert_eq!(pipeline.calendars().unwrap()[0].url, "static.ics");
        assert_eq!(pipeline.errors().unwrap()[0].code(), SourceErrorCode::NotFound);
    }

    #[tokio::test]
    async fn wait_with_nothing_submitted_returns() {
        let pipeline = pipeline(&PipelineConfig::default());
        pipeline.wait().await;
        assert!(pipeline.done());
    }

    mod streaming {
        use super::*;

        #[test]
        fn load_streams_events() {
            let config = PipelineConfig::default().with_expand_recurrences(true);
            let pipeline = pipeline(&config);
            let mut events = pipeline.subscribe();
            pipeline.load(DOC);
            pipeline.close();

            let mut sequences = Vec::new();
            while let Ok(event) = events.try_recv() {
                assert_eq!(event.summary, "Standup");
                sequences.push(event.sequence);
            }
            assert_eq!(sequences, vec![0, 1, 2]);
        }

        #[tokio::test]
        async fn wait_and_close_ends_every_stream() {
            let pipeline = pipeline(&PipelineConfig::default());
            let mut first = pipeline.subscribe();
            let mut second = pipeline.subscribe();
            pipeline.submit("static.ics");
            pipeline.submit("missing.ics");
            pipeline.wait_and_close().await;

            for stream in [&mut first, &mut second] {
                let event = stream.recv().await.unwrap();
                assert_eq!(event.summary, "Standup");
                assert!(stream.recv().await.is_none());
            }
        }

        #[test]
        fn subscribing_after_close_is_finished() {
            let pipeline = pipeline(&PipelineConfig::default());
            pipeline.close();
            let mut events = pipeline.subscribe();
            pipeline.load(DOC);

            assert!(events.try_recv().is_err());
            assert_eq!(pipeline.calendars().unwrap().len(), 1);
        }

        #[test]
        fn dropped_streams_are_forgotten() {
            let pipeline = pipeline(&PipelineConfig::default());
            drop(pipeline.subscribe());
            pipeline.load(DOC);
            assert!(pipeline.shared.lock().subscribers.is_empty());
        }

        #[test]
        fn events_loaded_before_subscribing_are_not_replayed() {
            let pipeline = pipeline(&PipelineConfig::default());
            pipeline.load(DOC);
            let mut events = pipeline.subscribe();
            pipeline.close();
            assert!(events.try_recv().is_err());
        }
    }
}

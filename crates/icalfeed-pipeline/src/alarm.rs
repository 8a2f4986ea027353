//! Delayed callbacks for events.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use icalfeed_core::Event;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};

/// A callback scheduled to run with an event after a delay.
///
/// Dropping the alarm does not cancel it; use [`Alarm::cancel`].
#[derive(Debug)]
pub struct Alarm {
    event: Arc<Event>,
    delay: Duration,
    handle: JoinHandle<()>,
}

impl Alarm {
    /// Runs `callback` with `event` once `delay` has elapsed.
    ///
    /// # Errors
    ///
    /// Fails outside a Tokio runtime.
    pub fn set<F>(event: Arc<Event>, delay: Duration, callback: F) -> PipelineResult<Self>
    where
        F: FnOnce(&Event) + Send + 'static,
    {
        let handle = Handle::try_current()
            .map_err(|_| PipelineError::config("alarms need a Tokio runtime"))?;

        let fired = Arc::clone(&event);
        let handle = handle.spawn(async move {
            tokio::time::sleep(delay).await;
            debug!(id = %fired.id, summary = %fired.summary, "Alarm fired");
            callback(&fired);
        });
        debug!(id = %event.id, delay_ms = delay.as_millis() as u64, "Alarm set");

        Ok(Self {
            event,
            delay,
            handle,
        })
    }

    /// Runs `callback` `lead` before the event starts, measured from `now`.
    ///
    /// Fires right away when that moment has already passed.
    pub fn before_start<F>(
        event: Arc<Event>,
        lead: Duration,
        now: DateTime<Utc>,
        callback: F,
    ) -> PipelineResult<Self>
    where
        F: FnOnce(&Event) + Send + 'static,
    {
        let until_start = (event.start - now).to_std().unwrap_or_default();
        Self::set(event, until_start.saturating_sub(lead), callback)
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    /// Delay the alarm was set with.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Returns true once the callback has run or the alarm was cancelled.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stops the alarm if it has not fired yet.
    pub fn cancel(&self) {
        self.handle.abort();
    }
}

//! The query pipeline: enumerate, read, normalize, filter.

use chrono::{DateTime, Utc};
use meetlink_core::{CanonicalEvent, ConferenceConfig, normalize_text};
use tracing::{debug, warn};

use crate::error::ClientResult;
use crate::feedback::Feedback;
use crate::source::EventSource;

/// Runs queries against an event source.
#[derive(Debug)]
pub struct App<S> {
    source: S,
    config: ConferenceConfig,
}

impl<S: EventSource> App<S> {
    pub fn new(source: S, config: ConferenceConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &ConferenceConfig {
        &self.config
    }

    /// Events with a conference link whose start is within the configured
    /// threshold of `now`, in enumeration order.
    ///
    /// A record that cannot be found, read or normalized is logged and
    /// skipped. Only a failing enumeration is an error.
    pub fn current_events(&self, now: DateTime<Utc>) -> ClientResult<Vec<CanonicalEvent>> {
        let threshold = self.config.event_time_threshold();
        let mut events = Vec::new();

        for uid in self.source.event_uids()? {
            let Some(event) = self.load(&uid) else {
                continue;
            };
            if !event.has_conference() {
                debug!(uid = %uid, title = %event.title(), "skipping event without conference link");
                continue;
            }
            if !event.is_current_at(&now, threshold) {
                debug!(uid = %uid, start = %event.start(), "skipping event outside time window");
                continue;
            }
            events.push(event);
        }

        Ok(events)
    }

    /// Feedback for the events current at `now`.
    pub fn feedback(&self, now: DateTime<Utc>) -> ClientResult<Feedback> {
        let events = self.current_events(now)?;
        Ok(Feedback::from_events(&events, self.config.fallback_zone()))
    }

    fn load(&self, uid: &str) -> Option<CanonicalEvent> {
        let text = match self.source.read_record(uid) {
            Ok(text) => text,
            Err(err) => {
                warn!(uid = %uid, error = %err, "skipping unreadable event");
                return None;
            }
        };
        match normalize_text(&text, &self.config) {
            Ok(event) => Some(event),
            Err(err) => {
                warn!(uid = %uid, kind = %err.kind(), error = %err, "skipping invalid event");
                None
            }
        }
    }
}

//! Handles shared by the synchronizer, trackables and records.

use std::sync::Arc;

use redmine_api::RedmineClient;
use tokio::sync::Notify;

use crate::events::{EventSink, TrackerEvent};

#[derive(Clone)]
pub struct TrackerContext {
    client: Arc<RedmineClient>,
    events: Arc<dyn EventSink>,
    time_updated: Arc<Notify>,
}

impl TrackerContext {
    pub fn new(client: Arc<RedmineClient>, events: Arc<dyn EventSink>) -> Self {
        Self {
            client,
            events,
            time_updated: Arc::new(Notify::new()),
        }
    }

    pub fn client(&self) -> &RedmineClient {
        &self.client
    }

    pub fn emit(&self, event: TrackerEvent) {
        self.events.emit(event);
    }

    /// Signals that a record pushed new hours to Redmine, so today's totals are stale.
    pub(crate) fn notify_time_updated(&self) {
        self.time_updated.notify_one();
    }

    pub(crate) fn time_updated(&self) -> &Notify {
        &self.time_updated
    }
}

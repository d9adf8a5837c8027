//! Fixtures shared by the unit tests.

use std::sync::{Arc, Mutex, PoisonError};

use mockito::{Matcher, Mock, Server};
use redmine_api::{Activity, RedmineClient, RedmineConfig, DEFAULT_ISSUE_ID_WIDTH};

use crate::context::TrackerContext;
use crate::events::{EventSink, TrackerEvent};
use crate::trackable::{TrackableKind, TrackableSnapshot};

#[derive(Default)]
pub struct CollectingSink {
    events: Mutex<Vec<TrackerEvent>>,
}

impl CollectingSink {
    pub fn events(&self) -> Vec<TrackerEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, predicate: impl Fn(&TrackerEvent) -> bool) -> usize {
        self.events().iter().filter(|event| predicate(event)).count()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                TrackerEvent::Warning { message } => Some(message),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: TrackerEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

pub fn client_for(server: &Server) -> Arc<RedmineClient> {
    Arc::new(RedmineClient::new(RedmineConfig::new(server.url(), "secret")).expect("client builds"))
}

pub fn context_for(server: &Server) -> (TrackerContext, Arc<CollectingSink>) {
    let sink = Arc::new(CollectingSink::default());
    (TrackerContext::new(client_for(server), sink.clone()), sink)
}

/// Mocks that fail their assertion if any request reaches the server.
pub async fn forbid_network(server: &mut Server) -> Vec<Mock> {
    let mut mocks = Vec::new();
    for method in ["GET", "POST", "PUT", "DELETE"] {
        mocks.push(
            server
                .mock(method, Matcher::Any)
                .expect(0)
                .create_async()
                .await,
        );
    }
    mocks
}

pub fn dev_activities() -> Vec<Activity> {
    vec![Activity::new(10, "Dev"), Activity::new(11, "Design")]
}

pub fn issue_snapshot(id: u64, base_url: &str) -> TrackableSnapshot {
    TrackableSnapshot::derive(
        TrackableKind::Issue,
        id,
        "Fix bug",
        dev_activities(),
        base_url,
        DEFAULT_ISSUE_ID_WIDTH,
    )
}

pub fn project_snapshot(id: u64, base_url: &str) -> TrackableSnapshot {
    TrackableSnapshot::derive(
        TrackableKind::Project,
        id,
        "Core",
        dev_activities(),
        base_url,
        DEFAULT_ISSUE_ID_WIDTH,
    )
}

//! Issues and projects that time can be recorded against.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use futures::future::join_all;
use log::{debug, error, info, warn};
use redmine_api::{Activity, Issue, Project, TimeEntryOwner};
use serde::Serialize;

use crate::context::TrackerContext;
use crate::display::{issue_label, redact_log_details};
use crate::error::{Result, TrackerError};
use crate::events::TrackerEvent;
use crate::record::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackableKind {
    Issue,
    Project,
}

impl TrackableKind {
    /// URL path segment of the resource in the Redmine web UI.
    pub fn path_segment(self) -> &'static str {
        match self {
            TrackableKind::Issue => "issues",
            TrackableKind::Project => "projects",
        }
    }

    /// Which field a time entry created for this trackable is bound through.
    pub fn owner(self, id: u64) -> TimeEntryOwner {
        match self {
            TrackableKind::Issue => TimeEntryOwner::Issue(id),
            TrackableKind::Project => TimeEntryOwner::Project(id),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrackableKind::Issue => "issue",
            TrackableKind::Project => "project",
        }
    }
}

impl fmt::Display for TrackableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical remote state of a trackable, shared with each of its records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackableSnapshot {
    pub id: u64,
    pub kind: TrackableKind,
    pub subject: String,
    pub url: String,
    pub activities: Vec<Activity>,
    #[serde(skip)]
    pub id_width: usize,
}

impl TrackableSnapshot {
    pub fn derive(
        kind: TrackableKind,
        id: u64,
        subject: impl Into<String>,
        activities: Vec<Activity>,
        base_url: &str,
        id_width: usize,
    ) -> Self {
        Self {
            id,
            kind,
            subject: subject.into(),
            url: format!(
                "{}/{}/{}",
                base_url.trim_end_matches('/'),
                kind.path_segment(),
                id
            ),
            activities,
            id_width,
        }
    }

    /// Issues carry no activities of their own; they use their project's set.
    pub fn from_issue(issue: &Issue, activities: Vec<Activity>, base_url: &str, id_width: usize) -> Self {
        Self::derive(
            TrackableKind::Issue,
            issue.id,
            issue.subject.clone(),
            activities,
            base_url,
            id_width,
        )
    }

    pub fn from_project(project: &Project, base_url: &str, id_width: usize) -> Self {
        Self::derive(
            TrackableKind::Project,
            project.id,
            project.name.clone(),
            project.time_entry_activities.clone(),
            base_url,
            id_width,
        )
    }

    pub fn owner(&self) -> TimeEntryOwner {
        self.kind.owner(self.id)
    }

    pub fn activity_id(&self, name: &str) -> Option<u64> {
        self.activities
            .iter()
            .find(|activity| activity.name == name)
            .map(|activity| activity.id)
    }

    pub fn has_activity(&self, name: &str) -> bool {
        self.activity_id(name).is_some()
    }

    pub fn default_activity(&self) -> Option<&str> {
        self.activities.first().map(|activity| activity.name.as_str())
    }

    pub fn label(&self) -> String {
        match self.kind {
            TrackableKind::Issue => issue_label(self.id, self.id_width, &self.subject),
            TrackableKind::Project => self.subject.clone(),
        }
    }
}

/// Display-ready view of a trackable.
#[derive(Debug, Clone, Serialize)]
pub struct TrackableView {
    pub id: u64,
    pub kind: TrackableKind,
    pub label: String,
    pub subject: String,
    pub url: String,
    pub activities: Vec<String>,
    pub recording: bool,
    pub records: usize,
}

/// An issue or project together with the records timing it.
pub struct Trackable {
    ctx: TrackerContext,
    snapshot: RwLock<TrackableSnapshot>,
    records: Mutex<Vec<Arc<Record>>>,
    recording: AtomicBool,
}

impl Trackable {
    pub(crate) fn new(ctx: TrackerContext, snapshot: TrackableSnapshot) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            snapshot: RwLock::new(snapshot),
            records: Mutex::new(Vec::new()),
            recording: AtomicBool::new(false),
        })
    }

    pub fn snapshot(&self) -> TrackableSnapshot {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn id(&self) -> u64 {
        self.snapshot().id
    }

    pub fn kind(&self) -> TrackableKind {
        self.snapshot().kind
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Relaxed)
    }

    pub fn records(&self) -> Vec<Arc<Record>> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn view(&self) -> TrackableView {
        let snapshot = self.snapshot();
        TrackableView {
            id: snapshot.id,
            kind: snapshot.kind,
            label: snapshot.label(),
            subject: snapshot.subject.clone(),
            url: snapshot.url.clone(),
            activities: snapshot
                .activities
                .iter()
                .map(|activity| activity.name.clone())
                .collect(),
            recording: self.is_recording(),
            records: self.records().len(),
        }
    }

    /// Adopts a newer remote snapshot and hands it to every record, which flushes its running time.
    pub async fn refresh(&self, snapshot: TrackableSnapshot) {
        {
            let mut current = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
            *current = snapshot.clone();
        }

        let records = self.records();
        let results = join_all(
            records
                .iter()
                .map(|record| record.refresh(snapshot.clone())),
        )
        .await;
        for result in results {
            if let Err(err) = result {
                warn!("Failed to flush time for {} #{}", snapshot.kind, snapshot.id);
                debug!("Flush details: {}", redact_log_details(&err.to_string()));
                self.ctx.emit(TrackerEvent::error(err.to_string()));
            }
        }
    }

    /// Starts or stops every record. Starting a trackable without records creates one first.
    pub async fn toggle_recording(self: &Arc<Self>, state: bool) -> Result<()> {
        if state && self.records().is_empty() {
            self.new_record()?;
        }

        self.recording.store(state, Ordering::Relaxed);
        let snapshot = self.snapshot();
        info!(
            "{} {} #{} '{}'",
            if state { "recording" } else { "stop recording" },
            snapshot.kind,
            snapshot.id,
            snapshot.subject
        );
        self.ctx.emit(TrackerEvent::RecordStateChanged {
            kind: snapshot.kind,
            trackable_id: snapshot.id,
            recording: state,
        });

        let records = self.records();
        if state {
            join_all(records.iter().map(|record| record.start())).await;
            return Ok(());
        }

        let results = join_all(records.iter().map(|record| record.stop())).await;
        let mut first_error = None;
        for result in results {
            if let Err(err) = result {
                warn!("Failed to save time for {} #{}", snapshot.kind, snapshot.id);
                debug!("Save details: {}", redact_log_details(&err.to_string()));
                self.ctx.emit(TrackerEvent::error(err.to_string()));
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Adds an idle, unsaved record.
    pub fn new_record(self: &Arc<Self>) -> Result<Arc<Record>> {
        let record = Arc::new(Record::new(
            self.ctx.clone(),
            Arc::downgrade(self),
            self.snapshot(),
            None,
        )?);
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(record)
    }

    pub fn record_for_remote_id(&self, time_entry_id: u64) -> Option<Arc<Record>> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|record| record.time_entry_id() == Some(time_entry_id))
            .cloned()
    }

    /// Mirrors a remote time entry onto the record bound to it, creating that record when missing.
    pub async fn record_time_entry(
        self: &Arc<Self>,
        time_entry_id: u64,
        hours: f64,
        activity: &str,
    ) -> Result<Arc<Record>> {
        let record = {
            let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
            match records
                .iter()
                .find(|record| record.time_entry_id() == Some(time_entry_id))
            {
                Some(existing) => existing.clone(),
                None => {
                    let record = Arc::new(Record::new(
                        self.ctx.clone(),
                        Arc::downgrade(self),
                        self.snapshot(),
                        Some(time_entry_id),
                    )?);
                    records.push(record.clone());
                    record
                }
            }
        };
        record.set_time_activity(hours, activity).await;
        Ok(record)
    }

    /// Detaches a record. Fails when the record belongs to another trackable.
    ///
    /// The trackable stays recording while any remaining record still runs.
    pub async fn delete_record(&self, record: &Record) -> Result<()> {
        let snapshot = self.snapshot();
        let remaining = {
            let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(index) = records
                .iter()
                .position(|candidate| std::ptr::eq(candidate.as_ref(), record))
            else {
                let err = TrackerError::RecordNotFound {
                    kind: snapshot.kind,
                    id: snapshot.id,
                };
                error!("{}", err);
                self.ctx.emit(TrackerEvent::error(err.to_string()));
                return Err(err);
            };
            records.remove(index);
            records.clone()
        };
        debug!("Deleted record of {} #{}", snapshot.kind, snapshot.id);

        let still_running = join_all(remaining.iter().map(|record| record.is_recording()))
            .await
            .into_iter()
            .any(|running| running);
        if !still_running && self.recording.swap(false, Ordering::Relaxed) {
            self.ctx.emit(TrackerEvent::RecordStateChanged {
                kind: snapshot.kind,
                trackable_id: snapshot.id,
                recording: false,
            });
        }
        Ok(())
    }
}

//! Timer state machine bound to at most one Redmine time entry.

use std::sync::{OnceLock, Weak};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use redmine_api::{TimeEntryCreate, TimeEntryUpdate};
use regex::Regex;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::context::TrackerContext;
use crate::display::format_hours;
use crate::error::{Result, TrackerError};
use crate::events::TrackerEvent;
use crate::trackable::{Trackable, TrackableKind, TrackableSnapshot};

/// No time entry is created for less than five minutes.
pub const MINIMUM_TIME_TO_RECORD_HOURS: f64 = 5.0 / 60.0;
/// Elapsed time under six seconds is not worth a round-trip.
pub const MINIMUM_RECORD_INTERVAL_HOURS: f64 = 0.1 / 60.0;
pub const MAXIMUM_DAILY_HOURS: f64 = 24.0;
const HOURS_EPSILON: f64 = 0.0001;

static TIME_ENTRY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\d+(?:\.\d+)?)\s*(?::\s*(\d+(?:\.\d+)?)\s*)?$")
        .expect("invalid time entry regex")
});

/// Parses a manually entered `HH:MM` duration (`H` alone means whole hours) into hours.
pub fn parse_time_entry(text: &str) -> Result<f64> {
    let invalid = || TrackerError::InvalidTimeFormat {
        input: text.trim().to_string(),
    };
    let captures = TIME_ENTRY_REGEX.captures(text).ok_or_else(invalid)?;
    let hours = captures[1].parse::<f64>().map_err(|_| invalid())?;
    let minutes = match captures.get(2) {
        Some(value) => value.as_str().parse::<f64>().map_err(|_| invalid())?,
        None => 0.0,
    };
    Ok(hours + minutes / 60.0)
}

/// What a reconciliation did with the remote time entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reconciliation {
    /// Too little time for a new entry; nothing was sent and the time stays accumulated locally.
    BelowThreshold,
    Created { time_entry_id: u64 },
    Updated { hours: f64 },
    /// The entry was edited in Redmine since the last flush; its hours replaced the local delta.
    Conflict { remote_hours: f64 },
}

/// Display-ready state of a record.
#[derive(Debug, Clone, Serialize)]
pub struct RecordView {
    pub kind: TrackableKind,
    pub trackable_id: u64,
    pub subject: String,
    pub time_entry_id: Option<u64>,
    pub recording: bool,
    pub started: bool,
    pub hours: f64,
    pub time: String,
    pub activity: String,
    pub activities: Vec<String>,
}

struct RecordState {
    item: TrackableSnapshot,
    recording: bool,
    hours: f64,
    activity: String,
    started_at: Option<DateTime<Utc>>,
}

/// One timer on a trackable.
///
/// The state lock is held for the whole of a reconciliation, so flushes of the same
/// record never interleave. The remote id is written once, when the entry is created.
pub struct Record {
    ctx: TrackerContext,
    owner: Weak<Trackable>,
    time_entry_id: OnceLock<u64>,
    state: Mutex<RecordState>,
}

impl Record {
    pub(crate) fn new(
        ctx: TrackerContext,
        owner: Weak<Trackable>,
        item: TrackableSnapshot,
        time_entry_id: Option<u64>,
    ) -> Result<Self> {
        let activity = item
            .default_activity()
            .map(str::to_string)
            .ok_or(TrackerError::MissingActivities {
                kind: item.kind,
                id: item.id,
            })?;
        let remote_id = OnceLock::new();
        if let Some(id) = time_entry_id {
            let _ = remote_id.set(id);
        }
        Ok(Self {
            ctx,
            owner,
            time_entry_id: remote_id,
            state: Mutex::new(RecordState {
                item,
                recording: false,
                hours: 0.0,
                activity,
                started_at: None,
            }),
        })
    }

    pub fn time_entry_id(&self) -> Option<u64> {
        self.time_entry_id.get().copied()
    }

    pub async fn view(&self) -> RecordView {
        let state = self.state.lock().await;
        self.view_of(&state)
    }

    fn view_of(&self, state: &RecordState) -> RecordView {
        RecordView {
            kind: state.item.kind,
            trackable_id: state.item.id,
            subject: state.item.subject.clone(),
            time_entry_id: self.time_entry_id(),
            recording: state.recording,
            started: state.started_at.is_some(),
            hours: state.hours,
            time: format_hours(state.hours),
            activity: state.activity.clone(),
            activities: state
                .item
                .activities
                .iter()
                .map(|activity| activity.name.clone())
                .collect(),
        }
    }

    pub async fn is_recording(&self) -> bool {
        self.state.lock().await.recording
    }

    /// Starts the local clock. Returns false when already recording.
    pub async fn start(&self) -> bool {
        let mut state = self.state.lock().await;
        if state.recording {
            return false;
        }
        state.recording = true;
        state.started_at = Some(Utc::now());
        info!(
            "recording {} #{} '{}'",
            state.item.kind, state.item.id, state.item.subject
        );
        true
    }

    /// Stops the clock and pushes the elapsed time to Redmine.
    pub async fn stop(&self) -> Result<Option<Reconciliation>> {
        let mut state = self.state.lock().await;
        if !state.recording {
            return Ok(None);
        }
        let outcome = self.flush(&mut state).await;
        state.recording = false;
        state.started_at = None;
        info!(
            "stop recording {} #{} '{}'",
            state.item.kind, state.item.id, state.item.subject
        );
        outcome
    }

    /// Adopts the owner's new snapshot, then flushes time elapsed so far when recording.
    pub async fn refresh(&self, item: TrackableSnapshot) -> Result<Option<Reconciliation>> {
        let mut state = self.state.lock().await;
        if !item.has_activity(&state.activity) {
            if let Some(default) = item.default_activity() {
                state.activity = default.to_string();
            }
        }
        state.item = item;
        self.flush(&mut state).await
    }

    /// Overwrites the recorded hours with a manually entered `HH:MM` duration.
    pub async fn manual_time_entry(&self, text: &str) -> Result<Reconciliation> {
        let hours = match parse_time_entry(text) {
            Ok(hours) => hours,
            Err(err) => {
                self.ctx.emit(TrackerEvent::warning(err.to_string()));
                return Err(err);
            }
        };
        if hours > MAXIMUM_DAILY_HOURS {
            let err = TrackerError::ExceedsDailyMaximum { hours };
            warn!("{}", err);
            self.ctx.emit(TrackerEvent::warning(err.to_string()));
            return Err(err);
        }

        let mut state = self.state.lock().await;
        self.reconcile(&mut state, hours, 0.0, true).await
    }

    /// Switches the activity locally right away; a saved entry is then updated in Redmine.
    pub async fn change_activity(&self, name: &str) -> Result<()> {
        let (activity_id, kind, trackable_id) = {
            let mut state = self.state.lock().await;
            let Some(activity_id) = state.item.activity_id(name) else {
                return Err(TrackerError::UnknownActivity {
                    kind: state.item.kind,
                    id: state.item.id,
                    name: name.to_string(),
                });
            };
            state.activity = name.to_string();
            (activity_id, state.item.kind, state.item.id)
        };
        self.ctx.emit(TrackerEvent::ActivitySet {
            kind,
            trackable_id,
            activity: name.to_string(),
        });

        if let Some(time_entry_id) = self.time_entry_id() {
            let update = TimeEntryUpdate::activity(activity_id);
            if let Err(err) = self.ctx.client().update_time_entry(time_entry_id, &update).await {
                let err = TrackerError::from(err);
                warn!("Failed to change activity of time entry #{}", time_entry_id);
                self.ctx.emit(TrackerEvent::error(err.to_string()));
                return Err(err);
            }
            debug!("time entry #{} activity set to {}", time_entry_id, name);
        }
        Ok(())
    }

    /// Detaches from the owner and deletes the remote entry when there is one.
    pub async fn delete(&self) -> Result<()> {
        if let Some(owner) = self.owner.upgrade() {
            owner.delete_record(self).await?;
        }

        let (kind, trackable_id) = {
            let mut state = self.state.lock().await;
            state.recording = false;
            state.started_at = None;
            (state.item.kind, state.item.id)
        };

        let time_entry_id = self.time_entry_id();
        if let Some(id) = time_entry_id {
            self.ctx.client().delete_time_entry(id).await?;
            info!("time entry #{} deleted in redmine", id);
        }

        self.ctx.emit(TrackerEvent::RecordDeleted {
            kind,
            trackable_id,
            time_entry_id,
        });
        if time_entry_id.is_some() {
            self.ctx.notify_time_updated();
        }
        Ok(())
    }

    /// Mirrors hours and activity of the remote entry.
    pub(crate) async fn set_time_activity(&self, hours: f64, activity: &str) {
        let mut state = self.state.lock().await;
        state.hours = hours.max(0.0);
        state.activity = activity.to_string();
        self.ctx
            .emit(TrackerEvent::RecordTimeUpdated(self.view_of(&state)));
    }

    async fn flush(&self, state: &mut RecordState) -> Result<Option<Reconciliation>> {
        if !state.recording {
            return Ok(None);
        }
        let Some(started_at) = state.started_at else {
            return Ok(None);
        };

        let elapsed = elapsed_hours(started_at, Utc::now());
        if elapsed < MINIMUM_RECORD_INTERVAL_HOURS {
            debug!("elapsed {:.5}h is too low to be recorded", elapsed);
            return Ok(None);
        }

        let offset = state.hours;
        self.reconcile(state, elapsed, offset, false).await.map(Some)
    }

    async fn reconcile(
        &self,
        state: &mut RecordState,
        hours: f64,
        offset: f64,
        force: bool,
    ) -> Result<Reconciliation> {
        let total = (hours + offset).max(0.0);

        let outcome = match self.time_entry_id() {
            None => {
                if total < MINIMUM_TIME_TO_RECORD_HOURS {
                    debug!(
                        "{:.4}h on {} #{} is not enough for a time entry yet",
                        total, state.item.kind, state.item.id
                    );
                    // Kept locally until enough accumulates for a create.
                    state.hours = total;
                    restart_clock(state);
                    return Ok(Reconciliation::BelowThreshold);
                }
                let activity_id = activity_id_of(state)?;
                let request = TimeEntryCreate::new(state.item.owner(), total, activity_id);
                let entry = self.ctx.client().create_time_entry(&request).await?;
                let _ = self.time_entry_id.set(entry.id);
                info!(
                    "time entry #{} created in redmine for {} #{}: {:.4}h",
                    entry.id, state.item.kind, state.item.id, total
                );
                Reconciliation::Created {
                    time_entry_id: entry.id,
                }
            }
            Some(time_entry_id) => {
                if !force {
                    let remote = self.ctx.client().get_time_entry(time_entry_id).await?;
                    if (remote.hours - state.hours).abs() > HOURS_EPSILON {
                        let conflict = TrackerError::RemoteConflict {
                            time_entry_id,
                            local: state.hours,
                            remote: remote.hours,
                        };
                        warn!("{}", conflict);
                        self.ctx.emit(TrackerEvent::warning(conflict.to_string()));
                        state.hours = remote.hours.max(0.0);
                        restart_clock(state);
                        self.ctx
                            .emit(TrackerEvent::RecordTimeUpdated(self.view_of(state)));
                        return Ok(Reconciliation::Conflict {
                            remote_hours: remote.hours,
                        });
                    }
                }
                self.ctx
                    .client()
                    .update_time_entry(time_entry_id, &TimeEntryUpdate::hours(total))
                    .await?;
                info!(
                    "time entry #{} updated in redmine: {:.4}h",
                    time_entry_id, total
                );
                Reconciliation::Updated { hours: total }
            }
        };

        state.hours = total;
        restart_clock(state);
        self.ctx
            .emit(TrackerEvent::RecordTimeUpdated(self.view_of(state)));
        self.ctx.notify_time_updated();
        Ok(outcome)
    }

    #[cfg(test)]
    pub(crate) async fn backdate(&self, by: chrono::Duration) {
        let mut state = self.state.lock().await;
        if let Some(started_at) = state.started_at {
            state.started_at = Some(started_at - by);
        }
    }
}

fn activity_id_of(state: &RecordState) -> Result<u64> {
    state
        .item
        .activity_id(&state.activity)
        .ok_or_else(|| TrackerError::UnknownActivity {
            kind: state.item.kind,
            id: state.item.id,
            name: state.activity.clone(),
        })
}

/// A running clock restarts from the point just flushed.
fn restart_clock(state: &mut RecordState) {
    if state.recording {
        state.started_at = Some(Utc::now());
    }
}

fn elapsed_hours(started_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - started_at).num_milliseconds().max(0) as f64 / 3_600_000.0
}

//! Error model of the time tracking core.

use redmine_api::RedmineError;
use thiserror::Error;

use crate::trackable::TrackableKind;

pub type Result<T> = std::result::Result<T, TrackerError>;

/// Failures of tracking operations. None of them is fatal: remote failures are reported,
/// validation failures reject the user action without side effects.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("redmine request failed: {0}")]
    Remote(#[from] RedmineError),
    #[error("{input} is not a valid time, it should be in the form HH:MM")]
    InvalidTimeFormat { input: String },
    #[error("not recording {hours:.2}h: it is more than a day")]
    ExceedsDailyMaximum { hours: f64 },
    #[error("record not found on {kind} #{id}")]
    RecordNotFound { kind: TrackableKind, id: u64 },
    #[error("time entry #{time_entry_id} holds {remote:.2}h in Redmine but {local:.2}h were recorded, local time discarded")]
    RemoteConflict {
        time_entry_id: u64,
        local: f64,
        remote: f64,
    },
    #[error("activity '{name}' is not allowed on {kind} #{id}")]
    UnknownActivity {
        kind: TrackableKind,
        id: u64,
        name: String,
    },
    #[error("{kind} #{id} has no time entry activities")]
    MissingActivities { kind: TrackableKind, id: u64 },
    #[error("not connected to redmine")]
    NotConnected,
    #[error("secrets error: {0}")]
    Secrets(String),
    #[error("config error: {0}")]
    Config(#[from] std::io::Error),
}

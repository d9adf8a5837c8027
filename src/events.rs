//! Outbound notifications from the tracking core to whatever view is attached.

use log::{error, info, warn};
use serde::Serialize;

use crate::display::format_hours;
use crate::record::RecordView;
use crate::trackable::{TrackableKind, TrackableView};

/// Events emitted by the core. Serialized as `{"event": "...", "payload": ...}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum TrackerEvent {
    TrackableAdded(TrackableView),
    TimeTotalsUpdated {
        hours: f64,
        formatted: String,
    },
    RecordStateChanged {
        kind: TrackableKind,
        trackable_id: u64,
        recording: bool,
    },
    ActivitySet {
        kind: TrackableKind,
        trackable_id: u64,
        activity: String,
    },
    RecordTimeUpdated(RecordView),
    RecordDeleted {
        kind: TrackableKind,
        trackable_id: u64,
        time_entry_id: Option<u64>,
    },
    Warning {
        message: String,
    },
    Error {
        message: String,
    },
}

impl TrackerEvent {
    pub fn totals(hours: f64) -> Self {
        TrackerEvent::TimeTotalsUpdated {
            hours,
            formatted: format_hours(hours),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        TrackerEvent::Warning {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        TrackerEvent::Error {
            message: message.into(),
        }
    }
}

/// Receiver of core events; implemented by the panel/view layer.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: TrackerEvent);
}

/// Sink used by the headless runtime: every event goes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: TrackerEvent) {
        match &event {
            TrackerEvent::Warning { message } => warn!("{}", message),
            TrackerEvent::Error { message } => error!("{}", message),
            TrackerEvent::TimeTotalsUpdated { formatted, .. } => {
                info!("Recorded today: {}", formatted)
            }
            other => match serde_json::to_string(other) {
                Ok(payload) => info!("{}", payload),
                Err(err) => warn!("Failed to serialize event: {}", err),
            },
        }
    }
}

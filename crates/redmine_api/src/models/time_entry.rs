//! Time entry models and request payloads for `/time_entries` endpoints.

use serde::{Deserialize, Serialize};

use crate::models::NamedRef;

/// Represents a persisted time entry: hours spent on a day, classified by an activity, bound to an issue or a project.
#[derive(Debug, Deserialize, Clone)]
pub struct TimeEntry {
    pub id: u64,
    pub project: NamedRef,
    #[serde(default)]
    pub issue: Option<NamedRef>,
    #[serde(default)]
    pub user: Option<NamedRef>,
    pub activity: NamedRef,
    pub hours: f64,
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default)]
    pub spent_on: Option<String>,
}

impl TimeEntry {
    /// Issue when the entry is logged on an issue, otherwise its project.
    pub fn owner(&self) -> TimeEntryOwner {
        match &self.issue {
            Some(issue) => TimeEntryOwner::Issue(issue.id),
            None => TimeEntryOwner::Project(self.project.id),
        }
    }
}

/// What a time entry is logged against. Redmine accepts exactly one of `issue_id`/`project_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeEntryOwner {
    Issue(u64),
    Project(u64),
}

/// Input for creating a time entry. `spent_on` defaults to today's local date.
#[derive(Debug, Clone)]
pub struct TimeEntryCreate {
    pub owner: TimeEntryOwner,
    pub hours: f64,
    pub activity_id: u64,
    pub spent_on: Option<String>,
    pub comments: Option<String>,
}

impl TimeEntryCreate {
    pub fn new(owner: TimeEntryOwner, hours: f64, activity_id: u64) -> Self {
        Self {
            owner,
            hours,
            activity_id,
            spent_on: None,
            comments: None,
        }
    }
}

/// Partial update body; only supplied fields are sent.
#[derive(Debug, Serialize, Clone, Default, PartialEq)]
pub struct TimeEntryUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hours: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

impl TimeEntryUpdate {
    pub fn hours(hours: f64) -> Self {
        Self {
            hours: Some(hours),
            ..Self::default()
        }
    }

    pub fn activity(activity_id: u64) -> Self {
        Self {
            activity_id: Some(activity_id),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_prefers_issue_over_project() {
        let entry: TimeEntry = serde_json::from_str(
            r#"{"id":5,"project":{"id":1,"name":"Core"},"issue":{"id":42},
                "activity":{"id":10,"name":"Dev"},"hours":1.25,"spent_on":"2024-03-01"}"#,
        )
        .expect("valid time entry");
        assert_eq!(entry.owner(), TimeEntryOwner::Issue(42));

        let project_entry: TimeEntry = serde_json::from_str(
            r#"{"id":6,"project":{"id":1},"activity":{"id":10,"name":"Dev"},"hours":0.5}"#,
        )
        .expect("valid time entry");
        assert_eq!(project_entry.owner(), TimeEntryOwner::Project(1));
    }

    #[test]
    fn update_serializes_only_supplied_fields() {
        let body = serde_json::to_value(TimeEntryUpdate::activity(9)).expect("serializable");
        assert_eq!(body, serde_json::json!({"activity_id": 9}));
    }
}

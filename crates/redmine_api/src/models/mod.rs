mod account;
mod issue;
mod named_ref;
mod project;
mod time_entry;

pub use account::Account;
pub use issue::Issue;
pub use named_ref::{Activity, NamedRef};
pub use project::Project;
pub use time_entry::{TimeEntry, TimeEntryCreate, TimeEntryOwner, TimeEntryUpdate};

use serde::Deserialize;

// Redmine wraps every payload in a single-key envelope (`{"issue": {...}}`, `{"issues": [...]}`).

#[derive(Debug, Deserialize)]
pub(crate) struct AccountEnvelope {
    pub user: Account,
}

#[derive(Debug, Deserialize)]
pub(crate) struct IssueEnvelope {
    pub issue: Issue,
}

#[derive(Debug, Deserialize)]
pub(crate) struct IssueList {
    #[serde(default)]
    pub issues: Vec<Issue>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProjectEnvelope {
    pub project: Project,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProjectList {
    #[serde(default)]
    pub projects: Vec<Project>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TimeEntryEnvelope {
    pub time_entry: TimeEntry,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TimeEntryList {
    #[serde(default)]
    pub time_entries: Vec<TimeEntry>,
    #[serde(default)]
    pub total_count: Option<u64>,
}

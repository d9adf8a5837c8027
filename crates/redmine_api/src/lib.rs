//! Typed Redmine REST API client crate used by the time tracker core.

pub mod client;
pub mod config;
pub mod error;
pub mod models;

pub use client::{current_date, IssueQuery, RedmineClient, DEFAULT_ISSUE_ID_WIDTH};
pub use config::RedmineConfig;
pub use error::{RedmineError, Result};
pub use models::{
    Account, Activity, Issue, NamedRef, Project, TimeEntry, TimeEntryCreate, TimeEntryOwner,
    TimeEntryUpdate,
};

use serde::Deserialize;

use crate::models::Activity;

#[derive(Debug, Deserialize, Clone)]
pub struct Project {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub identifier: Option<String>,
    /// Present only when requested with `include=time_entry_activities`.
    #[serde(default)]
    pub time_entry_activities: Vec<Activity>,
}

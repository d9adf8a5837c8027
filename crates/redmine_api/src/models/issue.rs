use serde::Deserialize;

use crate::models::NamedRef;

#[derive(Debug, Deserialize, Clone)]
pub struct Issue {
    pub id: u64,
    pub project: NamedRef,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub status: Option<NamedRef>,
    #[serde(default)]
    pub assigned_to: Option<NamedRef>,
    #[serde(default)]
    pub updated_on: Option<String>,
}

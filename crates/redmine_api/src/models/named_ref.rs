use serde::{Deserialize, Serialize};

/// `{id, name}` reference embedded in Redmine payloads (project, issue, user, activity).
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct NamedRef {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
}

/// Time entry activity classification allowed on a project.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Activity {
    pub id: u64,
    pub name: String,
}

impl Activity {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

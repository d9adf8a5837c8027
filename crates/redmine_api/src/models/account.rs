//! Account model returned by `/my/account`.

use serde::Deserialize;

/// Authenticated user as returned by Redmine, including id, login and display names.
#[derive(Debug, Deserialize, Clone)]
pub struct Account {
    pub id: u64,
    pub login: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub mail: Option<String>,
}

impl Account {
    /// Returns "first last", falling back to the login.
    pub fn display_name(&self) -> String {
        let full = [self.firstname.as_deref(), self.lastname.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if full.is_empty() {
            self.login.clone().unwrap_or_else(|| format!("user #{}", self.id))
        } else {
            full
        }
    }
}

//! Error model used by Redmine API client operations.

use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RedmineError>;

/// Failure of a single Redmine request: a non-success status carrying the raw response body, or a transport/decoding problem.
#[derive(Debug, Error)]
pub enum RedmineError {
    #[error("http {status}: {body}")]
    Http { status: StatusCode, body: String },
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("unexpected error: {0}")]
    Other(String),
}

impl RedmineError {
    /// Constructs an HTTP error variant from a status and the raw body.
    pub fn http(status: StatusCode, body: impl Into<String>) -> Self {
        RedmineError::Http {
            status,
            body: body.into(),
        }
    }

    /// Returns the HTTP status for remote failures.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            RedmineError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }
}

impl From<reqwest::Error> for RedmineError {
    fn from(err: reqwest::Error) -> Self {
        let message = err.to_string();
        match err.status() {
            Some(status) => RedmineError::Http {
                status,
                body: message,
            },
            None if err.is_timeout() => RedmineError::Timeout(message),
            None if err.is_connect() || err.is_request() => RedmineError::Network(message),
            None if err.is_decode() || err.is_body() => RedmineError::Serialization(message),
            None => RedmineError::Other(message),
        }
    }
}

impl From<serde_json::Error> for RedmineError {
    fn from(err: serde_json::Error) -> Self {
        RedmineError::Serialization(err.to_string())
    }
}

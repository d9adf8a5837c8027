use keyring::{Entry, Error as KeyringError};
use std::env;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{Result, TrackerError};

const KEYRING_SERVICE: &str = "org.redmine-tracker";
const KEYRING_ACCOUNT: &str = "api-key";
pub const API_KEY_ENV: &str = "REDMINE_API_KEY";

/// Redmine API key storage backed by the OS keyring.
#[derive(Clone)]
pub struct SecretsManager {
    inner: Arc<SecretsInner>,
}

struct SecretsInner {
    keyring_service: String,
    key_cache: Mutex<Option<String>>,
    env_override: Option<String>,
}

impl SecretsManager {
    /// `REDMINE_API_KEY` takes precedence over the stored key when set.
    pub fn initialize() -> Self {
        let env_override = env::var(API_KEY_ENV)
            .ok()
            .and_then(|value| normalize_api_key(&value));
        Self::with_service(KEYRING_SERVICE, env_override)
    }

    pub(crate) fn with_service(service: &str, env_override: Option<String>) -> Self {
        SecretsManager {
            inner: Arc::new(SecretsInner {
                keyring_service: service.to_string(),
                key_cache: Mutex::new(None),
                env_override,
            }),
        }
    }

    pub fn has_env_override(&self) -> bool {
        self.inner.env_override.is_some()
    }

    pub fn get_api_key(&self) -> Result<Option<String>> {
        if let Some(key) = &self.inner.env_override {
            return Ok(Some(key.clone()));
        }
        {
            let cache = self.cache();
            if cache.is_some() {
                return Ok(cache.clone());
            }
        }

        let key = self.load_key_from_store()?;
        *self.cache() = key.clone();
        Ok(key)
    }

    /// Drops the cached key and reads it again, picking up keys stored by another process.
    pub fn reload_api_key(&self) -> Result<Option<String>> {
        *self.cache() = None;
        self.get_api_key()
    }

    pub fn save_api_key(&self, key: &str) -> Result<()> {
        let key = normalize_api_key(key)
            .ok_or_else(|| TrackerError::Secrets("API key must not be empty".into()))?;
        self.persist_key(Some(&key))?;
        *self.cache() = Some(key);
        Ok(())
    }

    pub fn clear_api_key(&self) -> Result<()> {
        self.persist_key(None)?;
        *self.cache() = None;
        Ok(())
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.inner
            .key_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn load_key_from_store(&self) -> Result<Option<String>> {
        let entry = self.key_entry()?;
        match entry.get_password() {
            Ok(secret) => Ok(normalize_api_key(&secret)),
            Err(KeyringError::NoEntry) => Ok(None),
            Err(err) => Err(TrackerError::Secrets(format!(
                "Failed to read API key from keyring: {err}"
            ))),
        }
    }

    fn persist_key(&self, key: Option<&str>) -> Result<()> {
        let entry = self.key_entry()?;
        match key {
            Some(value) => entry.set_password(value).map_err(|err| {
                TrackerError::Secrets(format!("Failed to store API key in keyring: {err}"))
            }),
            None => match entry.delete_credential() {
                Ok(()) | Err(KeyringError::NoEntry) => Ok(()),
                Err(err) => Err(TrackerError::Secrets(format!(
                    "Failed to delete API key from keyring: {err}"
                ))),
            },
        }
    }

    fn key_entry(&self) -> Result<Entry> {
        Entry::new(&self.inner.keyring_service, KEYRING_ACCOUNT)
            .map_err(|err| TrackerError::Secrets(format!("Failed to open keyring entry: {err}")))
    }
}

/// Trims the key; blank keys count as absent.
fn normalize_api_key(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

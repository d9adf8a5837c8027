//! Persistent tracker configuration model and file-backed manager.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use redmine_api::RedmineConfig;

fn default_redmine_url() -> String {
    redmine_api::config::DEFAULT_BASE_URL.to_string()
}

/// Application settings persisted on disk. The API key is kept in the keyring, never here.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    #[serde(default = "default_redmine_url")]
    pub redmine_url: String,
    pub refresh_interval_minutes: u32,
    pub issue_batch_size: u32,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redmine_url: default_redmine_url(),
            refresh_interval_minutes: 5,
            issue_batch_size: 10,
            request_timeout_secs: 30,
        }
    }
}

impl Config {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.refresh_interval_minutes.max(1)) * 60)
    }

    /// Client settings for this config and the given API key.
    pub fn redmine_config(&self, api_key: &str) -> RedmineConfig {
        RedmineConfig::new(self.redmine_url.clone(), api_key)
            .with_timeout(Duration::from_secs(self.request_timeout_secs.max(1)))
    }
}

/// Replaces zero or blank values that would stall the tracker with their defaults.
pub fn normalize_config(mut config: Config) -> Config {
    let defaults = Config::default();
    config.redmine_url = config.redmine_url.trim().to_string();
    if config.redmine_url.is_empty() {
        config.redmine_url = defaults.redmine_url;
    }
    if config.refresh_interval_minutes == 0 {
        config.refresh_interval_minutes = defaults.refresh_interval_minutes;
    }
    if config.issue_batch_size == 0 {
        config.issue_batch_size = defaults.issue_batch_size;
    }
    if config.request_timeout_secs == 0 {
        config.request_timeout_secs = defaults.request_timeout_secs;
    }
    config
}

/// Loads and saves [`Config`] as JSON in the platform-specific config directory.
pub struct ConfigManager {
    path: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self, io::Error> {
        let dirs = directories::ProjectDirs::from("org", "redmine", "redmine-tracker").ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "could not determine config directory")
        })?;
        Ok(Self {
            path: dirs.config_dir().join("config.json"),
        })
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Loads config from disk, falling back to defaults on read/parse errors.
    pub fn load(&self) -> Config {
        let config = if self.path.exists() {
            let content = fs::read_to_string(&self.path).unwrap_or_default();
            serde_json::from_str(&content).unwrap_or_default()
        } else {
            Config::default()
        };
        normalize_config(config)
    }

    /// Persists config to disk, creating parent directories when needed.
    pub fn save(&self, config: &Config) -> Result<(), io::Error> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(config)?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{normalize_config, Config, ConfigManager};
    use std::env;
    use std::fs;
    use std::path::PathBuf;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    fn unique_path(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before unix epoch")
            .as_nanos();
        env::temp_dir().join(format!("redmine-tracker-tests-{name}-{nanos}/config.json"))
    }

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(config.redmine_url, "http://localhost:3000");
        assert_eq!(config.refresh_interval_minutes, 5);
        assert_eq!(config.issue_batch_size, 10);
        assert_eq!(config.refresh_interval(), Duration::from_secs(300));
    }

    #[test]
    fn load_missing_file_returns_default() {
        let manager = ConfigManager {
            path: unique_path("missing"),
        };
        assert_eq!(manager.load(), Config::default());
    }

    #[test]
    fn save_and_load_round_trip() {
        let path = unique_path("roundtrip");
        let parent = path.parent().map(ToOwned::to_owned);

        let manager = ConfigManager { path: path.clone() };
        let config = Config {
            redmine_url: "https://redmine.example.org".to_string(),
            refresh_interval_minutes: 2,
            issue_batch_size: 25,
            request_timeout_secs: 10,
        };

        manager.save(&config).expect("save should succeed");
        assert_eq!(manager.load(), config);

        if let Some(parent) = parent {
            let _ = fs::remove_dir_all(parent);
        }
    }

    #[test]
    fn load_invalid_json_falls_back_to_default() {
        let path = unique_path("invalid");
        let parent = path.parent().expect("parent must exist");
        fs::create_dir_all(parent).expect("create temp directory");
        fs::write(&path, "not-valid-json").expect("write invalid config");

        let manager = ConfigManager { path: path.clone() };
        assert_eq!(manager.load(), Config::default());

        let _ = fs::remove_dir_all(parent);
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let path = unique_path("partial");
        let parent = path.parent().expect("parent must exist");
        fs::create_dir_all(parent).expect("create temp directory");
        fs::write(&path, r#"{"redmine_url": " https://r.test ", "issue_batch_size": 0}"#)
            .expect("write partial config");

        let loaded = ConfigManager { path: path.clone() }.load();
        assert_eq!(loaded.redmine_url, "https://r.test");
        assert_eq!(loaded.issue_batch_size, 10);
        assert_eq!(loaded.refresh_interval_minutes, 5);

        let _ = fs::remove_dir_all(parent);
    }

    #[test]
    fn normalize_replaces_zero_values() {
        let normalized = normalize_config(Config {
            redmine_url: "  ".to_string(),
            refresh_interval_minutes: 0,
            issue_batch_size: 0,
            request_timeout_secs: 0,
        });
        assert_eq!(normalized, Config::default());
    }

    #[test]
    fn redmine_config_carries_url_key_and_timeout() {
        let config = Config {
            redmine_url: "https://r.test/".to_string(),
            request_timeout_secs: 12,
            ..Config::default()
        };
        let client = config.redmine_config("key");
        assert_eq!(client.root(), "https://r.test");
        assert_eq!(client.api_key, "key");
        assert_eq!(client.timeout, Duration::from_secs(12));
    }
}

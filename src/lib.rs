//! Headless Redmine time tracker: records time against issues and projects and keeps
//! it reconciled with Redmine time entries.

pub mod config;
pub mod console;
pub mod context;
pub mod display;
pub mod error;
pub mod events;
pub mod record;
pub mod secrets;
pub mod synchronizer;
pub mod trackable;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use log::{debug, error, info, warn};
use redmine_api::{RedmineClient, RedmineConfig};
use tokio::task;

pub use config::{normalize_config, Config, ConfigManager};
pub use console::{Command, Console};
pub use context::TrackerContext;
pub use error::{Result, TrackerError};
pub use events::{EventSink, LogSink, TrackerEvent};
pub use record::{Reconciliation, Record, RecordView};
pub use secrets::SecretsManager;
pub use synchronizer::Synchronizer;
pub use trackable::{Trackable, TrackableKind, TrackableSnapshot, TrackableView};

const CONFIG_POLL_INTERVAL: Duration = Duration::from_secs(60);

pub fn run() {
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .format_timestamp_millis()
    .try_init();

    info!("Starting Redmine tracker");

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("Failed to start async runtime: {}", err);
            return;
        }
    };

    if let Err(err) = runtime.block_on(start()) {
        error!("Tracker stopped: {}", err);
    }
}

async fn start() -> Result<()> {
    let config_manager = Arc::new(ConfigManager::new()?);
    let config = config_manager.load();
    debug!("Config loaded from {}", config_manager.path().display());

    let secrets = SecretsManager::initialize();
    let api_key = load_api_key(&secrets, false).await;
    let redmine_config = config.redmine_config(&api_key);
    let client = Arc::new(RedmineClient::new(redmine_config.clone())?);

    let ctx = TrackerContext::new(client, Arc::new(LogSink));
    let sync = Arc::new(Synchronizer::with_issue_batch(ctx, config.issue_batch_size));

    let background = sync.clone();
    let refresh_interval = config.refresh_interval();
    tokio::spawn(async move { background.run(refresh_interval).await });

    tokio::spawn(watch_config(
        sync.clone(),
        config_manager.clone(),
        secrets.clone(),
        redmine_config,
    ));

    let console = Console::new(sync.clone(), secrets, config_manager);
    console::run_console(&console).await;

    info!("Stopping, saving running records");
    stop_all(&sync).await;
    Ok(())
}

/// Reads the API key off the async thread. A missing key leaves the client unauthenticated.
async fn load_api_key(secrets: &SecretsManager, reload: bool) -> String {
    let manager = secrets.clone();
    let loaded = task::spawn_blocking(move || {
        if reload {
            manager.reload_api_key()
        } else {
            manager.get_api_key()
        }
    })
    .await;

    match loaded {
        Ok(Ok(Some(key))) => key,
        Ok(Ok(None)) => {
            if !reload {
                warn!(
                    "No Redmine API key; set {} or store one with `key <api key>`",
                    secrets::API_KEY_ENV
                );
            }
            String::new()
        }
        Ok(Err(err)) => {
            warn!("Failed to load API key");
            debug!("API key load details: {}", display::redact_log_details(&err.to_string()));
            String::new()
        }
        Err(err) => {
            warn!("Failed to join keyring task: {}", err);
            String::new()
        }
    }
}

/// Reconnects whenever the stored URL or API key changes.
async fn watch_config(
    sync: Arc<Synchronizer>,
    manager: Arc<ConfigManager>,
    secrets: SecretsManager,
    mut current: RedmineConfig,
) {
    let mut ticker = tokio::time::interval(CONFIG_POLL_INTERVAL);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let config = manager.load();
        let api_key = load_api_key(&secrets, true).await;
        let next = config.redmine_config(&api_key);
        if next == current {
            continue;
        }

        info!("Redmine settings changed, reconnecting to {}", next.root());
        current = next.clone();
        if let Err(err) = sync.reconfigure(next).await {
            warn!("Failed to reconnect with new settings");
            debug!("Reconnect details: {}", display::redact_log_details(&err.to_string()));
        }
    }
}

/// Flushes every recording trackable before exit.
async fn stop_all(sync: &Synchronizer) {
    let recording: Vec<Arc<Trackable>> = sync
        .issues()
        .into_iter()
        .chain(sync.projects())
        .filter(|trackable| trackable.is_recording())
        .collect();
    for result in join_all(recording.iter().map(|trackable| trackable.toggle_recording(false))).await {
        if let Err(err) = result {
            debug!("Stop details: {}", display::redact_log_details(&err.to_string()));
        }
    }
}

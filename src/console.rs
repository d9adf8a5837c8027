//! Line-oriented front end mapping typed commands onto tracker operations.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::task;

use crate::config::ConfigManager;
use crate::display::{format_hours, redact_log_details};
use crate::record::Record;
use crate::secrets::SecretsManager;
use crate::synchronizer::Synchronizer;
use crate::trackable::{Trackable, TrackableKind};

pub const HELP: &str = "\
commands:
  refresh                                  refresh from Redmine now
  more                                     load more assigned issues
  add <issue id>                           track an issue by id
  toggle issue|project <id> on|off         start or stop recording
  new issue|project <id>                   add another record
  time issue|project <id> <n> <HH:MM>      set the time of record n
  activity issue|project <id> <n> <name>   set the activity of record n
  delete issue|project <id> <n>            delete record n
  list                                     show tracked issues and projects
  url <redmine url>                        change the Redmine server
  key <api key>                            store the API key in the keyring
  logout                                   remove the stored API key
  quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Refresh,
    LoadMore,
    AddIssue(u64),
    Toggle {
        kind: TrackableKind,
        id: u64,
        on: bool,
    },
    NewRecord {
        kind: TrackableKind,
        id: u64,
    },
    SetTime {
        kind: TrackableKind,
        id: u64,
        record: usize,
        time: String,
    },
    SetActivity {
        kind: TrackableKind,
        id: u64,
        record: usize,
        activity: String,
    },
    Delete {
        kind: TrackableKind,
        id: u64,
        record: usize,
    },
    List,
    SetUrl(String),
    SetApiKey(String),
    Logout,
    Help,
    Quit,
}

/// Parses one input line. Record numbers are 1-based, as shown by `list`.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let Some(name) = words.next() else {
        return Err("empty command".into());
    };

    let command = match name {
        "refresh" => Command::Refresh,
        "more" => Command::LoadMore,
        "list" | "ls" => Command::List,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        "add" => Command::AddIssue(parse_id(words.next())?),
        "url" => Command::SetUrl(words.next().ok_or("expected a URL")?.to_string()),
        "key" => Command::SetApiKey(words.next().ok_or("expected an API key")?.to_string()),
        "logout" => Command::Logout,
        "toggle" => {
            let (kind, id) = parse_target(&mut words)?;
            let on = match words.next() {
                Some("on") => true,
                Some("off") => false,
                _ => return Err("expected on or off".into()),
            };
            Command::Toggle { kind, id, on }
        }
        "new" => {
            let (kind, id) = parse_target(&mut words)?;
            Command::NewRecord { kind, id }
        }
        "time" => {
            let (kind, id) = parse_target(&mut words)?;
            let record = parse_record_number(words.next())?;
            let time = words.next().ok_or("expected a time as HH:MM")?.to_string();
            Command::SetTime {
                kind,
                id,
                record,
                time,
            }
        }
        "activity" => {
            let (kind, id) = parse_target(&mut words)?;
            let record = parse_record_number(words.next())?;
            let activity = words.by_ref().collect::<Vec<_>>().join(" ");
            if activity.is_empty() {
                return Err("expected an activity name".into());
            }
            Command::SetActivity {
                kind,
                id,
                record,
                activity,
            }
        }
        "delete" => {
            let (kind, id) = parse_target(&mut words)?;
            let record = parse_record_number(words.next())?;
            Command::Delete { kind, id, record }
        }
        other => return Err(format!("unknown command '{other}'")),
    };

    if words.next().is_none() {
        Ok(command)
    } else {
        Err(format!("too many arguments for '{name}'"))
    }
}

fn parse_target<'a>(words: &mut impl Iterator<Item = &'a str>) -> Result<(TrackableKind, u64), String> {
    let kind = match words.next() {
        Some("issue") => TrackableKind::Issue,
        Some("project") => TrackableKind::Project,
        _ => return Err("expected issue or project".into()),
    };
    Ok((kind, parse_id(words.next())?))
}

fn parse_id(word: Option<&str>) -> Result<u64, String> {
    let word = word.ok_or("expected an id")?;
    word.trim_start_matches('#')
        .parse()
        .map_err(|_| format!("'{word}' is not a valid id"))
}

fn parse_record_number(word: Option<&str>) -> Result<usize, String> {
    let word = word.ok_or("expected a record number")?;
    match word.parse::<usize>() {
        Ok(number) if number > 0 => Ok(number),
        _ => Err(format!("'{word}' is not a valid record number")),
    }
}

/// Whether the console keeps reading after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Dispatches console commands onto the tracker.
pub struct Console {
    sync: Arc<Synchronizer>,
    secrets: SecretsManager,
    config: Arc<ConfigManager>,
}

impl Console {
    pub fn new(sync: Arc<Synchronizer>, secrets: SecretsManager, config: Arc<ConfigManager>) -> Self {
        Self {
            sync,
            secrets,
            config,
        }
    }

    /// Runs a parsed command. Failures are already reported through the event sink,
    /// so they only show up here as a short line.
    pub async fn execute(&self, command: Command) -> Result<Flow, String> {
        let sync = self.sync.as_ref();
        match command {
            Command::Refresh => sync.request_refresh(),
            Command::LoadMore => sync.load_more_issues().await.map_err(|err| err.to_string())?,
            Command::AddIssue(id) => {
                if let Some(issue) = sync.add_issue_by_id(id).await.map_err(|err| err.to_string())? {
                    println!("tracking {}", issue.snapshot().label());
                }
            }
            Command::Toggle { kind, id, on } => {
                let trackable = find_trackable(sync, kind, id)?;
                trackable
                    .toggle_recording(on)
                    .await
                    .map_err(|err| err.to_string())?;
            }
            Command::NewRecord { kind, id } => {
                let trackable = find_trackable(sync, kind, id)?;
                trackable.new_record().map_err(|err| err.to_string())?;
            }
            Command::SetTime {
                kind,
                id,
                record,
                time,
            } => {
                let record = find_record(sync, kind, id, record)?;
                record
                    .manual_time_entry(&time)
                    .await
                    .map_err(|err| err.to_string())?;
            }
            Command::SetActivity {
                kind,
                id,
                record,
                activity,
            } => {
                let record = find_record(sync, kind, id, record)?;
                record
                    .change_activity(&activity)
                    .await
                    .map_err(|err| err.to_string())?;
            }
            Command::Delete { kind, id, record } => {
                let record = find_record(sync, kind, id, record)?;
                record.delete().await.map_err(|err| err.to_string())?;
            }
            Command::List => print_listing(sync).await,
            Command::SetUrl(url) => {
                let mut config = self.config.load();
                config.redmine_url = url;
                self.config.save(&config).map_err(|err| err.to_string())?;
                info!("Redmine URL saved to {}", self.config.path().display());
            }
            Command::SetApiKey(key) => {
                let secrets = self.secrets.clone();
                task::spawn_blocking(move || secrets.save_api_key(&key))
                    .await
                    .map_err(|err| format!("Failed to join keyring task: {err}"))?
                    .map_err(|err| err.to_string())?;
                info!("API key stored in the keyring");
            }
            Command::Logout => {
                let secrets = self.secrets.clone();
                task::spawn_blocking(move || secrets.clear_api_key())
                    .await
                    .map_err(|err| format!("Failed to join keyring task: {err}"))?
                    .map_err(|err| err.to_string())?;
                info!("API key removed from the keyring");
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }
}

fn find_trackable(sync: &Synchronizer, kind: TrackableKind, id: u64) -> Result<Arc<Trackable>, String> {
    sync.trackable(kind, id)
        .ok_or_else(|| format!("{kind} #{id} is not tracked"))
}

fn find_record(
    sync: &Synchronizer,
    kind: TrackableKind,
    id: u64,
    number: usize,
) -> Result<Arc<Record>, String> {
    let trackable = find_trackable(sync, kind, id)?;
    number
        .checked_sub(1)
        .and_then(|index| trackable.records().get(index).cloned())
        .ok_or_else(|| format!("{kind} #{id} has no record {number}"))
}

async fn print_listing(sync: &Synchronizer) {
    println!("today: {}", format_hours(sync.today_hours()));
    if let Some(url) = sync.activity_url() {
        println!("activity: {url}");
    }
    for trackable in sync.projects().into_iter().chain(sync.issues()) {
        let view = trackable.view();
        println!(
            "{} {}{}",
            view.kind,
            view.label,
            if view.recording { "  [recording]" } else { "" }
        );
        for (index, record) in trackable.records().iter().enumerate() {
            let record = record.view().await;
            let saved = record
                .time_entry_id
                .map(|id| format!("#{id}"))
                .unwrap_or_else(|| "unsaved".to_string());
            println!(
                "  {}. {} {} ({}){}",
                index + 1,
                record.time,
                record.activity,
                saved,
                if record.recording { " *" } else { "" }
            );
        }
    }
}

/// Reads commands from stdin until `quit` or end of input.
pub async fn run_console(console: &Console) {
    use tokio::io::{AsyncBufReadExt, BufReader};

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                warn!("Failed to read console input: {}", err);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };
        debug!("Console command: {:?}", command);
        match console.execute(command).await {
            Ok(Flow::Quit) => break,
            Ok(Flow::Continue) => {}
            Err(message) => println!("{}", redact_log_details(&message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::context_for;
    use mockito::Server;

    #[test]
    fn parses_simple_commands() {
        assert_eq!(parse_command("refresh"), Ok(Command::Refresh));
        assert_eq!(parse_command("  more "), Ok(Command::LoadMore));
        assert_eq!(parse_command("add #42"), Ok(Command::AddIssue(42)));
        assert_eq!(parse_command("quit"), Ok(Command::Quit));
        assert_eq!(
            parse_command("url https://redmine.example.org"),
            Ok(Command::SetUrl("https://redmine.example.org".into()))
        );
    }

    #[test]
    fn parses_record_commands() {
        assert_eq!(
            parse_command("toggle issue 42 on"),
            Ok(Command::Toggle {
                kind: TrackableKind::Issue,
                id: 42,
                on: true
            })
        );
        assert_eq!(
            parse_command("time project 3 2 1:30"),
            Ok(Command::SetTime {
                kind: TrackableKind::Project,
                id: 3,
                record: 2,
                time: "1:30".into()
            })
        );
        assert_eq!(
            parse_command("activity issue 42 1 Code review"),
            Ok(Command::SetActivity {
                kind: TrackableKind::Issue,
                id: 42,
                record: 1,
                activity: "Code review".into()
            })
        );
    }

    #[test]
    fn rejects_malformed_commands() {
        assert!(parse_command("").is_err());
        assert!(parse_command("toggle issue 42").is_err());
        assert!(parse_command("toggle task 42 on").is_err());
        assert!(parse_command("delete issue 42 0").is_err());
        assert!(parse_command("add abc").is_err());
        assert!(parse_command("more please").is_err());
        assert!(parse_command("dance").is_err());
    }

    #[tokio::test]
    async fn commands_on_unknown_trackables_fail_gracefully() {
        let server = Server::new_async().await;
        let (ctx, _sink) = context_for(&server);
        let console = Console::new(
            Arc::new(Synchronizer::new(ctx)),
            SecretsManager::with_service("org.redmine-tracker.tests", Some("key".into())),
            Arc::new(ConfigManager::with_path(std::env::temp_dir().join("redmine-tracker-console/config.json"))),
        );

        let err = console
            .execute(Command::Toggle {
                kind: TrackableKind::Issue,
                id: 42,
                on: true,
            })
            .await
            .expect_err("issue not tracked");
        assert_eq!(err, "issue #42 is not tracked");
        assert_eq!(console.execute(Command::Quit).await, Ok(Flow::Quit));
    }
}

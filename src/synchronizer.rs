//! Keeps the known issues and projects in step with Redmine.
//!
//! A full pass runs in strict phases: account, projects, assigned issues, then today's
//! time entries. Items inside a phase are merged concurrently and a failing item is
//! skipped; a failing phase aborts the pass.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use log::{debug, info, warn};
use redmine_api::{Issue, IssueQuery, Project, RedmineConfig, RedmineError, TimeEntry, TimeEntryOwner};
use tokio::sync::Notify;
use tokio::time::{interval, MissedTickBehavior};

use crate::context::TrackerContext;
use crate::display::{format_hours, redact_log_details};
use crate::error::{Result, TrackerError};
use crate::events::TrackerEvent;
use crate::trackable::{Trackable, TrackableKind, TrackableSnapshot};

pub const DEFAULT_ISSUE_BATCH: u32 = 10;
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);

pub struct Synchronizer {
    ctx: TrackerContext,
    issues: Mutex<HashMap<u64, Arc<Trackable>>>,
    projects: Mutex<HashMap<u64, Arc<Trackable>>>,
    issue_limit: AtomicU32,
    issue_batch: u32,
    today_hours: Mutex<f64>,
    refresh_requested: Notify,
}

impl Synchronizer {
    pub fn new(ctx: TrackerContext) -> Self {
        Self::with_issue_batch(ctx, DEFAULT_ISSUE_BATCH)
    }

    /// `batch` is both the initial number of issues fetched and the step of "load more".
    pub fn with_issue_batch(ctx: TrackerContext, batch: u32) -> Self {
        let batch = batch.max(1);
        Self {
            ctx,
            issues: Mutex::new(HashMap::new()),
            projects: Mutex::new(HashMap::new()),
            issue_limit: AtomicU32::new(batch),
            issue_batch: batch,
            today_hours: Mutex::new(0.0),
            refresh_requested: Notify::new(),
        }
    }

    pub fn context(&self) -> &TrackerContext {
        &self.ctx
    }

    fn map(&self, kind: TrackableKind) -> &Mutex<HashMap<u64, Arc<Trackable>>> {
        match kind {
            TrackableKind::Issue => &self.issues,
            TrackableKind::Project => &self.projects,
        }
    }

    pub fn trackable(&self, kind: TrackableKind, id: u64) -> Option<Arc<Trackable>> {
        self.map(kind)
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    pub fn issue(&self, id: u64) -> Option<Arc<Trackable>> {
        self.trackable(TrackableKind::Issue, id)
    }

    pub fn project(&self, id: u64) -> Option<Arc<Trackable>> {
        self.trackable(TrackableKind::Project, id)
    }

    /// Known issues ordered by id.
    pub fn issues(&self) -> Vec<Arc<Trackable>> {
        sorted(&self.issues)
    }

    /// Known projects ordered by id.
    pub fn projects(&self) -> Vec<Arc<Trackable>> {
        sorted(&self.projects)
    }

    /// Hours recorded today by the authenticated user, as of the last time-entry pass.
    pub fn today_hours(&self) -> f64 {
        *self.today_hours.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn issue_limit(&self) -> u32 {
        self.issue_limit.load(Ordering::Relaxed)
    }

    /// Redmine activity page of the authenticated user, known once connected.
    pub fn activity_url(&self) -> Option<String> {
        let client = self.ctx.client();
        client
            .user_id()
            .map(|user_id| format!("{}/activity?user_id={}", client.base_url(), user_id))
    }

    pub fn request_refresh(&self) {
        self.refresh_requested.notify_one();
    }

    pub async fn full_refresh(&self) -> Result<()> {
        debug!("Refreshing from Redmine");
        self.connect().await?;
        self.sync_projects().await?;
        self.sync_issues().await?;
        self.sync_time_entries().await?;
        debug!(
            "Refresh done: {} projects, {} issues, {} today",
            self.projects.lock().unwrap_or_else(PoisonError::into_inner).len(),
            self.issues.lock().unwrap_or_else(PoisonError::into_inner).len(),
            format_hours(self.today_hours())
        );
        Ok(())
    }

    /// Fetches one issue by id and tracks it. Returns `None` when Redmine cannot provide it.
    pub async fn add_issue_by_id(&self, issue_id: u64) -> Result<Option<Arc<Trackable>>> {
        let issue = match self.ctx.client().get_issue(issue_id).await {
            Ok(issue) => issue,
            Err(err) => {
                let message = if err.is_not_found() {
                    format!("Issue #{} was not found in Redmine", issue_id)
                } else {
                    format!("Unable to load issue #{} from Redmine", issue_id)
                };
                warn!("{}", message);
                debug!("Issue load details: {}", redact_log_details(&err.to_string()));
                self.ctx.emit(TrackerEvent::warning(message));
                return Ok(None);
            }
        };
        self.merge_issue(&issue).await.map(Some)
    }

    pub async fn load_more_issues(&self) -> Result<()> {
        let limit = self
            .issue_limit
            .fetch_add(self.issue_batch, Ordering::Relaxed)
            + self.issue_batch;
        info!("Loading up to {} issues", limit);
        self.sync_issues().await
    }

    /// Points the client at another server or key and reconnects.
    pub async fn reconfigure(&self, config: RedmineConfig) -> Result<()> {
        let previous = self.ctx.client().base_url();
        self.ctx.client().reconfigure(config)?;
        if previous != self.ctx.client().base_url() {
            info!("Redmine URL changed, forgetting known issues and projects");
            self.issues.lock().unwrap_or_else(PoisonError::into_inner).clear();
            self.projects.lock().unwrap_or_else(PoisonError::into_inner).clear();
        }
        self.full_refresh().await
    }

    /// Background loop: a full pass at startup and on every tick or request, and a
    /// time-entry pass whenever a record pushed new hours.
    pub async fn run(&self, every: Duration) {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.refresh_pass("scheduled").await,
                _ = self.refresh_requested.notified() => self.refresh_pass("requested").await,
                _ = self.ctx.time_updated().notified() => {
                    if let Err(err) = self.sync_time_entries().await {
                        debug!("Time entry pass failed: {}", redact_log_details(&err.to_string()));
                    }
                }
            }
        }
    }

    async fn refresh_pass(&self, reason: &str) {
        debug!("Starting {} refresh", reason);
        if let Err(err) = self.full_refresh().await {
            debug!("{} refresh aborted: {}", reason, redact_log_details(&err.to_string()));
        }
    }

    async fn connect(&self) -> Result<()> {
        match self.ctx.client().fetch_account().await {
            Ok(account) => {
                debug!("Connected to Redmine as {}", account.display_name());
                Ok(())
            }
            Err(err) => {
                warn!("Unable to connect to Redmine");
                debug!("Connect details: {}", redact_log_details(&err.to_string()));
                self.ctx.emit(TrackerEvent::warning("Unable to connect to Redmine"));
                Err(err.into())
            }
        }
    }

    async fn sync_projects(&self) -> Result<()> {
        let projects = self
            .ctx
            .client()
            .list_projects()
            .await
            .map_err(|err| self.phase_failed("projects", err))?;
        let results = join_all(projects.iter().map(|project| self.merge_project(project))).await;
        for (project, result) in projects.iter().zip(results) {
            if let Err(err) = result {
                self.item_failed(TrackableKind::Project, project.id, &err);
            }
        }
        Ok(())
    }

    async fn sync_issues(&self) -> Result<()> {
        let query = IssueQuery::assigned_to_me(self.issue_limit());
        let issues = self
            .ctx
            .client()
            .list_issues(&query)
            .await
            .map_err(|err| self.phase_failed("issues", err))?;
        let results = join_all(issues.iter().map(|issue| self.merge_issue(issue))).await;
        for (issue, result) in issues.iter().zip(results) {
            if let Err(err) = result {
                self.item_failed(TrackableKind::Issue, issue.id, &err);
            }
        }
        Ok(())
    }

    /// Recomputes today's total and mirrors each of today's entries onto its record.
    pub async fn sync_time_entries(&self) -> Result<()> {
        let user_id = self.ctx.client().user_id().ok_or(TrackerError::NotConnected)?;
        let entries = self
            .ctx
            .client()
            .list_time_entries_for_today(user_id)
            .await
            .map_err(|err| self.phase_failed("time entries", err))?;

        let total: f64 = entries.iter().map(|entry| entry.hours).sum();
        *self.today_hours.lock().unwrap_or_else(PoisonError::into_inner) = total;
        self.ctx.emit(TrackerEvent::totals(total));

        let results = join_all(entries.iter().map(|entry| self.replay_time_entry(entry))).await;
        for (entry, result) in entries.iter().zip(results) {
            if let Err(err) = result {
                let (kind, id) = match entry.owner() {
                    TimeEntryOwner::Issue(id) => (TrackableKind::Issue, id),
                    TimeEntryOwner::Project(id) => (TrackableKind::Project, id),
                };
                self.item_failed(kind, id, &err);
            }
        }
        Ok(())
    }

    async fn replay_time_entry(&self, entry: &TimeEntry) -> Result<()> {
        let trackable = match entry.owner() {
            TimeEntryOwner::Issue(id) => match self.issue(id) {
                Some(issue) => issue,
                None => {
                    let issue = self.ctx.client().get_issue(id).await?;
                    self.merge_issue(&issue).await?
                }
            },
            TimeEntryOwner::Project(id) => self.ensure_project(id).await?,
        };

        let snapshot = trackable.snapshot();
        let activity = entry
            .activity
            .name
            .clone()
            .filter(|name| snapshot.has_activity(name))
            .or_else(|| {
                snapshot
                    .activities
                    .iter()
                    .find(|activity| activity.id == entry.activity.id)
                    .map(|activity| activity.name.clone())
            })
            .or_else(|| snapshot.default_activity().map(str::to_string))
            .unwrap_or_default();

        trackable
            .record_time_entry(entry.id, entry.hours, &activity)
            .await?;
        Ok(())
    }

    async fn ensure_project(&self, project_id: u64) -> Result<Arc<Trackable>> {
        if let Some(project) = self.project(project_id) {
            return Ok(project);
        }
        debug!("Fetching project #{} outside of the project list", project_id);
        let project = self.ctx.client().get_project(project_id).await?;
        self.merge_project(&project).await
    }

    async fn merge_project(&self, project: &Project) -> Result<Arc<Trackable>> {
        if project.time_entry_activities.is_empty() {
            return Err(TrackerError::MissingActivities {
                kind: TrackableKind::Project,
                id: project.id,
            });
        }
        let client = self.ctx.client();
        let snapshot =
            TrackableSnapshot::from_project(project, &client.base_url(), client.issue_id_width());
        Ok(self.merge(snapshot).await)
    }

    async fn merge_issue(&self, issue: &Issue) -> Result<Arc<Trackable>> {
        let project = self.ensure_project(issue.project.id).await?;
        let activities = project.snapshot().activities;
        let client = self.ctx.client();
        let snapshot = TrackableSnapshot::from_issue(
            issue,
            activities,
            &client.base_url(),
            client.issue_id_width(),
        );
        Ok(self.merge(snapshot).await)
    }

    /// Inserts a new trackable or refreshes the known one with the same id.
    async fn merge(&self, snapshot: TrackableSnapshot) -> Arc<Trackable> {
        let (trackable, created) = {
            let mut map = self
                .map(snapshot.kind)
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match map.get(&snapshot.id) {
                Some(existing) => (existing.clone(), false),
                None => {
                    let trackable = Trackable::new(self.ctx.clone(), snapshot.clone());
                    map.insert(snapshot.id, trackable.clone());
                    (trackable, true)
                }
            }
        };

        if created {
            info!("Tracking {} #{} '{}'", snapshot.kind, snapshot.id, snapshot.subject);
            self.ctx.emit(TrackerEvent::TrackableAdded(trackable.view()));
        } else {
            trackable.refresh(snapshot).await;
        }
        trackable
    }

    fn phase_failed(&self, phase: &str, err: RedmineError) -> TrackerError {
        warn!("Failed to refresh {}", phase);
        debug!("Refresh details: {}", redact_log_details(&err.to_string()));
        self.ctx.emit(TrackerEvent::warning(format!(
            "Unable to refresh {} from Redmine",
            phase
        )));
        err.into()
    }

    fn item_failed(&self, kind: TrackableKind, id: u64, err: &TrackerError) {
        warn!("Skipping {} #{}", kind, id);
        debug!("Skip details: {}", redact_log_details(&err.to_string()));
    }
}

fn sorted(map: &Mutex<HashMap<u64, Arc<Trackable>>>) -> Vec<Arc<Trackable>> {
    let mut items: Vec<(u64, Arc<Trackable>)> = map
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .map(|(id, trackable)| (*id, trackable.clone()))
        .collect();
    items.sort_by_key(|(id, _)| *id);
    items.into_iter().map(|(_, trackable)| trackable).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context_for, CollectingSink};
    use mockito::{Matcher, Mock, Server};
    use redmine_api::Activity;

    const PROJECTS: &str = r#"{"projects":[
        {"id":1,"name":"Core","time_entry_activities":[{"id":10,"name":"Dev"}]},
        {"id":2,"name":"Docs","time_entry_activities":[{"id":10,"name":"Dev"},{"id":12,"name":"Writing"}]}
    ]}"#;

    async fn mock_account(server: &mut Server) -> Mock {
        server
            .mock("GET", "/my/account.json")
            .with_status(200)
            .with_body(r#"{"user":{"id":7,"login":"jdoe"}}"#)
            .create_async()
            .await
    }

    async fn mock_projects(server: &mut Server, body: &str) -> Mock {
        server
            .mock("GET", "/projects.json")
            .match_query(Matcher::UrlEncoded("include".into(), "time_entry_activities".into()))
            .with_status(200)
            .with_body(body)
            .create_async()
            .await
    }

    async fn mock_issues(server: &mut Server, limit: u32, body: &str) -> Mock {
        server
            .mock("GET", "/issues.json")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("limit".into(), limit.to_string()),
                Matcher::UrlEncoded("assigned_to_id".into(), "me".into()),
            ]))
            .with_status(200)
            .with_body(body)
            .create_async()
            .await
    }

    async fn mock_today(server: &mut Server, body: &str) -> Mock {
        server
            .mock("GET", "/time_entries.json")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("user_id".into(), "7".into()),
                Matcher::UrlEncoded("limit".into(), "100".into()),
            ]))
            .with_status(200)
            .with_body(body)
            .create_async()
            .await
    }

    fn synchronizer(server: &Server) -> (Synchronizer, Arc<CollectingSink>) {
        let (ctx, sink) = context_for(server);
        (Synchronizer::new(ctx), sink)
    }

    #[tokio::test]
    async fn issues_inherit_activities_of_their_project() {
        let mut server = Server::new_async().await;
        let _account = mock_account(&mut server).await;
        let _projects = mock_projects(
            &mut server,
            r#"{"projects":[{"id":1,"name":"Core","time_entry_activities":[{"id":10,"name":"Dev"}]}]}"#,
        )
        .await;
        let _issues = mock_issues(
            &mut server,
            10,
            r#"{"issues":[{"id":42,"subject":"Fix bug","project":{"id":1,"name":"Core"}}]}"#,
        )
        .await;
        let _today = mock_today(&mut server, r#"{"time_entries":[]}"#).await;
        let (sync, sink) = synchronizer(&server);

        sync.full_refresh().await.expect("refresh succeeds");

        let issue = sync.issue(42).expect("issue tracked");
        assert_eq!(issue.kind(), TrackableKind::Issue);
        assert_eq!(issue.snapshot().activities, vec![Activity::new(10, "Dev")]);
        assert_eq!(issue.snapshot().url, format!("{}/issues/42", server.url()));
        assert!(sync.project(1).is_some());
        assert_eq!(sync.today_hours(), 0.0);
        assert_eq!(sink.count(|event| matches!(event, TrackerEvent::TrackableAdded(_))), 2);
        assert_eq!(
            sync.activity_url(),
            Some(format!("{}/activity?user_id=7", server.url()))
        );
    }

    #[tokio::test]
    async fn listed_projects_are_merged_before_issues() {
        let mut server = Server::new_async().await;
        let _account = mock_account(&mut server).await;
        let _projects = mock_projects(&mut server, PROJECTS).await;
        let _issues = mock_issues(
            &mut server,
            10,
            r#"{"issues":[
                {"id":101,"subject":"A","project":{"id":1}},
                {"id":102,"subject":"B","project":{"id":2}},
                {"id":103,"subject":"C","project":{"id":1}},
                {"id":104,"subject":"D","project":{"id":2}},
                {"id":105,"subject":"E","project":{"id":1}}
            ]}"#,
        )
        .await;
        let _today = mock_today(&mut server, r#"{"time_entries":[]}"#).await;
        let single_project = server
            .mock("GET", Matcher::Regex(r"^/projects/\d+\.json".to_string()))
            .expect(0)
            .create_async()
            .await;
        let (sync, _sink) = synchronizer(&server);

        sync.full_refresh().await.expect("refresh succeeds");

        single_project.assert_async().await;
        assert_eq!(sync.projects().len(), 2);
        let ids: Vec<u64> = sync.issues().iter().map(|issue| issue.id()).collect();
        assert_eq!(ids, vec![101, 102, 103, 104, 105]);
        let writing = sync.issue(104).expect("issue tracked").snapshot();
        assert!(writing.has_activity("Writing"));
    }

    #[tokio::test]
    async fn todays_entries_are_totalled_and_replayed_once() {
        let mut server = Server::new_async().await;
        let _account = mock_account(&mut server).await;
        let _projects = mock_projects(&mut server, PROJECTS).await;
        let _issues = mock_issues(
            &mut server,
            10,
            r#"{"issues":[{"id":42,"subject":"Fix bug","project":{"id":1}}]}"#,
        )
        .await;
        let _today = mock_today(
            &mut server,
            r#"{"time_entries":[
                {"id":500,"project":{"id":1},"issue":{"id":42},"activity":{"id":10,"name":"Dev"},"hours":1.25},
                {"id":501,"project":{"id":2},"activity":{"id":12,"name":"Writing"},"hours":0.5}
            ]}"#,
        )
        .await;
        let (sync, sink) = synchronizer(&server);

        sync.full_refresh().await.expect("first refresh");
        sync.full_refresh().await.expect("second refresh");

        assert!((sync.today_hours() - 1.75).abs() < f64::EPSILON);
        let issue = sync.issue(42).expect("issue tracked");
        assert_eq!(issue.records().len(), 1);
        let record = issue.record_for_remote_id(500).expect("record replayed");
        assert!((record.view().await.hours - 1.25).abs() < f64::EPSILON);

        let docs = sync.project(2).expect("project tracked");
        assert_eq!(docs.records().len(), 1);
        assert_eq!(docs.records()[0].view().await.activity, "Writing");
        assert_eq!(
            sink.count(|event| matches!(event, TrackerEvent::TimeTotalsUpdated { formatted, .. } if formatted == "1:45")),
            2
        );
    }

    #[tokio::test]
    async fn replay_fetches_unknown_issues() {
        let mut server = Server::new_async().await;
        let _account = mock_account(&mut server).await;
        let _projects = mock_projects(&mut server, PROJECTS).await;
        let _issues = mock_issues(&mut server, 10, r#"{"issues":[]}"#).await;
        let _today = mock_today(
            &mut server,
            r#"{"time_entries":[{"id":600,"project":{"id":1},"issue":{"id":77},"activity":{"id":10,"name":"Dev"},"hours":0.25}]}"#,
        )
        .await;
        let old_issue = server
            .mock("GET", "/issues/77.json")
            .with_status(200)
            .with_body(r#"{"issue":{"id":77,"subject":"Old ticket","project":{"id":1}}}"#)
            .expect(1)
            .create_async()
            .await;
        let (sync, _sink) = synchronizer(&server);

        sync.full_refresh().await.expect("refresh succeeds");

        old_issue.assert_async().await;
        let issue = sync.issue(77).expect("issue materialized");
        assert_eq!(issue.snapshot().subject, "Old ticket");
        assert!(issue.record_for_remote_id(600).is_some());
    }

    #[tokio::test]
    async fn unreachable_server_aborts_the_pass_with_a_warning() {
        let mut server = Server::new_async().await;
        let _account = server
            .mock("GET", "/my/account.json")
            .with_status(401)
            .create_async()
            .await;
        let projects = server
            .mock("GET", "/projects.json")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;
        let (sync, sink) = synchronizer(&server);

        let err = sync.full_refresh().await.expect_err("not connected");

        assert!(matches!(err, TrackerError::Remote(_)));
        projects.assert_async().await;
        assert_eq!(sink.warnings(), vec!["Unable to connect to Redmine".to_string()]);
        assert!(sync.activity_url().is_none());
    }

    #[tokio::test]
    async fn missing_issue_is_reported_without_tracking_anything() {
        let mut server = Server::new_async().await;
        let _missing = server
            .mock("GET", "/issues/999.json")
            .with_status(404)
            .create_async()
            .await;
        let (sync, sink) = synchronizer(&server);

        let added = sync.add_issue_by_id(999).await.expect("handled");

        assert!(added.is_none());
        assert!(sync.issues().is_empty());
        assert!(sync.projects().is_empty());
        assert_eq!(sink.warnings().len(), 1);
        assert!(sink.warnings()[0].contains("#999"));
    }

    #[tokio::test]
    async fn added_issue_brings_its_project_along() {
        let mut server = Server::new_async().await;
        let _issue = server
            .mock("GET", "/issues/55.json")
            .with_status(200)
            .with_body(r#"{"issue":{"id":55,"subject":"Support request","project":{"id":3,"name":"Support"}}}"#)
            .create_async()
            .await;
        let project = server
            .mock("GET", "/projects/3.json")
            .match_query(Matcher::UrlEncoded("include".into(), "time_entry_activities".into()))
            .with_status(200)
            .with_body(r#"{"project":{"id":3,"name":"Support","time_entry_activities":[{"id":14,"name":"Support"}]}}"#)
            .expect(1)
            .create_async()
            .await;
        let (sync, _sink) = synchronizer(&server);

        let added = sync.add_issue_by_id(55).await.expect("issue added").expect("issue found");

        project.assert_async().await;
        assert_eq!(added.id(), 55);
        assert_eq!(added.snapshot().default_activity(), Some("Support"));
        assert!(sync.project(3).is_some());
    }

    #[tokio::test]
    async fn load_more_grows_the_issue_window() {
        let mut server = Server::new_async().await;
        let _account = mock_account(&mut server).await;
        let _projects = mock_projects(&mut server, PROJECTS).await;
        let first_page = mock_issues(
            &mut server,
            10,
            r#"{"issues":[{"id":101,"subject":"A","project":{"id":1}}]}"#,
        )
        .await;
        let wider = mock_issues(
            &mut server,
            20,
            r#"{"issues":[{"id":101,"subject":"A","project":{"id":1}},{"id":90,"subject":"Older","project":{"id":2}}]}"#,
        )
        .await;
        let _today = mock_today(&mut server, r#"{"time_entries":[]}"#).await;
        let (sync, _sink) = synchronizer(&server);

        sync.full_refresh().await.expect("refresh succeeds");
        first_page.assert_async().await;
        assert_eq!(sync.issue_limit(), 10);

        sync.load_more_issues().await.expect("more issues loaded");
        wider.assert_async().await;
        assert_eq!(sync.issue_limit(), 20);
        assert!(sync.issue(90).is_some());
        assert_eq!(sync.issues().len(), 2);
    }

    #[tokio::test]
    async fn projects_without_activities_are_skipped() {
        let mut server = Server::new_async().await;
        let _account = mock_account(&mut server).await;
        let _projects = mock_projects(
            &mut server,
            r#"{"projects":[
                {"id":1,"name":"Core","time_entry_activities":[{"id":10,"name":"Dev"}]},
                {"id":9,"name":"Archive","time_entry_activities":[]}
            ]}"#,
        )
        .await;
        let _issues = mock_issues(&mut server, 10, r#"{"issues":[]}"#).await;
        let _today = mock_today(&mut server, r#"{"time_entries":[]}"#).await;
        let (sync, _sink) = synchronizer(&server);

        sync.full_refresh().await.expect("refresh succeeds");

        assert!(sync.project(1).is_some());
        assert!(sync.project(9).is_none());
    }

    async fn mock_full_pass(server: &mut Server, projects: &str) -> Vec<Mock> {
        vec![
            mock_account(server).await,
            mock_projects(server, projects).await,
            mock_issues(server, 10, r#"{"issues":[]}"#).await,
            mock_today(server, r#"{"time_entries":[]}"#).await,
        ]
    }

    #[tokio::test]
    async fn new_server_url_forgets_trackables_but_new_key_keeps_them() {
        let mut first = Server::new_async().await;
        let mut second = Server::new_async().await;
        let _first_pass = mock_full_pass(
            &mut first,
            r#"{"projects":[{"id":1,"name":"Core","time_entry_activities":[{"id":10,"name":"Dev"}]}]}"#,
        )
        .await;
        let _second_pass = mock_full_pass(
            &mut second,
            r#"{"projects":[{"id":5,"name":"Ops","time_entry_activities":[{"id":20,"name":"Support"}]}]}"#,
        )
        .await;
        let _added = second
            .mock("GET", "/issues/55.json")
            .with_status(200)
            .with_body(r#"{"issue":{"id":55,"subject":"Pager","project":{"id":5}}}"#)
            .create_async()
            .await;
        let (sync, _sink) = synchronizer(&first);

        sync.full_refresh().await.expect("first server refreshed");
        assert!(sync.project(1).is_some());

        sync.reconfigure(RedmineConfig::new(second.url(), "secret"))
            .await
            .expect("switched server");
        assert!(sync.project(1).is_none());
        assert!(sync.project(5).is_some());

        sync.add_issue_by_id(55).await.expect("issue added").expect("issue found");
        sync.reconfigure(RedmineConfig::new(second.url(), "rotated"))
            .await
            .expect("rotated key");
        assert!(sync.issue(55).is_some());
        assert!(sync.project(5).is_some());
        assert_eq!(sync.context().client().config().api_key, "rotated");
    }

    #[tokio::test]
    async fn time_entry_pass_needs_a_connection() {
        let server = Server::new_async().await;
        let (sync, _sink) = synchronizer(&server);

        let err = sync.sync_time_entries().await.expect_err("no user yet");
        assert!(matches!(err, TrackerError::NotConnected));
    }
}

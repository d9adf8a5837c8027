use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use chrono::Local;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client as HttpClient, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::{RedmineConfig, API_KEY_HEADER};
use crate::error::{RedmineError, Result};
use crate::models::{
    Account, AccountEnvelope, Issue, IssueEnvelope, IssueList, Project, ProjectEnvelope,
    ProjectList, TimeEntry, TimeEntryCreate, TimeEntryEnvelope, TimeEntryList, TimeEntryOwner,
    TimeEntryUpdate,
};

pub const DEFAULT_ISSUE_ID_WIDTH: usize = 10;
const TIME_ENTRIES_PAGE_LIMIT: u32 = 100;

/// Redmine client shared by every component for the lifetime of the process.
///
/// The HTTP client and its configuration can be swapped with [`RedmineClient::reconfigure`];
/// the authenticated user id is cached after the first successful [`RedmineClient::fetch_account`].
pub struct RedmineClient {
    state: RwLock<ClientState>,
    user_id: RwLock<Option<u64>>,
    issue_id_width: AtomicUsize,
}

#[derive(Clone)]
struct ClientState {
    http: HttpClient,
    config: RedmineConfig,
}

/// Filters for `/issues.json`. Results are always sorted by last update, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueQuery {
    pub limit: Option<u32>,
    pub ids: Vec<u64>,
    pub status: Option<String>,
    pub assignee: Option<String>,
}

impl IssueQuery {
    /// Most recently updated issues assigned to the authenticated user.
    pub fn assigned_to_me(limit: u32) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("sort", "updated_on:desc".to_string()),
            (
                "assigned_to_id",
                self.assignee.clone().unwrap_or_else(|| "me".to_string()),
            ),
        ];
        if let Some(limit) = self.limit {
            params.push(("limit", limit.to_string()));
        }
        if !self.ids.is_empty() {
            let ids = self
                .ids
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",");
            params.push(("issue_id", ids));
        }
        if let Some(status) = &self.status {
            params.push(("status_id", status.clone()));
        }
        params
    }
}

impl RedmineClient {
    pub fn new(config: RedmineConfig) -> Result<Self> {
        let http = build_http_client(&config)?;
        Ok(Self {
            state: RwLock::new(ClientState { http, config }),
            user_id: RwLock::new(None),
            issue_id_width: AtomicUsize::new(DEFAULT_ISSUE_ID_WIDTH),
        })
    }

    /// Replaces base URL and API key. The cached user id is dropped until the next account fetch.
    pub fn reconfigure(&self, config: RedmineConfig) -> Result<()> {
        let http = build_http_client(&config)?;
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = ClientState { http, config };
        *self.user_id.write().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }

    pub fn config(&self) -> RedmineConfig {
        self.snapshot().config
    }

    /// Base URL without trailing slash, for building links to remote resources.
    pub fn base_url(&self) -> String {
        self.snapshot().config.root().to_string()
    }

    pub fn user_id(&self) -> Option<u64> {
        *self.user_id.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Digit count of the newest issue id, for aligning issue labels. Presentation only.
    pub fn issue_id_width(&self) -> usize {
        self.issue_id_width.load(Ordering::Relaxed)
    }

    fn snapshot(&self) -> ClientState {
        self.state.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    async fn get<T>(&self, path: &str, query: &[(&str, String)]) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let state = self.snapshot();
        let url = url_for(&state.config, path);
        debug!(%url, "GET");
        let mut request = state.http.get(url);
        if !query.is_empty() {
            request = request.query(query);
        }
        let response = request.send().await?;
        Self::parse_json(response).await
    }

    async fn send_with_body<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let state = self.snapshot();
        let url = url_for(&state.config, path);
        debug!(%url, %method, "request");
        let response = state.http.request(method, url).json(body).send().await?;
        Self::parse_json(response).await
    }

    async fn send_expect_empty<B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<()>
    where
        B: Serialize + ?Sized,
    {
        let state = self.snapshot();
        let url = url_for(&state.config, path);
        debug!(%url, %method, "request");
        let mut request = state.http.request(method, url);
        if let Some(payload) = body {
            request = request.json(payload);
        }
        let response = request.send().await?;
        Self::ensure_success(response).await
    }

    async fn parse_json<T>(response: Response) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let status = response.status();
        if is_success_status(status) {
            let body = response.text().await?;
            serde_json::from_str(&body).map_err(RedmineError::from)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(RedmineError::http(status, body))
        }
    }

    async fn ensure_success(response: Response) -> Result<()> {
        let status = response.status();
        if is_success_status(status) {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(RedmineError::http(status, body))
        }
    }

    /// Fetches the authenticated account and caches its id.
    ///
    /// Also looks up the newest assigned issue to infer how many digits issue ids have.
    pub async fn fetch_account(&self) -> Result<Account> {
        let envelope: AccountEnvelope = self.get("my/account", &[]).await?;
        let account = envelope.user;
        *self.user_id.write().unwrap_or_else(PoisonError::into_inner) = Some(account.id);

        match self.list_issues(&IssueQuery::assigned_to_me(1)).await {
            Ok(issues) => {
                if let Some(newest) = issues.first() {
                    let width = newest.id.to_string().len();
                    self.issue_id_width.store(width, Ordering::Relaxed);
                    debug!(width, "issue id width inferred");
                }
            }
            Err(err) => debug!(error = %err, "issue id width lookup failed"),
        }

        Ok(account)
    }

    pub async fn list_issues(&self, query: &IssueQuery) -> Result<Vec<Issue>> {
        let list: IssueList = self.get("issues", &query.to_params()).await?;
        Ok(list.issues)
    }

    pub async fn get_issue(&self, issue_id: u64) -> Result<Issue> {
        let path = format!("issues/{}", issue_id);
        let envelope: IssueEnvelope = self.get(&path, &[]).await?;
        Ok(envelope.issue)
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        let list: ProjectList = self.get("projects", &include_activities()).await?;
        Ok(list.projects)
    }

    pub async fn get_project(&self, project_id: u64) -> Result<Project> {
        let path = format!("projects/{}", project_id);
        let envelope: ProjectEnvelope = self.get(&path, &include_activities()).await?;
        Ok(envelope.project)
    }

    pub async fn create_time_entry(&self, request: &TimeEntryCreate) -> Result<TimeEntry> {
        let (issue_id, project_id) = match request.owner {
            TimeEntryOwner::Issue(id) => (Some(id), None),
            TimeEntryOwner::Project(id) => (None, Some(id)),
        };
        let spent_on = request.spent_on.clone().unwrap_or_else(current_date);
        let payload = TimeEntryPayload {
            time_entry: TimeEntryCreateBody {
                issue_id,
                project_id,
                spent_on: &spent_on,
                activity_id: request.activity_id,
                hours: request.hours,
                user_id: self.user_id(),
                comments: request.comments.as_deref(),
            },
        };
        let envelope: TimeEntryEnvelope = self
            .send_with_body(Method::POST, "time_entries", &payload)
            .await?;
        Ok(envelope.time_entry)
    }

    pub async fn update_time_entry(&self, time_entry_id: u64, update: &TimeEntryUpdate) -> Result<()> {
        let path = format!("time_entries/{}", time_entry_id);
        let payload = TimeEntryPayload { time_entry: update };
        self.send_expect_empty(Method::PUT, &path, Some(&payload)).await
    }

    pub async fn delete_time_entry(&self, time_entry_id: u64) -> Result<()> {
        let path = format!("time_entries/{}", time_entry_id);
        self.send_expect_empty(Method::DELETE, &path, None::<&Value>).await
    }

    pub async fn get_time_entry(&self, time_entry_id: u64) -> Result<TimeEntry> {
        let path = format!("time_entries/{}", time_entry_id);
        let envelope: TimeEntryEnvelope = self.get(&path, &[]).await?;
        Ok(envelope.time_entry)
    }

    /// Every entry the user logged today, following `offset` until `total_count` is reached.
    pub async fn list_time_entries_for_today(&self, user_id: u64) -> Result<Vec<TimeEntry>> {
        let spent_on = current_date();
        let mut entries = Vec::new();
        loop {
            let params = [
                ("user_id", user_id.to_string()),
                ("spent_on", spent_on.clone()),
                ("limit", TIME_ENTRIES_PAGE_LIMIT.to_string()),
                ("offset", entries.len().to_string()),
            ];
            let page: TimeEntryList = self.get("time_entries", &params).await?;
            let fetched = page.time_entries.len();
            entries.extend(page.time_entries);

            let total = page.total_count.unwrap_or(0) as usize;
            if fetched == 0 || entries.len() >= total {
                break;
            }
            debug!(fetched = entries.len(), total, "fetching next time entry page");
        }
        Ok(entries)
    }
}

/// Today's local date in the `YYYY-MM-DD` form Redmine uses for `spent_on`.
pub fn current_date() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

fn include_activities() -> [(&'static str, String); 1] {
    [("include", "time_entry_activities".to_string())]
}

fn url_for(config: &RedmineConfig, path: &str) -> String {
    format!("{}/{}.json", config.root(), path.trim_start_matches('/'))
}

fn is_success_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::OK | StatusCode::CREATED | StatusCode::NO_CONTENT
    )
}

fn build_http_client(config: &RedmineConfig) -> Result<HttpClient> {
    let mut headers = HeaderMap::new();

    let header_name = HeaderName::from_bytes(API_KEY_HEADER.as_bytes())
        .map_err(|err| RedmineError::Other(err.to_string()))?;
    headers.insert(header_name, header_value(config.api_key.clone())?);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(USER_AGENT, header_value(config.user_agent.clone())?);

    HttpClient::builder()
        .default_headers(headers)
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .build()
        .map_err(|err| RedmineError::Other(err.to_string()))
}

fn header_value(value: String) -> Result<HeaderValue> {
    HeaderValue::from_str(&value).map_err(|err| RedmineError::Other(err.to_string()))
}

#[derive(Debug, Serialize)]
struct TimeEntryPayload<T> {
    time_entry: T,
}

#[derive(Debug, Serialize)]
struct TimeEntryCreateBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    issue_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    project_id: Option<u64>,
    spent_on: &'a str,
    activity_id: u64,
    hours: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    comments: Option<&'a str>,
}

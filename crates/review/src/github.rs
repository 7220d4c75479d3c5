//! GitHub REST implementation of [`ChangesetFetcher`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::collaborators::ChangesetFetcher;
use crate::error::{ConfigError, FetchError};
use crate::model::{Changeset, FileDelta, PullRequestRef};

const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const DIFF_MEDIA_TYPE: &str = "application/vnd.github.v3.diff";
const API_VERSION: &str = "2022-11-28";
const FILES_PER_PAGE: usize = 100;
/// GitHub lists at most 3000 files for a pull request.
const MAX_FILE_PAGES: usize = 30;

/// Fetches pull requests through `GET /repos/{owner}/{repo}/pulls/{number}`.
pub struct GitHubFetcher {
    http: Client,
    api_url: String,
    token: String,
    timeout: Duration,
}

// -- Response types ------------------------------------------------

#[derive(Deserialize)]
struct PullDetails {
    title: String,
    body: Option<String>,
    html_url: String,
    base: GitRef,
    head: GitRef,
}

#[derive(Deserialize)]
struct GitRef {
    sha: String,
}

#[derive(Deserialize)]
struct PullFile {
    filename: String,
    status: String,
    #[serde(default)]
    additions: u64,
    #[serde(default)]
    deletions: u64,
    #[serde(default)]
    changes: u64,
}

impl From<PullFile> for FileDelta {
    fn from(f: PullFile) -> Self {
        Self {
            filename: f.filename,
            status: f.status,
            additions: f.additions,
            deletions: f.deletions,
            changes: f.changes,
        }
    }
}

// -- Client ---------------------------------------------------------

impl GitHubFetcher {
    /// `timeout` bounds each individual HTTP request.
    pub fn new(
        api_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_owned(),
            token: token.into(),
            timeout,
        })
    }

    fn pull_url(&self, r: &PullRequestRef) -> String {
        format!(
            "{}/repos/{}/{}/pulls/{}",
            self.api_url, r.owner, r.repo, r.number
        )
    }

    async fn get(&self, url: &str, accept: &str) -> Result<Response, FetchError> {
        debug!(url, accept, "GitHub request");
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .header(ACCEPT, accept)
            .header(USER_AGENT, concat!("pr-review/", env!("CARGO_PKG_VERSION")))
            .header("X-GitHub-Api-Version", API_VERSION)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, url, &body))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        self.get(url, JSON_MEDIA_TYPE)
            .await?
            .json()
            .await
            .map_err(|e| self.transport_error(e))
    }

    /// Every page of `/files`, stopping at the first short page.
    async fn get_files(&self, pull_url: &str) -> Result<Vec<PullFile>, FetchError> {
        let mut files = Vec::new();
        for page in 1..=MAX_FILE_PAGES {
            let url = format!("{pull_url}/files?per_page={FILES_PER_PAGE}&page={page}");
            let batch: Vec<PullFile> = self.get_json(&url).await?;
            let short = batch.len() < FILES_PER_PAGE;
            files.extend(batch);
            if short {
                break;
            }
        }
        Ok(files)
    }

    fn transport_error(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Transient(e.to_string())
        }
    }
}

fn status_error(status: StatusCode, url: &str, body: &str) -> FetchError {
    let detail = format!("{status} from {url}: {}", body.trim());
    match status {
        StatusCode::NOT_FOUND => FetchError::NotFound(detail),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FetchError::Unauthorized(detail),
        StatusCode::TOO_MANY_REQUESTS => FetchError::Transient(detail),
        s if s.is_server_error() => FetchError::Transient(detail),
        _ => FetchError::Rejected(detail),
    }
}

#[async_trait]
impl ChangesetFetcher for GitHubFetcher {
    async fn fetch_changeset(&self, url: &str) -> Result<Changeset, FetchError> {
        let reference = PullRequestRef::parse(url)?;
        let pull_url = self.pull_url(&reference);

        let (details, files, diff) = tokio::try_join!(
            self.get_json::<PullDetails>(&pull_url),
            self.get_files(&pull_url),
            async {
                self.get(&pull_url, DIFF_MEDIA_TYPE)
                    .await?
                    .text()
                    .await
                    .map_err(|e| self.transport_error(e))
            },
        )?;

        debug!(%reference, files = files.len(), diff_bytes = diff.len(), "pull request fetched");

        Ok(Changeset {
            reference,
            url: details.html_url,
            title: details.title,
            description: details.body,
            base_sha: details.base.sha,
            head_sha: details.head.sha,
            changed_files: files.into_iter().map(FileDelta::from).collect(),
            unified_diff: diff,
        })
    }
}

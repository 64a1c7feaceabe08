//! GitHub Actions implementation of [`RemoteJobClient`].
//!
//! Dispatched runs are correlated through the idempotency token: the token
//! is passed as a workflow input and the workflow is expected to echo it in
//! its `run-name`. The token is never logged.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::domain::job::ArtifactMeta;
use crate::domain::package::Repo;
use crate::remote::{RefInfo, RemoteError, RemoteJobClient, RemoteResult, RunRef, RunSnapshot};

const JSON_ACCEPT: &str = "application/vnd.github+json";
const RAW_ACCEPT: &str = "application/vnd.github.raw";

/// GitHub Actions REST client.
pub struct GithubClient {
    http: reqwest::Client,
    api_base: String,
}

impl GithubClient {
    pub fn new(token: &str, api_base: impl Into<String>) -> RemoteResult<Self> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| RemoteError::Http("token contains invalid header bytes".to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(USER_AGENT, HeaderValue::from_static("convoy-release"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;
        Ok(Self {
            http,
            api_base: api_base.into(),
        })
    }

    fn url(&self, repo: &Repo, tail: &str) -> String {
        format!("{}/repos/{}/{}/{tail}", self.api_base, repo.owner, repo.name)
    }

    async fn check(response: reqwest::Response) -> RemoteResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(RemoteError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[derive(Deserialize)]
struct RunsPage {
    workflow_runs: Vec<RunRow>,
}

#[derive(Deserialize)]
struct RunRow {
    id: u64,
    name: Option<String>,
    status: String,
    conclusion: Option<String>,
    html_url: Option<String>,
}

#[derive(Deserialize)]
struct ArtifactsPage {
    artifacts: Vec<ArtifactRow>,
}

#[derive(Deserialize)]
struct ArtifactRow {
    id: u64,
    name: String,
    size_in_bytes: u64,
    archive_download_url: Option<String>,
}

#[derive(Deserialize)]
struct RefRow {
    #[serde(rename = "ref")]
    name: String,
    object: RefObject,
}

#[derive(Deserialize)]
struct RefObject {
    sha: String,
}

#[async_trait]
impl RemoteJobClient for GithubClient {
    async fn trigger_job(
        &self,
        repo: &Repo,
        job_file: &str,
        inputs: &BTreeMap<String, String>,
        git_ref: &str,
    ) -> RemoteResult<()> {
        debug!(%repo, job_file, git_ref, "dispatching workflow");
        let url = self.url(repo, &format!("actions/workflows/{job_file}/dispatches"));
        let response = self
            .http
            .post(&url)
            .header(ACCEPT, JSON_ACCEPT)
            .json(&json!({ "ref": git_ref, "inputs": inputs }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn find_run_by_token(
        &self,
        repo: &Repo,
        job_file: &str,
        token: &str,
    ) -> RemoteResult<Option<RunRef>> {
        let url = self.url(
            repo,
            &format!("actions/workflows/{job_file}/runs?event=workflow_dispatch&per_page=50"),
        );
        let response = self.http.get(&url).header(ACCEPT, JSON_ACCEPT).send().await?;
        let page: RunsPage = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;

        Ok(page
            .workflow_runs
            .into_iter()
            .find(|run| run.name.as_deref().is_some_and(|name| name.contains(token)))
            .map(|run| RunRef {
                id: run.id,
                url: run.html_url,
            }))
    }

    async fn run_status(&self, repo: &Repo, run_id: u64) -> RemoteResult<RunSnapshot> {
        let url = self.url(repo, &format!("actions/runs/{run_id}"));
        let response = self.http.get(&url).header(ACCEPT, JSON_ACCEPT).send().await?;
        let run: RunRow = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok(RunSnapshot {
            status: run.status,
            conclusion: run.conclusion,
        })
    }

    async fn list_artifacts(
        &self,
        repo: &Repo,
        run_id: u64,
    ) -> RemoteResult<BTreeMap<String, ArtifactMeta>> {
        let url = self.url(repo, &format!("actions/runs/{run_id}/artifacts"));
        let response = self.http.get(&url).header(ACCEPT, JSON_ACCEPT).send().await?;
        let page: ArtifactsPage = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;

        Ok(page
            .artifacts
            .into_iter()
            .map(|row| {
                (
                    row.name.clone(),
                    ArtifactMeta {
                        id: row.id,
                        name: row.name,
                        size_bytes: row.size_in_bytes,
                        url: row.archive_download_url,
                    },
                )
            })
            .collect())
    }

    async fn download_file(
        &self,
        repo: &Repo,
        path: &str,
        git_ref: &str,
    ) -> RemoteResult<Option<Vec<u8>>> {
        let url = self.url(repo, &format!("contents/{path}?ref={git_ref}"));
        let response = self.http.get(&url).header(ACCEPT, RAW_ACCEPT).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = Self::check(response).await?.bytes().await?;
        Ok(Some(body.to_vec()))
    }

    async fn list_matching_refs(&self, repo: &Repo, prefix: &str) -> RemoteResult<Vec<RefInfo>> {
        // The endpoint takes the prefix without the leading `refs/`.
        let stripped = prefix.strip_prefix("refs/").unwrap_or(prefix);
        let url = self.url(repo, &format!("git/matching-refs/{stripped}"));
        let response = self.http.get(&url).header(ACCEPT, JSON_ACCEPT).send().await?;
        let rows: Vec<RefRow> = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok(rows
            .into_iter()
            .map(|row| RefInfo {
                name: row.name,
                sha: row.object.sha,
            })
            .collect())
    }
}

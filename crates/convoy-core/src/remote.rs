//! Abstract contract for the remote CI system.
//!
//! All calls may fail; failures surface as the calling node's Failure and a
//! companion flag on the job record, never as errors into the scheduler.

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::job::ArtifactMeta;
use crate::domain::package::Repo;

/// Errors from the remote CI endpoint.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Transport-level failure
    #[error("remote transport error: {0}")]
    Http(String),

    /// The endpoint answered with a non-success status
    #[error("remote api error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Response body could not be decoded
    #[error("remote decode error: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        RemoteError::Http(err.to_string())
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Reference to one remote run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRef {
    pub id: u64,
    pub url: Option<String>,
}

/// Status and conclusion of one remote run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSnapshot {
    /// e.g. `queued`, `in_progress`, `completed`.
    pub status: String,
    /// Set once `status` is `completed`.
    pub conclusion: Option<String>,
}

impl RunSnapshot {
    pub fn is_terminal(&self) -> bool {
        self.status == "completed"
    }
}

/// One ref matching a requested prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefInfo {
    /// Fully qualified ref name, e.g. `refs/tags/v1.4.0`.
    pub name: String,
    pub sha: String,
}

/// Remote CI operations the pipeline depends on.
#[async_trait]
pub trait RemoteJobClient: Send + Sync {
    /// Fire-and-forget dispatch; idempotency is carried in `inputs`.
    async fn trigger_job(
        &self,
        repo: &Repo,
        job_file: &str,
        inputs: &BTreeMap<String, String>,
        git_ref: &str,
    ) -> RemoteResult<()>;

    /// Search recent runs of `job_file` for one carrying `token`.
    async fn find_run_by_token(
        &self,
        repo: &Repo,
        job_file: &str,
        token: &str,
    ) -> RemoteResult<Option<RunRef>>;

    async fn run_status(&self, repo: &Repo, run_id: u64) -> RemoteResult<RunSnapshot>;

    async fn list_artifacts(
        &self,
        repo: &Repo,
        run_id: u64,
    ) -> RemoteResult<BTreeMap<String, ArtifactMeta>>;

    /// Raw file content at `git_ref`, or `None` if the path does not exist.
    async fn download_file(
        &self,
        repo: &Repo,
        path: &str,
        git_ref: &str,
    ) -> RemoteResult<Option<Vec<u8>>>;

    async fn list_matching_refs(&self, repo: &Repo, prefix: &str) -> RemoteResult<Vec<RefInfo>>;
}

//! In-memory fake of the remote CI system (testing only).

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::job::ArtifactMeta;
use crate::domain::package::Repo;
use crate::remote::{RefInfo, RemoteError, RemoteJobClient, RemoteResult, RunRef, RunSnapshot};

/// Scriptable fake remote with per-call counters.
///
/// Response queues pop front-to-back; an exhausted queue yields the
/// documented default (no run found, `completed`/`success` status).
#[derive(Default)]
pub struct FakeRemote {
    pub trigger_calls: AtomicUsize,
    pub find_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub artifact_calls: AtomicUsize,
    pub download_calls: AtomicUsize,
    pub ref_calls: AtomicUsize,

    fail_trigger: AtomicBool,

    find_responses: Mutex<VecDeque<Option<RunRef>>>,
    status_responses: Mutex<VecDeque<RunSnapshot>>,
    artifacts: Mutex<BTreeMap<String, ArtifactMeta>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    refs: Mutex<Vec<RefInfo>>,

    /// Tokens seen in trigger inputs, for exactly-once assertions.
    pub dispatched_tokens: Mutex<Vec<String>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_trigger(&self) {
        self.fail_trigger.store(true, Ordering::SeqCst);
    }

    pub fn push_find(&self, response: Option<RunRef>) {
        self.find_responses.lock().unwrap().push_back(response);
    }

    pub fn push_status(&self, status: &str, conclusion: Option<&str>) {
        self.status_responses.lock().unwrap().push_back(RunSnapshot {
            status: status.to_string(),
            conclusion: conclusion.map(str::to_string),
        });
    }

    pub fn add_artifact(&self, name: &str, size_bytes: u64) {
        let mut artifacts = self.artifacts.lock().unwrap();
        let id = artifacts.len() as u64 + 1;
        artifacts.insert(
            name.to_string(),
            ArtifactMeta {
                id,
                name: name.to_string(),
                size_bytes,
                url: None,
            },
        );
    }

    pub fn add_file(&self, path: &str, content: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_vec());
    }

    pub fn add_ref(&self, name: &str, sha: &str) {
        self.refs.lock().unwrap().push(RefInfo {
            name: name.to_string(),
            sha: sha.to_string(),
        });
    }
}

#[async_trait]
impl RemoteJobClient for FakeRemote {
    async fn trigger_job(
        &self,
        _repo: &Repo,
        _job_file: &str,
        inputs: &BTreeMap<String, String>,
        _git_ref: &str,
    ) -> RemoteResult<()> {
        self.trigger_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_trigger.swap(false, Ordering::SeqCst) {
            return Err(RemoteError::Api {
                status: 500,
                message: "scripted trigger failure".to_string(),
            });
        }
        if let Some(token) = inputs.get(crate::behaviors::TOKEN_INPUT) {
            self.dispatched_tokens.lock().unwrap().push(token.clone());
        }
        Ok(())
    }

    async fn find_run_by_token(
        &self,
        _repo: &Repo,
        _job_file: &str,
        _token: &str,
    ) -> RemoteResult<Option<RunRef>> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .find_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(None))
    }

    async fn run_status(&self, _repo: &Repo, _run_id: u64) -> RemoteResult<RunSnapshot> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .status_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(RunSnapshot {
                status: "completed".to_string(),
                conclusion: Some("success".to_string()),
            }))
    }

    async fn list_artifacts(
        &self,
        _repo: &Repo,
        _run_id: u64,
    ) -> RemoteResult<BTreeMap<String, ArtifactMeta>> {
        self.artifact_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.artifacts.lock().unwrap().clone())
    }

    async fn download_file(
        &self,
        _repo: &Repo,
        path: &str,
        _git_ref: &str,
    ) -> RemoteResult<Option<Vec<u8>>> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.files.lock().unwrap().get(path).cloned())
    }

    async fn list_matching_refs(&self, _repo: &Repo, prefix: &str) -> RemoteResult<Vec<RefInfo>> {
        self.ref_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .refs
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.name.starts_with(prefix))
            .cloned()
            .collect())
    }
}

//! Drives one pipeline run: lock, load, tick, persist, release.

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use convoy_engine::{Status, Ticker, TreeSnapshot};
use convoy_state::StateStore;

use crate::config::PipelineConfig;
use crate::domain::state::{PipelineState, StateHandles};
use crate::error::PipelineError;
use crate::plan::{build_release_tree, unlatch_stale_branches};
use crate::remote::RemoteJobClient;

/// State/lock key for a release identifier.
pub fn state_key(release_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(release_id.as_bytes());
    format!("release/{}", hex::encode(hasher.finalize()))
}

/// What one `run` invocation produced.
pub enum RunOutcome {
    /// Another run holds the release lock; a normal outcome, not an error.
    LockHeld,
    Completed(PipelineReport),
}

/// Final state of a driven (or previewed) pipeline.
pub struct PipelineReport {
    pub status: Status,
    pub tree: TreeSnapshot,
    pub state: PipelineState,
}

/// Owns one release pipeline end to end.
pub struct PipelineRunner {
    config: PipelineConfig,
    store: Arc<dyn StateStore>,
    remote: Arc<dyn RemoteJobClient>,
}

impl PipelineRunner {
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn StateStore>,
        remote: Arc<dyn RemoteJobClient>,
    ) -> Self {
        Self {
            config,
            store,
            remote,
        }
    }

    /// Run the pipeline to settlement.
    ///
    /// The advisory lock is held for the whole run and released on every
    /// exit path, including storage errors mid-run.
    pub async fn run(&self) -> Result<RunOutcome, PipelineError> {
        let key = state_key(&self.config.release_id);
        if !self.store.acquire_lock(&key).await? {
            info!(release = %self.config.release_id, "another run holds the lock");
            return Ok(RunOutcome::LockHeld);
        }
        let result = self.drive(&key).await;
        if let Err(e) = self.store.release_lock(&key).await {
            warn!(error = %e, "failed to release the run lock");
        }
        result.map(RunOutcome::Completed)
    }

    /// Build the tree from current state without ticking or locking.
    pub async fn preview(&self) -> Result<PipelineReport, PipelineError> {
        let key = state_key(&self.config.release_id);
        let handles = self.load(&key).await?;
        let tree = build_release_tree(&self.config, &handles, Arc::clone(&self.remote))?;
        Ok(PipelineReport {
            status: tree.status(),
            tree: tree.snapshot(),
            state: handles.snapshot(),
        })
    }

    async fn load(&self, key: &str) -> Result<StateHandles, PipelineError> {
        let mut state = match self.store.get(key).await? {
            Some(value) => serde_json::from_value(value)?,
            None => PipelineState::from_config(&self.config)?,
        };
        state.after_load(&self.config)?;
        let handles = state.into_handles();
        unlatch_stale_branches(&self.config, &handles);
        Ok(handles)
    }

    async fn drive(&self, key: &str) -> Result<PipelineReport, PipelineError> {
        let handles = self.load(key).await?;
        let tree = build_release_tree(&self.config, &handles, Arc::clone(&self.remote))?;

        info!(release = %self.config.release_id, "driving release plan");
        let mut ticker = Ticker::new(tree)
            .with_tick_interval(Duration::from_millis(self.config.tick_interval_ms));

        let store = Arc::clone(&self.store);
        let persisted = handles.clone();
        let key_owned = key.to_string();
        let status = ticker
            .settle_with(move |_| {
                let store = Arc::clone(&store);
                let handles = persisted.clone();
                let key = key_owned.clone();
                async move {
                    let value = serde_json::to_value(handles.snapshot())?;
                    store.put(&key, value).await?;
                    Ok::<(), PipelineError>(())
                }
            })
            .await?;

        info!(release = %self.config.release_id, %status, "release plan settled");
        Ok(PipelineReport {
            status,
            tree: ticker.snapshot(),
            state: handles.snapshot(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeRemote;
    use crate::remote::RunRef;
    use convoy_state::fakes::MemoryStateStore;
    use convoy_state::StateStore;

    fn config() -> PipelineConfig {
        toml::from_str(
            r#"
release_id = "2026.08"
tick_interval_ms = 5

[[packages]]
name = "core"
repo = "acme/core"
ref_prefix = "refs/tags/v"

[[packages.stages]]
name = "build"
job_file = "build.yml"
locate_delay_secs = 0
poll_interval_secs = 0
"#,
        )
        .unwrap()
    }

    fn happy_remote() -> Arc<FakeRemote> {
        let remote = Arc::new(FakeRemote::new());
        remote.add_ref("refs/tags/v1.4.0", "abc");
        remote.push_find(Some(RunRef { id: 9, url: None }));
        remote.push_status("completed", Some("success"));
        remote.add_artifact("core.tar.gz", 1024);
        remote
    }

    #[tokio::test]
    async fn test_run_settles_and_persists() {
        let store = Arc::new(MemoryStateStore::new());
        let runner = PipelineRunner::new(config(), store.clone(), happy_remote());

        let outcome = runner.run().await.unwrap();
        let report = match outcome {
            RunOutcome::Completed(report) => report,
            RunOutcome::LockHeld => panic!("lock unexpectedly held"),
        };
        assert_eq!(report.status, Status::Success);
        let job = &report.state.packages["core"].stages["build"];
        assert!(job.verdict.as_ref().unwrap().succeeded);

        // State was persisted under the derived key.
        let key = state_key("2026.08");
        let stored = store.get(&key).await.unwrap().unwrap();
        let restored: PipelineState = serde_json::from_value(stored).unwrap();
        assert_eq!(
            restored.packages["core"].stages["build"].run_id,
            Some(9)
        );
        // Lock was released.
        assert!(store.acquire_lock(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_contended_lock_is_a_normal_outcome() {
        let store = Arc::new(MemoryStateStore::new());
        let key = state_key("2026.08");
        assert!(store.acquire_lock(&key).await.unwrap());

        let runner = PipelineRunner::new(config(), store.clone(), happy_remote());
        assert!(matches!(runner.run().await.unwrap(), RunOutcome::LockHeld));
        // The foreign lock was not touched.
        assert!(!store.acquire_lock(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_second_run_reenters_without_new_dispatch() {
        let store = Arc::new(MemoryStateStore::new());
        let remote = happy_remote();
        let runner = PipelineRunner::new(config(), store.clone(), remote.clone());
        assert!(matches!(
            runner.run().await.unwrap(),
            RunOutcome::Completed(_)
        ));
        let triggers = remote
            .trigger_calls
            .load(std::sync::atomic::Ordering::SeqCst);
        assert_eq!(triggers, 1);

        // Re-run against persisted state: everything short-circuits.
        let outcome = runner.run().await.unwrap();
        match outcome {
            RunOutcome::Completed(report) => assert_eq!(report.status, Status::Success),
            RunOutcome::LockHeld => panic!("lock unexpectedly held"),
        }
        assert_eq!(
            remote
                .trigger_calls
                .load(std::sync::atomic::Ordering::SeqCst),
            triggers
        );
    }

    #[test]
    fn test_state_key_is_stable_and_hashed() {
        let key = state_key("2026.08");
        assert!(key.starts_with("release/"));
        assert_eq!(key, state_key("2026.08"));
        assert_ne!(key, state_key("2026.09"));
        // Hex sha256 tail.
        assert_eq!(key.len(), "release/".len() + 64);
    }
}

//! Leaf behaviors and goal fragments of the per-job state machine.
//!
//! Each fragment is authored independently as a [`Goal`] so it can be unit
//! tested and reused; the backchain linker stitches them into one plan per
//! stage. Fragments share the job and package records by reference and obey
//! the single-writer-per-field discipline: every fragment writes only the
//! fields it owns.
//!
//! Postcondition display names are load-bearing: the linker elides a
//! fragment's precondition when the preceding fragment's postcondition
//! carries the same name.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use convoy_engine::{Goal, Leaf, Node, OpHandle, OpState, Status, Tick};

use crate::domain::job::{JobRecord, JobVerdict};
use crate::domain::package::{PackageMeta, ReleaseChannel, Repo};
use crate::domain::Shared;
use crate::remote::{RefInfo, RemoteJobClient, RemoteResult, RunRef, RunSnapshot};

/// Input key carrying the idempotency token into the remote workflow.
pub const TOKEN_INPUT: &str = "convoy-token";

type Client = Arc<dyn RemoteJobClient>;

// ---- resolve target ref ------------------------------------------------

struct ResolveRef {
    client: Client,
    repo: Repo,
    prefix: String,
    meta: Shared<PackageMeta>,
    op: Option<OpHandle<RemoteResult<Vec<RefInfo>>>>,
}

impl Leaf for ResolveRef {
    fn initialise(&mut self, ctx: &mut Tick<'_>) {
        let client = Arc::clone(&self.client);
        let repo = self.repo.clone();
        let prefix = self.prefix.clone();
        self.op = Some(
            ctx.ops
                .submit(async move { client.list_matching_refs(&repo, &prefix).await }),
        );
    }

    fn update(&mut self, _ctx: &mut Tick<'_>) -> Status {
        match self.op.as_mut().map(OpHandle::try_take) {
            Some(OpState::Pending) => Status::Running,
            Some(OpState::Ready(Ok(refs))) => {
                // Highest ref under the prefix wins.
                match refs.into_iter().max_by(|a, b| a.name.cmp(&b.name)) {
                    Some(best) => {
                        debug!(target_ref = %best.name, "resolved release target");
                        self.meta.lock().unwrap().target_ref = Some(best.name);
                        Status::Success
                    }
                    None => {
                        warn!(prefix = %self.prefix, "no refs matched the release prefix");
                        Status::Failure
                    }
                }
            }
            Some(OpState::Ready(Err(e))) => {
                warn!(error = %e, "ref listing failed");
                Status::Failure
            }
            _ => Status::Failure,
        }
    }

    fn terminate(&mut self, _ctx: &mut Tick<'_>, _status: Status) {
        if let Some(op) = self.op.take() {
            op.cancel();
        }
    }
}

/// Fragment 1: ensure the release target ref is resolved.
pub fn resolve_goal(client: Client, prefix: &str, meta: &Shared<PackageMeta>) -> Node {
    let repo = meta.lock().unwrap().repo.clone();
    let check = Arc::clone(meta);
    Goal::new(
        "resolve target ref",
        Node::leaf(
            "list matching refs",
            ResolveRef {
                client,
                repo,
                prefix: prefix.to_string(),
                meta: Arc::clone(meta),
                op: None,
            },
        ),
    )
    .postcondition(Node::condition("target ref resolved", move || {
        check.lock().unwrap().target_ref.is_some()
    }))
    .build()
}

// ---- classify release channel ------------------------------------------

/// Fragment 2: ensure the release channel is classified. Pure function of
/// already-resolved state; completes within one tick.
pub fn classify_goal(meta: &Shared<PackageMeta>) -> Node {
    let check = Arc::clone(meta);
    let written = Arc::clone(meta);
    Goal::new(
        "classify release channel",
        Node::task("derive channel from ref", move || {
            let mut meta = written.lock().unwrap();
            let Some(target_ref) = meta.target_ref.clone() else {
                return Status::Failure;
            };
            let channel = ReleaseChannel::classify(&target_ref, meta.published_ref.as_deref());
            debug!(package = %meta.name, ?channel, "classified release channel");
            meta.channel = Some(channel);
            Status::Success
        }),
    )
    .postcondition(Node::condition("channel classified", move || {
        check.lock().unwrap().channel.is_some()
    }))
    .build()
}

// ---- trigger -----------------------------------------------------------

enum TriggerStep {
    Dispatched,
    Found(Option<RunRef>),
}

struct TriggerJob {
    client: Client,
    repo: Repo,
    job_file: String,
    job: Shared<JobRecord>,
    meta: Shared<PackageMeta>,
    git_ref: Option<String>,
    op: Option<OpHandle<RemoteResult<TriggerStep>>>,
}

impl TriggerJob {
    fn submit_dispatch(&mut self, ctx: &mut Tick<'_>, git_ref: String) {
        let client = Arc::clone(&self.client);
        let repo = self.repo.clone();
        let job_file = self.job_file.clone();
        let inputs = {
            let mut job = self.job.lock().unwrap();
            if let Some(token) = job.dispatch_token.clone() {
                job.inputs.insert(TOKEN_INPUT.to_string(), token);
            }
            job.inputs.clone()
        };
        self.op = Some(ctx.ops.submit(async move {
            client
                .trigger_job(&repo, &job_file, &inputs, &git_ref)
                .await
                .map(|()| TriggerStep::Dispatched)
        }));
    }
}

impl Leaf for TriggerJob {
    fn initialise(&mut self, ctx: &mut Tick<'_>) {
        self.git_ref = self.meta.lock().unwrap().target_ref.clone();
        let Some(git_ref) = self.git_ref.clone() else {
            self.op = None;
            return;
        };

        // A stamped token without a timestamp means a previous process may
        // have died between the remote call and persistence. Search for a
        // run carrying that token and adopt it before considering a
        // re-dispatch, so the remote job is never duplicated.
        let adopt_token = {
            let job = self.job.lock().unwrap();
            match (&job.dispatch_token, job.dispatched_at) {
                (Some(token), None) => Some(token.clone()),
                _ => None,
            }
        };

        if let Some(token) = adopt_token {
            let client = Arc::clone(&self.client);
            let repo = self.repo.clone();
            let job_file = self.job_file.clone();
            self.op = Some(ctx.ops.submit(async move {
                client
                    .find_run_by_token(&repo, &job_file, &token)
                    .await
                    .map(TriggerStep::Found)
            }));
            return;
        }

        // Fresh dispatch: stamp the token and issue the call in the same
        // activation so a token never exists without an attempted call.
        self.job.lock().unwrap().dispatch_token = Some(Uuid::new_v4().to_string());
        self.submit_dispatch(ctx, git_ref);
    }

    fn update(&mut self, ctx: &mut Tick<'_>) -> Status {
        let Some(op) = self.op.as_mut() else {
            warn!("trigger ticked without a resolved target ref");
            return Status::Failure;
        };
        match op.try_take() {
            OpState::Pending => Status::Running,
            OpState::Ready(Ok(TriggerStep::Dispatched)) => {
                let mut job = self.job.lock().unwrap();
                job.dispatched_at = Some(Utc::now());
                debug!(stage = %job.stage, "job dispatched");
                Status::Success
            }
            OpState::Ready(Ok(TriggerStep::Found(Some(run)))) => {
                let mut job = self.job.lock().unwrap();
                job.run_id = Some(run.id);
                job.dispatched_at = Some(Utc::now());
                debug!(stage = %job.stage, run_id = run.id, "adopted existing run");
                Status::Success
            }
            OpState::Ready(Ok(TriggerStep::Found(None))) => {
                // No run carries the orphaned token; dispatch with it now.
                match self.git_ref.clone() {
                    Some(git_ref) => {
                        self.submit_dispatch(ctx, git_ref);
                        Status::Running
                    }
                    None => Status::Failure,
                }
            }
            OpState::Ready(Err(e)) => {
                let mut job = self.job.lock().unwrap();
                warn!(stage = %job.stage, error = %e, "trigger failed");
                job.ephemeral.trigger_failed = true;
                Status::Failure
            }
            OpState::Gone => Status::Failure,
        }
    }

    fn terminate(&mut self, _ctx: &mut Tick<'_>, _status: Status) {
        if let Some(op) = self.op.take() {
            op.cancel();
        }
    }
}

/// Fragment 3: ensure the stage's remote job has been dispatched.
///
/// The precondition varies by stage: the first stage gates on the resolved
/// ref, later stages additionally gate on the previous stage's verdict.
pub fn trigger_goal(
    client: Client,
    job: &Shared<JobRecord>,
    meta: &Shared<PackageMeta>,
    precondition: Node,
) -> Node {
    let repo = meta.lock().unwrap().repo.clone();
    let job_file = job.lock().unwrap().job_file.clone();
    let check = Arc::clone(job);
    Goal::new(
        "trigger job",
        Node::leaf(
            "dispatch workflow",
            TriggerJob {
                client,
                repo,
                job_file,
                job: Arc::clone(job),
                meta: Arc::clone(meta),
                git_ref: None,
                op: None,
            },
        ),
    )
    .postcondition(Node::condition("dispatched", move || {
        check.lock().unwrap().dispatched_at.is_some()
    }))
    .precondition(precondition)
    .build()
}

/// Standard first-stage trigger precondition.
pub fn ref_resolved_condition(meta: &Shared<PackageMeta>) -> Node {
    let check = Arc::clone(meta);
    Node::condition("target ref resolved", move || {
        check.lock().unwrap().target_ref.is_some()
    })
}

/// Later-stage trigger precondition: the previous stage produced a
/// successful verdict.
pub fn verdict_ok_condition(label: &str, previous: &Shared<JobRecord>) -> Node {
    let check = Arc::clone(previous);
    Node::condition(format!("{label} verdict ok"), move || {
        check
            .lock()
            .unwrap()
            .verdict
            .as_ref()
            .is_some_and(|v| v.succeeded)
    })
}

// ---- locate run --------------------------------------------------------

struct LocateRun {
    client: Client,
    repo: Repo,
    job: Shared<JobRecord>,
    delay: Duration,
    op: Option<OpHandle<RemoteResult<Option<RunRef>>>>,
}

impl Leaf for LocateRun {
    fn initialise(&mut self, ctx: &mut Tick<'_>) {
        let (job_file, token) = {
            let job = self.job.lock().unwrap();
            (job.job_file.clone(), job.dispatch_token.clone())
        };
        let Some(token) = token else {
            self.op = None;
            return;
        };
        let client = Arc::clone(&self.client);
        let repo = self.repo.clone();
        let delay = self.delay;
        // The remote system may lag before a fresh run becomes listable.
        self.op = Some(ctx.ops.submit(async move {
            tokio::time::sleep(delay).await;
            client.find_run_by_token(&repo, &job_file, &token).await
        }));
    }

    fn update(&mut self, _ctx: &mut Tick<'_>) -> Status {
        match self.op.as_mut().map(OpHandle::try_take) {
            Some(OpState::Pending) => Status::Running,
            Some(OpState::Ready(Ok(Some(run)))) => {
                let mut job = self.job.lock().unwrap();
                job.run_id = Some(run.id);
                job.ephemeral.locate_failed = false;
                debug!(stage = %job.stage, run_id = run.id, "located dispatched run");
                Status::Success
            }
            Some(OpState::Ready(Ok(None))) => {
                self.job.lock().unwrap().ephemeral.locate_failed = true;
                Status::Failure
            }
            Some(OpState::Ready(Err(e))) => {
                let mut job = self.job.lock().unwrap();
                warn!(stage = %job.stage, error = %e, "run listing failed");
                job.ephemeral.locate_failed = true;
                Status::Failure
            }
            _ => Status::Failure,
        }
    }

    fn terminate(&mut self, _ctx: &mut Tick<'_>, _status: Status) {
        if let Some(op) = self.op.take() {
            op.cancel();
        }
    }
}

/// Fragment 4: ensure the dispatched run's identifier is known. The action
/// is retried a bounded number of times with a delay per attempt.
pub fn locate_goal(
    client: Client,
    job: &Shared<JobRecord>,
    meta: &Shared<PackageMeta>,
    attempts: u32,
    delay: Duration,
) -> Node {
    let repo = meta.lock().unwrap().repo.clone();
    let post = Arc::clone(job);
    let pre = Arc::clone(job);
    Goal::new(
        "locate run",
        Node::retry(
            "locate attempts",
            attempts,
            Node::leaf(
                "search runs by token",
                LocateRun {
                    client,
                    repo,
                    job: Arc::clone(job),
                    delay,
                    op: None,
                },
            ),
        ),
    )
    .postcondition(Node::condition("run located", move || {
        post.lock().unwrap().run_id.is_some()
    }))
    .precondition(Node::condition("dispatched", move || {
        pre.lock().unwrap().dispatched_at.is_some()
    }))
    .build()
}

// ---- await conclusion --------------------------------------------------

struct AwaitConclusion {
    client: Client,
    repo: Repo,
    job: Shared<JobRecord>,
    poll_interval: Duration,
    op: Option<OpHandle<RemoteResult<RunSnapshot>>>,
}

impl AwaitConclusion {
    fn submit_poll(&mut self, ctx: &mut Tick<'_>, run_id: u64) {
        let client = Arc::clone(&self.client);
        let repo = self.repo.clone();
        let interval = self.poll_interval;
        self.op = Some(ctx.ops.submit(async move {
            tokio::time::sleep(interval).await;
            client.run_status(&repo, run_id).await
        }));
    }
}

impl Leaf for AwaitConclusion {
    fn initialise(&mut self, ctx: &mut Tick<'_>) {
        let run_id = self.job.lock().unwrap().run_id;
        match run_id {
            Some(run_id) => self.submit_poll(ctx, run_id),
            None => self.op = None,
        }
    }

    fn update(&mut self, ctx: &mut Tick<'_>) -> Status {
        let Some(op) = self.op.as_mut() else {
            return Status::Failure;
        };
        match op.try_take() {
            OpState::Pending => Status::Running,
            OpState::Ready(Ok(snapshot)) => {
                let run_id = {
                    let mut job = self.job.lock().unwrap();
                    job.run_status = Some(snapshot.status.clone());
                    if snapshot.is_terminal() {
                        job.conclusion = Some(
                            snapshot
                                .conclusion
                                .unwrap_or_else(|| "unknown".to_string()),
                        );
                        debug!(stage = %job.stage, conclusion = ?job.conclusion, "run concluded");
                        return Status::Success;
                    }
                    job.run_id
                };
                match run_id {
                    Some(run_id) => {
                        self.submit_poll(ctx, run_id);
                        Status::Running
                    }
                    None => Status::Failure,
                }
            }
            OpState::Ready(Err(e)) => {
                warn!(error = %e, "run status poll failed");
                Status::Failure
            }
            OpState::Gone => Status::Failure,
        }
    }

    fn terminate(&mut self, _ctx: &mut Tick<'_>, _status: Status) {
        if let Some(op) = self.op.take() {
            op.cancel();
        }
    }
}

/// Fragment 5: ensure the run reached a terminal conclusion, bounded by an
/// overall wall-clock budget that marks the job timed-out on expiry.
pub fn await_goal(
    client: Client,
    job: &Shared<JobRecord>,
    meta: &Shared<PackageMeta>,
    poll_interval: Duration,
    budget: Duration,
) -> Node {
    let repo = meta.lock().unwrap().repo.clone();
    let post = Arc::clone(job);
    let pre = Arc::clone(job);
    let flagged = Arc::clone(job);
    let inner = Goal::new(
        "await conclusion",
        Node::leaf(
            "poll run status",
            AwaitConclusion {
                client,
                repo,
                job: Arc::clone(job),
                poll_interval,
                op: None,
            },
        ),
    )
    .postcondition(Node::condition("run concluded", move || {
        post.lock().unwrap().concluded()
    }))
    .precondition(Node::condition("run located", move || {
        pre.lock().unwrap().run_id.is_some()
    }))
    .build();

    Node::timeout(
        "await within budget",
        budget,
        move || flagged.lock().unwrap().ephemeral.timed_out = true,
        inner,
    )
}

// ---- collect artifacts -------------------------------------------------

struct CollectArtifacts {
    client: Client,
    repo: Repo,
    job: Shared<JobRecord>,
    op: Option<OpHandle<RemoteResult<BTreeMap<String, crate::domain::job::ArtifactMeta>>>>,
}

impl Leaf for CollectArtifacts {
    fn initialise(&mut self, ctx: &mut Tick<'_>) {
        let Some(run_id) = self.job.lock().unwrap().run_id else {
            self.op = None;
            return;
        };
        let client = Arc::clone(&self.client);
        let repo = self.repo.clone();
        self.op = Some(
            ctx.ops
                .submit(async move { client.list_artifacts(&repo, run_id).await }),
        );
    }

    fn update(&mut self, _ctx: &mut Tick<'_>) -> Status {
        match self.op.as_mut().map(OpHandle::try_take) {
            Some(OpState::Pending) => Status::Running,
            Some(OpState::Ready(Ok(artifacts))) => {
                let mut job = self.job.lock().unwrap();
                debug!(stage = %job.stage, count = artifacts.len(), "collected artifacts");
                // An empty map still marks the fetch as done.
                job.artifacts = Some(artifacts);
                Status::Success
            }
            Some(OpState::Ready(Err(e))) => {
                let mut job = self.job.lock().unwrap();
                warn!(stage = %job.stage, error = %e, "artifact listing failed");
                job.ephemeral.collect_failed = true;
                Status::Failure
            }
            _ => Status::Failure,
        }
    }

    fn terminate(&mut self, _ctx: &mut Tick<'_>, _status: Status) {
        if let Some(op) = self.op.take() {
            op.cancel();
        }
    }
}

/// Fragment 6: ensure the run's artifacts have been fetched, gated on a
/// successful conclusion.
pub fn collect_goal(client: Client, job: &Shared<JobRecord>, meta: &Shared<PackageMeta>) -> Node {
    let repo = meta.lock().unwrap().repo.clone();
    let post = Arc::clone(job);
    let pre = Arc::clone(job);
    Goal::new(
        "collect artifacts",
        Node::leaf(
            "list run artifacts",
            CollectArtifacts {
                client,
                repo,
                job: Arc::clone(job),
                op: None,
            },
        ),
    )
    .postcondition(Node::condition("artifacts fetched", move || {
        post.lock().unwrap().artifacts.is_some()
    }))
    .precondition(Node::condition("run succeeded", move || {
        pre.lock().unwrap().succeeded()
    }))
    .build()
}

// ---- extract verdict ---------------------------------------------------

struct ExtractVerdict {
    client: Client,
    repo: Repo,
    job: Shared<JobRecord>,
    meta: Shared<PackageMeta>,
    version_file: Option<String>,
    op: Option<OpHandle<RemoteResult<Option<Vec<u8>>>>>,
}

impl ExtractVerdict {
    fn finalise(&self, attachment: Option<Vec<u8>>) -> Status {
        let mut job = self.job.lock().unwrap();
        let conclusion = job.conclusion.clone().unwrap_or_else(|| "unknown".into());
        let artifact_names: Vec<String> = job
            .artifacts
            .as_ref()
            .map(|a| a.keys().cloned().collect())
            .unwrap_or_default();
        let mut details = serde_json::json!({ "artifacts": artifact_names });
        if let Some(bytes) = attachment {
            details["version_file"] =
                serde_json::Value::String(String::from_utf8_lossy(&bytes).trim().to_string());
        }
        job.verdict = Some(JobVerdict {
            succeeded: conclusion == "success",
            summary: format!(
                "{conclusion} with {} artifact(s)",
                job.artifacts.as_ref().map_or(0, |a| a.len())
            ),
            details: Some(details),
        });
        debug!(stage = %job.stage, "verdict extracted");
        Status::Success
    }
}

impl Leaf for ExtractVerdict {
    fn initialise(&mut self, ctx: &mut Tick<'_>) {
        self.op = None;
        let Some(path) = self.version_file.clone() else {
            return;
        };
        let Some(git_ref) = self.meta.lock().unwrap().target_ref.clone() else {
            return;
        };
        let client = Arc::clone(&self.client);
        let repo = self.repo.clone();
        self.op = Some(
            ctx.ops
                .submit(async move { client.download_file(&repo, &path, &git_ref).await }),
        );
    }

    fn update(&mut self, _ctx: &mut Tick<'_>) -> Status {
        match self.op.as_mut().map(OpHandle::try_take) {
            None => self.finalise(None),
            Some(OpState::Pending) => Status::Running,
            Some(OpState::Ready(Ok(body))) => self.finalise(body),
            Some(OpState::Ready(Err(e))) => {
                warn!(error = %e, "version file download failed");
                Status::Failure
            }
            Some(OpState::Gone) => Status::Failure,
        }
    }

    fn terminate(&mut self, _ctx: &mut Tick<'_>, _status: Status) {
        if let Some(op) = self.op.take() {
            op.cancel();
        }
    }
}

/// Fragment 7: ensure a structured verdict is derived from the conclusion
/// and artifacts, attaching the configured version file when present.
pub fn extract_goal(
    client: Client,
    job: &Shared<JobRecord>,
    meta: &Shared<PackageMeta>,
    version_file: Option<&str>,
) -> Node {
    let repo = meta.lock().unwrap().repo.clone();
    let post = Arc::clone(job);
    let pre = Arc::clone(job);
    Goal::new(
        "extract verdict",
        Node::leaf(
            "derive verdict",
            ExtractVerdict {
                client,
                repo,
                job: Arc::clone(job),
                meta: Arc::clone(meta),
                version_file: version_file.map(str::to_string),
                op: None,
            },
        ),
    )
    .postcondition(Node::condition("verdict extracted", move || {
        post.lock().unwrap().verdict.is_some()
    }))
    .precondition(Node::condition("artifacts fetched", move || {
        pre.lock().unwrap().artifacts.is_some()
    }))
    .build()
}

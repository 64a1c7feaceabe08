//! Plan assembly: per-stage chains, per-package branches, the release tree.
//!
//! A stage chain is the seven-fragment per-job state machine linked in
//! effect order. A package branch wraps its stage chains in the
//! needs-release guard and latches its outcome into the package metadata so
//! sibling branches can observe it. The root combines all branches under a
//! parallel barrier.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::debug;

use convoy_engine::{link_all, Leaf, Node, Status, Tick};

use crate::behaviors::{
    await_goal, classify_goal, collect_goal, extract_goal, locate_goal, ref_resolved_condition,
    resolve_goal, trigger_goal, verdict_ok_condition,
};
use crate::config::{PackageConfig, PipelineConfig, StageConfig};
use crate::domain::package::PackageMeta;
use crate::domain::state::{PackageHandles, StateHandles};
use crate::domain::Shared;
use crate::error::PipelineError;
use crate::remote::RemoteJobClient;

/// Waits for a sibling package's branch to settle. Running while the
/// sibling is undecided, then mirrors its latched outcome.
struct AwaitDependency {
    dep: Shared<PackageMeta>,
}

impl Leaf for AwaitDependency {
    fn update(&mut self, _ctx: &mut Tick<'_>) -> Status {
        match self.dep.lock().unwrap().branch_outcome {
            None => Status::Running,
            Some(Status::Success) => Status::Success,
            Some(_) => Status::Failure,
        }
    }
}

/// Build the full release tree for one run.
pub fn build_release_tree(
    config: &PipelineConfig,
    handles: &StateHandles,
    client: Arc<dyn RemoteJobClient>,
) -> Result<Node, PipelineError> {
    let mut branches = Vec::with_capacity(config.packages.len());
    for pkg in &config.packages {
        let package = handles.package(&pkg.name).ok_or_else(|| {
            PipelineError::Config(format!("no state for configured package {}", pkg.name))
        })?;
        branches.push(package_branch(config, pkg, package, handles, Arc::clone(&client))?);
    }
    Ok(Node::parallel(
        format!("release {}", config.release_id),
        branches,
    ))
}

/// Revisit persisted branch decisions before a fresh run: a latched failure
/// is cleared so the run retries it, and a branch whose jobs went stale is
/// unlatched so the reset action can reach them.
pub fn unlatch_stale_branches(config: &PipelineConfig, handles: &StateHandles) {
    let stale_after = chrono::Duration::hours(config.stale_after_hours as i64);
    let now = Utc::now();
    for (name, package) in &handles.packages {
        let mut meta = package.meta.lock().unwrap();
        let latched = match meta.branch_outcome {
            Some(status) => status,
            None => continue,
        };
        let any_stale = package
            .stages
            .values()
            .any(|job| job.lock().unwrap().is_stale(stale_after, now));
        if latched != Status::Success || any_stale {
            debug!(package = %name, ?latched, "unlatching branch outcome");
            meta.branch_outcome = None;
        }
    }
}

fn package_branch(
    config: &PipelineConfig,
    pkg: &PackageConfig,
    package: &PackageHandles,
    handles: &StateHandles,
    client: Arc<dyn RemoteJobClient>,
) -> Result<Node, PipelineError> {
    let meta = &package.meta;

    let mut steps = Vec::new();
    for dep in &pkg.depends_on {
        let dep_meta = handles
            .package(dep)
            .map(|p| Arc::clone(&p.meta))
            .ok_or_else(|| {
                PipelineError::Config(format!("{} depends on unknown package {dep}", pkg.name))
            })?;
        steps.push(Node::leaf(
            format!("await {dep}"),
            AwaitDependency { dep: dep_meta },
        ));
    }

    steps.push(reset_stale_jobs(config, pkg, package));

    let mut previous: Option<(&StageConfig, Shared<crate::domain::job::JobRecord>)> = None;
    for (idx, stage) in pkg.stages.iter().enumerate() {
        let job = package.stages.get(&stage.name).cloned().ok_or_else(|| {
            PipelineError::Config(format!(
                "no state for stage {} of package {}",
                stage.name, pkg.name
            ))
        })?;
        steps.push(stage_chain(
            pkg,
            stage,
            idx,
            &job,
            meta,
            previous.as_ref().map(|(cfg, job)| (cfg.name.as_str(), job)),
            Arc::clone(&client),
        )?);
        previous = Some((stage, job));
    }

    let work = Node::sequence(format!("{} stages", pkg.name), false, steps);

    let release_check = Arc::clone(meta);
    let guarded = Node::selector(
        format!("release {}", pkg.name),
        false,
        vec![
            Node::inverter(
                "no release needed",
                Node::condition("needs release", move || {
                    release_check.lock().unwrap().needs_release()
                }),
            ),
            work,
        ],
    );

    let read_slot = Arc::clone(meta);
    let write_slot = Arc::clone(meta);
    Ok(Node::cache(
        format!("{} outcome", pkg.name),
        move || read_slot.lock().unwrap().branch_outcome,
        move |status| write_slot.lock().unwrap().branch_outcome = Some(status),
        guarded,
    ))
}

/// Single-tick action that returns stale jobs to defaults. A reset stage
/// cascades to every later stage, since their inputs derive from it.
fn reset_stale_jobs(config: &PipelineConfig, pkg: &PackageConfig, package: &PackageHandles) -> Node {
    let stale_after = chrono::Duration::hours(config.stale_after_hours as i64);
    let jobs: Vec<Shared<crate::domain::job::JobRecord>> = pkg
        .stages
        .iter()
        .filter_map(|stage| package.stages.get(&stage.name).cloned())
        .collect();
    Node::task("reset stale jobs", move || {
        let now = Utc::now();
        let mut cascade = false;
        for job in &jobs {
            let mut job = job.lock().unwrap();
            if cascade || job.is_stale(stale_after, now) {
                debug!(stage = %job.stage, "resetting stale job record");
                job.reset();
                cascade = true;
            }
        }
        Status::Success
    })
}

#[allow(clippy::too_many_arguments)]
fn stage_chain(
    pkg: &PackageConfig,
    stage: &StageConfig,
    idx: usize,
    job: &Shared<crate::domain::job::JobRecord>,
    meta: &Shared<PackageMeta>,
    previous: Option<(&str, &Shared<crate::domain::job::JobRecord>)>,
    client: Arc<dyn RemoteJobClient>,
) -> Result<Node, PipelineError> {
    let trigger_pre = match previous {
        Some((prev_name, prev_job)) => verdict_ok_condition(prev_name, prev_job),
        None => ref_resolved_condition(meta),
    };

    let mut fragments = vec![
        extract_goal(
            Arc::clone(&client),
            job,
            meta,
            pkg.version_file.as_deref(),
        ),
        collect_goal(Arc::clone(&client), job, meta),
        await_goal(
            Arc::clone(&client),
            job,
            meta,
            Duration::from_secs(stage.poll_interval_secs),
            Duration::from_secs(stage.timeout_secs),
        ),
        locate_goal(
            Arc::clone(&client),
            job,
            meta,
            stage.locate_attempts,
            Duration::from_secs(stage.locate_delay_secs),
        ),
        trigger_goal(Arc::clone(&client), job, meta, trigger_pre),
    ];

    // The first stage also resolves the target ref and classifies the
    // channel; later stages inherit both from the package metadata.
    if idx == 0 {
        fragments.push(classify_goal(meta));
        fragments.push(resolve_goal(Arc::clone(&client), &pkg.ref_prefix, meta));
    }

    let chain = link_all(fragments)?;
    Ok(chain)
}

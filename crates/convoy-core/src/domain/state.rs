//! Whole-pipeline persisted state and its shared runtime handles.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::domain::job::{JobRecord, StepFlags};
use crate::domain::package::{PackageKind, PackageMeta, Repo};
use crate::domain::{shared, Shared};
use crate::error::PipelineError;

/// Persisted state of one package: its metadata plus one job per stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageState {
    pub meta: PackageMeta,
    pub stages: BTreeMap<String, JobRecord>,
}

/// The full persisted record, round-tripped through the state store as JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineState {
    pub packages: BTreeMap<String, PackageState>,
}

impl PipelineState {
    /// Seed a fresh state from configuration.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let mut packages = BTreeMap::new();
        for pkg in &config.packages {
            let repo: Repo = pkg
                .repo
                .parse()
                .map_err(PipelineError::Config)?;
            let meta = PackageMeta::new(&pkg.name, repo, pkg.kind);
            let mut stages = BTreeMap::new();
            for stage in &pkg.stages {
                stages.insert(
                    stage.name.clone(),
                    JobRecord::new(&stage.name, &stage.job_file, stage.inputs.clone()),
                );
            }
            packages.insert(pkg.name.clone(), PackageState { meta, stages });
        }
        Ok(Self { packages })
    }

    /// Reconcile a loaded state with the current configuration: new
    /// packages or stages appear, ephemeral flags are cleared. Stages
    /// removed from configuration keep their records untouched.
    pub fn after_load(&mut self, config: &PipelineConfig) -> Result<(), PipelineError> {
        let seeded = Self::from_config(config)?;
        for (name, fresh) in seeded.packages {
            match self.packages.get_mut(&name) {
                Some(existing) => {
                    for (stage, job) in fresh.stages {
                        existing.stages.entry(stage).or_insert(job);
                    }
                }
                None => {
                    self.packages.insert(name, fresh);
                }
            }
        }
        for package in self.packages.values_mut() {
            for job in package.stages.values_mut() {
                job.ephemeral = StepFlags::default();
            }
        }
        Ok(())
    }

    /// Hand the records out as shared references for constructor injection.
    pub fn into_handles(self) -> StateHandles {
        let packages = self
            .packages
            .into_iter()
            .map(|(name, state)| {
                let stages = state
                    .stages
                    .into_iter()
                    .map(|(stage, job)| (stage, shared(job)))
                    .collect();
                (
                    name,
                    PackageHandles {
                        meta: shared(state.meta),
                        stages,
                    },
                )
            })
            .collect();
        StateHandles { packages }
    }
}

/// Shared runtime handles for one package.
#[derive(Clone)]
pub struct PackageHandles {
    pub meta: Shared<PackageMeta>,
    pub stages: BTreeMap<String, Shared<JobRecord>>,
}

/// Shared runtime handles for the whole pipeline.
///
/// Leaves mutate these during ticks; [`StateHandles::snapshot`] folds them
/// back into a [`PipelineState`] for persistence after every tick.
#[derive(Clone, Default)]
pub struct StateHandles {
    pub packages: BTreeMap<String, PackageHandles>,
}

impl StateHandles {
    pub fn package(&self, name: &str) -> Option<&PackageHandles> {
        self.packages.get(name)
    }

    pub fn snapshot(&self) -> PipelineState {
        let packages = self
            .packages
            .iter()
            .map(|(name, handles)| {
                let stages = handles
                    .stages
                    .iter()
                    .map(|(stage, job)| (stage.clone(), job.lock().unwrap().clone()))
                    .collect();
                (
                    name.clone(),
                    PackageState {
                        meta: handles.meta.lock().unwrap().clone(),
                        stages,
                    },
                )
            })
            .collect();
        PipelineState { packages }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> PipelineConfig {
        toml::from_str(
            r#"
release_id = "2026.08"

[[packages]]
name = "core"
repo = "acme/core"
ref_prefix = "refs/tags/v"

[[packages.stages]]
name = "build"
job_file = "build.yml"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_seed_from_config() {
        let state = PipelineState::from_config(&sample_config()).unwrap();
        let core = &state.packages["core"];
        assert_eq!(core.meta.repo.to_string(), "acme/core");
        assert!(core.stages.contains_key("build"));
    }

    #[test]
    fn test_after_load_clears_ephemeral_and_adds_new_stages() {
        let config = sample_config();
        let mut state = PipelineState::from_config(&config).unwrap();
        {
            let job = state
                .packages
                .get_mut("core")
                .unwrap()
                .stages
                .get_mut("build")
                .unwrap();
            job.ephemeral.timed_out = true;
            job.conclusion = Some("success".to_string());
        }

        let mut richer = config.clone();
        richer.packages[0].stages.push(crate::config::StageConfig {
            name: "publish".to_string(),
            job_file: "publish.yml".to_string(),
            inputs: BTreeMap::new(),
            timeout_secs: 600,
            locate_attempts: 5,
            locate_delay_secs: 5,
            poll_interval_secs: 10,
        });

        state.after_load(&richer).unwrap();
        let core = &state.packages["core"];
        // Persisted progress survives, ephemeral flags do not.
        assert_eq!(core.stages["build"].conclusion.as_deref(), Some("success"));
        assert!(!core.stages["build"].ephemeral.timed_out);
        assert!(core.stages.contains_key("publish"));
    }

    #[test]
    fn test_handles_roundtrip() {
        let state = PipelineState::from_config(&sample_config()).unwrap();
        let handles = state.into_handles();
        handles.packages["core"]
            .stages["build"]
            .lock()
            .unwrap()
            .run_id = Some(42);

        let snapshot = handles.snapshot();
        assert_eq!(snapshot.packages["core"].stages["build"].run_id, Some(42));

        let json = serde_json::to_value(&snapshot).unwrap();
        let restored: PipelineState = serde_json::from_value(json).unwrap();
        assert_eq!(
            restored.packages["core"].stages["build"].run_id,
            Some(42)
        );
    }
}

//! TOML pipeline configuration.
//!
//! A config file declares the release identifier, the storage backend, the
//! remote credentials source, and one entry per package with its ordered
//! stages. Loaded once at startup; the runner treats it as immutable.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::package::PackageKind;
use crate::error::PipelineError;

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Release identifier; also the basis of the state/lock key.
    pub release_id: String,

    /// Pause between ticks when the tree is running with nothing outstanding.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Age after which a dispatched-but-never-located job is reset.
    #[serde(default = "default_stale_after_hours")]
    pub stale_after_hours: u64,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub remote: RemoteConfig,

    pub packages: Vec<PackageConfig>,
}

/// Storage backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `memory` for ephemeral runs, `surreal` for persistent state.
    #[serde(default = "default_backend")]
    pub backend: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
        }
    }
}

/// Remote CI endpoint configuration. The token itself comes from the
/// environment and is never written to config or logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Name of the environment variable holding the API token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            token_env: default_token_env(),
        }
    }
}

/// One releasable package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageConfig {
    pub name: String,

    /// Repository in `owner/name` form.
    pub repo: String,

    #[serde(default)]
    pub kind: PackageKind,

    /// Ref prefix used to resolve the release target, e.g. `refs/tags/v`.
    pub ref_prefix: String,

    /// Optional repo path whose content is attached to the final verdict.
    #[serde(default)]
    pub version_file: Option<String>,

    /// Package names whose branches must settle before this one starts.
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Stages in execution order; the first stage's chain also carries the
    /// ref resolution and channel classification fragments.
    pub stages: Vec<StageConfig>,
}

/// One remote CI stage of a package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    pub name: String,

    /// Workflow definition file in the target repository.
    pub job_file: String,

    /// Static inputs passed to every dispatch of this stage.
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,

    /// Overall wall-clock budget for awaiting the run's conclusion.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempts to find the dispatched run before giving up.
    #[serde(default = "default_locate_attempts")]
    pub locate_attempts: u32,

    /// Delay before each run-listing attempt.
    #[serde(default = "default_locate_delay_secs")]
    pub locate_delay_secs: u64,

    /// Pause between run-status polls.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_tick_interval_ms() -> u64 {
    500
}

fn default_stale_after_hours() -> u64 {
    12
}

fn default_backend() -> String {
    "surreal".to_string()
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

fn default_timeout_secs() -> u64 {
    1800
}

fn default_locate_attempts() -> u32 {
    5
}

fn default_locate_delay_secs() -> u64 {
    5
}

fn default_poll_interval_secs() -> u64 {
    10
}

impl PipelineConfig {
    /// Load and validate a config file.
    pub fn from_path(path: &Path) -> Result<Self, PipelineError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: PipelineConfig = toml::from_str(&raw)
            .map_err(|e| PipelineError::Config(format!("cannot parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), PipelineError> {
        if self.release_id.is_empty() {
            return Err(PipelineError::Config("release_id must not be empty".into()));
        }
        if self.packages.is_empty() {
            return Err(PipelineError::Config(
                "at least one package is required".into(),
            ));
        }
        for package in &self.packages {
            if package.stages.is_empty() {
                return Err(PipelineError::Config(format!(
                    "package {} declares no stages",
                    package.name
                )));
            }
            for dep in &package.depends_on {
                if !self.packages.iter().any(|p| &p.name == dep) {
                    return Err(PipelineError::Config(format!(
                        "package {} depends on unknown package {dep}",
                        package.name
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn package(&self, name: &str) -> Option<&PackageConfig> {
        self.packages.iter().find(|p| p.name == name)
    }
}

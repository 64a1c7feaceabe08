//! Convoy Core: the release-pipeline domain.
//!
//! Everything between the behavior-tree engine and the CLI lives here:
//!
//! - domain records (`JobRecord`, `PackageMeta`, `PipelineState`) shared by
//!   reference into the plan's leaves
//! - the `RemoteJobClient` contract with its GitHub Actions implementation
//!   and a scriptable fake
//! - the seven per-job goal fragments and the plan assembly that chains
//!   them per stage, guards them per package, and joins packages under a
//!   parallel barrier
//! - `PipelineRunner`: lock, load, tick, persist after every tick, release
//! - TOML configuration and tracing setup

pub mod behaviors;
pub mod config;
pub mod domain;
pub mod error;
pub mod fakes;
pub mod github;
pub mod plan;
pub mod remote;
pub mod report;
pub mod runner;
pub mod telemetry;

pub use convoy_engine::Status;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use github::GithubClient;
pub use remote::{RemoteError, RemoteJobClient};
pub use report::render_report;
pub use runner::{state_key, PipelineReport, PipelineRunner, RunOutcome};

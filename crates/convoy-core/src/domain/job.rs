//! The per-stage remote CI run record.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Metadata of one artifact produced by a remote run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    pub id: u64,
    pub name: String,
    pub size_bytes: u64,
    #[serde(default)]
    pub url: Option<String>,
}

/// Structured outcome extracted once a run has concluded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobVerdict {
    pub succeeded: bool,
    pub summary: String,
    /// Optional payload, e.g. the content of the configured version file.
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

/// Per-step outcome flags for diagnosis.
///
/// Serialized with the record but cleared on every state reload; they
/// describe what happened within one process lifetime, not durable facts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFlags {
    #[serde(default)]
    pub trigger_failed: bool,
    #[serde(default)]
    pub locate_failed: bool,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default)]
    pub collect_failed: bool,
}

/// One remote CI run tied to one pipeline stage.
///
/// Created empty from static configuration, mutated in place as each goal
/// fragment completes, persisted as a whole. Never deleted within a run;
/// superseded by [`JobRecord::reset`] when a restart condition fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub stage: String,
    pub job_file: String,

    /// Static inputs from configuration plus the stamped dispatch token.
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,

    /// Idempotency token, stamped once per trigger attempt.
    #[serde(default)]
    pub dispatch_token: Option<String>,
    #[serde(default)]
    pub dispatched_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub run_id: Option<u64>,
    #[serde(default)]
    pub run_status: Option<String>,
    #[serde(default)]
    pub conclusion: Option<String>,

    /// `None` = never fetched; `Some` with an empty map = fetched, none found.
    #[serde(default)]
    pub artifacts: Option<BTreeMap<String, ArtifactMeta>>,

    #[serde(default)]
    pub verdict: Option<JobVerdict>,

    #[serde(default)]
    pub ephemeral: StepFlags,
}

impl JobRecord {
    pub fn new(
        stage: impl Into<String>,
        job_file: impl Into<String>,
        inputs: BTreeMap<String, String>,
    ) -> Self {
        Self {
            stage: stage.into(),
            job_file: job_file.into(),
            inputs,
            dispatch_token: None,
            dispatched_at: None,
            run_id: None,
            run_status: None,
            conclusion: None,
            artifacts: None,
            verdict: None,
            ephemeral: StepFlags::default(),
        }
    }

    /// Whether the remote run reached a terminal conclusion.
    pub fn concluded(&self) -> bool {
        self.conclusion.is_some()
    }

    /// Whether the run concluded successfully.
    pub fn succeeded(&self) -> bool {
        self.conclusion.as_deref() == Some("success")
    }

    /// Restart condition: a failed or cancelled conclusion, or a dispatch
    /// whose run was never located within `stale_after`.
    pub fn is_stale(&self, stale_after: Duration, now: DateTime<Utc>) -> bool {
        if matches!(self.conclusion.as_deref(), Some("failure") | Some("cancelled")) {
            return true;
        }
        match (self.dispatched_at, self.run_id) {
            (Some(at), None) => now - at >= stale_after,
            _ => false,
        }
    }

    /// Return dispatch-related and step-result fields to defaults so the
    /// stage runs afresh on the next pass. Static fields are kept.
    pub fn reset(&mut self) {
        self.inputs.remove(crate::behaviors::TOKEN_INPUT);
        self.dispatch_token = None;
        self.dispatched_at = None;
        self.run_id = None;
        self.run_status = None;
        self.conclusion = None;
        self.artifacts = None;
        self.verdict = None;
        self.ephemeral = StepFlags::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> JobRecord {
        JobRecord::new("build", "build.yml", BTreeMap::new())
    }

    #[test]
    fn test_fresh_record_is_not_stale() {
        let job = record();
        assert!(!job.is_stale(Duration::hours(12), Utc::now()));
    }

    #[test]
    fn test_failed_conclusion_is_stale() {
        let mut job = record();
        job.conclusion = Some("failure".to_string());
        assert!(job.is_stale(Duration::hours(12), Utc::now()));
    }

    #[test]
    fn test_old_dispatch_without_run_is_stale() {
        let mut job = record();
        job.dispatch_token = Some("tok".to_string());
        job.dispatched_at = Some(Utc::now() - Duration::hours(13));
        assert!(job.is_stale(Duration::hours(12), Utc::now()));

        // A located run is never stale by age alone.
        job.run_id = Some(7);
        assert!(!job.is_stale(Duration::hours(12), Utc::now()));
    }

    #[test]
    fn test_reset_clears_progress_but_keeps_statics() {
        let mut inputs = BTreeMap::new();
        inputs.insert("profile".to_string(), "release".to_string());
        let mut job = JobRecord::new("build", "build.yml", inputs);
        job.dispatch_token = Some("tok".to_string());
        job.dispatched_at = Some(Utc::now());
        job.run_id = Some(7);
        job.conclusion = Some("failure".to_string());
        job.verdict = Some(JobVerdict {
            succeeded: false,
            summary: "failed".to_string(),
            details: None,
        });
        job.ephemeral.timed_out = true;

        job.reset();
        assert!(job.dispatch_token.is_none());
        assert!(job.run_id.is_none());
        assert!(job.verdict.is_none());
        assert!(!job.ephemeral.timed_out);
        assert_eq!(job.stage, "build");
        assert_eq!(job.inputs.get("profile").unwrap(), "release");
    }

    #[test]
    fn test_artifact_sentinel_distinguishes_fetched_empty() {
        let mut job = record();
        assert!(job.artifacts.is_none());
        job.artifacts = Some(BTreeMap::new());
        // Fetched-but-empty still counts as fetched.
        assert!(job.artifacts.is_some());
    }
}

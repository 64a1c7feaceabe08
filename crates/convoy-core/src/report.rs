//! Human-readable status rendering for the CLI.

use std::fmt::Write as _;

use convoy_engine::render_ascii;

use crate::runner::PipelineReport;

/// Render the per-stage status table followed by the plan tree.
pub fn render_report(report: &PipelineReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "release status: {}", report.status);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{:<16} {:<12} {:<10} {:<12} {:<10} VERDICT",
        "PACKAGE", "STAGE", "RUN", "CONCLUSION", "CHANNEL"
    );

    for (name, package) in &report.state.packages {
        let channel = package
            .meta
            .channel
            .map(|c| format!("{c:?}").to_lowercase())
            .unwrap_or_else(|| "-".to_string());
        for (stage, job) in &package.stages {
            let run = job
                .run_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string());
            let conclusion = job.conclusion.as_deref().unwrap_or("-");
            let verdict = job
                .verdict
                .as_ref()
                .map(|v| v.summary.as_str())
                .unwrap_or("-");
            let _ = writeln!(
                out,
                "{name:<16} {stage:<12} {run:<10} {conclusion:<12} {channel:<10} {verdict}"
            );
        }
    }

    let _ = writeln!(out);
    out.push_str(&render_ascii(&report.tree));
    out
}

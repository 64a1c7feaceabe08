//! Tri-state result vocabulary shared by every node in a plan tree.

use serde::{Deserialize, Serialize};

/// Result of ticking a node.
///
/// `Cancelled` is only ever delivered to `terminate` when a parent aborts a
/// still-running subtree (timeout, branch switch). A tick never surfaces it
/// upward; the decorator that forced the abort reports `Failure` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Node has never been ticked in the current activation.
    Unset,
    /// Node is mid-evaluation and must be ticked again.
    Running,
    /// Node completed and its goal holds.
    Success,
    /// Node completed and its goal does not hold.
    Failure,
    /// Node was forcibly terminated by a parent.
    Cancelled,
}

impl Status {
    /// Whether this status ends the current activation.
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Success | Status::Failure | Status::Cancelled)
    }

    /// Short label used in rendered snapshots.
    pub fn label(self) -> &'static str {
        match self {
            Status::Unset => "unset",
            Status::Running => "running",
            Status::Success => "success",
            Status::Failure => "failure",
            Status::Cancelled => "cancelled",
        }
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::Unset
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

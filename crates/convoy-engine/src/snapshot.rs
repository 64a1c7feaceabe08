//! Read-only tree introspection for status reporting.

use serde::{Deserialize, Serialize};

use crate::node::Node;
use crate::status::Status;

/// Renderable snapshot of one node and its subtree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeSnapshot {
    pub name: String,
    pub kind: String,
    pub status: Status,
    pub children: Vec<TreeSnapshot>,
}

impl Node {
    /// Capture the current names and statuses of the whole subtree.
    pub fn snapshot(&self) -> TreeSnapshot {
        TreeSnapshot {
            name: self.name().to_string(),
            kind: self.kind_label().to_string(),
            status: self.status(),
            children: self.children().iter().map(Node::snapshot).collect(),
        }
    }
}

/// Render a snapshot as an indented ASCII tree.
pub fn render_ascii(snapshot: &TreeSnapshot) -> String {
    let mut out = String::new();
    render_into(snapshot, 0, &mut out);
    out
}

fn render_into(snapshot: &TreeSnapshot, depth: usize, out: &mut String) {
    let marker = match snapshot.status {
        Status::Success => "+",
        Status::Failure | Status::Cancelled => "x",
        Status::Running => "*",
        Status::Unset => " ",
    };
    out.push_str(&"    ".repeat(depth));
    out.push_str(&format!(
        "[{marker}] {} <{}> {}\n",
        snapshot.name, snapshot.kind, snapshot.status
    ));
    for child in &snapshot.children {
        render_into(child, depth + 1, out);
    }
}

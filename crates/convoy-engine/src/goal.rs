//! Goal fragments: the postcondition / precondition / action idiom.
//!
//! A fragment reads as "ensure X is true, by doing Y once Z holds". The
//! postcondition is re-checked on every pass, so an already-achieved goal
//! never re-runs its action; this is what makes a persisted, half-finished
//! plan safe to re-tick after a crash.

use crate::node::Node;

/// Builder for one goal fragment.
///
/// `build` produces `Selector(postcondition, Sequence(precondition, action))`
/// when a postcondition is given, else `Sequence(precondition, action)`.
/// Both composites are memoryless so every tick re-evaluates the checks.
pub struct Goal {
    name: String,
    action: Node,
    postcondition: Option<Node>,
    precondition: Option<Node>,
}

impl Goal {
    pub fn new(name: impl Into<String>, action: Node) -> Self {
        Self {
            name: name.into(),
            action,
            postcondition: None,
            precondition: None,
        }
    }

    /// Check that decides whether the goal is already achieved.
    pub fn postcondition(mut self, node: Node) -> Self {
        self.postcondition = Some(node);
        self
    }

    /// Check that must hold before the action may run.
    pub fn precondition(mut self, node: Node) -> Self {
        self.precondition = Some(node);
        self
    }

    pub fn build(self) -> Node {
        let mut steps = Vec::with_capacity(2);
        if let Some(pre) = self.precondition {
            steps.push(pre);
        }
        steps.push(self.action);
        match self.postcondition {
            Some(post) => {
                let work = Node::sequence(format!("{} steps", self.name), false, steps);
                Node::selector(self.name, false, vec![post, work])
            }
            None => Node::sequence(self.name, false, steps),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Tick;
    use crate::ops::OpPool;
    use crate::status::Status;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn tick(node: &mut Node) -> Status {
        let pool = OpPool::new();
        let mut ctx = Tick { ops: &pool };
        node.tick(&mut ctx)
    }

    #[test]
    fn test_action_skipped_when_postcondition_holds() {
        let action_calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&action_calls);
        let mut goal = Goal::new(
            "ensure dispatched",
            Node::task("dispatch", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Status::Success
            }),
        )
        .postcondition(Node::condition("already dispatched", || true))
        .build();

        for _ in 0..5 {
            assert_eq!(tick(&mut goal), Status::Success);
        }
        assert_eq!(action_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_action_runs_when_postcondition_fails_and_precondition_holds() {
        let mut goal = Goal::new("ensure dispatched", Node::task("dispatch", || Status::Success))
            .postcondition(Node::condition("already dispatched", || false))
            .precondition(Node::condition("inputs ready", || true))
            .build();
        assert_eq!(tick(&mut goal), Status::Success);
    }

    #[test]
    fn test_unmet_precondition_blocks_action() {
        let action_calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&action_calls);
        let mut goal = Goal::new(
            "ensure dispatched",
            Node::task("dispatch", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Status::Success
            }),
        )
        .postcondition(Node::condition("already dispatched", || false))
        .precondition(Node::condition("inputs ready", || false))
        .build();
        assert_eq!(tick(&mut goal), Status::Failure);
        assert_eq!(action_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_goal_without_postcondition_is_plain_sequence() {
        let goal = Goal::new("reset", Node::task("reset", || Status::Success)).build();
        assert_eq!(goal.kind_label(), "sequence");
    }
}

//! Backchain linker: splices independently authored goal fragments into one
//! re-entrant plan.
//!
//! Fragments are given in effect order, last-to-run first. Each link finds
//! the anchor point of the accumulated plan (the innermost Sequence, i.e.
//! the `precondition?, action` pair of the most recently linked fragment)
//! and splices the next fragment in as its leftmost child. A precondition
//! that structurally duplicates the incoming fragment's postcondition is
//! dropped, since the spliced fragment performs the equivalent check.
//!
//! Anchor search failing is a programming error in the plan and surfaces at
//! build time, never at tick time.

use crate::error::ChainError;
use crate::node::{Node, NodeKind};

/// Link `next` into `first` at the anchor point.
pub fn link(mut first: Node, next: Node) -> Result<Node, ChainError> {
    let mut path = Vec::new();
    if !anchor_path(&first, &mut path) {
        return Err(ChainError::AnchorNotFound {
            chain: first.name().to_string(),
        });
    }
    let anchor = node_at_path(&mut first, &path);
    splice(anchor, next);
    Ok(first)
}

/// Link a whole plan, fragments in effect order (last-to-run first).
pub fn link_all(chains: Vec<Node>) -> Result<Node, ChainError> {
    let mut iter = chains.into_iter();
    let mut plan = iter.next().ok_or(ChainError::EmptyChain)?;
    for next in iter {
        plan = link(plan, next)?;
    }
    Ok(plan)
}

/// Children-first depth-first search for the innermost qualifying Sequence.
/// On success, `path` holds the child indices from the root to the anchor.
fn anchor_path(node: &Node, path: &mut Vec<usize>) -> bool {
    for (idx, child) in node.children().iter().enumerate() {
        path.push(idx);
        if anchor_path(child, path) {
            return true;
        }
        path.pop();
    }
    is_anchor(node)
}

/// A Sequence qualifies as an anchor when none of its children is a
/// composite holding more than one child.
fn is_anchor(node: &Node) -> bool {
    matches!(node.kind, NodeKind::Sequence { .. })
        && !node.children().iter().any(Node::is_multi_composite)
}

fn node_at_path<'a>(mut node: &'a mut Node, path: &[usize]) -> &'a mut Node {
    for &idx in path {
        node = &mut node.children_mut()[idx];
    }
    node
}

fn splice(anchor: &mut Node, next: Node) {
    let anchor_children = match &mut anchor.kind {
        NodeKind::Sequence { children, .. } => children,
        // anchor_path only ever returns Sequence nodes.
        _ => unreachable!("anchor is always a sequence"),
    };

    if postcondition_elides_precondition(&next, anchor_children.first()) {
        anchor_children.remove(0);
    }

    match next.kind {
        // A bare Sequence fragment chains flat instead of nesting.
        NodeKind::Sequence { children, .. } => {
            for (idx, child) in children.into_iter().enumerate() {
                anchor_children.insert(idx, child);
            }
        }
        _ => anchor_children.insert(0, next),
    }
}

/// Shallow structural equality: the incoming fragment is a Selector whose
/// first child is a postcondition check matching the anchor's leading
/// precondition by kind label and display name. Two unrelated fragments
/// sharing a condition name would elide incorrectly; callers own naming.
fn postcondition_elides_precondition(next: &Node, anchor_first: Option<&Node>) -> bool {
    let post = match &next.kind {
        NodeKind::Selector { .. } => match next.children().first() {
            Some(post) if post.kind_label() == "condition" => post,
            _ => return false,
        },
        _ => return false,
    };
    match anchor_first {
        Some(pre) => pre.kind_label() == post.kind_label() && pre.name() == post.name(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goal::Goal;
    use crate::node::Tick;
    use crate::ops::OpPool;
    use crate::status::Status;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    fn tick(node: &mut Node) -> Status {
        let pool = OpPool::new();
        let mut ctx = Tick { ops: &pool };
        node.tick(&mut ctx)
    }

    fn flag_condition(flag: &Arc<AtomicBool>) -> impl FnMut() -> bool + Send {
        let flag = Arc::clone(flag);
        move || flag.load(Ordering::SeqCst)
    }

    fn flag_setter(flag: &Arc<AtomicBool>, calls: &Arc<AtomicUsize>) -> impl FnMut() -> Status + Send {
        let flag = Arc::clone(flag);
        let calls = Arc::clone(calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            flag.store(true, Ordering::SeqCst);
            Status::Success
        }
    }

    /// Two fragments: A needs P; B produces P. Linking [A, B] must resolve
    /// B's action before A's action ever ticks.
    #[test]
    fn test_linked_plan_resolves_dependency_first() {
        let p = Arc::new(AtomicBool::new(false));
        let done = Arc::new(AtomicBool::new(false));
        let a_calls = Arc::new(AtomicUsize::new(0));
        let b_calls = Arc::new(AtomicUsize::new(0));

        let order: Arc<std::sync::Mutex<Vec<&'static str>>> =
            Arc::new(std::sync::Mutex::new(Vec::new()));

        let a_action = {
            let order = Arc::clone(&order);
            let calls = Arc::clone(&a_calls);
            let done = Arc::clone(&done);
            Node::task("finish", move || {
                calls.fetch_add(1, Ordering::SeqCst);
                order.lock().unwrap().push("a");
                done.store(true, Ordering::SeqCst);
                Status::Success
            })
        };
        let b_action = {
            let order = Arc::clone(&order);
            let calls = Arc::clone(&b_calls);
            let p = Arc::clone(&p);
            Node::task("prepare", move || {
                calls.fetch_add(1, Ordering::SeqCst);
                order.lock().unwrap().push("b");
                p.store(true, Ordering::SeqCst);
                Status::Success
            })
        };

        let a = Goal::new("ensure finished", a_action)
            .postcondition(Node::condition("finished", flag_condition(&done)))
            .precondition(Node::condition("prepared", flag_condition(&p)))
            .build();
        let b = Goal::new("ensure prepared", b_action)
            .postcondition(Node::condition("prepared", flag_condition(&p)))
            .build();

        let mut plan = link(a, b).expect("link");
        assert_eq!(tick(&mut plan), Status::Success);
        assert_eq!(*order.lock().unwrap(), vec!["b", "a"]);
        assert_eq!(a_calls.load(Ordering::SeqCst), 1);
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
    }

    /// With B's postcondition already true, A's action may tick on the very
    /// first evaluation and B's action never runs.
    #[test]
    fn test_satisfied_dependency_short_circuits() {
        let p = Arc::new(AtomicBool::new(true));
        let done = Arc::new(AtomicBool::new(false));
        let a_calls = Arc::new(AtomicUsize::new(0));
        let b_calls = Arc::new(AtomicUsize::new(0));

        let a = Goal::new("ensure finished", Node::task("finish", flag_setter(&done, &a_calls)))
            .postcondition(Node::condition("finished", flag_condition(&done)))
            .precondition(Node::condition("prepared", flag_condition(&p)))
            .build();
        let b = Goal::new("ensure prepared", Node::task("prepare", flag_setter(&p, &b_calls)))
            .postcondition(Node::condition("prepared", flag_condition(&p)))
            .build();

        let mut plan = link(a, b).expect("link");
        assert_eq!(tick(&mut plan), Status::Success);
        assert_eq!(a_calls.load(Ordering::SeqCst), 1);
        assert_eq!(b_calls.load(Ordering::SeqCst), 0);
    }

    /// The redundant precondition is removed when the spliced fragment's
    /// postcondition matches it by kind and name.
    #[test]
    fn test_matching_precondition_is_elided() {
        let a = Goal::new("ensure finished", Node::task("finish", || Status::Success))
            .postcondition(Node::condition("finished", || false))
            .precondition(Node::condition("prepared", || true))
            .build();
        let b = Goal::new("ensure prepared", Node::task("prepare", || Status::Success))
            .postcondition(Node::condition("prepared", || true))
            .build();

        let plan = link(a, b).expect("link");
        // Plan: Selector(finished, Sequence(B-selector, action)); the
        // duplicate "prepared" condition is gone.
        let steps = &plan.children()[1];
        let names: Vec<&str> = steps.children().iter().map(Node::name).collect();
        assert_eq!(names, vec!["ensure prepared", "finish"]);
    }

    #[test]
    fn test_differently_named_precondition_is_kept() {
        let a = Goal::new("ensure finished", Node::task("finish", || Status::Success))
            .postcondition(Node::condition("finished", || false))
            .precondition(Node::condition("inputs ready", || true))
            .build();
        let b = Goal::new("ensure prepared", Node::task("prepare", || Status::Success))
            .postcondition(Node::condition("prepared", || true))
            .build();

        let plan = link(a, b).expect("link");
        let steps = &plan.children()[1];
        let names: Vec<&str> = steps.children().iter().map(Node::name).collect();
        assert_eq!(names, vec!["ensure prepared", "inputs ready", "finish"]);
    }

    /// A fragment without a postcondition is a bare Sequence and splices
    /// flat into the anchor instead of nesting.
    #[test]
    fn test_bare_sequence_fragment_splices_flat() {
        let a = Goal::new("ensure finished", Node::task("finish", || Status::Success))
            .postcondition(Node::condition("finished", || false))
            .build();
        let b = Goal::new("reset", Node::task("clear", || Status::Success)).build();

        let plan = link(a, b).expect("link");
        let steps = &plan.children()[1];
        let names: Vec<&str> = steps.children().iter().map(Node::name).collect();
        assert_eq!(names, vec!["clear", "finish"]);
    }

    #[test]
    fn test_anchor_not_found_is_a_build_error() {
        let no_sequence = Node::condition("lone check", || true);
        let next = Goal::new("ensure prepared", Node::task("prepare", || Status::Success)).build();
        let err = link(no_sequence, next).unwrap_err();
        assert!(matches!(err, ChainError::AnchorNotFound { .. }));
    }

    #[test]
    fn test_link_all_empty_is_an_error() {
        assert!(matches!(link_all(vec![]), Err(ChainError::EmptyChain)));
    }

    /// Three fragments chain so the innermost anchor always belongs to the
    /// most recently spliced fragment.
    #[test]
    fn test_three_fragment_plan_runs_in_dependency_order() {
        let order: Arc<std::sync::Mutex<Vec<&'static str>>> =
            Arc::new(std::sync::Mutex::new(Vec::new()));
        let flags: Vec<Arc<AtomicBool>> =
            (0..3).map(|_| Arc::new(AtomicBool::new(false))).collect();

        let make_goal = |name: &'static str,
                         post_name: &'static str,
                         pre: Option<(&'static str, Arc<AtomicBool>)>,
                         flag: Arc<AtomicBool>| {
            let order = Arc::clone(&order);
            let set = Arc::clone(&flag);
            let action = Node::task(name, move || {
                order.lock().unwrap().push(name);
                set.store(true, Ordering::SeqCst);
                Status::Success
            });
            let check = Arc::clone(&flag);
            let mut goal = Goal::new(format!("ensure {post_name}"), action).postcondition(
                Node::condition(post_name, move || check.load(Ordering::SeqCst)),
            );
            if let Some((pre_name, pre_flag)) = pre {
                goal = goal.precondition(Node::condition(pre_name, move || {
                    pre_flag.load(Ordering::SeqCst)
                }));
            }
            goal.build()
        };

        let last = make_goal(
            "publish",
            "published",
            Some(("awaited", Arc::clone(&flags[1]))),
            Arc::clone(&flags[2]),
        );
        let middle = make_goal(
            "await",
            "awaited",
            Some(("dispatched", Arc::clone(&flags[0]))),
            Arc::clone(&flags[1]),
        );
        let first = make_goal("dispatch", "dispatched", None, Arc::clone(&flags[0]));

        let mut plan = link_all(vec![last, middle, first]).expect("link_all");
        assert_eq!(tick(&mut plan), Status::Success);
        assert_eq!(*order.lock().unwrap(), vec!["dispatch", "await", "publish"]);
    }
}

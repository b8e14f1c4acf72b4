//! Ready/blocked computation and dependency-tree traversal over an index.
//!
//! Conservative rule throughout: a blocker that is missing from the view is
//! unknown, never satisfied.

use crate::dependency::DepKind;
use crate::index::IssueIndex;
use crate::issue::{Issue, Status};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

pub const DEFAULT_TREE_DEPTH: usize = 50;

/// Default ready ordering: priority, then oldest first, then id.
pub fn ready_order(a: &Issue, b: &Issue) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then(a.created_at.cmp(&b.created_at))
        .then(a.id.cmp(&b.id))
}

enum BlockerState {
    Closed,
    Open,
    Missing,
}

fn blocker_state(index: &IssueIndex, id: &str) -> BlockerState {
    match index.issue(id) {
        Some(issue) if issue.is_closed() => BlockerState::Closed,
        Some(_) => BlockerState::Open,
        None => BlockerState::Missing,
    }
}

/// Open issues whose every `blocks` target is present and closed.
pub fn ready_issues(index: &IssueIndex) -> Vec<&Issue> {
    let mut ready: Vec<&Issue> = index
        .issues()
        .filter(|issue| issue.status == Status::Open)
        .filter(|issue| {
            issue.blockers().all(|dep| {
                matches!(
                    blocker_state(index, &dep.depends_on_id),
                    BlockerState::Closed
                )
            })
        })
        .collect();
    ready.sort_by(|a, b| ready_order(a, b));
    ready
}

/// An active issue held back by at least one open blocker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockedIssue {
    pub issue: Issue,
    /// Open blockers, in edge order.
    pub blocked_by: Vec<String>,
    /// Blockers absent from the view.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unknown: Vec<String>,
}

/// Active issues with at least one open `blocks` target.
pub fn blocked_issues(index: &IssueIndex) -> Vec<BlockedIssue> {
    let mut blocked = Vec::new();
    for issue in index.issues().filter(|i| i.status.is_active()) {
        let mut blocked_by = Vec::new();
        let mut unknown = Vec::new();
        for dep in issue.blockers() {
            match blocker_state(index, &dep.depends_on_id) {
                BlockerState::Open => blocked_by.push(dep.depends_on_id.clone()),
                BlockerState::Missing => unknown.push(dep.depends_on_id.clone()),
                BlockerState::Closed => {}
            }
        }
        if !blocked_by.is_empty() {
            blocked.push(BlockedIssue {
                issue: issue.clone(),
                blocked_by,
                unknown,
            });
        }
    }
    blocked.sort_by(|a, b| ready_order(&a.issue, &b.issue));
    blocked
}

/// What a tree node resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NodeState {
    Present { title: String, status: Status },
    /// Referenced but absent from the current view.
    Missing,
    /// Already on the current path; traversal stops here.
    Cycle,
    /// Expanded earlier under another parent; shown once, referenced after.
    Seen,
    /// Depth limit reached; children not expanded.
    Truncated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: String,
    /// Edge kind from the parent node; `None` at the root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub via: Option<DepKind>,
    #[serde(flatten)]
    pub state: NodeState,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn has_cycle(&self) -> bool {
        self.state == NodeState::Cycle || self.children.iter().any(TreeNode::has_cycle)
    }

    /// Ids in depth-first pre-order.
    pub fn ids(&self) -> Vec<&str> {
        let mut out = vec![self.id.as_str()];
        for child in &self.children {
            out.extend(child.ids());
        }
        out
    }
}

/// Follow every outgoing edge from `root`.
///
/// The engine does not guarantee an acyclic graph, so a node already on the
/// current path becomes a `Cycle` leaf instead of being expanded again. A node
/// reached again by another route becomes a `Seen` leaf, so every issue is
/// expanded at most once and the tree is linear in the size of the graph.
pub fn dependency_tree(index: &IssueIndex, root: &str, max_depth: usize) -> TreeNode {
    let mut walk = Walk::default();
    expand(index, root, None, &mut walk, max_depth)
}

#[derive(Default)]
struct Walk {
    path: Vec<String>,
    expanded: BTreeSet<String>,
}

fn expand(
    index: &IssueIndex,
    id: &str,
    via: Option<DepKind>,
    walk: &mut Walk,
    depth_left: usize,
) -> TreeNode {
    let leaf = |state| TreeNode {
        id: id.to_string(),
        via,
        state,
        children: Vec::new(),
    };

    if walk.path.iter().any(|on_path| on_path == id) {
        return leaf(NodeState::Cycle);
    }
    if walk.expanded.contains(id) {
        return leaf(NodeState::Seen);
    }
    let Some(issue) = index.issue(id) else {
        return leaf(NodeState::Missing);
    };
    let state = NodeState::Present {
        title: issue.title.clone(),
        status: issue.status,
    };
    if depth_left == 0 && !issue.dependencies.is_empty() {
        return leaf(NodeState::Truncated);
    }

    let mut edges: Vec<(DepKind, &str)> = issue
        .dependencies
        .iter()
        .map(|d| (d.dep_type, d.depends_on_id.as_str()))
        .collect();
    edges.sort();

    walk.expanded.insert(id.to_string());
    walk.path.push(id.to_string());
    let children = edges
        .into_iter()
        .map(|(kind, target)| expand(index, target, Some(kind), walk, depth_left.saturating_sub(1)))
        .collect();
    walk.path.pop();

    TreeNode {
        id: id.to_string(),
        via,
        state,
        children,
    }
}

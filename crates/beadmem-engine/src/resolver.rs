//! Ready work, blocked issues and dependency trees over an engine snapshot.
//!
//! The resolver takes one `list --all` snapshot per query and applies the
//! graph rules from `beadmem-bd`, so results do not depend on which engine
//! version computed readiness.

use crate::args::ReadyFilter;
use crate::client::EngineClient;
use crate::error::EngineResult;
use crate::runner::{CommandRunner, SystemRunner};
use crate::validate::validate_id;
use beadmem_bd::{
    BlockedIssue, DEFAULT_TREE_DEPTH, Issue, IssueFilter, IssueIndex, TreeNode, blocked_issues,
    dependency_tree, ready_issues,
};
use std::sync::Arc;

#[derive(Debug)]
pub struct DependencyResolver<R = SystemRunner> {
    client: Arc<EngineClient<R>>,
    max_depth: usize,
}

impl<R: CommandRunner> DependencyResolver<R> {
    pub fn new(client: Arc<EngineClient<R>>) -> Self {
        Self {
            client,
            max_depth: DEFAULT_TREE_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Every record the engine knows, closed ones included.
    pub fn snapshot(&self) -> EngineResult<IssueIndex> {
        let issues = self.client.list_issues(&IssueFilter::all())?;
        Ok(IssueIndex::from_issues(issues))
    }

    /// Open issues with no open blockers, most urgent first.
    pub fn ready_work(&self, filter: &ReadyFilter) -> EngineResult<Vec<Issue>> {
        let index = self.snapshot()?;
        let ready = ready_issues(&index)
            .into_iter()
            .filter(|issue| filter.matches(issue))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(ready)
    }

    pub fn blocked_issues(&self) -> EngineResult<Vec<BlockedIssue>> {
        let index = self.snapshot()?;
        Ok(blocked_issues(&index))
    }

    /// Tree of everything reachable from `root`; cycles end in a `Cycle` leaf.
    pub fn dependency_tree(&self, root: &str) -> EngineResult<TreeNode> {
        validate_id(root)?;
        let index = self.snapshot()?;
        Ok(dependency_tree(&index, root, self.max_depth))
    }
}

//! Session-scoped memory operations backed by the engine.

use crate::body::decode_body;
use crate::error::{ProviderError, ProviderResult};
use crate::labels::{agent_label, category_label, session_label};
use crate::mapping::{entry_description, from_issue, to_issue, to_new_issue};
use beadmem_bd::{
    DepKind, Dependency, Importance, Issue, IssueFilter, IssueIndex, MemoryCategory, MemoryEntry,
    ValidationError,
};
use beadmem_engine::validate::validate_label;
use beadmem_engine::{CommandRunner, EngineClient, EngineError, IssueUpdate, SystemRunner};
use chrono::Utc;
use std::cmp::Reverse;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

const LOCAL_ID_PREFIX: &str = "local-";
pub const DELETE_REASON: &str = "memory deleted";
pub const UNLINKED_REASON: &str = "parent link failed";

/// Who is storing memory. Passed in explicitly; never read from globals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderContext {
    pub agent_id: String,
    pub session_id: String,
}

impl ProviderContext {
    pub fn new(
        agent_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let context = Self {
            agent_id: agent_id.into(),
            session_id: session_id.into(),
        };
        if context.agent_id.is_empty() {
            return Err(ValidationError::Empty { field: "agent_id" });
        }
        if context.session_id.is_empty() {
            return Err(ValidationError::Empty {
                field: "session_id",
            });
        }
        validate_label(&agent_label(&context.agent_id))?;
        validate_label(&session_label(&context.session_id))?;
        Ok(context)
    }

    /// A new entry owned by this agent and session.
    pub fn entry(
        &self,
        category: MemoryCategory,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<MemoryEntry, ValidationError> {
        MemoryEntry::new(
            self.agent_id.clone(),
            self.session_id.clone(),
            category,
            title,
            content,
        )
    }
}

/// Retrieval criteria. Label-backed fields are pushed to the engine; the
/// rest are applied after decoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryFilter {
    pub session_id: Option<String>,
    pub agent_id: Option<String>,
    pub category: Option<MemoryCategory>,
    /// Every tag listed must be present.
    pub tags: Vec<String>,
    /// Only entries whose recovered importance is at least this.
    pub min_importance: Option<Importance>,
    /// Include entries whose backing issue is closed.
    pub include_deleted: bool,
    pub limit: Option<usize>,
}

impl MemoryFilter {
    pub fn session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Self::default()
        }
    }

    pub fn agent(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: Some(agent_id.into()),
            ..Self::default()
        }
    }

    pub fn category(mut self, category: MemoryCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn issue_filter(&self) -> IssueFilter {
        let mut labels = Vec::new();
        if let Some(session_id) = &self.session_id {
            labels.push(session_label(session_id));
        }
        if let Some(agent_id) = &self.agent_id {
            labels.push(agent_label(agent_id));
        }
        if let Some(category) = self.category {
            labels.push(category_label(category));
        }
        labels.extend(self.tags.iter().cloned());
        IssueFilter {
            include_closed: self.include_deleted,
            labels,
            ..IssueFilter::default()
        }
    }

    fn accepts(&self, entry: &MemoryEntry) -> bool {
        self.min_importance
            .is_none_or(|min| entry.importance >= min)
    }
}

/// Maps memory entries onto engine issues for one agent and session.
///
/// With `local_fallback` enabled, an unreachable engine degrades to an
/// in-process store whose ids start with `local-`; that store is never
/// written to disk. With it disabled, unavailability errors are returned as
/// they are.
#[derive(Debug)]
pub struct MemoryProvider<R = SystemRunner> {
    client: Arc<EngineClient<R>>,
    context: ProviderContext,
    local_fallback: bool,
    local: Mutex<IssueIndex>,
    degraded: AtomicBool,
}

impl<R: CommandRunner> MemoryProvider<R> {
    pub fn new(client: Arc<EngineClient<R>>, context: ProviderContext) -> Self {
        Self {
            client,
            context,
            local_fallback: false,
            local: Mutex::new(IssueIndex::new()),
            degraded: AtomicBool::new(false),
        }
    }

    pub fn with_local_fallback(mut self, enabled: bool) -> Self {
        self.local_fallback = enabled;
        self
    }

    pub fn context(&self) -> &ProviderContext {
        &self.context
    }

    pub fn client(&self) -> &Arc<EngineClient<R>> {
        &self.client
    }

    /// Record that the engine is known to be unusable, without logging.
    ///
    /// For callers that have already reported the degradation themselves;
    /// later fallbacks then stay quiet.
    pub fn mark_degraded(&self) {
        self.degraded.store(true, Ordering::Relaxed);
    }

    /// Whether any operation has fallen back to the local store.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Persist `entry` as exactly one issue and return its id.
    ///
    /// When the parent edge cannot be recorded the new issue is closed with
    /// [`UNLINKED_REASON`] before [`ProviderError::ParentLink`] is returned,
    /// so retrying the store leaves no live duplicate behind.
    pub fn store(&self, entry: &MemoryEntry) -> ProviderResult<String> {
        let created = match self.client.create_issue(&to_new_issue(entry)) {
            Ok(issue) => issue,
            Err(err) if self.can_degrade(&err) => return self.store_local(entry),
            Err(err) => return Err(err.into()),
        };

        if let Some(parent_id) = &entry.parent_id {
            let linked = self
                .client
                .add_dependency(&created.id, parent_id, DepKind::ParentChild);
            if let Err(source) = linked {
                if let Err(close_err) = self.client.close_issue(&created.id, UNLINKED_REASON) {
                    tracing::warn!(
                        id = %created.id,
                        error = %close_err,
                        "could not close entry after failed parent link"
                    );
                }
                return Err(ProviderError::ParentLink {
                    id: created.id,
                    parent_id: parent_id.clone(),
                    source,
                });
            }
        }
        tracing::debug!(
            id = %created.id,
            category = entry.category.as_str(),
            session = %entry.session_id,
            "stored memory entry"
        );
        Ok(created.id)
    }

    pub fn get(&self, id: &str) -> ProviderResult<MemoryEntry> {
        let issue = if is_local_id(id) {
            self.local_index().issue(id).cloned()
        } else {
            match self.client.show_issue(id) {
                Ok(issue) => Some(issue),
                Err(EngineError::Process { ref stderr, .. })
                    if stderr.to_ascii_lowercase().contains("not found") =>
                {
                    None
                }
                Err(err) => return Err(err.into()),
            }
        };
        issue
            .filter(|issue| !issue.is_closed())
            .as_ref()
            .and_then(from_issue)
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))
    }

    /// Entries matching `filter`, in creation order.
    pub fn retrieve(&self, filter: &MemoryFilter) -> ProviderResult<Vec<MemoryEntry>> {
        let issues = self.gather(&filter.issue_filter())?;
        let mut entries: Vec<MemoryEntry> = issues
            .iter()
            .filter_map(from_issue)
            .filter(|entry| filter.accepts(entry))
            .collect();
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        if let Some(limit) = filter.limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }

    /// Every live entry of `session_id`, oldest first.
    pub fn restore_session(&self, session_id: &str) -> ProviderResult<Vec<MemoryEntry>> {
        validate_label(&session_label(session_id))?;
        self.retrieve(&MemoryFilter::session(session_id))
    }

    /// Record `child -> parent` of `kind`. `Ok(false)` when the engine
    /// declines the edge (for example a duplicate).
    pub fn link_entries(&self, child_id: &str, parent_id: &str, kind: DepKind) -> ProviderResult<bool> {
        if is_local_id(child_id) {
            let mut local = self.local_index();
            let issue = local
                .issue_mut(child_id)
                .ok_or_else(|| ProviderError::NotFound(child_id.to_string()))?;
            if issue
                .dependencies
                .iter()
                .any(|d| d.depends_on_id == parent_id && d.dep_type == kind)
            {
                return Ok(false);
            }
            let mut dependency = Dependency::new(child_id, parent_id, kind)?;
            dependency.created_at = Some(Utc::now());
            dependency.created_by = self.context.agent_id.clone();
            issue.dependencies.push(dependency);
            return Ok(true);
        }

        match self.client.add_dependency(child_id, parent_id, kind) {
            Ok(()) => Ok(true),
            Err(EngineError::Rejected { message, .. }) => {
                tracing::debug!(child_id, parent_id, %message, "engine declined link");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Refresh `accessed_at`. Content and labels are left alone.
    pub fn touch(&self, id: &str) -> ProviderResult<MemoryEntry> {
        let mut entry = self.get(id)?;
        entry.accessed_at = Utc::now();
        let description = entry_description(&entry);

        if is_local_id(id) {
            let mut local = self.local_index();
            if let Some(issue) = local.issue_mut(id) {
                issue.description = description;
                issue.touch_updated_at();
            }
            return Ok(entry);
        }

        let update = IssueUpdate {
            description: Some(description),
            ..IssueUpdate::default()
        };
        let issue = self.client.update_issue(id, &update)?;
        let (_, meta) = decode_body(&issue.description);
        entry.accessed_at = meta.accessed_at.unwrap_or(entry.accessed_at);
        Ok(entry)
    }

    /// Close the backing issue. `Ok(false)` when it was already closed.
    pub fn delete(&self, id: &str) -> ProviderResult<bool> {
        if is_local_id(id) {
            let mut local = self.local_index();
            let closed = local
                .issue(id)
                .map(Issue::is_closed)
                .ok_or_else(|| ProviderError::NotFound(id.to_string()))?;
            if closed {
                return Ok(false);
            }
            local.close(id, DELETE_REASON, &self.context.agent_id)?;
            return Ok(true);
        }

        let issue = self.client.show_issue(id)?;
        if issue.is_closed() {
            return Ok(false);
        }
        self.client.close_issue(id, DELETE_REASON)?;
        tracing::debug!(id, "deleted memory entry");
        Ok(true)
    }

    /// Case-insensitive substring search over title, content and tags,
    /// most important first, then newest first.
    pub fn search(&self, query: &str, limit: usize) -> ProviderResult<Vec<MemoryEntry>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Err(ValidationError::Empty { field: "query" }.into());
        }
        let mut hits: Vec<MemoryEntry> = self
            .retrieve(&MemoryFilter::default())?
            .into_iter()
            .filter(|entry| {
                entry.title.to_lowercase().contains(&needle)
                    || entry.content.to_lowercase().contains(&needle)
                    || entry
                        .tags
                        .iter()
                        .any(|tag| tag.to_lowercase().contains(&needle))
            })
            .collect();
        hits.sort_by_key(|entry| (Reverse(entry.importance), Reverse(entry.created_at)));
        hits.truncate(limit);
        Ok(hits)
    }

    fn can_degrade(&self, err: &EngineError) -> bool {
        if !(self.local_fallback && err.is_unavailable()) {
            return false;
        }
        if !self.degraded.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                error = %err,
                "issue engine unavailable; keeping memory in this process only"
            );
        }
        true
    }

    fn store_local(&self, entry: &MemoryEntry) -> ProviderResult<String> {
        let id = format!("{LOCAL_ID_PREFIX}{}", uuid::Uuid::new_v4());
        let mut issue = to_issue(entry, &id);
        if let Some(parent_id) = &entry.parent_id {
            issue
                .dependencies
                .push(Dependency::new(&id, parent_id.as_str(), DepKind::ParentChild)?);
        }
        self.local_index().upsert_issue(issue);
        Ok(id)
    }

    fn gather(&self, filter: &IssueFilter) -> ProviderResult<Vec<Issue>> {
        let mut issues = match self.client.list_issues(filter) {
            Ok(issues) => issues,
            Err(err) if self.can_degrade(&err) => Vec::new(),
            Err(err) => return Err(err.into()),
        };
        let local = self.local_index();
        issues.extend(local.list(filter).into_iter().cloned());
        Ok(issues)
    }

    fn local_index(&self) -> MutexGuard<'_, IssueIndex> {
        self.local
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn is_local_id(id: &str) -> bool {
    id.starts_with(LOCAL_ID_PREFIX)
}

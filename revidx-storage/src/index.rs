// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! The revision index: branch-scoped reads and writes over a document store.
//!
//! ```text
//! RevisionIndex ──┬── read("MAIN/a@123", |searcher| ..)   snapshot reads
//!                 ├── write("MAIN/a", ts, |staging| ..)   staged commits
//!                 ├── branching()                         branch lifecycle, merges
//!                 └── compare("MAIN", "MAIN/a")           directional diffs
//! ```

use crate::branching::{BranchManager, BranchRegistry};
use crate::compare::{collect_changes, RevisionCompare};
use crate::document::{Document, DocumentMapping};
use crate::hooks::Hooks;
use crate::searcher::RevisionSearcher;
use crate::staging::StagingArea;
use crate::store::{BranchQuery, CommitQuery, DocumentStore, MemoryStore};
use dashmap::DashMap;
use revidx_core::{
    BranchExpression, Commit, IndexConfig, MonotonicClock, Result, RevisionBranch,
    RevisionBranchRef, RevisionError, TimestampProvider, MAIN_PATH,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

pub(crate) struct IndexInner {
    pub(crate) store: Arc<dyn DocumentStore>,
    pub(crate) config: IndexConfig,
    pub(crate) clock: Arc<dyn TimestampProvider>,
    pub(crate) hooks: Hooks,
    pub(crate) mappings: DashMap<String, DocumentMapping>,
    pub(crate) branches: BranchRegistry,
    closed: AtomicBool,
}

/// A branch expression resolved against the current branch documents.
#[derive(Debug, Clone)]
pub struct ResolvedRef {
    /// Segments whose revisions are readable.
    pub visible: RevisionBranchRef,
    /// Visible segments plus content merged in by copy.
    pub effective: RevisionBranchRef,
}

/// Cheap to clone; all clones share one index.
#[derive(Clone)]
pub struct RevisionIndex {
    inner: Arc<IndexInner>,
}

impl RevisionIndex {
    pub fn open(store: Arc<dyn DocumentStore>, config: IndexConfig) -> Result<Self> {
        Self::with_clock(store, config, Arc::new(MonotonicClock::new()))
    }

    /// Fresh in-memory index with default settings.
    pub fn in_memory() -> Result<Self> {
        Self::open(Arc::new(MemoryStore::new()), IndexConfig::default())
    }

    pub fn with_clock(
        store: Arc<dyn DocumentStore>,
        config: IndexConfig,
        clock: Arc<dyn TimestampProvider>,
    ) -> Result<Self> {
        config.validate()?;

        let existing = store.search_branches(&BranchQuery::new().include_deleted(true))?;
        let mut next_id = 1;
        for branch in &existing {
            next_id = next_id.max(branch.id() + 1);
            clock.observe(branch.effective_ref().head_timestamp());
            clock.observe(branch.head_timestamp());
        }
        for merge in existing.iter().flat_map(RevisionBranch::merge_sources) {
            clock.observe(merge.timestamp);
        }

        let mappings = DashMap::new();
        for stored in store.mappings()? {
            mappings.insert(stored.doc_type.clone(), DocumentMapping::from_stored(stored));
        }

        if store.get_branch(MAIN_PATH)?.is_none() {
            let main = RevisionBranch::main(clock.next());
            info!(base = main.base_timestamp(), "Created MAIN branch");
            store.put_branch(main)?;
        }

        info!(
            branches = existing.len(),
            mappings = mappings.len(),
            next_branch_id = next_id,
            result_window = config.result_window,
            "Opened revision index"
        );

        Ok(Self {
            inner: Arc::new(IndexInner {
                store,
                config,
                clock,
                hooks: Hooks::new(),
                mappings,
                branches: BranchRegistry::new(next_id),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Drops registered hooks and listeners; later operations fail with `IndexClosed`.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            self.inner.hooks.clear();
            self.inner.branches.clear_listeners();
            info!("Closed revision index");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(RevisionError::IndexClosed);
        }
        Ok(())
    }

    pub(crate) fn inner(&self) -> &IndexInner {
        &self.inner
    }

    pub fn config(&self) -> &IndexConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.inner.store
    }

    pub fn hooks(&self) -> &Hooks {
        &self.inner.hooks
    }

    pub fn branching(&self) -> BranchManager {
        BranchManager::new(self.clone())
    }

    /// A timestamp later than any handed out or observed so far.
    pub fn current_time(&self) -> i64 {
        self.inner.clock.next()
    }

    pub(crate) fn clock(&self) -> &dyn TimestampProvider {
        self.inner.clock.as_ref()
    }

    pub fn register<D: Document>(&self) -> Result<()> {
        self.register_mapping(DocumentMapping::of::<D>())
    }

    /// Registers `mapping` and persists its set fields when they are new.
    pub fn register_mapping(&self, mapping: DocumentMapping) -> Result<()> {
        let persisted = self
            .inner
            .mappings
            .get(mapping.doc_type())
            .is_some_and(|known| known.set_fields() == mapping.set_fields());
        if !persisted {
            self.inner.store.put_mapping(mapping.to_stored())?;
        }
        self.inner
            .mappings
            .insert(mapping.doc_type().to_string(), mapping);
        Ok(())
    }

    /// Registered or stored mapping, or the all-lists default for unknown types.
    pub fn mapping(&self, doc_type: &str) -> DocumentMapping {
        self.inner
            .mappings
            .get(doc_type)
            .map(|m| m.value().clone())
            .unwrap_or_else(|| DocumentMapping::new(doc_type))
    }

    pub fn resolve(&self, expression: &str) -> Result<ResolvedRef> {
        self.ensure_open()?;
        self.resolve_expression(&BranchExpression::parse(expression)?)
    }

    fn resolve_expression(&self, expression: &BranchExpression) -> Result<ResolvedRef> {
        let branching = self.branching();
        match expression {
            BranchExpression::Path(path) => {
                let branch = branching.get_branch(path)?;
                Ok(ResolvedRef {
                    visible: branch.branch_ref(),
                    effective: branch.effective_ref(),
                })
            }
            BranchExpression::Base(path) => {
                let branch = branching.get_branch(path)?;
                if branch.is_main() {
                    return Err(RevisionError::illegal_argument(format!(
                        "Branch '{}' has no parent to take a base from",
                        branch.path()
                    )));
                }
                let base = branch.base_ref();
                Ok(ResolvedRef {
                    visible: base.clone(),
                    effective: base,
                })
            }
            BranchExpression::At { path, timestamp } => {
                let branch = branching.get_branch(path)?;
                Ok(ResolvedRef {
                    visible: branch.branch_ref().restrict_to(*timestamp),
                    effective: branch.effective_ref().restrict_to(*timestamp),
                })
            }
            BranchExpression::Range { from, to } => {
                let from = self.resolve_expression(from)?;
                let to = self.resolve_expression(to)?;
                Ok(ResolvedRef {
                    visible: to.visible.difference(&from.effective),
                    effective: to.effective.difference(&from.effective),
                })
            }
        }
    }

    pub fn searcher(&self, expression: &str) -> Result<RevisionSearcher> {
        let resolved = self.resolve(expression)?;
        Ok(RevisionSearcher::new(
            Arc::clone(&self.inner.store),
            resolved.visible,
            self.inner.config.result_window,
        ))
    }

    /// Runs `f` against a snapshot of the state `expression` names.
    pub fn read<T, F>(&self, expression: &str, f: F) -> Result<T>
    where
        F: FnOnce(&RevisionSearcher) -> Result<T>,
    {
        let searcher = self.searcher(expression)?;
        f(&searcher)
    }

    /// Opens a staging area on a plain branch path.
    pub fn prepare_commit(&self, branch_path: &str) -> Result<StagingArea> {
        self.ensure_open()?;
        let expression = BranchExpression::parse(branch_path)?;
        if !expression.is_writable() {
            return Err(RevisionError::illegal_argument(format!(
                "Cannot write to branch expression '{branch_path}'"
            )));
        }
        let branch = self.branching().get_branch(expression.path())?;
        if branch.is_deleted() {
            return Err(RevisionError::bad_request(format!(
                "Branch '{}' is deleted",
                branch.path()
            )));
        }
        Ok(StagingArea::new(self.clone(), &branch))
    }

    /// Stages through `f` and commits as the configured default author.
    pub fn write<F>(&self, branch_path: &str, timestamp: i64, f: F) -> Result<Commit>
    where
        F: FnOnce(&mut StagingArea) -> Result<()>,
    {
        self.write_as(branch_path, timestamp, &self.inner.config.default_author, "", f)
    }

    pub fn write_as<F>(
        &self,
        branch_path: &str,
        timestamp: i64,
        author: &str,
        comment: &str,
        f: F,
    ) -> Result<Commit>
    where
        F: FnOnce(&mut StagingArea) -> Result<()>,
    {
        let mut staging = self.prepare_commit(branch_path)?;
        f(&mut staging)?;
        staging.commit(timestamp, author, comment)
    }

    pub fn compare(&self, base: &str, compare: &str) -> Result<RevisionCompare> {
        self.compare_with_limit(base, compare, self.inner.config.result_window)
    }

    /// At most `limit` details; totals always count every change.
    pub fn compare_with_limit(
        &self,
        base: &str,
        compare: &str,
        limit: usize,
    ) -> Result<RevisionCompare> {
        let base_ref = self.resolve(base)?;
        let compare_ref = self.resolve(compare)?;
        let changes = collect_changes(
            self.inner.store.as_ref(),
            &base_ref.effective,
            &compare_ref.visible,
        )?;
        Ok(RevisionCompare::build(base, compare, &changes, limit))
    }

    /// Recorded commits, newest first.
    pub fn commits(&self, query: &CommitQuery) -> Result<Vec<Commit>> {
        self.ensure_open()?;
        Ok(self.inner.store.search_commits(query)?)
    }
}

impl std::fmt::Debug for RevisionIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevisionIndex")
            .field("config", &self.inner.config)
            .field("hooks", &self.inner.hooks)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revidx_core::{ErrorKind, LogicalClock};

    fn index() -> RevisionIndex {
        RevisionIndex::with_clock(
            Arc::new(MemoryStore::new()),
            IndexConfig::default(),
            Arc::new(LogicalClock::starting_at(100)),
        )
        .unwrap()
    }

    #[test]
    fn test_open_creates_main() {
        let index = index();
        let main = index.branching().get_branch(MAIN_PATH).unwrap();
        assert!(main.is_main());
        assert_eq!(main.base_timestamp(), 101);
    }

    #[test]
    fn test_reopen_keeps_branches_and_clock() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let first = RevisionIndex::with_clock(
            Arc::clone(&store),
            IndexConfig::default(),
            Arc::new(LogicalClock::starting_at(1_000)),
        )
        .unwrap();
        first.branching().create_branch(MAIN_PATH, "a").unwrap();
        let base = first.branching().get_branch("MAIN/a").unwrap().base_timestamp();

        let second = RevisionIndex::with_clock(
            store,
            IndexConfig::default(),
            Arc::new(LogicalClock::starting_at(0)),
        )
        .unwrap();
        assert!(second.current_time() > base);
        second.branching().create_branch(MAIN_PATH, "b").unwrap();
        let b = second.branching().get_branch("MAIN/b").unwrap();
        assert_eq!(b.id(), 2);
    }

    #[test]
    fn test_write_to_derived_expression_is_rejected() {
        let index = index();
        for expression in ["MAIN^", "MAIN@5", "MAIN:MAIN"] {
            let err = index.prepare_commit(expression).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::IllegalArgument, "{expression}");
        }
    }

    #[test]
    fn test_closed_index_rejects_operations() {
        let index = index();
        index.close();
        assert!(matches!(
            index.prepare_commit(MAIN_PATH),
            Err(RevisionError::IndexClosed)
        ));
        assert!(matches!(index.resolve(MAIN_PATH), Err(RevisionError::IndexClosed)));
    }

    #[test]
    fn test_base_of_main_is_illegal() {
        let err = index().resolve("MAIN^").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalArgument);
    }
}

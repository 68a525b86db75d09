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

//! Branch lifecycle: creation, lookup, aliases, deletion and state.
//!
//! Branch documents are only changed through [`BranchUpdate`] scripts, which
//! the store applies atomically, so a metadata patch racing a commit on the
//! same branch never loses either write.

use crate::index::RevisionIndex;
use crate::merge::BranchMergeOperation;
use crate::store::BranchQuery;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use revidx_core::{
    validate_branch_name, BranchState, BranchUpdate, Result, RevisionBranch, RevisionError,
    SEPARATOR,
};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

type BranchListener = Arc<dyn Fn(&str) + Send + Sync>;

/// Process-local branch bookkeeping shared by every [`BranchManager`] handle.
pub(crate) struct BranchRegistry {
    next_id: AtomicI64,
    commit_locks: DashMap<String, Arc<Mutex<()>>>,
    /// Serializes creation and alias changes, which check siblings first.
    structure_lock: Mutex<()>,
    listeners: RwLock<Vec<BranchListener>>,
}

impl BranchRegistry {
    pub(crate) fn new(next_id: i64) -> Self {
        Self {
            next_id: AtomicI64::new(next_id),
            commit_locks: DashMap::new(),
            structure_lock: Mutex::new(()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn clear_listeners(&self) {
        self.listeners.write().clear();
    }
}

#[derive(Clone)]
pub struct BranchManager {
    index: RevisionIndex,
}

impl BranchManager {
    pub(crate) fn new(index: RevisionIndex) -> Self {
        Self { index }
    }

    fn registry(&self) -> &BranchRegistry {
        &self.index.inner().branches
    }

    pub fn create_branch(&self, parent_path: &str, name: &str) -> Result<String> {
        self.create_branch_with_metadata(parent_path, name, Map::new())
    }

    /// Creates `parent/name` seeing the parent's current content. A deleted
    /// branch at the same path is reopened with a new id.
    pub fn create_branch_with_metadata(
        &self,
        parent_path: &str,
        name: &str,
        metadata: Map<String, Value>,
    ) -> Result<String> {
        self.index.ensure_open()?;
        validate_branch_name(name)?;
        let store = &self.index.inner().store;
        let _structure = self.registry().structure_lock.lock();

        let parent = self.get_branch(parent_path)?;
        if parent.is_deleted() {
            return Err(RevisionError::bad_request(format!(
                "Cannot create a branch under deleted branch '{}'",
                parent.path()
            )));
        }
        let path = format!("{}{}{}", parent.path(), SEPARATOR, name);
        let reopened = match store.get_branch(&path)? {
            Some(existing) if !existing.is_deleted() => {
                return Err(RevisionError::branch_exists(path));
            }
            Some(_) => true,
            None => false,
        };
        let siblings = store.search_branches(&BranchQuery::new().parent(parent.path()))?;
        if let Some(sibling) = siblings.iter().find(|s| s.name_aliases().contains(name)) {
            return Err(RevisionError::bad_request(format!(
                "Branch name '{name}' is already an alias of branch '{}'",
                sibling.path()
            )));
        }

        let id = self.registry().next_id.fetch_add(1, Ordering::AcqRel);
        let base = self.index.clock().next();
        let branch = RevisionBranch::child(&parent, id, name, base, metadata);
        store.put_branch(branch)?;
        info!(branch = %path, id, base, reopened, "Created branch");
        self.notify(&path);
        Ok(path)
    }

    /// Exact path first, then alias resolution segment by segment.
    pub fn get_branch(&self, path: &str) -> Result<RevisionBranch> {
        if let Some(branch) = self.index.inner().store.get_branch(path)? {
            return Ok(branch);
        }
        self.resolve_alias(path)?
            .ok_or_else(|| RevisionError::branch_not_found(path))
    }

    fn resolve_alias(&self, path: &str) -> Result<Option<RevisionBranch>> {
        let Some((parent_path, name)) = path.rsplit_once(SEPARATOR) else {
            return Ok(None);
        };
        let parent = match self.get_branch(parent_path) {
            Ok(parent) => parent,
            Err(RevisionError::NotFound { .. }) => return Ok(None),
            Err(err) => return Err(err),
        };
        let children = self
            .index
            .inner()
            .store
            .search_branches(&BranchQuery::new().parent(parent.path()).include_deleted(true))?;
        if let Some(child) = children.iter().find(|c| c.name() == name) {
            return Ok(Some(child.clone()));
        }
        let mut aliased: Vec<&RevisionBranch> = children
            .iter()
            .filter(|c| c.name_aliases().contains(name))
            .collect();
        aliased.sort_by_key(|c| c.is_deleted());
        Ok(aliased.first().map(|c| (*c).clone()))
    }

    pub fn get_branch_by_id(&self, id: i64) -> Result<RevisionBranch> {
        self.index
            .inner()
            .store
            .search_branches(&BranchQuery::new().include_deleted(true))?
            .into_iter()
            .find(|b| b.id() == id)
            .ok_or_else(|| RevisionError::NotFound {
                kind: "Branch",
                key: id.to_string(),
            })
    }

    /// Every descendant of `path`, deleted ones included, ordered by path.
    pub fn get_children(&self, path: &str) -> Result<Vec<RevisionBranch>> {
        let branch = self.get_branch(path)?;
        let prefix = format!("{}{}", branch.path(), SEPARATOR);
        Ok(self
            .index
            .inner()
            .store
            .search_branches(&BranchQuery::new().path_prefix(prefix).include_deleted(true))?)
    }

    pub fn search(&self, query: &BranchQuery) -> Result<Vec<RevisionBranch>> {
        Ok(self.index.inner().store.search_branches(query)?)
    }

    /// Flags the branch and all its descendants as deleted.
    pub fn delete(&self, path: &str) -> Result<()> {
        self.index.ensure_open()?;
        let branch = self.get_branch(path)?;
        if branch.is_main() {
            return Err(RevisionError::bad_request("Cannot delete the MAIN branch"));
        }
        let store = &self.index.inner().store;
        let children = self.get_children(&branch.path())?;
        for child in children.iter().rev().filter(|c| !c.is_deleted()) {
            store.update_branch(&child.path(), &BranchUpdate::Deleted)?;
            debug!(branch = %child.path(), "Deleted child branch");
        }
        store.update_branch(&branch.path(), &BranchUpdate::Deleted)?;
        info!(branch = %branch.path(), children = children.len(), "Deleted branch");
        self.notify(&branch.path());
        Ok(())
    }

    /// Replaces the alias set; returns `false` when nothing changed.
    pub fn update_name_aliases<I, S>(&self, path: &str, aliases: I) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.index.ensure_open()?;
        let aliases: BTreeSet<String> = aliases.into_iter().map(Into::into).collect();
        let _structure = self.registry().structure_lock.lock();
        let branch = self.get_branch(path)?;
        if branch.name_aliases() == &aliases {
            return Ok(false);
        }

        let siblings: Vec<RevisionBranch> = self
            .index
            .inner()
            .store
            .search_branches(&BranchQuery::new().parent(branch.parent_path()))?
            .into_iter()
            .filter(|s| s.id() != branch.id())
            .collect();
        for alias in &aliases {
            validate_branch_name(alias)?;
            if let Some(sibling) = siblings.iter().find(|s| s.name() == alias) {
                return Err(RevisionError::bad_request(format!(
                    "Alias '{alias}' conflicts with existing branch '{}'",
                    sibling.path()
                )));
            }
            if let Some(sibling) = siblings.iter().find(|s| s.name_aliases().contains(alias)) {
                return Err(RevisionError::bad_request(format!(
                    "Alias '{alias}' is already used by branch '{}'",
                    sibling.path()
                )));
            }
        }

        self.index
            .inner()
            .store
            .update_branch(&branch.path(), &BranchUpdate::NameAliases(aliases))?;
        info!(branch = %branch.path(), "Updated branch aliases");
        self.notify(&branch.path());
        Ok(true)
    }

    /// Merges `patch` into the metadata; `null` values remove keys.
    pub fn update_metadata(&self, path: &str, patch: Map<String, Value>) -> Result<RevisionBranch> {
        self.index.ensure_open()?;
        let branch = self.get_branch(path)?;
        let updated = self
            .index
            .inner()
            .store
            .update_branch(&branch.path(), &BranchUpdate::Metadata(patch))?;
        self.notify(&branch.path());
        Ok(updated)
    }

    /// State of `path` relative to `compare_with`.
    pub fn get_branch_state(&self, path: &str, compare_with: &str) -> Result<BranchState> {
        let branch = self.get_branch(path)?;
        let other = self.get_branch(compare_with)?;
        Ok(BranchState::compare(&branch, &other))
    }

    pub fn get_branch_state_of_parent(&self, path: &str) -> Result<BranchState> {
        let branch = self.get_branch(path)?;
        if branch.is_main() {
            return Err(RevisionError::bad_request("The MAIN branch has no parent"));
        }
        let parent = self.get_branch(branch.parent_path())?;
        Ok(BranchState::compare(&branch, &parent))
    }

    /// Starts configuring a merge, squash or rebase of `from` into `to`.
    pub fn prepare_merge(&self, from: &str, to: &str) -> BranchMergeOperation {
        BranchMergeOperation::new(self.index.clone(), from, to)
    }

    /// Called with the branch path after create, delete, commit and merge.
    pub fn add_listener<F>(&self, listener: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.registry().listeners.write().push(Arc::new(listener));
    }

    pub(crate) fn notify(&self, path: &str) {
        let listeners: Vec<BranchListener> = self.registry().listeners.read().clone();
        for listener in listeners {
            listener(path);
        }
    }

    /// Exclusive commit access to one branch, held until the guard drops.
    pub(crate) fn lock(&self, path: &str) -> Result<impl Sized> {
        let timeout = self.index.config().lock_timeout();
        let mutex = self
            .registry()
            .commit_locks
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.try_lock_arc_for(timeout).ok_or_else(|| {
            RevisionError::Timeout(format!(
                "Could not lock branch '{path}' within {} ms",
                timeout.as_millis()
            ))
        })
    }

    /// Applies a commit or merge script and notifies listeners.
    pub(crate) fn apply_update(&self, path: &str, update: &BranchUpdate) -> Result<RevisionBranch> {
        let updated = self.index.inner().store.update_branch(path, update)?;
        self.notify(path);
        Ok(updated)
    }
}

impl std::fmt::Debug for BranchManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BranchManager").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use revidx_core::{ErrorKind, IndexConfig, LogicalClock, MAIN_PATH};
    use serde_json::json;

    fn manager() -> BranchManager {
        RevisionIndex::with_clock(
            Arc::new(MemoryStore::new()),
            IndexConfig::default(),
            Arc::new(LogicalClock::starting_at(0)),
        )
        .unwrap()
        .branching()
    }

    #[test]
    fn test_create_assigns_increasing_ids() {
        let branching = manager();
        let a = branching.create_branch(MAIN_PATH, "a").unwrap();
        let b = branching.create_branch(&a, "b").unwrap();
        assert_eq!(a, "MAIN/a");
        assert_eq!(b, "MAIN/a/b");
        assert_eq!(branching.get_branch(&a).unwrap().id(), 1);
        assert_eq!(branching.get_branch(&b).unwrap().id(), 2);
        assert_eq!(branching.get_branch_by_id(2).unwrap().path(), "MAIN/a/b");
    }

    #[test]
    fn test_create_rejects_bad_names_and_duplicates() {
        let branching = manager();
        let err = branching.create_branch(MAIN_PATH, "has space").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        branching.create_branch(MAIN_PATH, "a").unwrap();
        let err = branching.create_branch(MAIN_PATH, "a").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        let err = branching.create_branch("MAIN/missing", "x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_alias_lookup_and_collisions() {
        let branching = manager();
        branching.create_branch(MAIN_PATH, "a").unwrap();
        branching.create_branch(MAIN_PATH, "b").unwrap();
        assert!(branching.update_name_aliases("MAIN/a", ["alpha"]).unwrap());
        assert!(!branching.update_name_aliases("MAIN/a", ["alpha"]).unwrap());
        assert_eq!(branching.get_branch("MAIN/alpha").unwrap().path(), "MAIN/a");

        let err = branching.update_name_aliases("MAIN/b", ["a"]).unwrap_err();
        assert!(err.to_string().contains("'a'"));
        let err = branching.update_name_aliases("MAIN/b", ["alpha"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        let err = branching.create_branch(MAIN_PATH, "alpha").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[test]
    fn test_metadata_patch() {
        let branching = manager();
        let mut metadata = Map::new();
        metadata.insert("owner".into(), json!("ana"));
        branching
            .create_branch_with_metadata(MAIN_PATH, "a", metadata)
            .unwrap();
        let mut patch = Map::new();
        patch.insert("owner".into(), Value::Null);
        patch.insert("review".into(), json!(true));
        let updated = branching.update_metadata("MAIN/a", patch).unwrap();
        assert_eq!(Value::Object(updated.metadata().clone()), json!({"review": true}));
    }

    #[test]
    fn test_listeners_see_lifecycle_events() {
        let branching = manager();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        branching.add_listener(move |path| sink.lock().push(path.to_string()));
        branching.create_branch(MAIN_PATH, "a").unwrap();
        branching.delete("MAIN/a").unwrap();
        assert_eq!(*seen.lock(), vec!["MAIN/a".to_string(), "MAIN/a".to_string()]);
    }

    #[test]
    fn test_lock_times_out_while_held() {
        let index = RevisionIndex::open(
            Arc::new(MemoryStore::new()),
            IndexConfig::default().with_lock_timeout(std::time::Duration::from_millis(10)),
        )
        .unwrap();
        let branching = index.branching();
        let _held = branching.lock(MAIN_PATH).unwrap();
        let err = branching.lock(MAIN_PATH).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(branching.lock("MAIN/other").is_ok());
    }
}

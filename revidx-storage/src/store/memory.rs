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

//! In-memory document store.

use super::{
    BranchQuery, CommitQuery, DocumentStore, Hits, Query, StoreError, TypeMapping, WriteOp,
};
use crate::revision::Revision;
use dashmap::DashMap;
use parking_lot::RwLock;
use revidx_core::{BranchUpdate, Commit, ObjectKey, RevisionBranch};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum ObjectKind {
    Revision,
    Branch,
    Commit,
    Mapping,
}

/// Snapshot envelope: a type tag plus the JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredObject {
    kind: ObjectKind,
    data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub revision_count: u64,
    pub revise_count: u64,
    pub branch_updates: u64,
    pub commit_count: u64,
}

/// Concurrent-map backed store.
///
/// Branch updates run under the map's per-entry write lock, which makes
/// every [`BranchUpdate`] script atomic with respect to other scripts.
#[derive(Default)]
pub struct MemoryStore {
    revisions: DashMap<ObjectKey, Vec<Revision>>,
    branches: DashMap<String, RevisionBranch>,
    commits: RwLock<Vec<Commit>>,
    mappings: DashMap<String, TypeMapping>,
    revision_count: AtomicU64,
    revise_count: AtomicU64,
    branch_updates: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            revision_count: self.revision_count.load(Ordering::Relaxed),
            revise_count: self.revise_count.load(Ordering::Relaxed),
            branch_updates: self.branch_updates.load(Ordering::Relaxed),
            commit_count: self.commits.read().len() as u64,
        }
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), StoreError> {
        let mut objects = Vec::new();
        for entry in self.revisions.iter() {
            for revision in entry.value() {
                objects.push(encode(ObjectKind::Revision, revision)?);
            }
        }
        for entry in self.branches.iter() {
            objects.push(encode(ObjectKind::Branch, entry.value())?);
        }
        for commit in self.commits.read().iter() {
            objects.push(encode(ObjectKind::Commit, commit)?);
        }
        for entry in self.mappings.iter() {
            objects.push(encode(ObjectKind::Mapping, entry.value())?);
        }

        let data = bincode::serialize(&objects)
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;
        std::fs::write(path, data)?;
        debug!(path = %path.display(), objects = objects.len(), "Saved store snapshot");
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self, StoreError> {
        let data = std::fs::read(path)?;
        let objects: Vec<StoredObject> = bincode::deserialize(&data)
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;

        let store = Self::new();
        for stored in objects {
            match stored.kind {
                ObjectKind::Revision => {
                    let revision: Revision = decode(&stored)?;
                    store.insert_revision(revision);
                }
                ObjectKind::Branch => {
                    let branch: RevisionBranch = decode(&stored)?;
                    store.branches.insert(branch.path(), branch);
                }
                ObjectKind::Commit => {
                    let commit: Commit = decode(&stored)?;
                    store.commits.write().push(commit);
                }
                ObjectKind::Mapping => {
                    let mapping: TypeMapping = decode(&stored)?;
                    store.mappings.insert(mapping.doc_type.clone(), mapping);
                }
            }
        }
        Ok(store)
    }

    fn insert_revision(&self, revision: Revision) {
        self.revision_count.fetch_add(1, Ordering::Relaxed);
        let mut entry = self.revisions.entry(revision.key()).or_default();
        entry.push(revision);
        entry.sort_by_key(|r| r.created);
    }
}

fn encode<T: Serialize>(kind: ObjectKind, value: &T) -> Result<StoredObject, StoreError> {
    let data =
        serde_json::to_vec(value).map_err(|e| StoreError::SerializationError(e.to_string()))?;
    Ok(StoredObject { kind, data })
}

fn decode<T: serde::de::DeserializeOwned>(stored: &StoredObject) -> Result<T, StoreError> {
    serde_json::from_slice(&stored.data).map_err(|e| StoreError::SerializationError(e.to_string()))
}

impl DocumentStore for MemoryStore {
    fn search(&self, query: &Query) -> Result<Hits<Revision>, StoreError> {
        let mut hits: Vec<Revision> = Vec::new();
        for entry in self.revisions.iter() {
            let key = entry.key();
            if !query.accepts_type(&key.doc_type) || !query.accepts_id(&key.id) {
                continue;
            }
            hits.extend(entry.value().iter().filter(|r| query.matches(r)).cloned());
        }
        hits.sort_by(|a, b| query.compare(a, b));
        let total = hits.len();
        if let Some(limit) = query.limit {
            hits.truncate(limit);
        }
        Ok(Hits::new(hits, total))
    }

    fn get(&self, key: &ObjectKey) -> Result<Vec<Revision>, StoreError> {
        Ok(self
            .revisions
            .get(key)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    fn bulk_write(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        for op in ops {
            match op {
                WriteOp::Put(revision) => self.insert_revision(revision),
                WriteOp::Revise {
                    key,
                    created,
                    revised,
                } => {
                    let mut entry = self
                        .revisions
                        .get_mut(&key)
                        .ok_or_else(|| StoreError::RevisionNotFound {
                            key: key.clone(),
                            created,
                        })?;
                    let revision = entry
                        .iter_mut()
                        .find(|r| r.created == created)
                        .ok_or_else(|| StoreError::RevisionNotFound {
                            key: key.clone(),
                            created,
                        })?;
                    revision.revised.insert(revised);
                    self.revise_count.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        Ok(())
    }

    fn get_branch(&self, path: &str) -> Result<Option<RevisionBranch>, StoreError> {
        Ok(self.branches.get(path).map(|b| b.value().clone()))
    }

    fn put_branch(&self, branch: RevisionBranch) -> Result<(), StoreError> {
        self.branches.insert(branch.path(), branch);
        Ok(())
    }

    fn update_branch(
        &self,
        path: &str,
        update: &BranchUpdate,
    ) -> Result<RevisionBranch, StoreError> {
        let mut entry = self
            .branches
            .get_mut(path)
            .ok_or_else(|| StoreError::BranchNotFound(path.to_string()))?;
        let updated = entry.apply(update);
        *entry = updated.clone();
        self.branch_updates.fetch_add(1, Ordering::Relaxed);
        debug!(branch = path, script = update.script_name(), "Applied branch update");
        Ok(updated)
    }

    fn search_branches(&self, query: &BranchQuery) -> Result<Vec<RevisionBranch>, StoreError> {
        let mut branches: Vec<RevisionBranch> = self
            .branches
            .iter()
            .filter(|entry| query.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        branches.sort_by_key(|b| b.path());
        Ok(branches)
    }

    fn put_commit(&self, commit: Commit) -> Result<(), StoreError> {
        self.commits.write().push(commit);
        Ok(())
    }

    fn search_commits(&self, query: &CommitQuery) -> Result<Vec<Commit>, StoreError> {
        let mut commits: Vec<Commit> = self
            .commits
            .read()
            .iter()
            .filter(|c| query.matches(c))
            .cloned()
            .collect();
        commits.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = query.limit {
            commits.truncate(limit);
        }
        Ok(commits)
    }

    fn put_mapping(&self, mapping: TypeMapping) -> Result<(), StoreError> {
        debug!(doc_type = %mapping.doc_type, set_fields = ?mapping.set_fields, "Stored type mapping");
        self.mappings.insert(mapping.doc_type.clone(), mapping);
        Ok(())
    }

    fn mappings(&self) -> Result<Vec<TypeMapping>, StoreError> {
        let mut mappings: Vec<TypeMapping> =
            self.mappings.iter().map(|entry| entry.value().clone()).collect();
        mappings.sort_by(|a, b| a.doc_type.cmp(&b.doc_type));
        Ok(mappings)
    }
}

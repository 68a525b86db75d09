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

//! Document store collaborator.
//!
//! The revision layer needs four primitives from the store underneath it:
//! search, get, bulk write and scripted partial updates of branch documents.
//! Type mappings are stored alongside so merge semantics survive a reopen.
//! [`MemoryStore`] implements them over concurrent maps.

mod memory;
mod query;

pub use memory::{MemoryStore, StoreStats};
pub use query::{
    compare_values, BranchQuery, CommitQuery, Filter, Hits, Query, SortBy, SortOrder,
};

use crate::revision::Revision;
use revidx_core::{
    BranchUpdate, Commit, ObjectKey, RevisionBranch, RevisionBranchPoint, RevisionError,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Revision not found: {key} created at {created}")]
    RevisionNotFound {
        key: ObjectKey,
        created: RevisionBranchPoint,
    },

    #[error("Branch document not found: {0}")]
    BranchNotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<StoreError> for RevisionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::BranchNotFound(path) => RevisionError::branch_not_found(path),
            other => RevisionError::Storage(other.to_string()),
        }
    }
}

/// A single operation of a bulk write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Stores a new revision.
    Put(Revision),
    /// Marks an existing revision as superseded at `revised`.
    Revise {
        key: ObjectKey,
        created: RevisionBranchPoint,
        revised: RevisionBranchPoint,
    },
}

/// Persisted merge semantics of one document type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeMapping {
    pub doc_type: String,
    #[serde(default)]
    pub set_fields: BTreeSet<String>,
}

pub trait DocumentStore: Send + Sync {
    fn search(&self, query: &Query) -> Result<Hits<Revision>, StoreError>;

    /// Every stored revision of one document, oldest first.
    fn get(&self, key: &ObjectKey) -> Result<Vec<Revision>, StoreError>;

    fn bulk_write(&self, ops: Vec<WriteOp>) -> Result<(), StoreError>;

    fn get_branch(&self, path: &str) -> Result<Option<RevisionBranch>, StoreError>;

    /// Inserts or replaces a whole branch document.
    fn put_branch(&self, branch: RevisionBranch) -> Result<(), StoreError>;

    /// Applies a partial update script atomically and returns the new value.
    fn update_branch(
        &self,
        path: &str,
        update: &BranchUpdate,
    ) -> Result<RevisionBranch, StoreError>;

    fn search_branches(&self, query: &BranchQuery) -> Result<Vec<RevisionBranch>, StoreError>;

    fn put_commit(&self, commit: Commit) -> Result<(), StoreError>;

    /// Matching commits, newest first.
    fn search_commits(&self, query: &CommitQuery) -> Result<Vec<Commit>, StoreError>;

    /// Inserts or replaces the mapping of `mapping.doc_type`.
    fn put_mapping(&self, mapping: TypeMapping) -> Result<(), StoreError>;

    fn mappings(&self) -> Result<Vec<TypeMapping>, StoreError>;
}

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

//! Revidx Storage
//!
//! Branch-scoped document revisions on top of a document store:
//!
//! - [`RevisionIndex`]: reads through branch expressions, staged writes
//! - [`BranchManager`]: branch lifecycle, aliases, state and merges
//! - [`StagingArea`]: the commit protocol with hooks and conflict checks
//! - [`BranchMergeOperation`]: merge, squash and rebase
//! - [`RevisionCompare`]: directional diffs between branch states
//! - [`AncestorsHook`]: derived ancestor sets kept current on commit
//!
//! # Example
//!
//! ```no_run
//! use revidx_storage::{Document, RevisionIndex};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone, Serialize, Deserialize)]
//! struct Concept {
//!     id: String,
//!     term: String,
//! }
//!
//! impl Document for Concept {
//!     const TYPE: &'static str = "concept";
//!     fn id(&self) -> &str {
//!         &self.id
//!     }
//! }
//!
//! # fn main() -> revidx_core::Result<()> {
//! let index = RevisionIndex::in_memory()?;
//! let task = index.branching().create_branch("MAIN", "task-1")?;
//! index.write(&task, index.current_time(), |staging| {
//!     staging.stage_new(&Concept { id: "1".into(), term: "Heart".into() })
//! })?;
//! index.branching().prepare_merge(&task, "MAIN").squash(true).merge()?;
//! # Ok(())
//! # }
//! ```

pub mod branching;
pub mod compare;
pub mod derived;
pub mod document;
pub mod hooks;
pub mod index;
pub mod merge;
pub mod revision;
pub mod searcher;
pub mod staging;
pub mod store;

pub use branching::BranchManager;
pub use compare::{value_as_string, RevisionCompare, RevisionCompareDetail};
pub use derived::{AncestorsHook, Edge, Node};
pub use document::{Document, DocumentMapping, StagedObject};
pub use hooks::{Hook, HookHandle, Hooks, PostCommitHook, PreCommitHook};
pub use index::{ResolvedRef, RevisionIndex};
pub use merge::{
    BranchMergeOperation, DefaultConflictProcessor, KeepTargetProcessor, PropertyClash,
    RevisionConflictProcessor,
};
pub use revision::Revision;
pub use searcher::RevisionSearcher;
pub use staging::{CommitSubjectSupplier, StagedChange, StagingArea};
pub use store::{
    BranchQuery, CommitQuery, DocumentStore, Filter, Hits, MemoryStore, Query, SortOrder,
    StoreError, TypeMapping, WriteOp,
};

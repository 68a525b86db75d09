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

//! The persisted branch entity.
//!
//! Branches are immutable values. Every change (commit, merge, rename of
//! aliases, deletion) is expressed as a [`BranchUpdate`] script which the
//! store applies atomically to the stored document, producing a new value.

use crate::branch_ref::{normalize, RevisionBranchRef};
use crate::point::RevisionBranchPoint;
use crate::segment::RevisionSegment;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

pub const MAIN_PATH: &str = "MAIN";
pub const MAIN_BRANCH_ID: i64 = 0;
pub const SEPARATOR: char = '/';

/// Relationship of one branch's content to another's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BranchState {
    UpToDate,
    Forward,
    Behind,
    Diverged,
    Stale,
}

impl BranchState {
    /// Derives the state from the two set differences.
    pub fn of(branch: &RevisionBranchRef, other: &RevisionBranchRef) -> Self {
        let ahead = !branch.difference(other).is_empty();
        let behind = !other.difference(branch).is_empty();
        match (ahead, behind) {
            (false, false) => Self::UpToDate,
            (true, false) => Self::Forward,
            (false, true) => Self::Behind,
            (true, true) => Self::Diverged,
        }
    }

    /// State of `branch` relative to `other`; deleted branches are stale.
    pub fn compare(branch: &RevisionBranch, other: &RevisionBranch) -> Self {
        if branch.is_deleted() || other.is_deleted() {
            return Self::Stale;
        }
        Self::of(&branch.effective_ref(), &other.effective_ref())
    }
}

/// One merge, rebase or branch-point event in a branch's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionBranchMergeSource {
    pub timestamp: i64,
    pub source_branch_id: i64,
    /// Content brought in by this event, visible or copied.
    pub merged_segments: BTreeSet<RevisionSegment>,
    #[serde(default)]
    pub squash: bool,
    #[serde(default)]
    pub rebase: bool,
    /// Ids skipped by a squash merge.
    #[serde(default)]
    pub excluded: BTreeSet<String>,
}

impl RevisionBranchMergeSource {
    pub fn branch_points(&self) -> BTreeSet<RevisionBranchPoint> {
        self.merged_segments
            .iter()
            .map(RevisionSegment::end_point)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionBranch {
    id: i64,
    name: String,
    parent_path: String,
    segments: BTreeSet<RevisionSegment>,
    #[serde(default)]
    merge_sources: Vec<RevisionBranchMergeSource>,
    #[serde(default)]
    metadata: Map<String, Value>,
    #[serde(default)]
    name_aliases: BTreeSet<String>,
    #[serde(default)]
    deleted: bool,
}

impl RevisionBranch {
    pub fn main(base_timestamp: i64) -> Self {
        Self {
            id: MAIN_BRANCH_ID,
            name: MAIN_PATH.to_string(),
            parent_path: String::new(),
            segments: BTreeSet::from([RevisionSegment::new(
                MAIN_BRANCH_ID,
                base_timestamp,
                base_timestamp,
            )]),
            merge_sources: Vec::new(),
            metadata: Map::new(),
            name_aliases: BTreeSet::new(),
            deleted: false,
        }
    }

    /// A new branch under `parent` that sees the parent's content as of `base_timestamp`.
    pub fn child(
        parent: &RevisionBranch,
        id: i64,
        name: impl Into<String>,
        base_timestamp: i64,
        metadata: Map<String, Value>,
    ) -> Self {
        let mut segments = normalize(parent.segments.iter().copied());
        segments.insert(RevisionSegment::new(id, base_timestamp, base_timestamp));
        Self {
            id,
            name: name.into(),
            parent_path: parent.path(),
            segments,
            merge_sources: vec![RevisionBranchMergeSource {
                timestamp: base_timestamp,
                source_branch_id: parent.id,
                // Copies the parent received count as already merged here.
                merged_segments: parent.effective_ref().segments().clone(),
                squash: false,
                rebase: false,
                excluded: BTreeSet::new(),
            }],
            metadata,
            name_aliases: BTreeSet::new(),
            deleted: false,
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent_path(&self) -> &str {
        &self.parent_path
    }

    pub fn path(&self) -> String {
        if self.parent_path.is_empty() {
            self.name.clone()
        } else {
            format!("{}{}{}", self.parent_path, SEPARATOR, self.name)
        }
    }

    pub fn is_main(&self) -> bool {
        self.id == MAIN_BRANCH_ID
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn segments(&self) -> &BTreeSet<RevisionSegment> {
        &self.segments
    }

    pub fn merge_sources(&self) -> &[RevisionBranchMergeSource] {
        &self.merge_sources
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn name_aliases(&self) -> &BTreeSet<String> {
        &self.name_aliases
    }

    /// Alternative full paths this branch answers to.
    pub fn path_aliases(&self) -> BTreeSet<String> {
        self.name_aliases
            .iter()
            .map(|alias| {
                if self.parent_path.is_empty() {
                    alias.clone()
                } else {
                    format!("{}{}{}", self.parent_path, SEPARATOR, alias)
                }
            })
            .collect()
    }

    /// The latest segment owned by this branch; commits extend its end.
    pub fn own_segment(&self) -> RevisionSegment {
        self.segments
            .iter()
            .filter(|s| s.branch_id() == self.id)
            .max_by_key(|s| s.start())
            .copied()
            .unwrap_or_else(|| RevisionSegment::new(self.id, 0, 0))
    }

    pub fn head_timestamp(&self) -> i64 {
        self.own_segment().end()
    }

    pub fn base_timestamp(&self) -> i64 {
        self.own_segment().start()
    }

    pub fn head(&self) -> RevisionBranchPoint {
        self.own_segment().end_point()
    }

    /// Visible content.
    pub fn branch_ref(&self) -> RevisionBranchRef {
        RevisionBranchRef::new(self.id, self.path(), self.segments.iter().copied())
    }

    /// Visible content plus everything merge sources brought in by copy.
    pub fn effective_ref(&self) -> RevisionBranchRef {
        RevisionBranchRef::new(
            self.id,
            self.path(),
            self.segments.iter().copied().chain(
                self.merge_sources
                    .iter()
                    .flat_map(|source| source.merged_segments.iter().copied()),
            ),
        )
    }

    /// Content inherited from ancestors, without this branch's own segments.
    pub fn base_ref(&self) -> RevisionBranchRef {
        self.branch_ref().without_branch(self.id)
    }

    pub fn is_descendant_of(&self, ancestor_path: &str) -> bool {
        let path = self.path();
        path.len() > ancestor_path.len()
            && path.starts_with(ancestor_path)
            && path[ancestor_path.len()..].starts_with(SEPARATOR)
    }

    /// Latest squash merge recorded from the given source branch.
    pub fn last_squash_from(&self, source_branch_id: i64) -> Option<&RevisionBranchMergeSource> {
        self.merge_sources
            .iter()
            .rev()
            .find(|source| source.squash && source.source_branch_id == source_branch_id)
    }

    pub fn with_deleted(&self) -> Self {
        Self {
            deleted: true,
            ..self.clone()
        }
    }

    pub fn with_name_aliases(&self, name_aliases: BTreeSet<String>) -> Self {
        Self {
            name_aliases,
            ..self.clone()
        }
    }

    /// Applies a partial metadata patch; `null` values remove keys.
    pub fn with_metadata_patch(&self, patch: &Map<String, Value>) -> Self {
        let mut metadata = self.metadata.clone();
        for (key, value) in patch {
            if value.is_null() {
                metadata.remove(key);
            } else {
                metadata.insert(key.clone(), value.clone());
            }
        }
        Self {
            metadata,
            ..self.clone()
        }
    }

    pub fn with_head(&self, head: i64) -> Self {
        let own = self.own_segment();
        if head <= own.end() {
            return self.clone();
        }
        let mut segments = self.segments.clone();
        segments.remove(&own);
        segments.insert(own.with_end(head));
        Self {
            segments,
            ..self.clone()
        }
    }

    /// Attaches merged segments, opens a new own segment on rebase and records the event.
    pub fn with_merge(&self, merge: &MergeUpdate) -> Self {
        let (own, inherited): (Vec<RevisionSegment>, Vec<RevisionSegment>) = self
            .segments
            .iter()
            .copied()
            .partition(|s| s.branch_id() == self.id);
        let attached = merge
            .attach
            .iter()
            .copied()
            .filter(|s| s.branch_id() != self.id);
        let mut segments = normalize(inherited.into_iter().chain(attached));
        segments.extend(own);
        if let Some(base) = merge.rebase_base {
            segments.insert(RevisionSegment::new(self.id, base, base));
        }
        let mut merge_sources = self.merge_sources.clone();
        merge_sources.push(merge.source.clone());
        Self {
            segments,
            merge_sources,
            ..self.clone()
        }
    }

    /// Produces the branch value after `update`.
    pub fn apply(&self, update: &BranchUpdate) -> Self {
        match update {
            BranchUpdate::Commit { head, merge } => {
                let merged = match merge {
                    Some(merge) => self.with_merge(merge),
                    None => self.clone(),
                };
                match head {
                    Some(head) => merged.with_head(*head),
                    None => merged,
                }
            }
            BranchUpdate::Deleted => self.with_deleted(),
            BranchUpdate::Metadata(patch) => self.with_metadata_patch(patch),
            BranchUpdate::NameAliases(aliases) => self.with_name_aliases(aliases.clone()),
        }
    }
}

/// Segment and history changes made by a merge or rebase commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeUpdate {
    pub attach: BTreeSet<RevisionSegment>,
    pub rebase_base: Option<i64>,
    pub source: RevisionBranchMergeSource,
}

/// Partial-field update scripts applied to a stored branch document.
///
/// Each script touches only its own fields, so two scripts racing on the
/// same branch (a metadata patch and a head move, say) both survive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BranchUpdate {
    Commit {
        head: Option<i64>,
        merge: Option<MergeUpdate>,
    },
    Deleted,
    Metadata(Map<String, Value>),
    NameAliases(BTreeSet<String>),
}

impl BranchUpdate {
    pub fn script_name(&self) -> &'static str {
        match self {
            Self::Commit { merge: Some(_), .. } => "merge",
            Self::Commit { .. } => "commit",
            Self::Deleted => "delete",
            Self::Metadata(_) => "metadata",
            Self::NameAliases(_) => "aliases",
        }
    }
}

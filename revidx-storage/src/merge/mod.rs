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

//! Merge, squash and rebase between branches.
//!
//! The source's net changes since the target last saw it are computed once
//! (`source - effective(target)`), then each changed object is classified
//! against the target's current revision:
//!
//! | target state                         | handling                            |
//! |--------------------------------------|-------------------------------------|
//! | still at the source's base revision  | source change applies as-is         |
//! | already merged into the source       | source version replaces it          |
//! | changed independently                | deletion wins, else field merge     |
//!
//! A plain merge or rebase attaches the source's segments to the target, so
//! cleanly applied changes need no writes; only resolved objects are staged
//! and the source revisions they replace are superseded on the target. A
//! squash merge attaches nothing and stages every change as one commit.
//! Either way the result goes through the normal commit path, so pre-commit
//! hooks see merges exactly like any other commit.

mod processor;
mod properties;

pub use processor::{DefaultConflictProcessor, KeepTargetProcessor, RevisionConflictProcessor};
pub use properties::{merge_properties, PropertyClash};

use crate::compare::{collect_changes, ObjectChange};
use crate::document::StagedObject;
use crate::index::RevisionIndex;
use crate::revision::Revision;
use crate::searcher::RevisionSearcher;
use crate::staging::{MergeContext, StagingArea};
use crate::store::{Filter, Query};
use revidx_core::{
    BranchMergeConflict, BranchState, ChangeKind, Commit, Conflict, MergeOperation, MergeUpdate,
    ObjectKey, Result, RevisionBranch, RevisionBranchMergeSource, RevisionBranchPoint,
    RevisionBranchRef, RevisionError, RevisionSegment,
};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

/// A configured merge of one branch into another; run with [`merge`](Self::merge).
pub struct BranchMergeOperation {
    index: RevisionIndex,
    from: String,
    to: String,
    squash: bool,
    exclusions: BTreeSet<String>,
    author: Option<String>,
    comment: Option<String>,
    processor: Arc<dyn RevisionConflictProcessor>,
}

impl BranchMergeOperation {
    pub(crate) fn new(index: RevisionIndex, from: &str, to: &str) -> Self {
        Self {
            index,
            from: from.to_string(),
            to: to.to_string(),
            squash: false,
            exclusions: BTreeSet::new(),
            author: None,
            comment: None,
            processor: Arc::new(DefaultConflictProcessor),
        }
    }

    pub fn squash(mut self, squash: bool) -> Self {
        self.squash = squash;
        self
    }

    /// Object ids a squash merge leaves behind.
    pub fn exclude<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclusions.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn commit_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn conflict_processor(mut self, processor: impl RevisionConflictProcessor + 'static) -> Self {
        self.processor = Arc::new(processor);
        self
    }

    /// Returns `None` when the target already has everything the source has.
    pub fn merge(self) -> Result<Option<Commit>> {
        self.index.ensure_open()?;
        let branching = self.index.branching();
        let from = branching.get_branch(&self.from)?;
        let to = branching.get_branch(&self.to)?;
        if from.path() == to.path() {
            return Err(RevisionError::bad_request(format!(
                "Cannot merge branch '{}' into itself",
                to.path()
            )));
        }
        if !self.squash && !self.exclusions.is_empty() {
            return Err(RevisionError::bad_request(
                "Exclusions are only supported for squash merges",
            ));
        }
        if let Some(deleted) = [&from, &to].into_iter().find(|b| b.is_deleted()) {
            return Err(RevisionError::bad_request(format!(
                "Cannot merge deleted branch '{}'",
                deleted.path()
            )));
        }

        let _guard = branching.lock(&to.path())?;
        let to = branching.get_branch(&to.path())?;
        let from = branching.get_branch(&from.path())?;

        let deferred: BTreeSet<String> = match to.last_squash_from(from.id()) {
            Some(previous) if self.squash => previous
                .excluded
                .difference(&self.exclusions)
                .cloned()
                .collect(),
            _ => BTreeSet::new(),
        };
        let state = BranchState::compare(&from, &to);
        if matches!(state, BranchState::UpToDate | BranchState::Behind) && deferred.is_empty() {
            debug!(from = %from.path(), to = %to.path(), ?state, "Nothing to merge");
            return Ok(None);
        }

        let operation = if self.squash {
            MergeOperation::Squash
        } else if to.is_descendant_of(&from.path()) {
            MergeOperation::Rebase
        } else {
            MergeOperation::Merge
        };
        let staging = self.plan(&from, &to, operation, &deferred)?;
        let staged = staging.change_count();

        let author = self
            .author
            .clone()
            .unwrap_or_else(|| self.index.config().default_author.clone());
        let comment = self.comment.clone().unwrap_or_else(|| match operation {
            MergeOperation::Rebase => format!("Rebased {} on {}", to.path(), from.path()),
            MergeOperation::Squash => format!("Squash merged {} into {}", from.path(), to.path()),
            _ => format!("Merged {} into {}", from.path(), to.path()),
        });
        let commit = staging.commit_locked(self.index.current_time(), &author, &comment)?;
        info!(
            from = %from.path(),
            to = %to.path(),
            %operation,
            staged,
            commit = %commit.id,
            "Merged branch"
        );
        Ok(Some(commit))
    }

    fn plan(
        &self,
        from: &RevisionBranch,
        to: &RevisionBranch,
        operation: MergeOperation,
        deferred: &BTreeSet<String>,
    ) -> Result<StagingArea> {
        let store = self.index.store();
        let window = self.index.config().result_window;
        let from_ref = from.branch_ref();
        let from_effective = from.effective_ref();
        let to_effective = to.effective_ref();

        let changes = collect_changes(store.as_ref(), &to_effective, &from_ref)?;
        let target = RevisionSearcher::new(Arc::clone(store), to.branch_ref(), window);

        let mut plan = Plan::default();
        for (key, change) in &changes {
            if self.squash && self.exclusions.contains(&key.id) {
                debug!(object = %key, "Excluded from squash merge");
                continue;
            }
            plan.incoming.insert(key.clone(), incoming_entry(change));
            let current = target.get_revision(key)?;
            self.resolve(&mut plan, key, change, current, &from_effective);
        }
        if !deferred.is_empty() {
            self.apply_deferred(&mut plan, deferred, &changes, &from_ref, &target)?;
        }

        if !plan.conflicts.is_empty() {
            return Err(BranchMergeConflict::new(to.path(), operation, plan.conflicts).into());
        }

        let attach: BTreeSet<RevisionSegment> = if self.squash {
            BTreeSet::new()
        } else {
            from_ref
                .difference(&to_effective)
                .segments()
                .iter()
                .filter(|s| s.branch_id() != to.id())
                .copied()
                .collect()
        };
        let rebase = operation == MergeOperation::Rebase;
        let context = MergeContext {
            operation,
            source_head: from.head(),
            update: MergeUpdate {
                attach,
                rebase_base: rebase.then(|| self.index.current_time()),
                source: RevisionBranchMergeSource {
                    timestamp: 0,
                    source_branch_id: from.id(),
                    merged_segments: from_effective.difference(&to_effective).segments().clone(),
                    squash: self.squash,
                    rebase,
                    excluded: if self.squash {
                        self.exclusions.clone()
                    } else {
                        BTreeSet::new()
                    },
                },
            },
            revise_on_source: plan.revise_on_source,
            incoming: plan.incoming,
            squash: self.squash,
        };

        let mut staging = StagingArea::for_merge(self.index.clone(), to, context);
        for object in plan.removed {
            staging.stage_removed_object(object);
        }
        for object in plan.added {
            staging.stage_new_object(object);
        }
        for (old, new) in plan.changed {
            staging.stage_changed_object(old, new);
        }
        Ok(staging)
    }

    fn resolve(
        &self,
        plan: &mut Plan,
        key: &ObjectKey,
        change: &ObjectChange,
        current: Option<Revision>,
        from_effective: &RevisionBranchRef,
    ) {
        let mapping = self.index.mapping(&key.doc_type);
        let untouched = match (change.before(), &current) {
            (Some(before), Some(current)) => before.created == current.created,
            (None, None) => true,
            _ => false,
        };

        if untouched {
            if !self.squash {
                return;
            }
            match (change.after(), current) {
                (Some(after), None) => plan.added.push(StagedObject::from_revision(after, &mapping)),
                (Some(after), Some(current)) => plan.changed.push((
                    StagedObject::from_revision(&current, &mapping),
                    StagedObject::from_revision(after, &mapping),
                )),
                (None, Some(current)) => {
                    plan.removed.push(StagedObject::from_revision(&current, &mapping))
                }
                (None, None) => {}
            }
            return;
        }

        let Some(current) = current else {
            if let Some(after) = change.after() {
                debug!(object = %key, "Removed on target, ignoring source change");
                plan.supersede(&after.key(), after.created, self.squash);
            }
            return;
        };
        let target_object = StagedObject::from_revision(&current, &mapping);
        let Some(after) = change.after() else {
            debug!(object = %key, "Removed on source, deletion wins");
            plan.removed.push(target_object);
            return;
        };

        let added_alike = change.before().is_none() && after.same_content(&current);
        if added_alike || from_effective.contains(&current.created) {
            debug!(object = %key, "Target version already merged into source");
            if !after.same_content(&current) {
                let new = StagedObject::from_revision(after, &mapping);
                plan.changed.push((target_object, new));
            }
            plan.supersede(key, after.created, self.squash);
            return;
        }

        let base = match change.before() {
            Some(before) => before.source.clone(),
            None if self.squash => {
                let new = StagedObject::from_revision(after, &mapping);
                plan.changed.push((target_object, new));
                return;
            }
            None => {
                plan.conflicts.push(Conflict::AddedInSourceAndTarget { object: key.clone() });
                return;
            }
        };
        match merge_properties(
            key,
            &mapping,
            &base,
            &after.source,
            &current.source,
            self.squash,
            self.processor.as_ref(),
        ) {
            Ok(merged) => {
                debug!(object = %key, "Merged changes from both sides");
                if merged != current.source {
                    let new = target_object.with_source(merged, &mapping);
                    plan.changed.push((target_object, new));
                }
                plan.supersede(key, after.created, self.squash);
            }
            Err(clashes) => {
                plan.conflicts.extend(clashes.into_iter().map(|clash| {
                    Conflict::ChangedInSourceAndTarget {
                        object: key.clone(),
                        property: clash.property,
                        source_value: clash.source.unwrap_or(Value::Null),
                        target_value: clash.target.unwrap_or(Value::Null),
                    }
                }))
            }
        }
    }

    /// Brings across ids an earlier squash from the same source left out.
    fn apply_deferred(
        &self,
        plan: &mut Plan,
        deferred: &BTreeSet<String>,
        changes: &BTreeMap<ObjectKey, ObjectChange>,
        from_ref: &RevisionBranchRef,
        target: &RevisionSearcher,
    ) -> Result<()> {
        let store = self.index.store();
        let source = RevisionSearcher::new(
            Arc::clone(store),
            from_ref.clone(),
            self.index.config().result_window,
        );
        let keys: BTreeSet<ObjectKey> = store
            .search(
                &Query::new()
                    .ids(deferred.iter().cloned())
                    .filter(Filter::Touched(from_ref.clone())),
            )?
            .iter()
            .map(Revision::key)
            .collect();

        for key in keys.into_iter().filter(|k| !changes.contains_key(k)) {
            let mapping = self.index.mapping(&key.doc_type);
            let theirs = source.get_revision(&key)?;
            let ours = target.get_revision(&key)?;
            let (op, container) = match (&theirs, &ours) {
                (Some(t), Some(o)) if t.same_content(o) => continue,
                (Some(t), Some(o)) => {
                    plan.changed.push((
                        StagedObject::from_revision(o, &mapping),
                        StagedObject::from_revision(t, &mapping),
                    ));
                    (ChangeKind::Change, t.container_id.clone())
                }
                (Some(t), None) => {
                    plan.added.push(StagedObject::from_revision(t, &mapping));
                    (ChangeKind::Add, t.container_id.clone())
                }
                (None, Some(o)) => {
                    plan.removed.push(StagedObject::from_revision(o, &mapping));
                    (ChangeKind::Remove, o.container_id.clone())
                }
                (None, None) => continue,
            };
            debug!(object = %key, "Applying previously excluded change");
            plan.incoming.insert(key, (op, container));
        }
        Ok(())
    }
}

impl std::fmt::Debug for BranchMergeOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BranchMergeOperation")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("squash", &self.squash)
            .field("exclusions", &self.exclusions)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct Plan {
    added: Vec<StagedObject>,
    changed: Vec<(StagedObject, StagedObject)>,
    removed: Vec<StagedObject>,
    revise_on_source: BTreeSet<(ObjectKey, RevisionBranchPoint)>,
    incoming: BTreeMap<ObjectKey, (ChangeKind, Option<String>)>,
    conflicts: Vec<Conflict>,
}

impl Plan {
    /// Hides the attached source revision behind the target's own version.
    fn supersede(&mut self, key: &ObjectKey, created: RevisionBranchPoint, squash: bool) {
        if !squash {
            self.revise_on_source.insert((key.clone(), created));
        }
    }
}

fn incoming_entry(change: &ObjectChange) -> (ChangeKind, Option<String>) {
    let container = change
        .after()
        .or_else(|| change.before())
        .and_then(|r| r.container_id.clone());
    (change.kind(), container)
}

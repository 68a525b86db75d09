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

//! Staging and committing changes to one branch.
//!
//! A [`StagingArea`] collects new, changed and removed documents against the
//! branch state it was opened on. [`StagingArea::commit`] then:
//!
//! 1. takes the branch's commit lock,
//! 2. runs pre-commit hooks, which may stage more changes,
//! 3. reconciles with commits that landed since the area was opened,
//! 4. writes revisions and supersession markers, the commit record and,
//!    last, the branch head,
//! 5. logs commit watermarks and runs post-commit hooks.
//!
//! Nothing becomes visible before step 4 moves the head, so a failure at any
//! earlier step leaves the branch untouched.

use crate::document::{Document, StagedObject};
use crate::index::RevisionIndex;
use crate::merge::{merge_properties, DefaultConflictProcessor};
use crate::revision::Revision;
use crate::searcher::RevisionSearcher;
use crate::store::{Filter, Query, WriteOp};
use revidx_core::{
    BranchMergeConflict, BranchUpdate, ChangeKind, Commit, CommitDetail, Conflict, MergeOperation,
    MergeUpdate, ObjectKey, Result, RevisionBranch, RevisionBranchPoint, RevisionBranchRef,
    RevisionError,
};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Supplies extra commit subjects computed from the staged content.
pub trait CommitSubjectSupplier: Send + Sync {
    fn subjects(&self, staging: &StagingArea) -> BTreeSet<String>;
}

impl<F> CommitSubjectSupplier for F
where
    F: Fn(&StagingArea) -> BTreeSet<String> + Send + Sync,
{
    fn subjects(&self, staging: &StagingArea) -> BTreeSet<String> {
        self(staging)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StagedChange {
    pub old: StagedObject,
    pub new: StagedObject,
}

/// What a merge or rebase adds on top of a plain commit.
#[derive(Debug, Clone)]
pub(crate) struct MergeContext {
    pub(crate) operation: MergeOperation,
    pub(crate) source_head: RevisionBranchPoint,
    pub(crate) update: MergeUpdate,
    /// Source revisions the target supersedes at commit time.
    pub(crate) revise_on_source: BTreeSet<(ObjectKey, RevisionBranchPoint)>,
    /// Net changes the merge brings in, including ones resolved away.
    pub(crate) incoming: BTreeMap<ObjectKey, (ChangeKind, Option<String>)>,
    pub(crate) squash: bool,
}

pub struct StagingArea {
    index: RevisionIndex,
    branch_path: String,
    base_ref: RevisionBranchRef,
    new_objects: BTreeMap<ObjectKey, StagedObject>,
    changed_objects: BTreeMap<ObjectKey, StagedChange>,
    removed_objects: BTreeMap<ObjectKey, StagedObject>,
    merge: Option<MergeContext>,
    subject_supplier: Option<Arc<dyn CommitSubjectSupplier>>,
    group_id: Option<String>,
}

impl StagingArea {
    pub(crate) fn new(index: RevisionIndex, branch: &RevisionBranch) -> Self {
        Self {
            index,
            branch_path: branch.path(),
            base_ref: branch.branch_ref(),
            new_objects: BTreeMap::new(),
            changed_objects: BTreeMap::new(),
            removed_objects: BTreeMap::new(),
            merge: None,
            subject_supplier: None,
            group_id: None,
        }
    }

    pub(crate) fn for_merge(index: RevisionIndex, branch: &RevisionBranch, merge: MergeContext) -> Self {
        let mut staging = Self::new(index, branch);
        staging.merge = Some(merge);
        staging
    }

    pub fn branch_path(&self) -> &str {
        &self.branch_path
    }

    /// Branch state the staged changes were made against.
    pub fn base_ref(&self) -> &RevisionBranchRef {
        &self.base_ref
    }

    pub fn index(&self) -> &RevisionIndex {
        &self.index
    }

    pub fn set_subject_supplier(&mut self, supplier: impl CommitSubjectSupplier + 'static) {
        self.subject_supplier = Some(Arc::new(supplier));
    }

    pub fn set_group_id(&mut self, group_id: impl Into<String>) {
        self.group_id = Some(group_id.into());
    }

    pub fn stage_new<D: Document>(&mut self, doc: &D) -> Result<()> {
        self.register::<D>()?;
        self.stage_new_object(StagedObject::from_document(doc)?);
        Ok(())
    }

    pub fn stage_change<D: Document>(&mut self, old: &D, new: &D) -> Result<()> {
        if old.id() != new.id() {
            return Err(RevisionError::illegal_argument(format!(
                "Cannot change document '{}' into '{}'",
                old.id(),
                new.id()
            )));
        }
        self.register::<D>()?;
        self.stage_changed_object(StagedObject::from_document(old)?, StagedObject::from_document(new)?);
        Ok(())
    }

    pub fn stage_remove<D: Document>(&mut self, doc: &D) -> Result<()> {
        self.register::<D>()?;
        self.stage_removed_object(StagedObject::from_document(doc)?);
        Ok(())
    }

    fn register<D: Document>(&self) -> Result<()> {
        let typed = self
            .index
            .inner()
            .mappings
            .get(D::TYPE)
            .is_some_and(|mapping| mapping.is_typed());
        if !typed {
            self.index.register::<D>()?;
        }
        Ok(())
    }

    /// Re-adding a removed object turns into a change.
    pub fn stage_new_object(&mut self, object: StagedObject) {
        let key = object.key.clone();
        if let Some(old) = self.removed_objects.remove(&key) {
            self.changed_objects.insert(key, StagedChange { old, new: object });
        } else if let Some(change) = self.changed_objects.get_mut(&key) {
            change.new = object;
        } else {
            self.new_objects.insert(key, object);
        }
    }

    /// A change of a new object stays new; a change back to the original is dropped.
    pub fn stage_changed_object(&mut self, old: StagedObject, new: StagedObject) {
        let key = new.key.clone();
        if let Some(staged) = self.new_objects.get_mut(&key) {
            *staged = new;
            return;
        }
        let original = match self.changed_objects.remove(&key) {
            Some(existing) => existing.old,
            None => old,
        };
        if original.source == new.source && original.container_id == new.container_id {
            return;
        }
        self.changed_objects.insert(key, StagedChange { old: original, new });
    }

    /// Removing a new object unstages it; removing a changed one removes the original.
    pub fn stage_removed_object(&mut self, object: StagedObject) {
        let key = object.key.clone();
        if self.new_objects.remove(&key).is_some() {
            return;
        }
        let object = match self.changed_objects.remove(&key) {
            Some(change) => change.old,
            None => object,
        };
        self.removed_objects.insert(key, object);
    }

    pub fn new_objects(&self) -> impl Iterator<Item = &StagedObject> {
        self.new_objects.values()
    }

    pub fn changed_objects(&self) -> impl Iterator<Item = &StagedChange> {
        self.changed_objects.values()
    }

    pub fn removed_objects(&self) -> impl Iterator<Item = &StagedObject> {
        self.removed_objects.values()
    }

    pub fn new_documents<D: Document>(&self) -> Result<Vec<D>> {
        self.new_objects
            .values()
            .filter(|o| o.is::<D>())
            .map(StagedObject::to_document)
            .collect()
    }

    pub fn changed_documents<D: Document>(&self) -> Result<Vec<(D, D)>> {
        self.changed_objects
            .values()
            .filter(|c| c.new.is::<D>())
            .map(|c| Ok((c.old.to_document()?, c.new.to_document()?)))
            .collect()
    }

    pub fn removed_documents<D: Document>(&self) -> Result<Vec<D>> {
        self.removed_objects
            .values()
            .filter(|o| o.is::<D>())
            .map(StagedObject::to_document)
            .collect()
    }

    pub fn is_new(&self, key: &ObjectKey) -> bool {
        self.new_objects.contains_key(key)
    }

    pub fn is_changed(&self, key: &ObjectKey) -> bool {
        self.changed_objects.contains_key(key)
    }

    pub fn is_removed(&self, key: &ObjectKey) -> bool {
        self.removed_objects.contains_key(key)
    }

    /// Latest staged content of an object; `None` when unstaged or removed.
    pub fn staged_source(&self, key: &ObjectKey) -> Option<&Map<String, Value>> {
        self.new_objects
            .get(key)
            .map(|o| &o.source)
            .or_else(|| self.changed_objects.get(key).map(|c| &c.new.source))
    }

    pub fn change_count(&self) -> usize {
        self.new_objects.len() + self.changed_objects.len() + self.removed_objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.change_count() == 0
    }

    pub fn is_merge(&self) -> bool {
        self.merge.is_some()
    }

    /// Objects a pending merge brings in; empty for plain commits.
    pub fn incoming_keys(&self) -> BTreeSet<ObjectKey> {
        self.merge
            .as_ref()
            .map(|m| m.incoming.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Reads the branch as it will look once a pending merge lands,
    /// not counting staged changes.
    pub fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&RevisionSearcher) -> Result<T>,
    {
        let branch = self.index.branching().get_branch(&self.branch_path)?;
        f(&self.pending_searcher(&branch))
    }

    fn pending_searcher(&self, branch: &RevisionBranch) -> RevisionSearcher {
        let mut branch_ref = branch.branch_ref();
        let mut hidden = BTreeSet::new();
        if let Some(merge) = &self.merge {
            let attached = RevisionBranchRef::new(
                branch.id(),
                branch.path(),
                merge.update.attach.iter().copied(),
            );
            branch_ref = branch_ref.union(&attached);
            hidden = merge.revise_on_source.clone();
        }
        RevisionSearcher::new(
            Arc::clone(self.index.store()),
            branch_ref,
            self.index.config().result_window,
        )
        .with_hidden(hidden)
    }

    pub fn commit(self, timestamp: i64, author: &str, comment: &str) -> Result<Commit> {
        self.index.ensure_open()?;
        let branching = self.index.branching();
        let _guard = branching.lock(&self.branch_path)?;
        self.commit_locked(timestamp, author, comment)
    }

    /// Commit body; the caller holds the branch lock.
    pub(crate) fn commit_locked(mut self, timestamp: i64, author: &str, comment: &str) -> Result<Commit> {
        // Every commit must leave room for a later timestamp.
        if timestamp == i64::MAX {
            return Err(RevisionError::illegal_argument(format!(
                "Commit timestamp on branch '{}' leaves no room for later commits",
                self.branch_path
            )));
        }
        for hook in self.index.hooks().pre_commit_hooks() {
            hook.run(&mut self).map_err(RevisionError::Hook)?;
        }

        let branching = self.index.branching();
        let branch = branching.get_branch(&self.branch_path)?;
        if branch.is_deleted() {
            return Err(RevisionError::bad_request(format!(
                "Branch '{}' was deleted",
                self.branch_path
            )));
        }
        if self.merge.is_none() {
            let concurrent = branch.branch_ref().difference(&self.base_ref);
            if !concurrent.is_empty() {
                self.reconcile_concurrent(&branch, concurrent)?;
            }
        }

        let mut floor = branch.head_timestamp();
        if let Some(base) = self.merge.as_ref().and_then(|m| m.update.rebase_base) {
            floor = floor.max(base);
        }
        let clock = self.index.clock();
        let timestamp = if timestamp > floor { timestamp } else { clock.next() };
        clock.observe(timestamp);
        let point = RevisionBranchPoint::new(branch.id(), timestamp);

        let ops = self.write_ops(&branch, point)?;
        let advance = match &self.merge {
            Some(merge) => merge.squash || !ops.is_empty(),
            None => true,
        };
        if !ops.is_empty() {
            self.index.store().bulk_write(ops)?;
        }

        let mut commit = Commit::new(&self.branch_path, author, comment, timestamp);
        commit.group_id = self.group_id.clone();
        commit.details = self.details();
        commit.subjects = self.subjects();
        commit.merge_source = self.merge.as_ref().map(|m| m.source_head);
        self.index.store().put_commit(commit.clone())?;

        let merge = self.merge.take().map(|merge| {
            let mut update = merge.update;
            update.source.timestamp = timestamp;
            update
        });
        let update = BranchUpdate::Commit {
            head: advance.then_some(timestamp),
            merge,
        };
        branching.apply_update(&self.branch_path, &update)?;

        self.log_watermark(author, comment);
        for hook in self.index.hooks().post_commit_hooks() {
            if let Err(err) = hook.run(&commit) {
                warn!(branch = %self.branch_path, commit = %commit.id, error = %err, "Post-commit hook failed");
            }
        }
        debug!(
            branch = %self.branch_path,
            timestamp,
            changes = self.change_count(),
            "Committed"
        );
        Ok(commit)
    }

    /// Folds commits that landed since staging began into the staged changes.
    fn reconcile_concurrent(&mut self, branch: &RevisionBranch, concurrent: RevisionBranchRef) -> Result<()> {
        let store = self.index.store();
        let touched: BTreeSet<ObjectKey> = store
            .search(&Query::new().filter(Filter::Touched(concurrent)))?
            .iter()
            .map(Revision::key)
            .collect();
        let current = RevisionSearcher::new(
            Arc::clone(store),
            branch.branch_ref(),
            self.index.config().result_window,
        );

        let mut conflicts = Vec::new();
        for key in touched {
            if let Some(object) = self.new_objects.get(&key) {
                if let Some(theirs) = current.get_revision(&key)? {
                    if theirs.source == object.source {
                        debug!(object = %key, "Concurrently added with identical content");
                        self.new_objects.remove(&key);
                    } else {
                        conflicts.push(Conflict::ConcurrentChange { object: key, property: None });
                    }
                }
            } else if let Some(change) = self.changed_objects.get(&key).cloned() {
                let Some(theirs) = current.get_revision(&key)? else {
                    debug!(object = %key, "Concurrently removed, dropping change");
                    self.changed_objects.remove(&key);
                    continue;
                };
                let mapping = self.index.mapping(&key.doc_type);
                match merge_properties(
                    &key,
                    &mapping,
                    &change.old.source,
                    &change.new.source,
                    &theirs.source,
                    false,
                    &DefaultConflictProcessor,
                ) {
                    Ok(merged) => {
                        debug!(object = %key, "Merged with concurrent change");
                        let theirs = StagedObject::from_revision(&theirs, &mapping);
                        self.changed_objects.remove(&key);
                        if merged != theirs.source {
                            let new = theirs.with_source(merged, &mapping);
                            self.changed_objects.insert(key, StagedChange { old: theirs, new });
                        }
                    }
                    Err(clashes) => conflicts.extend(clashes.into_iter().map(|clash| {
                        Conflict::ConcurrentChange {
                            object: key.clone(),
                            property: Some(clash.property),
                        }
                    })),
                }
            }
        }

        if conflicts.is_empty() {
            Ok(())
        } else {
            Err(BranchMergeConflict::new(&self.branch_path, MergeOperation::Commit, conflicts).into())
        }
    }

    fn write_ops(&self, branch: &RevisionBranch, point: RevisionBranchPoint) -> Result<Vec<WriteOp>> {
        let searcher = self.pending_searcher(branch);
        let mut ops = Vec::new();
        let supersede = |key: &ObjectKey, ops: &mut Vec<WriteOp>| -> Result<()> {
            for revision in searcher.visible_revisions(key)? {
                ops.push(WriteOp::Revise {
                    key: key.clone(),
                    created: revision.created,
                    revised: point,
                });
            }
            Ok(())
        };

        let upserts = self
            .new_objects
            .iter()
            .chain(self.changed_objects.iter().map(|(k, c)| (k, &c.new)));
        for (key, object) in upserts {
            supersede(key, &mut ops)?;
            ops.push(WriteOp::Put(Revision {
                doc_type: key.doc_type.clone(),
                id: key.id.clone(),
                container_id: object.container_id.clone(),
                created: point,
                revised: BTreeSet::new(),
                source: object.source.clone(),
            }));
        }
        for key in self.removed_objects.keys() {
            supersede(key, &mut ops)?;
        }
        if let Some(merge) = &self.merge {
            for (key, created) in &merge.revise_on_source {
                ops.push(WriteOp::Revise {
                    key: key.clone(),
                    created: *created,
                    revised: point,
                });
            }
        }
        Ok(ops)
    }

    fn details(&self) -> Vec<CommitDetail> {
        let mut components: BTreeMap<(ChangeKind, String, Option<String>), BTreeSet<String>> =
            BTreeMap::new();
        let mut properties: BTreeMap<(String, String), BTreeSet<String>> = BTreeMap::new();

        let mut component = |op: ChangeKind, key: &ObjectKey, container: &Option<String>| {
            components
                .entry((op, key.doc_type.clone(), container.clone()))
                .or_default()
                .insert(key.id.clone());
        };
        for (key, object) in &self.new_objects {
            component(ChangeKind::Add, key, &object.container_id);
        }
        for (key, change) in &self.changed_objects {
            component(ChangeKind::Change, key, &change.new.container_id);
            let names: BTreeSet<&String> =
                change.old.source.keys().chain(change.new.source.keys()).collect();
            for name in names {
                if change.old.source.get(name) != change.new.source.get(name) {
                    properties
                        .entry((key.doc_type.clone(), name.clone()))
                        .or_default()
                        .insert(key.id.clone());
                }
            }
        }
        for (key, object) in &self.removed_objects {
            component(ChangeKind::Remove, key, &object.container_id);
        }
        if let Some(merge) = self.merge.as_ref().filter(|m| !m.squash) {
            for (key, (op, container)) in &merge.incoming {
                let staged = self.is_new(key) || self.is_changed(key) || self.is_removed(key);
                if !staged {
                    component(*op, key, container);
                }
            }
        }

        let mut details: Vec<CommitDetail> = components
            .into_iter()
            .map(|((op, object_type, container_id), object_ids)| CommitDetail::Component {
                op,
                object_type,
                container_id,
                object_ids,
            })
            .collect();
        details.extend(properties.into_iter().map(|((object_type, property), object_ids)| {
            CommitDetail::Property {
                op: ChangeKind::Change,
                object_type,
                property,
                object_ids,
            }
        }));
        details
    }

    fn subjects(&self) -> BTreeSet<String> {
        let mut subjects: BTreeSet<String> = self
            .new_objects
            .values()
            .chain(self.changed_objects.values().map(|c| &c.new))
            .chain(self.removed_objects.values())
            .filter_map(|o| o.subject.clone())
            .collect();
        if let Some(supplier) = &self.subject_supplier {
            subjects.extend(supplier.subjects(self));
        }
        subjects
    }

    fn log_watermark(&self, author: &str, comment: &str) {
        let config = self.index.config();
        let changes = self.change_count();
        let (branch, high, low) = (
            &self.branch_path,
            config.commit_watermark_high,
            config.commit_watermark_low,
        );
        if changes > high {
            error!("high commit watermark [{high}] exceeded in commit [{branch} - {author} - {comment}] number of changes: {changes}");
        } else if changes > low {
            warn!("low commit watermark [{low}] exceeded in commit [{branch} - {author} - {comment}] number of changes: {changes}");
        }
    }
}

impl std::fmt::Debug for StagingArea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingArea")
            .field("branch_path", &self.branch_path)
            .field("new", &self.new_objects.len())
            .field("changed", &self.changed_objects.len())
            .field("removed", &self.removed_objects.len())
            .field("merge", &self.merge.as_ref().map(|m| m.operation))
            .finish()
    }
}

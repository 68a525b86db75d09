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

//! Reads scoped to one branch ref snapshot.

use crate::document::Document;
use crate::revision::Revision;
use crate::store::{DocumentStore, Filter, Hits, Query};
use revidx_core::{ObjectKey, Result, RevisionBranchPoint, RevisionBranchRef, RevisionError};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::warn;

/// A read view over the revisions visible in a [`RevisionBranchRef`].
///
/// The ref is captured once, so every query through the same searcher sees
/// the same committed state even while commits land on the branch.
#[derive(Clone)]
pub struct RevisionSearcher {
    store: Arc<dyn DocumentStore>,
    branch_ref: RevisionBranchRef,
    hidden: BTreeSet<(ObjectKey, RevisionBranchPoint)>,
    result_window: usize,
}

impl RevisionSearcher {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        branch_ref: RevisionBranchRef,
        result_window: usize,
    ) -> Self {
        Self {
            store,
            branch_ref,
            hidden: BTreeSet::new(),
            result_window,
        }
    }

    /// Excludes specific revisions, e.g. ones a pending merge is about to supersede.
    pub fn with_hidden(mut self, hidden: BTreeSet<(ObjectKey, RevisionBranchPoint)>) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn branch_ref(&self) -> &RevisionBranchRef {
        &self.branch_ref
    }

    pub fn get<D: Document>(&self, id: &str) -> Result<Option<D>> {
        self.get_revision(&ObjectKey::new(D::TYPE, id))?
            .map(|revision| decode(&revision))
            .transpose()
    }

    pub fn get_all<D: Document>(&self, ids: &[&str]) -> Result<Vec<D>> {
        let mut docs = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(doc) = self.get::<D>(id)? {
                docs.push(doc);
            }
        }
        Ok(docs)
    }

    /// Typed search; the query's type list is replaced by `D::TYPE`.
    pub fn search<D: Document>(&self, mut query: Query) -> Result<Hits<D>> {
        query.doc_types = vec![D::TYPE.to_string()];
        self.search_revisions(query)?.map(|revision| decode(&revision))
    }

    pub fn search_revisions(&self, query: Query) -> Result<Hits<Revision>> {
        let limit = query.limit.unwrap_or(self.result_window);
        if limit > self.result_window {
            return Err(RevisionError::illegal_argument(format!(
                "Requested {limit} hits exceeds the result window of {}",
                self.result_window
            )));
        }
        let mut query = query.filter(Filter::Visible(self.branch_ref.clone()));
        if self.hidden.is_empty() {
            query.limit = Some(limit);
            return Ok(self.store.search(&query)?);
        }

        query.limit = None;
        let mut hits: Vec<Revision> = self
            .store
            .search(&query)?
            .into_iter()
            .filter(|revision| !self.is_hidden(revision))
            .collect();
        let total = hits.len();
        hits.truncate(limit);
        Ok(Hits::new(hits, total))
    }

    /// The single visible revision of a document.
    pub fn get_revision(&self, key: &ObjectKey) -> Result<Option<Revision>> {
        let mut visible = self.visible_revisions(key)?;
        if visible.len() > 1 {
            warn!(
                object = %key,
                branch = self.branch_ref.path(),
                count = visible.len(),
                "Multiple visible revisions, using the latest"
            );
        }
        Ok(visible.pop())
    }

    /// All visible revisions of a document, oldest first.
    pub fn visible_revisions(&self, key: &ObjectKey) -> Result<Vec<Revision>> {
        Ok(self
            .store
            .get(key)?
            .into_iter()
            .filter(|revision| revision.is_visible_in(&self.branch_ref) && !self.is_hidden(revision))
            .collect())
    }

    fn is_hidden(&self, revision: &Revision) -> bool {
        !self.hidden.is_empty() && self.hidden.contains(&(revision.key(), revision.created))
    }
}

fn decode<D: Document>(revision: &Revision) -> Result<D> {
    Ok(serde_json::from_value(serde_json::Value::Object(
        revision.source.clone(),
    ))?)
}

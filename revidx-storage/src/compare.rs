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

//! Directional comparison of two branch states.
//!
//! `compare(A, B)` reports what B has that A has not seen: the revisions
//! touched in `B - effective(A)`, each classified by looking at the object
//! once in the shared part of B and once in all of B. Intermediate states
//! cancel out, so an object added and removed inside the window never shows
//! up and a change followed by a removal is reported as a removal.

use crate::revision::Revision;
use crate::store::{DocumentStore, Filter, Query};
use revidx_core::{ChangeKind, ObjectKey, Result, RevisionBranchRef};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// Net change of one object between two refs.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ObjectChange {
    Added { after: Revision },
    Changed { before: Revision, after: Revision },
    Removed { before: Revision },
}

impl ObjectChange {
    pub(crate) fn before(&self) -> Option<&Revision> {
        match self {
            Self::Added { .. } => None,
            Self::Changed { before, .. } | Self::Removed { before } => Some(before),
        }
    }

    pub(crate) fn after(&self) -> Option<&Revision> {
        match self {
            Self::Removed { .. } => None,
            Self::Changed { after, .. } | Self::Added { after } => Some(after),
        }
    }

    pub(crate) fn kind(&self) -> ChangeKind {
        match self {
            Self::Added { .. } => ChangeKind::Add,
            Self::Changed { .. } => ChangeKind::Change,
            Self::Removed { .. } => ChangeKind::Remove,
        }
    }
}

/// Changes visible in `compare` that `base` has not seen, keyed by object.
pub(crate) fn collect_changes(
    store: &dyn DocumentStore,
    base: &RevisionBranchRef,
    compare: &RevisionBranchRef,
) -> Result<BTreeMap<ObjectKey, ObjectChange>> {
    let mut changes = BTreeMap::new();
    let unique = compare.difference(base);
    if unique.is_empty() {
        return Ok(changes);
    }
    let shared = compare.intersection(base);

    let touched: BTreeSet<ObjectKey> = store
        .search(&Query::new().filter(Filter::Touched(unique)))?
        .iter()
        .map(Revision::key)
        .collect();

    for key in touched {
        let revisions = store.get(&key)?;
        let before = visible_in(&key, &revisions, &shared);
        let after = visible_in(&key, &revisions, compare);
        let change = match (before, after) {
            (None, None) => continue,
            (None, Some(after)) => ObjectChange::Added { after },
            (Some(before), None) => ObjectChange::Removed { before },
            (Some(before), Some(after)) if before.created == after.created => continue,
            (Some(before), Some(after)) => ObjectChange::Changed { before, after },
        };
        changes.insert(key, change);
    }
    Ok(changes)
}

pub(crate) fn visible_in(
    key: &ObjectKey,
    revisions: &[Revision],
    branch_ref: &RevisionBranchRef,
) -> Option<Revision> {
    let mut visible: Vec<&Revision> = revisions
        .iter()
        .filter(|revision| revision.is_visible_in(branch_ref))
        .collect();
    if visible.len() > 1 {
        warn!(object = %key, count = visible.len(), "Multiple visible revisions in ref");
        visible.sort_by_key(|revision| revision.created);
    }
    visible.pop().cloned()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RevisionCompareDetail {
    /// An object added or removed; also a change that left every property as it was.
    Component {
        op: ChangeKind,
        object: ObjectKey,
        container_id: Option<String>,
    },
    /// One property whose final value differs from the base value.
    Property {
        object: ObjectKey,
        property: String,
        from: Option<String>,
        to: Option<String>,
    },
}

impl RevisionCompareDetail {
    pub fn object(&self) -> &ObjectKey {
        match self {
            Self::Component { object, .. } | Self::Property { object, .. } => object,
        }
    }

    pub fn op(&self) -> ChangeKind {
        match self {
            Self::Component { op, .. } => *op,
            Self::Property { .. } => ChangeKind::Change,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevisionCompare {
    pub base: String,
    pub compare: String,
    pub details: Vec<RevisionCompareDetail>,
    pub total_added: usize,
    pub total_changed: usize,
    pub total_removed: usize,
}

impl RevisionCompare {
    pub(crate) fn build(
        base: impl Into<String>,
        compare: impl Into<String>,
        changes: &BTreeMap<ObjectKey, ObjectChange>,
        limit: usize,
    ) -> Self {
        let mut result = Self {
            base: base.into(),
            compare: compare.into(),
            details: Vec::new(),
            total_added: 0,
            total_changed: 0,
            total_removed: 0,
        };
        for (key, change) in changes {
            match change {
                ObjectChange::Added { after } => {
                    result.total_added += 1;
                    result.details.push(RevisionCompareDetail::Component {
                        op: ChangeKind::Add,
                        object: key.clone(),
                        container_id: after.container_id.clone(),
                    });
                }
                ObjectChange::Removed { before } => {
                    result.total_removed += 1;
                    result.details.push(RevisionCompareDetail::Component {
                        op: ChangeKind::Remove,
                        object: key.clone(),
                        container_id: before.container_id.clone(),
                    });
                }
                ObjectChange::Changed { before, after } => {
                    result.total_changed += 1;
                    let properties = property_changes(key, before, after);
                    if properties.is_empty() {
                        result.details.push(RevisionCompareDetail::Component {
                            op: ChangeKind::Change,
                            object: key.clone(),
                            container_id: after.container_id.clone(),
                        });
                    } else {
                        result.details.extend(properties);
                    }
                }
            }
        }
        result.details.truncate(limit);
        result
    }

    pub fn is_empty(&self) -> bool {
        self.total_added == 0 && self.total_changed == 0 && self.total_removed == 0
    }

    pub fn total(&self) -> usize {
        self.total_added + self.total_changed + self.total_removed
    }

    pub fn details_for<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a RevisionCompareDetail> + 'a {
        self.details.iter().filter(move |detail| detail.object().id == id)
    }
}

fn property_changes(key: &ObjectKey, before: &Revision, after: &Revision) -> Vec<RevisionCompareDetail> {
    let properties: BTreeSet<&String> = before.source.keys().chain(after.source.keys()).collect();
    properties
        .into_iter()
        .filter_map(|property| {
            let from = before.source.get(property);
            let to = after.source.get(property);
            (from != to).then(|| RevisionCompareDetail::Property {
                object: key.clone(),
                property: property.clone(),
                from: from.map(value_as_string),
                to: to.map(value_as_string),
            })
        })
        .collect()
}

/// Strings as-is, everything else as compact JSON.
pub fn value_as_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, WriteOp};
    use revidx_core::{RevisionBranchPoint, RevisionSegment};
    use serde_json::json;

    fn revision(id: &str, created: RevisionBranchPoint, source: Value) -> Revision {
        Revision {
            doc_type: "data".into(),
            id: id.into(),
            container_id: None,
            created,
            revised: BTreeSet::new(),
            source: source.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_value_as_string() {
        assert_eq!(value_as_string(&json!("abc")), "abc");
        assert_eq!(value_as_string(&json!(12)), "12");
        assert_eq!(value_as_string(&json!(["a", 1])), r#"["a",1]"#);
    }

    #[test]
    fn test_change_then_remove_nets_to_remove() {
        let store = MemoryStore::new();
        let base = RevisionBranchRef::new(0, "MAIN", [RevisionSegment::new(0, 0, 10)]);
        let child = RevisionBranchRef::new(
            1,
            "MAIN/a",
            [RevisionSegment::new(0, 0, 10), RevisionSegment::new(1, 10, 30)],
        );
        let mut original = revision("1", RevisionBranchPoint::new(0, 5), json!({"v": 1}));
        original.revised.insert(RevisionBranchPoint::new(1, 20));
        let mut changed = revision("1", RevisionBranchPoint::new(1, 20), json!({"v": 2}));
        changed.revised.insert(RevisionBranchPoint::new(1, 25));
        let mut transient = revision("2", RevisionBranchPoint::new(1, 21), json!({}));
        transient.revised.insert(RevisionBranchPoint::new(1, 22));
        store
            .bulk_write(vec![
                WriteOp::Put(original),
                WriteOp::Put(changed),
                WriteOp::Put(transient),
            ])
            .unwrap();

        let changes = collect_changes(&store, &base, &child).unwrap();
        assert_eq!(changes.len(), 1);
        let change = &changes[&ObjectKey::new("data", "1")];
        assert_eq!(change.kind(), ChangeKind::Remove);

        let compare = RevisionCompare::build("MAIN", "MAIN/a", &changes, 100);
        assert_eq!(compare.total_removed, 1);
        assert_eq!(compare.details.len(), 1);
        assert!(collect_changes(&store, &child, &base).unwrap().is_empty());
    }

    #[test]
    fn test_limit_truncates_details_only() {
        let mut changes = BTreeMap::new();
        for id in ["1", "2", "3"] {
            changes.insert(
                ObjectKey::new("data", id),
                ObjectChange::Added {
                    after: revision(id, RevisionBranchPoint::new(1, 5), json!({})),
                },
            );
        }
        let compare = RevisionCompare::build("MAIN", "MAIN/a", &changes, 2);
        assert_eq!(compare.details.len(), 2);
        assert_eq!(compare.total_added, 3);
    }
}

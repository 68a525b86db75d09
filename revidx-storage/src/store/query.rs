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

//! Queries understood by a [`DocumentStore`](super::DocumentStore).

use crate::revision::{Revision, FIELD_CONTAINER, FIELD_ID, FIELD_TYPE};
use revidx_core::{Commit, RevisionBranch, RevisionBranchRef};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub enum Filter {
    /// Field equals value; array fields match on any element.
    Exact { field: String, value: Value },
    Prefix { field: String, prefix: String },
    Range {
        field: String,
        gte: Option<Value>,
        lte: Option<Value>,
    },
    /// Revision is visible in the ref.
    Visible(RevisionBranchRef),
    /// Revision was created or superseded in the ref.
    Touched(RevisionBranchRef),
    Not(Box<Filter>),
}

impl Filter {
    pub fn exact(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Exact {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn prefix(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::Prefix {
            field: field.into(),
            prefix: prefix.into(),
        }
    }

    pub fn range(field: impl Into<String>, gte: Option<Value>, lte: Option<Value>) -> Self {
        Self::Range {
            field: field.into(),
            gte,
            lte,
        }
    }

    pub fn container(container_id: impl Into<String>) -> Self {
        Self::exact(FIELD_CONTAINER, container_id.into())
    }

    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    pub fn matches(&self, revision: &Revision) -> bool {
        match self {
            Self::Exact { field, value } => field_values(revision, field)
                .iter()
                .any(|candidate| *candidate == *value),
            Self::Prefix { field, prefix } => field_values(revision, field)
                .iter()
                .any(|candidate| candidate.as_str().is_some_and(|s| s.starts_with(prefix.as_str()))),
            Self::Range { field, gte, lte } => {
                field_values(revision, field).iter().any(|candidate| {
                    let above = gte.as_ref().map_or(true, |low| {
                        matches!(
                            compare_values(candidate, low),
                            Some(Ordering::Greater | Ordering::Equal)
                        )
                    });
                    let below = lte.as_ref().map_or(true, |high| {
                        matches!(
                            compare_values(candidate, high),
                            Some(Ordering::Less | Ordering::Equal)
                        )
                    });
                    above && below
                })
            }
            Self::Visible(branch_ref) => revision.is_visible_in(branch_ref),
            Self::Touched(branch_ref) => revision.is_touched_in(branch_ref),
            Self::Not(inner) => !inner.matches(revision),
        }
    }
}

fn field_values(revision: &Revision, field: &str) -> Vec<Value> {
    match field {
        FIELD_ID => vec![Value::String(revision.id.clone())],
        FIELD_TYPE => vec![Value::String(revision.doc_type.clone())],
        FIELD_CONTAINER => revision
            .container_id
            .iter()
            .map(|c| Value::String(c.clone()))
            .collect(),
        _ => revision.field_values(field).into_iter().cloned().collect(),
    }
}

/// Orders numbers numerically and strings lexically; mixed kinds are unordered.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
pub struct SortBy {
    pub field: String,
    pub order: SortOrder,
}

#[derive(Debug, Clone, Default)]
pub struct Query {
    /// Empty means every type.
    pub doc_types: Vec<String>,
    pub ids: Option<BTreeSet<String>>,
    pub filters: Vec<Filter>,
    pub sort: Vec<SortBy>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of_type(doc_type: impl Into<String>) -> Self {
        Self::new().with_type(doc_type)
    }

    pub fn with_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_types.push(doc_type.into());
        self
    }

    pub fn ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort.push(SortBy {
            field: field.into(),
            order,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn accepts_type(&self, doc_type: &str) -> bool {
        self.doc_types.is_empty() || self.doc_types.iter().any(|t| t == doc_type)
    }

    pub fn accepts_id(&self, id: &str) -> bool {
        self.ids.as_ref().map_or(true, |ids| ids.contains(id))
    }

    pub fn matches(&self, revision: &Revision) -> bool {
        self.accepts_type(&revision.doc_type)
            && self.accepts_id(&revision.id)
            && self.filters.iter().all(|f| f.matches(revision))
    }

    /// Sort order; ties fall back to type, id and creation point.
    pub fn compare(&self, a: &Revision, b: &Revision) -> Ordering {
        for sort in &self.sort {
            let left = field_values(a, &sort.field).into_iter().next();
            let right = field_values(b, &sort.field).into_iter().next();
            let ordering = match (left, right) {
                (Some(l), Some(r)) => compare_values(&l, &r).unwrap_or(Ordering::Equal),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            let ordering = match sort.order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        (&a.doc_type, &a.id, a.created).cmp(&(&b.doc_type, &b.id, b.created))
    }
}

/// One page of results plus the number of matches overall.
#[derive(Debug, Clone, PartialEq)]
pub struct Hits<T> {
    pub hits: Vec<T>,
    pub total: usize,
}

impl<T> Hits<T> {
    pub fn new(hits: Vec<T>, total: usize) -> Self {
        Self { hits, total }
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.hits.iter()
    }

    pub fn first(&self) -> Option<&T> {
        self.hits.first()
    }

    pub fn map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<Hits<U>, E> {
        let total = self.total;
        let hits = self.hits.into_iter().map(f).collect::<Result<Vec<_>, E>>()?;
        Ok(Hits { hits, total })
    }
}

impl<T> IntoIterator for Hits<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.hits.into_iter()
    }
}

#[derive(Debug, Clone, Default)]
pub struct BranchQuery {
    pub parent_path: Option<String>,
    pub path_prefix: Option<String>,
    pub metadata: Vec<(String, Value)>,
    pub include_deleted: bool,
}

impl BranchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parent(mut self, parent_path: impl Into<String>) -> Self {
        self.parent_path = Some(parent_path.into());
        self
    }

    pub fn path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = Some(prefix.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }

    pub fn include_deleted(mut self, include: bool) -> Self {
        self.include_deleted = include;
        self
    }

    pub fn matches(&self, branch: &RevisionBranch) -> bool {
        if branch.is_deleted() && !self.include_deleted {
            return false;
        }
        if let Some(parent) = &self.parent_path {
            if branch.parent_path() != parent {
                return false;
            }
        }
        if let Some(prefix) = &self.path_prefix {
            if !branch.path().starts_with(prefix.as_str()) {
                return false;
            }
        }
        self.metadata
            .iter()
            .all(|(key, value)| branch.metadata().get(key) == Some(value))
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommitQuery {
    pub branch: Option<String>,
    pub author: Option<String>,
    pub affected_id: Option<String>,
    pub from: Option<i64>,
    pub to: Option<i64>,
    pub limit: Option<usize>,
}

impl CommitQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn affected_id(mut self, id: impl Into<String>) -> Self {
        self.affected_id = Some(id.into());
        self
    }

    pub fn between(mut self, from: i64, to: i64) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, commit: &Commit) -> bool {
        self.branch.as_ref().map_or(true, |b| &commit.branch == b)
            && self.author.as_ref().map_or(true, |a| &commit.author == a)
            && self
                .affected_id
                .as_ref()
                .map_or(true, |id| commit.affected_ids().contains(id.as_str()))
            && self.from.map_or(true, |from| commit.timestamp >= from)
            && self.to.map_or(true, |to| commit.timestamp <= to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revidx_core::RevisionBranchPoint;
    use serde_json::json;

    fn revision(id: &str, source: Value) -> Revision {
        Revision {
            doc_type: "data".into(),
            id: id.into(),
            container_id: Some("c1".into()),
            created: RevisionBranchPoint::new(0, 1),
            revised: BTreeSet::new(),
            source: source.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_exact_matches_array_elements() {
        let rev = revision("1", json!({"tags": ["a", "b"], "n": 5}));
        assert!(Filter::exact("tags", "b").matches(&rev));
        assert!(!Filter::exact("tags", "c").matches(&rev));
        assert!(Filter::exact("n", 5).matches(&rev));
        assert!(Filter::container("c1").matches(&rev));
        assert!(Filter::exact(FIELD_ID, "1").matches(&rev));
    }

    #[test]
    fn test_prefix_and_range() {
        let rev = revision("1", json!({"term": "Clinical finding", "score": 7}));
        assert!(Filter::prefix("term", "Clin").matches(&rev));
        assert!(Filter::range("score", Some(json!(5)), Some(json!(7))).matches(&rev));
        assert!(!Filter::range("score", Some(json!(8)), None).matches(&rev));
        assert!(Filter::range("score", Some(json!(8)), None).negate().matches(&rev));
    }

    #[test]
    fn test_sort_then_tiebreak_by_id() {
        let query = Query::new().sort_by("n", SortOrder::Desc);
        let mut revs = vec![
            revision("b", json!({"n": 1})),
            revision("a", json!({"n": 1})),
            revision("c", json!({"n": 2})),
        ];
        revs.sort_by(|a, b| query.compare(a, b));
        let ids: Vec<_> = revs.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }
}

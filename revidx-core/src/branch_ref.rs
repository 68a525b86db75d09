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

//! Segment sets and their algebra.
//!
//! A [`RevisionBranchRef`] is everything visible from a branch at some
//! moment. Branch state, rebase deltas, merge deltas and range reads are all
//! computed with [`difference`](RevisionBranchRef::difference) and
//! [`intersection`](RevisionBranchRef::intersection).

use crate::point::RevisionBranchPoint;
use crate::segment::RevisionSegment;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionBranchRef {
    branch_id: i64,
    path: String,
    segments: BTreeSet<RevisionSegment>,
}

impl RevisionBranchRef {
    /// Builds a normalized ref: empty segments are dropped and overlapping or
    /// adjacent segments of the same branch are coalesced.
    pub fn new(
        branch_id: i64,
        path: impl Into<String>,
        segments: impl IntoIterator<Item = RevisionSegment>,
    ) -> Self {
        Self {
            branch_id,
            path: path.into(),
            segments: normalize(segments),
        }
    }

    pub fn branch_id(&self) -> i64 {
        self.branch_id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn segments(&self) -> &BTreeSet<RevisionSegment> {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Segments ordered by branch id, then start.
    pub fn segments_by_branch(&self) -> Vec<RevisionSegment> {
        let mut segments: Vec<_> = self.segments.iter().copied().collect();
        segments.sort_by_key(|s| (s.branch_id(), s.start()));
        segments
    }

    /// Latest timestamp covered by any segment.
    pub fn head_timestamp(&self) -> i64 {
        self.segments.iter().map(RevisionSegment::end).max().unwrap_or(0)
    }

    /// Segments of `self` not covered by `other`.
    ///
    /// [`segments`](Self::segments) iterates the result by start timestamp;
    /// use [`segments_by_branch`](Self::segments_by_branch) for the
    /// branch id then start order.
    pub fn difference(&self, other: &RevisionBranchRef) -> RevisionBranchRef {
        let covers = other.grouped();
        let segments = self.segments.iter().flat_map(|segment| {
            match covers.get(&segment.branch_id()) {
                Some(covering) => segment.subtract(covering.iter()),
                None => vec![*segment],
            }
        });
        self.derive(segments)
    }

    /// Ranges covered by both refs.
    pub fn intersection(&self, other: &RevisionBranchRef) -> RevisionBranchRef {
        let others = other.grouped();
        let segments = self.segments.iter().flat_map(|segment| {
            others
                .get(&segment.branch_id())
                .into_iter()
                .flatten()
                .filter_map(|o| segment.intersect(o))
                .collect::<Vec<_>>()
        });
        self.derive(segments)
    }

    pub fn union(&self, other: &RevisionBranchRef) -> RevisionBranchRef {
        self.derive(self.segments.iter().chain(other.segments.iter()).copied())
    }

    /// State of this ref as of `timestamp`.
    pub fn restrict_to(&self, timestamp: i64) -> RevisionBranchRef {
        self.derive(self.segments.iter().map(|s| s.restrict_to(timestamp)))
    }

    /// Restricts to segments not owned by `branch_id`.
    pub fn without_branch(&self, branch_id: i64) -> RevisionBranchRef {
        self.derive(
            self.segments
                .iter()
                .filter(|s| s.branch_id() != branch_id)
                .copied(),
        )
    }

    pub fn contains(&self, point: &RevisionBranchPoint) -> bool {
        self.segments.iter().any(|s| s.contains(point))
    }

    /// A revision created at `created` and superseded at `revised` is visible
    /// when its creation is in range and none of its supersessions are.
    pub fn is_visible<'a, I>(&self, created: &RevisionBranchPoint, revised: I) -> bool
    where
        I: IntoIterator<Item = &'a RevisionBranchPoint>,
    {
        self.contains(created) && !revised.into_iter().any(|p| self.contains(p))
    }

    /// True when either the creation or a supersession falls in range.
    pub fn touches<'a, I>(&self, created: &RevisionBranchPoint, revised: I) -> bool
    where
        I: IntoIterator<Item = &'a RevisionBranchPoint>,
    {
        self.contains(created) || revised.into_iter().any(|p| self.contains(p))
    }

    pub fn branch_points(&self) -> BTreeSet<RevisionBranchPoint> {
        self.segments.iter().map(RevisionSegment::end_point).collect()
    }

    fn derive(&self, segments: impl IntoIterator<Item = RevisionSegment>) -> RevisionBranchRef {
        RevisionBranchRef::new(self.branch_id, self.path.clone(), segments)
    }

    fn grouped(&self) -> BTreeMap<i64, Vec<RevisionSegment>> {
        let mut grouped: BTreeMap<i64, Vec<RevisionSegment>> = BTreeMap::new();
        for segment in &self.segments {
            grouped.entry(segment.branch_id()).or_default().push(*segment);
        }
        for segments in grouped.values_mut() {
            segments.sort_by_key(RevisionSegment::start);
        }
        grouped
    }
}

impl fmt::Display for RevisionBranchRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.path)?;
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{segment}")?;
        }
        f.write_str("]")
    }
}

/// Drops empty segments and coalesces same-branch overlaps.
pub fn normalize(segments: impl IntoIterator<Item = RevisionSegment>) -> BTreeSet<RevisionSegment> {
    let mut grouped: BTreeMap<i64, Vec<RevisionSegment>> = BTreeMap::new();
    for segment in segments.into_iter().filter(|s| !s.is_empty()) {
        grouped.entry(segment.branch_id()).or_default().push(segment);
    }
    let mut normalized = BTreeSet::new();
    for (branch_id, mut segments) in grouped {
        segments.sort_by_key(RevisionSegment::start);
        let mut current: Option<RevisionSegment> = None;
        for segment in segments {
            current = match current {
                Some(open) if open.touches(&segment) => Some(RevisionSegment::new(
                    branch_id,
                    open.start(),
                    open.end().max(segment.end()),
                )),
                Some(open) => {
                    normalized.insert(open);
                    Some(segment)
                }
                None => Some(segment),
            };
        }
        normalized.extend(current);
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn r(segments: &[(i64, i64, i64)]) -> RevisionBranchRef {
        RevisionBranchRef::new(
            0,
            "MAIN",
            segments.iter().map(|&(b, s, e)| RevisionSegment::new(b, s, e)),
        )
    }

    #[test]
    fn test_normalize_merges_adjacent() {
        let merged = r(&[(0, 0, 5), (0, 5, 10), (1, 3, 3)]);
        assert_eq!(
            merged.segments().iter().copied().collect::<Vec<_>>(),
            vec![RevisionSegment::new(0, 0, 10)]
        );
    }

    #[test]
    fn test_difference_empty_when_covered() {
        let parent = r(&[(0, 0, 10)]);
        let child = r(&[(0, 0, 10), (1, 10, 10)]);
        assert!(child.difference(&parent).is_empty());
        assert!(parent.difference(&child).is_empty());
    }

    #[test]
    fn test_difference_reports_uncovered_tail() {
        let parent = r(&[(0, 0, 20)]);
        let child = r(&[(0, 0, 10), (1, 10, 15)]);
        assert_eq!(
            parent.difference(&child).segments_by_branch(),
            vec![RevisionSegment::new(0, 10, 20)]
        );
        assert_eq!(
            child.difference(&parent).segments_by_branch(),
            vec![RevisionSegment::new(1, 10, 15)]
        );
    }

    #[test]
    fn test_difference_ordered_by_branch_then_start() {
        let a = r(&[(2, 0, 5), (1, 10, 12), (1, 0, 3)]);
        let empty = r(&[]);
        let ordered: Vec<_> = a
            .difference(&empty)
            .segments_by_branch()
            .iter()
            .map(|s| (s.branch_id(), s.start()))
            .collect();
        assert_eq!(ordered, vec![(1, 0), (1, 10), (2, 0)]);
    }

    #[test]
    fn test_intersection() {
        let a = r(&[(0, 0, 20), (1, 20, 30)]);
        let b = r(&[(0, 0, 10), (2, 10, 15)]);
        assert_eq!(
            a.intersection(&b).segments_by_branch(),
            vec![RevisionSegment::new(0, 0, 10)]
        );
    }

    #[test]
    fn test_visibility() {
        let main = r(&[(0, 0, 10)]);
        let created = RevisionBranchPoint::new(0, 5);
        let revised_later = RevisionBranchPoint::new(0, 15);
        let revised_elsewhere = RevisionBranchPoint::new(1, 8);
        assert!(main.is_visible(&created, [&revised_later, &revised_elsewhere]));
        assert!(!main.restrict_to(4).is_visible(&created, std::iter::empty()));
        let revised_in = RevisionBranchPoint::new(0, 9);
        assert!(!main.is_visible(&created, [&revised_in]));
    }

    fn arb_ref() -> impl Strategy<Value = RevisionBranchRef> {
        prop::collection::vec((0i64..3, 0i64..50, 0i64..20), 0..6).prop_map(|raw| {
            RevisionBranchRef::new(
                0,
                "MAIN",
                raw.into_iter()
                    .map(|(b, s, len)| RevisionSegment::new(b, s, s + len)),
            )
        })
    }

    proptest! {
        #[test]
        fn prop_self_difference_is_empty(a in arb_ref()) {
            prop_assert!(a.difference(&a).is_empty());
        }

        #[test]
        fn prop_difference_disjoint_from_other(a in arb_ref(), b in arb_ref()) {
            prop_assert!(a.difference(&b).intersection(&b).is_empty());
        }

        #[test]
        fn prop_difference_and_intersection_partition(a in arb_ref(), b in arb_ref()) {
            let rebuilt = a.difference(&b).union(&a.intersection(&b));
            prop_assert_eq!(rebuilt.segments(), a.segments());
        }
    }
}

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

//! Timestamp ranges owned by a single branch.
//!
//! A segment `(branch, start, end)` owns the timestamps `t` with
//! `start < t <= end`. `start` is the point the segment was opened at, so a
//! segment with `start == end` owns nothing yet.

use crate::point::RevisionBranchPoint;
use serde::{Deserialize, Serialize};
use std::cmp::{max, min, Ordering};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RevisionSegment {
    branch_id: i64,
    start: i64,
    end: i64,
}

impl RevisionSegment {
    pub const fn new(branch_id: i64, start: i64, end: i64) -> Self {
        Self {
            branch_id,
            start,
            end,
        }
    }

    pub fn branch_id(&self) -> i64 {
        self.branch_id
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> i64 {
        self.end
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn start_point(&self) -> RevisionBranchPoint {
        RevisionBranchPoint::new(self.branch_id, self.start)
    }

    pub fn end_point(&self) -> RevisionBranchPoint {
        RevisionBranchPoint::new(self.branch_id, self.end)
    }

    pub fn contains(&self, point: &RevisionBranchPoint) -> bool {
        point.branch_id() == self.branch_id && self.contains_timestamp(point.timestamp())
    }

    pub fn contains_timestamp(&self, timestamp: i64) -> bool {
        self.start < timestamp && timestamp <= self.end
    }

    pub fn with_end(&self, end: i64) -> Self {
        Self::new(self.branch_id, self.start, end)
    }

    /// Clips the segment so it ends no later than `timestamp`.
    pub fn restrict_to(&self, timestamp: i64) -> Self {
        Self::new(self.branch_id, self.start, max(self.start, min(self.end, timestamp)))
    }

    /// Overlapping or adjacent ranges of the same branch.
    pub fn touches(&self, other: &Self) -> bool {
        self.branch_id == other.branch_id && other.start <= self.end && self.start <= other.end
    }

    pub fn intersect(&self, other: &Self) -> Option<Self> {
        if self.branch_id != other.branch_id {
            return None;
        }
        let segment = Self::new(
            self.branch_id,
            max(self.start, other.start),
            min(self.end, other.end),
        );
        (!segment.is_empty()).then_some(segment)
    }

    /// Parts of this segment not covered by `covers`.
    ///
    /// `covers` must be sorted by start; segments of other branches are ignored.
    pub fn subtract<'a, I>(&self, covers: I) -> Vec<Self>
    where
        I: IntoIterator<Item = &'a RevisionSegment>,
    {
        let mut remaining = Vec::new();
        let mut cursor = self.start;
        for cover in covers {
            if cover.branch_id != self.branch_id || cover.end <= cursor {
                continue;
            }
            if cover.start >= self.end {
                break;
            }
            if cover.start > cursor {
                remaining.push(Self::new(self.branch_id, cursor, cover.start));
            }
            cursor = max(cursor, cover.end);
            if cursor >= self.end {
                break;
            }
        }
        if cursor < self.end {
            remaining.push(Self::new(self.branch_id, cursor, self.end));
        }
        remaining
    }
}

// Timestamp order first, so a set of segments reads as a history.
impl Ord for RevisionSegment {
    fn cmp(&self, other: &Self) -> Ordering {
        self.start
            .cmp(&other.start)
            .then(self.branch_id.cmp(&other.branch_id))
            .then(self.end.cmp(&other.end))
    }
}

impl PartialOrd for RevisionSegment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for RevisionSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}..{}]", self.branch_id, self.start, self.end)
    }
}

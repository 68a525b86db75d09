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

//! Commit records: the durable log of every change applied to a branch.

use crate::point::RevisionBranchPoint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChangeKind {
    Add,
    Change,
    Remove,
}

/// What a commit did, grouped by object type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommitDetail {
    Component {
        op: ChangeKind,
        object_type: String,
        container_id: Option<String>,
        object_ids: BTreeSet<String>,
    },
    Property {
        op: ChangeKind,
        object_type: String,
        property: String,
        object_ids: BTreeSet<String>,
    },
}

impl CommitDetail {
    pub fn object_ids(&self) -> &BTreeSet<String> {
        match self {
            Self::Component { object_ids, .. } | Self::Property { object_ids, .. } => object_ids,
        }
    }

    pub fn op(&self) -> ChangeKind {
        match self {
            Self::Component { op, .. } | Self::Property { op, .. } => *op,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub id: String,
    #[serde(default)]
    pub group_id: Option<String>,
    pub branch: String,
    pub author: String,
    pub comment: String,
    /// Microseconds since epoch.
    pub timestamp: i64,
    pub details: Vec<CommitDetail>,
    pub subjects: BTreeSet<String>,
    #[serde(default)]
    pub merge_source: Option<RevisionBranchPoint>,
}

impl Commit {
    pub fn new(
        branch: impl Into<String>,
        author: impl Into<String>,
        comment: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            group_id: None,
            branch: branch.into(),
            author: author.into(),
            comment: comment.into(),
            timestamp,
            details: Vec::new(),
            subjects: BTreeSet::new(),
            merge_source: None,
        }
    }

    pub fn datetime(&self) -> DateTime<Utc> {
        let secs = self.timestamp.div_euclid(1_000_000);
        let nsecs = (self.timestamp.rem_euclid(1_000_000) * 1_000) as u32;
        DateTime::from_timestamp(secs, nsecs).unwrap_or_default()
    }

    /// Every object id named by a component detail.
    pub fn affected_ids(&self) -> BTreeSet<&str> {
        self.details
            .iter()
            .filter(|d| matches!(d, CommitDetail::Component { .. }))
            .flat_map(|d| d.object_ids().iter().map(String::as_str))
            .collect()
    }

    pub fn is_merge(&self) -> bool {
        self.merge_source.is_some()
    }
}

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

//! Structured merge and rebase conflicts.

use crate::key::ObjectKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// A single unresolvable clash on one object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Conflict {
    /// Both sides changed the same property to different values.
    ChangedInSourceAndTarget {
        object: ObjectKey,
        property: String,
        source_value: Value,
        target_value: Value,
    },
    /// Both sides added an object with the same id and different content.
    AddedInSourceAndTarget { object: ObjectKey },
    /// A commit landed on the branch while this one was staged and both touched the object.
    ConcurrentChange {
        object: ObjectKey,
        property: Option<String>,
    },
}

impl Conflict {
    pub fn object(&self) -> &ObjectKey {
        match self {
            Self::ChangedInSourceAndTarget { object, .. }
            | Self::AddedInSourceAndTarget { object }
            | Self::ConcurrentChange { object, .. } => object,
        }
    }

    pub fn property(&self) -> Option<&str> {
        match self {
            Self::ChangedInSourceAndTarget { property, .. } => Some(property),
            Self::ConcurrentChange { property, .. } => property.as_deref(),
            Self::AddedInSourceAndTarget { .. } => None,
        }
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChangedInSourceAndTarget {
                object,
                property,
                source_value,
                target_value,
            } => write!(
                f,
                "{object} property '{property}' changed to {source_value} in source and {target_value} in target"
            ),
            Self::AddedInSourceAndTarget { object } => {
                write!(f, "{object} added in both source and target")
            }
            Self::ConcurrentChange {
                object,
                property: Some(property),
            } => write!(f, "{object} property '{property}' changed concurrently"),
            Self::ConcurrentChange {
                object,
                property: None,
            } => write!(f, "{object} changed concurrently"),
        }
    }
}

/// The operation that surfaced a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeOperation {
    Merge,
    Squash,
    Rebase,
    Commit,
}

impl fmt::Display for MergeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Merge => "Merge",
            Self::Squash => "Squash merge",
            Self::Rebase => "Rebase",
            Self::Commit => "Commit",
        };
        f.write_str(name)
    }
}

/// Raised when automatic resolution leaves clashes behind.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{operation} conflict on branch '{branch_path}': {}", summarize(.conflicts))]
pub struct BranchMergeConflict {
    pub branch_path: String,
    pub operation: MergeOperation,
    pub conflicts: Vec<Conflict>,
}

impl BranchMergeConflict {
    pub fn new(
        branch_path: impl Into<String>,
        operation: MergeOperation,
        conflicts: Vec<Conflict>,
    ) -> Self {
        Self {
            branch_path: branch_path.into(),
            operation,
            conflicts,
        }
    }

    /// Ids of every conflicting object, in report order.
    pub fn object_ids(&self) -> Vec<&str> {
        self.conflicts.iter().map(|c| c.object().id.as_str()).collect()
    }
}

fn summarize(conflicts: &[Conflict]) -> String {
    conflicts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

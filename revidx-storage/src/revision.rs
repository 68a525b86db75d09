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

//! Stored document revisions.
//!
//! A revision is one immutable version of a document. It is created at a
//! branch point and superseded by adding points to `revised`; nothing is
//! ever deleted.

use revidx_core::{ObjectKey, RevisionBranchPoint, RevisionBranchRef};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

pub const FIELD_ID: &str = "_id";
pub const FIELD_TYPE: &str = "_type";
pub const FIELD_CONTAINER: &str = "_container";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    pub doc_type: String,
    pub id: String,
    #[serde(default)]
    pub container_id: Option<String>,
    pub created: RevisionBranchPoint,
    #[serde(default)]
    pub revised: BTreeSet<RevisionBranchPoint>,
    /// Domain fields of the document.
    pub source: Map<String, Value>,
}

impl Revision {
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.doc_type.clone(), self.id.clone())
    }

    pub fn is_visible_in(&self, branch_ref: &RevisionBranchRef) -> bool {
        branch_ref.is_visible(&self.created, &self.revised)
    }

    /// Created or superseded within the ref.
    pub fn is_touched_in(&self, branch_ref: &RevisionBranchRef) -> bool {
        branch_ref.touches(&self.created, &self.revised)
    }

    pub fn same_content(&self, other: &Revision) -> bool {
        self.source == other.source && self.container_id == other.container_id
    }

    /// All values at a dotted path; arrays are flattened at every level.
    pub fn field_values<'a>(&'a self, path: &str) -> Vec<&'a Value> {
        let mut values = Vec::new();
        let mut segments = path.split('.');
        let Some(first) = segments.next() else {
            return values;
        };
        let rest: Vec<&str> = segments.collect();
        if let Some(value) = self.source.get(first) {
            collect_values(value, &rest, &mut values);
        }
        values
    }
}

fn collect_values<'a>(value: &'a Value, path: &[&str], out: &mut Vec<&'a Value>) {
    match (value, path.split_first()) {
        (Value::Array(items), _) => {
            for item in items {
                collect_values(item, path, out);
            }
        }
        (_, None) => out.push(value),
        (Value::Object(map), Some((head, tail))) => {
            if let Some(child) = map.get(*head) {
                collect_values(child, tail, out);
            }
        }
        _ => {}
    }
}

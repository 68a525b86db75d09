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

use revidx_core::ObjectKey;
use serde_json::Value;

/// Decides scalar clashes a merge cannot settle on its own.
pub trait RevisionConflictProcessor: Send + Sync {
    /// `None` leaves the clash unresolved. `Some(None)` removes the property.
    fn resolve_property(
        &self,
        object: &ObjectKey,
        property: &str,
        source: Option<&Value>,
        target: Option<&Value>,
    ) -> Option<Option<Value>>;
}

/// Leaves every clash unresolved, so merges report `ChangedInSourceAndTarget`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConflictProcessor;

impl RevisionConflictProcessor for DefaultConflictProcessor {
    fn resolve_property(
        &self,
        _object: &ObjectKey,
        _property: &str,
        _source: Option<&Value>,
        _target: Option<&Value>,
    ) -> Option<Option<Value>> {
        None
    }
}

/// Settles every clash in favour of the target branch.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepTargetProcessor;

impl RevisionConflictProcessor for KeepTargetProcessor {
    fn resolve_property(
        &self,
        _object: &ObjectKey,
        _property: &str,
        _source: Option<&Value>,
        target: Option<&Value>,
    ) -> Option<Option<Value>> {
        Some(target.cloned())
    }
}

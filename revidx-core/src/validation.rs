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

//! Branch name rules.

use crate::error::{Result, RevisionError};
use regex::Regex;
use std::sync::LazyLock;

pub const MAX_BRANCH_NAME_LENGTH: usize = 50;

static BRANCH_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.~-]+$").expect("branch name pattern is valid"));

/// Validates a single branch name (or alias); no separators allowed.
pub fn validate_branch_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(RevisionError::bad_request("Branch name may not be empty"));
    }
    if name.chars().count() > MAX_BRANCH_NAME_LENGTH {
        return Err(RevisionError::bad_request(format!(
            "Branch name '{name}' is longer than {MAX_BRANCH_NAME_LENGTH} characters"
        )));
    }
    if !BRANCH_NAME.is_match(name) {
        return Err(RevisionError::bad_request(format!(
            "Branch name '{name}' contains invalid characters; allowed are letters, digits and '_', '.', '~', '-'"
        )));
    }
    Ok(())
}

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

//! Branch path expressions.
//!
//! ```text
//! MAIN/a           plain path, the branch head
//! MAIN/a^          base ref, the parent's state when MAIN/a branched off
//! MAIN/a@1000      state as of timestamp 1000
//! MAIN:MAIN/a      everything on MAIN/a that MAIN does not have
//! ```

use crate::error::{Result, RevisionError};
use std::fmt;
use std::str::FromStr;

pub const BASE_SUFFIX: char = '^';
pub const AT_CHAR: char = '@';
pub const RANGE_CHAR: char = ':';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchExpression {
    Path(String),
    Base(String),
    At { path: String, timestamp: i64 },
    Range {
        from: Box<BranchExpression>,
        to: Box<BranchExpression>,
    },
}

impl BranchExpression {
    pub fn parse(expression: &str) -> Result<Self> {
        match expression.split_once(RANGE_CHAR) {
            Some((from, to)) => {
                if to.contains(RANGE_CHAR) {
                    return Err(RevisionError::illegal_argument(format!(
                        "Only one '{RANGE_CHAR}' is allowed in branch expression '{expression}'"
                    )));
                }
                Ok(Self::Range {
                    from: Box::new(Self::parse_single(from, expression)?),
                    to: Box::new(Self::parse_single(to, expression)?),
                })
            }
            None => Self::parse_single(expression, expression),
        }
    }

    fn parse_single(part: &str, expression: &str) -> Result<Self> {
        if let Some((path, timestamp)) = part.split_once(AT_CHAR) {
            let path = Self::parse_path(path, expression)?;
            if timestamp.is_empty() {
                return Err(RevisionError::illegal_argument(format!(
                    "Missing timestamp in branch expression '{expression}'"
                )));
            }
            let timestamp: i64 = timestamp.parse().map_err(|_| {
                RevisionError::illegal_argument(format!(
                    "Invalid timestamp '{timestamp}' in branch expression '{expression}'"
                ))
            })?;
            if timestamp < 0 {
                return Err(RevisionError::illegal_argument(format!(
                    "Timestamp must be non-negative in branch expression '{expression}'"
                )));
            }
            return Ok(Self::At { path, timestamp });
        }
        if let Some(path) = part.strip_suffix(BASE_SUFFIX) {
            return Ok(Self::Base(Self::parse_path(path, expression)?));
        }
        Ok(Self::Path(Self::parse_path(part, expression)?))
    }

    fn parse_path(path: &str, expression: &str) -> Result<String> {
        if path.is_empty() {
            return Err(RevisionError::illegal_argument(format!(
                "Missing branch path in branch expression '{expression}'"
            )));
        }
        if path.contains([BASE_SUFFIX, AT_CHAR]) {
            return Err(RevisionError::illegal_argument(format!(
                "Malformed branch path '{path}' in branch expression '{expression}'"
            )));
        }
        Ok(path.to_string())
    }

    /// Only plain paths accept writes.
    pub fn is_writable(&self) -> bool {
        matches!(self, Self::Path(_))
    }

    /// The branch path the expression is anchored on; for ranges, the compared side.
    pub fn path(&self) -> &str {
        match self {
            Self::Path(path) | Self::Base(path) | Self::At { path, .. } => path,
            Self::Range { to, .. } => to.path(),
        }
    }
}

impl FromStr for BranchExpression {
    type Err = RevisionError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for BranchExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.write_str(path),
            Self::Base(path) => write!(f, "{path}{BASE_SUFFIX}"),
            Self::At { path, timestamp } => write!(f, "{path}{AT_CHAR}{timestamp}"),
            Self::Range { from, to } => write!(f, "{from}{RANGE_CHAR}{to}"),
        }
    }
}

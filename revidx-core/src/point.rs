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

//! Branch points: "branch X as of timestamp T".
//!
//! A point packs into a single 128-bit value (branch id in the high half,
//! timestamp in the low half) which is stored as IPv6 address text. The
//! address form keeps stored points compact and sortable by the store's
//! ip-typed fields.

use crate::error::{Result, RevisionError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct RevisionBranchPoint {
    branch_id: i64,
    timestamp: i64,
}

impl RevisionBranchPoint {
    pub const fn new(branch_id: i64, timestamp: i64) -> Self {
        Self {
            branch_id,
            timestamp,
        }
    }

    pub fn branch_id(&self) -> i64 {
        self.branch_id
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn to_packed(&self) -> u128 {
        ((self.branch_id as u64 as u128) << 64) | (self.timestamp as u64 as u128)
    }

    pub fn from_packed(packed: u128) -> Self {
        Self {
            branch_id: (packed >> 64) as u64 as i64,
            timestamp: packed as u64 as i64,
        }
    }

    /// Packed form rendered as address text.
    pub fn to_ip_address(&self) -> String {
        Ipv6Addr::from(self.to_packed()).to_string()
    }

    /// Parses the address text produced by [`to_ip_address`](Self::to_ip_address).
    pub fn value_of(packed: &str) -> Result<Self> {
        let addr = Ipv6Addr::from_str(packed).map_err(|_| {
            RevisionError::illegal_argument(format!("Invalid branch point '{packed}'"))
        })?;
        Ok(Self::from_packed(u128::from(addr)))
    }
}

impl Ord for RevisionBranchPoint {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then(self.branch_id.cmp(&other.branch_id))
    }
}

impl PartialOrd for RevisionBranchPoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for RevisionBranchPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.branch_id, self.timestamp)
    }
}

impl FromStr for RevisionBranchPoint {
    type Err = RevisionError;

    fn from_str(s: &str) -> Result<Self> {
        Self::value_of(s)
    }
}

impl From<RevisionBranchPoint> for String {
    fn from(point: RevisionBranchPoint) -> Self {
        point.to_ip_address()
    }
}

impl TryFrom<String> for RevisionBranchPoint {
    type Error = RevisionError;

    fn try_from(value: String) -> Result<Self> {
        Self::value_of(&value)
    }
}

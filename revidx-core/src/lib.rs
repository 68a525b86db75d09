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

//! Revidx Core
//!
//! Value types of the revision-oriented branching engine:
//!
//! - [`RevisionBranchPoint`]: branch X as of timestamp T
//! - [`RevisionSegment`]: a timestamp range owned by one branch
//! - [`RevisionBranchRef`]: a segment set with difference and intersection
//! - [`RevisionBranch`]: the persisted branch entity and its update scripts
//! - [`BranchExpression`]: the `path^`, `path@ts` and `a:b` grammar
//! - [`Commit`], [`IndexConfig`], [`RevisionError`]
//!
//! Nothing here touches storage.

pub mod branch;
pub mod branch_ref;
pub mod clock;
pub mod commit;
pub mod config;
pub mod conflict;
pub mod error;
pub mod expression;
pub mod key;
pub mod point;
pub mod segment;
pub mod validation;

pub use branch::{
    BranchState, BranchUpdate, MergeUpdate, RevisionBranch, RevisionBranchMergeSource,
    MAIN_BRANCH_ID, MAIN_PATH, SEPARATOR,
};
pub use branch_ref::RevisionBranchRef;
pub use clock::{LogicalClock, MonotonicClock, TimestampProvider};
pub use commit::{ChangeKind, Commit, CommitDetail};
pub use config::IndexConfig;
pub use conflict::{BranchMergeConflict, Conflict, MergeOperation};
pub use error::{ErrorKind, Result, RevisionError};
pub use expression::BranchExpression;
pub use key::ObjectKey;
pub use point::RevisionBranchPoint;
pub use segment::RevisionSegment;
pub use validation::validate_branch_name;

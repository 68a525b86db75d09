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

//! Error taxonomy shared by every layer of the revision index.

use crate::conflict::BranchMergeConflict;
use thiserror::Error;

/// Coarse classification of a [`RevisionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,
    NotFound,
    AlreadyExists,
    IllegalArgument,
    Conflict,
    Timeout,
    Hook,
    IndexClosed,
    Config,
    Storage,
    Serialization,
}

/// Errors raised by branching, commit, merge and read operations.
#[derive(Debug, Error)]
pub enum RevisionError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{kind} '{key}' not found")]
    NotFound { kind: &'static str, key: String },

    #[error("{kind} '{key}' already exists")]
    AlreadyExists { kind: &'static str, key: String },

    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    #[error(transparent)]
    Conflict(#[from] BranchMergeConflict),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Pre-commit hook failed: {0:#}")]
    Hook(anyhow::Error),

    #[error("Index is closed")]
    IndexClosed,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RevisionError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn illegal_argument(message: impl Into<String>) -> Self {
        Self::IllegalArgument(message.into())
    }

    pub fn branch_not_found(path: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Branch",
            key: path.into(),
        }
    }

    pub fn branch_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind: "Branch",
            key: path.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BadRequest(_) => ErrorKind::BadRequest,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::IllegalArgument(_) => ErrorKind::IllegalArgument,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Hook(_) => ErrorKind::Hook,
            Self::IndexClosed => ErrorKind::IndexClosed,
            Self::Config(_) => ErrorKind::Config,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// Conflicts and lock timeouts go away after refreshing and retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Conflict | ErrorKind::Timeout)
    }

    /// Returns the merge conflict payload, if this is a conflict.
    pub fn as_conflict(&self) -> Option<&BranchMergeConflict> {
        match self {
            Self::Conflict(conflict) => Some(conflict),
            _ => None,
        }
    }
}

pub type Result<T, E = RevisionError> = std::result::Result<T, E>;

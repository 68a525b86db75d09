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

//! Commit hooks.
//!
//! Hooks are owned by a [`RevisionIndex`](crate::RevisionIndex) and live
//! until removed or until the index is closed. Pre-commit hooks run in
//! registration order inside the commit's critical section and may stage
//! further changes; any error aborts the commit before anything is written.
//! Post-commit hooks observe the finished commit and cannot fail it.

use crate::staging::StagingArea;
use parking_lot::RwLock;
use revidx_core::Commit;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub trait PreCommitHook: Send + Sync {
    fn run(&self, staging: &mut StagingArea) -> anyhow::Result<()>;
}

impl<F> PreCommitHook for F
where
    F: Fn(&mut StagingArea) -> anyhow::Result<()> + Send + Sync,
{
    fn run(&self, staging: &mut StagingArea) -> anyhow::Result<()> {
        self(staging)
    }
}

pub trait PostCommitHook: Send + Sync {
    fn run(&self, commit: &Commit) -> anyhow::Result<()>;
}

impl<F> PostCommitHook for F
where
    F: Fn(&Commit) -> anyhow::Result<()> + Send + Sync,
{
    fn run(&self, commit: &Commit) -> anyhow::Result<()> {
        self(commit)
    }
}

#[derive(Clone)]
pub enum Hook {
    PreCommit(Arc<dyn PreCommitHook>),
    PostCommit(Arc<dyn PostCommitHook>),
}

impl Hook {
    pub fn pre_commit(hook: impl PreCommitHook + 'static) -> Self {
        Self::PreCommit(Arc::new(hook))
    }

    pub fn post_commit(hook: impl PostCommitHook + 'static) -> Self {
        Self::PostCommit(Arc::new(hook))
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreCommit(_) => f.write_str("Hook::PreCommit"),
            Self::PostCommit(_) => f.write_str("Hook::PostCommit"),
        }
    }
}

/// Handle returned by [`Hooks::add_hook`], used to remove the hook again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HookHandle(u64);

/// Ordered hook registry.
#[derive(Default)]
pub struct Hooks {
    entries: RwLock<Vec<(HookHandle, Hook)>>,
    next_handle: AtomicU64,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_hook(&self, hook: Hook) -> HookHandle {
        let handle = HookHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.entries.write().push((handle, hook));
        handle
    }

    /// Returns `false` when the handle was not registered.
    pub fn remove_hook(&self, handle: HookHandle) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(h, _)| *h != handle);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Snapshot taken at commit start; hooks added meanwhile apply to later commits.
    pub fn pre_commit_hooks(&self) -> Vec<Arc<dyn PreCommitHook>> {
        self.entries
            .read()
            .iter()
            .filter_map(|(_, hook)| match hook {
                Hook::PreCommit(h) => Some(Arc::clone(h)),
                Hook::PostCommit(_) => None,
            })
            .collect()
    }

    pub fn post_commit_hooks(&self) -> Vec<Arc<dyn PostCommitHook>> {
        self.entries
            .read()
            .iter()
            .filter_map(|(_, hook)| match hook {
                Hook::PostCommit(h) => Some(Arc::clone(h)),
                Hook::PreCommit(_) => None,
            })
            .collect()
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hooks_keep_registration_order() {
        let hooks = Hooks::new();
        let first = hooks.add_hook(Hook::post_commit(|_: &Commit| Ok(())));
        let second = hooks.add_hook(Hook::pre_commit(|_: &mut StagingArea| Ok(())));
        assert_ne!(first, second);
        assert_eq!(hooks.len(), 2);
        assert_eq!(hooks.pre_commit_hooks().len(), 1);
        assert_eq!(hooks.post_commit_hooks().len(), 1);

        assert!(hooks.remove_hook(first));
        assert!(!hooks.remove_hook(first));
        assert!(hooks.post_commit_hooks().is_empty());

        hooks.clear();
        assert!(hooks.is_empty());
    }

    #[test]
    fn test_post_commit_closure_receives_commit() {
        let hook = Hook::post_commit(|commit: &Commit| {
            anyhow::ensure!(commit.branch == "MAIN", "unexpected branch {}", commit.branch);
            Ok(())
        });
        let Hook::PostCommit(hook) = hook else {
            panic!("expected post-commit hook");
        };
        assert!(hook.run(&Commit::new("MAIN", "a", "c", 1)).is_ok());
        assert!(hook.run(&Commit::new("MAIN/x", "a", "c", 1)).is_err());
    }
}

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

//! Integration tests for staging, commit records and commit hooks

mod common;

use common::{data, get, index, index_new, Data};
use revidx_core::{ChangeKind, Commit, CommitDetail, ErrorKind};
use revidx_storage::{CommitQuery, Hook, StagingArea};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Test a plain commit and its record
#[test]
fn test_commit_records_details_and_subjects() {
    let index = index();
    index_new(&index, "MAIN", &[data("1", "a", "b")]);

    let commit = index
        .write_as("MAIN", index.current_time(), "alice", "edit", |staging| {
            staging.stage_new(&data("2", "a", "b"))?;
            staging.stage_change(&data("1", "a", "b"), &data("1", "x", "b"))?;
            staging.set_group_id("batch-1");
            Ok(())
        })
        .unwrap();

    assert_eq!(commit.branch, "MAIN");
    assert_eq!(commit.author, "alice");
    assert_eq!(commit.group_id.as_deref(), Some("batch-1"));
    assert!(!commit.is_merge());
    assert_eq!(
        commit.subjects,
        BTreeSet::from(["1".to_string(), "2".to_string()])
    );
    assert!(commit.details.iter().any(|d| matches!(
        d,
        CommitDetail::Property { property, .. } if property == "field1"
    )));
    assert_eq!(commit.affected_ids(), BTreeSet::from(["1", "2"]));

    let head = index.branching().get_branch("MAIN").unwrap().head_timestamp();
    assert_eq!(head, commit.timestamp);
    assert_eq!(get::<Data>(&index, "MAIN", "1").unwrap().field1, "x");
}

/// Test the commit log queries
#[test]
fn test_commit_log() {
    let index = index();
    let child = index.branching().create_branch("MAIN", "a").unwrap();
    index_new(&index, "MAIN", &[data("1", "a", "b")]);
    index_new(&index, &child, &[data("2", "a", "b")]);
    let last = index
        .write_as("MAIN", index.current_time(), "bob", "remove", |s| {
            s.stage_remove(&data("1", "a", "b"))
        })
        .unwrap();

    let main = index.commits(&CommitQuery::new().branch("MAIN")).unwrap();
    assert_eq!(main.len(), 2);
    assert_eq!(main[0].id, last.id);

    let by_bob = index.commits(&CommitQuery::new().author("bob")).unwrap();
    assert_eq!(by_bob.len(), 1);
    assert!(by_bob[0]
        .details
        .iter()
        .any(|d| d.op() == ChangeKind::Remove));

    let touching = index.commits(&CommitQuery::new().affected_id("2")).unwrap();
    assert_eq!(touching.len(), 1);
    assert_eq!(touching[0].branch, child);

    let limited = index.commits(&CommitQuery::new().limit(1)).unwrap();
    assert_eq!(limited[0].id, last.id);
}

/// Test that an older requested timestamp is replaced by a fresh one
#[test]
fn test_commit_timestamp_stays_monotonic() {
    let index = index();
    let first = index
        .write("MAIN", index.current_time(), |s| s.stage_new(&data("1", "a", "b")))
        .unwrap();
    let second = index
        .write("MAIN", 5, |s| s.stage_new(&data("2", "a", "b")))
        .unwrap();
    assert!(second.timestamp > first.timestamp);
    assert!(index.current_time() > second.timestamp);
}

/// Test that a commit at the largest timestamp is rejected and writes nothing
#[test]
fn test_commit_at_max_timestamp_rejected() {
    let index = index();
    let head = index.branching().get_branch("MAIN").unwrap().head_timestamp();
    let err = index
        .write("MAIN", i64::MAX, |s| s.stage_new(&data("1", "a", "b")))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalArgument);
    assert!(get::<Data>(&index, "MAIN", "1").is_none());
    assert_eq!(index.branching().get_branch("MAIN").unwrap().head_timestamp(), head);

    let commit = index
        .write("MAIN", i64::MAX - 1, |s| s.stage_new(&data("1", "a", "b")))
        .unwrap();
    assert_eq!(commit.timestamp, i64::MAX - 1);
    assert!(index.current_time() > commit.timestamp);
}

/// Test that a failing pre-commit hook aborts without side effects
#[test]
fn test_pre_commit_hook_failure_aborts_commit() {
    let index = index();
    let before = index.branching().get_branch("MAIN").unwrap();
    let handle = index.hooks().add_hook(Hook::pre_commit(
        |_: &mut StagingArea| -> anyhow::Result<()> { anyhow::bail!("rejected by policy") },
    ));

    let err = index
        .write("MAIN", index.current_time(), |s| s.stage_new(&data("1", "a", "b")))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Hook);
    assert!(err.to_string().contains("rejected by policy"));

    assert_eq!(index.branching().get_branch("MAIN").unwrap(), before);
    assert!(get::<Data>(&index, "MAIN", "1").is_none());
    assert!(index.commits(&CommitQuery::new()).unwrap().is_empty());

    assert!(index.hooks().remove_hook(handle));
    assert!(!index.hooks().remove_hook(handle));
    index_new(&index, "MAIN", &[data("1", "a", "b")]);
    assert!(get::<Data>(&index, "MAIN", "1").is_some());
}

/// Test that pre-commit hooks can stage further changes
#[test]
fn test_pre_commit_hook_stages_changes() {
    let index = index();
    index.hooks().add_hook(Hook::pre_commit(
        |staging: &mut StagingArea| -> anyhow::Result<()> {
            let mut stamped = Vec::new();
            for doc in staging.new_documents::<Data>()? {
                if doc.field2 != "stamped" {
                    stamped.push(Data {
                        field2: "stamped".into(),
                        ..doc
                    });
                }
            }
            for doc in stamped {
                staging.stage_new(&doc)?;
            }
            Ok(())
        },
    ));

    index_new(&index, "MAIN", &[data("1", "a", "b"), data("2", "a", "b")]);
    assert_eq!(get::<Data>(&index, "MAIN", "1").unwrap().field2, "stamped");
    assert_eq!(get::<Data>(&index, "MAIN", "2").unwrap().field2, "stamped");
}

/// Test that post-commit hooks see the commit and cannot fail it
#[test]
fn test_post_commit_hooks() {
    let index = index();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    index.hooks().add_hook(Hook::post_commit(
        move |commit: &Commit| -> anyhow::Result<()> {
            assert_eq!(commit.branch, "MAIN");
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
    ));
    index.hooks().add_hook(Hook::post_commit(
        |_: &Commit| -> anyhow::Result<()> { anyhow::bail!("notification service down") },
    ));
    assert_eq!(index.hooks().len(), 2);

    index_new(&index, "MAIN", &[data("1", "a", "b")]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(get::<Data>(&index, "MAIN", "1").is_some());
}

/// Test that hooks are dropped when the index closes
#[test]
fn test_close_clears_hooks() {
    let index = index();
    index
        .hooks()
        .add_hook(Hook::post_commit(|_: &Commit| -> anyhow::Result<()> { Ok(()) }));
    index.close();
    assert!(index.hooks().is_empty());
    let err = index.prepare_commit("MAIN").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IndexClosed);
}

/// Test that an empty commit still moves the head
#[test]
fn test_empty_commit_advances_head() {
    let index = index();
    let before = index.branching().get_branch("MAIN").unwrap().head_timestamp();
    let commit = index.write("MAIN", index.current_time(), |_| Ok(())).unwrap();
    assert!(commit.details.is_empty());
    let after = index.branching().get_branch("MAIN").unwrap().head_timestamp();
    assert!(after > before);
}

/// Test that the staging view reads the branch without staged changes
#[test]
fn test_staging_read_sees_committed_state() {
    let index = index();
    index_new(&index, "MAIN", &[data("1", "a", "b")]);
    let mut staging = index.prepare_commit("MAIN").unwrap();
    staging.stage_new(&data("2", "a", "b")).unwrap();

    let (one, two) = staging
        .read(|s| Ok((s.get::<Data>("1")?, s.get::<Data>("2")?)))
        .unwrap();
    assert!(one.is_some());
    assert!(two.is_none());
    assert!(!staging.is_merge());
    assert!(staging.incoming_keys().is_empty());

    staging.commit(index.current_time(), "system", "").unwrap();
    assert!(get::<Data>(&index, "MAIN", "2").is_some());
}

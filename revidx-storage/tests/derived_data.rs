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

//! Integration tests for ancestor sets maintained by a pre-commit hook

mod common;

use common::{get, index};
use revidx_storage::{AncestorsHook, Edge, Hook, Node, RevisionIndex};

fn graph_index() -> RevisionIndex {
    let index = index();
    index.hooks().add_hook(Hook::pre_commit(AncestorsHook));
    index
}

fn ancestors(index: &RevisionIndex, path: &str, id: &str) -> Vec<String> {
    get::<Node>(index, path, id).unwrap().ancestors
}

fn add_nodes(index: &RevisionIndex, path: &str, ids: &[&str]) {
    index
        .write(path, index.current_time(), |staging| {
            for id in ids {
                staging.stage_new(&Node::new(*id, id.to_uppercase()))?;
            }
            Ok(())
        })
        .unwrap();
}

fn add_edges(index: &RevisionIndex, path: &str, edges: &[(&str, &str)]) {
    index
        .write(path, index.current_time(), |staging| {
            for (child, parent) in edges {
                staging.stage_new(&Edge::new(format!("{child}->{parent}"), *child, *parent))?;
            }
            Ok(())
        })
        .unwrap();
}

/// Test that ancestors follow edge additions and removals
#[test]
fn test_ancestors_recomputed_on_commit() {
    let index = graph_index();
    add_nodes(&index, "MAIN", &["root", "mid", "leaf"]);
    add_edges(&index, "MAIN", &[("mid", "root"), ("leaf", "mid")]);

    assert_eq!(ancestors(&index, "MAIN", "leaf"), vec!["mid", "root"]);
    assert_eq!(ancestors(&index, "MAIN", "mid"), vec!["root"]);
    assert!(ancestors(&index, "MAIN", "root").is_empty());

    index
        .write("MAIN", index.current_time(), |staging| {
            staging.stage_remove(&Edge::new("mid->root", "mid", "root"))
        })
        .unwrap();
    assert_eq!(ancestors(&index, "MAIN", "leaf"), vec!["mid"]);
    assert!(ancestors(&index, "MAIN", "mid").is_empty());
}

/// Test that nodes and edges staged together are combined
#[test]
fn test_ancestors_from_one_commit() {
    let index = graph_index();
    index
        .write("MAIN", index.current_time(), |staging| {
            staging.stage_new(&Node::new("a", "A"))?;
            staging.stage_new(&Node::new("b", "B"))?;
            staging.stage_new(&Edge::new("b->a", "b", "a"))
        })
        .unwrap();
    assert_eq!(ancestors(&index, "MAIN", "b"), vec!["a"]);
}

/// Test that re-running the hook on an unchanged graph stages nothing
#[test]
fn test_hook_is_idempotent() {
    let index = graph_index();
    add_nodes(&index, "MAIN", &["a", "b"]);
    add_edges(&index, "MAIN", &[("b", "a")]);

    let node = get::<Node>(&index, "MAIN", "a").unwrap();
    let relabeled = Node {
        label: "renamed".into(),
        ..node.clone()
    };
    let commit = index
        .write("MAIN", index.current_time(), |s| s.stage_change(&node, &relabeled))
        .unwrap();
    assert_eq!(commit.affected_ids().into_iter().collect::<Vec<_>>(), vec!["a"]);
    assert_eq!(ancestors(&index, "MAIN", "b"), vec!["a"]);
}

/// Test that cycles terminate and include the node itself
#[test]
fn test_cycle() {
    let index = graph_index();
    add_nodes(&index, "MAIN", &["a", "b"]);
    add_edges(&index, "MAIN", &[("a", "b"), ("b", "a")]);
    assert_eq!(ancestors(&index, "MAIN", "a"), vec!["a", "b"]);
    assert_eq!(ancestors(&index, "MAIN", "b"), vec!["a", "b"]);
}

/// Test ancestors after branch-local edits are rebased and squashed
#[test]
fn test_ancestors_across_rebase_and_squash() {
    let index = graph_index();
    let branching = index.branching();
    add_nodes(&index, "MAIN", &["root", "x", "y"]);
    let child = branching.create_branch("MAIN", "a").unwrap();

    add_edges(&index, "MAIN", &[("x", "root")]);
    add_edges(&index, &child, &[("y", "x")]);
    assert_eq!(ancestors(&index, &child, "y"), vec!["x"]);

    branching.prepare_merge("MAIN", &child).merge().unwrap().unwrap();
    assert_eq!(ancestors(&index, &child, "y"), vec!["root", "x"]);
    assert_eq!(ancestors(&index, &child, "x"), vec!["root"]);

    branching
        .prepare_merge(&child, "MAIN")
        .squash(true)
        .merge()
        .unwrap()
        .unwrap();
    assert_eq!(ancestors(&index, "MAIN", "y"), vec!["root", "x"]);
    assert_eq!(ancestors(&index, "MAIN", "x"), vec!["root"]);
}

/// Test ancestors when sibling branches both edit the graph
#[test]
fn test_ancestors_after_merge_of_siblings() {
    let index = graph_index();
    let branching = index.branching();
    add_nodes(&index, "MAIN", &["a", "b", "c"]);
    let left = branching.create_branch("MAIN", "left").unwrap();
    let right = branching.create_branch("MAIN", "right").unwrap();

    add_edges(&index, &left, &[("b", "a")]);
    add_edges(&index, &right, &[("c", "b")]);

    branching.prepare_merge(&left, &right).merge().unwrap().unwrap();
    assert_eq!(ancestors(&index, &right, "c"), vec!["a", "b"]);
    assert_eq!(ancestors(&index, &right, "b"), vec!["a"]);
    assert!(ancestors(&index, &left, "c").is_empty());
}

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

//! Integration tests for comparing branch states

mod common;

use common::{data, index, index_change, index_new, index_remove};
use revidx_core::ChangeKind;
use revidx_storage::{RevisionCompareDetail, RevisionIndex};

fn setup() -> (RevisionIndex, String) {
    let index = index();
    index_new(&index, "MAIN", &[data("1", "a", "b"), data("2", "a", "b")]);
    let child = index.branching().create_branch("MAIN", "a").unwrap();
    (index, child)
}

/// Test a compare of additions, changes and removals
#[test]
fn test_compare_reports_each_kind() {
    let (index, child) = setup();
    index_new(&index, &child, &[data("3", "a", "b")]);
    index_change(&index, &child, &data("1", "a", "b"), &data("1", "x", "b"));
    index_remove(&index, &child, &data("2", "a", "b"));

    let compare = index.compare("MAIN", &child).unwrap();
    assert_eq!(compare.base, "MAIN");
    assert_eq!(compare.compare, child);
    assert_eq!(
        (compare.total_added, compare.total_changed, compare.total_removed),
        (1, 1, 1)
    );
    assert_eq!(compare.total(), 3);

    let change: Vec<&RevisionCompareDetail> = compare.details_for("1").collect();
    assert_eq!(
        change,
        vec![&RevisionCompareDetail::Property {
            object: change[0].object().clone(),
            property: "field1".into(),
            from: Some("a".into()),
            to: Some("x".into()),
        }]
    );
    assert_eq!(compare.details_for("3").next().unwrap().op(), ChangeKind::Add);
    assert_eq!(compare.details_for("2").next().unwrap().op(), ChangeKind::Remove);
}

/// Test that compare is directional
#[test]
fn test_compare_is_directional() {
    let (index, child) = setup();
    index_new(&index, &child, &[data("3", "a", "b")]);

    assert_eq!(index.compare("MAIN", &child).unwrap().total_added, 1);
    assert!(index.compare(&child, "MAIN").unwrap().is_empty());

    index_new(&index, "MAIN", &[data("4", "a", "b")]);
    let reverse = index.compare(&child, "MAIN").unwrap();
    assert_eq!(reverse.total_added, 1);
    assert_eq!(reverse.details[0].object().id, "4");
}

/// Test that a document added and removed on the branch nets to nothing
#[test]
fn test_added_then_removed_nets_out() {
    let (index, child) = setup();
    index_new(&index, &child, &[data("3", "a", "b")]);
    index_remove(&index, &child, &data("3", "a", "b"));
    assert!(index.compare("MAIN", &child).unwrap().is_empty());
}

/// Test that a change followed by a removal is reported as a removal
#[test]
fn test_changed_then_removed_is_removal() {
    let (index, child) = setup();
    index_change(&index, &child, &data("1", "a", "b"), &data("1", "x", "b"));
    index_remove(&index, &child, &data("1", "x", "b"));

    let compare = index.compare("MAIN", &child).unwrap();
    assert_eq!(compare.total_removed, 1);
    assert_eq!(compare.total_changed, 0);
}

/// Test that reverting every property still shows as a change
#[test]
fn test_reverted_change_is_component_change() {
    let (index, child) = setup();
    index_change(&index, &child, &data("1", "a", "b"), &data("1", "x", "b"));
    index_change(&index, &child, &data("1", "x", "b"), &data("1", "a", "b"));

    let compare = index.compare("MAIN", &child).unwrap();
    assert_eq!(compare.total_changed, 1);
    assert!(matches!(
        &compare.details[0],
        RevisionCompareDetail::Component { op: ChangeKind::Change, object, .. } if object.id == "1"
    ));
}

/// Test that the limit bounds details but not totals
#[test]
fn test_compare_limit() {
    let (index, child) = setup();
    let docs: Vec<_> = (10..20).map(|i| data(&i.to_string(), "a", "b")).collect();
    index_new(&index, &child, &docs);

    let compare = index.compare_with_limit("MAIN", &child, 3).unwrap();
    assert_eq!(compare.details.len(), 3);
    assert_eq!(compare.total_added, 10);
}

/// Test comparing against a point in time
#[test]
fn test_compare_with_timestamp_expression() {
    let index = index();
    let first = index
        .write("MAIN", index.current_time(), |s| s.stage_new(&data("1", "a", "b")))
        .unwrap();
    index_new(&index, "MAIN", &[data("2", "a", "b")]);

    let compare = index
        .compare(&format!("MAIN@{}", first.timestamp), "MAIN")
        .unwrap();
    assert_eq!(compare.total_added, 1);
    assert_eq!(compare.details[0].object().id, "2");
}

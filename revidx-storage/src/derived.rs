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

//! Derived ancestor sets over a node/edge graph.
//!
//! [`AncestorsHook`] keeps every [`Node::ancestors`] equal to the set of
//! nodes reachable over [`Edge`]s from child to parent. Each run assembles
//! the graph fresh from the branch view plus the staged deltas, so the
//! result is the same for plain commits, merges and rebases, and running
//! it twice stages nothing new.

use crate::document::Document;
use crate::hooks::PreCommitHook;
use crate::staging::StagingArea;
use crate::store::Query;
use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(default)]
    pub label: String,
    /// Maintained by [`AncestorsHook`], sorted.
    #[serde(default)]
    pub ancestors: Vec<String>,
}

impl Node {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            ancestors: Vec::new(),
        }
    }
}

impl Document for Node {
    const TYPE: &'static str = "node";

    fn id(&self) -> &str {
        &self.id
    }

    fn commit_subject(&self) -> Option<String> {
        Some(self.id.clone())
    }

    fn set_fields() -> &'static [&'static str] {
        &["ancestors"]
    }
}

/// Directed `child -> parent` link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub child: String,
    pub parent: String,
}

impl Edge {
    pub fn new(id: impl Into<String>, child: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            child: child.into(),
            parent: parent.into(),
        }
    }
}

impl Document for Edge {
    const TYPE: &'static str = "edge";

    fn id(&self) -> &str {
        &self.id
    }

    fn container_id(&self) -> Option<&str> {
        Some(&self.child)
    }

    fn commit_subject(&self) -> Option<String> {
        Some(self.child.clone())
    }
}

/// Arena-indexed parent lists.
struct Graph {
    ids: Vec<String>,
    parents: Vec<Vec<usize>>,
}

impl Graph {
    fn build<'a>(node_ids: impl Iterator<Item = &'a String>, edges: impl Iterator<Item = &'a Edge>) -> Self {
        let ids: Vec<String> = node_ids.cloned().collect();
        let slots: AHashMap<&str, usize> = ids
            .iter()
            .enumerate()
            .map(|(slot, id)| (id.as_str(), slot))
            .collect();
        let mut parents = vec![Vec::new(); ids.len()];
        for edge in edges {
            if let (Some(&child), Some(&parent)) =
                (slots.get(edge.child.as_str()), slots.get(edge.parent.as_str()))
            {
                parents[child].push(parent);
            }
        }
        Self { ids, parents }
    }

    /// Sorted ids reachable from `slot`, excluding itself unless on a cycle.
    fn ancestors(&self, slot: usize) -> Vec<String> {
        let mut seen = AHashSet::new();
        let mut queue: VecDeque<usize> = self.parents[slot].iter().copied().collect();
        while let Some(next) = queue.pop_front() {
            if seen.insert(next) {
                queue.extend(self.parents[next].iter().copied());
            }
        }
        let mut ancestors: Vec<String> = seen.into_iter().map(|s| self.ids[s].clone()).collect();
        ancestors.sort();
        ancestors
    }
}

/// Recomputes [`Node::ancestors`] before every commit that changes anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AncestorsHook;

impl PreCommitHook for AncestorsHook {
    fn run(&self, staging: &mut StagingArea) -> anyhow::Result<()> {
        if staging.is_empty() && staging.incoming_keys().is_empty() {
            return Ok(());
        }

        let (stored_nodes, stored_edges) = staging.read(|searcher| {
            let nodes = searcher.search::<Node>(Query::new())?;
            let edges = searcher.search::<Edge>(Query::new())?;
            Ok((nodes, edges))
        })?;
        anyhow::ensure!(
            stored_nodes.total == stored_nodes.len() && stored_edges.total == stored_edges.len(),
            "graph on branch '{}' exceeds the result window",
            staging.branch_path()
        );

        let mut nodes: BTreeMap<String, Node> = stored_nodes
            .into_iter()
            .map(|node| (node.id.clone(), node))
            .collect();
        let mut edges: BTreeMap<String, Edge> = stored_edges
            .into_iter()
            .map(|edge| (edge.id.clone(), edge))
            .collect();
        for node in staging.new_documents::<Node>()? {
            nodes.insert(node.id.clone(), node);
        }
        for (_, node) in staging.changed_documents::<Node>()? {
            nodes.insert(node.id.clone(), node);
        }
        for node in staging.removed_documents::<Node>()? {
            nodes.remove(&node.id);
        }
        for edge in staging.new_documents::<Edge>()? {
            edges.insert(edge.id.clone(), edge);
        }
        for (_, edge) in staging.changed_documents::<Edge>()? {
            edges.insert(edge.id.clone(), edge);
        }
        for edge in staging.removed_documents::<Edge>()? {
            edges.remove(&edge.id);
        }

        let graph = Graph::build(nodes.keys(), edges.values());
        let mut updated = 0;
        for (slot, node) in nodes.values().enumerate() {
            let ancestors = graph.ancestors(slot);
            if node.ancestors != ancestors {
                let next = Node {
                    ancestors,
                    ..node.clone()
                };
                staging.stage_change(node, &next)?;
                updated += 1;
            }
        }
        debug!(
            branch = staging.branch_path(),
            nodes = nodes.len(),
            edges = edges.len(),
            updated,
            "Recomputed ancestors"
        );
        Ok(())
    }
}

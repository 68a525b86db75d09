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

//! Fixtures shared by the integration tests.

#![allow(dead_code)]

use revidx_core::{IndexConfig, LogicalClock};
use revidx_storage::{Document, MemoryStore, RevisionIndex};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Plain two-field document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Data {
    pub id: String,
    pub field1: String,
    pub field2: String,
}

impl Document for Data {
    const TYPE: &'static str = "data";

    fn id(&self) -> &str {
        &self.id
    }

    fn commit_subject(&self) -> Option<String> {
        Some(self.id.clone())
    }
}

pub fn data(id: &str, field1: &str, field2: &str) -> Data {
    Data {
        id: id.into(),
        field1: field1.into(),
        field2: field2.into(),
    }
}

/// Document with one list-typed and one set-typed array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tagged {
    pub id: String,
    pub items: Vec<String>,
    pub tags: Vec<String>,
}

impl Document for Tagged {
    const TYPE: &'static str = "tagged";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_fields() -> &'static [&'static str] {
        &["tags"]
    }
}

pub fn index() -> RevisionIndex {
    index_with(IndexConfig::default())
}

/// Deterministic clock so timestamps stay small and readable.
pub fn index_with(config: IndexConfig) -> RevisionIndex {
    RevisionIndex::with_clock(
        Arc::new(MemoryStore::new()),
        config,
        Arc::new(LogicalClock::starting_at(1_000)),
    )
    .unwrap()
}

pub fn index_new<D: Document>(index: &RevisionIndex, path: &str, docs: &[D]) {
    index
        .write(path, index.current_time(), |staging| {
            for doc in docs {
                staging.stage_new(doc)?;
            }
            Ok(())
        })
        .unwrap();
}

pub fn index_change<D: Document>(index: &RevisionIndex, path: &str, old: &D, new: &D) {
    index
        .write(path, index.current_time(), |staging| staging.stage_change(old, new))
        .unwrap();
}

pub fn index_remove<D: Document>(index: &RevisionIndex, path: &str, doc: &D) {
    index
        .write(path, index.current_time(), |staging| staging.stage_remove(doc))
        .unwrap();
}

pub fn get<D: Document>(index: &RevisionIndex, expression: &str, id: &str) -> Option<D> {
    index.read(expression, |searcher| searcher.get::<D>(id)).unwrap()
}

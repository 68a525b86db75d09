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

//! Field-level three-way merge of document properties.

use super::processor::RevisionConflictProcessor;
use crate::document::DocumentMapping;
use revidx_core::ObjectKey;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// A property both sides changed to different scalar values.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyClash {
    pub property: String,
    pub source: Option<Value>,
    pub target: Option<Value>,
}

/// Applies the source's changes relative to `base` on top of `target`.
///
/// Properties only one side changed take that side's value. When both sides
/// changed an array property, list fields get the target's items plus the
/// source's additions (so identical additions on both sides repeat) and set
/// fields get the deduplicated union. Other clashes go to `processor`;
/// `prefer_source` settles them in the source's favour instead.
pub fn merge_properties(
    object: &ObjectKey,
    mapping: &DocumentMapping,
    base: &Map<String, Value>,
    source: &Map<String, Value>,
    target: &Map<String, Value>,
    prefer_source: bool,
    processor: &dyn RevisionConflictProcessor,
) -> Result<Map<String, Value>, Vec<PropertyClash>> {
    let keys: BTreeSet<&String> = base.keys().chain(source.keys()).chain(target.keys()).collect();
    let mut merged = target.clone();
    let mut clashes = Vec::new();

    for key in keys {
        let (b, s, t) = (base.get(key), source.get(key), target.get(key));
        if s == b {
            continue;
        }
        if t == b {
            assign(&mut merged, key, s.cloned());
            continue;
        }
        if let (Some(Value::Array(source_items)), Some(Value::Array(target_items))) = (s, t) {
            let base_items = match b {
                Some(Value::Array(items)) => items.as_slice(),
                _ => &[],
            };
            let items = if mapping.is_set_field(key) {
                merge_set(base_items, source_items, target_items)
            } else {
                merge_list(base_items, source_items, target_items)
            };
            merged.insert(key.clone(), Value::Array(items));
            continue;
        }
        if s == t {
            continue;
        }
        if prefer_source {
            assign(&mut merged, key, s.cloned());
            continue;
        }
        match processor.resolve_property(object, key, s, t) {
            Some(value) => assign(&mut merged, key, value),
            None => clashes.push(PropertyClash {
                property: key.clone(),
                source: s.cloned(),
                target: t.cloned(),
            }),
        }
    }

    if clashes.is_empty() {
        Ok(merged)
    } else {
        Err(clashes)
    }
}

fn assign(map: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    match value {
        Some(value) => {
            map.insert(key.to_string(), value);
        }
        None => {
            map.remove(key);
        }
    }
}

/// Multiset difference `items - minus`, preserving order.
fn multiset_minus(items: &[Value], minus: &[Value]) -> Vec<Value> {
    let mut remaining: Vec<&Value> = minus.iter().collect();
    items
        .iter()
        .filter(|item| match remaining.iter().position(|m| m == item) {
            Some(idx) => {
                remaining.swap_remove(idx);
                false
            }
            None => true,
        })
        .cloned()
        .collect()
}

fn merge_list(base: &[Value], source: &[Value], target: &[Value]) -> Vec<Value> {
    let added = multiset_minus(source, base);
    let removed = multiset_minus(base, source);
    let mut items = multiset_minus(target, &removed);
    items.extend(added);
    items
}

fn merge_set(base: &[Value], source: &[Value], target: &[Value]) -> Vec<Value> {
    let removed: Vec<&Value> = base.iter().filter(|item| !source.contains(item)).collect();
    let mut items: Vec<Value> = Vec::new();
    for item in target.iter().chain(source) {
        if !removed.contains(&item) && !items.contains(item) {
            items.push(item.clone());
        }
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::processor::DefaultConflictProcessor;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    fn key() -> ObjectKey {
        ObjectKey::new("data", "K1")
    }

    fn merge(
        mapping: &DocumentMapping,
        base: Value,
        source: Value,
        target: Value,
        prefer_source: bool,
    ) -> Result<Map<String, Value>, Vec<PropertyClash>> {
        merge_properties(
            &key(),
            mapping,
            &map(base),
            &map(source),
            &map(target),
            prefer_source,
            &DefaultConflictProcessor,
        )
    }

    #[test]
    fn test_disjoint_fields_merge() {
        let merged = merge(
            &DocumentMapping::new("data"),
            json!({"field1": "a", "field2": "b"}),
            json!({"field1": "a1", "field2": "b"}),
            json!({"field1": "a", "field2": "b2"}),
            false,
        )
        .unwrap();
        assert_eq!(Value::Object(merged), json!({"field1": "a1", "field2": "b2"}));
    }

    #[test]
    fn test_same_value_on_both_sides_is_not_a_clash() {
        let merged = merge(
            &DocumentMapping::new("data"),
            json!({"field1": "a"}),
            json!({"field1": "x"}),
            json!({"field1": "x"}),
            false,
        )
        .unwrap();
        assert_eq!(merged["field1"], json!("x"));
    }

    #[test]
    fn test_scalar_clash_reported_or_forced() {
        let clashes = merge(
            &DocumentMapping::new("data"),
            json!({"field1": "a"}),
            json!({"field1": "s"}),
            json!({"field1": "t"}),
            false,
        )
        .unwrap_err();
        assert_eq!(clashes.len(), 1);
        assert_eq!(clashes[0].property, "field1");
        assert_eq!(clashes[0].source, Some(json!("s")));

        let forced = merge(
            &DocumentMapping::new("data"),
            json!({"field1": "a"}),
            json!({"field1": "s"}),
            json!({"field1": "t"}),
            true,
        )
        .unwrap();
        assert_eq!(forced["field1"], json!("s"));
    }

    #[test]
    fn test_identical_list_additions_repeat() {
        let merged = merge(
            &DocumentMapping::new("data"),
            json!({"items": []}),
            json!({"items": [{"id": 1}, {"id": 2}]}),
            json!({"items": [{"id": 1}, {"id": 2}]}),
            false,
        )
        .unwrap();
        assert_eq!(merged["items"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_identical_set_additions_deduplicate() {
        let mapping = DocumentMapping::new("data").with_set_field("items");
        let merged = merge(
            &mapping,
            json!({"items": []}),
            json!({"items": [{"id": 1}, {"id": 2}]}),
            json!({"items": [{"id": 1}, {"id": 2}]}),
            false,
        )
        .unwrap();
        assert_eq!(merged["items"], json!([{"id": 1}, {"id": 2}]));
    }

    #[test]
    fn test_list_removals_apply_to_target() {
        let merged = merge(
            &DocumentMapping::new("data"),
            json!({"items": ["a", "b"]}),
            json!({"items": ["b"]}),
            json!({"items": ["a", "b", "c"]}),
            false,
        )
        .unwrap();
        assert_eq!(merged["items"], json!(["b", "c"]));
    }

    #[test]
    fn test_removed_property_on_source_side() {
        let merged = merge(
            &DocumentMapping::new("data"),
            json!({"gone": 1, "kept": 1}),
            json!({"kept": 1}),
            json!({"gone": 1, "kept": 2}),
            false,
        )
        .unwrap();
        assert_eq!(Value::Object(merged), json!({"kept": 2}));
    }
}

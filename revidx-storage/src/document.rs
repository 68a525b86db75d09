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

//! Typed documents and their type-erased staged form.

use crate::revision::Revision;
use crate::store::TypeMapping;
use revidx_core::{ObjectKey, Result, RevisionError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// A versioned document type.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Type tag under which revisions are stored.
    const TYPE: &'static str;

    fn id(&self) -> &str;

    /// Parent grouping, e.g. the concept a description belongs to.
    fn container_id(&self) -> Option<&str> {
        None
    }

    /// Id recorded in the subjects of commits touching this document.
    fn commit_subject(&self) -> Option<String> {
        None
    }

    /// Array properties merged with set semantics; all others are lists.
    fn set_fields() -> &'static [&'static str] {
        &[]
    }
}

type SubjectFn = fn(&Map<String, Value>) -> Option<String>;

fn subject_of<D: Document>(source: &Map<String, Value>) -> Option<String> {
    serde_json::from_value::<D>(Value::Object(source.clone()))
        .ok()
        .and_then(|doc| doc.commit_subject())
}

/// How a document type's properties behave during merges.
#[derive(Debug, Clone)]
pub struct DocumentMapping {
    doc_type: String,
    set_fields: BTreeSet<String>,
    subject: Option<SubjectFn>,
}

impl DocumentMapping {
    /// Mapping for an unregistered type: every array is a list.
    pub fn new(doc_type: impl Into<String>) -> Self {
        Self {
            doc_type: doc_type.into(),
            set_fields: BTreeSet::new(),
            subject: None,
        }
    }

    pub fn of<D: Document>() -> Self {
        Self {
            doc_type: D::TYPE.to_string(),
            set_fields: D::set_fields().iter().map(|f| f.to_string()).collect(),
            subject: Some(subject_of::<D> as SubjectFn),
        }
    }

    /// Untyped mapping restored from the store; carries no subject extractor.
    pub fn from_stored(stored: TypeMapping) -> Self {
        Self {
            doc_type: stored.doc_type,
            set_fields: stored.set_fields,
            subject: None,
        }
    }

    pub fn to_stored(&self) -> TypeMapping {
        TypeMapping {
            doc_type: self.doc_type.clone(),
            set_fields: self.set_fields.clone(),
        }
    }

    /// Whether the mapping was built from a [`Document`] type.
    pub fn is_typed(&self) -> bool {
        self.subject.is_some()
    }

    pub fn with_set_field(mut self, field: impl Into<String>) -> Self {
        self.set_fields.insert(field.into());
        self
    }

    pub fn doc_type(&self) -> &str {
        &self.doc_type
    }

    pub fn set_fields(&self) -> &BTreeSet<String> {
        &self.set_fields
    }

    pub fn is_set_field(&self, field: &str) -> bool {
        self.set_fields.contains(field)
    }

    pub fn subject(&self, source: &Map<String, Value>) -> Option<String> {
        self.subject.and_then(|extract| extract(source))
    }
}

/// A document on its way into a commit, independent of its Rust type.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedObject {
    pub key: ObjectKey,
    pub container_id: Option<String>,
    pub subject: Option<String>,
    pub source: Map<String, Value>,
}

impl StagedObject {
    pub fn from_document<D: Document>(doc: &D) -> Result<Self> {
        let Value::Object(source) = serde_json::to_value(doc)? else {
            return Err(RevisionError::illegal_argument(format!(
                "Document '{}' of type '{}' must serialize to an object",
                doc.id(),
                D::TYPE
            )));
        };
        Ok(Self {
            key: ObjectKey::new(D::TYPE, doc.id()),
            container_id: doc.container_id().map(str::to_string),
            subject: doc.commit_subject(),
            source,
        })
    }

    pub fn from_revision(revision: &Revision, mapping: &DocumentMapping) -> Self {
        Self {
            key: revision.key(),
            container_id: revision.container_id.clone(),
            subject: mapping.subject(&revision.source),
            source: revision.source.clone(),
        }
    }

    /// Same key and container, new properties.
    pub fn with_source(&self, source: Map<String, Value>, mapping: &DocumentMapping) -> Self {
        Self {
            key: self.key.clone(),
            container_id: self.container_id.clone(),
            subject: mapping.subject(&source).or_else(|| self.subject.clone()),
            source,
        }
    }

    pub fn id(&self) -> &str {
        &self.key.id
    }

    pub fn doc_type(&self) -> &str {
        &self.key.doc_type
    }

    pub fn is<D: Document>(&self) -> bool {
        self.key.doc_type == D::TYPE
    }

    pub fn to_document<D: Document>(&self) -> Result<D> {
        Ok(serde_json::from_value(Value::Object(self.source.clone()))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Description {
        id: String,
        concept_id: String,
        term: String,
        tags: Vec<String>,
    }

    impl Document for Description {
        const TYPE: &'static str = "description";

        fn id(&self) -> &str {
            &self.id
        }

        fn container_id(&self) -> Option<&str> {
            Some(&self.concept_id)
        }

        fn commit_subject(&self) -> Option<String> {
            Some(self.concept_id.clone())
        }

        fn set_fields() -> &'static [&'static str] {
            &["tags"]
        }
    }

    #[test]
    fn test_staged_object_captures_capabilities() {
        let doc = Description {
            id: "d1".into(),
            concept_id: "c1".into(),
            term: "Heart".into(),
            tags: vec![],
        };
        let staged = StagedObject::from_document(&doc).unwrap();
        assert_eq!(staged.key, ObjectKey::new("description", "d1"));
        assert_eq!(staged.container_id.as_deref(), Some("c1"));
        assert_eq!(staged.subject.as_deref(), Some("c1"));
        assert!(staged.is::<Description>());
        assert_eq!(staged.to_document::<Description>().unwrap(), doc);
    }

    #[test]
    fn test_mapping_from_document_type() {
        let mapping = DocumentMapping::of::<Description>();
        assert_eq!(mapping.doc_type(), "description");
        assert!(mapping.is_set_field("tags"));
        assert!(!mapping.is_set_field("term"));
        let source = serde_json::to_value(Description {
            id: "d1".into(),
            concept_id: "c9".into(),
            term: "x".into(),
            tags: vec![],
        })
        .unwrap();
        assert_eq!(
            mapping.subject(source.as_object().unwrap()).as_deref(),
            Some("c9")
        );
        assert_eq!(DocumentMapping::new("other").subject(source.as_object().unwrap()), None);
    }

    #[test]
    fn test_stored_mapping_keeps_set_fields() {
        let stored = DocumentMapping::of::<Description>().to_stored();
        assert_eq!(stored.set_fields, BTreeSet::from(["tags".to_string()]));
        let restored = DocumentMapping::from_stored(stored);
        assert!(restored.is_set_field("tags"));
        assert!(!restored.is_typed());
        assert!(DocumentMapping::of::<Description>().is_typed());
    }
}

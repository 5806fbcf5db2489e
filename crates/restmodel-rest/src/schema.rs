//! The consumed slice of JSON-schema-style payload descriptions.
//!
//! Only the markers the bridge acts on are modeled: property type tags,
//! `$ref` pointers into `definitions`, array item schemas, string patterns,
//! and the required list. Everything else in a schema document is ignored
//! on deserialization.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{META_FIELD, RestError};

const DEFINITIONS_PREFIX: &str = "#/definitions/";

/// Description of one property.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldSchema {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
    #[serde(rename = "$ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<FieldSchema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl FieldSchema {
    #[must_use]
    pub fn typed(field_type: impl Into<String>) -> Self {
        Self {
            field_type: Some(field_type.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn reference(name: impl Into<String>) -> Self {
        Self {
            reference: Some(format!("{DEFINITIONS_PREFIX}{}", name.into())),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn array_of(items: FieldSchema) -> Self {
        Self {
            field_type: Some("array".into()),
            items: Some(Box::new(items)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    #[must_use]
    pub fn is_array(&self) -> bool {
        self.field_type.as_deref() == Some("array")
    }

    /// Definition name behind a `$ref`, when it points into `definitions`.
    #[must_use]
    pub fn ref_name(&self) -> Option<&str> {
        self.reference
            .as_deref()
            .and_then(|r| r.strip_prefix(DEFINITIONS_PREFIX))
    }

    /// Definition name behind an array's item `$ref`.
    #[must_use]
    pub fn items_ref_name(&self) -> Option<&str> {
        self.items.as_deref().and_then(FieldSchema::ref_name)
    }
}

/// A payload description: properties, requirements, and definitions for
/// nested references.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, FieldSchema>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub definitions: BTreeMap<String, Schema>,
}

impl Schema {
    /// Parse a schema document, ignoring unmodeled keys.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, RestError> {
        serde_json::from_value(value.clone())
            .map_err(|err| RestError::field(META_FIELD, format!("Invalid schema: {err}")))
    }

    #[must_use]
    pub fn property(mut self, name: impl Into<String>, field: FieldSchema) -> Self {
        self.properties.insert(name.into(), field);
        self
    }

    #[must_use]
    pub fn require(mut self, name: impl Into<String>) -> Self {
        self.required.push(name.into());
        self
    }

    #[must_use]
    pub fn definition(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.definitions.insert(name.into(), schema);
        self
    }

    #[must_use]
    pub fn is_required(&self, field: &str) -> bool {
        self.required.iter().any(|f| f == field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_consumed_markers_and_ignores_the_rest() {
        let doc = serde_json::json!({
            "title": "Article",
            "description": "ignored",
            "properties": {
                "title": {"type": "string", "pattern": "^.{1,80}$", "maxLength": 80},
                "author": {"$ref": "#/definitions/Author"},
                "tags": {"type": "array", "items": {"$ref": "#/definitions/Tag"}},
            },
            "required": ["title"],
            "definitions": {
                "Author": {"properties": {"name": {"type": "string"}}},
                "Tag": {"properties": {"label": {"type": "string"}}},
            }
        });
        let schema = Schema::from_json(&doc).expect("parse");
        assert!(schema.is_required("title"));
        assert_eq!(schema.properties["author"].ref_name(), Some("Author"));
        assert_eq!(schema.properties["tags"].items_ref_name(), Some("Tag"));
        assert!(schema.properties["tags"].is_array());
        assert_eq!(
            schema.properties["title"].pattern.as_deref(),
            Some("^.{1,80}$")
        );
        assert!(schema.definitions.contains_key("Tag"));
    }

    #[test]
    fn builder_matches_the_parsed_form() {
        let built = Schema::default()
            .property("name", FieldSchema::typed("string"))
            .property("friends", FieldSchema::array_of(FieldSchema::reference("Friend")))
            .require("name");
        assert!(built.is_required("name"));
        assert_eq!(built.properties["friends"].items_ref_name(), Some("Friend"));
    }
}

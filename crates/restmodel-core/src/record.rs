//! Dynamic records: an entity's metadata plus a field/value map.

use std::collections::HashMap;
use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::meta::EntityMeta;
use crate::value::Value;

/// One row of an entity, addressed by field name.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    meta: Arc<EntityMeta>,
    values: HashMap<String, Value>,
}

impl Record {
    /// A fresh record with declared defaults applied and no primary key.
    #[must_use]
    pub fn new(meta: Arc<EntityMeta>) -> Self {
        let mut values = HashMap::new();
        for field in &meta.fields {
            if let Some(default) = &field.default {
                values.insert(field.name.clone(), default.clone());
            }
        }
        Self { meta, values }
    }

    /// A record populated from `(field, value)` pairs.
    #[must_use]
    pub fn with_values(
        meta: Arc<EntityMeta>,
        pairs: impl IntoIterator<Item = (String, Value)>,
    ) -> Self {
        let mut record = Self::new(meta);
        for (field, value) in pairs {
            record.values.insert(field, value);
        }
        record
    }

    #[must_use]
    pub fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    #[must_use]
    pub fn meta_arc(&self) -> Arc<EntityMeta> {
        Arc::clone(&self.meta)
    }

    #[must_use]
    pub fn entity_name(&self) -> &str {
        &self.meta.name
    }

    /// Borrow a field value; `pk` resolves to the key field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(self.meta.resolve_key(field))
    }

    /// Owned field value; absent fields read as null.
    #[must_use]
    pub fn value(&self, field: &str) -> Value {
        self.get(field).cloned().unwrap_or(Value::Null)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        let field = field.into();
        let field = self.meta.resolve_key(&field).to_string();
        self.values.insert(field, value.into());
    }

    /// The primary key value, null when unsaved.
    #[must_use]
    pub fn pk(&self) -> Value {
        self.value(self.meta.pk_name())
    }

    pub fn set_pk(&mut self, value: impl Into<Value>) {
        let pk = self.meta.pk_name().to_string();
        self.values.insert(pk, value.into());
    }

    /// True once the record carries a non-null primary key.
    #[must_use]
    pub fn has_pk(&self) -> bool {
        !self.pk().is_null()
    }

    /// `(field, value)` pairs for every declared scalar field, in
    /// declaration order, reading absent fields as null.
    #[must_use]
    pub fn field_values(&self) -> Vec<(String, Value)> {
        self.meta
            .fields
            .iter()
            .map(|f| (f.name.clone(), self.value(&f.name)))
            .collect()
    }

    /// JSON object rendering of the declared fields.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for field in &self.meta.fields {
            map.insert(field.name.clone(), self.value(&field.name).to_json());
        }
        serde_json::Value::Object(map)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.meta.fields.len()))?;
        for field in &self.meta.fields {
            map.serialize_entry(&field.name, &self.value(&field.name))?;
        }
        map.end()
    }
}

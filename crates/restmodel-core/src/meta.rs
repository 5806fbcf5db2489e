//! Entity metadata: named fields plus relations, built with a fluent chain.

use crate::field::FieldDef;
use crate::relation::RelationDef;

/// Description of one entity kind known to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityMeta {
    pub name: String,
    pub fields: Vec<FieldDef>,
    pub relations: Vec<RelationDef>,
    /// Infrastructure entities (link tables and the like) are exempt from
    /// lifecycle notifications.
    pub infrastructure: bool,
}

impl EntityMeta {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            relations: Vec::new(),
            infrastructure: false,
        }
    }

    #[must_use]
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn relation(mut self, relation: RelationDef) -> Self {
        self.relations.push(relation);
        self
    }

    #[must_use]
    pub fn infrastructure(mut self) -> Self {
        self.infrastructure = true;
        self
    }

    /// The primary key field, if one was declared.
    #[must_use]
    pub fn pk_field(&self) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.primary_key)
    }

    /// Name of the primary key field. Entities without a declared pk fall
    /// back to the conventional `id`.
    #[must_use]
    pub fn pk_name(&self) -> &str {
        self.pk_field().map_or("id", |f| f.name.as_str())
    }

    /// Resolve the `pk` alias to the concrete key field name.
    #[must_use]
    pub fn resolve_key<'a>(&'a self, key: &'a str) -> &'a str {
        if key == "pk" { self.pk_name() } else { key }
    }

    #[must_use]
    pub fn field_def(&self, name: &str) -> Option<&FieldDef> {
        let name = self.resolve_key(name);
        self.fields.iter().find(|f| f.name == name)
    }

    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.field_def(name).is_some()
    }

    #[must_use]
    pub fn relation_def(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Relations resolving to collections, in declaration order.
    pub fn to_many_relations(&self) -> impl Iterator<Item = &RelationDef> {
        self.relations.iter().filter(|r| r.kind.is_to_many())
    }
}

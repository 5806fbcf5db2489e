//! Relation metadata: to-one foreign keys and link-table many-to-many.

/// Shape of a relation between two entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    OneToOne,
    ManyToOne,
    OneToMany,
    ManyToMany,
}

impl RelationKind {
    /// True for relations that resolve to a collection of records.
    #[must_use]
    pub const fn is_to_many(self) -> bool {
        matches!(self, Self::OneToMany | Self::ManyToMany)
    }

    /// True for relations that resolve to at most one record.
    #[must_use]
    pub const fn is_to_one(self) -> bool {
        !self.is_to_many()
    }
}

/// The link table joining two entities in a many-to-many relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkDef {
    /// Name of the link table in the engine.
    pub table: String,
    /// Column holding the owning side's primary key.
    pub source_column: String,
    /// Column holding the target side's primary key.
    pub target_column: String,
}

impl LinkDef {
    #[must_use]
    pub fn new(
        table: impl Into<String>,
        source_column: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            source_column: source_column.into(),
            target_column: target_column.into(),
        }
    }
}

/// Definition of one relation field on an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationDef {
    pub name: String,
    /// Target entity name.
    pub target: String,
    pub kind: RelationKind,
    /// Local fk column for to-one relations; defaults to `<name>_id`.
    pub column: Option<String>,
    /// Fk column on the target entity for reverse one-to-many relations.
    pub remote_column: Option<String>,
    /// Link table for many-to-many relations.
    pub link: Option<LinkDef>,
}

impl RelationDef {
    #[must_use]
    pub fn many_to_one(
        name: impl Into<String>,
        target: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            kind: RelationKind::ManyToOne,
            column: Some(column.into()),
            remote_column: None,
            link: None,
        }
    }

    #[must_use]
    pub fn one_to_one(
        name: impl Into<String>,
        target: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        Self {
            kind: RelationKind::OneToOne,
            ..Self::many_to_one(name, target, column)
        }
    }

    #[must_use]
    pub fn one_to_many(
        name: impl Into<String>,
        target: impl Into<String>,
        remote_column: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            kind: RelationKind::OneToMany,
            column: None,
            remote_column: Some(remote_column.into()),
            link: None,
        }
    }

    #[must_use]
    pub fn many_to_many(
        name: impl Into<String>,
        target: impl Into<String>,
        link: LinkDef,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            kind: RelationKind::ManyToMany,
            column: None,
            remote_column: None,
            link: Some(link),
        }
    }

    /// Local fk column name for to-one relations.
    #[must_use]
    pub fn fk_column(&self) -> String {
        self.column
            .clone()
            .unwrap_or_else(|| format!("{}_id", self.name))
    }
}

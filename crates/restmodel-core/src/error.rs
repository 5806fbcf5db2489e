//! Error type shared by the store, query, and entity layers.

use std::error::Error as StdError;
use std::fmt;

/// Convenience alias used across the workspace.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures raised by record operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A single-record terminal matched no row.
    NotFound { entity: String },
    /// A single-record terminal matched more than one row.
    MultipleObjects { entity: String, count: usize },
    /// The entity name is not registered with the engine.
    UnknownEntity { entity: String },
    /// The field name does not exist on the entity.
    UnknownField { entity: String, field: String },
    /// The named field is not a relation of the required shape.
    InvalidRelation { entity: String, field: String },
    /// A filter used a malformed lookup argument.
    InvalidLookup(String),
    /// An operation needed a primary key the record does not carry.
    MissingPrimaryKey { entity: String },
    /// A write violated an engine constraint.
    Integrity(String),
    /// The engine itself failed.
    Backend(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { entity } => {
                write!(f, "{entity} matching query does not exist")
            }
            Self::MultipleObjects { entity, count } => {
                write!(f, "get on {entity} returned {count} records, expected one")
            }
            Self::UnknownEntity { entity } => write!(f, "unknown entity {entity}"),
            Self::UnknownField { entity, field } => {
                write!(f, "entity {entity} has no field {field}")
            }
            Self::InvalidRelation { entity, field } => {
                write!(f, "field {field} on {entity} is not a usable relation")
            }
            Self::InvalidLookup(msg) => write!(f, "invalid lookup: {msg}"),
            Self::MissingPrimaryKey { entity } => {
                write!(f, "{entity} record has no primary key value")
            }
            Self::Integrity(msg) => write!(f, "integrity error: {msg}"),
            Self::Backend(msg) => write!(f, "backend error: {msg}"),
        }
    }
}

impl StdError for Error {}

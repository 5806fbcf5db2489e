//! Core types for the RestModel workspace.
//!
//! This crate defines the shared vocabulary of the async adaptation layer:
//! dynamic [`Value`]s and [`Record`]s, entity metadata, parsed query plans,
//! the blocking [`SyncStore`] engine trait, and the [`Error`] type every
//! layer speaks. It has no opinion about execution; the offload, query, and
//! entity crates build on top of it.

pub mod error;
pub mod field;
pub mod meta;
pub mod outcome;
pub mod pattern;
pub mod plan;
pub mod record;
pub mod relation;
pub mod store;
pub mod value;

pub use error::{Error, Result};
pub use field::{FieldDef, FieldType};
pub use meta::EntityMeta;
pub use outcome::outcome_from;
pub use pattern::{compile_pattern, matches_pattern};
pub use plan::{Cond, Lookup, OrderKey, PlanStep, SelectPlan};
pub use record::Record;
pub use relation::{LinkDef, RelationDef, RelationKind};
pub use store::SyncStore;
pub use value::Value;

// Re-exported so downstream crates agree on one outcome vocabulary.
pub use asupersync::Outcome;

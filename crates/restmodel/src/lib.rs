//! RestModel: async access to blocking record stores.
//!
//! The workspace adapts a synchronous record engine for async services in
//! four layers, re-exported here as one surface:
//!
//! - **offload**: a dedicated thread pool with chain affinity, so blocking
//!   engine calls never touch async workers and calls on one handle stay
//!   ordered ([`OffloadPool`], [`Affinity`]).
//! - **query**: deferred pipelines that queue builder operations and replay
//!   them on an offload worker when a terminal runs ([`AsyncQuerySet`]).
//! - **entity**: a record facade with save/delete lifecycle signals and
//!   relation managers ([`AsyncStore`], [`Entity`], [`SignalHub`]).
//! - **rest**: schema validation, hook-driven enrichment, relation-resolving
//!   serialization, and transport-neutral endpoints (the [`rest`] module).
//!
//! [`MemoryStore`] is a complete in-process engine, used throughout the
//! test suites and suitable for prototyping.
//!
//! # Example
//!
//! ```ignore
//! use restmodel::prelude::*;
//!
//! let engine = MemoryStore::new();
//! engine.register(EntityMeta::new("article").field(FieldDef::new("title", FieldType::Text)));
//! let store = AsyncStore::with_default_pool(std::sync::Arc::new(engine))?;
//!
//! let record = store
//!     .objects("article")?
//!     .create(assigns!(title = "intro"))
//!     .await;
//! ```

pub use asupersync::{Outcome, runtime};
pub use restmodel_core::{
    Cond, EntityMeta, Error, FieldDef, FieldType, LinkDef, Lookup, OrderKey, PlanStep, Record,
    RelationDef, RelationKind, Result, SelectPlan, SyncStore, Value, compile_pattern,
    matches_pattern, outcome_from, try_outcome,
};
pub use restmodel_entity::{AsyncStore, Entity, RelatedManager};
pub use restmodel_memory::MemoryStore;
pub use restmodel_offload::{Affinity, ChainId, OffloadHandle, OffloadPool};
pub use restmodel_query::{AsyncQuerySet, DbHandle, Page, PendingOp, Scope, assigns, compose, filters};
pub use restmodel_rest as rest;
pub use restmodel_rest::{
    ApiRequest, ApiResponse, Endpoint, RestError, RestErrorKind, Schema, Validator,
};
pub use restmodel_signals::{
    ListenerFuture, ReceiverHandle, RelationAction, Signal, SignalEvent, SignalHub,
};

/// The names most call sites want in scope.
pub mod prelude {
    pub use crate::{
        Affinity, AsyncQuerySet, AsyncStore, Cond, Entity, EntityMeta, Error, FieldDef, FieldType,
        LinkDef, MemoryStore, OffloadPool, Outcome, Record, RelationAction, RelationDef, Result,
        SignalEvent, Value, assigns, filters, try_outcome,
    };
}

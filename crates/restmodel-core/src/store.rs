//! The blocking engine interface.
//!
//! Everything above this trait is async; everything behind it is allowed to
//! block the calling thread. The offload pool is the only place these
//! methods should be invoked from at runtime.

use std::sync::Arc;

use crate::error::Result;
use crate::meta::EntityMeta;
use crate::plan::SelectPlan;
use crate::record::Record;
use crate::relation::LinkDef;
use crate::value::Value;

/// A synchronous record engine.
///
/// Implementations may block; callers are expected to run them on offload
/// worker threads. Metadata lookups (`entity`) are in-memory and safe to
/// call from any thread.
pub trait SyncStore: Send + Sync + 'static {
    /// Metadata for a registered entity.
    fn entity(&self, name: &str) -> Result<Arc<EntityMeta>>;

    /// Rows matching a plan, after ordering, dedup, and windowing.
    fn select(&self, entity: &str, plan: &SelectPlan) -> Result<Vec<Record>>;

    /// Number of rows matching a plan's steps (the window is ignored).
    fn count(&self, entity: &str, plan: &SelectPlan) -> Result<usize>;

    /// Assign fields on every matching row; returns the affected count.
    fn update_where(
        &self,
        entity: &str,
        plan: &SelectPlan,
        assignments: &[(String, Value)],
    ) -> Result<usize>;

    /// Delete every matching row; returns the affected count.
    fn delete_where(&self, entity: &str, plan: &SelectPlan) -> Result<usize>;

    /// Insert one row and return it as stored, key assigned.
    fn insert(&self, entity: &str, values: &[(String, Value)]) -> Result<Record>;

    /// Assign fields on the row with the given key; 0 when absent.
    fn update_by_pk(
        &self,
        entity: &str,
        pk: &Value,
        assignments: &[(String, Value)],
    ) -> Result<usize>;

    /// Reload one row by key.
    fn reload(&self, entity: &str, pk: &Value) -> Result<Option<Record>>;

    /// Delete the row with the given key; returns the affected count.
    fn delete_by_pk(&self, entity: &str, pk: &Value) -> Result<usize>;

    /// Target keys linked to `owner` through a link table, insertion order.
    fn linked_ids(&self, link: &LinkDef, owner: &Value) -> Result<Vec<Value>>;

    /// Add link rows for each target not already linked.
    fn link(&self, link: &LinkDef, owner: &Value, targets: &[Value]) -> Result<()>;

    /// Remove link rows for the given targets.
    fn unlink(&self, link: &LinkDef, owner: &Value, targets: &[Value]) -> Result<()>;

    /// Remove every link row owned by `owner`.
    fn unlink_all(&self, link: &LinkDef, owner: &Value) -> Result<()>;
}

//! Deferred query pipelines over a blocking record engine.
//!
//! An [`AsyncQuerySet`] queues builder operations and replays them against
//! the engine only when a terminal runs; every terminal hops through the
//! offload pool on the handle's chain, so engine calls stay off the async
//! workers and execute in submission order.

#[macro_use]
mod macros;

pub mod ops;
pub mod page;
pub mod queryset;

pub use ops::{PendingOp, compose};
pub use page::Page;
pub use queryset::{AsyncQuerySet, DbHandle, Scope};

// Re-exported for the `filters!` / `assigns!` macro expansions.
pub use restmodel_core::{Cond, Value};

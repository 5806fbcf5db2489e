//! Entities and relation managers over the deferred query pipeline.
//!
//! [`AsyncStore`] binds a blocking engine, an offload chain, and a signal
//! hub into one handle. [`Entity`] is the per-record facade with signalled
//! saves and deletes; [`RelatedManager`] covers to-many relation fields.

pub mod entity;
pub mod related;
pub mod store;

pub use entity::Entity;
pub use related::RelatedManager;
pub use store::AsyncStore;

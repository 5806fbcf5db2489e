//! The async store: one engine, one offload chain, one signal hub.

use std::sync::Arc;

use restmodel_core::{Error, Record, Result, SyncStore};
use restmodel_offload::OffloadPool;
use restmodel_query::{AsyncQuerySet, DbHandle};
use restmodel_signals::SignalHub;

use crate::entity::Entity;

/// Handle to a record store usable from async tasks.
///
/// Cloning is cheap and clones share the engine, the offload chain, and the
/// signal hub, so lifecycle listeners registered through any clone observe
/// saves made through every other.
#[derive(Clone)]
pub struct AsyncStore {
    db: DbHandle,
    hub: Arc<SignalHub>,
}

impl AsyncStore {
    #[must_use]
    pub fn new(engine: Arc<dyn SyncStore>, pool: Arc<OffloadPool>) -> Self {
        Self {
            db: DbHandle::new(engine, pool),
            hub: Arc::new(SignalHub::new()),
        }
    }

    /// Like [`Self::new`] with a pool sized to the machine.
    pub fn with_default_pool(engine: Arc<dyn SyncStore>) -> Result<Self> {
        let pool = OffloadPool::with_default_size()
            .map_err(|err| Error::Backend(format!("offload pool: {err}")))?;
        Ok(Self::new(engine, Arc::new(pool)))
    }

    #[must_use]
    pub fn db(&self) -> &DbHandle {
        &self.db
    }

    #[must_use]
    pub fn hub(&self) -> &SignalHub {
        &self.hub
    }

    /// A fresh pipeline over the named entity.
    pub fn objects(&self, entity: &str) -> Result<AsyncQuerySet> {
        let meta = self.db.engine().entity(entity)?;
        Ok(AsyncQuerySet::new(self.db.clone(), meta))
    }

    /// An unsaved entity instance with defaults applied.
    pub fn new_entity(&self, entity: &str) -> Result<Entity> {
        let meta = self.db.engine().entity(entity)?;
        Ok(Entity::new(self.clone(), Record::new(meta)))
    }

    /// Wrap a record fetched through a pipeline into an entity facade.
    #[must_use]
    pub fn wrap(&self, record: Record) -> Entity {
        Entity::new(self.clone(), record)
    }
}

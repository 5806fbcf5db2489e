//! The entity facade: one record plus the async lifecycle around it.

use asupersync::Outcome;
use restmodel_core::{
    Error, Record, Result, SyncStore, Value, outcome_from, try_outcome,
};
use restmodel_signals::SignalEvent;

use crate::related::RelatedManager;
use crate::store::AsyncStore;

/// One record bound to its store.
///
/// Saves, deletes, and refreshes hop through the store's offload chain and
/// bracket the matching lifecycle signals. Relation access is explicit:
/// [`Entity::fetch_related`] resolves to-one fields, [`Entity::related`]
/// hands out a manager for to-many fields.
#[derive(Clone)]
pub struct Entity {
    store: AsyncStore,
    record: Record,
}

fn write_record(
    engine: &dyn SyncStore,
    entity: &str,
    record: &Record,
    update_fields: Option<&[String]>,
    had_pk: bool,
) -> Result<(Record, bool)> {
    let pk_name = record.meta().pk_name().to_string();
    if had_pk {
        let pk = record.pk();
        let assignments: Vec<(String, Value)> = record
            .field_values()
            .into_iter()
            .filter(|(name, _)| {
                *name != pk_name
                    && update_fields.is_none_or(|fields| fields.iter().any(|f| f == name))
            })
            .collect();
        if engine.update_by_pk(entity, &pk, &assignments)? > 0 {
            let reloaded = engine.reload(entity, &pk)?.ok_or_else(|| Error::NotFound {
                entity: entity.to_string(),
            })?;
            return Ok((reloaded, false));
        }
        // Carried a key but no such row exists: the save inserts, keeping
        // the key.
        Ok((engine.insert(entity, &record.field_values())?, true))
    } else {
        let values: Vec<(String, Value)> = record
            .field_values()
            .into_iter()
            .filter(|(name, value)| !(*name == pk_name && value.is_null()))
            .collect();
        Ok((engine.insert(entity, &values)?, true))
    }
}

impl Entity {
    pub(crate) fn new(store: AsyncStore, record: Record) -> Self {
        Self { store, record }
    }

    #[must_use]
    pub fn record(&self) -> &Record {
        &self.record
    }

    #[must_use]
    pub fn entity_name(&self) -> &str {
        self.record.entity_name()
    }

    #[must_use]
    pub fn value(&self, field: &str) -> Value {
        self.record.value(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.record.set(field, value);
    }

    #[must_use]
    pub fn pk(&self) -> Value {
        self.record.pk()
    }

    #[must_use]
    pub fn store(&self) -> &AsyncStore {
        &self.store
    }

    /// Persist the record, inserting or updating by key presence.
    ///
    /// `update_fields` restricts the written columns on an update. Saves
    /// send `pre_save`/`post_save` unless the entity is marked
    /// infrastructure; `post_save` reports whether a row was inserted.
    #[tracing::instrument(level = "debug", skip(self, update_fields), fields(entity = %self.record.entity_name()))]
    pub async fn save(&mut self, update_fields: Option<Vec<String>>) -> Outcome<(), Error> {
        let meta = self.record.meta_arc();
        let announce = !meta.infrastructure;
        if announce {
            let event = SignalEvent::new(&meta.name, self.record.clone())
                .with_update_fields(update_fields.clone());
            try_outcome!(self.store.hub().pre_save.send(event).await);
        }

        let had_pk = self.record.has_pk();
        let entity = meta.name.clone();
        let snapshot = self.record.clone();
        let fields = update_fields.clone();
        let written = self
            .store
            .db()
            .run(move |engine| write_record(engine, &entity, &snapshot, fields.as_deref(), had_pk))
            .await;
        let (saved, created) = try_outcome!(outcome_from(written));
        self.record = saved;
        tracing::debug!(entity = %meta.name, created, "record saved");

        if announce {
            let event = SignalEvent::new(&meta.name, self.record.clone())
                .with_created(created)
                .with_update_fields(update_fields);
            try_outcome!(self.store.hub().post_save.send(event).await);
        }
        Outcome::Ok(())
    }

    /// Delete the row behind this record and null its key.
    ///
    /// Returns the number of rows removed. Brackets with
    /// `pre_delete`/`post_delete` unless the entity is infrastructure.
    #[tracing::instrument(level = "debug", skip(self), fields(entity = %self.record.entity_name()))]
    pub async fn delete(&mut self) -> Outcome<usize, Error> {
        let meta = self.record.meta_arc();
        let pk = self.record.pk();
        if pk.is_null() {
            return Outcome::Err(Error::MissingPrimaryKey {
                entity: meta.name.clone(),
            });
        }
        let announce = !meta.infrastructure;
        if announce {
            let event = SignalEvent::new(&meta.name, self.record.clone());
            try_outcome!(self.store.hub().pre_delete.send(event).await);
        }

        let entity = meta.name.clone();
        let removed = self
            .store
            .db()
            .run(move |engine| engine.delete_by_pk(&entity, &pk))
            .await;
        let removed = try_outcome!(outcome_from(removed));

        if announce {
            let event = SignalEvent::new(&meta.name, self.record.clone());
            try_outcome!(self.store.hub().post_delete.send(event).await);
        }
        self.record.set_pk(Value::Null);
        Outcome::Ok(removed)
    }

    /// Re-read every field from the store.
    pub async fn refresh_from_db(&mut self) -> Outcome<(), Error> {
        let meta = self.record.meta_arc();
        let pk = self.record.pk();
        if pk.is_null() {
            return Outcome::Err(Error::MissingPrimaryKey {
                entity: meta.name.clone(),
            });
        }
        let entity = meta.name.clone();
        let reloaded = self
            .store
            .db()
            .run(move |engine| {
                engine
                    .reload(&entity, &pk)?
                    .ok_or(Error::NotFound { entity })
            })
            .await;
        self.record = try_outcome!(outcome_from(reloaded));
        Outcome::Ok(())
    }

    /// Resolve a to-one relation to the related entity.
    ///
    /// Unknown fields, to-many fields, and null or dangling foreign keys
    /// all normalize to `None`.
    pub async fn fetch_related(&self, field: &str) -> Outcome<Option<Entity>, Error> {
        let meta = self.record.meta_arc();
        let Some(relation) = meta.relation_def(field) else {
            return Outcome::Ok(None);
        };
        if !relation.kind.is_to_one() {
            return Outcome::Ok(None);
        }
        let fk = self.record.value(&relation.fk_column());
        if fk.is_null() {
            return Outcome::Ok(None);
        }
        let target = relation.target.clone();
        let fetched = self
            .store
            .db()
            .run(move |engine| engine.reload(&target, &fk))
            .await;
        let fetched = try_outcome!(outcome_from(fetched));
        Outcome::Ok(fetched.map(|record| self.store.wrap(record)))
    }

    /// A manager over a to-many relation field.
    pub fn related(&self, field: &str) -> Result<RelatedManager> {
        let meta = self.record.meta_arc();
        let relation = meta
            .relation_def(field)
            .ok_or_else(|| Error::UnknownField {
                entity: meta.name.clone(),
                field: field.to_string(),
            })?;
        if !relation.kind.is_to_many() {
            return Err(Error::InvalidRelation {
                entity: meta.name.clone(),
                field: field.to_string(),
            });
        }
        if self.record.pk().is_null() {
            return Err(Error::MissingPrimaryKey {
                entity: meta.name.clone(),
            });
        }
        let target_meta = self.store.db().engine().entity(&relation.target)?;
        Ok(RelatedManager::new(
            self.store.clone(),
            self.record.clone(),
            relation.clone(),
            target_meta,
        ))
    }
}

//! The deferred pipeline and its offloaded terminals.

use std::collections::BTreeMap;
use std::sync::Arc;

use asupersync::Outcome;
use restmodel_core::{
    Cond, EntityMeta, Error, Lookup, OrderKey, PlanStep, Record, Result, SelectPlan, SyncStore,
    Value, outcome_from,
};
use restmodel_offload::{Affinity, ChainId, OffloadHandle, OffloadPool};

use crate::ops::{PendingOp, compose};
use crate::page::Page;

/// A store's engine plus the offload chain its blocking calls are pinned to.
#[derive(Clone)]
pub struct DbHandle {
    engine: Arc<dyn SyncStore>,
    pool: Arc<OffloadPool>,
    chain: ChainId,
}

impl DbHandle {
    /// Pair an engine with a pool on a fresh chain.
    #[must_use]
    pub fn new(engine: Arc<dyn SyncStore>, pool: Arc<OffloadPool>) -> Self {
        Self {
            engine,
            pool,
            chain: ChainId::next(),
        }
    }

    #[must_use]
    pub fn engine(&self) -> &Arc<dyn SyncStore> {
        &self.engine
    }

    /// Run a blocking engine closure on this handle's chain worker.
    pub fn run<T, F>(&self, job: F) -> OffloadHandle<Result<T>>
    where
        T: Send + 'static,
        F: FnOnce(&dyn SyncStore) -> Result<T> + Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        self.pool
            .spawn(Affinity::Chain(self.chain), move || job(engine.as_ref()))
    }
}

/// Base set a relation-scoped pipeline starts from.
#[derive(Debug, Clone)]
pub enum Scope {
    /// Rows whose key appears in a link table under `owner`.
    Linked {
        link: restmodel_core::LinkDef,
        owner: Value,
    },
    /// Rows whose fk column equals the owner's key.
    RemoteFk { column: String, owner: Value },
}

fn scoped_plan(
    engine: &dyn SyncStore,
    meta: &EntityMeta,
    scope: Option<Scope>,
    mut plan: SelectPlan,
) -> Result<SelectPlan> {
    let Some(scope) = scope else {
        return Ok(plan);
    };
    let cond = match scope {
        Scope::Linked { link, owner } => {
            let ids = engine.linked_ids(&link, &owner)?;
            Cond {
                field: meta.pk_name().to_string(),
                lookup: Lookup::In,
                value: Value::List(ids),
            }
        }
        Scope::RemoteFk { column, owner } => Cond::exact(column, owner),
    };
    plan.steps.insert(0, PlanStep::Filter(vec![cond]));
    Ok(plan)
}

fn merged_insert_values(
    lookups: &[(String, Value)],
    defaults: &[(String, Value)],
) -> Vec<(String, Value)> {
    let mut values: Vec<(String, Value)> = lookups
        .iter()
        .filter(|(key, _)| !key.contains("__"))
        .cloned()
        .collect();
    for (key, value) in defaults {
        if let Some(slot) = values.iter_mut().find(|(k, _)| k == key) {
            slot.1 = value.clone();
        } else {
            values.push((key.clone(), value.clone()));
        }
    }
    values
}

/// A deferred, chainable query over one entity.
///
/// Builders queue operations; nothing reaches the engine until a terminal
/// consumes the pipeline, composes the queue into a plan, and replays it on
/// an offload worker. Each instance owns its queue, so a terminal always
/// observes exactly the operations chained onto it.
///
/// # Example
///
/// ```ignore
/// let names = store
///     .objects("article")?
///     .filter(filters!(author_id = 7))
///     .exclude(filters!(title__startswith = "Draft"))
///     .order_by(["-id"])
///     .flat_values_list("title")
///     .await;
/// ```
pub struct AsyncQuerySet {
    db: DbHandle,
    meta: Arc<EntityMeta>,
    scope: Option<Scope>,
    ops: Vec<PendingOp>,
}

impl AsyncQuerySet {
    #[must_use]
    pub fn new(db: DbHandle, meta: Arc<EntityMeta>) -> Self {
        Self {
            db,
            meta,
            scope: None,
            ops: Vec::new(),
        }
    }

    /// A pipeline whose base set is bound to a relation owner.
    #[must_use]
    pub fn scoped(db: DbHandle, meta: Arc<EntityMeta>, scope: Scope) -> Self {
        Self {
            db,
            meta,
            scope: Some(scope),
            ops: Vec::new(),
        }
    }

    #[must_use]
    pub fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    /// Pending operations queued so far. Mostly useful in tests.
    #[must_use]
    pub fn pending(&self) -> &[PendingOp] {
        &self.ops
    }

    // ==== builders ====

    #[must_use]
    pub fn all(mut self) -> Self {
        self.ops.push(PendingOp::All);
        self
    }

    #[must_use]
    pub fn filter(mut self, conds: impl IntoIterator<Item = Cond>) -> Self {
        self.ops.push(PendingOp::Filter(conds.into_iter().collect()));
        self
    }

    #[must_use]
    pub fn exclude(mut self, conds: impl IntoIterator<Item = Cond>) -> Self {
        self.ops
            .push(PendingOp::Exclude(conds.into_iter().collect()));
        self
    }

    /// Replace the ordering with the given `-`-prefixed key names.
    #[must_use]
    pub fn order_by<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys = keys
            .into_iter()
            .map(|k| OrderKey::parse(k.as_ref()))
            .collect();
        self.ops.push(PendingOp::OrderBy(keys));
        self
    }

    #[must_use]
    pub fn distinct(mut self) -> Self {
        self.ops.push(PendingOp::Distinct);
        self
    }

    /// Hint that the named to-one relations should be eager-loaded.
    #[must_use]
    pub fn select_related<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ops.push(PendingOp::SelectRelated(
            fields.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// Hint that the named to-many relations should be batch-loaded.
    #[must_use]
    pub fn prefetch_related<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ops.push(PendingOp::PrefetchRelated(
            fields.into_iter().map(Into::into).collect(),
        ));
        self
    }

    // ==== single-record terminals ====

    /// Exactly one matching record.
    #[tracing::instrument(level = "debug", skip(self), fields(entity = %self.meta.name))]
    pub async fn get(self) -> Outcome<Record, Error> {
        let Self {
            db,
            meta,
            scope,
            ops,
        } = self;
        let entity = meta.name.clone();
        let plan = compose(ops);
        outcome_from(
            db.run(move |engine| {
                let plan = scoped_plan(engine, &meta, scope, plan)?;
                let mut rows = engine.select(&entity, &plan)?;
                match rows.len() {
                    0 => Err(Error::NotFound { entity }),
                    1 => Ok(rows.remove(0)),
                    count => Err(Error::MultipleObjects { entity, count }),
                }
            })
            .await,
        )
    }

    /// First record under the effective ordering, or none.
    pub async fn first(self) -> Outcome<Option<Record>, Error> {
        self.edge(false).await
    }

    /// Last record under the effective ordering, or none.
    pub async fn last(self) -> Outcome<Option<Record>, Error> {
        self.edge(true).await
    }

    async fn edge(self, reverse: bool) -> Outcome<Option<Record>, Error> {
        let Self {
            db,
            meta,
            scope,
            ops,
        } = self;
        let entity = meta.name.clone();
        let plan = compose(ops);
        outcome_from(
            db.run(move |engine| {
                let mut plan = scoped_plan(engine, &meta, scope, plan)?;
                if plan.order_by.is_empty() {
                    plan.order_by = vec![OrderKey {
                        field: meta.pk_name().to_string(),
                        descending: false,
                    }];
                }
                if reverse {
                    for key in &mut plan.order_by {
                        key.descending = !key.descending;
                    }
                }
                plan.limit = Some(1);
                plan.offset = 0;
                let mut rows = engine.select(&entity, &plan)?;
                Ok(if rows.is_empty() {
                    None
                } else {
                    Some(rows.remove(0))
                })
            })
            .await,
        )
    }

    // ==== aggregate terminals ====

    pub async fn count(self) -> Outcome<usize, Error> {
        let Self {
            db,
            meta,
            scope,
            ops,
        } = self;
        let entity = meta.name.clone();
        let plan = compose(ops);
        outcome_from(
            db.run(move |engine| {
                let plan = scoped_plan(engine, &meta, scope, plan)?;
                engine.count(&entity, &plan)
            })
            .await,
        )
    }

    pub async fn exists(self) -> Outcome<bool, Error> {
        match self.count().await {
            Outcome::Ok(count) => Outcome::Ok(count > 0),
            Outcome::Err(err) => Outcome::Err(err),
            Outcome::Cancelled(reason) => Outcome::Cancelled(reason),
            Outcome::Panicked(payload) => Outcome::Panicked(payload),
        }
    }

    // ==== bulk write terminals ====

    /// Assign fields on every matching row.
    #[tracing::instrument(level = "debug", skip(self, assignments), fields(entity = %self.meta.name))]
    pub async fn update(self, assignments: Vec<(String, Value)>) -> Outcome<usize, Error> {
        let Self {
            db,
            meta,
            scope,
            ops,
        } = self;
        let entity = meta.name.clone();
        let plan = compose(ops);
        outcome_from(
            db.run(move |engine| {
                let plan = scoped_plan(engine, &meta, scope, plan)?;
                engine.update_where(&entity, &plan, &assignments)
            })
            .await,
        )
    }

    /// Delete every matching row.
    #[tracing::instrument(level = "debug", skip(self), fields(entity = %self.meta.name))]
    pub async fn delete(self) -> Outcome<usize, Error> {
        let Self {
            db,
            meta,
            scope,
            ops,
        } = self;
        let entity = meta.name.clone();
        let plan = compose(ops);
        outcome_from(
            db.run(move |engine| {
                let plan = scoped_plan(engine, &meta, scope, plan)?;
                engine.delete_where(&entity, &plan)
            })
            .await,
        )
    }

    // ==== projection terminals ====

    /// All matching records.
    pub async fn query(self) -> Outcome<Vec<Record>, Error> {
        let Self {
            db,
            meta,
            scope,
            ops,
        } = self;
        let entity = meta.name.clone();
        let plan = compose(ops);
        outcome_from(
            db.run(move |engine| {
                let plan = scoped_plan(engine, &meta, scope, plan)?;
                engine.select(&entity, &plan)
            })
            .await,
        )
    }

    /// Field/value maps for the requested fields; all fields when empty.
    pub async fn values(
        self,
        fields: Vec<String>,
    ) -> Outcome<Vec<BTreeMap<String, Value>>, Error> {
        let Self {
            db,
            meta,
            scope,
            ops,
        } = self;
        let entity = meta.name.clone();
        let plan = compose(ops);
        outcome_from(
            db.run(move |engine| {
                let plan = scoped_plan(engine, &meta, scope, plan)?;
                let names: Vec<String> = if fields.is_empty() {
                    meta.fields.iter().map(|f| f.name.clone()).collect()
                } else {
                    fields
                        .iter()
                        .map(|f| meta.resolve_key(f).to_string())
                        .collect()
                };
                let rows = engine.select(&entity, &plan)?;
                Ok(rows
                    .iter()
                    .map(|row| {
                        names
                            .iter()
                            .map(|name| (name.clone(), row.value(name)))
                            .collect()
                    })
                    .collect())
            })
            .await,
        )
    }

    /// Value tuples for the requested fields, in request order.
    pub async fn values_list(self, fields: Vec<String>) -> Outcome<Vec<Vec<Value>>, Error> {
        let Self {
            db,
            meta,
            scope,
            ops,
        } = self;
        let entity = meta.name.clone();
        let plan = compose(ops);
        outcome_from(
            db.run(move |engine| {
                let plan = scoped_plan(engine, &meta, scope, plan)?;
                let rows = engine.select(&entity, &plan)?;
                Ok(rows
                    .iter()
                    .map(|row| fields.iter().map(|f| row.value(f)).collect())
                    .collect())
            })
            .await,
        )
    }

    /// A single field's values, flattened.
    pub async fn flat_values_list(self, field: impl Into<String>) -> Outcome<Vec<Value>, Error> {
        let field = field.into();
        match self.values_list(vec![field]).await {
            Outcome::Ok(rows) => Outcome::Ok(
                rows.into_iter()
                    .map(|mut tuple| tuple.pop().unwrap_or(Value::Null))
                    .collect(),
            ),
            Outcome::Err(err) => Outcome::Err(err),
            Outcome::Cancelled(reason) => Outcome::Cancelled(reason),
            Outcome::Panicked(payload) => Outcome::Panicked(payload),
        }
    }

    /// One page plus the pre-window total, as an envelope.
    #[tracing::instrument(level = "debug", skip(self), fields(entity = %self.meta.name))]
    pub async fn paginated(
        self,
        order_by: Option<Vec<String>>,
        limit: Option<usize>,
        offset: usize,
    ) -> Outcome<Page, Error> {
        let Self {
            db,
            meta,
            scope,
            ops,
        } = self;
        let entity = meta.name.clone();
        let plan = compose(ops);
        outcome_from(
            db.run(move |engine| {
                let mut plan = scoped_plan(engine, &meta, scope, plan)?;
                let total = engine.count(&entity, &plan)?;
                if let Some(keys) = &order_by {
                    plan.order_by = keys.iter().map(|k| OrderKey::parse(k)).collect();
                }
                plan.limit = limit;
                plan.offset = offset;
                let results = engine.select(&entity, &plan)?;
                Ok(Page {
                    results,
                    total,
                    order_by,
                    limit,
                    offset,
                })
            })
            .await,
        )
    }

    // ==== creation terminals ====
    //
    // These discard any queued filtering: they act on the base set, never
    // on the composed selection. They are not available on relation-scoped
    // pipelines.

    fn creation_scope_check(&self) -> Result<()> {
        if self.scope.is_some() {
            return Err(Error::InvalidLookup(format!(
                "creation terminals are not available on a relation-scoped {} pipeline",
                self.meta.name
            )));
        }
        Ok(())
    }

    /// Insert one record.
    #[tracing::instrument(level = "debug", skip(self, values), fields(entity = %self.meta.name))]
    pub async fn create(self, values: Vec<(String, Value)>) -> Outcome<Record, Error> {
        if let Err(err) = self.creation_scope_check() {
            return Outcome::Err(err);
        }
        let Self { db, meta, .. } = self;
        let entity = meta.name.clone();
        outcome_from(db.run(move |engine| engine.insert(&entity, &values)).await)
    }

    /// Fetch the record matching `lookups`, inserting it from the merged
    /// lookups and defaults when absent. The flag reports an insert.
    pub async fn get_or_create(
        self,
        lookups: Vec<(String, Value)>,
        defaults: Vec<(String, Value)>,
    ) -> Outcome<(Record, bool), Error> {
        if let Err(err) = self.creation_scope_check() {
            return Outcome::Err(err);
        }
        let Self { db, meta, .. } = self;
        let entity = meta.name.clone();
        outcome_from(
            db.run(move |engine| {
                let conds = lookups
                    .iter()
                    .map(|(key, value)| Cond::parse(key, value.clone()))
                    .collect();
                let plan = SelectPlan::new().filter(conds);
                let mut rows = engine.select(&entity, &plan)?;
                match rows.len() {
                    0 => {
                        let values = merged_insert_values(&lookups, &defaults);
                        Ok((engine.insert(&entity, &values)?, true))
                    }
                    1 => Ok((rows.remove(0), false)),
                    count => Err(Error::MultipleObjects { entity, count }),
                }
            })
            .await,
        )
    }

    /// Like [`Self::get_or_create`], but an existing record is updated with
    /// the defaults.
    pub async fn update_or_create(
        self,
        lookups: Vec<(String, Value)>,
        defaults: Vec<(String, Value)>,
    ) -> Outcome<(Record, bool), Error> {
        if let Err(err) = self.creation_scope_check() {
            return Outcome::Err(err);
        }
        let Self { db, meta, .. } = self;
        let entity = meta.name.clone();
        outcome_from(
            db.run(move |engine| {
                let conds = lookups
                    .iter()
                    .map(|(key, value)| Cond::parse(key, value.clone()))
                    .collect();
                let plan = SelectPlan::new().filter(conds);
                let mut rows = engine.select(&entity, &plan)?;
                match rows.len() {
                    0 => {
                        let values = merged_insert_values(&lookups, &defaults);
                        Ok((engine.insert(&entity, &values)?, true))
                    }
                    1 => {
                        let row = rows.remove(0);
                        let pk = row.pk();
                        engine.update_by_pk(&entity, &pk, &defaults)?;
                        let reloaded = engine
                            .reload(&entity, &pk)?
                            .ok_or(Error::NotFound { entity })?;
                        Ok((reloaded, false))
                    }
                    count => Err(Error::MultipleObjects { entity, count }),
                }
            })
            .await,
        )
    }

    /// Insert many records; returns them as stored, in input order.
    pub async fn bulk_create(
        self,
        rows: Vec<Vec<(String, Value)>>,
    ) -> Outcome<Vec<Record>, Error> {
        if let Err(err) = self.creation_scope_check() {
            return Outcome::Err(err);
        }
        let Self { db, meta, .. } = self;
        let entity = meta.name.clone();
        outcome_from(
            db.run(move |engine| {
                rows.iter()
                    .map(|values| engine.insert(&entity, values))
                    .collect()
            })
            .await,
        )
    }

    /// Write the named fields of each record back by key; returns the
    /// number of rows touched.
    pub async fn bulk_update(
        self,
        records: Vec<Record>,
        fields: Vec<String>,
    ) -> Outcome<usize, Error> {
        if let Err(err) = self.creation_scope_check() {
            return Outcome::Err(err);
        }
        let Self { db, meta, .. } = self;
        let entity = meta.name.clone();
        outcome_from(
            db.run(move |engine| {
                let mut touched = 0;
                for record in &records {
                    let pk = record.pk();
                    if pk.is_null() {
                        return Err(Error::MissingPrimaryKey { entity });
                    }
                    let assignments: Vec<(String, Value)> = fields
                        .iter()
                        .map(|f| (f.clone(), record.value(f)))
                        .collect();
                    touched += engine.update_by_pk(&entity, &pk, &assignments)?;
                }
                Ok(touched)
            })
            .await,
        )
    }
}

//! Managers for to-many relation fields.

use std::sync::Arc;

use asupersync::Outcome;
use restmodel_core::{
    EntityMeta, Error, LinkDef, Record, RelationDef, RelationKind, Result, Value, outcome_from,
    try_outcome,
};
use restmodel_query::{AsyncQuerySet, Scope};
use restmodel_signals::{RelationAction, SignalEvent};

use crate::store::AsyncStore;

/// Access to the records behind one to-many relation of one owner.
///
/// Reads hand out relation-scoped pipelines; the full builder and terminal
/// surface is available on them. Mutations exist for many-to-many relations
/// and bracket each change with `relation_changed` events carrying the
/// affected target keys.
pub struct RelatedManager {
    store: AsyncStore,
    owner: Record,
    relation: RelationDef,
    target_meta: Arc<EntityMeta>,
}

impl RelatedManager {
    pub(crate) fn new(
        store: AsyncStore,
        owner: Record,
        relation: RelationDef,
        target_meta: Arc<EntityMeta>,
    ) -> Self {
        Self {
            store,
            owner,
            relation,
            target_meta,
        }
    }

    #[must_use]
    pub fn target(&self) -> &EntityMeta {
        &self.target_meta
    }

    fn scope(&self) -> Result<Scope> {
        match self.relation.kind {
            RelationKind::ManyToMany => Ok(Scope::Linked {
                link: self.link()?,
                owner: self.owner.pk(),
            }),
            RelationKind::OneToMany => {
                let column = self.relation.remote_column.clone().ok_or_else(|| {
                    self.invalid_relation()
                })?;
                Ok(Scope::RemoteFk {
                    column,
                    owner: self.owner.pk(),
                })
            }
            RelationKind::OneToOne | RelationKind::ManyToOne => Err(self.invalid_relation()),
        }
    }

    fn link(&self) -> Result<LinkDef> {
        if self.relation.kind != RelationKind::ManyToMany {
            return Err(self.invalid_relation());
        }
        self.relation
            .link
            .clone()
            .ok_or_else(|| self.invalid_relation())
    }

    fn invalid_relation(&self) -> Error {
        Error::InvalidRelation {
            entity: self.owner.entity_name().to_string(),
            field: self.relation.name.clone(),
        }
    }

    /// A pipeline over the related records.
    pub fn all(&self) -> Result<AsyncQuerySet> {
        Ok(AsyncQuerySet::scoped(
            self.store.db().clone(),
            Arc::clone(&self.target_meta),
            self.scope()?,
        ))
    }

    async fn announce(
        &self,
        action: RelationAction,
        pk_set: Option<Vec<Value>>,
    ) -> Outcome<(), Error> {
        let link = match self.link() {
            Ok(link) => link,
            Err(err) => return Outcome::Err(err),
        };
        let event = SignalEvent::new(link.table, self.owner.clone())
            .with_action(action)
            .with_pk_set(pk_set)
            .with_related(self.relation.target.clone());
        try_outcome!(self.store.hub().relation_changed.send(event).await);
        Outcome::Ok(())
    }

    async fn current_ids(&self) -> Outcome<Vec<Value>, Error> {
        let link = match self.link() {
            Ok(link) => link,
            Err(err) => return Outcome::Err(err),
        };
        let owner = self.owner.pk();
        outcome_from(
            self.store
                .db()
                .run(move |engine| engine.linked_ids(&link, &owner))
                .await,
        )
    }

    /// Link the given target keys, ignoring ones already linked.
    ///
    /// The `pre_add`/`post_add` events carry only the keys that were
    /// actually missing.
    #[tracing::instrument(level = "debug", skip(self, targets), fields(relation = %self.relation.name))]
    pub async fn add(&self, targets: &[Value]) -> Outcome<(), Error> {
        let current = try_outcome!(self.current_ids().await);
        let missing: Vec<Value> = targets
            .iter()
            .filter(|t| !current.iter().any(|c| c.loosely_eq(t)))
            .cloned()
            .collect();

        try_outcome!(self.announce(RelationAction::PreAdd, Some(missing.clone())).await);
        let link = try_outcome!(outcome_from(self.link()));
        let owner = self.owner.pk();
        let to_link = missing.clone();
        try_outcome!(outcome_from(
            self.store
                .db()
                .run(move |engine| engine.link(&link, &owner, &to_link))
                .await,
        ));
        try_outcome!(self.announce(RelationAction::PostAdd, Some(missing)).await);
        Outcome::Ok(())
    }

    /// Unlink the given target keys.
    #[tracing::instrument(level = "debug", skip(self, targets), fields(relation = %self.relation.name))]
    pub async fn remove(&self, targets: &[Value]) -> Outcome<(), Error> {
        let removed: Vec<Value> = targets.to_vec();
        try_outcome!(self.announce(RelationAction::PreRemove, Some(removed.clone())).await);
        let link = try_outcome!(outcome_from(self.link()));
        let owner = self.owner.pk();
        let to_unlink = removed.clone();
        try_outcome!(outcome_from(
            self.store
                .db()
                .run(move |engine| engine.unlink(&link, &owner, &to_unlink))
                .await,
        ));
        try_outcome!(self.announce(RelationAction::PostRemove, Some(removed)).await);
        Outcome::Ok(())
    }

    /// Unlink everything. The clear events carry no key set.
    #[tracing::instrument(level = "debug", skip(self), fields(relation = %self.relation.name))]
    pub async fn clear(&self) -> Outcome<(), Error> {
        try_outcome!(self.announce(RelationAction::PreClear, None).await);
        let link = try_outcome!(outcome_from(self.link()));
        let owner = self.owner.pk();
        try_outcome!(outcome_from(
            self.store
                .db()
                .run(move |engine| engine.unlink_all(&link, &owner))
                .await,
        ));
        try_outcome!(self.announce(RelationAction::PostClear, None).await);
        Outcome::Ok(())
    }

    /// Make the linked set exactly `targets`.
    ///
    /// The `pre_set`/`post_set` events carry the symmetric difference of
    /// the current and requested sets, the keys the call actually changes.
    #[tracing::instrument(level = "debug", skip(self, targets), fields(relation = %self.relation.name))]
    pub async fn set(&self, targets: &[Value]) -> Outcome<(), Error> {
        let current = try_outcome!(self.current_ids().await);
        let added: Vec<Value> = targets
            .iter()
            .filter(|t| !current.iter().any(|c| c.loosely_eq(t)))
            .cloned()
            .collect();
        let removed: Vec<Value> = current
            .iter()
            .filter(|c| !targets.iter().any(|t| t.loosely_eq(c)))
            .cloned()
            .collect();
        let mut affected = added.clone();
        affected.extend(removed.iter().cloned());

        try_outcome!(self.announce(RelationAction::PreSet, Some(affected.clone())).await);
        let link = try_outcome!(outcome_from(self.link()));
        let owner = self.owner.pk();
        try_outcome!(outcome_from(
            self.store
                .db()
                .run(move |engine| {
                    engine.unlink(&link, &owner, &removed)?;
                    engine.link(&link, &owner, &added)
                })
                .await,
        ));
        try_outcome!(self.announce(RelationAction::PostSet, Some(affected)).await);
        Outcome::Ok(())
    }
}

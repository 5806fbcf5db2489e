//! An in-memory [`SyncStore`] engine.
//!
//! Rows live in per-entity vectors guarded by one store-wide lock; the
//! engine blocks callers exactly like a remote one would, which is what the
//! offload layer is built against. Integer keys auto-increment, link tables
//! back many-to-many relations, and the full lookup grammar is evaluated
//! here.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use restmodel_core::{
    Cond, EntityMeta, Error, FieldDef, LinkDef, Lookup, OrderKey, PlanStep, Record, Result,
    SelectPlan, SyncStore, Value, compile_pattern,
};

type Row = HashMap<String, Value>;

#[derive(Default)]
struct Table {
    rows: Vec<Row>,
    next_id: i64,
}

#[derive(Default)]
struct Inner {
    metas: HashMap<String, Arc<EntityMeta>>,
    tables: HashMap<String, Table>,
    links: HashMap<String, Vec<(Value, Value)>>,
}

/// In-memory record engine.
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Register an entity. Entities without a declared primary key get the
    /// conventional auto-increment `id` prepended.
    pub fn register(&self, mut meta: EntityMeta) -> Arc<EntityMeta> {
        if meta.pk_field().is_none() {
            meta.fields.insert(0, FieldDef::auto_pk("id"));
        }
        let meta = Arc::new(meta);
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner
            .tables
            .entry(meta.name.clone())
            .or_insert_with(|| Table {
                rows: Vec::new(),
                next_id: 1,
            });
        for relation in &meta.relations {
            if let Some(link) = &relation.link {
                inner.links.entry(link.table.clone()).or_default();
            }
        }
        tracing::debug!(entity = %meta.name, fields = meta.fields.len(), "entity registered");
        inner.metas.insert(meta.name.clone(), Arc::clone(&meta));
        meta
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn lower(s: &str) -> String {
    s.to_lowercase()
}

fn cond_matches(meta: &EntityMeta, row: &Row, cond: &Cond) -> Result<bool> {
    let field = meta.resolve_key(&cond.field);
    if !meta.has_field(field) {
        return Err(Error::UnknownField {
            entity: meta.name.clone(),
            field: field.to_string(),
        });
    }
    let value = row.get(field).cloned().unwrap_or(Value::Null);
    let matched = match cond.lookup {
        Lookup::Exact => value.loosely_eq(&cond.value),
        Lookup::IExact => match (value.as_str(), cond.value.as_str()) {
            (Some(a), Some(b)) => lower(a) == lower(b),
            _ => false,
        },
        Lookup::Contains => match (&value, &cond.value) {
            (Value::Text(hay), Value::Text(needle)) => hay.contains(needle.as_str()),
            (Value::List(items), needle) => items.iter().any(|item| item.loosely_eq(needle)),
            _ => false,
        },
        Lookup::IContains => match (value.as_str(), cond.value.as_str()) {
            (Some(hay), Some(needle)) => lower(hay).contains(&lower(needle)),
            _ => false,
        },
        Lookup::In => {
            let items = cond.value.as_list().ok_or_else(|| {
                Error::InvalidLookup(format!("{field}__in requires a list argument"))
            })?;
            items.iter().any(|item| item.loosely_eq(&value))
        }
        Lookup::Gt | Lookup::Gte | Lookup::Lt | Lookup::Lte => {
            if value.is_null() || cond.value.is_null() {
                false
            } else {
                value.compare(&cond.value).is_some_and(|ord| match cond.lookup {
                    Lookup::Gt => ord.is_gt(),
                    Lookup::Gte => ord.is_ge(),
                    Lookup::Lt => ord.is_lt(),
                    _ => ord.is_le(),
                })
            }
        }
        Lookup::StartsWith => match (value.as_str(), cond.value.as_str()) {
            (Some(hay), Some(prefix)) => hay.starts_with(prefix),
            _ => false,
        },
        Lookup::EndsWith => match (value.as_str(), cond.value.as_str()) {
            (Some(hay), Some(suffix)) => hay.ends_with(suffix),
            _ => false,
        },
        Lookup::IsNull => {
            let expected = cond.value.as_bool().ok_or_else(|| {
                Error::InvalidLookup(format!("{field}__isnull requires a boolean argument"))
            })?;
            value.is_null() == expected
        }
        Lookup::Regex => {
            let pattern = cond.value.as_str().ok_or_else(|| {
                Error::InvalidLookup(format!("{field}__regex requires a string pattern"))
            })?;
            let regex = compile_pattern(pattern)
                .map_err(|err| Error::InvalidLookup(err.to_string()))?;
            value.as_str().is_some_and(|hay| regex.is_match(hay))
        }
    };
    Ok(matched)
}

fn step_keeps(meta: &EntityMeta, row: &Row, step: &PlanStep) -> Result<bool> {
    match step {
        PlanStep::Filter(conds) => {
            for cond in conds {
                if !cond_matches(meta, row, cond)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        PlanStep::Exclude(conds) => {
            // Excluding on nothing drops nothing.
            if conds.is_empty() {
                return Ok(true);
            }
            for cond in conds {
                if !cond_matches(meta, row, cond)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

fn plan_rows(meta: &EntityMeta, table: &Table, plan: &SelectPlan) -> Result<Vec<Row>> {
    let mut rows: Vec<Row> = Vec::new();
    'rows: for row in &table.rows {
        for step in &plan.steps {
            if !step_keeps(meta, row, step)? {
                continue 'rows;
            }
        }
        rows.push(row.clone());
    }
    Ok(rows)
}

fn order_rows(meta: &EntityMeta, rows: &mut [Row], keys: &[OrderKey]) -> Result<()> {
    let mut resolved = Vec::with_capacity(keys.len());
    for key in keys {
        let field = meta.resolve_key(&key.field);
        if !meta.has_field(field) {
            return Err(Error::UnknownField {
                entity: meta.name.clone(),
                field: field.to_string(),
            });
        }
        resolved.push((field.to_string(), key.descending));
    }
    rows.sort_by(|a, b| {
        for (field, descending) in &resolved {
            let left = a.get(field).cloned().unwrap_or(Value::Null);
            let right = b.get(field).cloned().unwrap_or(Value::Null);
            let ord = left.compare(&right).unwrap_or(std::cmp::Ordering::Equal);
            let ord = if *descending { ord.reverse() } else { ord };
            if !ord.is_eq() {
                return ord;
            }
        }
        std::cmp::Ordering::Equal
    });
    Ok(())
}

fn validated_assignments(
    meta: &EntityMeta,
    assignments: &[(String, Value)],
) -> Result<Vec<(String, Value)>> {
    assignments
        .iter()
        .map(|(field, value)| {
            let field = meta.resolve_key(field);
            if !meta.has_field(field) {
                return Err(Error::UnknownField {
                    entity: meta.name.clone(),
                    field: field.to_string(),
                });
            }
            Ok((field.to_string(), value.clone()))
        })
        .collect()
}

impl Inner {
    fn meta(&self, entity: &str) -> Result<Arc<EntityMeta>> {
        self.metas.get(entity).cloned().ok_or_else(|| Error::UnknownEntity {
            entity: entity.to_string(),
        })
    }

    fn table(&self, entity: &str) -> Result<&Table> {
        self.tables.get(entity).ok_or_else(|| Error::UnknownEntity {
            entity: entity.to_string(),
        })
    }

    fn table_mut(&mut self, entity: &str) -> Result<&mut Table> {
        self.tables.get_mut(entity).ok_or_else(|| Error::UnknownEntity {
            entity: entity.to_string(),
        })
    }

    /// Entities on either side of a link table, by scanning relation metas.
    fn link_entities(&self, table: &str) -> Option<(String, String)> {
        for meta in self.metas.values() {
            for relation in &meta.relations {
                if let Some(link) = &relation.link {
                    if link.table == table {
                        return Some((meta.name.clone(), relation.target.clone()));
                    }
                }
            }
        }
        None
    }

    /// Drop link rows that pointed at now-deleted records of `entity`.
    fn purge_links(&mut self, entity: &str, pks: &[Value]) {
        if pks.is_empty() {
            return;
        }
        let mut touched: Vec<(String, bool)> = Vec::new();
        for meta in self.metas.values() {
            for relation in &meta.relations {
                if let Some(link) = &relation.link {
                    if meta.name == entity {
                        touched.push((link.table.clone(), true));
                    }
                    if relation.target == entity {
                        touched.push((link.table.clone(), false));
                    }
                }
            }
        }
        for (table, is_source) in touched {
            if let Some(pairs) = self.links.get_mut(&table) {
                pairs.retain(|(source, target)| {
                    let side = if is_source { source } else { target };
                    !pks.iter().any(|pk| pk.loosely_eq(side))
                });
            }
        }
    }
}

impl SyncStore for MemoryStore {
    fn entity(&self, name: &str) -> Result<Arc<EntityMeta>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.meta(name)
    }

    fn select(&self, entity: &str, plan: &SelectPlan) -> Result<Vec<Record>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let meta = inner.meta(entity)?;
        let table = inner.table(entity)?;
        let mut rows = plan_rows(&meta, table, plan)?;
        if !plan.order_by.is_empty() {
            order_rows(&meta, &mut rows, &plan.order_by)?;
        }
        if plan.distinct {
            let mut seen: Vec<Row> = Vec::new();
            rows.retain(|row| {
                if seen.contains(row) {
                    false
                } else {
                    seen.push(row.clone());
                    true
                }
            });
        }
        let rows = rows
            .into_iter()
            .skip(plan.offset)
            .take(plan.limit.unwrap_or(usize::MAX));
        Ok(rows
            .map(|row| Record::with_values(Arc::clone(&meta), row))
            .collect())
    }

    fn count(&self, entity: &str, plan: &SelectPlan) -> Result<usize> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let meta = inner.meta(entity)?;
        let table = inner.table(entity)?;
        Ok(plan_rows(&meta, table, plan)?.len())
    }

    fn update_where(
        &self,
        entity: &str,
        plan: &SelectPlan,
        assignments: &[(String, Value)],
    ) -> Result<usize> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let meta = inner.meta(entity)?;
        let assignments = validated_assignments(&meta, assignments)?;
        let table = inner.table_mut(entity)?;
        let mut touched = 0;
        'rows: for row in &mut table.rows {
            for step in &plan.steps {
                if !step_keeps(&meta, row, step)? {
                    continue 'rows;
                }
            }
            for (field, value) in &assignments {
                row.insert(field.clone(), value.clone());
            }
            touched += 1;
        }
        Ok(touched)
    }

    fn delete_where(&self, entity: &str, plan: &SelectPlan) -> Result<usize> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let meta = inner.meta(entity)?;
        let pk_name = meta.pk_name().to_string();
        let table = inner.table_mut(entity)?;
        let mut kept = Vec::with_capacity(table.rows.len());
        let mut removed_pks = Vec::new();
        'rows: for row in table.rows.drain(..) {
            for step in &plan.steps {
                if !step_keeps(&meta, &row, step)? {
                    kept.push(row);
                    continue 'rows;
                }
            }
            removed_pks.push(row.get(&pk_name).cloned().unwrap_or(Value::Null));
        }
        table.rows = kept;
        let removed = removed_pks.len();
        inner.purge_links(entity, &removed_pks);
        Ok(removed)
    }

    fn insert(&self, entity: &str, values: &[(String, Value)]) -> Result<Record> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let meta = inner.meta(entity)?;
        let values = validated_assignments(&meta, values)?;

        let mut row: Row = HashMap::new();
        for field in &meta.fields {
            if let Some(default) = &field.default {
                row.insert(field.name.clone(), default.clone());
            }
        }
        for (field, value) in values {
            row.insert(field, value);
        }

        let pk_name = meta.pk_name().to_string();
        let auto = meta.pk_field().is_some_and(|f| f.auto_increment);
        let provided_pk = row.get(&pk_name).filter(|v| !v.is_null()).cloned();
        let table = inner.table_mut(entity)?;
        match provided_pk {
            Some(pk) => {
                if table
                    .rows
                    .iter()
                    .any(|r| r.get(&pk_name).is_some_and(|existing| existing.loosely_eq(&pk)))
                {
                    return Err(Error::Integrity(format!("duplicate {entity} key {pk}")));
                }
                if let Some(id) = pk.as_int() {
                    table.next_id = table.next_id.max(id + 1);
                }
            }
            None if auto => {
                let id = table.next_id;
                table.next_id += 1;
                row.insert(pk_name.clone(), Value::Int(id));
            }
            None => {
                return Err(Error::Integrity(format!(
                    "insert into {entity} without a primary key value"
                )));
            }
        }

        table.rows.push(row.clone());
        Ok(Record::with_values(meta, row))
    }

    fn update_by_pk(
        &self,
        entity: &str,
        pk: &Value,
        assignments: &[(String, Value)],
    ) -> Result<usize> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let meta = inner.meta(entity)?;
        let assignments = validated_assignments(&meta, assignments)?;
        let pk_name = meta.pk_name().to_string();
        let table = inner.table_mut(entity)?;
        let Some(row) = table
            .rows
            .iter_mut()
            .find(|row| row.get(&pk_name).is_some_and(|v| v.loosely_eq(pk)))
        else {
            return Ok(0);
        };
        for (field, value) in assignments {
            row.insert(field, value);
        }
        Ok(1)
    }

    fn reload(&self, entity: &str, pk: &Value) -> Result<Option<Record>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let meta = inner.meta(entity)?;
        let pk_name = meta.pk_name().to_string();
        let table = inner.table(entity)?;
        Ok(table
            .rows
            .iter()
            .find(|row| row.get(&pk_name).is_some_and(|v| v.loosely_eq(pk)))
            .map(|row| Record::with_values(Arc::clone(&meta), row.clone())))
    }

    fn delete_by_pk(&self, entity: &str, pk: &Value) -> Result<usize> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let meta = inner.meta(entity)?;
        let pk_name = meta.pk_name().to_string();
        let table = inner.table_mut(entity)?;
        let before = table.rows.len();
        table
            .rows
            .retain(|row| !row.get(&pk_name).is_some_and(|v| v.loosely_eq(pk)));
        let removed = before - table.rows.len();
        if removed > 0 {
            inner.purge_links(entity, std::slice::from_ref(pk));
        }
        Ok(removed)
    }

    fn linked_ids(&self, link: &LinkDef, owner: &Value) -> Result<Vec<Value>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let pairs = inner.links.get(&link.table).ok_or_else(|| Error::UnknownEntity {
            entity: link.table.clone(),
        })?;
        Ok(pairs
            .iter()
            .filter(|(source, _)| source.loosely_eq(owner))
            .map(|(_, target)| target.clone())
            .collect())
    }

    fn link(&self, link: &LinkDef, owner: &Value, targets: &[Value]) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some((_, target_entity)) = inner.link_entities(&link.table) {
            let target_meta = inner.meta(&target_entity)?;
            let pk_name = target_meta.pk_name().to_string();
            let table = inner.table(&target_entity)?;
            for target in targets {
                let exists = table
                    .rows
                    .iter()
                    .any(|row| row.get(&pk_name).is_some_and(|v| v.loosely_eq(target)));
                if !exists {
                    return Err(Error::Integrity(format!(
                        "link target {target} does not exist in {target_entity}"
                    )));
                }
            }
        }
        let pairs = inner
            .links
            .get_mut(&link.table)
            .ok_or_else(|| Error::UnknownEntity {
                entity: link.table.clone(),
            })?;
        for target in targets {
            let present = pairs
                .iter()
                .any(|(s, t)| s.loosely_eq(owner) && t.loosely_eq(target));
            if !present {
                pairs.push((owner.clone(), target.clone()));
            }
        }
        Ok(())
    }

    fn unlink(&self, link: &LinkDef, owner: &Value, targets: &[Value]) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let pairs = inner
            .links
            .get_mut(&link.table)
            .ok_or_else(|| Error::UnknownEntity {
                entity: link.table.clone(),
            })?;
        pairs.retain(|(source, target)| {
            !(source.loosely_eq(owner) && targets.iter().any(|t| t.loosely_eq(target)))
        });
        Ok(())
    }

    fn unlink_all(&self, link: &LinkDef, owner: &Value) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let pairs = inner
            .links
            .get_mut(&link.table)
            .ok_or_else(|| Error::UnknownEntity {
                entity: link.table.clone(),
            })?;
        pairs.retain(|(source, _)| !source.loosely_eq(owner));
        Ok(())
    }
}

//! Payload cleaners: query coercion, null stripping, and id verification.

use asupersync::Outcome;
use restmodel_core::{Cond, Value, try_outcome};
use restmodel_entity::AsyncStore;

use crate::error::RestError;
use crate::schema::Schema;

fn coerce_scalar(field_type: Option<&str>, raw: &str) -> serde_json::Value {
    match field_type {
        Some("integer") => raw
            .parse::<i64>()
            .map_or_else(|_| serde_json::json!(raw), |n| serde_json::json!(n)),
        Some("number") => raw
            .parse::<f64>()
            .map_or_else(|_| serde_json::json!(raw), |n| serde_json::json!(n)),
        Some("boolean") => match raw {
            "true" | "1" => serde_json::json!(true),
            "false" | "0" => serde_json::json!(false),
            _ => serde_json::json!(raw),
        },
        _ => serde_json::json!(raw),
    }
}

/// Turn raw query pairs into a typed JSON object, guided by a schema.
///
/// Only keys the schema names are kept. Array-typed parameters collect every
/// occurrence of their key; scalar parameters keep the last. Values that do
/// not parse as their declared type stay strings, for validation to flag.
#[must_use]
pub fn clean_params(schema: &Schema, query: &[(String, String)]) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (key, raw) in query {
        let Some(fs) = schema.properties.get(key) else {
            continue;
        };
        if fs.is_array() {
            let item_type = fs.items.as_deref().and_then(|i| i.field_type.as_deref());
            let coerced = coerce_scalar(item_type, raw);
            match map.get_mut(key) {
                Some(serde_json::Value::Array(items)) => items.push(coerced),
                _ => {
                    map.insert(key.clone(), serde_json::Value::Array(vec![coerced]));
                }
            }
        } else {
            map.insert(key.clone(), coerce_scalar(fs.field_type.as_deref(), raw));
        }
    }
    serde_json::Value::Object(map)
}

/// Recursively drop null-valued entries from objects.
#[must_use]
pub fn clean_none_values(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, clean_none_values(v)))
                .collect(),
        ),
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(clean_none_values).collect())
        }
        other => other,
    }
}

/// Verify that the key(s) a payload field carries exist in the store.
///
/// Absent or null fields clean to `Null` (or an empty list with `many`).
/// A single key that matches no row fails with `Invalid id`; a key list
/// whose distinct members are not all present fails with `Invalid ids`.
#[tracing::instrument(level = "debug", skip(store, payload))]
pub async fn clean_db_field(
    store: &AsyncStore,
    entity: &str,
    field: &str,
    payload: &serde_json::Value,
    many: bool,
) -> Outcome<Value, RestError> {
    let raw = payload.get(field).cloned().unwrap_or(serde_json::Value::Null);
    if raw.is_null() {
        return Outcome::Ok(if many {
            Value::List(Vec::new())
        } else {
            Value::Null
        });
    }
    if many {
        let serde_json::Value::Array(items) = raw else {
            return Outcome::Err(RestError::field(field, "Invalid ids"));
        };
        let ids: Vec<Value> = items.iter().map(Value::from_json).collect();
        let mut distinct: Vec<Value> = Vec::new();
        for id in &ids {
            if !distinct.contains(id) {
                distinct.push(id.clone());
            }
        }
        let objects = match store.objects(entity) {
            Ok(objects) => objects,
            Err(err) => return Outcome::Err(err.into()),
        };
        let found = try_outcome!(
            objects
                .filter([Cond::parse("pk__in", Value::List(distinct.clone()))])
                .count()
                .await
        );
        if found != distinct.len() {
            return Outcome::Err(RestError::field(field, "Invalid ids"));
        }
        Outcome::Ok(Value::List(ids))
    } else {
        let id = Value::from_json(&raw);
        let objects = match store.objects(entity) {
            Ok(objects) => objects,
            Err(err) => return Outcome::Err(err.into()),
        };
        let found = try_outcome!(objects.filter([Cond::exact("pk", id.clone())]).exists().await);
        if found {
            Outcome::Ok(id)
        } else {
            Outcome::Err(RestError::field(field, "Invalid id"))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use restmodel_memory::MemoryStore;

    use super::*;
    use crate::schema::FieldSchema;

    fn run<T>(future: impl Future<Output = T>) -> T {
        let rt = asupersync::runtime::RuntimeBuilder::current_thread()
            .build()
            .expect("runtime");
        rt.block_on(future)
    }

    fn params_schema() -> Schema {
        Schema::default()
            .property("limit", FieldSchema::typed("integer"))
            .property("active", FieldSchema::typed("boolean"))
            .property(
                "tag_ids",
                FieldSchema::array_of(FieldSchema::typed("integer")),
            )
    }

    #[test]
    fn params_are_coerced_and_arrays_collect_repeats() {
        let query = vec![
            ("limit".to_string(), "25".to_string()),
            ("active".to_string(), "true".to_string()),
            ("tag_ids".to_string(), "1".to_string()),
            ("tag_ids".to_string(), "2".to_string()),
            ("unknown".to_string(), "x".to_string()),
        ];
        let cleaned = clean_params(&params_schema(), &query);
        assert_eq!(
            cleaned,
            serde_json::json!({"limit": 25, "active": true, "tag_ids": [1, 2]})
        );
    }

    #[test]
    fn unparseable_params_stay_strings() {
        let query = vec![("limit".to_string(), "lots".to_string())];
        let cleaned = clean_params(&params_schema(), &query);
        assert_eq!(cleaned, serde_json::json!({"limit": "lots"}));
    }

    #[test]
    fn none_values_are_stripped_recursively() {
        let cleaned = clean_none_values(serde_json::json!({
            "title": "a",
            "author": null,
            "nested": {"keep": 1, "drop": null},
            "list": [{"x": null}],
        }));
        assert_eq!(
            cleaned,
            serde_json::json!({"title": "a", "nested": {"keep": 1}, "list": [{}]})
        );
    }

    fn seeded_store() -> AsyncStore {
        let engine = MemoryStore::new();
        engine.register(restmodel_core::EntityMeta::new("tag"));
        let store = AsyncStore::with_default_pool(Arc::new(engine)).expect("store");
        run(async {
            for _ in 0..3 {
                match store.objects("tag").expect("meta").create(vec![]).await {
                    asupersync::Outcome::Ok(_) => {}
                    other => panic!("seed failed: {other:?}"),
                }
            }
        });
        store
    }

    #[test]
    fn absent_and_null_db_fields_clean_to_empty() {
        let store = seeded_store();
        run(async {
            let payload = serde_json::json!({"other": 1, "tag": null});
            match clean_db_field(&store, "tag", "tag", &payload, false).await {
                Outcome::Ok(v) => assert_eq!(v, Value::Null),
                other => panic!("unexpected: {other:?}"),
            }
            match clean_db_field(&store, "tag", "tags", &payload, true).await {
                Outcome::Ok(v) => assert_eq!(v, Value::List(Vec::new())),
                other => panic!("unexpected: {other:?}"),
            }
        });
    }

    #[test]
    fn missing_single_id_is_a_field_error() {
        let store = seeded_store();
        run(async {
            let payload = serde_json::json!({"tag": 99});
            match clean_db_field(&store, "tag", "tag", &payload, false).await {
                Outcome::Err(err) => {
                    assert_eq!(err.to_body(), serde_json::json!({"tag": ["Invalid id"]}));
                }
                other => panic!("expected error, got {other:?}"),
            }
            let payload = serde_json::json!({"tag": 2});
            match clean_db_field(&store, "tag", "tag", &payload, false).await {
                Outcome::Ok(v) => assert_eq!(v, Value::Int(2)),
                other => panic!("unexpected: {other:?}"),
            }
        });
    }

    #[test]
    fn id_lists_must_resolve_completely() {
        let store = seeded_store();
        run(async {
            let payload = serde_json::json!({"tags": [1, 2, 99]});
            match clean_db_field(&store, "tag", "tags", &payload, true).await {
                Outcome::Err(err) => {
                    assert_eq!(err.to_body(), serde_json::json!({"tags": ["Invalid ids"]}));
                }
                other => panic!("expected error, got {other:?}"),
            }
            let payload = serde_json::json!({"tags": [1, 3, 1]});
            match clean_db_field(&store, "tag", "tags", &payload, true).await {
                Outcome::Ok(v) => {
                    assert_eq!(
                        v,
                        Value::List(vec![Value::Int(1), Value::Int(3), Value::Int(1)])
                    );
                }
                other => panic!("unexpected: {other:?}"),
            }
        });
    }
}

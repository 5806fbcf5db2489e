//! Schema-guided serialization of entities, resolving relations as it goes.

use std::collections::BTreeMap;
use std::pin::Pin;

use asupersync::Outcome;
use restmodel_core::try_outcome;
use restmodel_entity::Entity;

use crate::error::RestError;
use crate::schema::Schema;

/// Serialize one entity as the shape the schema describes.
///
/// A schema with no properties falls back to the record's raw field map.
/// Otherwise each property is rendered from the schema's point of view:
/// `$ref` fields resolve the to-one relation (null when unset or dangling),
/// array-of-`$ref` fields query the to-many relation (empty when the field
/// names no usable relation), and everything else reads the record value.
/// Child shapes come from `definitions`; a reference without a matching
/// definition renders the related record raw.
pub fn serialize_entity<'a>(
    entity: &'a Entity,
    schema: &'a Schema,
    definitions: &'a BTreeMap<String, Schema>,
) -> Pin<Box<dyn Future<Output = Outcome<serde_json::Value, RestError>> + Send + 'a>> {
    Box::pin(async move {
        if schema.properties.is_empty() {
            return Outcome::Ok(entity.record().to_json());
        }
        let empty = Schema::default();
        let mut map = serde_json::Map::new();
        for (field, fs) in &schema.properties {
            if let Some(name) = fs.items_ref_name() {
                let child = definitions.get(name).unwrap_or(&empty);
                let records = match entity.related(field).and_then(|manager| manager.all()) {
                    Ok(pipeline) => try_outcome!(pipeline.query().await),
                    Err(_) => Vec::new(),
                };
                let mut items = Vec::with_capacity(records.len());
                for record in records {
                    let related = entity.store().wrap(record);
                    items.push(try_outcome!(
                        serialize_entity(&related, child, definitions).await
                    ));
                }
                map.insert(field.clone(), serde_json::Value::Array(items));
            } else if let Some(name) = fs.ref_name() {
                let child = definitions.get(name).unwrap_or(&empty);
                let rendered = match try_outcome!(entity.fetch_related(field).await) {
                    Some(related) => {
                        try_outcome!(serialize_entity(&related, child, definitions).await)
                    }
                    None => serde_json::Value::Null,
                };
                map.insert(field.clone(), rendered);
            } else {
                map.insert(field.clone(), entity.value(field).to_json());
            }
        }
        Outcome::Ok(serde_json::Value::Object(map))
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use restmodel_core::{
        EntityMeta, FieldDef, FieldType, LinkDef, RelationDef, Value,
    };
    use restmodel_entity::AsyncStore;
    use restmodel_memory::MemoryStore;

    use super::*;
    use crate::schema::FieldSchema;

    fn run<T>(future: impl Future<Output = T>) -> T {
        let rt = asupersync::runtime::RuntimeBuilder::current_thread()
            .build()
            .expect("runtime");
        rt.block_on(future)
    }

    fn store() -> AsyncStore {
        let engine = MemoryStore::new();
        engine.register(
            EntityMeta::new("author").field(FieldDef::new("name", FieldType::Text)),
        );
        engine.register(
            EntityMeta::new("tag").field(FieldDef::new("label", FieldType::Text)),
        );
        engine.register(
            EntityMeta::new("article")
                .field(FieldDef::new("title", FieldType::Text))
                .field(FieldDef::new("author_id", FieldType::Int).nullable())
                .relation(RelationDef::many_to_one("author", "author", "author_id"))
                .relation(RelationDef::many_to_many(
                    "tags",
                    "tag",
                    LinkDef::new("article_tags", "article_id", "tag_id"),
                )),
        );
        AsyncStore::with_default_pool(Arc::new(engine)).expect("store")
    }

    fn article_schema() -> (Schema, BTreeMap<String, Schema>) {
        let schema = Schema::default()
            .property("title", FieldSchema::typed("string"))
            .property("author", FieldSchema::reference("Author"))
            .property("tags", FieldSchema::array_of(FieldSchema::reference("Tag")));
        let mut definitions = BTreeMap::new();
        definitions.insert(
            "Author".to_string(),
            Schema::default().property("name", FieldSchema::typed("string")),
        );
        definitions.insert(
            "Tag".to_string(),
            Schema::default().property("label", FieldSchema::typed("string")),
        );
        (schema, definitions)
    }

    fn ok<T: std::fmt::Debug>(outcome: Outcome<T, RestError>) -> T {
        match outcome {
            Outcome::Ok(value) => value,
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    fn ok_db<T: std::fmt::Debug>(outcome: Outcome<T, restmodel_core::Error>) -> T {
        match outcome {
            Outcome::Ok(value) => value,
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn empty_schemas_render_the_raw_record() {
        let store = store();
        run(async {
            let author = ok_db(
                store
                    .objects("author")
                    .expect("meta")
                    .create(vec![("name".into(), Value::from("ann"))])
                    .await,
            );
            let rendered = ok(serialize_entity(
                &store.wrap(author),
                &Schema::default(),
                &BTreeMap::new(),
            )
            .await);
            assert_eq!(rendered, serde_json::json!({"id": 1, "name": "ann"}));
        });
    }

    #[test]
    fn references_and_arrays_resolve_relations() {
        let store = store();
        run(async {
            let author = ok_db(
                store
                    .objects("author")
                    .expect("meta")
                    .create(vec![("name".into(), Value::from("ann"))])
                    .await,
            );
            let article = ok_db(
                store
                    .objects("article")
                    .expect("meta")
                    .create(vec![
                        ("title".into(), Value::from("intro")),
                        ("author_id".into(), author.pk()),
                    ])
                    .await,
            );
            let article = store.wrap(article);
            for label in ["rust", "async"] {
                let tag = ok_db(
                    store
                        .objects("tag")
                        .expect("meta")
                        .create(vec![("label".into(), Value::from(label))])
                        .await,
                );
                ok_db(article.related("tags").expect("relation").add(&[tag.pk()]).await);
            }

            let (schema, definitions) = article_schema();
            let rendered = ok(serialize_entity(&article, &schema, &definitions).await);
            assert_eq!(
                rendered,
                serde_json::json!({
                    "title": "intro",
                    "author": {"name": "ann"},
                    "tags": [{"label": "rust"}, {"label": "async"}],
                })
            );
        });
    }

    #[test]
    fn unset_references_render_null_and_missing_relations_render_empty() {
        let store = store();
        run(async {
            let article = ok_db(
                store
                    .objects("article")
                    .expect("meta")
                    .create(vec![("title".into(), Value::from("orphan"))])
                    .await,
            );
            let schema = Schema::default()
                .property("author", FieldSchema::reference("Author"))
                .property(
                    "reviews",
                    FieldSchema::array_of(FieldSchema::reference("Review")),
                );
            let rendered = ok(serialize_entity(&store.wrap(article), &schema, &BTreeMap::new()).await);
            assert_eq!(
                rendered,
                serde_json::json!({"author": null, "reviews": []})
            );
        });
    }
}

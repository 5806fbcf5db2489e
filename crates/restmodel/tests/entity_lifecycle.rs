//! End-to-end entity lifecycle through the facade: saves, refreshes,
//! deletes, and the signals they emit.

use std::sync::{Arc, Mutex};

use restmodel::prelude::*;

fn run<T>(future: impl Future<Output = T>) -> T {
    let rt = restmodel::runtime::RuntimeBuilder::current_thread()
        .build()
        .expect("runtime");
    rt.block_on(future)
}

fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> Result<T, String> {
    match outcome {
        Outcome::Ok(value) => Ok(value),
        Outcome::Err(err) => Err(format!("error: {err}")),
        Outcome::Cancelled(reason) => Err(format!("cancelled: {reason:?}")),
        Outcome::Panicked(payload) => Err(format!("panicked: {payload:?}")),
    }
}

fn blog_store() -> AsyncStore {
    let engine = MemoryStore::new();
    engine.register(EntityMeta::new("author").field(FieldDef::new("name", FieldType::Text)));
    engine.register(
        EntityMeta::new("article")
            .field(FieldDef::new("title", FieldType::Text))
            .field(FieldDef::new("views", FieldType::Int).with_default(0))
            .field(FieldDef::new("author_id", FieldType::Int).nullable())
            .relation(RelationDef::many_to_one("author", "author", "author_id")),
    );
    AsyncStore::with_default_pool(Arc::new(engine)).expect("store")
}

#[test]
fn save_inserts_then_updates() {
    let store = blog_store();
    run(async {
        let mut article = store.new_entity("article").expect("meta");
        article.set("title", "intro");
        unwrap_outcome(article.save(None).await).expect("insert");
        assert_eq!(article.pk(), Value::Int(1));
        assert_eq!(article.value("views"), Value::Int(0));

        article.set("title", "intro, revised");
        unwrap_outcome(article.save(None).await).expect("update");

        let total = unwrap_outcome(store.objects("article").expect("meta").count().await)
            .expect("count");
        assert_eq!(total, 1);
        let stored = unwrap_outcome(
            store
                .objects("article")
                .expect("meta")
                .filter(filters!(pk = 1))
                .get()
                .await,
        )
        .expect("get");
        assert_eq!(stored.value("title"), Value::from("intro, revised"));
    });
}

#[test]
fn update_fields_writes_only_the_named_subset() {
    let store = blog_store();
    run(async {
        let mut article = store.new_entity("article").expect("meta");
        article.set("title", "draft");
        unwrap_outcome(article.save(None).await).expect("insert");

        article.set("title", "final");
        article.set("views", 100);
        unwrap_outcome(article.save(Some(vec!["views".into()])).await).expect("partial save");

        let mut reloaded = store.wrap(article.record().clone());
        unwrap_outcome(reloaded.refresh_from_db().await).expect("refresh");
        assert_eq!(reloaded.value("title"), Value::from("draft"));
        assert_eq!(reloaded.value("views"), Value::Int(100));
    });
}

#[test]
fn save_signals_bracket_the_write_with_the_created_flag() {
    let store = blog_store();
    let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let pre_log = Arc::clone(&log);
    store.hub().pre_save.connect(Some("article"), move |event| {
        let pre_log = Arc::clone(&pre_log);
        async move {
            pre_log
                .lock()
                .expect("lock")
                .push(format!("pre pk_null={}", event.instance.pk().is_null()));
            Outcome::Ok(Value::Null)
        }
    });
    let post_log = Arc::clone(&log);
    store.hub().post_save.connect(Some("article"), move |event| {
        let post_log = Arc::clone(&post_log);
        async move {
            post_log
                .lock()
                .expect("lock")
                .push(format!("post created={:?}", event.created));
            Outcome::Ok(Value::Null)
        }
    });

    run(async {
        let mut article = store.new_entity("article").expect("meta");
        article.set("title", "signals");
        unwrap_outcome(article.save(None).await).expect("insert");
        unwrap_outcome(article.save(None).await).expect("update");
    });

    let entries = log.lock().expect("lock").clone();
    assert_eq!(
        entries,
        vec![
            "pre pk_null=true",
            "post created=Some(true)",
            "pre pk_null=false",
            "post created=Some(false)",
        ]
    );
}

#[test]
fn failing_pre_save_listener_blocks_the_write() {
    let store = blog_store();
    store.hub().pre_save.connect(Some("article"), |_event| async {
        Outcome::Err(Error::Integrity("title is reserved".into()))
    });
    run(async {
        let mut article = store.new_entity("article").expect("meta");
        article.set("title", "reserved");
        assert!(unwrap_outcome(article.save(None).await).is_err());
        let total = unwrap_outcome(store.objects("article").expect("meta").count().await)
            .expect("count");
        assert_eq!(total, 0);
    });
}

#[test]
fn delete_nulls_the_pk_after_the_post_delete_signal() {
    let store = blog_store();
    let observed: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&observed);
    store
        .hub()
        .post_delete
        .connect(Some("article"), move |event| {
            let slot = Arc::clone(&slot);
            async move {
                *slot.lock().expect("lock") = Some(event.instance.pk());
                Outcome::Ok(Value::Null)
            }
        });

    let store_clone = store.clone();
    run(async {
        let mut article = store_clone.new_entity("article").expect("meta");
        article.set("title", "short-lived");
        unwrap_outcome(article.save(None).await).expect("insert");
        let pk = article.pk();

        let deleted = unwrap_outcome(article.delete().await).expect("delete");
        assert_eq!(deleted, 1);
        assert!(article.pk().is_null());
        // The listener still saw the pre-delete key.
        assert_eq!(observed.lock().expect("lock").clone(), Some(pk));
    });
}

#[test]
fn fetch_related_resolves_or_normalizes_to_none() {
    let store = blog_store();
    run(async {
        let author = unwrap_outcome(
            store
                .objects("author")
                .expect("meta")
                .create(assigns!(name = "ann"))
                .await,
        )
        .expect("author");
        let linked = unwrap_outcome(
            store
                .objects("article")
                .expect("meta")
                .create(vec![
                    ("title".to_string(), Value::from("linked")),
                    ("author_id".to_string(), author.pk()),
                ])
                .await,
        )
        .expect("article");
        let orphan = unwrap_outcome(
            store
                .objects("article")
                .expect("meta")
                .create(assigns!(title = "orphan"))
                .await,
        )
        .expect("article");

        let related = unwrap_outcome(store.wrap(linked).fetch_related("author").await)
            .expect("fetch");
        assert_eq!(
            related.map(|e| e.value("name")),
            Some(Value::from("ann"))
        );
        let orphan = store.wrap(orphan);
        assert!(unwrap_outcome(orphan.fetch_related("author").await)
            .expect("fetch")
            .is_none());
        assert!(unwrap_outcome(orphan.fetch_related("reviews").await)
            .expect("fetch")
            .is_none());
    });
}

//! Many-to-many managers through the facade, and the relation_changed
//! events their mutations announce.

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

fn store_with_tags() -> AsyncStore {
    let engine = MemoryStore::new();
    engine.register(EntityMeta::new("tag").field(FieldDef::new("label", FieldType::Text)));
    engine.register(
        EntityMeta::new("article")
            .field(FieldDef::new("title", FieldType::Text))
            .relation(RelationDef::many_to_many(
                "tags",
                "tag",
                LinkDef::new("article_tags", "article_id", "tag_id"),
            )),
    );
    AsyncStore::with_default_pool(Arc::new(engine)).expect("store")
}

async fn fixture(store: &AsyncStore) -> (Entity, Vec<Value>) {
    let article = unwrap_outcome(
        store
            .objects("article")
            .expect("meta")
            .create(assigns!(title = "tagged"))
            .await,
    )
    .expect("article");
    let mut tag_ids = Vec::new();
    for label in ["rust", "async", "orm"] {
        let tag = unwrap_outcome(
            store
                .objects("tag")
                .expect("meta")
                .create(assigns!(label = label))
                .await,
        )
        .expect("tag");
        tag_ids.push(tag.pk());
    }
    (store.wrap(article), tag_ids)
}

async fn current_labels(article: &Entity) -> Vec<Value> {
    unwrap_outcome(
        article
            .related("tags")
            .expect("relation")
            .all()
            .expect("pipeline")
            .order_by(["label"])
            .flat_values_list("label")
            .await,
    )
    .expect("labels")
}

#[test]
fn add_links_only_missing_targets() {
    let store = store_with_tags();
    let events: Arc<Mutex<Vec<(RelationAction, Option<Vec<Value>>)>>> =
        Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    store
        .hub()
        .relation_changed
        .connect(Some("article_tags"), move |event| {
            let sink = Arc::clone(&sink);
            async move {
                let action = event.action.expect("action");
                sink.lock().expect("lock").push((action, event.pk_set));
                Outcome::Ok(Value::Null)
            }
        });

    run(async {
        let (article, tags) = fixture(&store).await;
        let manager = article.related("tags").expect("relation");
        unwrap_outcome(manager.add(&[tags[0].clone(), tags[1].clone()]).await).expect("add");
        // A second add with one overlap only announces the new key.
        unwrap_outcome(manager.add(&[tags[1].clone(), tags[2].clone()]).await).expect("add");
        assert_eq!(
            current_labels(&article).await,
            vec![Value::from("async"), Value::from("orm"), Value::from("rust")]
        );
    });

    let seen = events.lock().expect("lock").clone();
    assert_eq!(
        seen,
        vec![
            (
                RelationAction::PreAdd,
                Some(vec![Value::Int(1), Value::Int(2)])
            ),
            (
                RelationAction::PostAdd,
                Some(vec![Value::Int(1), Value::Int(2)])
            ),
            (RelationAction::PreAdd, Some(vec![Value::Int(3)])),
            (RelationAction::PostAdd, Some(vec![Value::Int(3)])),
        ]
    );
}

#[test]
fn remove_and_clear_announce_what_they_drop() {
    let store = store_with_tags();
    let events: Arc<Mutex<Vec<(RelationAction, Option<Vec<Value>>)>>> =
        Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    store
        .hub()
        .relation_changed
        .connect(Some("article_tags"), move |event| {
            let sink = Arc::clone(&sink);
            async move {
                let action = event.action.expect("action");
                sink.lock().expect("lock").push((action, event.pk_set));
                Outcome::Ok(Value::Null)
            }
        });

    run(async {
        let (article, tags) = fixture(&store).await;
        let manager = article.related("tags").expect("relation");
        unwrap_outcome(manager.add(&tags).await).expect("add");
        unwrap_outcome(manager.remove(&[tags[0].clone()]).await).expect("remove");
        assert_eq!(
            current_labels(&article).await,
            vec![Value::from("async"), Value::from("orm")]
        );
        unwrap_outcome(manager.clear().await).expect("clear");
        assert!(current_labels(&article).await.is_empty());
    });

    let seen = events.lock().expect("lock").clone();
    assert_eq!(seen.len(), 6);
    assert_eq!(
        seen[2],
        (RelationAction::PreRemove, Some(vec![Value::Int(1)]))
    );
    assert_eq!(
        seen[3],
        (RelationAction::PostRemove, Some(vec![Value::Int(1)]))
    );
    // Clears carry no key set.
    assert_eq!(seen[4], (RelationAction::PreClear, None));
    assert_eq!(seen[5], (RelationAction::PostClear, None));
}

#[test]
fn set_applies_the_symmetric_difference() {
    let store = store_with_tags();
    run(async {
        let (article, tags) = fixture(&store).await;
        let manager = article.related("tags").expect("relation");
        unwrap_outcome(manager.add(&[tags[0].clone(), tags[1].clone()]).await).expect("add");
        unwrap_outcome(
            manager
                .set(&[tags[1].clone(), tags[2].clone()])
                .await,
        )
        .expect("set");
        assert_eq!(
            current_labels(&article).await,
            vec![Value::from("async"), Value::from("orm")]
        );
    });
}

#[test]
fn scoped_pipelines_refuse_creation_terminals() {
    let store = store_with_tags();
    run(async {
        let (article, _tags) = fixture(&store).await;
        let scoped = article
            .related("tags")
            .expect("relation")
            .all()
            .expect("pipeline");
        let outcome = scoped.create(assigns!(label = "illegal")).await;
        assert!(unwrap_outcome(outcome).is_err());
    });
}

#[test]
fn linking_an_unknown_target_is_an_integrity_error() {
    let store = store_with_tags();
    run(async {
        let (article, _tags) = fixture(&store).await;
        let manager = article.related("tags").expect("relation");
        let outcome = manager.add(&[Value::Int(999)]).await;
        assert!(unwrap_outcome(outcome).is_err());
    });
}

use std::sync::Arc;

use deepgraft::context::StoreContext;
use deepgraft::copy::DeepCopier;
use deepgraft::datatype::{Value, ValueKind};
use deepgraft::persist::PersistenceMode;
use deepgraft::schema::{Catalog, EntityDescriptor};
use deepgraft::store::Store;

fn catalog() -> Arc<Catalog> {
    let mut catalog = Catalog::new();
    catalog
        .register(
            EntityDescriptor::new("Item")
                .attribute("name", ValueKind::Text)
                .unique_key(&["name"])
                .to_many("tags", "Tag", true),
        )
        .unwrap();
    catalog
        .register(
            EntityDescriptor::new("Tag")
                .attribute("label", ValueKind::Text)
                .unique_key(&["label"]),
        )
        .unwrap();
    Arc::new(catalog)
}

fn open(label: &str, catalog: &Arc<Catalog>) -> StoreContext {
    StoreContext::spawn(
        Store::open(label, Arc::clone(catalog), PersistenceMode::InMemory, false).unwrap(),
    )
}

async fn seed_tagged_item(source: &StoreContext, name: &str, labels: &[&str]) {
    let item = source.insert("Item").await.unwrap();
    source
        .set_attribute(item, "name", Value::from(name))
        .await
        .unwrap();
    for label in labels {
        let tag = source.insert("Tag").await.unwrap();
        source
            .set_attribute(tag, "label", Value::from(*label))
            .await
            .unwrap();
        source.append_to_many(item, "tags", tag).await.unwrap();
    }
}

async fn tag_labels(store: &StoreContext, item: u64) -> Vec<String> {
    let mut labels = Vec::new();
    for tag in store.related_many(item, "tags").await.unwrap() {
        match store.attribute(tag, "label").await.unwrap() {
            Some(Value::Text(label)) => labels.push(label),
            other => panic!("tag without a text label: {other:?}"),
        }
    }
    labels
}

#[tokio::test]
async fn ordered_tags_keep_their_source_order() {
    let catalog = catalog();
    let source = open("source", &catalog);
    let target = open("target", &catalog);
    seed_tagged_item(&source, "Oranges", &["A", "B", "C"]).await;
    source.commit().await.unwrap();

    let copier = DeepCopier::new(Arc::clone(&catalog), source, target.clone());
    copier.copy_entities(&["Item", "Tag"]).await.unwrap();

    let items = target.query("Item", None, None).await.unwrap();
    assert_eq!(tag_labels(&target, items[0]).await, vec!["A", "B", "C"]);
}

#[tokio::test]
async fn shared_tags_dedupe_without_disturbing_order() {
    let catalog = catalog();
    let source = open("source", &catalog);
    let target = open("target", &catalog);
    // separate source tag records, overlapping labels, different orders
    seed_tagged_item(&source, "Oranges", &["A", "B", "C"]).await;
    seed_tagged_item(&source, "Lemons", &["C", "A"]).await;
    source.commit().await.unwrap();

    let copier = DeepCopier::new(Arc::clone(&catalog), source, target.clone());
    copier.copy_entities(&["Item", "Tag"]).await.unwrap();

    // three distinct labels, one target record per label
    assert_eq!(target.object_count("Tag").await.unwrap(), 3);
    let items = target.query("Item", None, None).await.unwrap();
    assert_eq!(tag_labels(&target, items[0]).await, vec!["A", "B", "C"]);
    assert_eq!(tag_labels(&target, items[1]).await, vec!["C", "A"]);
}

#[tokio::test]
async fn reruns_do_not_duplicate_ordered_elements() {
    let catalog = catalog();
    let source = open("source", &catalog);
    let target = open("target", &catalog);
    seed_tagged_item(&source, "Oranges", &["A", "B", "C"]).await;
    source.commit().await.unwrap();

    let copier = DeepCopier::new(Arc::clone(&catalog), source, target.clone());
    copier.copy_entities(&["Item", "Tag"]).await.unwrap();
    copier.copy_entities(&["Item", "Tag"]).await.unwrap();

    let items = target.query("Item", None, None).await.unwrap();
    assert_eq!(tag_labels(&target, items[0]).await, vec!["A", "B", "C"]);
}

use std::sync::Arc;

use deepgraft::context::StoreContext;
use deepgraft::datatype::{Value, ValueKind};
use deepgraft::error::GraftError;
use deepgraft::persist::PersistenceMode;
use deepgraft::schema::{Catalog, EntityDescriptor};
use deepgraft::store::Store;

fn catalog() -> Arc<Catalog> {
    let mut catalog = Catalog::new();
    catalog
        .register(
            EntityDescriptor::new("Item")
                .attribute("name", ValueKind::Text)
                .attribute("quantity", ValueKind::Integer)
                .attribute("listed", ValueKind::Boolean)
                .unique_key(&["name"])
                .to_one("unit", "Unit")
                .to_many("tags", "Tag", false),
        )
        .unwrap();
    catalog
        .register(
            EntityDescriptor::new("Unit")
                .attribute("name", ValueKind::Text)
                .unique_key(&["name"]),
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

fn open(label: &str, read_only: bool) -> StoreContext {
    StoreContext::spawn(
        Store::open(label, catalog(), PersistenceMode::InMemory, read_only).unwrap(),
    )
}

#[tokio::test]
async fn attributes_round_trip_and_are_validated() {
    let store = open("store", false);
    let item = store.insert("Item").await.unwrap();
    store
        .set_attribute(item, "name", Value::from("Orange"))
        .await
        .unwrap();
    assert_eq!(
        store.attribute(item, "name").await.unwrap(),
        Some(Value::from("Orange"))
    );
    assert_eq!(store.attribute(item, "quantity").await.unwrap(), None);

    // unknown attribute name
    let err = store
        .set_attribute(item, "colour", Value::from("orange"))
        .await
        .unwrap_err();
    assert!(matches!(err, GraftError::Config(_)), "got {err}");

    // declared kind mismatch
    let err = store
        .set_attribute(item, "quantity", Value::from("three"))
        .await
        .unwrap_err();
    assert!(matches!(err, GraftError::Config(_)), "got {err}");

    // unknown entity type
    let err = store.insert("Basket").await.unwrap_err();
    assert!(matches!(err, GraftError::Config(_)), "got {err}");
}

#[tokio::test]
async fn a_read_only_store_rejects_every_mutation() {
    let store = open("readonly", true);
    let err = store.insert("Item").await.unwrap_err();
    assert!(matches!(err, GraftError::Store(_)), "got {err}");
    let err = store.metadata_set("marker", "true").await.unwrap_err();
    assert!(matches!(err, GraftError::Store(_)), "got {err}");
    // reads and empty commits are fine
    assert_eq!(store.object_count("Item").await.unwrap(), 0);
    store.commit().await.unwrap();
}

#[tokio::test]
async fn committed_records_can_be_evicted_and_faulted_back() {
    let store = open("store", false);
    let item = store.insert("Item").await.unwrap();
    store
        .set_attribute(item, "name", Value::from("Orange"))
        .await
        .unwrap();
    assert_eq!(store.resident_count().await.unwrap(), 1);

    store.commit().await.unwrap();
    store.evict(item).await.unwrap();
    assert_eq!(store.resident_count().await.unwrap(), 0);

    // reads go through to durable state without growing the working set
    assert_eq!(
        store.attribute(item, "name").await.unwrap(),
        Some(Value::from("Orange"))
    );
    assert_eq!(store.resident_count().await.unwrap(), 0);

    // a mutation faults the record back in
    store
        .set_attribute(item, "listed", Value::from(true))
        .await
        .unwrap();
    assert_eq!(store.resident_count().await.unwrap(), 1);
    assert_eq!(
        store.attribute(item, "name").await.unwrap(),
        Some(Value::from("Orange"))
    );
}

#[tokio::test]
async fn eviction_never_drops_uncommitted_changes() {
    let store = open("store", false);
    let item = store.insert("Item").await.unwrap();
    store
        .set_attribute(item, "name", Value::from("Orange"))
        .await
        .unwrap();

    // dirty, so the eviction is refused and the record stays resident
    store.evict(item).await.unwrap();
    assert_eq!(store.resident_count().await.unwrap(), 1);
    assert_eq!(
        store.attribute(item, "name").await.unwrap(),
        Some(Value::from("Orange"))
    );

    store.commit().await.unwrap();
    store.evict(item).await.unwrap();
    assert_eq!(store.resident_count().await.unwrap(), 0);
}

#[tokio::test]
async fn links_are_validated_and_deduplicated() {
    let store = open("store", false);
    let item = store.insert("Item").await.unwrap();
    store
        .set_attribute(item, "name", Value::from("Orange"))
        .await
        .unwrap();
    let unit = store.insert("Unit").await.unwrap();
    let tag = store.insert("Tag").await.unwrap();

    // a to-one cannot be appended to, a to-many cannot be set
    let err = store.append_to_many(item, "unit", unit).await.unwrap_err();
    assert!(matches!(err, GraftError::Config(_)), "got {err}");
    let err = store.set_to_one(item, "tags", tag).await.unwrap_err();
    assert!(matches!(err, GraftError::Config(_)), "got {err}");

    // the target must be a record of the declared target type
    let err = store.set_to_one(item, "unit", tag).await.unwrap_err();
    assert!(matches!(err, GraftError::Invariant(_)), "got {err}");
    let err = store.set_to_one(item, "unit", 9999).await.unwrap_err();
    assert!(matches!(err, GraftError::Invariant(_)), "got {err}");

    store.set_to_one(item, "unit", unit).await.unwrap();
    assert_eq!(store.related_one(item, "unit").await.unwrap(), Some(unit));

    // appending the same target twice keeps a single link
    store.append_to_many(item, "tags", tag).await.unwrap();
    store.append_to_many(item, "tags", tag).await.unwrap();
    assert_eq!(store.related_many(item, "tags").await.unwrap(), vec![tag]);
}

#[tokio::test]
async fn object_counts_follow_inserts() {
    let store = open("store", false);
    assert_eq!(store.object_count("Item").await.unwrap(), 0);
    for _ in 0..3 {
        store.insert("Item").await.unwrap();
    }
    store.insert("Unit").await.unwrap();
    assert_eq!(store.object_count("Item").await.unwrap(), 3);
    assert_eq!(store.object_count("Unit").await.unwrap(), 1);
    let err = store.object_count("Basket").await.unwrap_err();
    assert!(matches!(err, GraftError::Config(_)), "got {err}");
}

#[tokio::test]
async fn metadata_round_trips() {
    let store = open("store", false);
    assert_eq!(store.metadata_get("marker").await.unwrap(), None);
    store.metadata_set("marker", "true").await.unwrap();
    assert_eq!(
        store.metadata_get("marker").await.unwrap(),
        Some("true".to_owned())
    );
    store.metadata_set("marker", "false").await.unwrap();
    assert_eq!(
        store.metadata_get("marker").await.unwrap(),
        Some("false".to_owned())
    );
}

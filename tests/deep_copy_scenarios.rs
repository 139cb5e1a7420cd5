use std::sync::Arc;

use deepgraft::context::StoreContext;
use deepgraft::copy::{CopyEvent, DeepCopier};
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
                .attribute("quantity", ValueKind::Integer)
                .unique_key(&["name"])
                .to_one("unit", "Unit"),
        )
        .unwrap();
    catalog
        .register(
            EntityDescriptor::new("Unit")
                .attribute("name", ValueKind::Text)
                .unique_key(&["name"]),
        )
        .unwrap();
    Arc::new(catalog)
}

fn open(label: &str, catalog: &Arc<Catalog>) -> StoreContext {
    StoreContext::spawn(
        Store::open(label, Arc::clone(catalog), PersistenceMode::InMemory, false).unwrap(),
    )
}

async fn seed_item(source: &StoreContext, name: &str, quantity: i64, unit: &str) {
    let item = source.insert("Item").await.unwrap();
    source
        .set_attribute(item, "name", Value::from(name))
        .await
        .unwrap();
    source
        .set_attribute(item, "quantity", Value::from(quantity))
        .await
        .unwrap();
    // every item gets its own unit record, even for a repeated unit name;
    // deduplication is the copy engine's job
    let unit_record = source.insert("Unit").await.unwrap();
    source
        .set_attribute(unit_record, "name", Value::from(unit))
        .await
        .unwrap();
    source.set_to_one(item, "unit", unit_record).await.unwrap();
}

#[tokio::test]
async fn item_arrives_with_its_unit() {
    let catalog = catalog();
    let source = open("source", &catalog);
    let target = open("target", &catalog);
    seed_item(&source, "Orange", 3, "KG").await;
    source.commit().await.unwrap();

    let copier = DeepCopier::new(Arc::clone(&catalog), source, target.clone());
    let report = copier.copy_entities(&["Item", "Unit"]).await.unwrap();
    assert_eq!(report.skipped, 0);

    let items = target.query("Item", None, None).await.unwrap();
    let units = target.query("Unit", None, None).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(units.len(), 1);
    assert_eq!(
        target.attribute(items[0], "name").await.unwrap(),
        Some(Value::from("Orange"))
    );
    assert_eq!(
        target.attribute(items[0], "quantity").await.unwrap(),
        Some(Value::from(3i64))
    );
    let linked = target.related_one(items[0], "unit").await.unwrap();
    assert_eq!(linked, Some(units[0]));
    assert_eq!(
        target.attribute(units[0], "name").await.unwrap(),
        Some(Value::from("KG"))
    );
}

#[tokio::test]
async fn shared_unit_is_copied_once() {
    let catalog = catalog();
    let source = open("source", &catalog);
    let target = open("target", &catalog);
    // two distinct source items, two distinct source unit records, one unit name
    seed_item(&source, "Orange", 3, "KG").await;
    seed_item(&source, "Lemon", 2, "KG").await;
    source.commit().await.unwrap();

    let copier = DeepCopier::new(Arc::clone(&catalog), source, target.clone());
    copier.copy_entities(&["Item", "Unit"]).await.unwrap();

    assert_eq!(target.object_count("Item").await.unwrap(), 2);
    assert_eq!(target.object_count("Unit").await.unwrap(), 1);
    let items = target.query("Item", None, None).await.unwrap();
    let unit_of_first = target.related_one(items[0], "unit").await.unwrap();
    let unit_of_second = target.related_one(items[1], "unit").await.unwrap();
    assert!(unit_of_first.is_some());
    assert_eq!(unit_of_first, unit_of_second);
}

#[tokio::test]
async fn running_the_copy_twice_changes_nothing() {
    let catalog = catalog();
    let source = open("source", &catalog);
    let target = open("target", &catalog);
    seed_item(&source, "Orange", 3, "KG").await;
    seed_item(&source, "Milk", 1, "L").await;
    source.commit().await.unwrap();

    let copier = DeepCopier::new(Arc::clone(&catalog), source, target.clone());
    copier.copy_entities(&["Item", "Unit"]).await.unwrap();
    let items_after_first = target.object_count("Item").await.unwrap();
    let units_after_first = target.object_count("Unit").await.unwrap();
    let first_links: Vec<_> = {
        let mut links = Vec::new();
        for item in target.query("Item", None, None).await.unwrap() {
            links.push(target.related_one(item, "unit").await.unwrap());
        }
        links
    };

    copier.copy_entities(&["Item", "Unit"]).await.unwrap();
    assert_eq!(target.object_count("Item").await.unwrap(), items_after_first);
    assert_eq!(target.object_count("Unit").await.unwrap(), units_after_first);
    let mut second_links = Vec::new();
    for item in target.query("Item", None, None).await.unwrap() {
        second_links.push(target.related_one(item, "unit").await.unwrap());
    }
    assert_eq!(first_links, second_links);
}

#[tokio::test]
async fn progress_is_reported_per_type_and_on_completion() {
    let catalog = catalog();
    let source = open("source", &catalog);
    let target = open("target", &catalog);
    seed_item(&source, "Orange", 3, "KG").await;
    source.commit().await.unwrap();

    let copier = DeepCopier::new(Arc::clone(&catalog), source, target);
    let mut events = copier.reporter().subscribe();
    copier.copy_entities(&["Item", "Unit"]).await.unwrap();

    assert_eq!(
        events.recv().await.unwrap(),
        CopyEvent::EntityTypeCopied { entity: "Item".to_owned(), copied: 1 }
    );
    assert_eq!(
        events.recv().await.unwrap(),
        CopyEvent::EntityTypeCopied { entity: "Unit".to_owned(), copied: 1 }
    );
    assert_eq!(events.recv().await.unwrap(), CopyEvent::Completed);
}

#[tokio::test]
async fn both_working_sets_are_empty_after_a_copy() {
    let catalog = catalog();
    let source = open("source", &catalog);
    let target = open("target", &catalog);
    for i in 0..10 {
        seed_item(&source, &format!("Item {i}"), i, "KG").await;
    }
    source.commit().await.unwrap();

    let copier = DeepCopier::new(
        Arc::clone(&catalog),
        source.clone(),
        target.clone(),
    );
    copier.copy_entities(&["Item", "Unit"]).await.unwrap();

    // every record involved was committed and then evicted
    assert_eq!(source.resident_count().await.unwrap(), 0);
    assert_eq!(target.resident_count().await.unwrap(), 0);
}

#[tokio::test]
async fn mutually_referencing_records_terminate_and_link_both_ways() {
    let mut catalog = Catalog::new();
    catalog
        .register(
            EntityDescriptor::new("Person")
                .attribute("name", ValueKind::Text)
                .unique_key(&["name"])
                .to_one("spouse", "Person"),
        )
        .unwrap();
    let catalog = Arc::new(catalog);
    let source = open("source", &catalog);
    let target = open("target", &catalog);

    let alice = source.insert("Person").await.unwrap();
    source
        .set_attribute(alice, "name", Value::from("Alice"))
        .await
        .unwrap();
    let bob = source.insert("Person").await.unwrap();
    source
        .set_attribute(bob, "name", Value::from("Bob"))
        .await
        .unwrap();
    source.set_to_one(alice, "spouse", bob).await.unwrap();
    source.set_to_one(bob, "spouse", alice).await.unwrap();
    source.commit().await.unwrap();

    let copier = DeepCopier::new(Arc::clone(&catalog), source, target.clone());
    copier.copy_entities(&["Person"]).await.unwrap();

    assert_eq!(target.object_count("Person").await.unwrap(), 2);
    let people = target.query("Person", None, None).await.unwrap();
    let spouse_of_first = target.related_one(people[0], "spouse").await.unwrap();
    let spouse_of_second = target.related_one(people[1], "spouse").await.unwrap();
    assert_eq!(spouse_of_first, Some(people[1]));
    assert_eq!(spouse_of_second, Some(people[0]));
}

//! Default-data import runner.
//!
//! Opens a source store (read-only when file-backed), opens a target
//! store, and deep-copies the configured entity types into it exactly
//! once, guarded by a marker in the target store's metadata. Without a
//! configured source store a small in-memory pantry dataset is seeded so
//! the binary demonstrates itself.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use deepgraft::context::StoreContext;
use deepgraft::copy::DeepCopier;
use deepgraft::datatype::{Decimal, Value, ValueKind};
use deepgraft::error::{GraftError, Result};
use deepgraft::persist::PersistenceMode;
use deepgraft::schema::{Catalog, EntityDescriptor};
use deepgraft::settings::Settings;
use deepgraft::store::Store;

// Once this key is set in the target store's metadata, the import is
// never run again for that store.
const DEFAULT_DATA_IMPORTED: &str = "default_data_imported";

fn pantry_catalog() -> Result<Catalog> {
    let mut catalog = Catalog::new();
    catalog.register(
        EntityDescriptor::new("Item")
            .attribute("name", ValueKind::Text)
            .attribute("quantity", ValueKind::Decimal)
            .attribute("listed", ValueKind::Boolean)
            .unique_key(&["name"])
            .to_one("unit", "Unit")
            .to_one("shelf", "Shelf")
            .to_many("tags", "Tag", true),
    )?;
    catalog.register(
        EntityDescriptor::new("Unit")
            .attribute("name", ValueKind::Text)
            .unique_key(&["name"]),
    )?;
    catalog.register(
        EntityDescriptor::new("Shelf")
            .attribute("location", ValueKind::Text)
            .unique_key(&["location"]),
    )?;
    catalog.register(
        EntityDescriptor::new("Tag")
            .attribute("label", ValueKind::Text)
            .unique_key(&["label"]),
    )?;
    Ok(catalog)
}

async fn seed_pantry(source: &StoreContext) -> Result<()> {
    let items: [(&str, &str, &str, &str, &[&str]); 4] = [
        ("Oranges", "2.5", "KG", "Fruit Rack", &["fresh", "citrus"]),
        ("Milk", "2", "L", "Fridge", &["fresh", "dairy"]),
        ("Espresso Beans", "0.5", "KG", "Top Shelf", &["roasted"]),
        ("Rice", "5", "KG", "Pantry", &[]),
    ];
    for (name, quantity, unit, shelf, tags) in items {
        let item = source.insert("Item").await?;
        source.set_attribute(item, "name", Value::from(name)).await?;
        let quantity = Decimal::from_str(quantity)
            .ok_or_else(|| GraftError::Config(format!("bad seed quantity '{quantity}'")))?;
        source
            .set_attribute(item, "quantity", Value::Decimal(quantity))
            .await?;
        source
            .set_attribute(item, "listed", Value::from(false))
            .await?;

        let unit_record = source.insert("Unit").await?;
        source
            .set_attribute(unit_record, "name", Value::from(unit))
            .await?;
        source.set_to_one(item, "unit", unit_record).await?;

        let shelf_record = source.insert("Shelf").await?;
        source
            .set_attribute(shelf_record, "location", Value::from(shelf))
            .await?;
        source.set_to_one(item, "shelf", shelf_record).await?;

        for tag in tags {
            let tag_record = source.insert("Tag").await?;
            source
                .set_attribute(tag_record, "label", Value::from(*tag))
                .await?;
            source.append_to_many(item, "tags", tag_record).await?;
        }
    }
    source.commit().await?;
    info!("seeded in-memory source store");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load("deepgraft")?;
    let filter = settings
        .log_filter
        .clone()
        .unwrap_or_else(|| "deepgraft=info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let catalog = Arc::new(pantry_catalog()?);

    let (source_mode, source_read_only) = match &settings.source_store {
        Some(path) => (PersistenceMode::OnDisk(path.clone()), true),
        None => (PersistenceMode::InMemory, false),
    };
    let source = StoreContext::spawn(Store::open(
        "source",
        Arc::clone(&catalog),
        source_mode,
        source_read_only,
    )?);
    if !source_read_only && source.object_count("Item").await? == 0 {
        seed_pantry(&source).await?;
    }

    let target_mode = match &settings.target_store {
        Some(path) => PersistenceMode::OnDisk(path.clone()),
        None => PersistenceMode::InMemory,
    };
    let target = StoreContext::spawn(Store::open(
        "target",
        Arc::clone(&catalog),
        target_mode,
        false,
    )?);

    if target.metadata_get(DEFAULT_DATA_IMPORTED).await?.as_deref() == Some("true") {
        info!("default data import is not required");
        return Ok(());
    }

    let copier = DeepCopier::new(
        Arc::clone(&catalog),
        source.clone(),
        target.clone(),
    );
    let mut events = copier.reporter().subscribe();
    let progress = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!(?event, "progress");
        }
    });

    let entities: Vec<String> = if settings.entities.is_empty() {
        ["Item", "Unit", "Shelf", "Tag"]
            .iter()
            .map(|e| (*e).to_owned())
            .collect()
    } else {
        settings.entities.clone()
    };
    let entity_refs: Vec<&str> = entities.iter().map(String::as_str).collect();
    let report = copier.copy_entities(&entity_refs).await?;

    target.metadata_set(DEFAULT_DATA_IMPORTED, "true").await?;
    drop(copier);
    let _ = progress.await;

    println!(
        "{}",
        serde_json::to_string_pretty(&report)
            .map_err(|e| GraftError::Store(e.to_string()))?
    );
    Ok(())
}

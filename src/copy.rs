//! The deep-copy engine.
//!
//! Copies every record of the requested entity types, together with all
//! reachable relationships, from a source store into a target store.
//! Target records are obtained through the uniqueness resolver rather
//! than plainly inserted, so running the same copy twice leaves the
//! target unchanged. Memory stays bounded: after each record the target store
//! is committed and the records involved are evicted, keeping only the
//! current frontier of the graph in memory.

use std::collections::HashSet;
use std::sync::Arc;

use async_recursion::async_recursion;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::context::StoreContext;
use crate::error::{GraftError, Result};
use crate::record::{AttributeMap, KeyTuple, OtherHasher, RecordId};
use crate::resolve::UniquenessResolver;
use crate::schema::{Catalog, RelationshipDescriptor};

/// Coarse progress signals, delivered at least once. Consumers should
/// treat them as "some data changed, look again" hints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum CopyEvent {
    EntityTypeCopied { entity: String, copied: u64 },
    Completed,
}

/// A broadcast bus for [`CopyEvent`]s, scoped to one engine.
pub struct Reporter {
    tx: broadcast::Sender<CopyEvent>,
}

impl Reporter {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }
    pub fn subscribe(&self) -> broadcast::Receiver<CopyEvent> {
        self.tx.subscribe()
    }
    fn emit(&self, event: CopyEvent) {
        // nobody listening is fine
        let _ = self.tx.send(event);
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct EntityCount {
    pub entity: String,
    pub copied: u64,
}

/// What a finished copy did: totals plus per-entity counts. Skipped
/// records were reported individually as they were encountered.
#[derive(Clone, Debug, Default, Serialize)]
pub struct CopyReport {
    pub copied: u64,
    pub skipped: u64,
    pub per_entity: Vec<EntityCount>,
}

// (entity, key tuple) pairs whose relationships are being copied higher
// up the current recursion, so cyclic graphs terminate.
type InFlight = HashSet<(String, KeyTuple), OtherHasher>;

pub struct DeepCopier {
    catalog: Arc<Catalog>,
    source: StoreContext,
    target: StoreContext,
    resolver: UniquenessResolver,
    reporter: Reporter,
}

impl DeepCopier {
    pub fn new(catalog: Arc<Catalog>, source: StoreContext, target: StoreContext) -> Self {
        let resolver = UniquenessResolver::new(Arc::clone(&catalog));
        Self {
            catalog,
            source,
            target,
            resolver,
            reporter: Reporter::new(),
        }
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    /// Deep-copy all records of the given entity types, in order, from
    /// the source store into the target store.
    ///
    /// Records whose unique-key value is missing are skipped and counted,
    /// and the copy continues; configuration mistakes (an unknown or
    /// keyless entity type anywhere in the reachable graph) and store
    /// failures abort. On abort, everything committed so far stays in the
    /// target store.
    pub async fn copy_entities(&self, entities: &[&str]) -> Result<CopyReport> {
        self.check_reachable(entities)?;
        let mut report = CopyReport::default();
        for &entity in entities {
            let ids = self.source.query(entity, None, None).await?;
            info!(entity, records = ids.len(), "copying entity type");
            let mut copied = 0u64;
            for source_id in ids {
                let mut in_flight = InFlight::default();
                match self.copy_record(entity, source_id, &mut in_flight).await? {
                    Some(target_id) => {
                        copied += 1;
                        self.target.commit().await?;
                        self.target.evict(target_id).await?;
                        self.source.evict(source_id).await?;
                    }
                    None => report.skipped += 1,
                }
            }
            report.copied += copied;
            report.per_entity.push(EntityCount {
                entity: entity.to_owned(),
                copied,
            });
            self.reporter.emit(CopyEvent::EntityTypeCopied {
                entity: entity.to_owned(),
                copied,
            });
        }
        info!(
            copied = report.copied,
            skipped = report.skipped,
            "deep copy complete"
        );
        self.reporter.emit(CopyEvent::Completed);
        Ok(report)
    }

    // Every requested type, and every type reachable from one through
    // relationships, must be registered and carry a unique key before any
    // record moves. Failing later would leave half a copy behind for a
    // mistake that was knowable up front.
    fn check_reachable(&self, entities: &[&str]) -> Result<()> {
        let mut pending: Vec<String> = entities.iter().map(|e| (*e).to_owned()).collect();
        let mut seen: HashSet<String> = HashSet::new();
        while let Some(entity) = pending.pop() {
            if !seen.insert(entity.clone()) {
                continue;
            }
            let descriptor = self.catalog.descriptor(&entity)?;
            if descriptor.key_attributes().is_none() {
                return Err(GraftError::Config(format!(
                    "entity '{entity}' declares no unique key and cannot be \
                     deduplicated"
                )));
            }
            for relationship in descriptor.relationships() {
                pending.push(relationship.target().to_owned());
            }
        }
        Ok(())
    }

    // Copy one source record: scalar attributes through the resolver,
    // then every declared relationship. Returns the target record, or
    // `None` when the source record had to be skipped.
    async fn copy_record(
        &self,
        entity: &str,
        source_id: RecordId,
        in_flight: &mut InFlight,
    ) -> Result<Option<RecordId>> {
        let Some((key_tuple, key_values, extra)) =
            self.source_identity(entity, source_id).await?
        else {
            warn!(
                entity,
                source_id,
                "source record lacks a unique-key value, skipped"
            );
            return Ok(None);
        };
        let target_id = self
            .resolver
            .find_or_insert(&self.target, entity, &key_values, &extra)
            .await?;
        in_flight.insert((entity.to_owned(), key_tuple));
        let descriptor = self.catalog.descriptor(entity)?;
        for relationship in descriptor.relationships() {
            self.copy_relationship(relationship, source_id, target_id, in_flight)
                .await?;
        }
        Ok(Some(target_id))
    }

    /// Reproduce one relationship of one record on the target side.
    ///
    /// A relationship already present on the target record is never
    /// overwritten. First writer wins, which is what makes re-runs over
    /// the same target store idempotent.
    #[async_recursion]
    async fn copy_relationship(
        &self,
        relationship: &RelationshipDescriptor,
        source_id: RecordId,
        target_id: RecordId,
        in_flight: &mut InFlight,
    ) -> Result<()> {
        if relationship.to_many() {
            self.copy_to_many(relationship, source_id, target_id).await
        } else {
            self.copy_to_one(relationship, source_id, target_id, in_flight)
                .await
        }
    }

    // To-one: ensure the related record exists on the target side, copy
    // its own relationships transitively (cycle-guarded), then link.
    async fn copy_to_one(
        &self,
        relationship: &RelationshipDescriptor,
        source_id: RecordId,
        target_id: RecordId,
        in_flight: &mut InFlight,
    ) -> Result<()> {
        let name = relationship.name();
        if self.target.related_one(target_id, name).await?.is_some() {
            debug!(relationship = name, target_id, "already linked, skipped");
            return Ok(());
        }
        let Some(related_source) = self.source.related_one(source_id, name).await? else {
            // nothing on the source side, nothing to establish
            return Ok(());
        };
        let related_entity = relationship.target();
        let Some((key_tuple, key_values, extra)) =
            self.source_identity(related_entity, related_source).await?
        else {
            warn!(
                entity = related_entity,
                source_id = related_source,
                relationship = name,
                "related record lacks a unique-key value, link skipped"
            );
            return Ok(());
        };
        let related_target = self
            .resolver
            .find_or_insert(&self.target, related_entity, &key_values, &extra)
            .await?;
        let guard = (related_entity.to_owned(), key_tuple);
        if in_flight.insert(guard.clone()) {
            for nested in self.catalog.descriptor(related_entity)?.relationships() {
                self.copy_relationship(nested, related_source, related_target, in_flight)
                    .await?;
            }
            in_flight.remove(&guard);
        }
        self.target.set_to_one(target_id, name, related_target).await?;
        self.target.commit().await?;
        self.target.evict(related_target).await?;
        self.target.evict(target_id).await?;
        self.source.evict(related_source).await?;
        Ok(())
    }

    // To-many: append target equivalents one source element at a time,
    // committing and evicting between elements so at most one related
    // record is in memory. Enumeration order is append order, which is
    // what preserves ordered relationships.
    async fn copy_to_many(
        &self,
        relationship: &RelationshipDescriptor,
        source_id: RecordId,
        target_id: RecordId,
    ) -> Result<()> {
        let name = relationship.name();
        if !self.target.related_many(target_id, name).await?.is_empty() {
            debug!(relationship = name, target_id, "already populated, skipped");
            return Ok(());
        }
        let related_entity = relationship.target();
        for related_source in self.source.related_many(source_id, name).await? {
            let Some((_, key_values, extra)) =
                self.source_identity(related_entity, related_source).await?
            else {
                warn!(
                    entity = related_entity,
                    source_id = related_source,
                    relationship = name,
                    "related record lacks a unique-key value, element skipped"
                );
                continue;
            };
            let related_target = self
                .resolver
                .find_or_insert(&self.target, related_entity, &key_values, &extra)
                .await?;
            self.target
                .append_to_many(target_id, name, related_target)
                .await?;
            self.target.commit().await?;
            self.target.evict(related_target).await?;
            self.source.evict(related_source).await?;
        }
        Ok(())
    }

    // A source record's key tuple, its key values, and its remaining
    // scalar attributes. `None` when any declared key attribute is
    // missing; the caller decides how loudly to skip.
    async fn source_identity(
        &self,
        entity: &str,
        source_id: RecordId,
    ) -> Result<Option<(KeyTuple, AttributeMap, AttributeMap)>> {
        let descriptor = self.catalog.descriptor(entity)?;
        let Some(key_attributes) = descriptor.key_attributes() else {
            return Err(GraftError::Config(format!(
                "entity '{entity}' declares no unique key and cannot be \
                 deduplicated"
            )));
        };
        let mut attributes = self.source.attributes(source_id).await?;
        let Some(key_tuple) = KeyTuple::from_attributes(key_attributes, &attributes) else {
            return Ok(None);
        };
        let mut key_values = AttributeMap::default();
        for key_attribute in key_attributes {
            if let Some(value) = attributes.remove(key_attribute) {
                key_values.insert(key_attribute.clone(), value);
            }
        }
        Ok(Some((key_tuple, key_values, attributes)))
    }
}

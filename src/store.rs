use std::collections::{HashMap, HashSet};
use std::sync::Arc;

// used to keep the two-way mapping between key tuples and record identities
use bimap::BiMap;
// per-type record membership is kept in bitsets
use roaring::RoaringTreemap;

use tracing::{debug, info, warn};

use crate::datatype::Value;
use crate::error::{GraftError, Result};
use crate::persist::{PersistenceMode, Persistor};
use crate::predicate::{Predicate, SortKey};
use crate::record::{
    AttributeMap, IdGenerator, IdHasher, KeyTuple, LinkSlot, OtherHasher, Record, RecordId,
};
use crate::schema::Catalog;

/// Metadata key under which a store records the catalog fingerprint it
/// was created with.
pub const META_SCHEMA_FINGERPRINT: &str = "schema_fingerprint";

/// A typed, queryable collection of records with durable SQLite state and
/// a bounded in-memory working set.
///
/// A `Store` is single-owner by construction: it holds no locks and is
/// meant to be driven from exactly one task queue (see the `context`
/// module). Records live in the working set ("resident") from insert or
/// fault-in until they are evicted; eviction never touches durable state.
pub struct Store {
    label: String,
    catalog: Arc<Catalog>,
    generator: IdGenerator,
    // the in-memory working set
    resident: HashMap<RecordId, Record, IdHasher>,
    // records changed since the last commit
    dirty: HashSet<RecordId, IdHasher>,
    // per-type record membership, resident or not
    membership: HashMap<String, RoaringTreemap, OtherHasher>,
    // per-type key tuple <-> identity, for keyed lookups without a scan
    keys: HashMap<String, BiMap<KeyTuple, RecordId>, OtherHasher>,
    // responsible for the persistence layer
    persistor: Persistor,
    read_only: bool,
}

impl Store {
    /// Open a store against the given persistence mode, restoring the
    /// in-memory indexes from any existing durable state.
    ///
    /// A store stamps the catalog fingerprint into its metadata when
    /// created; opening it later under a different catalog fails with a
    /// store error (migration is a capability outside this crate).
    pub fn open(
        label: &str,
        catalog: Arc<Catalog>,
        mode: PersistenceMode,
        read_only: bool,
    ) -> Result<Store> {
        catalog.validate()?;
        let persistor = Persistor::new(&mode, read_only)?;
        let mut store = Store {
            label: label.to_owned(),
            catalog,
            generator: IdGenerator::new(),
            resident: HashMap::default(),
            dirty: HashSet::default(),
            membership: HashMap::default(),
            keys: HashMap::default(),
            persistor,
            read_only,
        };

        let fingerprint = store.catalog.fingerprint();
        match store.persistor.metadata_get(META_SCHEMA_FINGERPRINT)? {
            Some(existing) if existing != fingerprint => {
                return Err(GraftError::Store(format!(
                    "store '{}' was created under a different schema catalog \
                     and must be migrated before it can be opened",
                    store.label
                )));
            }
            Some(_) => {}
            None => {
                if !read_only {
                    store
                        .persistor
                        .metadata_set(META_SCHEMA_FINGERPRINT, &fingerprint)?;
                }
            }
        }

        store.restore()?;
        info!(
            store = %store.label,
            records = store.membership.values().map(RoaringTreemap::len).sum::<u64>(),
            "store opened"
        );
        Ok(store)
    }

    // Rebuild generator bound, membership bitsets and the key index from
    // durable state.
    fn restore(&mut self) -> Result<()> {
        for (id, entity) in self.persistor.all_records()? {
            if !self.catalog.contains(&entity) {
                warn!(
                    store = %self.label,
                    entity,
                    id,
                    "ignoring persisted record of unregistered entity"
                );
                continue;
            }
            self.generator.retain(id);
            self.membership.entry(entity.clone()).or_default().insert(id);
            self.index_key(&entity, id)?;
        }
        Ok(())
    }

    pub fn label(&self) -> &str {
        &self.label
    }
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }
    /// The number of records currently held in memory.
    pub fn resident_count(&self) -> usize {
        self.resident.len()
    }

    fn writable(&self) -> Result<()> {
        if self.read_only {
            Err(GraftError::Store(format!(
                "store '{}' is read-only",
                self.label
            )))
        } else {
            Ok(())
        }
    }

    fn entity_of(&self, id: RecordId) -> Result<String> {
        if let Some(record) = self.resident.get(&id) {
            return Ok(record.entity().to_owned());
        }
        for (entity, members) in &self.membership {
            if members.contains(id) {
                return Ok(entity.clone());
            }
        }
        Err(GraftError::Invariant(format!(
            "record {id} does not exist in store '{}'",
            self.label
        )))
    }

    // Make a record resident, loading it from durable state if needed.
    fn fault_in(&mut self, id: RecordId) -> Result<()> {
        if self.resident.contains_key(&id) {
            return Ok(());
        }
        let record = self
            .persistor
            .load_record(&self.catalog, id)?
            .ok_or_else(|| {
                GraftError::Invariant(format!(
                    "record {id} does not exist in store '{}'",
                    self.label
                ))
            })?;
        debug!(store = %self.label, id, "faulted record in");
        self.resident.insert(id, record);
        Ok(())
    }

    // Keep the key index in step with a record's current key attributes.
    // Incomplete tuples are not indexed; duplicate tuples keep the first
    // indexed record and are reported, not rejected. Deduplication is
    // the copy engine's job, not the store's.
    fn index_key(&mut self, entity: &str, id: RecordId) -> Result<()> {
        let catalog = Arc::clone(&self.catalog);
        let Some(key_attributes) = catalog.descriptor(entity)?.key_attributes() else {
            return Ok(());
        };
        let attributes = self.attributes(id)?;
        let index = self.keys.entry(entity.to_owned()).or_default();
        index.remove_by_right(&id);
        if let Some(tuple) = KeyTuple::from_attributes(key_attributes, &attributes) {
            if let Err((tuple, _)) = index.insert_no_overwrite(tuple, id) {
                warn!(
                    store = %self.label,
                    entity,
                    id,
                    key = %tuple,
                    "another record already carries this key tuple"
                );
            }
        }
        Ok(())
    }

    /// Insert a fresh, empty record of a registered entity type. The
    /// record is resident and uncommitted until the next commit.
    pub fn insert(&mut self, entity: &str) -> Result<RecordId> {
        self.writable()?;
        self.catalog.descriptor(entity)?;
        let id = self.generator.generate();
        self.membership.entry(entity.to_owned()).or_default().insert(id);
        self.resident.insert(id, Record::new(id, entity));
        self.dirty.insert(id);
        debug!(store = %self.label, entity, id, "inserted record");
        Ok(id)
    }

    /// Set one attribute, validated against the catalog: the name must be
    /// declared on the record's entity and the value kind must match.
    pub fn set_attribute(&mut self, id: RecordId, name: &str, value: Value) -> Result<()> {
        self.writable()?;
        let entity = self.entity_of(id)?;
        let catalog = Arc::clone(&self.catalog);
        let descriptor = catalog.descriptor(&entity)?;
        let Some(kind) = descriptor.attribute_kind(name) else {
            return Err(GraftError::Config(format!(
                "entity '{entity}' declares no attribute '{name}'"
            )));
        };
        if value.kind() != kind {
            return Err(GraftError::Config(format!(
                "attribute '{entity}.{name}' is declared {} but was given a {} value",
                kind,
                value.kind()
            )));
        }
        self.fault_in(id)?;
        let record = self.resident.get_mut(&id).ok_or_else(|| {
            GraftError::Invariant(format!("record {id} vanished from the working set"))
        })?;
        record.set_attribute(name, value);
        self.dirty.insert(id);
        let keyed = descriptor
            .key_attributes()
            .is_some_and(|keys| keys.iter().any(|k| k == name));
        if keyed {
            self.index_key(&entity, id)?;
        }
        Ok(())
    }

    /// Read one attribute. Non-resident records are read through from
    /// durable state without joining the working set.
    pub fn attribute(&self, id: RecordId, name: &str) -> Result<Option<Value>> {
        if let Some(record) = self.resident.get(&id) {
            return Ok(record.attribute(name).cloned());
        }
        self.entity_of(id)?;
        Ok(self
            .persistor
            .load_attributes(id)?
            .and_then(|mut attributes| attributes.remove(name)))
    }

    /// Read every attribute of a record, read-through like [`attribute`].
    ///
    /// [`attribute`]: Store::attribute
    pub fn attributes(&self, id: RecordId) -> Result<AttributeMap> {
        if let Some(record) = self.resident.get(&id) {
            return Ok(record.attributes().clone());
        }
        self.entity_of(id)?;
        Ok(self.persistor.load_attributes(id)?.unwrap_or_default())
    }

    /// Point a to-one relationship at a target record, which must exist
    /// and be of the declared target type.
    pub fn set_to_one(&mut self, id: RecordId, name: &str, target: RecordId) -> Result<()> {
        self.writable()?;
        let entity = self.entity_of(id)?;
        let catalog = Arc::clone(&self.catalog);
        let relationship = catalog
            .descriptor(&entity)?
            .relationship(name)
            .ok_or_else(|| {
                GraftError::Config(format!(
                    "entity '{entity}' declares no relationship '{name}'"
                ))
            })?;
        if relationship.to_many() {
            return Err(GraftError::Config(format!(
                "relationship '{entity}.{name}' is to-many; append instead"
            )));
        }
        self.check_link_target(relationship.target(), target)?;
        self.fault_in(id)?;
        let record = self.resident.get_mut(&id).ok_or_else(|| {
            GraftError::Invariant(format!("record {id} vanished from the working set"))
        })?;
        record.set_to_one(name, target);
        self.dirty.insert(id);
        Ok(())
    }

    /// Append a target to a to-many relationship. Appending a target that
    /// is already linked is a no-op; ordered relationships keep strict
    /// append order.
    pub fn append_to_many(&mut self, id: RecordId, name: &str, target: RecordId) -> Result<()> {
        self.writable()?;
        let entity = self.entity_of(id)?;
        let catalog = Arc::clone(&self.catalog);
        let relationship = catalog
            .descriptor(&entity)?
            .relationship(name)
            .ok_or_else(|| {
                GraftError::Config(format!(
                    "entity '{entity}' declares no relationship '{name}'"
                ))
            })?;
        if !relationship.to_many() {
            return Err(GraftError::Config(format!(
                "relationship '{entity}.{name}' is to-one; set it instead"
            )));
        }
        self.check_link_target(relationship.target(), target)?;
        self.fault_in(id)?;
        let ordered = relationship.ordered();
        let record = self.resident.get_mut(&id).ok_or_else(|| {
            GraftError::Invariant(format!("record {id} vanished from the working set"))
        })?;
        if record.append_to_many(name, target, ordered) {
            self.dirty.insert(id);
        } else {
            debug!(
                store = %self.label,
                id,
                relationship = name,
                target,
                "target already linked, append skipped"
            );
        }
        Ok(())
    }

    fn check_link_target(&self, target_entity: &str, target: RecordId) -> Result<()> {
        let member = self
            .membership
            .get(target_entity)
            .is_some_and(|members| members.contains(target));
        if member {
            Ok(())
        } else {
            Err(GraftError::Invariant(format!(
                "link target {target} is not a known '{target_entity}' record \
                 in store '{}'",
                self.label
            )))
        }
    }

    /// The target of a to-one relationship, or `None` when unset.
    pub fn related_one(&self, id: RecordId, name: &str) -> Result<Option<RecordId>> {
        let entity = self.entity_of(id)?;
        self.catalog.descriptor(&entity)?.relationship(name).ok_or_else(|| {
            GraftError::Config(format!(
                "entity '{entity}' declares no relationship '{name}'"
            ))
        })?;
        if let Some(record) = self.resident.get(&id) {
            return Ok(match record.link(name) {
                Some(LinkSlot::One(target)) => Some(*target),
                _ => None,
            });
        }
        Ok(self.persistor.load_link_targets(id, name)?.first().copied())
    }

    /// The targets of a to-many relationship, in stored order. Empty when
    /// the relationship has never been populated.
    pub fn related_many(&self, id: RecordId, name: &str) -> Result<Vec<RecordId>> {
        let entity = self.entity_of(id)?;
        self.catalog.descriptor(&entity)?.relationship(name).ok_or_else(|| {
            GraftError::Config(format!(
                "entity '{entity}' declares no relationship '{name}'"
            ))
        })?;
        if let Some(record) = self.resident.get(&id) {
            return Ok(match record.link(name) {
                Some(LinkSlot::Many { targets, .. }) => targets.clone(),
                Some(LinkSlot::One(target)) => vec![*target],
                None => Vec::new(),
            });
        }
        self.persistor.load_link_targets(id, name)
    }

    /// All records of a type matching an optional predicate, in identity
    /// order unless a sort key is given. A complete key-equality
    /// conjunction is answered from the key index; anything else
    /// evaluates against each record's attributes, resident or not.
    pub fn query(
        &self,
        entity: &str,
        predicate: Option<&Predicate>,
        sort: Option<&SortKey>,
    ) -> Result<Vec<RecordId>> {
        let descriptor = self.catalog.descriptor(entity)?;
        let Some(members) = self.membership.get(entity) else {
            return Ok(Vec::new());
        };
        if sort.is_none() {
            if let Some(predicate) = predicate {
                if let Some(tuple) = predicate.as_key_tuple(descriptor.key_attributes()) {
                    if let Some(id) =
                        self.keys.get(entity).and_then(|index| index.get_by_left(&tuple))
                    {
                        return Ok(vec![*id]);
                    }
                    // not indexed: the tuple may belong to no record at all, or
                    // to one with an incomplete key, so fall through to the scan
                }
            }
        }
        let mut hits = Vec::new();
        for id in members.iter() {
            match predicate {
                None => hits.push(id),
                Some(predicate) => {
                    if predicate.matches(&self.attributes(id)?) {
                        hits.push(id);
                    }
                }
            }
        }
        if let Some(sort) = sort {
            let mut keyed = Vec::with_capacity(hits.len());
            for id in hits {
                keyed.push((self.attribute(id, sort.attribute())?, id));
            }
            keyed.sort_by(|a, b| a.0.cmp(&b.0));
            if !sort.is_ascending() {
                keyed.reverse();
            }
            hits = keyed.into_iter().map(|(_, id)| id).collect();
        }
        Ok(hits)
    }

    /// The number of records of one entity type, resident or not.
    pub fn object_count(&self, entity: &str) -> Result<u64> {
        self.catalog.descriptor(entity)?;
        let count = self
            .membership
            .get(entity)
            .map_or(0, RoaringTreemap::len);
        debug!(store = %self.label, entity, count, "object count");
        Ok(count)
    }

    /// Write all uncommitted changes to durable state in one transaction.
    /// With no changes pending this is a no-op, even on a read-only store.
    pub fn commit(&mut self) -> Result<()> {
        if self.dirty.is_empty() {
            debug!(store = %self.label, "skipped commit, no changes");
            return Ok(());
        }
        self.writable()?;
        let mut ids: Vec<RecordId> = self.dirty.iter().copied().collect();
        ids.sort_unstable();
        let mut records = Vec::with_capacity(ids.len());
        for id in &ids {
            records.push(self.resident.get(id).ok_or_else(|| {
                GraftError::Invariant(format!(
                    "dirty record {id} is not resident in store '{}'",
                    self.label
                ))
            })?);
        }
        self.persistor.commit_batch(&records)?;
        info!(store = %self.label, records = records.len(), "committed");
        self.dirty.clear();
        Ok(())
    }

    /// Drop the in-memory copy of a record, keeping its durable state.
    /// A record with uncommitted changes is retained and the refusal
    /// logged; evicting it would lose data.
    pub fn evict(&mut self, id: RecordId) {
        if self.dirty.contains(&id) {
            debug!(
                store = %self.label,
                id,
                "eviction skipped, record has uncommitted changes"
            );
            return;
        }
        if self.resident.remove(&id).is_some() {
            debug!(store = %self.label, id, "evicted record");
        }
    }

    pub fn metadata_get(&self, key: &str) -> Result<Option<String>> {
        self.persistor.metadata_get(key)
    }
    pub fn metadata_set(&mut self, key: &str, value: &str) -> Result<()> {
        self.writable()?;
        self.persistor.metadata_set(key, value)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "Store('{}', resident {}, dirty {})",
            self.label,
            self.resident.len(),
            self.dirty.len()
        )
    }
}

// other keepers use HashSet or HashMap
use core::hash::BuildHasherDefault;
use std::collections::HashMap;
use std::fmt;
use seahash::SeaHasher;

use crate::datatype::Value;

// ------------- RecordId -------------
// Identities are store-local. Two records in different stores never share
// an identity; cross-store equivalence is decided by key tuples alone.
pub type RecordId = u64;

pub type IdHasher = BuildHasherDefault<SeaHasher>;
pub type OtherHasher = BuildHasherDefault<SeaHasher>;

pub const GENESIS: RecordId = 0;

/// Attribute maps as handed around between stores and the copy engine.
pub type AttributeMap = HashMap<String, Value, OtherHasher>;

#[derive(Debug)]
pub struct IdGenerator {
    lower_bound: RecordId,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            lower_bound: GENESIS,
        }
    }
    // Identities may be explicitly referenced, but only implicitly created.
    // The retain function is necessary when restoring an existing
    // persisted store.
    pub fn retain(&mut self, id: RecordId) {
        if id > self.lower_bound {
            self.lower_bound = id;
        }
    }
    pub fn generate(&mut self) -> RecordId {
        self.lower_bound += 1;
        self.lower_bound
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

// ------------- LinkSlot -------------
/// The materialized state of one relationship on one record.
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum LinkSlot {
    One(RecordId),
    Many { ordered: bool, targets: Vec<RecordId> },
}

impl LinkSlot {
    pub fn is_empty(&self) -> bool {
        match self {
            LinkSlot::One(_) => false,
            LinkSlot::Many { targets, .. } => targets.is_empty(),
        }
    }
}

// ------------- Record -------------
/// An in-memory ("resident") representation of one stored record: a typed
/// bag of attribute values plus relationship links. Residency is
/// transient; a record can be evicted after commit and faulted back in
/// from durable state on the next access.
#[derive(Clone, Debug)]
pub struct Record {
    id: RecordId,
    entity: String,
    attributes: AttributeMap,
    links: HashMap<String, LinkSlot, OtherHasher>,
}

impl Record {
    pub fn new(id: RecordId, entity: &str) -> Self {
        Self {
            id,
            entity: entity.to_owned(),
            attributes: AttributeMap::default(),
            links: HashMap::default(),
        }
    }
    pub fn id(&self) -> RecordId {
        self.id
    }
    pub fn entity(&self) -> &str {
        &self.entity
    }
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }
    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }
    // Validation against the catalog happens in the store, which is the
    // only place records are mutated.
    pub fn set_attribute(&mut self, name: &str, value: Value) {
        self.attributes.insert(name.to_owned(), value);
    }
    pub fn link(&self, name: &str) -> Option<&LinkSlot> {
        self.links.get(name)
    }
    pub fn links(&self) -> impl Iterator<Item = (&str, &LinkSlot)> {
        self.links.iter().map(|(n, l)| (n.as_str(), l))
    }
    pub fn set_to_one(&mut self, name: &str, target: RecordId) {
        self.links.insert(name.to_owned(), LinkSlot::One(target));
    }
    /// Append to a to-many link slot. Unordered slots have set semantics:
    /// appending an already-linked target is a no-op. Ordered slots keep
    /// strict append order and likewise refuse duplicates.
    /// Returns whether the target was actually added.
    pub fn append_to_many(&mut self, name: &str, target: RecordId, ordered: bool) -> bool {
        let slot = self
            .links
            .entry(name.to_owned())
            .or_insert(LinkSlot::Many {
                ordered,
                targets: Vec::new(),
            });
        match slot {
            LinkSlot::Many { targets, .. } => {
                if targets.contains(&target) {
                    false
                } else {
                    targets.push(target);
                    true
                }
            }
            LinkSlot::One(_) => false,
        }
    }
    pub fn restore_link(&mut self, name: &str, slot: LinkSlot) {
        self.links.insert(name.to_owned(), slot);
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}#{}", self.entity, self.id)
    }
}

// ------------- KeyTuple -------------
/// The values of a record's declared unique-key attributes, in declared
/// key order. Two records in different stores represent the same
/// real-world object exactly when their key tuples are equal.
#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub struct KeyTuple(Vec<Value>);

impl KeyTuple {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }
    /// Build the tuple for a record from its attribute map, or `None`
    /// when any declared key attribute is missing.
    pub fn from_attributes(
        key_attributes: &[String],
        attributes: &AttributeMap,
    ) -> Option<KeyTuple> {
        let mut values = Vec::with_capacity(key_attributes.len());
        for key_attribute in key_attributes {
            values.push(attributes.get(key_attribute)?.clone());
        }
        Some(KeyTuple(values))
    }
    pub fn values(&self) -> &[Value] {
        &self.0
    }
}

impl fmt::Display for KeyTuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut parts = String::new();
        for value in &self.0 {
            parts += &(value.to_string() + "|");
        }
        parts.pop();
        write!(f, "({})", parts)
    }
}

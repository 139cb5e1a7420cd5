// the catalog holds few entries, so the default hasher is not a big deal here
use std::collections::HashMap;
use std::fmt;

use crate::datatype::ValueKind;
use crate::error::{GraftError, Result};

/// A named, typed attribute of an entity.
#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub struct AttributeDescriptor {
    name: String,
    kind: ValueKind,
}

impl AttributeDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn kind(&self) -> ValueKind {
        self.kind
    }
}

/// A named, directional relationship from one entity type to another.
///
/// `ordered` is only meaningful when `to_many` is set; an ordered to-many
/// relationship reproduces source-side enumeration order on the target side.
#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub struct RelationshipDescriptor {
    name: String,
    target: String,
    to_many: bool,
    ordered: bool,
}

impl RelationshipDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn target(&self) -> &str {
        &self.target
    }
    pub fn to_many(&self) -> bool {
        self.to_many
    }
    pub fn ordered(&self) -> bool {
        self.ordered
    }
}

/// Everything the engine knows about one entity type: its attributes,
/// its relationships, and which attributes form its declared unique key.
///
/// Descriptors are registered with a [`Catalog`] before any store using
/// them is opened. There is no runtime reflection; a type without a
/// registered descriptor does not exist as far as the engine is concerned.
#[derive(Clone, Debug)]
pub struct EntityDescriptor {
    name: String,
    attributes: Vec<AttributeDescriptor>,
    unique_key: Vec<String>,
    relationships: Vec<RelationshipDescriptor>,
}

impl EntityDescriptor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            attributes: Vec::new(),
            unique_key: Vec::new(),
            relationships: Vec::new(),
        }
    }
    pub fn attribute(mut self, name: &str, kind: ValueKind) -> Self {
        self.attributes.push(AttributeDescriptor {
            name: name.to_owned(),
            kind,
        });
        self
    }
    /// Declare the unique key as an ordered list of attribute names.
    pub fn unique_key(mut self, attributes: &[&str]) -> Self {
        self.unique_key = attributes.iter().map(|a| (*a).to_owned()).collect();
        self
    }
    pub fn to_one(mut self, name: &str, target: &str) -> Self {
        self.relationships.push(RelationshipDescriptor {
            name: name.to_owned(),
            target: target.to_owned(),
            to_many: false,
            ordered: false,
        });
        self
    }
    pub fn to_many(mut self, name: &str, target: &str, ordered: bool) -> Self {
        self.relationships.push(RelationshipDescriptor {
            name: name.to_owned(),
            target: target.to_owned(),
            to_many: true,
            ordered,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn attributes(&self) -> &[AttributeDescriptor] {
        &self.attributes
    }
    pub fn attribute_kind(&self, name: &str) -> Option<ValueKind> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.kind)
    }
    /// The declared unique key, or `None` when the type has not declared
    /// one (such types are not eligible for deduplicated deep copy).
    pub fn key_attributes(&self) -> Option<&[String]> {
        if self.unique_key.is_empty() {
            None
        } else {
            Some(&self.unique_key)
        }
    }
    pub fn relationships(&self) -> &[RelationshipDescriptor] {
        &self.relationships
    }
    pub fn relationship(&self, name: &str) -> Option<&RelationshipDescriptor> {
        self.relationships.iter().find(|r| r.name == name)
    }

    // Local consistency: key attributes must exist and be key-eligible,
    // names must not collide.
    fn check(&self) -> Result<()> {
        for (i, attribute) in self.attributes.iter().enumerate() {
            if self.attributes[..i].iter().any(|a| a.name == attribute.name) {
                return Err(GraftError::Config(format!(
                    "entity '{}' declares attribute '{}' twice",
                    self.name, attribute.name
                )));
            }
        }
        for (i, relationship) in self.relationships.iter().enumerate() {
            if self.relationships[..i]
                .iter()
                .any(|r| r.name == relationship.name)
            {
                return Err(GraftError::Config(format!(
                    "entity '{}' declares relationship '{}' twice",
                    self.name, relationship.name
                )));
            }
        }
        for key_attribute in &self.unique_key {
            match self.attribute_kind(key_attribute) {
                None => {
                    return Err(GraftError::Config(format!(
                        "entity '{}' keys on unknown attribute '{}'",
                        self.name, key_attribute
                    )));
                }
                Some(kind) if !kind.key_eligible() => {
                    return Err(GraftError::Config(format!(
                        "entity '{}' keys on attribute '{}' of kind {}, \
                         which cannot be used for identity matching",
                        self.name, key_attribute, kind
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// The schema catalog: one descriptor per registered entity type.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    entities: HashMap<String, EntityDescriptor>,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
        }
    }
    pub fn register(&mut self, descriptor: EntityDescriptor) -> Result<()> {
        descriptor.check()?;
        if self.entities.contains_key(descriptor.name()) {
            return Err(GraftError::Config(format!(
                "entity '{}' is already registered",
                descriptor.name()
            )));
        }
        self.entities.insert(descriptor.name().to_owned(), descriptor);
        Ok(())
    }
    /// Cross-entity consistency: every relationship target must itself
    /// be a registered entity. Called once the catalog is complete.
    pub fn validate(&self) -> Result<()> {
        for descriptor in self.entities.values() {
            for relationship in descriptor.relationships() {
                if !self.entities.contains_key(relationship.target()) {
                    return Err(GraftError::Config(format!(
                        "relationship '{}.{}' targets unregistered entity '{}'",
                        descriptor.name(),
                        relationship.name(),
                        relationship.target()
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn descriptor(&self, entity: &str) -> Result<&EntityDescriptor> {
        self.entities.get(entity).ok_or_else(|| {
            GraftError::Config(format!("entity '{entity}' is not registered"))
        })
    }
    pub fn contains(&self, entity: &str) -> bool {
        self.entities.contains_key(entity)
    }
    pub fn entity_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entities.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// A stable fingerprint over every registered descriptor, recorded in
    /// store metadata at creation and compared on open. Two catalogs with
    /// the same entities, attributes, keys and relationships fingerprint
    /// identically regardless of registration order.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for name in self.entity_names() {
            let descriptor = &self.entities[name];
            hasher.update(descriptor.name().as_bytes());
            hasher.update(&[0]);
            for attribute in descriptor.attributes() {
                hasher.update(attribute.name().as_bytes());
                hasher.update(&[attribute.kind().uid()]);
            }
            hasher.update(&[1]);
            for key_attribute in descriptor.key_attributes().unwrap_or(&[]) {
                hasher.update(key_attribute.as_bytes());
                hasher.update(&[2]);
            }
            for relationship in descriptor.relationships() {
                hasher.update(relationship.name().as_bytes());
                hasher.update(&[3]);
                hasher.update(relationship.target().as_bytes());
                hasher.update(&[
                    relationship.to_many() as u8,
                    relationship.ordered() as u8,
                ]);
            }
            hasher.update(&[4]);
        }
        hasher.finalize().to_hex().to_string()
    }
}

impl fmt::Display for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Catalog[{}]", self.entity_names().join(", "))
    }
}

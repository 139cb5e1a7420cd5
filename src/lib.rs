//! Deepgraft – a deduplicating deep-copy engine for typed record stores.
//!
//! Deepgraft moves a graph of entity records (scalar attributes plus
//! to-one, to-many and ordered to-many relationships) from one store
//! into another without ever loading the whole graph into memory and
//! without ever creating a duplicate:
//! * A [`record::Record`] is a typed bag of attribute values and
//!   relationship links, identified within its store by a
//!   [`record::RecordId`].
//! * A [`schema::Catalog`] describes every entity type up front: its
//!   attributes, its relationships, and the attribute set that forms its
//!   declared unique key. There is no runtime reflection.
//! * A [`record::KeyTuple`], the values of a record's unique-key
//!   attributes, is the only notion of identity that crosses store
//!   boundaries.
//! * The [`resolve::UniquenessResolver`] finds-or-inserts records by key
//!   tuple, so equivalents are shared rather than duplicated.
//! * The [`copy::DeepCopier`] walks the requested entity types record by
//!   record, reproduces each relationship on the target side, and
//!   commits and evicts as it goes, keeping the working set to the
//!   current frontier of the graph.
//!
//! ## Modules
//! * [`schema`] – Entity descriptors and the catalog.
//! * [`datatype`] – Tagged attribute values (text, integer, decimal,
//!   boolean, bytes, instant).
//! * [`record`] – Records, identities, link slots, key tuples.
//! * [`predicate`] – Equality predicates combinable with and/or/not.
//! * [`store`] – The record store: working set, indexes, commit, evict.
//! * [`persist`] – SQLite persistence & restoration layer.
//! * [`context`] – Queue-confined store handles (one dispatch thread per
//!   store).
//! * [`resolve`] – Find-or-insert by declared unique key.
//! * [`copy`] – The deep-copy engine, relationship copier and progress
//!   reporting.
//! * [`settings`] – Configuration for the import binary.
//!
//! ## Concurrency
//! A store is never shared: it is owned by one dispatch thread and
//! reached only through its [`context::StoreContext`] handle, so all
//! operations against one store execute in submission order. A deep copy
//! holds one handle per store and hops between the two queues; progress
//! is published on a broadcast bus that subscribers drain from their own
//! tasks.
//!
//! ## Quick Start
//! ```no_run
//! use std::sync::Arc;
//! use deepgraft::context::StoreContext;
//! use deepgraft::copy::DeepCopier;
//! use deepgraft::datatype::ValueKind;
//! use deepgraft::persist::PersistenceMode;
//! use deepgraft::schema::{Catalog, EntityDescriptor};
//! use deepgraft::store::Store;
//!
//! # #[tokio::main]
//! # async fn main() -> deepgraft::error::Result<()> {
//! let mut catalog = Catalog::new();
//! catalog.register(
//!     EntityDescriptor::new("Item")
//!         .attribute("name", ValueKind::Text)
//!         .unique_key(&["name"])
//!         .to_one("unit", "Unit"),
//! )?;
//! catalog.register(
//!     EntityDescriptor::new("Unit")
//!         .attribute("name", ValueKind::Text)
//!         .unique_key(&["name"]),
//! )?;
//! let catalog = Arc::new(catalog);
//! let source = StoreContext::spawn(Store::open(
//!     "source", Arc::clone(&catalog), PersistenceMode::InMemory, false,
//! )?);
//! let target = StoreContext::spawn(Store::open(
//!     "target", Arc::clone(&catalog), PersistenceMode::InMemory, false,
//! )?);
//! let copier = DeepCopier::new(catalog, source, target);
//! let report = copier.copy_entities(&["Item", "Unit"]).await?;
//! assert_eq!(report.skipped, 0);
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod copy;
pub mod datatype;
pub mod error;
pub mod persist;
pub mod predicate;
pub mod record;
pub mod resolve;
pub mod schema;
pub mod settings;
pub mod store;

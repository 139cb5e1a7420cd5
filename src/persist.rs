// used for persistence
use rusqlite::{Connection, Error, OpenFlags, params};
use std::path::PathBuf;

use crate::datatype::{Value, ValueKind};
use crate::error::Result;
use crate::record::{AttributeMap, LinkSlot, Record, RecordId};
use crate::schema::Catalog;

/// Where a store's durable state lives.
#[derive(Clone, Debug)]
pub enum PersistenceMode {
    InMemory,
    OnDisk(PathBuf),
}

// ------------- Persistence -------------
/// SQLite-backed durable state for one store. Resident records are
/// written out on commit and read back when a non-resident record is
/// faulted in or inspected.
pub struct Persistor {
    db: Connection,
}

impl Persistor {
    pub fn new(mode: &PersistenceMode, read_only: bool) -> Result<Persistor> {
        let db = match mode {
            PersistenceMode::InMemory => Connection::open_in_memory()?,
            PersistenceMode::OnDisk(path) if read_only => Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?,
            PersistenceMode::OnDisk(path) => Connection::open(path)?,
        };
        // A read-only on-disk store must already carry its tables; everything
        // else gets them created on open.
        if !(read_only && matches!(mode, PersistenceMode::OnDisk(_))) {
            db.execute_batch(
                "
            create table if not exists Record (
                Record_Identity integer not null,
                Entity text not null,
                constraint unique_and_referenceable_Record_Identity primary key (
                    Record_Identity
                )
            );
            create table if not exists Attribute (
                Record_Identity integer not null,
                Attribute text not null,
                AppearingValue any null,
                ValueKind_Identity integer not null,
                constraint Attribute_of_Record foreign key (
                    Record_Identity
                ) references Record(Record_Identity),
                constraint unique_Attribute primary key (
                    Record_Identity,
                    Attribute
                )
            );
            create table if not exists Link (
                Source_Identity integer not null,
                Relationship text not null,
                Target_Identity integer not null,
                Position integer not null,
                constraint Source_is_Record foreign key (
                    Source_Identity
                ) references Record(Record_Identity),
                constraint Target_is_Record foreign key (
                    Target_Identity
                ) references Record(Record_Identity),
                constraint unique_Link primary key (
                    Source_Identity,
                    Relationship,
                    Target_Identity
                )
            );
            create table if not exists Metadata (
                Key text not null,
                Value text not null,
                constraint unique_Key primary key (
                    Key
                )
            );
            ",
            )?;
        }
        Ok(Persistor { db })
    }

    /// Write a batch of records inside one transaction. Attribute and
    /// link rows are replaced wholesale per record; the record row itself
    /// is inserted on first commit and left alone afterwards.
    pub fn commit_batch(&mut self, records: &[&Record]) -> Result<()> {
        let tx = self.db.transaction()?;
        for record in records {
            let mut add_record = tx.prepare_cached(
                "
                insert or ignore into Record (
                    Record_Identity,
                    Entity
                ) values (?, ?)
            ",
            )?;
            add_record.execute(params![record.id(), record.entity()])?;

            let mut clear_attributes = tx.prepare_cached(
                "
                delete from Attribute
                    where Record_Identity = ?
            ",
            )?;
            clear_attributes.execute(params![record.id()])?;

            let mut add_attribute = tx.prepare_cached(
                "
                insert into Attribute (
                    Record_Identity,
                    Attribute,
                    AppearingValue,
                    ValueKind_Identity
                ) values (?, ?, ?, ?)
            ",
            )?;
            for (name, value) in record.attributes() {
                add_attribute.execute(params![
                    record.id(),
                    name,
                    value,
                    value.kind().uid()
                ])?;
            }

            let mut clear_links = tx.prepare_cached(
                "
                delete from Link
                    where Source_Identity = ?
            ",
            )?;
            clear_links.execute(params![record.id()])?;

            let mut add_link = tx.prepare_cached(
                "
                insert into Link (
                    Source_Identity,
                    Relationship,
                    Target_Identity,
                    Position
                ) values (?, ?, ?, ?)
            ",
            )?;
            for (name, slot) in record.links() {
                match slot {
                    LinkSlot::One(target) => {
                        add_link.execute(params![record.id(), name, target, 0i64])?;
                    }
                    LinkSlot::Many { targets, .. } => {
                        for (position, target) in targets.iter().enumerate() {
                            add_link.execute(params![
                                record.id(),
                                name,
                                target,
                                position as i64
                            ])?;
                        }
                    }
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Every persisted record's identity and entity type, for rebuilding
    /// the in-memory indexes on open.
    pub fn all_records(&self) -> Result<Vec<(RecordId, String)>> {
        let mut all = self.db.prepare_cached(
            "
                select Record_Identity, Entity
                    from Record
            ",
        )?;
        let rows = all.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Fault a full record back in from durable state.
    pub fn load_record(&self, catalog: &Catalog, id: RecordId) -> Result<Option<Record>> {
        let mut get_record = self.db.prepare_cached(
            "
                select Entity
                    from Record
                    where Record_Identity = ?
            ",
        )?;
        let entity: String = match get_record.query_row(params![id], |row| row.get(0)) {
            Ok(entity) => entity,
            Err(Error::QueryReturnedNoRows) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let mut record = Record::new(id, &entity);
        if let Some(attributes) = self.load_attributes(id)? {
            for (name, value) in attributes {
                record.set_attribute(&name, value);
            }
        }
        let descriptor = catalog.descriptor(&entity)?;
        for relationship in descriptor.relationships() {
            let targets = self.load_link_targets(id, relationship.name())?;
            if targets.is_empty() {
                continue;
            }
            if relationship.to_many() {
                record.restore_link(
                    relationship.name(),
                    LinkSlot::Many {
                        ordered: relationship.ordered(),
                        targets,
                    },
                );
            } else {
                record.restore_link(relationship.name(), LinkSlot::One(targets[0]));
            }
        }
        Ok(Some(record))
    }

    /// The persisted attributes of one record, without faulting it in.
    /// `None` means the record does not exist at all.
    pub fn load_attributes(&self, id: RecordId) -> Result<Option<AttributeMap>> {
        let mut get_record = self.db.prepare_cached(
            "
                select Record_Identity
                    from Record
                    where Record_Identity = ?
            ",
        )?;
        match get_record.query_row::<RecordId, _, _>(params![id], |row| row.get(0)) {
            Ok(_) => {}
            Err(Error::QueryReturnedNoRows) => return Ok(None),
            Err(err) => return Err(err.into()),
        }
        let mut all_attributes = self.db.prepare_cached(
            "
                select Attribute, AppearingValue, ValueKind_Identity
                    from Attribute
                    where Record_Identity = ?
            ",
        )?;
        let mut attributes = AttributeMap::default();
        let mut rows = all_attributes.query(params![id])?;
        while let Some(row) = rows.next()? {
            let name: String = row.get(0)?;
            let kind = ValueKind::from_uid(row.get(2)?)?;
            let value = Value::restore(kind, row.get_ref(1)?)?;
            attributes.insert(name, value);
        }
        Ok(Some(attributes))
    }

    /// The persisted targets of one relationship, in position order.
    pub fn load_link_targets(&self, id: RecordId, relationship: &str) -> Result<Vec<RecordId>> {
        let mut get_links = self.db.prepare_cached(
            "
                select Target_Identity
                    from Link
                    where Source_Identity = ?
                    and Relationship = ?
                    order by Position
            ",
        )?;
        let rows = get_links.query_map(params![id, relationship], |row| row.get(0))?;
        let mut targets = Vec::new();
        for row in rows {
            targets.push(row?);
        }
        Ok(targets)
    }

    // Store metadata is written through immediately rather than joining
    // the record commit batch, the same way a coordinator-level metadata
    // change would be.
    pub fn metadata_get(&self, key: &str) -> Result<Option<String>> {
        let mut get_metadata = match self.db.prepare_cached(
            "
                select Value
                    from Metadata
                    where Key = ?
            ",
        ) {
            Ok(statement) => statement,
            // A foreign store without a metadata table simply has none.
            Err(Error::SqliteFailure(_, Some(message)))
                if message.contains("no such table") =>
            {
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        match get_metadata.query_row(params![key], |row| row.get(0)) {
            Ok(value) => Ok(Some(value)),
            Err(Error::QueryReturnedNoRows) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
    pub fn metadata_set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut set_metadata = self.db.prepare_cached(
            "
                insert or replace into Metadata (
                    Key,
                    Value
                ) values (?, ?)
            ",
        )?;
        set_metadata.execute(params![key, value])?;
        Ok(())
    }
}

impl std::fmt::Debug for Persistor {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Persistor")
    }
}

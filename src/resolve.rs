//! Identity-by-attribute resolution against a target store.
//!
//! The resolver is what makes the copy engine idempotent: records are
//! never plainly inserted, they are *kept*: found by their declared
//! unique-key values if an equivalent already exists, created and
//! populated otherwise.

use std::sync::Arc;

use tracing::debug;

use crate::context::StoreContext;
use crate::error::{GraftError, Result};
use crate::predicate::Predicate;
use crate::record::{AttributeMap, RecordId};
use crate::schema::Catalog;

pub struct UniquenessResolver {
    catalog: Arc<Catalog>,
}

impl UniquenessResolver {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    /// The record of the given entity type whose unique-key attributes
    /// all equal `key_values`, or `None`. Fails with a config error when
    /// the type declares no unique key, since there is nothing to match on.
    pub async fn find(
        &self,
        context: &StoreContext,
        entity: &str,
        key_values: &AttributeMap,
    ) -> Result<Option<RecordId>> {
        self.keyed(entity)?;
        let predicate = Predicate::key_match(key_values)?;
        let hits = context.query(entity, Some(predicate), None).await?;
        Ok(hits.first().copied())
    }

    /// Find the existing equivalent and backfill any `extra` attributes
    /// it does not carry yet, or insert a new record populated with the
    /// key values and extras. Either way the returned record holds the
    /// given key values. Uncommitted until the caller commits the store.
    pub async fn find_or_insert(
        &self,
        context: &StoreContext,
        entity: &str,
        key_values: &AttributeMap,
        extra: &AttributeMap,
    ) -> Result<RecordId> {
        if let Some(id) = self.find(context, entity, key_values).await? {
            // existing attribute values are never overwritten, matching
            // the first-writer-wins policy for relationships
            for (name, value) in extra {
                if context.attribute(id, name).await?.is_none() {
                    context.set_attribute(id, name, value.clone()).await?;
                }
            }
            debug!(store = context.label(), entity, id, "matched existing record");
            return Ok(id);
        }
        let id = context.insert(entity).await?;
        for (name, value) in key_values {
            context.set_attribute(id, name, value.clone()).await?;
        }
        for (name, value) in extra {
            if !key_values.contains_key(name) {
                context.set_attribute(id, name, value.clone()).await?;
            }
        }
        debug!(store = context.label(), entity, id, "inserted new record");
        Ok(id)
    }

    fn keyed(&self, entity: &str) -> Result<()> {
        if self.catalog.descriptor(entity)?.key_attributes().is_none() {
            return Err(GraftError::Config(format!(
                "entity '{entity}' declares no unique key and cannot be \
                 deduplicated"
            )));
        }
        Ok(())
    }
}

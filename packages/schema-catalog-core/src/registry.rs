//! Global property registry.
//!
//! Assigns every `(name, type)` pair a stable numeric id that survives schema
//! evolution. Ids are handed out once, in increasing order, and never reused.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, Result};
use crate::types::PropertyType;

/// A database-wide property identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalProperty {
    id: u32,
    name: String,
    property_type: PropertyType,
}

/// Durable layout of a global property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalPropertyRecord {
    /// Property name
    pub name: String,
    /// Symbolic type name
    pub r#type: String,
    /// Global id
    pub id: u32,
}

impl GlobalProperty {
    pub fn new(id: u32, name: impl Into<String>, property_type: PropertyType) -> Self {
        Self {
            id,
            name: name.into(),
            property_type,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn property_type(&self) -> PropertyType {
        self.property_type
    }

    /// Converts to the durable record layout.
    pub fn to_record(&self) -> GlobalPropertyRecord {
        GlobalPropertyRecord {
            name: self.name.clone(),
            r#type: self.property_type.as_str().to_string(),
            id: self.id,
        }
    }

    /// Converts to a JSON document `{name, type, id}`.
    pub fn to_document(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "type": self.property_type.as_str(),
            "id": self.id,
        })
    }

    /// Rebuilds a global property from its durable record.
    ///
    /// # Returns
    /// `UnknownPropertyType` when the symbolic type is not recognized.
    pub fn from_record(record: &GlobalPropertyRecord) -> Result<Self> {
        let property_type = record.r#type.parse::<PropertyType>()?;
        Ok(Self::new(record.id, record.name.clone(), property_type))
    }

    /// Rebuilds a global property from a JSON document `{name, type, id}`.
    pub fn from_document(document: &serde_json::Value) -> Result<Self> {
        let record: GlobalPropertyRecord = serde_json::from_value(document.clone())
            .map_err(|e| CatalogError::Serialization(format!("Invalid global property: {}", e)))?;
        Self::from_record(&record)
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    by_id: Vec<Option<GlobalProperty>>,
    by_name: HashMap<String, u32>,
}

/// Append-only table of global properties.
#[derive(Debug, Default)]
pub struct GlobalPropertyRegistry {
    inner: RwLock<RegistryInner>,
}

impl GlobalPropertyRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id for `(name, type)`, allocating the next id when the name is new.
    ///
    /// # Arguments
    /// * `name` - Property name
    /// * `property_type` - Property type
    ///
    /// # Returns
    /// `PropertyNameConflict` if the name is already bound to another type.
    pub fn create(&self, name: &str, property_type: PropertyType) -> Result<u32> {
        let mut inner = self.inner.write();
        if let Some(&id) = inner.by_name.get(name) {
            let existing = inner.by_id[id as usize]
                .as_ref()
                .map(|p| p.property_type)
                .ok_or_else(|| {
                    CatalogError::DataCorruption(format!("Global property slot {} is empty", id))
                })?;
            if existing != property_type {
                return Err(CatalogError::PropertyNameConflict {
                    name: name.to_string(),
                    existing: existing.to_string(),
                    requested: property_type.to_string(),
                });
            }
            return Ok(id);
        }

        let id = inner.by_id.len() as u32;
        inner
            .by_id
            .push(Some(GlobalProperty::new(id, name, property_type)));
        inner.by_name.insert(name.to_string(), id);
        tracing::debug!("Registered global property {} ({}) as id {}", name, property_type, id);
        Ok(id)
    }

    /// Places an entry at a fixed id while loading a durable record.
    pub fn restore(&self, name: &str, property_type: PropertyType, id: u32) -> Result<()> {
        let mut inner = self.inner.write();
        let slot = id as usize;

        if let Some(Some(existing)) = inner.by_id.get(slot) {
            if existing.name == name && existing.property_type == property_type {
                return Ok(());
            }
            return Err(CatalogError::PropertyNameConflict {
                name: name.to_string(),
                existing: format!("{} {} at id {}", existing.name, existing.property_type, id),
                requested: property_type.to_string(),
            });
        }
        if let Some(&other) = inner.by_name.get(name) {
            return Err(CatalogError::PropertyNameConflict {
                name: name.to_string(),
                existing: format!("id {}", other),
                requested: format!("id {}", id),
            });
        }

        if inner.by_id.len() <= slot {
            inner.by_id.resize(slot + 1, None);
        }
        inner.by_id[slot] = Some(GlobalProperty::new(id, name, property_type));
        inner.by_name.insert(name.to_string(), id);
        Ok(())
    }

    /// Widens the type of an existing entry along the castable lattice.
    pub fn widen(&self, id: u32, new_type: PropertyType) -> Result<()> {
        let mut inner = self.inner.write();
        let entry = inner
            .by_id
            .get_mut(id as usize)
            .and_then(|slot| slot.as_mut())
            .ok_or_else(|| {
                CatalogError::DataCorruption(format!("Global property {} does not exist", id))
            })?;
        if !new_type.is_castable_from(entry.property_type) {
            return Err(CatalogError::invalid_constraint(
                &entry.name,
                "type",
                format!("cannot change {} to {}", entry.property_type, new_type),
            ));
        }
        entry.property_type = new_type;
        Ok(())
    }

    pub fn get_by_id(&self, id: u32) -> Option<GlobalProperty> {
        self.inner.read().by_id.get(id as usize).cloned().flatten()
    }

    pub fn get_by_name(&self, name: &str) -> Option<GlobalProperty> {
        let inner = self.inner.read();
        inner
            .by_name
            .get(name)
            .and_then(|&id| inner.by_id[id as usize].clone())
    }

    /// All entries ordered by id.
    pub fn all(&self) -> Vec<GlobalProperty> {
        self.inner.read().by_id.iter().flatten().cloned().collect()
    }

    /// Number of id slots handed out.
    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replaces the whole table, used by catalog reload.
    pub(crate) fn reset(&self, records: &[GlobalPropertyRecord]) -> Result<()> {
        let fresh = GlobalPropertyRegistry::new();
        for record in records {
            let property = GlobalProperty::from_record(record)?;
            fresh.restore(&property.name, property.property_type, property.id)?;
        }
        let fresh_inner = fresh.inner.into_inner();
        *self.inner.write() = fresh_inner;
        Ok(())
    }
}

//! Shared fixtures for the integration suite.

use std::sync::Arc;

use anyhow::Context;
use schema_catalog_core::{Catalog, CatalogConfig, PropertyType, SchemaSession};

/// Configuration for in-memory catalogs that never populate views on their own.
pub fn memory_config() -> CatalogConfig {
    CatalogConfig {
        populate_views_on_create: false,
        schema_lock_timeout_ms: 2000,
        ..Default::default()
    }
}

pub fn new_catalog() -> Arc<Catalog> {
    Catalog::new(memory_config()).unwrap()
}

/// Creates `Person(name: STRING, age: INTEGER)`.
pub fn try_create_person(catalog: &Catalog, session: &SchemaSession) -> anyhow::Result<()> {
    let person = catalog
        .create_class(session, "Person", &[], &[])
        .context("Failed to create Person")?;
    person
        .create_property(session, "name", PropertyType::String)
        .context("Failed to create Person.name")?;
    person
        .create_property(session, "age", PropertyType::Integer)
        .context("Failed to create Person.age")?;
    Ok(())
}

pub fn create_person(catalog: &Catalog, session: &SchemaSession) {
    try_create_person(catalog, session).unwrap();
}

//! Durable schema record: layout, validation and stores.


mod file_store;
mod schema;
pub mod schema_validation;

use parking_lot::Mutex;

use crate::error::Result;

pub use file_store::FileSchemaStore;
pub use schema::{
    ClassSchema, PropertySchema, SchemaFile, ViewSchema, SCHEMA_FORMAT_VERSION,
};

/// Loads and saves the durable catalog record.
pub trait SchemaStore: Send + Sync {
    /// Returns `None` when nothing has been saved yet.
    fn load(&self) -> Result<Option<SchemaFile>>;

    fn save(&self, schema: &SchemaFile) -> Result<()>;
}

/// Schema store that keeps the last saved record in memory.
#[derive(Debug, Default)]
pub struct MemorySchemaStore {
    record: Mutex<Option<SchemaFile>>,
}

impl MemorySchemaStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SchemaStore for MemorySchemaStore {
    fn load(&self) -> Result<Option<SchemaFile>> {
        let record = self.record.lock().clone();
        if let Some(schema) = &record {
            schema_validation::validate_schema(schema)?;
        }
        Ok(record)
    }

    fn save(&self, schema: &SchemaFile) -> Result<()> {
        *self.record.lock() = Some(schema.clone());
        Ok(())
    }
}

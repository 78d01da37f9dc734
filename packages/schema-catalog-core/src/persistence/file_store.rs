//! File-backed schema store.

use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::PathBuf;
use std::time::Duration;

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

use crate::config::CatalogConfig;
use crate::error::{CatalogError, Result};

use super::schema::{SchemaFile, SCHEMA_FORMAT_VERSION};
use super::schema_validation::validate_schema;
use super::SchemaStore;

const SCHEMA_FILE_NAME: &str = "schema.json";
const SCHEMA_TEMP_FILE_NAME: &str = "schema.json.tmp";

/// Maps an I/O failure to `TransientIo` when another attempt may succeed.
fn classify_io_error(error: std::io::Error, context: &str) -> CatalogError {
    match error.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted => {
            CatalogError::TransientIo(format!("{}: {}", context, error))
        }
        _ => CatalogError::Io(format!("{}: {}", context, error)),
    }
}

/// On-disk wrapper carrying the checksum of the serialized schema.
#[derive(Debug, Serialize, Deserialize)]
struct SchemaEnvelope {
    checksum: u32,
    schema: SchemaFile,
}

/// Stores the schema record as `schema.json` in the data directory.
#[derive(Debug, Clone)]
pub struct FileSchemaStore {
    /// Data directory path
    data_dir: PathBuf,
    /// Maximum retry attempts for transient I/O errors
    max_retries: u32,
    /// Delay between retry attempts in milliseconds
    retry_delay_ms: u64,
}

impl FileSchemaStore {
    /// Creates a schema store with the given configuration.
    pub fn new(config: &CatalogConfig) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            max_retries: config.persistence_max_retries,
            retry_delay_ms: config.persistence_retry_delay_ms,
        }
    }

    /// Path of the schema file.
    pub fn schema_path(&self) -> PathBuf {
        self.data_dir.join(SCHEMA_FILE_NAME)
    }

    fn checksum(schema: &SchemaFile) -> Result<u32> {
        let body = serde_json::to_vec(schema)
            .map_err(|e| CatalogError::Serialization(e.to_string()))?;
        let mut hasher = Hasher::new();
        hasher.update(&body);
        Ok(hasher.finalize())
    }

    /// Runs one schema file access, repeating it while it reports
    /// `TransientIo` and the configured retry budget lasts.
    fn with_retries<T>(&self, action: &str, mut access: impl FnMut() -> Result<T>) -> Result<T> {
        let mut retries = 0;
        loop {
            match access() {
                Err(CatalogError::TransientIo(reason)) if retries < self.max_retries => {
                    retries += 1;
                    tracing::warn!(
                        "Retrying schema {} at {} ({}/{}): {}",
                        action,
                        self.schema_path().display(),
                        retries,
                        self.max_retries,
                        reason
                    );
                    if self.retry_delay_ms > 0 {
                        std::thread::sleep(Duration::from_millis(self.retry_delay_ms));
                    }
                }
                outcome => return outcome,
            }
        }
    }

    fn write_once(&self, contents: &[u8]) -> Result<()> {
        let temp_path = self.data_dir.join(SCHEMA_TEMP_FILE_NAME);
        let final_path = self.schema_path();

        // Ensure data directory exists
        fs::create_dir_all(&self.data_dir)
            .map_err(|e| classify_io_error(e, "Failed to create data directory"))?;

        // Write to temporary file
        let mut file = File::create(&temp_path)
            .map_err(|e| classify_io_error(e, "Failed to create temp file"))?;
        file.write_all(contents)
            .map_err(|e| classify_io_error(e, "Failed to write schema"))?;
        file.sync_all()
            .map_err(|e| classify_io_error(e, "Failed to sync schema"))?;

        // Atomic rename
        fs::rename(&temp_path, &final_path)
            .map_err(|e| classify_io_error(e, "Failed to rename schema file"))?;
        Ok(())
    }

    fn read_once(&self) -> Result<String> {
        let mut file = File::open(self.schema_path())
            .map_err(|e| classify_io_error(e, "Failed to open schema file"))?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| classify_io_error(e, "Failed to read schema file"))?;
        Ok(contents)
    }
}

impl SchemaStore for FileSchemaStore {
    fn load(&self) -> Result<Option<SchemaFile>> {
        if !self.schema_path().exists() {
            return Ok(None);
        }

        let contents = self.with_retries("load", || self.read_once())?;

        let envelope: SchemaEnvelope = serde_json::from_str(&contents)
            .map_err(|e| CatalogError::Serialization(format!("Failed to parse schema: {}", e)))?;

        if envelope.schema.version != SCHEMA_FORMAT_VERSION {
            return Err(CatalogError::Serialization(format!(
                "Unsupported schema version: {}",
                envelope.schema.version
            )));
        }

        let actual = Self::checksum(&envelope.schema)?;
        if actual != envelope.checksum {
            return Err(CatalogError::DataCorruption(format!(
                "Schema checksum mismatch: stored {:08x}, calculated {:08x}",
                envelope.checksum, actual
            )));
        }

        validate_schema(&envelope.schema)?;
        Ok(Some(envelope.schema))
    }

    fn save(&self, schema: &SchemaFile) -> Result<()> {
        let envelope = SchemaEnvelope {
            checksum: Self::checksum(schema)?,
            schema: schema.clone(),
        };
        let contents = serde_json::to_string_pretty(&envelope)
            .map_err(|e| CatalogError::Serialization(e.to_string()))?;

        self.with_retries("save", || self.write_once(contents.as_bytes()))?;
        tracing::debug!(
            "Saved schema version {} to {}",
            schema.schema_version,
            self.schema_path().display()
        );
        Ok(())
    }
}

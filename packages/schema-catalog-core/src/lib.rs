//! Schema catalog for a multi-model database.
//!
//! Provides the global property registry, class and view definitions with
//! their constraints, a mutable catalog with serialized writers, immutable
//! snapshots for readers, view refresh management, and persistence of the
//! schema record.

pub mod catalog;
pub mod cluster;
pub mod config;
pub mod error;
pub mod index;
pub mod persistence;
pub mod query;
pub mod registry;
pub mod schema;
pub mod session;
pub mod snapshot;
pub mod types;
pub mod view_manager;

pub use catalog::{
    Catalog, CatalogBuilder, ClassHandle, PropertyHandle, SchemaListener, ViewCreationListener,
};
pub use config::CatalogConfig;
pub use error::{CatalogError, Result};
pub use registry::{GlobalProperty, GlobalPropertyRegistry};
pub use schema::{
    ClassDefinition, PropertyDescriptor, ViewConfig, ViewDefinition, ViewIndexConfig,
};
pub use session::SchemaSession;
pub use snapshot::CatalogSnapshot;
pub use types::{Collate, PropertyType};

//! Persistence integration tests.
//!
//! Tests:
//! - Schema persistence and recovery through the file store
//! - Reload picks up a record written by another catalog
//! - Corrupted records are refused at startup

use ntest::timeout;
use std::fs;
use tempfile::tempdir;

use schema_catalog_core::persistence::{FileSchemaStore, SchemaStore};
use schema_catalog_core::{Catalog, CatalogConfig, CatalogError, PropertyType, SchemaSession};

fn file_config(dir: &std::path::Path) -> CatalogConfig {
    CatalogConfig {
        data_dir: dir.to_path_buf(),
        persist_on_commit: true,
        populate_views_on_create: false,
        ..Default::default()
    }
}

/// Schema persistence and recovery.
///
/// Every committed mutation is saved, and a catalog opened on the same data
/// directory sees the same classes, properties and global ids.
#[timeout(5000)]
#[test]
fn test_schema_persistence_recovery() {
    let temp_dir = tempdir().unwrap();
    let config = file_config(temp_dir.path());
    let session = SchemaSession::default();

    let (version, age_id) = {
        let catalog = Catalog::new(config.clone()).unwrap();
        catalog.create_class(&session, "V", &[], &[]).unwrap();
        let person = catalog
            .create_class(&session, "Person", &["V"], &[])
            .unwrap();
        let age = person
            .create_property(&session, "age", PropertyType::Integer)
            .unwrap();
        age.set_min(&session, Some("0")).unwrap();
        age.set_type(&session, PropertyType::Long).unwrap();
        catalog
            .create_global_property("nickname", PropertyType::String)
            .unwrap();

        let mut employee = catalog
            .create_class(&session, "Worker", &["Person"], &[])
            .unwrap();
        employee.set_name(&session, "Employee").unwrap();
        (catalog.version(), age.definition().unwrap().id())
    };

    let recovered = Catalog::new(config).unwrap();
    assert!(recovered.version() >= version);
    assert_eq!(recovered.class_names(), vec!["Employee", "Person", "V"]);

    let employee = recovered.get_class("Employee").unwrap();
    assert!(employee.is_subclass_of("V"));
    let age = employee.properties().into_iter().find(|p| p.name() == "age").unwrap();
    assert_eq!(age.id(), age_id);
    assert_eq!(age.property_type(), PropertyType::Long);
    assert_eq!(age.min(), Some("0"));

    let nickname = recovered
        .global_properties()
        .into_iter()
        .find(|p| p.name() == "nickname")
        .unwrap();
    assert_eq!(nickname.property_type(), PropertyType::String);
    assert_eq!(
        recovered
            .create_global_property("nickname", PropertyType::String)
            .unwrap(),
        nickname.id()
    );
}

#[timeout(5000)]
#[test]
fn test_reload_sees_other_writer() {
    let temp_dir = tempdir().unwrap();
    let config = file_config(temp_dir.path());
    let session = SchemaSession::default();

    let reader = Catalog::new(config.clone()).unwrap();
    let writer = Catalog::new(config).unwrap();
    writer.create_class(&session, "Invoice", &[], &[]).unwrap();

    assert!(!reader.exists_class("Invoice"));
    let before = reader.make_snapshot();
    reader.reload().unwrap();
    assert!(reader.exists_class("Invoice"));
    assert!(!before.exists_class("Invoice"));
    assert!(reader.make_snapshot().exists_class("Invoice"));
}

#[timeout(5000)]
#[test]
fn test_corrupted_record_refused() {
    let temp_dir = tempdir().unwrap();
    let config = file_config(temp_dir.path());
    let session = SchemaSession::default();
    {
        let catalog = Catalog::new(config.clone()).unwrap();
        let person = catalog.create_class(&session, "Person", &[], &[]).unwrap();
        person
            .create_property(&session, "age", PropertyType::Integer)
            .unwrap();
    }

    let store = FileSchemaStore::new(&config);
    let contents = fs::read_to_string(store.schema_path()).unwrap();
    fs::write(store.schema_path(), contents.replace("INTEGER", "BOOLEAN")).unwrap();

    assert!(matches!(store.load(), Err(CatalogError::DataCorruption(_))));
    assert!(Catalog::new(config).is_err());
}

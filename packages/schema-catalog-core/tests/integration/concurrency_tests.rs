//! Concurrent readers and writers.

use ntest::timeout;
use std::sync::{Arc, Barrier};
use std::thread;

use schema_catalog_core::{PropertyType, SchemaSession};

use super::helpers::new_catalog;

/// A snapshot taken before a change keeps answering with the old schema.
#[timeout(5000)]
#[test]
fn test_snapshot_isolation_across_threads() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    catalog.create_class(&session, "Person", &[], &[]).unwrap();

    let before = catalog.make_snapshot();
    let barrier = Arc::new(Barrier::new(2));

    let writer = {
        let catalog = Arc::clone(&catalog);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            let session = SchemaSession::new("writer");
            catalog
                .get_class("Person")
                .unwrap()
                .create_property(&session, "age", PropertyType::Integer)
                .unwrap();
            catalog.create_class(&session, "Company", &[], &[]).unwrap();
            barrier.wait();
        })
    };

    barrier.wait();
    writer.join().unwrap();

    let person = before.get_class("Person").unwrap();
    assert!(person.property("age").is_none());
    assert!(!before.exists_class("Company"));

    let after = catalog.make_snapshot();
    assert!(after.version() > before.version());
    assert!(after.get_class("Person").unwrap().property("age").is_some());
    assert!(after.exists_class("Company"));
}

/// Concurrent mutations are serialized: each commit bumps the version once.
#[timeout(10000)]
#[test]
fn test_concurrent_class_creation() {
    let catalog = new_catalog();
    let start_version = catalog.version();
    let num_threads = 8;
    let classes_per_thread = 10;

    let handles: Vec<_> = (0..num_threads)
        .map(|t| {
            let catalog = Arc::clone(&catalog);
            thread::spawn(move || {
                let session = SchemaSession::new(format!("user{}", t));
                for i in 0..classes_per_thread {
                    let name = format!("C{}_{}", t, i);
                    let class = catalog.create_class(&session, &name, &[], &[]).unwrap();
                    class
                        .create_property(&session, "shared", PropertyType::String)
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let total = num_threads * classes_per_thread;
    assert_eq!(catalog.count_classes(), total);
    assert_eq!(catalog.version(), start_version + 2 * total as u64);
    assert_eq!(catalog.global_properties().len(), 1);

    // Every class owns distinct clusters
    let snapshot = catalog.make_snapshot();
    let mut clusters: Vec<i32> = snapshot
        .classes()
        .flat_map(|c| c.cluster_ids().to_vec())
        .collect();
    clusters.sort_unstable();
    clusters.dedup();
    assert_eq!(clusters.len(), total);
}

/// Readers keep taking snapshots while a writer commits.
#[timeout(10000)]
#[test]
fn test_readers_during_writes() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    catalog.create_class(&session, "Log", &[], &[]).unwrap();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let catalog = Arc::clone(&catalog);
            thread::spawn(move || {
                let mut last_version = 0;
                for _ in 0..200 {
                    let snapshot = catalog.make_snapshot();
                    assert!(snapshot.version() >= last_version);
                    last_version = snapshot.version();
                    let log = snapshot.get_class("Log").unwrap();
                    // Properties appear in creation order, never partially
                    for (i, property) in log.properties().iter().enumerate() {
                        assert_eq!(property.name(), format!("f{}", i));
                    }
                }
            })
        })
        .collect();

    let log = catalog.get_class("Log").unwrap();
    for i in 0..50 {
        log.create_property(&session, &format!("f{}", i), PropertyType::String)
            .unwrap();
    }

    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(catalog.make_snapshot().get_class("Log").unwrap().properties().len(), 50);
}

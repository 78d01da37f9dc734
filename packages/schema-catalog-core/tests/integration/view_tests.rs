//! View lifecycle: creation, refresh, lookup and drop.

use std::sync::mpsc;
use std::time::Duration;

use ntest::timeout;

use schema_catalog_core::schema::IndexBy;
use schema_catalog_core::{CatalogError, SchemaSession, ViewConfig, ViewCreationListener};

use super::helpers::{create_person, new_catalog};

#[timeout(1000)]
#[test]
fn test_adult_view_indexes_follow_refresh() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    create_person(&catalog, &session);

    let view = catalog
        .create_view(
            &session,
            ViewConfig::new("AdultView", "select from Person where age >= 18"),
            None,
        )
        .unwrap();

    let required = view.required_index_configs();
    assert!(!required.is_empty());
    assert!(required
        .iter()
        .any(|config| config.field_names() == vec!["age".to_string()]));
    assert_eq!(required[0].properties()[0].index_by, IndexBy::Key);
    assert!(view.active_index_names().is_empty());
    assert!(view.last_refresh_time().is_none());

    // The view carries the target's properties
    let view_class = view.as_class();
    assert!(view_class.own_property("age").is_some());
    assert!(view_class.own_property("name").is_some());

    catalog.update_view("AdultView").unwrap();

    let refreshed = catalog.get_view("adultview").unwrap();
    let implied = refreshed.implied_index_names();
    assert!(!refreshed.active_index_names().is_empty());
    for name in refreshed.active_index_names() {
        assert!(implied.contains(name));
        assert!(catalog.index_manager().get_index(name).is_some());
    }
    assert_eq!(refreshed.generation(), 1);
    assert!(refreshed.last_refresh_time().is_some());

    let snapshot = catalog.make_snapshot();
    let snapshot_view = snapshot.get_view("AdultView").unwrap();
    assert_eq!(snapshot_view.indexes().len(), implied.len());
    assert_eq!(snapshot_view.involved_indexes(&["age"]).len(), 1);
}

#[timeout(1000)]
#[test]
fn test_refresh_swaps_resources() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    create_person(&catalog, &session);
    catalog
        .create_view(
            &session,
            ViewConfig::new("AdultView", "select from Person where age >= 18"),
            None,
        )
        .unwrap();

    catalog.update_view("AdultView").unwrap();
    let first = catalog.get_view("AdultView").unwrap();
    catalog.update_view("AdultView").unwrap();
    let second = catalog.get_view("AdultView").unwrap();

    assert_eq!(second.generation(), 2);
    assert_ne!(first.cluster_ids(), second.cluster_ids());
    assert_ne!(first.active_index_names(), second.active_index_names());

    // Nothing holds the old generation, so it is released right away
    for name in first.active_index_names() {
        assert!(catalog.index_manager().get_index(name).is_none());
    }
    assert!(catalog.view_by_cluster_id(first.cluster_ids()[0]).is_none());
    assert_eq!(
        catalog
            .view_by_cluster_id(second.cluster_ids()[0])
            .unwrap()
            .name(),
        "AdultView"
    );
}

#[timeout(1000)]
#[test]
fn test_drop_view_metadata() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    create_person(&catalog, &session);
    catalog
        .create_view(
            &session,
            ViewConfig::new("AdultView", "select from Person where age >= 18"),
            None,
        )
        .unwrap();
    catalog.update_view("AdultView").unwrap();
    let view = catalog.get_view("AdultView").unwrap();

    let removed = catalog.drop_view(&session, "AdultView").unwrap();
    assert_eq!(removed.clusters, view.cluster_ids().to_vec());
    assert_eq!(removed.indexes, view.active_index_names().to_vec());

    assert!(catalog.get_view("AdultView").is_none());
    for name in &removed.indexes {
        assert!(catalog.index_manager().get_index(name).is_none());
    }
    assert!(matches!(
        catalog.drop_view(&session, "AdultView"),
        Err(CatalogError::ViewNotFound { .. })
    ));
}

#[timeout(1000)]
#[test]
fn test_view_query_errors() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    create_person(&catalog, &session);

    let err = catalog
        .create_view(&session, ViewConfig::new("Broken", "delete from Person"), None)
        .unwrap_err();
    assert!(matches!(err, CatalogError::ViewQueryInvalid { .. }));

    let err = catalog
        .create_view(
            &session,
            ViewConfig::new("Ghosts", "select from Ghost where age > 1"),
            None,
        )
        .unwrap_err();
    assert!(matches!(err, CatalogError::ViewQueryInvalid { .. }));

    let err = catalog
        .create_view(
            &session,
            ViewConfig::new("Person", "select from Person"),
            None,
        )
        .unwrap_err();
    assert!(matches!(err, CatalogError::DuplicateClassName(_)));
    assert!(matches!(
        catalog.update_view("Missing"),
        Err(CatalogError::ViewNotFound { .. })
    ));
}

#[timeout(3000)]
#[test]
fn test_view_populated_in_background() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    create_person(&catalog, &session);

    let (tx, rx) = mpsc::channel();
    let listener: ViewCreationListener = Box::new(move |name, result| {
        let _ = tx.send((name.to_string(), result.is_ok()));
    });
    catalog
        .create_view(
            &session,
            ViewConfig::new("Named", "select name from Person where name is not null"),
            Some(listener),
        )
        .unwrap();

    let (name, ok) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(name, "Named");
    assert!(ok);
    assert_eq!(catalog.get_view("Named").unwrap().generation(), 1);
}

#[timeout(1000)]
#[test]
fn test_next_view_follows_watched_changes() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    create_person(&catalog, &session);

    let mut config = ViewConfig::new("AdultView", "select from Person where age >= 18");
    config.update_interval_seconds = Some(0);
    config.watch_classes = vec!["Person".to_string()];
    catalog.create_view(&session, config, None).unwrap();

    assert_eq!(
        catalog.update_next_view().unwrap().as_deref(),
        Some("AdultView")
    );
    // Refreshed and no change recorded since
    assert_eq!(catalog.update_next_view().unwrap(), None);

    std::thread::sleep(Duration::from_millis(5));
    catalog.record_changed("Person");
    assert_eq!(
        catalog.update_next_view().unwrap().as_deref(),
        Some("AdultView")
    );
}

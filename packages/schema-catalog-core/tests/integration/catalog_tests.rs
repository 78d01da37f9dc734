//! Class hierarchy, global property and index lookup scenarios.

use ntest::timeout;

use schema_catalog_core::index::IndexDefinition;
use schema_catalog_core::{CatalogError, PropertyType, SchemaSession};

use super::helpers::{create_person, new_catalog, try_create_person};

#[timeout(1000)]
#[test]
fn test_hierarchy_cycle_rejected() {
    let catalog = new_catalog();
    let session = SchemaSession::default();

    catalog.create_class(&session, "A", &[], &[]).unwrap();
    catalog.create_class(&session, "B", &["A"], &[]).unwrap();
    let version = catalog.version();

    let a = catalog.get_class("A").unwrap();
    let err = a.add_super_class(&session, "B").unwrap_err();
    assert!(matches!(err, CatalogError::InvalidHierarchy { .. }));

    // Nothing committed
    assert_eq!(catalog.version(), version);
    assert!(a.definition().unwrap().super_classes().is_empty());
    assert!(catalog.get_class("B").unwrap().is_subclass_of("A"));
}

#[timeout(1000)]
#[test]
fn test_unknown_super_class_rejected() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    let version = catalog.version();

    let err = catalog
        .create_class(&session, "B", &["Missing"], &[])
        .unwrap_err();
    assert!(matches!(err, CatalogError::InvalidHierarchy { ref class, .. } if class == "B"));
    assert_eq!(catalog.version(), version);
    assert!(catalog.get_class("B").is_none());
}

#[timeout(1000)]
#[test]
fn test_global_property_idempotence() {
    let catalog = new_catalog();

    let first = catalog
        .create_global_property("email", PropertyType::String)
        .unwrap();
    let second = catalog
        .create_global_property("email", PropertyType::String)
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(catalog.global_properties().len(), 1);

    let err = catalog
        .create_global_property("email", PropertyType::Integer)
        .unwrap_err();
    assert!(matches!(err, CatalogError::PropertyNameConflict { .. }));

    let global = catalog.global_property_by_id(first).unwrap();
    assert_eq!(global.name(), "email");
    assert_eq!(global.property_type(), PropertyType::String);
}

#[timeout(1000)]
#[test]
fn test_properties_share_global_ids_across_classes() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    create_person(&catalog, &session);

    let company = catalog.create_class(&session, "Company", &[], &[]).unwrap();
    let name = company
        .create_property(&session, "name", PropertyType::String)
        .unwrap();
    let person_name = catalog
        .get_class("Person")
        .unwrap()
        .property_definition("name")
        .unwrap();
    assert_eq!(name.definition().unwrap().id(), person_name.id());

    let err = company
        .create_property(&session, "age", PropertyType::String)
        .unwrap_err();
    assert!(matches!(err, CatalogError::PropertyNameConflict { .. }));
}

#[timeout(1000)]
#[test]
fn test_index_lookup_by_field_set() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    let class = catalog.create_class(&session, "Doc", &[], &[]).unwrap();
    for field in ["a", "b", "c"] {
        class
            .create_property(&session, field, PropertyType::String)
            .unwrap();
    }
    class
        .create_index(&session, "Doc.a", "NOTUNIQUE", &["a"])
        .unwrap();
    class
        .create_index(&session, "Doc.ab", "NOTUNIQUE", &["a", "b"])
        .unwrap();
    class
        .create_index(&session, "Doc.abc", "NOTUNIQUE", &["a", "b", "c"])
        .unwrap();

    let names = |indexes: Vec<IndexDefinition>| -> Vec<String> {
        indexes.into_iter().map(|i| i.name).collect()
    };
    assert_eq!(names(class.involved_indexes(&["a", "b"])), vec!["Doc.ab"]);
    assert_eq!(names(class.involved_indexes(&["b", "a"])), vec!["Doc.ab"]);
    assert_eq!(names(class.involved_indexes(&["a"])), vec!["Doc.a"]);
    assert!(class.involved_indexes(&["c"]).is_empty());

    let snapshot = catalog.make_snapshot();
    assert_eq!(
        names(snapshot.involved_indexes("doc", &["B", "A"]).unwrap()),
        vec!["Doc.ab"]
    );
    assert!(snapshot.are_indexed("Doc", &["a", "b", "c"]).unwrap());
}

#[timeout(1000)]
#[test]
fn test_subclass_sees_inherited_indexes() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    create_person(&catalog, &session);
    let person = catalog.get_class("Person").unwrap();
    person
        .property("age")
        .unwrap()
        .create_index(&session, "NOTUNIQUE", None, None)
        .unwrap();

    let employee = catalog
        .create_class(&session, "Employee", &["Person"], &[])
        .unwrap();
    assert!(employee.class_indexes().is_empty());
    assert!(employee.are_indexed(&["age"]));
    assert_eq!(employee.indexes()[0].name, "Person.age");

    let index = catalog.index_manager().get_index("Person.age").unwrap();
    assert_eq!(index.class_name, "Person");
    assert_eq!(index.fields, vec!["age".to_string()]);
}

#[timeout(1000)]
#[test]
fn test_drop_class_with_subclasses() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    catalog.create_class(&session, "V", &[], &[]).unwrap();
    catalog.create_class(&session, "Person", &["V"], &[]).unwrap();

    let err = catalog.drop_class(&session, "V").unwrap_err();
    assert!(matches!(err, CatalogError::ClassHasSubclasses { .. }));

    let removed = catalog.drop_class(&session, "Person").unwrap();
    assert_eq!(removed.clusters.len(), 1);
    assert!(catalog
        .get_class("V")
        .unwrap()
        .definition()
        .unwrap()
        .subclasses()
        .is_empty());
    catalog.drop_class(&session, "V").unwrap();
    assert_eq!(catalog.count_classes(), 0);
}

#[timeout(1000)]
#[test]
fn test_duplicate_class_is_reported() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    try_create_person(&catalog, &session).unwrap();

    let err = try_create_person(&catalog, &session).unwrap_err();
    assert_eq!(err.to_string(), "Failed to create Person");
    assert!(matches!(
        err.downcast_ref::<CatalogError>(),
        Some(CatalogError::DuplicateClassName(_))
    ));
    assert!(matches!(
        catalog.create_class(&session, "PERSON", &[], &[]),
        Err(CatalogError::DuplicateClassName(_))
    ));
}

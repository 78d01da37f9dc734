use super::*;
use crate::cluster::InMemoryRecordCounter;
use crate::schema::{ClassAttribute, PropertyAttribute, RefreshState};
use ntest::timeout;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::Duration;

fn test_config() -> CatalogConfig {
    CatalogConfig {
        populate_views_on_create: false,
        schema_lock_timeout_ms: 50,
        ..Default::default()
    }
}

fn new_catalog() -> Arc<Catalog> {
    Catalog::new(test_config()).unwrap()
}

#[timeout(1000)]
#[test]
fn test_create_class_allocates_cluster() {
    let catalog = new_catalog();
    let session = SchemaSession::default();

    let person = catalog.create_class(&session, "Person", &[], &[]).unwrap();
    let definition = person.definition().unwrap();
    assert_eq!(definition.name(), "Person");
    assert!(!definition.is_abstract());
    assert_eq!(definition.cluster_ids().len(), 1);

    let cluster = definition.cluster_ids()[0];
    assert_eq!(
        catalog.cluster_manager().cluster_name_by_id(cluster).as_deref(),
        Some("person")
    );
    assert_eq!(catalog.class_by_cluster_id(cluster).unwrap().name(), "Person");
    assert_eq!(catalog.version(), 1);
}

#[timeout(1000)]
#[test]
fn test_class_names_are_case_insensitive() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    catalog.create_class(&session, "Person", &[], &[]).unwrap();

    assert!(catalog.exists_class("PERSON"));
    assert!(catalog.get_class("person").is_some());
    assert_eq!(
        catalog.create_class(&session, "person", &[], &[]).unwrap_err(),
        CatalogError::DuplicateClassName("person".to_string())
    );
    assert_eq!(catalog.count_classes(), 1);
}

#[timeout(1000)]
#[test]
fn test_invalid_class_name() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    for name in ["", "a b", "a:b", "a,b", "a;b", "a=b"] {
        let err = catalog.create_class(&session, name, &[], &[]).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidName { .. }), "{:?}", name);
    }
    assert_eq!(catalog.version(), 0);
}

#[timeout(1000)]
#[test]
fn test_abstract_class_has_no_clusters() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    let shape = catalog.create_abstract_class(&session, "Shape", &[]).unwrap();
    let definition = shape.definition().unwrap();
    assert!(definition.is_abstract());
    assert_eq!(definition.cluster_ids(), &[ABSTRACT_CLUSTER_ID]);
    assert_eq!(shape.cluster_for_new_record().unwrap(), None);
}

#[timeout(1000)]
#[test]
fn test_explicit_cluster_in_use() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    catalog.create_class(&session, "A", &[], &[40]).unwrap();
    assert_eq!(
        catalog.create_class(&session, "B", &[], &[40]).unwrap_err(),
        CatalogError::ClusterInUse {
            cluster_id: 40,
            owner: "A".to_string()
        }
    );
}

#[timeout(1000)]
#[test]
fn test_get_or_create_class() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    catalog.create_class(&session, "V", &[], &[]).unwrap();
    catalog.create_class(&session, "E", &[], &[]).unwrap();

    let first = catalog.get_or_create_class(&session, "Account", &["V"]).unwrap();
    let version = catalog.version();
    let again = catalog.get_or_create_class(&session, "account", &["v"]).unwrap();
    assert_eq!(first.name(), again.name());
    assert_eq!(catalog.version(), version);

    // No super-types requested matches any existing class.
    catalog.get_or_create_class(&session, "Account", &[]).unwrap();

    let err = catalog
        .get_or_create_class(&session, "Account", &["E"])
        .unwrap_err();
    assert_eq!(
        err,
        CatalogError::IncompatibleHierarchy {
            class: "Account".to_string(),
            existing: "V".to_string(),
            requested: "E".to_string(),
        }
    );
}

#[timeout(1000)]
#[test]
fn test_hierarchy_cycle_rejected() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    let a = catalog.create_class(&session, "A", &[], &[]).unwrap();
    catalog.create_class(&session, "B", &["A"], &[]).unwrap();
    let version = catalog.version();

    let err = a.set_super_classes(&session, &["B"]).unwrap_err();
    assert!(matches!(err, CatalogError::InvalidHierarchy { .. }));
    assert!(a.definition().unwrap().super_classes().is_empty());
    assert_eq!(catalog.version(), version);

    let err = a.add_super_class(&session, "A").unwrap_err();
    assert!(matches!(err, CatalogError::InvalidHierarchy { .. }));
}

#[timeout(1000)]
#[test]
fn test_subclass_bookkeeping_and_polymorphic_clusters() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    let animal = catalog.create_class(&session, "Animal", &[], &[]).unwrap();
    let dog = catalog.create_class(&session, "Dog", &["Animal"], &[]).unwrap();

    assert_eq!(animal.definition().unwrap().subclasses(), &["Dog".to_string()]);
    assert!(dog.is_subclass_of("animal"));
    assert!(animal.is_super_class_of("DOG"));
    assert_eq!(dog.all_super_classes(), vec!["Animal".to_string()]);

    let mut ids = animal.definition().unwrap().cluster_ids().to_vec();
    ids.extend_from_slice(dog.definition().unwrap().cluster_ids());
    assert_eq!(animal.polymorphic_cluster_ids(), ids);

    dog.remove_super_class(&session, "Animal").unwrap();
    assert!(animal.definition().unwrap().subclasses().is_empty());
}

#[timeout(1000)]
#[test]
fn test_drop_class() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    let base = catalog.create_class(&session, "Base", &[], &[]).unwrap();
    catalog.create_class(&session, "Derived", &["Base"], &[]).unwrap();
    base.create_property(&session, "code", PropertyType::String)
        .unwrap()
        .create_index(&session, "UNIQUE", None, None)
        .unwrap();

    let err = catalog.drop_class(&session, "Base").unwrap_err();
    assert!(matches!(err, CatalogError::ClassHasSubclasses { .. }));

    catalog.drop_class(&session, "Derived").unwrap();
    let clusters = base.definition().unwrap().cluster_ids().to_vec();
    let removed = catalog.drop_class(&session, "base").unwrap();
    assert_eq!(removed.clusters, clusters);
    assert_eq!(removed.indexes, vec!["Base.code".to_string()]);
    assert!(catalog.index_manager().get_index("Base.code").is_none());
    assert!(catalog.cluster_manager().cluster_name_by_id(clusters[0]).is_none());
    assert!(catalog.class_by_cluster_id(clusters[0]).is_none());
    assert_eq!(
        catalog.drop_class(&session, "Base").unwrap_err(),
        CatalogError::ClassNotFound {
            class: "Base".to_string()
        }
    );
}

#[timeout(1000)]
#[test]
fn test_property_shares_global_id() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    let a = catalog.create_class(&session, "A", &[], &[]).unwrap();
    let b = catalog.create_class(&session, "B", &[], &[]).unwrap();

    let on_a = a.create_property(&session, "name", PropertyType::String).unwrap();
    let on_b = b.create_property(&session, "name", PropertyType::String).unwrap();
    let id = on_a.definition().unwrap().id();
    assert_eq!(on_b.definition().unwrap().id(), id);
    assert_eq!(catalog.global_property_by_id(id).unwrap().name(), "name");

    let err = b
        .create_property(&session, "other", PropertyType::Integer)
        .and_then(|_| a.create_property(&session, "other", PropertyType::String))
        .unwrap_err();
    assert!(matches!(err, CatalogError::PropertyNameConflict { .. }));
}

#[timeout(1000)]
#[test]
fn test_property_conflicts_in_hierarchy() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    let parent = catalog.create_class(&session, "Parent", &[], &[]).unwrap();
    parent
        .create_property(&session, "label", PropertyType::String)
        .unwrap();
    let child = catalog.create_class(&session, "Child", &["Parent"], &[]).unwrap();

    let err = child
        .create_property(&session, "label", PropertyType::String)
        .unwrap_err();
    assert!(matches!(err, CatalogError::PropertyNameConflict { .. }));
    assert!(child.exists_property("LABEL"));
    assert_eq!(child.property("label").unwrap().owner_class(), "Parent");
    assert!(child.declared_properties().is_empty());
    assert_eq!(child.properties().len(), 1);
}

#[timeout(1000)]
#[test]
fn test_linked_class_must_exist() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    let order = catalog.create_class(&session, "Order", &[], &[]).unwrap();
    let err = order
        .create_property_with_linked_class(&session, "customer", PropertyType::Link, "Customer")
        .unwrap_err();
    assert!(matches!(err, CatalogError::ClassNotFound { .. }));

    catalog.create_class(&session, "Customer", &[], &[]).unwrap();
    let customer = order
        .create_property_with_linked_class(&session, "customer", PropertyType::Link, "customer")
        .unwrap();
    assert_eq!(customer.definition().unwrap().linked_class(), Some("Customer"));

    let err = order
        .create_property_with_linked_class(&session, "total", PropertyType::Double, "Customer")
        .unwrap_err();
    assert!(matches!(err, CatalogError::InvalidConstraint { .. }));
}

#[timeout(1000)]
#[test]
fn test_set_type_widens_everywhere() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    let a = catalog.create_class(&session, "A", &[], &[]).unwrap();
    let b = catalog.create_class(&session, "B", &[], &[]).unwrap();
    let on_a = a.create_property(&session, "size", PropertyType::Integer).unwrap();
    b.create_property(&session, "size", PropertyType::Integer).unwrap();

    on_a.set_type(&session, PropertyType::Long).unwrap();
    let id = on_a.definition().unwrap().id();
    assert_eq!(catalog.global_property_by_id(id).unwrap().property_type(), PropertyType::Long);
    assert_eq!(
        b.property_definition("size").unwrap().property_type(),
        PropertyType::Long
    );

    let err = on_a.set_type(&session, PropertyType::Integer).unwrap_err();
    assert!(matches!(err, CatalogError::InvalidConstraint { .. }));
}

#[timeout(1000)]
#[test]
fn test_property_constraints() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    let person = catalog.create_class(&session, "Person", &[], &[]).unwrap();
    let mut age = person.create_property(&session, "age", PropertyType::Integer).unwrap();

    age.set_min(&session, Some("0")).unwrap();
    age.set(&session, PropertyAttribute::Max, "150").unwrap();
    age.set(&session, PropertyAttribute::Mandatory, "true").unwrap();
    let err = age.set_min(&session, Some("200")).unwrap_err();
    assert!(matches!(err, CatalogError::InvalidConstraint { .. }));
    let err = age.set_regexp(&session, Some("[0-9]+")).unwrap_err();
    assert!(matches!(err, CatalogError::InvalidConstraint { .. }));

    age.set(&session, PropertyAttribute::Custom, "unit = 'years'").unwrap();
    let definition = age.definition().unwrap();
    assert_eq!(definition.min(), Some("0"));
    assert_eq!(definition.max(), Some("150"));
    assert!(definition.is_mandatory());
    assert_eq!(definition.custom("unit"), Some("years"));

    age.set(&session, PropertyAttribute::Max, "null").unwrap();
    assert_eq!(age.definition().unwrap().max(), None);
}

#[timeout(1000)]
#[test]
fn test_rename_property_keeps_position() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    let person = catalog.create_class(&session, "Person", &[], &[]).unwrap();
    person.create_property(&session, "first", PropertyType::String).unwrap();
    let mut middle = person.create_property(&session, "middle", PropertyType::String).unwrap();
    person.create_property(&session, "last", PropertyType::String).unwrap();

    middle.set_name(&session, "second").unwrap();
    let names: Vec<String> = person
        .declared_properties()
        .iter()
        .map(|p| p.name().to_string())
        .collect();
    assert_eq!(names, vec!["first", "second", "last"]);
    assert!(catalog.registry().get_by_name("second").is_some());
}

#[timeout(1000)]
#[test]
fn test_drop_property_used_by_index() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    let person = catalog.create_class(&session, "Person", &[], &[]).unwrap();
    let email = person.create_property(&session, "email", PropertyType::String).unwrap();
    email.create_index(&session, "UNIQUE", None, None).unwrap();

    let err = person.drop_property(&session, "email").unwrap_err();
    assert!(matches!(err, CatalogError::InvalidConstraint { .. }));

    assert_eq!(email.drop_indexes(&session).unwrap(), vec!["Person.email".to_string()]);
    person.drop_property(&session, "email").unwrap();
    assert!(!person.exists_property("email"));
    let err = person.drop_property(&session, "email").unwrap_err();
    assert!(matches!(err, CatalogError::PropertyNotFound { .. }));
}

#[timeout(1000)]
#[test]
fn test_index_engine_unavailable() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    let person = catalog.create_class(&session, "Person", &[], &[]).unwrap();
    let name = person.create_property(&session, "name", PropertyType::String).unwrap();
    let err = name
        .create_index(&session, "SPATIAL", None, None)
        .unwrap_err();
    assert!(matches!(err, CatalogError::IndexEngineUnavailable { .. }));
    let err = name
        .create_index(&session, "NOTUNIQUE", Some("LUCENE"), None)
        .unwrap_err();
    assert!(matches!(err, CatalogError::IndexEngineUnavailable { .. }));
}

#[timeout(1000)]
#[test]
fn test_ignore_null_values_metadata() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    let person = catalog.create_class(&session, "Person", &[], &[]).unwrap();
    let nick = person.create_property(&session, "nick", PropertyType::String).unwrap();
    let metadata = serde_json::json!({ "ignoreNullValues": false });
    let index = nick
        .create_index(&session, "notunique", None, Some(&metadata))
        .unwrap();
    assert!(!index.null_values_ignored);
    assert_eq!(index.index_type, "NOTUNIQUE");
    assert_eq!(index.cluster_ids, person.polymorphic_cluster_ids());
    assert_eq!(nick.all_indexes().len(), 1);
}

#[timeout(1000)]
#[test]
fn test_rename_class_updates_references() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    let mut base = catalog.create_class(&session, "Base", &[], &[]).unwrap();
    let derived = catalog.create_class(&session, "Derived", &["Base"], &[]).unwrap();
    derived
        .create_property_with_linked_class(&session, "parent", PropertyType::Link, "Base")
        .unwrap();
    base.create_property(&session, "code", PropertyType::String)
        .unwrap()
        .create_index(&session, "UNIQUE", None, None)
        .unwrap();

    base.set(&session, ClassAttribute::Name, "Root").unwrap();
    assert_eq!(base.name(), "Root");
    assert!(!catalog.exists_class("Base"));
    assert_eq!(derived.definition().unwrap().super_classes(), &["Root".to_string()]);
    assert_eq!(
        derived.property_definition("parent").unwrap().linked_class(),
        Some("Root")
    );
    assert_eq!(base.class_indexes().len(), 1);
    let cluster = base.definition().unwrap().cluster_ids()[0];
    assert_eq!(catalog.class_by_cluster_id(cluster).unwrap().name(), "Root");
}

#[timeout(1000)]
#[test]
fn test_textual_class_attributes() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    catalog.create_class(&session, "V", &[], &[]).unwrap();
    catalog.create_class(&session, "Named", &[], &[]).unwrap();
    let mut item = catalog.create_class(&session, "Item", &[], &[]).unwrap();

    item.set(&session, ClassAttribute::SuperClass, "+V").unwrap();
    item.set(&session, ClassAttribute::SuperClass, "+Named").unwrap();
    assert_eq!(item.definition().unwrap().super_classes().len(), 2);
    item.set(&session, ClassAttribute::SuperClass, "-V").unwrap();
    assert_eq!(item.definition().unwrap().super_classes(), &["Named".to_string()]);
    item.set(&session, ClassAttribute::SuperClasses, "V, Named").unwrap();
    assert_eq!(item.definition().unwrap().super_classes().len(), 2);

    item.set(&session, ClassAttribute::StrictMode, "true").unwrap();
    item.set(&session, ClassAttribute::ShortName, "it").unwrap();
    item.set(&session, ClassAttribute::Description, "'things'").unwrap();
    item.set(&session, ClassAttribute::Custom, "owner = ops").unwrap();
    item.set(&session, ClassAttribute::ClusterSelection, "balanced").unwrap();
    item.set(&session, ClassAttribute::AddCluster, "item_archive").unwrap();

    let definition = item.definition().unwrap();
    assert!(definition.is_strict_mode());
    assert_eq!(definition.short_name(), Some("it"));
    assert_eq!(definition.description(), Some("things"));
    assert_eq!(definition.custom("owner"), Some("ops"));
    assert_eq!(definition.cluster_selection().name(), "balanced");
    assert_eq!(definition.cluster_ids().len(), 2);

    let err = item.set(&session, ClassAttribute::Abstract, "maybe").unwrap_err();
    assert!(matches!(err, CatalogError::InvalidConstraint { .. }));
    let err = catalog
        .get_class("V")
        .unwrap()
        .set_short_name(&session, Some("IT"))
        .unwrap_err();
    assert!(matches!(err, CatalogError::DuplicateClassName(_)));

    item.set(&session, ClassAttribute::RemoveCluster, "item_archive").unwrap();
    assert_eq!(item.definition().unwrap().cluster_ids().len(), 1);
}

#[timeout(1000)]
#[test]
fn test_set_abstract_requires_empty_class() {
    let records = Arc::new(InMemoryRecordCounter::new());
    let catalog = Catalog::builder(test_config())
        .record_counter(records.clone())
        .build()
        .unwrap();
    let session = SchemaSession::default();
    let item = catalog.create_class(&session, "Item", &[], &[]).unwrap();
    let cluster = item.definition().unwrap().cluster_ids()[0];

    records.set(cluster, 3);
    assert_eq!(item.count(false).unwrap(), 3);
    let err = item.set_abstract(&session, true).unwrap_err();
    assert!(matches!(err, CatalogError::InvalidConstraint { .. }));

    records.set(cluster, 0);
    item.set_abstract(&session, true).unwrap();
    assert!(item.definition().unwrap().is_abstract());
    assert!(catalog.class_by_cluster_id(cluster).is_none());

    item.set_abstract(&session, false).unwrap();
    let definition = item.definition().unwrap();
    assert!(!definition.is_abstract());
    assert_eq!(definition.cluster_ids().len(), 1);
}

#[timeout(1000)]
#[test]
fn test_active_transaction_rejected() {
    let catalog = new_catalog();
    let session = SchemaSession::new("writer");
    session.begin_transaction();
    assert_eq!(
        catalog.create_class(&session, "Person", &[], &[]).unwrap_err(),
        CatalogError::ActiveTransaction {
            session: session.id()
        }
    );
    session.end_transaction();
    catalog.create_class(&session, "Person", &[], &[]).unwrap();
}

#[timeout(1000)]
#[test]
fn test_schema_locked() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    let guard = catalog.write_lock.lock();
    let err = catalog.create_class(&session, "Person", &[], &[]).unwrap_err();
    assert!(matches!(err, CatalogError::SchemaLocked { .. }));
    drop(guard);
    catalog.create_class(&session, "Person", &[], &[]).unwrap();
}

#[timeout(1000)]
#[test]
fn test_global_property_idempotent() {
    let catalog = new_catalog();
    let first = catalog
        .create_global_property("name", PropertyType::String)
        .unwrap();
    let again = catalog
        .create_global_property("name", PropertyType::String)
        .unwrap();
    assert_eq!(first, again);
    assert!(matches!(
        catalog.create_global_property("name", PropertyType::Integer),
        Err(CatalogError::PropertyNameConflict { .. })
    ));
    assert_eq!(catalog.global_properties().len(), 1);
}

#[timeout(1000)]
#[test]
fn test_snapshot_isolation_and_caching() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    catalog.create_class(&session, "Person", &[], &[]).unwrap();

    let before = catalog.make_snapshot();
    assert!(Arc::ptr_eq(&before, &catalog.make_snapshot()));

    catalog.create_class(&session, "Company", &[], &[]).unwrap();
    assert!(before.get_class("Company").is_none());
    assert_eq!(before.count_classes(), 1);

    let after = catalog.make_snapshot();
    assert!(!Arc::ptr_eq(&before, &after));
    assert!(after.get_class("company").is_some());

    catalog
        .create_global_property("tag", PropertyType::String)
        .unwrap();
    let with_global = catalog.make_snapshot();
    assert!(!Arc::ptr_eq(&after, &with_global));
    assert_eq!(with_global.global_properties().len(), 1);
}

struct CountingListener {
    created: AtomicUsize,
    dropped: AtomicUsize,
    views: AtomicUsize,
}

impl SchemaListener for CountingListener {
    fn on_create_class(&self, _class: &str) {
        self.created.fetch_add(1, Ordering::SeqCst);
    }

    fn on_drop_class(&self, _class: &str) {
        self.dropped.fetch_add(1, Ordering::SeqCst);
    }

    fn on_create_view(&self, _view: &str) {
        self.views.fetch_add(1, Ordering::SeqCst);
    }
}

#[timeout(1000)]
#[test]
fn test_listeners_notified() {
    let catalog = new_catalog();
    let listener = Arc::new(CountingListener {
        created: AtomicUsize::new(0),
        dropped: AtomicUsize::new(0),
        views: AtomicUsize::new(0),
    });
    catalog.add_listener(listener.clone());
    let session = SchemaSession::default();

    catalog.create_class(&session, "A", &[], &[]).unwrap();
    catalog.create_class(&session, "A", &[], &[]).unwrap_err();
    catalog.drop_class(&session, "A").unwrap();
    assert_eq!(listener.created.load(Ordering::SeqCst), 1);
    assert_eq!(listener.dropped.load(Ordering::SeqCst), 1);
}

#[timeout(1000)]
#[test]
fn test_create_view_derives_index_configs() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    let person = catalog.create_class(&session, "Person", &[], &[]).unwrap();
    person.create_property(&session, "age", PropertyType::Integer).unwrap();
    person.create_property(&session, "name", PropertyType::String).unwrap();

    let view = catalog
        .create_view(
            &session,
            ViewConfig::new("Adults", "select from Person where age >= 18 and name is not null"),
            None,
        )
        .unwrap();
    let fields: Vec<Vec<String>> = view
        .required_index_configs()
        .iter()
        .map(|c| c.field_names())
        .collect();
    assert_eq!(fields, vec![vec!["age".to_string()], vec!["name".to_string()]]);
    assert!(view.active_index_names().is_empty());
    assert_eq!(view.refresh_state(), &RefreshState::Pending);
    assert_eq!(view.update_interval_seconds(), 30);
    assert!(view.as_class().own_property("age").is_some());
    assert_eq!(catalog.view_by_cluster_id(view.cluster_ids()[0]).unwrap().name(), "Adults");
    assert!(catalog.get_class("Adults").is_none());
    assert!(catalog.exists_class("adults"));
}

#[timeout(1000)]
#[test]
fn test_create_view_errors() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    catalog.create_class(&session, "Person", &[], &[]).unwrap();

    let err = catalog
        .create_view(&session, ViewConfig::new("Ghosts", "select from Ghost"), None)
        .unwrap_err();
    assert!(matches!(err, CatalogError::ViewQueryInvalid { .. }));

    let err = catalog
        .create_view(&session, ViewConfig::new("Broken", "select from"), None)
        .unwrap_err();
    assert!(matches!(err, CatalogError::ViewQueryInvalid { .. }));

    let err = catalog
        .create_view(&session, ViewConfig::new("Person", "select from Person"), None)
        .unwrap_err();
    assert_eq!(err, CatalogError::DuplicateClassName("Person".to_string()));

    let mut config = ViewConfig::new("Spatial", "select from Person");
    config.add_index("SPATIAL", None);
    let err = catalog.create_view(&session, config, None).unwrap_err();
    assert!(matches!(err, CatalogError::IndexEngineUnavailable { .. }));

    let err = catalog.drop_view(&session, "Missing").unwrap_err();
    assert_eq!(
        err,
        CatalogError::ViewNotFound {
            view: "Missing".to_string()
        }
    );
    assert!(catalog.view_names().is_empty());
}

#[timeout(1000)]
#[test]
fn test_view_is_not_a_super_type() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    catalog.create_class(&session, "Person", &[], &[]).unwrap();
    catalog
        .create_view(&session, ViewConfig::new("Everyone", "select from Person"), None)
        .unwrap();
    let err = catalog
        .create_class(&session, "Special", &["Everyone"], &[])
        .unwrap_err();
    assert!(matches!(err, CatalogError::InvalidHierarchy { .. }));
}

#[timeout(2000)]
#[test]
fn test_create_view_listener_called() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    let person = catalog.create_class(&session, "Person", &[], &[]).unwrap();
    person.create_property(&session, "age", PropertyType::Integer).unwrap();

    let (sender, receiver) = mpsc::channel();
    let listener: ViewCreationListener = Box::new(move |name, result| {
        let _ = sender.send((name.to_string(), result));
    });
    catalog
        .create_view(
            &session,
            ViewConfig::new("Adults", "select from Person where age >= 18"),
            Some(listener),
        )
        .unwrap();

    let (name, result) = receiver.recv_timeout(Duration::from_millis(1500)).unwrap();
    assert_eq!(name, "Adults");
    assert!(result.is_ok());
    let view = catalog.get_view("Adults").unwrap();
    assert_eq!(view.generation(), 1);
    assert_eq!(view.active_index_names(), view.implied_index_names().as_slice());
}

#[timeout(1000)]
#[test]
fn test_blob_clusters() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    let person = catalog.create_class(&session, "Person", &[], &[]).unwrap();
    let owned = person.definition().unwrap().cluster_ids()[0];

    catalog.add_blob_cluster(&session, 90).unwrap();
    catalog.add_blob_cluster(&session, 90).unwrap();
    assert_eq!(catalog.blob_clusters(), vec![90]);
    assert!(matches!(
        catalog.add_blob_cluster(&session, owned),
        Err(CatalogError::ClusterInUse { .. })
    ));
    catalog.remove_blob_cluster(&session, 90).unwrap();
    assert!(catalog.blob_clusters().is_empty());
}

#[timeout(1000)]
#[test]
fn test_classes_rely_on_cluster() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    catalog.create_class(&session, "V", &[], &[]).unwrap();
    catalog.create_class(&session, "Person", &["V"], &[]).unwrap();
    assert_eq!(
        catalog.classes_rely_on_cluster("person"),
        vec!["Person".to_string(), "V".to_string()]
    );
    assert!(catalog.classes_rely_on_cluster("nothing").is_empty());
}

#[timeout(1000)]
#[test]
fn test_save_and_reload() {
    let catalog = new_catalog();
    let session = SchemaSession::default();
    let person = catalog.create_class(&session, "Person", &[], &[]).unwrap();
    person.create_property(&session, "age", PropertyType::Integer).unwrap();
    catalog.save().unwrap();

    catalog.create_class(&session, "Scratch", &[], &[]).unwrap();
    let version = catalog.version();
    catalog.reload().unwrap();

    assert!(catalog.exists_class("Person"));
    assert!(!catalog.exists_class("Scratch"));
    assert!(catalog.version() > version);
    let age = catalog
        .get_class("Person")
        .unwrap()
        .property_definition("age")
        .unwrap();
    assert_eq!(
        catalog.global_property_by_id(age.id()).unwrap().property_type(),
        PropertyType::Integer
    );
}

#[timeout(1000)]
#[test]
fn test_required_index_configs_dedupe() {
    let parsed = ParsedQuery {
        target: "Person".to_string(),
        projections: Vec::new(),
        filter_fields: vec!["age".to_string(), "unknown".to_string(), "AGE".to_string()],
    };
    let properties = vec![PropertyDescriptor::new("age", 0, PropertyType::Integer)];
    let mut explicit = ViewIndexConfig::new("UNIQUE", None);
    explicit.add_property(
        "age",
        PropertyType::Integer,
        None,
        crate::types::Collate::Default,
        IndexBy::Key,
    );

    let configs = required_index_configs(&parsed, &properties, &[explicit.clone()]);
    assert_eq!(configs, vec![explicit]);

    let configs = required_index_configs(&parsed, &properties, &[]);
    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0].index_type, "NOTUNIQUE");
    assert_eq!(configs[0].properties()[0].index_by, IndexBy::Key);
}

#[timeout(1000)]
#[test]
fn test_missing_super_class_is_invalid_hierarchy() {
    let catalog = new_catalog();
    let session = SchemaSession::default();

    let err = catalog
        .create_class(&session, "B", &["Missing"], &[])
        .unwrap_err();
    assert_eq!(
        err,
        CatalogError::InvalidHierarchy {
            class: "B".to_string(),
            reason: "'Missing' does not exist".to_string(),
        }
    );
    assert!(!catalog.exists_class("B"));

    let b = catalog.create_class(&session, "B", &[], &[]).unwrap();
    let err = b.add_super_class(&session, "Missing").unwrap_err();
    assert!(matches!(err, CatalogError::InvalidHierarchy { .. }));
    assert!(b.definition().unwrap().super_classes().is_empty());
}

/// Index manager that parks inside `create_index` and `drop_index` after the
/// inner manager has applied the change, until the test releases it.
struct GatedIndexManager {
    inner: InMemoryIndexManager,
    armed: std::sync::atomic::AtomicBool,
    reached: Mutex<mpsc::Sender<()>>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl GatedIndexManager {
    fn new() -> (Arc<Self>, mpsc::Receiver<()>, mpsc::Sender<()>) {
        let (reached_tx, reached_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let manager = Arc::new(Self {
            inner: InMemoryIndexManager::new(),
            armed: std::sync::atomic::AtomicBool::new(false),
            reached: Mutex::new(reached_tx),
            release: Mutex::new(release_rx),
        });
        (manager, reached_rx, release_tx)
    }

    fn park(&self) {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.reached.lock().send(()).unwrap();
            self.release
                .lock()
                .recv_timeout(Duration::from_millis(500))
                .unwrap();
        }
    }
}

impl IndexManager for GatedIndexManager {
    fn has_engine(&self, index_type: &str, engine: Option<&str>) -> bool {
        self.inner.has_engine(index_type, engine)
    }

    fn create_index(&self, definition: IndexDefinition) -> Result<IndexDefinition> {
        let created = self.inner.create_index(definition)?;
        self.park();
        Ok(created)
    }

    fn drop_index(&self, name: &str) -> Result<()> {
        self.inner.drop_index(name)?;
        self.park();
        Ok(())
    }

    fn get_index(&self, name: &str) -> Option<IndexDefinition> {
        self.inner.get_index(name)
    }

    fn class_indexes(&self, class_name: &str) -> Vec<IndexDefinition> {
        self.inner.class_indexes(class_name)
    }

    fn all_indexes(&self) -> Vec<IndexDefinition> {
        self.inner.all_indexes()
    }

    fn rename_class(&self, old_name: &str, new_name: &str) -> Result<()> {
        self.inner.rename_class(old_name, new_name)
    }
}

fn gated_catalog(manager: &Arc<GatedIndexManager>) -> Arc<Catalog> {
    Catalog::builder(test_config())
        .index_manager(Arc::clone(manager) as Arc<dyn IndexManager>)
        .build()
        .unwrap()
}

#[timeout(1000)]
#[test]
fn test_snapshot_ignores_index_creation_in_flight() {
    let (manager, reached, release) = GatedIndexManager::new();
    let catalog = gated_catalog(&manager);
    let session = SchemaSession::default();
    let doc = catalog.create_class(&session, "Doc", &[], &[]).unwrap();
    doc.create_property(&session, "a", PropertyType::String).unwrap();
    let version = catalog.version();

    manager.armed.store(true, Ordering::SeqCst);
    std::thread::scope(|scope| {
        let creator = scope.spawn(|| {
            let session = SchemaSession::default();
            catalog
                .get_class("Doc")
                .unwrap()
                .create_index(&session, "Doc.a", "NOTUNIQUE", &["a"])
        });

        reached.recv_timeout(Duration::from_millis(500)).unwrap();
        assert!(manager.get_index("Doc.a").is_some());
        let during = catalog.make_snapshot();
        assert_eq!(during.version(), version);
        assert!(during.get_class("Doc").unwrap().class_indexes().is_empty());
        assert!(doc.class_indexes().is_empty());

        release.send(()).unwrap();
        creator.join().unwrap().unwrap();
    });

    let after = catalog.make_snapshot();
    assert_eq!(after.version(), version + 1);
    let indexes = after.get_class("Doc").unwrap().class_indexes();
    assert_eq!(indexes.len(), 1);
    assert_eq!(indexes[0].name, "Doc.a");
}

#[timeout(1000)]
#[test]
fn test_drop_class_releases_indexes_after_commit() {
    let (manager, reached, release) = GatedIndexManager::new();
    let catalog = gated_catalog(&manager);
    let session = SchemaSession::default();
    let doc = catalog.create_class(&session, "Doc", &[], &[]).unwrap();
    doc.create_property(&session, "a", PropertyType::String).unwrap();
    doc.create_index(&session, "Doc.a", "NOTUNIQUE", &["a"]).unwrap();
    let version = catalog.version();

    manager.armed.store(true, Ordering::SeqCst);
    std::thread::scope(|scope| {
        let dropper = scope.spawn(|| {
            let session = SchemaSession::default();
            catalog.drop_class(&session, "Doc")
        });

        // The index goes only once the drop is visible.
        reached.recv_timeout(Duration::from_millis(500)).unwrap();
        let during = catalog.make_snapshot();
        assert_eq!(during.version(), version + 1);
        assert!(during.get_class("Doc").is_none());

        release.send(()).unwrap();
        let removed = dropper.join().unwrap().unwrap();
        assert_eq!(removed.indexes, vec!["Doc.a".to_string()]);
    });

    assert!(manager.get_index("Doc.a").is_none());
}

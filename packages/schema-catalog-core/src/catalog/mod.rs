//! Mutable schema catalog.
//!
//! Readers load the published [`state::CatalogState`] without locking.
//! Writers serialize on a single schema lock, apply their change to a clone
//! of the published state and swap the clone in, so every reader sees either
//! the whole change or none of it.

mod handle;
pub(crate) mod state;


use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use arc_swap::{ArcSwap, ArcSwapOption};
use parking_lot::{Mutex, RwLock};

use crate::cluster::{
    ClusterManager, ClusterSelectionFactory, InMemoryClusterManager, InMemoryRecordCounter,
    RecordCounter, ABSTRACT_CLUSTER_ID,
};
use crate::config::CatalogConfig;
use crate::error::{CatalogError, Result};
use crate::index::{InMemoryIndexManager, IndexDefinition, IndexManager};
use crate::persistence::{FileSchemaStore, MemorySchemaStore, SchemaFile, SchemaStore};
use crate::query::{ParsedQuery, QueryParser, SimpleQueryParser};
use crate::registry::{GlobalProperty, GlobalPropertyRegistry};
use crate::schema::constraint::{check_class_name, check_property_name};
use crate::schema::{
    name_key, ClassDefinition, ClassRemovedMetadata, IndexBy, PropertyDescriptor, RefreshState,
    ViewConfig, ViewDefinition, ViewIndexConfig, ViewRemovedMetadata,
};
use crate::session::SchemaSession;
use crate::snapshot::CatalogSnapshot;
use crate::types::PropertyType;
use crate::view_manager::{NoopViewRefresher, ViewManager, ViewRefresher};

pub use handle::{ClassHandle, PropertyHandle};

use state::CatalogState;

/// Receives notifications after schema changes commit.
///
/// Callbacks run on the thread that made the change, after the schema lock
/// is released.
pub trait SchemaListener: Send + Sync {
    fn on_create_class(&self, _class: &str) {}
    fn on_drop_class(&self, _class: &str) {}
    fn on_create_view(&self, _view: &str) {}
    fn on_drop_view(&self, _view: &str) {}
}

/// Called once when the first population of a new view finishes.
pub type ViewCreationListener = Box<dyn FnOnce(&str, Result<()>) + Send + 'static>;

#[derive(Debug, Clone)]
pub(crate) enum SchemaEvent {
    CreateClass(String),
    DropClass(String),
    CreateView(String),
    DropView(String),
}

/// Assembles a [`Catalog`] with its collaborators.
///
/// Collaborators not supplied get in-memory implementations.
pub struct CatalogBuilder {
    config: CatalogConfig,
    clusters: Option<Arc<dyn ClusterManager>>,
    indexes: Option<Arc<dyn IndexManager>>,
    parser: Option<Arc<dyn QueryParser>>,
    records: Option<Arc<dyn RecordCounter>>,
    refresher: Option<Arc<dyn ViewRefresher>>,
    store: Option<Arc<dyn SchemaStore>>,
    selection: ClusterSelectionFactory,
}

impl CatalogBuilder {
    pub fn new(config: CatalogConfig) -> Self {
        Self {
            config,
            clusters: None,
            indexes: None,
            parser: None,
            records: None,
            refresher: None,
            store: None,
            selection: ClusterSelectionFactory::default(),
        }
    }

    pub fn cluster_manager(mut self, clusters: Arc<dyn ClusterManager>) -> Self {
        self.clusters = Some(clusters);
        self
    }

    pub fn index_manager(mut self, indexes: Arc<dyn IndexManager>) -> Self {
        self.indexes = Some(indexes);
        self
    }

    pub fn query_parser(mut self, parser: Arc<dyn QueryParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn record_counter(mut self, records: Arc<dyn RecordCounter>) -> Self {
        self.records = Some(records);
        self
    }

    pub fn view_refresher(mut self, refresher: Arc<dyn ViewRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Overrides the schema store. Without one, a file store in
    /// `data_dir` is used when `persist_on_commit` is set, otherwise an
    /// in-memory store.
    pub fn schema_store(mut self, store: Arc<dyn SchemaStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn cluster_selection_factory(mut self, selection: ClusterSelectionFactory) -> Self {
        self.selection = selection;
        self
    }

    /// Builds the catalog and loads the stored schema record, if any.
    pub fn build(self) -> Result<Arc<Catalog>> {
        self.selection.create(&self.config.default_cluster_selection)?;

        let store: Arc<dyn SchemaStore> = match self.store {
            Some(store) => store,
            None if self.config.persist_on_commit => Arc::new(FileSchemaStore::new(&self.config)),
            None => Arc::new(MemorySchemaStore::new()),
        };

        let catalog = Catalog {
            registry: Arc::new(GlobalPropertyRegistry::new()),
            state: ArcSwap::from_pointee(CatalogState::default()),
            write_lock: Mutex::new(()),
            snapshot: ArcSwapOption::empty(),
            snapshot_lock: Mutex::new(()),
            clusters: self
                .clusters
                .unwrap_or_else(|| Arc::new(InMemoryClusterManager::new())),
            indexes: self
                .indexes
                .unwrap_or_else(|| Arc::new(InMemoryIndexManager::new())),
            parser: self.parser.unwrap_or_else(|| Arc::new(SimpleQueryParser)),
            records: self
                .records
                .unwrap_or_else(|| Arc::new(InMemoryRecordCounter::new())),
            refresher: self
                .refresher
                .unwrap_or_else(|| Arc::new(NoopViewRefresher)),
            store,
            selection: self.selection,
            listeners: RwLock::new(Vec::new()),
            views: ViewManager::new(),
            config: self.config,
        };

        match catalog.store.load()? {
            Some(schema) => {
                let state = catalog.restore_state(&schema)?;
                catalog.state.store(Arc::new(state));
                tracing::info!(
                    "Loaded schema version {} ({} classes, {} views)",
                    schema.schema_version,
                    schema.classes.len(),
                    schema.views.len()
                );
            }
            None => {
                let state = CatalogState {
                    indexes: catalog.stored_indexes(),
                    ..Default::default()
                };
                catalog.state.store(Arc::new(state));
            }
        }
        Ok(Arc::new(catalog))
    }
}

/// The schema catalog of one database.
pub struct Catalog {
    config: CatalogConfig,
    registry: Arc<GlobalPropertyRegistry>,
    /// Published state, replaced wholesale on every change
    state: ArcSwap<CatalogState>,
    /// Serializes schema writers
    write_lock: Mutex<()>,
    /// Last snapshot handed out
    snapshot: ArcSwapOption<CatalogSnapshot>,
    snapshot_lock: Mutex<()>,
    clusters: Arc<dyn ClusterManager>,
    indexes: Arc<dyn IndexManager>,
    parser: Arc<dyn QueryParser>,
    records: Arc<dyn RecordCounter>,
    refresher: Arc<dyn ViewRefresher>,
    store: Arc<dyn SchemaStore>,
    selection: ClusterSelectionFactory,
    listeners: RwLock<Vec<Arc<dyn SchemaListener>>>,
    views: ViewManager,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.load();
        f.debug_struct("Catalog")
            .field("version", &state.version)
            .field("classes", &state.classes.len())
            .field("views", &state.views.len())
            .field("global_properties", &self.registry.len())
            .finish()
    }
}

impl Catalog {
    /// Creates a catalog with in-memory collaborators.
    pub fn new(config: CatalogConfig) -> Result<Arc<Self>> {
        CatalogBuilder::new(config).build()
    }

    pub fn builder(config: CatalogConfig) -> CatalogBuilder {
        CatalogBuilder::new(config)
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// Returns the global property registry.
    pub fn registry(&self) -> &Arc<GlobalPropertyRegistry> {
        &self.registry
    }

    pub fn cluster_manager(&self) -> &Arc<dyn ClusterManager> {
        &self.clusters
    }

    pub fn index_manager(&self) -> &Arc<dyn IndexManager> {
        &self.indexes
    }

    pub fn view_manager(&self) -> &ViewManager {
        &self.views
    }

    /// Number of committed schema changes.
    pub fn version(&self) -> u64 {
        self.state.load().version
    }

    pub(crate) fn current_state(&self) -> Arc<CatalogState> {
        self.state.load_full()
    }

    pub(crate) fn record_counter(&self) -> &Arc<dyn RecordCounter> {
        &self.records
    }

    pub(crate) fn refresher(&self) -> &Arc<dyn ViewRefresher> {
        &self.refresher
    }

    pub(crate) fn selection_factory(&self) -> &ClusterSelectionFactory {
        &self.selection
    }

    pub fn add_listener(&self, listener: Arc<dyn SchemaListener>) {
        self.listeners.write().push(listener);
    }

    /// Applies one schema change.
    ///
    /// The change runs against a private clone of the published state while
    /// the schema lock is held. On success the clone is published with the
    /// next version; on error nothing is published.
    ///
    /// # Arguments
    /// * `session` - Session making the change, checked for open transactions
    /// * `operation` - Short description used in log messages
    /// * `apply` - Change to apply; may queue events for listeners
    ///
    /// # Returns
    /// `Result<T>` with the value returned by `apply`.
    pub(crate) fn mutate<T>(
        &self,
        session: Option<&SchemaSession>,
        operation: &str,
        apply: impl FnOnce(&mut CatalogState, &mut Vec<SchemaEvent>) -> Result<T>,
    ) -> Result<T> {
        if let Some(session) = session {
            if session.is_transaction_active() {
                return Err(CatalogError::ActiveTransaction {
                    session: session.id(),
                });
            }
        }

        let started = Instant::now();
        let guard = self
            .write_lock
            .try_lock_for(self.config.schema_lock_timeout())
            .ok_or_else(|| CatalogError::SchemaLocked {
                waited_ms: started.elapsed().as_millis() as u64,
            })?;

        let current = self.state.load_full();
        let mut next = (*current).clone();
        let mut events = Vec::new();
        let result = apply(&mut next, &mut events)?;
        next.version = current.version + 1;
        let next = Arc::new(next);
        self.state.store(Arc::clone(&next));
        self.persist(&next, operation);
        drop(guard);

        tracing::debug!("Committed {} (schema version {})", operation, next.version);
        self.notify(&events);
        Ok(result)
    }

    fn persist(&self, state: &CatalogState, operation: &str) {
        if !self.config.persist_on_commit {
            return;
        }
        let record = SchemaFile::from_state(state, &self.registry);
        if let Err(e) = self.store.save(&record) {
            tracing::error!("Failed to save schema after {}: {}", operation, e);
        }
    }

    fn notify(&self, events: &[SchemaEvent]) {
        if events.is_empty() {
            return;
        }
        let listeners = self.listeners.read().clone();
        for event in events {
            for listener in &listeners {
                match event {
                    SchemaEvent::CreateClass(name) => listener.on_create_class(name),
                    SchemaEvent::DropClass(name) => listener.on_drop_class(name),
                    SchemaEvent::CreateView(name) => listener.on_create_view(name),
                    SchemaEvent::DropView(name) => listener.on_drop_view(name),
                }
            }
        }
    }

    /// Writes the current schema record to the store.
    pub fn save(&self) -> Result<()> {
        let state = self.state.load_full();
        self.store
            .save(&SchemaFile::from_state(&state, &self.registry))
    }

    /// Rebuilds state from a stored record and resets the registry to it.
    /// Index definitions come from the index manager.
    fn restore_state(&self, schema: &SchemaFile) -> Result<CatalogState> {
        let mut state = schema.to_state(&self.selection)?;
        state.indexes = self.stored_indexes();
        self.registry.reset(&schema.global_properties)?;
        Ok(state)
    }

    fn stored_indexes(&self) -> BTreeMap<String, IndexDefinition> {
        self.indexes
            .all_indexes()
            .into_iter()
            .map(|index| (index.name.clone(), index))
            .collect()
    }

    /// Re-derives the whole catalog from the schema store.
    ///
    /// An empty store yields an empty catalog.
    pub fn reload(&self) -> Result<()> {
        let started = Instant::now();
        let _guard = self
            .write_lock
            .try_lock_for(self.config.schema_lock_timeout())
            .ok_or_else(|| CatalogError::SchemaLocked {
                waited_ms: started.elapsed().as_millis() as u64,
            })?;

        let current_version = self.state.load().version;
        let schema = self.store.load()?.unwrap_or_else(|| {
            SchemaFile::from_state(&CatalogState::default(), &GlobalPropertyRegistry::new())
        });
        let mut next = self.restore_state(&schema)?;
        next.version = next.version.max(current_version) + 1;
        let classes = next.classes.len();
        let views = next.views.len();
        self.state.store(Arc::new(next));
        tracing::info!("Reloaded schema: {} classes, {} views", classes, views);
        Ok(())
    }

    // ---- global properties -------------------------------------------------

    /// Returns the id of the global property `name`, creating it if needed.
    ///
    /// # Arguments
    /// * `name` - Property name, unique across the database
    /// * `property_type` - Type the name is bound to
    ///
    /// # Returns
    /// `Result<u32>` with the id, or `PropertyNameConflict` if the name is
    /// already bound to another type.
    pub fn create_global_property(&self, name: &str, property_type: PropertyType) -> Result<u32> {
        check_property_name(name)?;
        let before = self.registry.len();
        let id = self.registry.create(name, property_type)?;
        if self.registry.len() != before {
            self.persist(&self.state.load(), "create global property");
        }
        Ok(id)
    }

    pub fn global_property_by_id(&self, id: u32) -> Option<GlobalProperty> {
        self.registry.get_by_id(id)
    }

    pub fn global_properties(&self) -> Vec<GlobalProperty> {
        self.registry.all()
    }

    // ---- classes ----------------------------------------------------------

    pub fn exists_class(&self, name: &str) -> bool {
        self.state.load().exists(name)
    }

    /// Handle for a class. Views are not returned.
    pub fn get_class(&self, name: &str) -> Option<ClassHandle<'_>> {
        let key = name_key(name);
        self.state
            .load()
            .classes
            .contains_key(&key)
            .then(|| ClassHandle::new(self, key))
    }

    /// Copy of a class definition as currently published.
    pub fn class_definition(&self, name: &str) -> Option<ClassDefinition> {
        self.state.load().class(name).cloned()
    }

    /// Sorted class names.
    pub fn class_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .load()
            .classes
            .values()
            .map(|c| c.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn count_classes(&self) -> usize {
        self.state.load().classes.len()
    }

    /// Creates a class with explicit or freshly allocated clusters.
    ///
    /// # Arguments
    /// * `session` - Session making the change
    /// * `name` - Class name
    /// * `super_classes` - Direct super-types, in order
    /// * `cluster_ids` - Clusters to own; empty allocates `minimum_clusters`
    ///
    /// # Returns
    /// `Result<ClassHandle>` for the new class.
    pub fn create_class(
        &self,
        session: &SchemaSession,
        name: &str,
        super_classes: &[&str],
        cluster_ids: &[i32],
    ) -> Result<ClassHandle<'_>> {
        let explicit = (!cluster_ids.is_empty()).then_some(cluster_ids);
        self.create_class_internal(session, name, super_classes, explicit, false)
    }

    /// Creates a class that owns no clusters.
    pub fn create_abstract_class(
        &self,
        session: &SchemaSession,
        name: &str,
        super_classes: &[&str],
    ) -> Result<ClassHandle<'_>> {
        self.create_class_internal(session, name, super_classes, None, true)
    }

    /// Returns the class `name`, creating it when missing.
    ///
    /// An existing class matches when `super_classes` is empty or names the
    /// same set of super-types; otherwise `IncompatibleHierarchy` is returned.
    pub fn get_or_create_class(
        &self,
        session: &SchemaSession,
        name: &str,
        super_classes: &[&str],
    ) -> Result<ClassHandle<'_>> {
        if let Some(handle) = self.existing_compatible(name, super_classes)? {
            return Ok(handle);
        }
        match self.create_class(session, name, super_classes, &[]) {
            Err(CatalogError::DuplicateClassName(_)) => self
                .existing_compatible(name, super_classes)?
                .ok_or_else(|| CatalogError::DuplicateClassName(name.to_string())),
            other => other,
        }
    }

    fn existing_compatible(&self, name: &str, super_classes: &[&str]) -> Result<Option<ClassHandle<'_>>> {
        let state = self.state.load();
        if state.views.contains_key(&name_key(name)) {
            return Err(CatalogError::DuplicateClassName(name.to_string()));
        }
        let Some(class) = state.class(name) else {
            return Ok(None);
        };
        if super_classes.is_empty() {
            return Ok(Some(ClassHandle::new(self, name_key(name))));
        }
        let existing: HashSet<String> = class.super_classes.iter().map(|s| name_key(s)).collect();
        let requested: HashSet<String> = super_classes.iter().map(|s| name_key(s)).collect();
        if existing == requested {
            Ok(Some(ClassHandle::new(self, name_key(name))))
        } else {
            Err(CatalogError::IncompatibleHierarchy {
                class: class.name.clone(),
                existing: class.super_classes.join(", "),
                requested: super_classes.join(", "),
            })
        }
    }

    fn create_class_internal(
        &self,
        session: &SchemaSession,
        name: &str,
        super_classes: &[&str],
        cluster_ids: Option<&[i32]>,
        is_abstract: bool,
    ) -> Result<ClassHandle<'_>> {
        check_class_name(name)?;
        let supers: Vec<String> = super_classes.iter().map(|s| s.trim().to_string()).collect();
        let key = name_key(name);

        tracing::info!("Creating class {} (super-types: {:?})", name, supers);
        self.mutate(Some(session), "create class", |state, events| {
            if state.exists(name) {
                return Err(CatalogError::DuplicateClassName(name.to_string()));
            }
            state.check_super_classes(name, &supers)?;
            let strategy = match supers.first().and_then(|parent| state.class(parent)) {
                Some(parent) => self.selection.create(parent.cluster_selection.name())?,
                None => self.selection.create(&self.config.default_cluster_selection)?,
            };

            let ids = if is_abstract {
                vec![ABSTRACT_CLUSTER_ID]
            } else if let Some(ids) = cluster_ids {
                state.check_clusters_are_absent(ids)?;
                ids.to_vec()
            } else {
                self.allocate_clusters(name, self.config.minimum_clusters.max(1))?
            };

            let class = ClassDefinition::new(name, Vec::new(), ids.clone(), strategy);
            state.classes.insert(key.clone(), class);
            state.register_clusters(&key, &ids);
            state.set_super_classes(name, supers.clone())?;
            events.push(SchemaEvent::CreateClass(name.to_string()));
            Ok(())
        })?;
        Ok(ClassHandle::new(self, key))
    }

    /// Adds clusters named after `name`, skipping names already taken.
    pub(crate) fn allocate_clusters(&self, name: &str, count: usize) -> Result<Vec<i32>> {
        let base = name_key(name);
        let mut ids = Vec::with_capacity(count);
        let mut suffix = 1;
        for i in 0..count {
            let mut candidate = if i == 0 {
                base.clone()
            } else {
                format!("{}_{}", base, suffix)
            };
            while self.clusters.cluster_id_by_name(&candidate).is_some() {
                candidate = format!("{}_{}", base, suffix);
                suffix += 1;
            }
            match self.clusters.add_cluster(&candidate) {
                Ok(id) => ids.push(id),
                Err(e) => {
                    self.release_clusters(&ids);
                    return Err(e);
                }
            }
        }
        Ok(ids)
    }

    pub(crate) fn release_clusters(&self, ids: &[i32]) {
        for &id in ids {
            if id == ABSTRACT_CLUSTER_ID {
                continue;
            }
            if let Err(e) = self.clusters.drop_cluster(id) {
                tracing::warn!("Failed to drop cluster {}: {}", id, e);
            }
        }
    }

    pub(crate) fn release_indexes(&self, names: &[String]) {
        for name in names {
            if let Err(e) = self.indexes.drop_index(name) {
                tracing::warn!("Failed to drop index {}: {}", name, e);
            }
        }
    }

    /// Drops a class.
    ///
    /// The class's clusters and indexes are handed to the cluster and index
    /// managers for teardown once the change has committed.
    ///
    /// # Returns
    /// `Result<ClassRemovedMetadata>` listing the released resources, or
    /// `ClassHasSubclasses` while subclasses remain.
    pub fn drop_class(&self, session: &SchemaSession, name: &str) -> Result<ClassRemovedMetadata> {
        let metadata = self.mutate(Some(session), "drop class", |state, events| {
            let key = name_key(name);
            let class = state
                .classes
                .get(&key)
                .ok_or_else(|| CatalogError::class_not_found(name))?;
            if !class.subclasses.is_empty() {
                return Err(CatalogError::ClassHasSubclasses {
                    class: class.name.clone(),
                    subclasses: class.subclasses.join(", "),
                });
            }
            let class = match state.classes.remove(&key) {
                Some(class) => class,
                None => return Err(CatalogError::class_not_found(name)),
            };
            for parent in &class.super_classes {
                if let Some(parent) = state.classes.get_mut(&name_key(parent)) {
                    parent.remove_subclass(&key);
                }
            }
            state.unregister_clusters(&class.cluster_ids);

            let indexes: Vec<String> = state
                .class_indexes(&class.name)
                .into_iter()
                .map(|index| index.name)
                .collect();
            state.remove_indexes(&indexes);
            let clusters: Vec<i32> = class
                .cluster_ids
                .iter()
                .copied()
                .filter(|&id| id != ABSTRACT_CLUSTER_ID)
                .collect();
            events.push(SchemaEvent::DropClass(class.name.clone()));
            Ok(ClassRemovedMetadata { clusters, indexes })
        })?;

        self.release_indexes(&metadata.indexes);
        self.release_clusters(&metadata.clusters);
        tracing::info!(
            "Dropped class {} ({} clusters, {} indexes)",
            name,
            metadata.clusters.len(),
            metadata.indexes.len()
        );
        Ok(metadata)
    }

    /// Class owning a cluster.
    pub fn class_by_cluster_id(&self, cluster_id: i32) -> Option<ClassDefinition> {
        let state = self.state.load();
        state
            .clusters_to_classes
            .get(&cluster_id)
            .and_then(|key| state.classes.get(key))
            .cloned()
    }

    /// The class owning the named cluster followed by its ancestors.
    pub fn classes_rely_on_cluster(&self, cluster_name: &str) -> Vec<String> {
        let Some(id) = self.clusters.cluster_id_by_name(cluster_name) else {
            return Vec::new();
        };
        let state = self.state.load();
        let Some(key) = state.clusters_to_classes.get(&id) else {
            return Vec::new();
        };
        std::iter::once(key.clone())
            .chain(state.ancestors(key))
            .filter_map(|k| state.classes.get(&k).map(|c| c.name.clone()))
            .collect()
    }

    // ---- blob clusters ----------------------------------------------------

    pub fn add_blob_cluster(&self, session: &SchemaSession, cluster_id: i32) -> Result<()> {
        self.mutate(Some(session), "add blob cluster", |state, _| {
            if state.blob_clusters.contains(&cluster_id) {
                return Ok(());
            }
            state.check_clusters_are_absent(&[cluster_id])?;
            state.blob_clusters.insert(cluster_id);
            Ok(())
        })
    }

    pub fn remove_blob_cluster(&self, session: &SchemaSession, cluster_id: i32) -> Result<()> {
        self.mutate(Some(session), "remove blob cluster", |state, _| {
            state.blob_clusters.remove(&cluster_id);
            Ok(())
        })
    }

    pub fn blob_clusters(&self) -> Vec<i32> {
        self.state.load().blob_clusters.iter().copied().collect()
    }

    // ---- views ------------------------------------------------------------

    pub fn get_view(&self, name: &str) -> Option<ViewDefinition> {
        self.state.load().view(name).cloned()
    }

    /// Sorted view names.
    pub fn view_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .load()
            .views
            .values()
            .map(|v| v.name().to_string())
            .collect();
        names.sort();
        names
    }

    pub fn view_by_cluster_id(&self, cluster_id: i32) -> Option<ViewDefinition> {
        let state = self.state.load();
        state
            .clusters_to_views
            .get(&cluster_id)
            .and_then(|key| state.views.get(key))
            .cloned()
    }

    /// Creates a view and, when configured or a listener is given, starts
    /// populating it in the background.
    ///
    /// The index configurations the view requires are derived from the
    /// fields its filter reads plus any explicit `config.indexes`. Indexes
    /// themselves are only built by a refresh.
    ///
    /// # Arguments
    /// * `session` - Session making the change
    /// * `config` - View name, query and metadata
    /// * `listener` - Called once the first population finishes
    ///
    /// # Returns
    /// `Result<ViewDefinition>` as committed, before any population.
    pub fn create_view(
        self: &Arc<Self>,
        session: &SchemaSession,
        config: ViewConfig,
        listener: Option<ViewCreationListener>,
    ) -> Result<ViewDefinition> {
        check_class_name(&config.name)?;
        let parsed = self.parser.parse(&config.query)?;

        tracing::info!("Creating view {} on {}", config.name, parsed.target);
        let view = self.mutate(Some(session), "create view", |state, events| {
            if state.exists(&config.name) {
                return Err(CatalogError::DuplicateClassName(config.name.clone()));
            }
            if !state.exists(&parsed.target) {
                return Err(CatalogError::ViewQueryInvalid {
                    query: config.query.clone(),
                    reason: format!("class '{}' not found", parsed.target),
                });
            }
            for watched in &config.watch_classes {
                if !state.exists(watched) {
                    return Err(CatalogError::class_not_found(watched));
                }
            }

            let properties = state.all_properties(&parsed.target);
            let required = required_index_configs(&parsed, &properties, &config.indexes);
            for index in &required {
                if !self
                    .indexes
                    .has_engine(&index.index_type, index.engine.as_deref())
                {
                    return Err(CatalogError::IndexEngineUnavailable {
                        index_type: index.index_type.clone(),
                        engine: index.engine.clone().unwrap_or_default(),
                    });
                }
            }

            let strategy = self.selection.create(&self.config.default_cluster_selection)?;
            let cluster_ids = self.allocate_clusters(&config.name, 1)?;
            let mut class = ClassDefinition::new(&config.name, Vec::new(), cluster_ids.clone(), strategy);
            for property in &properties {
                class.properties.insert(name_key(&property.name), property.clone());
            }

            let view = ViewDefinition {
                class,
                query: config.query.clone(),
                update_interval_seconds: config
                    .update_interval_seconds
                    .unwrap_or(self.config.default_view_update_interval_seconds),
                watch_classes: config.watch_classes.clone(),
                nodes: config.nodes.clone(),
                required_index_configs: required,
                update_strategy: config.update_strategy,
                active_index_names: Vec::new(),
                last_refresh_time: None,
                origin_rid_field: config.origin_rid_field.clone(),
                updatable: config.updatable,
                refresh_state: RefreshState::Pending,
                generation: 0,
            };
            let key = name_key(&config.name);
            for &id in &cluster_ids {
                state.clusters_to_views.insert(id, key.clone());
            }
            state.views.insert(key, view.clone());
            events.push(SchemaEvent::CreateView(config.name.clone()));
            Ok(view)
        })?;

        if listener.is_some() || self.config.populate_views_on_create {
            self.update_view_async(view.name(), listener);
        }
        Ok(view)
    }

    /// Drops a view.
    ///
    /// The view's clusters and indexes are released once no reader is using
    /// them; the returned metadata lists them.
    pub fn drop_view(&self, session: &SchemaSession, name: &str) -> Result<ViewRemovedMetadata> {
        let metadata = self.mutate(Some(session), "drop view", |state, events| {
            let view = state
                .views
                .remove(&name_key(name))
                .ok_or_else(|| CatalogError::ViewNotFound {
                    view: name.to_string(),
                })?;
            for id in view.cluster_ids() {
                state.clusters_to_views.remove(id);
            }
            state.remove_indexes(&view.active_index_names);
            events.push(SchemaEvent::DropView(view.name().to_string()));
            Ok(ViewRemovedMetadata {
                clusters: view.cluster_ids().to_vec(),
                indexes: view.active_index_names.clone(),
            })
        })?;

        self.views.queue_removed(name, &metadata);
        self.views.clean_unused(self);
        tracing::info!("Dropped view {}", name);
        Ok(metadata)
    }

    /// Refreshes a view on the calling thread.
    pub fn update_view(&self, name: &str) -> Result<()> {
        self.views.update_view(self, name)
    }

    /// Refreshes a view on the rayon pool.
    pub fn update_view_async(self: &Arc<Self>, name: &str, listener: Option<ViewCreationListener>) {
        let catalog = Arc::clone(self);
        let name = name.to_string();
        rayon::spawn(move || {
            let result = catalog.views.update_view(&catalog, &name);
            if let Err(e) = &result {
                tracing::warn!("Failed to populate view {}: {}", name, e);
            }
            if let Some(listener) = listener {
                listener(&name, result);
            }
        });
    }

    /// Refreshes the view that is due next, if any.
    ///
    /// # Returns
    /// `Result<Option<String>>` naming the refreshed view.
    pub fn update_next_view(&self) -> Result<Option<String>> {
        match self.views.next_view_to_update(self) {
            Some(name) => {
                self.views.update_view(self, &name)?;
                Ok(Some(name))
            }
            None => Ok(None),
        }
    }

    /// Marks records of a class as changed, for views that watch it.
    pub fn record_changed(&self, class_name: &str) {
        self.views.record_changed(class_name);
    }

    /// Swaps a refreshed view onto its new cluster and indexes.
    ///
    /// Returns the replaced resources, or `None` if the view no longer exists.
    pub(crate) fn replace_view_cluster_and_indexes(
        &self,
        name: &str,
        cluster_id: i32,
        indexes: Vec<IndexDefinition>,
        generation: u64,
        refreshed_at: u64,
    ) -> Result<Option<ViewRemovedMetadata>> {
        self.mutate(None, "refresh view", |state, _| {
            let key = name_key(name);
            let Some(view) = state.views.get_mut(&key) else {
                return Ok(None);
            };
            let index_names = indexes.iter().map(|index| index.name.clone()).collect();
            let old = ViewRemovedMetadata {
                clusters: std::mem::replace(&mut view.class.cluster_ids, vec![cluster_id]),
                indexes: std::mem::replace(&mut view.active_index_names, index_names),
            };
            view.generation = generation;
            view.last_refresh_time = Some(refreshed_at);
            view.refresh_state = RefreshState::Ready;
            for id in &old.clusters {
                state.clusters_to_views.remove(id);
            }
            state.clusters_to_views.insert(cluster_id, key);
            state.remove_indexes(&old.indexes);
            for index in indexes {
                state.indexes.insert(index.name.clone(), index);
            }
            Ok(Some(old))
        })
    }

    pub(crate) fn record_view_failure(&self, name: &str, reason: &str, failed_at: u64) -> Result<()> {
        self.mutate(None, "record view failure", |state, _| {
            if let Some(view) = state.views.get_mut(&name_key(name)) {
                view.refresh_state = RefreshState::Failed(reason.to_string());
                view.last_refresh_time = Some(failed_at);
            }
            Ok(())
        })
    }

    // ---- snapshots --------------------------------------------------------

    /// Returns an immutable snapshot of the current catalog.
    ///
    /// Snapshots are cached until the schema or the global property
    /// registry changes.
    pub fn make_snapshot(&self) -> Arc<CatalogSnapshot> {
        let state = self.state.load_full();
        if let Some(cached) = self.cached_snapshot(&state) {
            return cached;
        }
        let _guard = self.snapshot_lock.lock();
        if let Some(cached) = self.cached_snapshot(&state) {
            return cached;
        }
        let snapshot = Arc::new(CatalogSnapshot::build(
            &state,
            &self.registry,
            Arc::clone(&self.records),
        ));
        self.snapshot.store(Some(Arc::clone(&snapshot)));
        snapshot
    }

    fn cached_snapshot(&self, state: &CatalogState) -> Option<Arc<CatalogSnapshot>> {
        self.snapshot.load_full().filter(|cached| {
            cached.version() == state.version && cached.registry_len() == self.registry.len()
        })
    }
}

/// Index configurations a view needs: explicit ones first, then one
/// single-field NOTUNIQUE index per filter field not already covered.
pub(crate) fn required_index_configs(
    parsed: &ParsedQuery,
    properties: &[PropertyDescriptor],
    explicit: &[ViewIndexConfig],
) -> Vec<ViewIndexConfig> {
    let mut configs: Vec<ViewIndexConfig> = Vec::new();
    let mut covered: HashSet<Vec<String>> = HashSet::new();

    for config in explicit {
        let fields: Vec<String> = config.field_names().iter().map(|f| name_key(f)).collect();
        if covered.insert(fields) {
            configs.push(config.clone());
        }
    }

    for field in &parsed.filter_fields {
        let Some(property) = properties
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(field))
        else {
            continue;
        };
        if !covered.insert(vec![name_key(&property.name)]) {
            continue;
        }
        let mut config = ViewIndexConfig::new("NOTUNIQUE", None);
        config.add_property(
            property.name.clone(),
            property.property_type,
            property.linked_type,
            property.collate,
            IndexBy::Key,
        );
        configs.push(config);
    }
    configs
}

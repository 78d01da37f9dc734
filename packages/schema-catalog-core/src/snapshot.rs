//! Immutable catalog snapshots for readers.
//!
//! A snapshot owns independent copies of every class, view, index definition
//! and global property captured at construction. It never changes and never
//! locks, so query execution can hold it for as long as it likes.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::catalog::state::CatalogState;
use crate::cluster::RecordCounter;
use crate::error::{CatalogError, Result};
use crate::index::{involved_indexes, IndexDefinition};
use crate::registry::{GlobalProperty, GlobalPropertyRegistry};
use crate::schema::{name_key, ClassDefinition, PropertyDescriptor, ViewDefinition};

/// Frozen class with its hierarchy and indexes resolved.
#[derive(Debug, Clone)]
pub struct SnapshotClass {
    definition: ClassDefinition,
    ancestors: Vec<String>,
    descendants: Vec<String>,
    all_properties: Vec<PropertyDescriptor>,
    polymorphic_cluster_ids: Vec<i32>,
    own_indexes: Vec<IndexDefinition>,
    indexes: Vec<IndexDefinition>,
}

impl SnapshotClass {
    pub fn name(&self) -> &str {
        self.definition.name()
    }

    pub fn definition(&self) -> &ClassDefinition {
        &self.definition
    }

    /// Display names of all ancestors, nearest first.
    pub fn ancestors(&self) -> &[String] {
        &self.ancestors
    }

    /// Display names of all descendants, nearest first.
    pub fn descendants(&self) -> &[String] {
        &self.descendants
    }

    pub fn is_subclass_of(&self, name: &str) -> bool {
        let key = name_key(name);
        name_key(self.name()) == key || self.ancestors.iter().any(|a| name_key(a) == key)
    }

    /// Own and inherited properties.
    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.all_properties
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        let key = name_key(name);
        self.all_properties.iter().find(|p| name_key(p.name()) == key)
    }

    pub fn cluster_ids(&self) -> &[i32] {
        self.definition.cluster_ids()
    }

    pub fn polymorphic_cluster_ids(&self) -> &[i32] {
        &self.polymorphic_cluster_ids
    }

    /// Indexes defined on this class only.
    pub fn class_indexes(&self) -> &[IndexDefinition] {
        &self.own_indexes
    }

    /// Indexes defined on this class and its ancestors.
    pub fn indexes(&self) -> &[IndexDefinition] {
        &self.indexes
    }

    /// Indexes (inherited included) usable for a lookup on exactly `fields`.
    pub fn involved_indexes(&self, fields: &[&str]) -> Vec<IndexDefinition> {
        involved_indexes(&self.indexes, &to_owned(fields))
    }

    /// Like [`involved_indexes`](Self::involved_indexes), own indexes only.
    pub fn class_involved_indexes(&self, fields: &[&str]) -> Vec<IndexDefinition> {
        involved_indexes(&self.own_indexes, &to_owned(fields))
    }

    pub fn are_indexed(&self, fields: &[&str]) -> bool {
        !self.involved_indexes(fields).is_empty()
    }
}

fn to_owned(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|f| f.to_string()).collect()
}

/// Frozen view together with the indexes it had at construction.
#[derive(Debug, Clone)]
pub struct SnapshotView {
    definition: ViewDefinition,
    indexes: Vec<IndexDefinition>,
}

impl SnapshotView {
    pub fn name(&self) -> &str {
        self.definition.name()
    }

    pub fn definition(&self) -> &ViewDefinition {
        &self.definition
    }

    /// Active indexes resolvable at construction.
    pub fn indexes(&self) -> &[IndexDefinition] {
        &self.indexes
    }

    pub fn involved_indexes(&self, fields: &[&str]) -> Vec<IndexDefinition> {
        involved_indexes(&self.indexes, &to_owned(fields))
    }
}

/// Point-in-time copy of the whole catalog.
pub struct CatalogSnapshot {
    version: u64,
    registry_len: usize,
    classes: HashMap<String, SnapshotClass>,
    views: HashMap<String, SnapshotView>,
    clusters_to_classes: HashMap<i32, String>,
    clusters_to_views: HashMap<i32, String>,
    global_properties: Vec<GlobalProperty>,
    blob_clusters: BTreeSet<i32>,
    records: Arc<dyn RecordCounter>,
}

impl std::fmt::Debug for CatalogSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogSnapshot")
            .field("version", &self.version)
            .field("classes", &self.classes.len())
            .field("views", &self.views.len())
            .field("global_properties", &self.global_properties.len())
            .finish()
    }
}

impl CatalogSnapshot {
    /// Copies a published state and resolves per-class derived data.
    pub(crate) fn build(
        state: &CatalogState,
        registry: &GlobalPropertyRegistry,
        records: Arc<dyn RecordCounter>,
    ) -> Self {
        let display = |key: &String| {
            state
                .classes
                .get(key)
                .map(|c| c.name.clone())
                .unwrap_or_else(|| key.clone())
        };

        let mut own_indexes: HashMap<String, Vec<IndexDefinition>> = HashMap::new();
        for (key, class) in &state.classes {
            own_indexes.insert(key.clone(), state.class_indexes(&class.name));
        }

        let mut classes = HashMap::with_capacity(state.classes.len());
        for (key, class) in &state.classes {
            let ancestor_keys = state.ancestors(key);
            let mut indexes: Vec<IndexDefinition> = Vec::new();
            for k in std::iter::once(key).chain(ancestor_keys.iter()) {
                for index in own_indexes.get(k).into_iter().flatten() {
                    if !indexes.iter().any(|i| i.name == index.name) {
                        indexes.push(index.clone());
                    }
                }
            }
            classes.insert(
                key.clone(),
                SnapshotClass {
                    definition: class.clone(),
                    ancestors: ancestor_keys.iter().map(display).collect(),
                    descendants: state.descendants(key).iter().map(display).collect(),
                    all_properties: state.all_properties(key),
                    polymorphic_cluster_ids: state.polymorphic_cluster_ids(key),
                    own_indexes: own_indexes.get(key).cloned().unwrap_or_default(),
                    indexes,
                },
            );
        }

        let views = state
            .views
            .iter()
            .map(|(key, view)| {
                let indexes = view
                    .active_index_names
                    .iter()
                    .filter_map(|name| state.indexes.get(name).cloned())
                    .collect();
                (
                    key.clone(),
                    SnapshotView {
                        definition: view.clone(),
                        indexes,
                    },
                )
            })
            .collect();

        let snapshot = Self {
            version: state.version,
            registry_len: registry.len(),
            classes,
            views,
            clusters_to_classes: state.clusters_to_classes.clone(),
            clusters_to_views: state.clusters_to_views.clone(),
            global_properties: registry.all(),
            blob_clusters: state.blob_clusters.clone(),
            records,
        };
        tracing::debug!(
            "Built schema snapshot version {} ({} classes, {} views)",
            snapshot.version,
            snapshot.classes.len(),
            snapshot.views.len()
        );
        snapshot
    }

    /// Catalog version the snapshot was taken from.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn registry_len(&self) -> usize {
        self.registry_len
    }

    pub fn get_class(&self, name: &str) -> Option<&SnapshotClass> {
        self.classes.get(&name_key(name))
    }

    pub fn get_view(&self, name: &str) -> Option<&SnapshotView> {
        self.views.get(&name_key(name))
    }

    pub fn exists_class(&self, name: &str) -> bool {
        let key = name_key(name);
        self.classes.contains_key(&key) || self.views.contains_key(&key)
    }

    pub fn classes(&self) -> impl Iterator<Item = &SnapshotClass> {
        self.classes.values()
    }

    pub fn views(&self) -> impl Iterator<Item = &SnapshotView> {
        self.views.values()
    }

    /// Sorted class names.
    pub fn class_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.classes.values().map(|c| c.name().to_string()).collect();
        names.sort();
        names
    }

    pub fn count_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn class_by_cluster_id(&self, cluster_id: i32) -> Option<&SnapshotClass> {
        self.clusters_to_classes
            .get(&cluster_id)
            .and_then(|key| self.classes.get(key))
    }

    pub fn view_by_cluster_id(&self, cluster_id: i32) -> Option<&SnapshotView> {
        self.clusters_to_views
            .get(&cluster_id)
            .and_then(|key| self.views.get(key))
    }

    pub fn global_property_by_id(&self, id: u32) -> Option<&GlobalProperty> {
        self.global_properties.iter().find(|p| p.id() == id)
    }

    /// Global properties ordered by id.
    pub fn global_properties(&self) -> &[GlobalProperty] {
        &self.global_properties
    }

    pub fn blob_clusters(&self) -> Vec<i32> {
        self.blob_clusters.iter().copied().collect()
    }

    /// Record count of a class, optionally including subclasses.
    pub fn count(&self, class_name: &str, polymorphic: bool) -> Result<u64> {
        let class = self
            .get_class(class_name)
            .ok_or_else(|| CatalogError::class_not_found(class_name))?;
        let ids: &[i32] = if polymorphic {
            class.polymorphic_cluster_ids()
        } else {
            class.cluster_ids()
        };
        Ok(ids
            .iter()
            .filter(|&&id| id >= 0)
            .map(|&id| self.records.count(id))
            .sum())
    }

    /// Cluster the class's selection strategy picks for a new record.
    pub fn cluster_for_new_record(&self, class_name: &str) -> Result<Option<i32>> {
        let class = self
            .get_class(class_name)
            .ok_or_else(|| CatalogError::class_not_found(class_name))?;
        Ok(class
            .definition
            .cluster_selection()
            .select(class.cluster_ids(), self.records.as_ref()))
    }

    /// Indexes of a class (inherited included) usable for a lookup on `fields`.
    pub fn involved_indexes(&self, class_name: &str, fields: &[&str]) -> Result<Vec<IndexDefinition>> {
        self.get_class(class_name)
            .map(|c| c.involved_indexes(fields))
            .ok_or_else(|| CatalogError::class_not_found(class_name))
    }

    pub fn are_indexed(&self, class_name: &str, fields: &[&str]) -> Result<bool> {
        Ok(!self.involved_indexes(class_name, fields)?.is_empty())
    }
}

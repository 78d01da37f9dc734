//! View refresh scheduling and release of superseded view resources.
//!
//! A refresh builds the view into a fresh cluster with fresh indexes and then
//! swaps them in. The previous cluster and indexes are queued and only
//! dropped once no reader is visiting them.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::catalog::Catalog;
use crate::error::{CatalogError, Result};
use crate::index::IndexDefinition;
use crate::schema::{name_key, UpdateStrategy, ViewDefinition, ViewRemovedMetadata};

/// Fills a view cluster with the result of the view query.
pub trait ViewRefresher: Send + Sync {
    /// Populates `cluster_id` and returns the number of records written.
    fn populate(&self, view: &ViewDefinition, cluster_id: i32) -> Result<u64>;
}

/// Refresher that writes nothing. Views stay empty but go through the full
/// refresh cycle.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopViewRefresher;

impl ViewRefresher for NoopViewRefresher {
    fn populate(&self, _view: &ViewDefinition, _cluster_id: i32) -> Result<u64> {
        Ok(0)
    }
}

#[derive(Debug, Default)]
struct ViewManagerInner {
    /// Views with a refresh in progress (lower-cased names)
    refreshing: HashSet<String>,
    /// Last record change per class (lower-cased name -> ms)
    last_change: HashMap<String, u64>,
    cluster_visitors: HashMap<i32, usize>,
    index_visitors: HashMap<String, usize>,
    /// Superseded clusters waiting for release -> view name
    old_clusters: HashMap<i32, String>,
    old_indexes: HashSet<String>,
}

/// Tracks view refreshes and the resources readers are still using.
#[derive(Debug, Default)]
pub struct ViewManager {
    inner: Mutex<ViewManagerInner>,
}

fn index_names(indexes: &[IndexDefinition]) -> Vec<String> {
    indexes.iter().map(|index| index.name.clone()).collect()
}

/// Current wall-clock time in milliseconds.
pub(crate) fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

impl ViewManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that rows of `class_name` changed now.
    pub fn record_changed(&self, class_name: &str) {
        self.record_changed_at(class_name, now_millis());
    }

    pub(crate) fn record_changed_at(&self, class_name: &str, at: u64) {
        let mut inner = self.inner.lock();
        let entry = inner.last_change.entry(name_key(class_name)).or_insert(0);
        *entry = (*entry).max(at);
    }

    pub fn is_refreshing(&self, view_name: &str) -> bool {
        self.inner.lock().refreshing.contains(&name_key(view_name))
    }

    /// Picks a view that is due for a batch refresh on this node.
    ///
    /// A view is due when it has never been refreshed, or its interval has
    /// expired and either it watches no classes or one of its watched
    /// classes changed since the last refresh. Live views and views already
    /// refreshing are skipped.
    pub fn next_view_to_update(&self, catalog: &Catalog) -> Option<String> {
        self.next_view_to_update_at(catalog, now_millis())
    }

    pub(crate) fn next_view_to_update_at(&self, catalog: &Catalog, now: u64) -> Option<String> {
        let state = catalog.current_state();
        let inner = self.inner.lock();
        let node = catalog.config().local_node_name.as_str();

        let mut views: Vec<&ViewDefinition> = state.views.values().collect();
        views.sort_by(|a, b| a.name().cmp(b.name()));

        views
            .into_iter()
            .find(|view| {
                if !view.is_built_on(node)
                    || view.update_strategy() == UpdateStrategy::Live
                    || inner.refreshing.contains(&name_key(view.name()))
                {
                    return false;
                }
                let Some(last) = view.last_refresh_time() else {
                    return true;
                };
                let due_at = last.saturating_add(view.update_interval_seconds().saturating_mul(1000));
                if due_at >= now {
                    return false;
                }
                view.watch_classes().is_empty()
                    || view.watch_classes().iter().any(|class| {
                        inner
                            .last_change
                            .get(&name_key(class))
                            .is_some_and(|&changed| changed > last)
                    })
            })
            .map(|view| view.name().to_string())
    }

    /// Rebuilds a view into a new cluster with new indexes.
    ///
    /// Returns immediately if the view is already being refreshed. On
    /// failure the view keeps its previous data and records the failure.
    pub fn update_view(&self, catalog: &Catalog, name: &str) -> Result<()> {
        let view = catalog
            .current_state()
            .view(name)
            .cloned()
            .ok_or_else(|| CatalogError::ViewNotFound {
                view: name.to_string(),
            })?;

        let key = name_key(name);
        if !self.inner.lock().refreshing.insert(key.clone()) {
            tracing::debug!("View {} is already refreshing", name);
            return Ok(());
        }
        let result = self.refresh(catalog, &view);
        self.inner.lock().refreshing.remove(&key);

        if let Err(e) = &result {
            tracing::warn!("Refresh of view {} failed: {}", name, e);
            if let Err(record_error) = catalog.record_view_failure(name, &e.to_string(), now_millis()) {
                tracing::error!("Failed to record refresh failure of {}: {}", name, record_error);
            }
        }
        result
    }

    fn refresh(&self, catalog: &Catalog, view: &ViewDefinition) -> Result<()> {
        let generation = view.generation() + 1;
        let cluster_name = format!("v_{}_{}", name_key(view.name()), generation);
        let cluster_id = match catalog.allocate_clusters(&cluster_name, 1)?.first() {
            Some(&id) => id,
            None => return Err(CatalogError::Io(format!("No cluster allocated for view {}", view.name()))),
        };

        let records = match catalog.refresher().populate(view, cluster_id) {
            Ok(records) => records,
            Err(e) => {
                catalog.release_clusters(&[cluster_id]);
                return Err(e);
            }
        };

        let mut created: Vec<IndexDefinition> = Vec::with_capacity(view.required_index_configs().len());
        for config in view.required_index_configs() {
            let definition = IndexDefinition::new(
                config.index_name(view.name(), generation),
                view.name(),
                config.field_names(),
                config.index_type.clone(),
            )
            .with_engine(config.engine.clone().unwrap_or_default())
            .with_cluster_ids(vec![cluster_id]);

            match catalog.index_manager().create_index(definition) {
                Ok(index) => created.push(index),
                Err(e) => {
                    catalog.release_indexes(&index_names(&created));
                    catalog.release_clusters(&[cluster_id]);
                    return Err(e);
                }
            }
        }

        let created_names = index_names(&created);
        let replaced = match catalog.replace_view_cluster_and_indexes(
            view.name(),
            cluster_id,
            created,
            generation,
            now_millis(),
        ) {
            Ok(replaced) => replaced,
            Err(e) => {
                catalog.release_indexes(&created_names);
                catalog.release_clusters(&[cluster_id]);
                return Err(e);
            }
        };

        match replaced {
            Some(old) => self.queue_removed(view.name(), &old),
            // Dropped while refreshing: the new resources are orphans.
            None => self.queue_removed(
                view.name(),
                &ViewRemovedMetadata {
                    clusters: vec![cluster_id],
                    indexes: created_names,
                },
            ),
        }
        self.clean_unused(catalog);

        tracing::info!(
            "Refreshed view {} (generation {}, {} records)",
            view.name(),
            generation,
            records
        );
        Ok(())
    }

    pub fn start_using_view_cluster(&self, cluster_id: i32) {
        *self
            .inner
            .lock()
            .cluster_visitors
            .entry(cluster_id)
            .or_insert(0) += 1;
    }

    pub fn end_using_view_cluster(&self, cluster_id: i32) {
        let mut inner = self.inner.lock();
        if let Some(count) = inner.cluster_visitors.get_mut(&cluster_id) {
            *count -= 1;
            if *count == 0 {
                inner.cluster_visitors.remove(&cluster_id);
            }
        }
    }

    pub fn start_using_view_index(&self, index_name: &str) {
        *self
            .inner
            .lock()
            .index_visitors
            .entry(index_name.to_string())
            .or_insert(0) += 1;
    }

    pub fn end_using_view_index(&self, index_name: &str) {
        let mut inner = self.inner.lock();
        if let Some(count) = inner.index_visitors.get_mut(index_name) {
            *count -= 1;
            if *count == 0 {
                inner.index_visitors.remove(index_name);
            }
        }
    }

    /// Name of the view a superseded cluster belonged to.
    pub fn view_from_old_cluster(&self, cluster_id: i32) -> Option<String> {
        self.inner.lock().old_clusters.get(&cluster_id).cloned()
    }

    /// Clusters and indexes queued for release, sorted.
    pub fn pending_release(&self) -> (Vec<i32>, Vec<String>) {
        let inner = self.inner.lock();
        let mut clusters: Vec<i32> = inner.old_clusters.keys().copied().collect();
        clusters.sort_unstable();
        let mut indexes: Vec<String> = inner.old_indexes.iter().cloned().collect();
        indexes.sort();
        (clusters, indexes)
    }

    pub(crate) fn queue_removed(&self, view_name: &str, removed: &ViewRemovedMetadata) {
        let mut inner = self.inner.lock();
        for &id in &removed.clusters {
            inner.old_clusters.insert(id, view_name.to_string());
        }
        for index in &removed.indexes {
            inner.old_indexes.insert(index.clone());
        }
    }

    /// Drops queued clusters and indexes nobody is visiting.
    ///
    /// # Returns
    /// Number of resources released.
    pub fn clean_unused(&self, catalog: &Catalog) -> usize {
        let (clusters, indexes) = {
            let mut inner = self.inner.lock();
            let clusters: Vec<i32> = inner
                .old_clusters
                .keys()
                .copied()
                .filter(|id| !inner.cluster_visitors.contains_key(id))
                .collect();
            for id in &clusters {
                inner.old_clusters.remove(id);
            }
            let indexes: Vec<String> = inner
                .old_indexes
                .iter()
                .filter(|name| !inner.index_visitors.contains_key(*name))
                .cloned()
                .collect();
            for name in &indexes {
                inner.old_indexes.remove(name);
            }
            (clusters, indexes)
        };

        catalog.release_indexes(&indexes);
        catalog.release_clusters(&clusters);
        if !clusters.is_empty() || !indexes.is_empty() {
            tracing::debug!(
                "Released {} view clusters and {} view indexes",
                clusters.len(),
                indexes.len()
            );
        }
        clusters.len() + indexes.len()
    }
}

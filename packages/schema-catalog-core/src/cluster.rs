//! Cluster collaborators: cluster lifecycle, record counts and the
//! strategies that pick a cluster for a new record.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{CatalogError, Result};

/// Cluster id reserved for abstract classes.
pub const ABSTRACT_CLUSTER_ID: i32 = -1;

/// Physical cluster lifecycle, owned by the storage layer.
pub trait ClusterManager: Send + Sync {
    /// Allocates a cluster with the given name and returns its id.
    fn add_cluster(&self, name: &str) -> Result<i32>;

    /// Releases a cluster.
    fn drop_cluster(&self, id: i32) -> Result<()>;

    fn cluster_id_by_name(&self, name: &str) -> Option<i32>;

    fn cluster_name_by_id(&self, id: i32) -> Option<String>;
}

#[derive(Debug, Default)]
struct ClusterTable {
    next_id: i32,
    by_id: BTreeMap<i32, String>,
    by_name: HashMap<String, i32>,
}

/// Cluster manager that only tracks names and ids.
#[derive(Debug, Default)]
pub struct InMemoryClusterManager {
    table: RwLock<ClusterTable>,
}

impl InMemoryClusterManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of all live clusters in ascending order.
    pub fn cluster_ids(&self) -> Vec<i32> {
        self.table.read().by_id.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.table.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ClusterManager for InMemoryClusterManager {
    fn add_cluster(&self, name: &str) -> Result<i32> {
        let key = name.to_lowercase();
        let mut table = self.table.write();
        if table.by_name.contains_key(&key) {
            return Err(CatalogError::InvalidName {
                name: name.to_string(),
                reason: "cluster already exists".to_string(),
            });
        }
        let id = table.next_id;
        table.next_id += 1;
        table.by_id.insert(id, key.clone());
        table.by_name.insert(key, id);
        Ok(id)
    }

    fn drop_cluster(&self, id: i32) -> Result<()> {
        let mut table = self.table.write();
        match table.by_id.remove(&id) {
            Some(name) => {
                table.by_name.remove(&name);
                Ok(())
            }
            None => Err(CatalogError::Io(format!("Cluster {} does not exist", id))),
        }
    }

    fn cluster_id_by_name(&self, name: &str) -> Option<i32> {
        self.table.read().by_name.get(&name.to_lowercase()).copied()
    }

    fn cluster_name_by_id(&self, id: i32) -> Option<String> {
        self.table.read().by_id.get(&id).cloned()
    }
}

/// Number of records stored per cluster.
pub trait RecordCounter: Send + Sync {
    fn count(&self, cluster_id: i32) -> u64;
}

/// Record counter backed by a map, updated by the caller.
#[derive(Debug, Default)]
pub struct InMemoryRecordCounter {
    counts: RwLock<HashMap<i32, u64>>,
}

impl InMemoryRecordCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, cluster_id: i32, count: u64) {
        self.counts.write().insert(cluster_id, count);
    }

    pub fn increment(&self, cluster_id: i32) {
        *self.counts.write().entry(cluster_id).or_insert(0) += 1;
    }
}

impl RecordCounter for InMemoryRecordCounter {
    fn count(&self, cluster_id: i32) -> u64 {
        self.counts.read().get(&cluster_id).copied().unwrap_or(0)
    }
}

/// Picks the cluster a new record of a class is written to.
pub trait ClusterSelectionStrategy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Returns `None` when the class has no usable cluster.
    fn select(&self, cluster_ids: &[i32], records: &dyn RecordCounter) -> Option<i32>;
}

/// Cycles through the clusters of the class.
#[derive(Debug, Default)]
pub struct RoundRobinClusterSelection {
    pointer: AtomicUsize,
}

impl ClusterSelectionStrategy for RoundRobinClusterSelection {
    fn name(&self) -> &'static str {
        "round-robin"
    }

    fn select(&self, cluster_ids: &[i32], _records: &dyn RecordCounter) -> Option<i32> {
        let usable: Vec<i32> = cluster_ids
            .iter()
            .copied()
            .filter(|&id| id != ABSTRACT_CLUSTER_ID)
            .collect();
        if usable.is_empty() {
            return None;
        }
        let next = self.pointer.fetch_add(1, Ordering::Relaxed);
        Some(usable[next % usable.len()])
    }
}

/// Always the first cluster of the class.
#[derive(Debug, Default)]
pub struct DefaultClusterSelection;

impl ClusterSelectionStrategy for DefaultClusterSelection {
    fn name(&self) -> &'static str {
        "default"
    }

    fn select(&self, cluster_ids: &[i32], _records: &dyn RecordCounter) -> Option<i32> {
        cluster_ids
            .iter()
            .copied()
            .find(|&id| id != ABSTRACT_CLUSTER_ID)
    }
}

/// The cluster currently holding the fewest records.
#[derive(Debug, Default)]
pub struct BalancedClusterSelection;

impl ClusterSelectionStrategy for BalancedClusterSelection {
    fn name(&self) -> &'static str {
        "balanced"
    }

    fn select(&self, cluster_ids: &[i32], records: &dyn RecordCounter) -> Option<i32> {
        cluster_ids
            .iter()
            .copied()
            .filter(|&id| id != ABSTRACT_CLUSTER_ID)
            .min_by_key(|&id| records.count(id))
    }
}

type StrategyConstructor = fn() -> Arc<dyn ClusterSelectionStrategy>;

/// Creates cluster selection strategies by name.
#[derive(Debug, Clone)]
pub struct ClusterSelectionFactory {
    constructors: HashMap<String, StrategyConstructor>,
}

impl Default for ClusterSelectionFactory {
    fn default() -> Self {
        let mut factory = Self {
            constructors: HashMap::new(),
        };
        factory.register("round-robin", || Arc::new(RoundRobinClusterSelection::default()));
        factory.register("default", || Arc::new(DefaultClusterSelection));
        factory.register("balanced", || Arc::new(BalancedClusterSelection));
        factory
    }
}

impl ClusterSelectionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a strategy constructor.
    pub fn register(&mut self, name: &str, constructor: StrategyConstructor) {
        self.constructors.insert(name.to_lowercase(), constructor);
    }

    /// Creates a fresh strategy instance.
    pub fn create(&self, name: &str) -> Result<Arc<dyn ClusterSelectionStrategy>> {
        self.constructors
            .get(&name.trim().to_lowercase())
            .map(|constructor| constructor())
            .ok_or_else(|| CatalogError::InvalidName {
                name: name.to_string(),
                reason: "unknown cluster selection strategy".to_string(),
            })
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.keys().cloned().collect();
        names.sort();
        names
    }
}

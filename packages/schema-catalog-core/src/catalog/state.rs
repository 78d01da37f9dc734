//! Published catalog state.
//!
//! A `CatalogState` is never changed once published. Writers clone it, apply
//! their change to the clone and swap the clone in.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::cluster::ABSTRACT_CLUSTER_ID;
use crate::error::{CatalogError, Result};
use crate::index::IndexDefinition;
use crate::schema::{name_key, ClassDefinition, PropertyDescriptor, ViewDefinition};

#[derive(Debug, Clone, Default)]
pub(crate) struct CatalogState {
    pub version: u64,
    /// lower-cased name -> class
    pub classes: HashMap<String, ClassDefinition>,
    /// lower-cased name -> view
    pub views: HashMap<String, ViewDefinition>,
    /// cluster id -> lower-cased class name
    pub clusters_to_classes: HashMap<i32, String>,
    /// cluster id -> lower-cased view name
    pub clusters_to_views: HashMap<i32, String>,
    pub blob_clusters: BTreeSet<i32>,
    /// index name -> definition as of this version
    pub indexes: BTreeMap<String, IndexDefinition>,
}

impl CatalogState {
    pub fn class(&self, name: &str) -> Option<&ClassDefinition> {
        self.classes.get(&name_key(name))
    }

    pub fn class_mut(&mut self, name: &str) -> Result<&mut ClassDefinition> {
        self.classes
            .get_mut(&name_key(name))
            .ok_or_else(|| CatalogError::class_not_found(name))
    }

    pub fn view(&self, name: &str) -> Option<&ViewDefinition> {
        self.views.get(&name_key(name))
    }

    /// Class side of a class or view.
    pub fn class_or_view(&self, name: &str) -> Option<&ClassDefinition> {
        let key = name_key(name);
        self.classes
            .get(&key)
            .or_else(|| self.views.get(&key).map(|v| v.as_class()))
    }

    pub fn exists(&self, name: &str) -> bool {
        let key = name_key(name);
        self.classes.contains_key(&key) || self.views.contains_key(&key)
    }

    /// Name of the class or view owning a cluster.
    pub fn cluster_owner(&self, cluster_id: i32) -> Option<String> {
        if let Some(key) = self.clusters_to_classes.get(&cluster_id) {
            return self.classes.get(key).map(|c| c.name.clone());
        }
        if let Some(key) = self.clusters_to_views.get(&cluster_id) {
            return self.views.get(key).map(|v| v.name().to_string());
        }
        if self.blob_clusters.contains(&cluster_id) {
            return Some("blob".to_string());
        }
        None
    }

    pub fn check_clusters_are_absent(&self, cluster_ids: &[i32]) -> Result<()> {
        for &id in cluster_ids {
            if id == ABSTRACT_CLUSTER_ID {
                continue;
            }
            if let Some(owner) = self.cluster_owner(id) {
                return Err(CatalogError::ClusterInUse {
                    cluster_id: id,
                    owner,
                });
            }
        }
        Ok(())
    }

    /// Lower-cased names of all ancestors, nearest first, without duplicates.
    pub fn ancestors(&self, key: &str) -> Vec<String> {
        let mut result = Vec::new();
        let mut seen = HashSet::new();
        let mut queue: Vec<String> = self
            .class(key)
            .map(|c| c.super_classes.iter().map(|s| name_key(s)).collect())
            .unwrap_or_default();
        let mut i = 0;
        while i < queue.len() {
            let current = queue[i].clone();
            i += 1;
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(class) = self.classes.get(&current) {
                queue.extend(class.super_classes.iter().map(|s| name_key(s)));
            }
            result.push(current);
        }
        result
    }

    /// Lower-cased names of all descendants, nearest first, without duplicates.
    pub fn descendants(&self, key: &str) -> Vec<String> {
        let mut result = Vec::new();
        let mut seen = HashSet::new();
        let mut queue: Vec<String> = self
            .class(key)
            .map(|c| c.subclasses.iter().map(|s| name_key(s)).collect())
            .unwrap_or_default();
        let mut i = 0;
        while i < queue.len() {
            let current = queue[i].clone();
            i += 1;
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(class) = self.classes.get(&current) {
                queue.extend(class.subclasses.iter().map(|s| name_key(s)));
            }
            result.push(current);
        }
        result
    }

    /// Own properties followed by inherited ones not shadowed by a nearer class.
    pub fn all_properties(&self, name: &str) -> Vec<PropertyDescriptor> {
        let key = name_key(name);
        let mut seen = HashSet::new();
        let mut result = Vec::new();
        let own = self.class_or_view(&key);
        let chain = own
            .into_iter()
            .chain(self.ancestors(&key).iter().filter_map(|a| self.classes.get(a)).collect::<Vec<_>>());
        for class in chain {
            for (property_key, property) in &class.properties {
                if seen.insert(property_key.clone()) {
                    result.push(property.clone());
                }
            }
        }
        result
    }

    /// Finds a property on the class or one of its ancestors.
    pub fn find_property(&self, class_key: &str, property: &str) -> Option<(String, &PropertyDescriptor)> {
        let property_key = name_key(property);
        std::iter::once(name_key(class_key))
            .chain(self.ancestors(class_key))
            .find_map(|key| {
                self.classes
                    .get(&key)
                    .and_then(|c| c.properties.get(&property_key))
                    .map(|p| (key.clone(), p))
            })
    }

    /// Own clusters plus the clusters of every descendant.
    pub fn polymorphic_cluster_ids(&self, key: &str) -> Vec<i32> {
        let mut ids = Vec::new();
        let keys = std::iter::once(name_key(key)).chain(self.descendants(key));
        for k in keys {
            if let Some(class) = self.classes.get(&k) {
                for &id in &class.cluster_ids {
                    if id != ABSTRACT_CLUSTER_ID && !ids.contains(&id) {
                        ids.push(id);
                    }
                }
            }
        }
        ids
    }

    /// Validates a super-type list for `class_name`.
    ///
    /// Every parent must be an existing class, listed once, not the class
    /// itself or one of its descendants, and the parents' properties must not
    /// clash with each other or with the class's own properties.
    pub fn check_super_classes(&self, class_name: &str, super_classes: &[String]) -> Result<()> {
        let key = name_key(class_name);
        let descendants: HashSet<String> = self.descendants(&key).into_iter().collect();
        let mut listed = HashSet::new();
        let mut inherited: HashMap<String, PropertyDescriptor> = HashMap::new();

        if let Some(class) = self.classes.get(&key) {
            for (property_key, property) in &class.properties {
                inherited.insert(property_key.clone(), property.clone());
            }
        }

        for parent in super_classes {
            let parent_key = name_key(parent);
            if self.views.contains_key(&parent_key) {
                return Err(CatalogError::InvalidHierarchy {
                    class: class_name.to_string(),
                    reason: format!("'{}' is a view", parent),
                });
            }
            if !self.classes.contains_key(&parent_key) {
                return Err(CatalogError::InvalidHierarchy {
                    class: class_name.to_string(),
                    reason: format!("'{}' does not exist", parent),
                });
            }
            if !listed.insert(parent_key.clone()) {
                return Err(CatalogError::InvalidHierarchy {
                    class: class_name.to_string(),
                    reason: format!("'{}' is listed more than once", parent),
                });
            }
            if parent_key == key || descendants.contains(&parent_key) {
                return Err(CatalogError::InvalidHierarchy {
                    class: class_name.to_string(),
                    reason: format!("'{}' would create a cycle", parent),
                });
            }
            for property in self.all_properties(&parent_key) {
                let property_key = name_key(&property.name);
                match inherited.get(&property_key) {
                    Some(existing) if existing.property_type != property.property_type => {
                        return Err(CatalogError::PropertyNameConflict {
                            name: property.name.clone(),
                            existing: existing.property_type.to_string(),
                            requested: property.property_type.to_string(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        inherited.insert(property_key, property);
                    }
                }
            }
        }
        Ok(())
    }

    /// Replaces the super-types of an existing class and fixes subclass lists.
    pub fn set_super_classes(&mut self, class_name: &str, super_classes: Vec<String>) -> Result<()> {
        self.check_super_classes(class_name, &super_classes)?;
        let key = name_key(class_name);
        let (display, previous) = {
            let class = self.class_mut(&key)?;
            let previous = std::mem::take(&mut class.super_classes);
            (class.name.clone(), previous)
        };
        for parent in previous {
            if let Some(parent) = self.classes.get_mut(&name_key(&parent)) {
                parent.remove_subclass(&key);
            }
        }
        let mut resolved = Vec::with_capacity(super_classes.len());
        for parent in &super_classes {
            let parent_class = self.class_mut(parent)?;
            parent_class.add_subclass(&display);
            resolved.push(parent_class.name.clone());
        }
        self.class_mut(&key)?.super_classes = resolved;
        Ok(())
    }

    pub fn register_clusters(&mut self, key: &str, cluster_ids: &[i32]) {
        for &id in cluster_ids {
            if id != ABSTRACT_CLUSTER_ID {
                self.clusters_to_classes.insert(id, key.to_string());
            }
        }
    }

    pub fn unregister_clusters(&mut self, cluster_ids: &[i32]) {
        for id in cluster_ids {
            self.clusters_to_classes.remove(id);
        }
    }

    /// Indexes declared directly on a class, by name.
    pub fn class_indexes(&self, class_name: &str) -> Vec<IndexDefinition> {
        self.indexes
            .values()
            .filter(|index| index.class_name.eq_ignore_ascii_case(class_name))
            .cloned()
            .collect()
    }

    pub fn remove_indexes(&mut self, names: &[String]) {
        for name in names {
            self.indexes.remove(name);
        }
    }

    /// Every property descriptor sharing a global id, across classes and views.
    pub fn descriptors_with_global_id(&mut self, global_id: u32) -> Vec<&mut PropertyDescriptor> {
        let classes = self.classes.values_mut();
        let views = self.views.values_mut().map(|v| &mut v.class);
        classes
            .chain(views)
            .flat_map(|c| c.properties.values_mut())
            .filter(|p| p.global_id == global_id)
            .collect()
    }
}

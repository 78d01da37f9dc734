//! Handles for changing one class or one property.
//!
//! A handle holds only the catalog and a lower-cased name. Every read goes
//! to the currently published state; every change goes through
//! [`Catalog::mutate`].

use std::collections::HashSet;

use crate::cluster::ABSTRACT_CLUSTER_ID;
use crate::error::{CatalogError, Result};
use crate::index::{involved_indexes, IndexDefinition};
use crate::schema::constraint::{check_class_name, check_property_name};
use crate::schema::{
    name_key, ClassAttribute, ClassDefinition, CustomChange, PropertyAttribute, PropertyDescriptor,
};
use crate::session::SchemaSession;
use crate::types::{Collate, PropertyType};

use super::state::CatalogState;
use super::Catalog;

/// Mutable view of one class.
#[derive(Clone)]
pub struct ClassHandle<'a> {
    catalog: &'a Catalog,
    key: String,
}

impl std::fmt::Debug for ClassHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassHandle").field("class", &self.key).finish()
    }
}

/// `None` for empty or `null` attribute values; surrounding quotes stripped.
fn optional_value(value: &str) -> Option<String> {
    let trimmed = value.trim();
    let unquoted = if trimmed.len() >= 2
        && ['"', '\'', '`']
            .iter()
            .any(|&q| trimmed.starts_with(q) && trimmed.ends_with(q))
    {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    };
    if unquoted.is_empty() || unquoted.eq_ignore_ascii_case("null") {
        None
    } else {
        Some(unquoted.to_string())
    }
}

fn parse_flag(owner: &str, attribute: &'static str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(CatalogError::invalid_constraint(
            owner,
            attribute,
            format!("expected true or false, got '{}'", other),
        )),
    }
}

fn rename_refs(names: &mut [String], old_key: &str, new_name: &str) {
    for name in names.iter_mut() {
        if name_key(name) == old_key {
            *name = new_name.to_string();
        }
    }
}

fn rename_linked_class(properties: &mut indexmap::IndexMap<String, PropertyDescriptor>, old_key: &str, new_name: &str) {
    for property in properties.values_mut() {
        if property
            .linked_class
            .as_deref()
            .is_some_and(|linked| name_key(linked) == old_key)
        {
            property.linked_class = Some(new_name.to_string());
        }
    }
}

/// Checks that adding `name: property_type` to `key` does not clash with a
/// property elsewhere in its hierarchy. Ancestors may not declare the name at
/// all; descendants may only declare it with the same type.
fn check_hierarchy_property(
    state: &CatalogState,
    key: &str,
    name: &str,
    property_type: PropertyType,
) -> Result<()> {
    let property_key = name_key(name);
    let declared = |class_key: &String| {
        state
            .classes
            .get(class_key)
            .and_then(|c| c.properties.get(&property_key))
    };
    let conflict = |existing: &PropertyDescriptor| CatalogError::PropertyNameConflict {
        name: name.to_string(),
        existing: existing.property_type.to_string(),
        requested: property_type.to_string(),
    };

    if let Some(existing) = state.ancestors(key).iter().find_map(|k| declared(k)) {
        return Err(conflict(existing));
    }
    for descendant in state.descendants(key) {
        if let Some(existing) = declared(&descendant) {
            if existing.property_type != property_type {
                return Err(conflict(existing));
            }
        }
    }
    Ok(())
}

impl<'a> ClassHandle<'a> {
    pub(crate) fn new(catalog: &'a Catalog, key: String) -> Self {
        Self { catalog, key }
    }

    /// Copy of the class as currently published.
    pub fn definition(&self) -> Result<ClassDefinition> {
        self.catalog
            .current_state()
            .classes
            .get(&self.key)
            .cloned()
            .ok_or_else(|| CatalogError::class_not_found(&self.key))
    }

    /// Display name, or the lower-cased name if the class is gone.
    pub fn name(&self) -> String {
        self.definition()
            .map(|c| c.name)
            .unwrap_or_else(|_| self.key.clone())
    }

    fn change<T>(
        &self,
        session: &SchemaSession,
        operation: &str,
        apply: impl FnOnce(&mut CatalogState) -> Result<T>,
    ) -> Result<T> {
        self.catalog.mutate(Some(session), operation, |state, _| apply(state))
    }

    pub fn set_name(&mut self, session: &SchemaSession, name: &str) -> Result<()> {
        check_class_name(name)?;
        let old_key = self.key.clone();
        let new_key = name_key(name);
        let indexes = self.catalog.index_manager();

        self.change(session, "rename class", |state| {
            if new_key != old_key && state.exists(name) {
                return Err(CatalogError::DuplicateClassName(name.to_string()));
            }
            let mut class = state
                .classes
                .remove(&old_key)
                .ok_or_else(|| CatalogError::class_not_found(&old_key))?;
            let old_name = std::mem::replace(&mut class.name, name.to_string());
            rename_linked_class(&mut class.properties, &old_key, name);

            for other in state.classes.values_mut() {
                rename_refs(&mut other.super_classes, &old_key, name);
                rename_refs(&mut other.subclasses, &old_key, name);
                rename_linked_class(&mut other.properties, &old_key, name);
            }
            for view in state.views.values_mut() {
                rename_refs(&mut view.watch_classes, &old_key, name);
                rename_linked_class(&mut view.class.properties, &old_key, name);
            }
            for &id in &class.cluster_ids {
                if id != ABSTRACT_CLUSTER_ID {
                    state.clusters_to_classes.insert(id, new_key.clone());
                }
            }
            state.classes.insert(new_key.clone(), class);
            for index in state.indexes.values_mut() {
                if index.class_name.eq_ignore_ascii_case(&old_name) {
                    index.class_name = name.to_string();
                }
            }
            indexes.rename_class(&old_name, name)?;
            tracing::info!("Renamed class {} to {}", old_name, name);
            Ok(())
        })?;
        self.key = new_key;
        Ok(())
    }

    pub fn set_short_name(&self, session: &SchemaSession, short_name: Option<&str>) -> Result<()> {
        if let Some(short_name) = short_name {
            check_class_name(short_name)?;
        }
        self.change(session, "set short name", |state| {
            if let Some(short_name) = short_name {
                let wanted = name_key(short_name);
                let taken = state.classes.iter().any(|(key, class)| {
                    *key != self.key
                        && (*key == wanted
                            || class.short_name.as_deref().map(name_key) == Some(wanted.clone()))
                });
                if taken || state.views.contains_key(&wanted) {
                    return Err(CatalogError::DuplicateClassName(short_name.to_string()));
                }
            }
            state.class_mut(&self.key)?.short_name = short_name.map(str::to_string);
            Ok(())
        })
    }

    pub fn set_description(&self, session: &SchemaSession, description: Option<&str>) -> Result<()> {
        self.change(session, "set class description", |state| {
            state.class_mut(&self.key)?.description = description.map(str::to_string);
            Ok(())
        })
    }

    pub fn set_strict_mode(&self, session: &SchemaSession, strict: bool) -> Result<()> {
        self.change(session, "set strict mode", |state| {
            state.class_mut(&self.key)?.strict_mode = strict;
            Ok(())
        })
    }

    /// Makes the class abstract (releasing its clusters) or concrete
    /// (allocating new ones). A class holding records cannot become abstract.
    pub fn set_abstract(&self, session: &SchemaSession, is_abstract: bool) -> Result<()> {
        let catalog = self.catalog;
        self.change(session, "set abstract", |state| {
            let class = state.class_mut(&self.key)?;
            if class.is_abstract == is_abstract {
                return Ok(());
            }
            if is_abstract {
                let records: u64 = class
                    .cluster_ids
                    .iter()
                    .filter(|&&id| id != ABSTRACT_CLUSTER_ID)
                    .map(|&id| catalog.record_counter().count(id))
                    .sum();
                if records > 0 {
                    return Err(CatalogError::invalid_constraint(
                        &class.name,
                        ClassAttribute::Abstract.as_str(),
                        format!("class has {} records", records),
                    ));
                }
                let released = std::mem::replace(&mut class.cluster_ids, vec![ABSTRACT_CLUSTER_ID]);
                class.is_abstract = true;
                state.unregister_clusters(&released);
                catalog.release_clusters(&released);
            } else {
                let name = class.name.clone();
                let ids = catalog.allocate_clusters(&name, catalog.config().minimum_clusters.max(1))?;
                let class = state.class_mut(&self.key)?;
                class.cluster_ids = ids.clone();
                class.is_abstract = false;
                state.register_clusters(&self.key, &ids);
            }
            Ok(())
        })
    }

    pub fn set_super_classes(&self, session: &SchemaSession, super_classes: &[&str]) -> Result<()> {
        let supers: Vec<String> = super_classes.iter().map(|s| s.trim().to_string()).collect();
        self.change(session, "set super-types", |state| {
            state.set_super_classes(&self.key, supers)
        })
    }

    pub fn add_super_class(&self, session: &SchemaSession, super_class: &str) -> Result<()> {
        self.change(session, "add super-type", |state| {
            let mut supers = state
                .class(&self.key)
                .ok_or_else(|| CatalogError::class_not_found(&self.key))?
                .super_classes
                .clone();
            supers.push(super_class.trim().to_string());
            state.set_super_classes(&self.key, supers)
        })
    }

    pub fn remove_super_class(&self, session: &SchemaSession, super_class: &str) -> Result<()> {
        self.change(session, "remove super-type", |state| {
            let class = state
                .class(&self.key)
                .ok_or_else(|| CatalogError::class_not_found(&self.key))?;
            let removed = name_key(super_class);
            if !class.has_super_class_key(&removed) {
                return Err(CatalogError::InvalidHierarchy {
                    class: class.name.clone(),
                    reason: format!("'{}' is not a super-type", super_class),
                });
            }
            let supers = class
                .super_classes
                .iter()
                .filter(|s| name_key(s) != removed)
                .cloned()
                .collect();
            state.set_super_classes(&self.key, supers)
        })
    }

    /// Attaches an existing cluster. An abstract class becomes concrete.
    pub fn add_cluster_id(&self, session: &SchemaSession, cluster_id: i32) -> Result<()> {
        if cluster_id == ABSTRACT_CLUSTER_ID {
            return self.set_abstract(session, true);
        }
        self.change(session, "add cluster", |state| {
            if state.clusters_to_classes.get(&cluster_id) == Some(&self.key) {
                return Ok(());
            }
            state.check_clusters_are_absent(&[cluster_id])?;
            let class = state.class_mut(&self.key)?;
            if class.is_abstract {
                class.cluster_ids.clear();
                class.is_abstract = false;
            }
            class.cluster_ids.push(cluster_id);
            state.register_clusters(&self.key, &[cluster_id]);
            Ok(())
        })
    }

    /// Attaches the named cluster, creating it if it does not exist.
    pub fn add_cluster(&self, session: &SchemaSession, cluster_name: &str) -> Result<()> {
        let clusters = self.catalog.cluster_manager();
        let (id, created) = match clusters.cluster_id_by_name(cluster_name) {
            Some(id) => (id, false),
            None => (clusters.add_cluster(cluster_name)?, true),
        };
        let result = self.add_cluster_id(session, id);
        if result.is_err() && created {
            self.catalog.release_clusters(&[id]);
        }
        result
    }

    /// Detaches a cluster without dropping it. Removing the last cluster
    /// makes the class abstract.
    pub fn remove_cluster_id(&self, session: &SchemaSession, cluster_id: i32) -> Result<()> {
        self.change(session, "remove cluster", |state| {
            let class = state.class_mut(&self.key)?;
            if !class.cluster_ids.contains(&cluster_id) || class.is_abstract {
                return Ok(());
            }
            class.cluster_ids.retain(|&id| id != cluster_id);
            if class.cluster_ids.is_empty() {
                class.cluster_ids.push(ABSTRACT_CLUSTER_ID);
                class.is_abstract = true;
            }
            state.unregister_clusters(&[cluster_id]);
            Ok(())
        })
    }

    pub fn set_cluster_selection(&self, session: &SchemaSession, strategy: &str) -> Result<()> {
        let strategy = self.catalog.selection_factory().create(strategy)?;
        self.change(session, "set cluster selection", |state| {
            state.class_mut(&self.key)?.cluster_selection = strategy;
            Ok(())
        })
    }

    fn apply_custom(&self, session: &SchemaSession, change: CustomChange) -> Result<()> {
        self.change(session, "set class custom", |state| {
            change.apply(&mut state.class_mut(&self.key)?.custom);
            Ok(())
        })
    }

    pub fn set_custom(&self, session: &SchemaSession, name: &str, value: &str) -> Result<()> {
        self.apply_custom(session, CustomChange::Set(name.to_string(), value.to_string()))
    }

    pub fn remove_custom(&self, session: &SchemaSession, name: &str) -> Result<()> {
        self.apply_custom(session, CustomChange::Remove(name.to_string()))
    }

    pub fn clear_custom(&self, session: &SchemaSession) -> Result<()> {
        self.apply_custom(session, CustomChange::Clear)
    }

    /// Sets an attribute from its textual form.
    ///
    /// `SUPERCLASS` accepts `+Name` to add and `-Name` to remove a super-type;
    /// `SUPERCLASSES` takes a comma-separated list. `ADD_CLUSTER` and
    /// `REMOVE_CLUSTER` accept a cluster id or name.
    pub fn set(&mut self, session: &SchemaSession, attribute: ClassAttribute, value: &str) -> Result<()> {
        let owner = self.name();
        match attribute {
            ClassAttribute::Name => {
                let name = optional_value(value).ok_or_else(|| CatalogError::InvalidName {
                    name: value.to_string(),
                    reason: "class name cannot be empty".to_string(),
                })?;
                self.set_name(session, &name)
            }
            ClassAttribute::ShortName => {
                self.set_short_name(session, optional_value(value).as_deref())
            }
            ClassAttribute::SuperClass => {
                let value = value.trim();
                if let Some(added) = value.strip_prefix('+') {
                    self.add_super_class(session, added)
                } else if let Some(removed) = value.strip_prefix('-') {
                    self.remove_super_class(session, removed)
                } else {
                    match optional_value(value) {
                        Some(parent) => self.set_super_classes(session, &[parent.as_str()]),
                        None => self.set_super_classes(session, &[]),
                    }
                }
            }
            ClassAttribute::SuperClasses => {
                let list = optional_value(value).unwrap_or_default();
                let supers: Vec<&str> = list
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect();
                self.set_super_classes(session, &supers)
            }
            ClassAttribute::StrictMode => {
                let strict = parse_flag(&owner, attribute.as_str(), value)?;
                self.set_strict_mode(session, strict)
            }
            ClassAttribute::Abstract => {
                let is_abstract = parse_flag(&owner, attribute.as_str(), value)?;
                self.set_abstract(session, is_abstract)
            }
            ClassAttribute::AddCluster => match value.trim().parse::<i32>() {
                Ok(id) => self.add_cluster_id(session, id),
                Err(_) => self.add_cluster(session, value.trim()),
            },
            ClassAttribute::RemoveCluster => {
                let id = match value.trim().parse::<i32>() {
                    Ok(id) => id,
                    Err(_) => self
                        .catalog
                        .cluster_manager()
                        .cluster_id_by_name(value.trim())
                        .ok_or_else(|| CatalogError::InvalidName {
                            name: value.trim().to_string(),
                            reason: "cluster does not exist".to_string(),
                        })?,
                };
                self.remove_cluster_id(session, id)
            }
            ClassAttribute::ClusterSelection => self.set_cluster_selection(session, value.trim()),
            ClassAttribute::Custom => self.apply_custom(session, CustomChange::parse(value)?),
            ClassAttribute::Description => {
                self.set_description(session, optional_value(value).as_deref())
            }
        }
    }

    // ---- properties -------------------------------------------------------

    /// Adds a property, binding its name in the global registry.
    pub fn create_property(
        &self,
        session: &SchemaSession,
        name: &str,
        property_type: PropertyType,
    ) -> Result<PropertyHandle<'a>> {
        self.create_property_internal(session, name, property_type, None, None)
    }

    /// Adds a link or embedded property bound to a class.
    pub fn create_property_with_linked_class(
        &self,
        session: &SchemaSession,
        name: &str,
        property_type: PropertyType,
        linked_class: &str,
    ) -> Result<PropertyHandle<'a>> {
        self.create_property_internal(session, name, property_type, Some(linked_class), None)
    }

    /// Adds a collection or map property with an element type.
    pub fn create_property_with_linked_type(
        &self,
        session: &SchemaSession,
        name: &str,
        property_type: PropertyType,
        linked_type: PropertyType,
    ) -> Result<PropertyHandle<'a>> {
        self.create_property_internal(session, name, property_type, None, Some(linked_type))
    }

    fn create_property_internal(
        &self,
        session: &SchemaSession,
        name: &str,
        property_type: PropertyType,
        linked_class: Option<&str>,
        linked_type: Option<PropertyType>,
    ) -> Result<PropertyHandle<'a>> {
        check_property_name(name)?;
        let registry = self.catalog.registry();
        let property_key = name_key(name);

        self.change(session, "create property", |state| {
            let class = state
                .class(&self.key)
                .ok_or_else(|| CatalogError::class_not_found(&self.key))?;
            if let Some(existing) = class.properties.get(&property_key) {
                return Err(CatalogError::PropertyNameConflict {
                    name: name.to_string(),
                    existing: existing.property_type.to_string(),
                    requested: property_type.to_string(),
                });
            }
            check_hierarchy_property(state, &self.key, name, property_type)?;

            let mut property = PropertyDescriptor::new(name, 0, property_type);
            if let Some(linked_class) = linked_class {
                let target = state
                    .class_or_view(linked_class)
                    .ok_or_else(|| CatalogError::class_not_found(linked_class))?;
                property.set_linked_class(Some(target.name.clone()))?;
            }
            property.set_linked_type(linked_type)?;
            property.global_id = registry.create(name, property_type)?;

            let class_name = state.class_mut(&self.key)?.name.clone();
            state
                .class_mut(&self.key)?
                .properties
                .insert(property_key.clone(), property);
            tracing::info!("Created property {}.{} ({})", class_name, name, property_type);
            Ok(())
        })?;
        Ok(PropertyHandle::new(self.catalog, self.key.clone(), property_key))
    }

    /// Removes an own property. Fails while an index uses it.
    pub fn drop_property(&self, session: &SchemaSession, name: &str) -> Result<()> {
        self.change(session, "drop property", |state| {
            let property_key = name_key(name);
            let class = state
                .class(&self.key)
                .ok_or_else(|| CatalogError::class_not_found(&self.key))?;
            if !class.properties.contains_key(&property_key) {
                return Err(CatalogError::PropertyNotFound {
                    class: class.name.clone(),
                    property: name.to_string(),
                });
            }
            let using: Vec<String> = state
                .class_indexes(&class.name)
                .into_iter()
                .filter(|index| index.contains_field(name))
                .map(|index| index.name)
                .collect();
            if !using.is_empty() {
                return Err(CatalogError::invalid_constraint(
                    name,
                    "index",
                    format!("property is used by indexes: {}", using.join(", ")),
                ));
            }
            state.class_mut(&self.key)?.properties.shift_remove(&property_key);
            Ok(())
        })
    }

    /// Own or inherited property.
    pub fn property(&self, name: &str) -> Option<PropertyHandle<'a>> {
        let state = self.catalog.current_state();
        state
            .find_property(&self.key, name)
            .map(|(owner, _)| PropertyHandle::new(self.catalog, owner, name_key(name)))
    }

    /// Own or inherited property descriptor.
    pub fn property_definition(&self, name: &str) -> Option<PropertyDescriptor> {
        let state = self.catalog.current_state();
        state.find_property(&self.key, name).map(|(_, p)| p.clone())
    }

    pub fn exists_property(&self, name: &str) -> bool {
        self.property_definition(name).is_some()
    }

    /// Own properties in declaration order.
    pub fn declared_properties(&self) -> Vec<PropertyDescriptor> {
        self.definition()
            .map(|c| c.properties.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Own and inherited properties.
    pub fn properties(&self) -> Vec<PropertyDescriptor> {
        self.catalog.current_state().all_properties(&self.key)
    }

    // ---- hierarchy and clusters --------------------------------------------

    pub fn is_subclass_of(&self, name: &str) -> bool {
        let wanted = name_key(name);
        wanted == self.key || self.catalog.current_state().ancestors(&self.key).contains(&wanted)
    }

    pub fn is_super_class_of(&self, name: &str) -> bool {
        let wanted = name_key(name);
        wanted == self.key || self.catalog.current_state().descendants(&self.key).contains(&wanted)
    }

    /// Display names of all ancestors, nearest first.
    pub fn all_super_classes(&self) -> Vec<String> {
        let state = self.catalog.current_state();
        state
            .ancestors(&self.key)
            .iter()
            .filter_map(|k| state.classes.get(k).map(|c| c.name.clone()))
            .collect()
    }

    /// Display names of all descendants, nearest first.
    pub fn all_subclasses(&self) -> Vec<String> {
        let state = self.catalog.current_state();
        state
            .descendants(&self.key)
            .iter()
            .filter_map(|k| state.classes.get(k).map(|c| c.name.clone()))
            .collect()
    }

    pub fn polymorphic_cluster_ids(&self) -> Vec<i32> {
        self.catalog.current_state().polymorphic_cluster_ids(&self.key)
    }

    /// Number of records, optionally including subclasses.
    pub fn count(&self, polymorphic: bool) -> Result<u64> {
        let ids = if polymorphic {
            self.polymorphic_cluster_ids()
        } else {
            self.definition()?.cluster_ids
        };
        let records = self.catalog.record_counter();
        Ok(ids
            .iter()
            .filter(|&&id| id != ABSTRACT_CLUSTER_ID)
            .map(|&id| records.count(id))
            .sum())
    }

    /// Cluster the selection strategy picks for a new record.
    pub fn cluster_for_new_record(&self) -> Result<Option<i32>> {
        let class = self.definition()?;
        if class.is_abstract {
            return Ok(None);
        }
        Ok(class
            .cluster_selection
            .select(&class.cluster_ids, self.catalog.record_counter().as_ref()))
    }

    // ---- indexes ----------------------------------------------------------

    /// Indexes defined on this class only.
    pub fn class_indexes(&self) -> Vec<IndexDefinition> {
        self.catalog.current_state().class_indexes(&self.name())
    }

    /// Indexes defined on this class and its ancestors.
    pub fn indexes(&self) -> Vec<IndexDefinition> {
        let state = self.catalog.current_state();
        let mut result = state.class_indexes(&self.name());
        let mut seen: HashSet<String> = result.iter().map(|i| i.name.clone()).collect();
        for ancestor in self.all_super_classes() {
            for index in state.class_indexes(&ancestor) {
                if seen.insert(index.name.clone()) {
                    result.push(index);
                }
            }
        }
        result
    }

    /// Indexes (inherited included) usable for a lookup on exactly `fields`.
    pub fn involved_indexes(&self, fields: &[&str]) -> Vec<IndexDefinition> {
        let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        involved_indexes(&self.indexes(), &fields)
    }

    /// Like [`involved_indexes`](Self::involved_indexes), own indexes only.
    pub fn class_involved_indexes(&self, fields: &[&str]) -> Vec<IndexDefinition> {
        let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        involved_indexes(&self.class_indexes(), &fields)
    }

    pub fn are_indexed(&self, fields: &[&str]) -> bool {
        !self.involved_indexes(fields).is_empty()
    }

    /// Creates an index over `fields` with the default engine.
    pub fn create_index(
        &self,
        session: &SchemaSession,
        name: &str,
        index_type: &str,
        fields: &[&str],
    ) -> Result<IndexDefinition> {
        let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        self.create_index_with(session, IndexDefinition::new(name, "", fields, index_type))
    }

    /// Creates an index from a full definition. The class name and cluster
    /// ids are filled in from this class.
    ///
    /// # Arguments
    /// * `session` - Session making the change
    /// * `definition` - Index name, key fields, type, engine and null handling
    ///
    /// # Returns
    /// `Result<IndexDefinition>` as created by the index manager.
    pub fn create_index_with(
        &self,
        session: &SchemaSession,
        mut definition: IndexDefinition,
    ) -> Result<IndexDefinition> {
        let indexes = self.catalog.index_manager();
        let engine = (!definition.engine.is_empty()).then(|| definition.engine.clone());
        if !indexes.has_engine(&definition.index_type, engine.as_deref()) {
            return Err(CatalogError::IndexEngineUnavailable {
                index_type: definition.index_type,
                engine: engine.unwrap_or_else(|| "default".to_string()),
            });
        }

        self.change(session, "create index", |state| {
            let class = state
                .class(&self.key)
                .ok_or_else(|| CatalogError::class_not_found(&self.key))?;
            if definition.fields.is_empty() {
                return Err(CatalogError::invalid_constraint(
                    &definition.name,
                    "fields",
                    "an index needs at least one field",
                ));
            }
            let mut resolved = Vec::with_capacity(definition.fields.len());
            for field in &definition.fields {
                let (_, property) = state.find_property(&self.key, field).ok_or_else(|| {
                    CatalogError::PropertyNotFound {
                        class: class.name.clone(),
                        property: field.clone(),
                    }
                })?;
                resolved.push(property.name.clone());
            }
            definition.fields = resolved;
            definition.class_name = class.name.clone();
            definition.cluster_ids = state.polymorphic_cluster_ids(&self.key);
            let created = indexes.create_index(definition)?;
            state.indexes.insert(created.name.clone(), created.clone());
            tracing::info!(
                "Created index {} on {} ({})",
                created.name,
                created.class_name,
                created.fields.join(", ")
            );
            Ok(created)
        })
    }
}

/// Mutable view of one property of one class.
#[derive(Clone)]
pub struct PropertyHandle<'a> {
    catalog: &'a Catalog,
    class_key: String,
    key: String,
}

impl std::fmt::Debug for PropertyHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyHandle")
            .field("class", &self.class_key)
            .field("property", &self.key)
            .finish()
    }
}

impl<'a> PropertyHandle<'a> {
    pub(crate) fn new(catalog: &'a Catalog, class_key: String, key: String) -> Self {
        Self {
            catalog,
            class_key,
            key,
        }
    }

    /// Copy of the descriptor as currently published.
    pub fn definition(&self) -> Result<PropertyDescriptor> {
        let state = self.catalog.current_state();
        let class = state
            .classes
            .get(&self.class_key)
            .ok_or_else(|| CatalogError::class_not_found(&self.class_key))?;
        class
            .properties
            .get(&self.key)
            .cloned()
            .ok_or_else(|| CatalogError::PropertyNotFound {
                class: class.name.clone(),
                property: self.key.clone(),
            })
    }

    /// Display name of the class declaring the property.
    pub fn owner_class(&self) -> String {
        self.catalog
            .current_state()
            .classes
            .get(&self.class_key)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| self.class_key.clone())
    }

    fn update(
        &self,
        session: &SchemaSession,
        operation: &str,
        apply: impl FnOnce(&mut PropertyDescriptor) -> Result<()>,
    ) -> Result<()> {
        self.catalog.mutate(Some(session), operation, |state, _| {
            let class = state.class_mut(&self.class_key)?;
            let class_name = class.name.clone();
            let property = class
                .properties
                .get_mut(&self.key)
                .ok_or_else(|| CatalogError::PropertyNotFound {
                    class: class_name,
                    property: self.key.clone(),
                })?;
            apply(property)
        })
    }

    /// Renames the property, binding the new name in the global registry.
    pub fn set_name(&mut self, session: &SchemaSession, name: &str) -> Result<()> {
        check_property_name(name)?;
        let new_key = name_key(name);
        let registry = self.catalog.registry();

        self.catalog.mutate(Some(session), "rename property", |state, _| {
            let class = state
                .class(&self.class_key)
                .ok_or_else(|| CatalogError::class_not_found(&self.class_key))?;
            let current = class
                .properties
                .get(&self.key)
                .ok_or_else(|| CatalogError::PropertyNotFound {
                    class: class.name.clone(),
                    property: self.key.clone(),
                })?;
            let property_type = current.property_type;
            if new_key != self.key {
                if let Some(existing) = class.properties.get(&new_key) {
                    return Err(CatalogError::PropertyNameConflict {
                        name: name.to_string(),
                        existing: existing.property_type.to_string(),
                        requested: property_type.to_string(),
                    });
                }
                check_hierarchy_property(state, &self.class_key, name, property_type)?;
            }
            let global_id = registry.create(name, property_type)?;

            let properties = &mut state.class_mut(&self.class_key)?.properties;
            let position = properties.get_index_of(&self.key).unwrap_or(0);
            if let Some(mut property) = properties.shift_remove(&self.key) {
                property.name = name.to_string();
                property.global_id = global_id;
                properties.shift_insert(position, new_key.clone(), property);
            }
            Ok(())
        })?;
        self.key = new_key;
        Ok(())
    }

    /// Changes the type to a wider one.
    ///
    /// The global property and every descriptor sharing its id are widened
    /// together, so a name never maps to two types.
    pub fn set_type(&self, session: &SchemaSession, property_type: PropertyType) -> Result<()> {
        let registry = self.catalog.registry();
        self.catalog.mutate(Some(session), "change property type", |state, _| {
            let current = self.definition_in(state)?;
            if current.property_type == property_type {
                return Ok(());
            }
            if !property_type.is_castable_from(current.property_type) {
                return Err(CatalogError::invalid_constraint(
                    &current.name,
                    PropertyAttribute::Type.as_str(),
                    format!("cannot change {} to {}", current.property_type, property_type),
                ));
            }
            for descriptor in state.descriptors_with_global_id(current.global_id) {
                descriptor.property_type = property_type;
                descriptor.revalidate()?;
            }
            registry.widen(current.global_id, property_type)
        })
    }

    fn definition_in(&self, state: &CatalogState) -> Result<PropertyDescriptor> {
        let class = state
            .class(&self.class_key)
            .ok_or_else(|| CatalogError::class_not_found(&self.class_key))?;
        class
            .properties
            .get(&self.key)
            .cloned()
            .ok_or_else(|| CatalogError::PropertyNotFound {
                class: class.name.clone(),
                property: self.key.clone(),
            })
    }

    pub fn set_linked_type(&self, session: &SchemaSession, linked_type: Option<PropertyType>) -> Result<()> {
        self.update(session, "set linked type", |p| p.set_linked_type(linked_type))
    }

    pub fn set_linked_class(&self, session: &SchemaSession, linked_class: Option<&str>) -> Result<()> {
        self.catalog.mutate(Some(session), "set linked class", |state, _| {
            let resolved = match linked_class {
                Some(name) => Some(
                    state
                        .class_or_view(name)
                        .ok_or_else(|| CatalogError::class_not_found(name))?
                        .name
                        .clone(),
                ),
                None => None,
            };
            let class = state.class_mut(&self.class_key)?;
            let class_name = class.name.clone();
            class
                .properties
                .get_mut(&self.key)
                .ok_or_else(|| CatalogError::PropertyNotFound {
                    class: class_name,
                    property: self.key.clone(),
                })?
                .set_linked_class(resolved)
        })
    }

    pub fn set_not_null(&self, session: &SchemaSession, not_null: bool) -> Result<()> {
        self.update(session, "set not null", |p| {
            p.not_null = not_null;
            Ok(())
        })
    }

    pub fn set_mandatory(&self, session: &SchemaSession, mandatory: bool) -> Result<()> {
        self.update(session, "set mandatory", |p| {
            p.mandatory = mandatory;
            Ok(())
        })
    }

    pub fn set_readonly(&self, session: &SchemaSession, readonly: bool) -> Result<()> {
        self.update(session, "set readonly", |p| {
            p.readonly = readonly;
            Ok(())
        })
    }

    pub fn set_min(&self, session: &SchemaSession, min: Option<&str>) -> Result<()> {
        self.update(session, "set min", |p| p.set_min(min.map(str::to_string)))
    }

    pub fn set_max(&self, session: &SchemaSession, max: Option<&str>) -> Result<()> {
        self.update(session, "set max", |p| p.set_max(max.map(str::to_string)))
    }

    pub fn set_default_value(&self, session: &SchemaSession, value: Option<&str>) -> Result<()> {
        self.update(session, "set default", |p| {
            p.set_default_value(value.map(str::to_string))
        })
    }

    pub fn set_regexp(&self, session: &SchemaSession, pattern: Option<&str>) -> Result<()> {
        self.update(session, "set regexp", |p| {
            p.set_regexp(pattern.map(str::to_string))
        })
    }

    pub fn set_collate(&self, session: &SchemaSession, collate: Collate) -> Result<()> {
        self.update(session, "set collate", |p| {
            p.collate = collate;
            Ok(())
        })
    }

    pub fn set_description(&self, session: &SchemaSession, description: Option<&str>) -> Result<()> {
        self.update(session, "set property description", |p| {
            p.description = description.map(str::to_string);
            Ok(())
        })
    }

    pub fn set_custom(&self, session: &SchemaSession, name: &str, value: &str) -> Result<()> {
        let change = CustomChange::Set(name.to_string(), value.to_string());
        self.update(session, "set property custom", |p| {
            change.apply(&mut p.custom);
            Ok(())
        })
    }

    pub fn remove_custom(&self, session: &SchemaSession, name: &str) -> Result<()> {
        let change = CustomChange::Remove(name.to_string());
        self.update(session, "remove property custom", |p| {
            change.apply(&mut p.custom);
            Ok(())
        })
    }

    pub fn clear_custom(&self, session: &SchemaSession) -> Result<()> {
        self.update(session, "clear property custom", |p| {
            CustomChange::Clear.apply(&mut p.custom);
            Ok(())
        })
    }

    /// Sets an attribute from its textual form. `null` or an empty value
    /// clears optional attributes.
    pub fn set(&mut self, session: &SchemaSession, attribute: PropertyAttribute, value: &str) -> Result<()> {
        let owner = self.key.clone();
        let flag = |value: &str| parse_flag(&owner, attribute.as_str(), value);
        match attribute {
            PropertyAttribute::LinkedClass => {
                self.set_linked_class(session, optional_value(value).as_deref())
            }
            PropertyAttribute::LinkedType => {
                let linked = optional_value(value)
                    .map(|v| v.parse::<PropertyType>())
                    .transpose()?;
                self.set_linked_type(session, linked)
            }
            PropertyAttribute::Min => self.set_min(session, optional_value(value).as_deref()),
            PropertyAttribute::Max => self.set_max(session, optional_value(value).as_deref()),
            PropertyAttribute::Default => {
                self.set_default_value(session, optional_value(value).as_deref())
            }
            PropertyAttribute::Mandatory => self.set_mandatory(session, flag(value)?),
            PropertyAttribute::Readonly => self.set_readonly(session, flag(value)?),
            PropertyAttribute::NotNull => self.set_not_null(session, flag(value)?),
            PropertyAttribute::Name => {
                let name = optional_value(value).ok_or_else(|| CatalogError::InvalidName {
                    name: value.to_string(),
                    reason: "property name cannot be empty".to_string(),
                })?;
                self.set_name(session, &name)
            }
            PropertyAttribute::Regexp => self.set_regexp(session, optional_value(value).as_deref()),
            PropertyAttribute::Type => {
                let property_type = value.trim().parse::<PropertyType>()?;
                self.set_type(session, property_type)
            }
            PropertyAttribute::Collate => {
                let collate = match optional_value(value) {
                    Some(v) => v.parse::<Collate>()?,
                    None => Collate::Default,
                };
                self.set_collate(session, collate)
            }
            PropertyAttribute::Custom => {
                let change = CustomChange::parse(value)?;
                self.update(session, "set property custom", |p| {
                    change.apply(&mut p.custom);
                    Ok(())
                })
            }
            PropertyAttribute::Description => {
                self.set_description(session, optional_value(value).as_deref())
            }
        }
    }

    // ---- indexes ----------------------------------------------------------

    /// Creates a single-field index named `<Class>.<property>`.
    ///
    /// # Arguments
    /// * `session` - Session making the change
    /// * `index_type` - Index type, e.g. `UNIQUE` or `NOTUNIQUE`
    /// * `engine` - Engine, or `None` for the type's default
    /// * `metadata` - Optional JSON object; `ignoreNullValues` (default true)
    ///   controls whether null keys are indexed
    ///
    /// # Returns
    /// `Result<IndexDefinition>` as created by the index manager.
    pub fn create_index(
        &self,
        session: &SchemaSession,
        index_type: &str,
        engine: Option<&str>,
        metadata: Option<&serde_json::Value>,
    ) -> Result<IndexDefinition> {
        let property = self.definition()?;
        let class_name = self.owner_class();
        let ignore_nulls = metadata
            .and_then(|m| m.get("ignoreNullValues"))
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(true);

        let definition = IndexDefinition::new(
            format!("{}.{}", class_name, property.name),
            class_name.as_str(),
            vec![property.name.clone()],
            index_type,
        )
        .with_engine(engine.unwrap_or_default())
        .with_null_values_ignored(ignore_nulls);

        ClassHandle::new(self.catalog, self.class_key.clone()).create_index_with(session, definition)
    }

    /// Indexes of the declaring class that use this property.
    pub fn all_indexes(&self) -> Vec<IndexDefinition> {
        let field = self
            .definition()
            .map(|p| p.name)
            .unwrap_or_else(|_| self.key.clone());
        self.catalog
            .current_state()
            .class_indexes(&self.owner_class())
            .into_iter()
            .filter(|index| index.contains_field(&field))
            .collect()
    }

    /// Drops every index of the declaring class that uses this property.
    pub fn drop_indexes(&self, session: &SchemaSession) -> Result<Vec<String>> {
        let indexes = self.catalog.index_manager();
        let field = self.definition()?.name;
        let owner = self.owner_class();
        self.catalog.mutate(Some(session), "drop property indexes", |state, _| {
            let names: Vec<String> = state
                .class_indexes(&owner)
                .into_iter()
                .filter(|index| index.contains_field(&field))
                .map(|index| index.name)
                .collect();
            for name in &names {
                indexes.drop_index(name)?;
            }
            state.remove_indexes(&names);
            Ok(names)
        })
    }
}

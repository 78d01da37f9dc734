//! Schema structs for persistence.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::catalog::state::CatalogState;
use crate::cluster::ClusterSelectionFactory;
use crate::error::Result;
use crate::registry::{GlobalPropertyRecord, GlobalPropertyRegistry};
use crate::schema::{
    name_key, ClassDefinition, PropertyDescriptor, RefreshState, UpdateStrategy, ViewDefinition,
    ViewIndexConfig,
};
use crate::types::{Collate, PropertyType};

/// Current layout version of `SchemaFile`.
pub const SCHEMA_FORMAT_VERSION: u32 = 1;

/// Durable catalog record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaFile {
    /// Layout version
    pub version: u32,
    /// Catalog version at the time of the save
    pub schema_version: u64,
    /// Global properties ordered by id
    pub global_properties: Vec<GlobalPropertyRecord>,
    /// Class definitions ordered by name
    pub classes: Vec<ClassSchema>,
    /// View definitions ordered by name
    #[serde(default)]
    pub views: Vec<ViewSchema>,
    /// Clusters holding binary records
    #[serde(default)]
    pub blob_clusters: Vec<i32>,
}

/// Class schema for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassSchema {
    /// Display name
    pub name: String,
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub r#abstract: bool,
    #[serde(default)]
    pub strict_mode: bool,
    /// Direct super-types
    #[serde(default)]
    pub super_classes: Vec<String>,
    /// Owned clusters
    pub cluster_ids: Vec<i32>,
    /// Cluster selection strategy name
    pub cluster_selection: String,
    #[serde(default)]
    pub custom: IndexMap<String, String>,
    /// Own properties in creation order
    #[serde(default)]
    pub properties: Vec<PropertySchema>,
}

/// Property schema for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    pub name: String,
    /// Global property id
    pub global_id: u32,
    /// Symbolic type name
    pub r#type: String,
    #[serde(default)]
    pub linked_type: Option<String>,
    #[serde(default)]
    pub linked_class: Option<String>,
    #[serde(default)]
    pub not_null: bool,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default)]
    pub readonly: bool,
    #[serde(default)]
    pub min: Option<String>,
    #[serde(default)]
    pub max: Option<String>,
    #[serde(default)]
    pub default_value: Option<String>,
    #[serde(default)]
    pub regexp: Option<String>,
    #[serde(default)]
    pub collate: Collate,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub custom: IndexMap<String, String>,
}

/// View schema for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewSchema {
    /// Class side of the view
    pub class: ClassSchema,
    pub query: String,
    pub update_interval_seconds: u64,
    #[serde(default)]
    pub watch_classes: Vec<String>,
    #[serde(default)]
    pub nodes: Vec<String>,
    #[serde(default)]
    pub required_index_configs: Vec<ViewIndexConfig>,
    #[serde(default)]
    pub update_strategy: UpdateStrategy,
    #[serde(default)]
    pub active_index_names: Vec<String>,
    #[serde(default)]
    pub last_refresh_time: Option<u64>,
    #[serde(default)]
    pub origin_rid_field: Option<String>,
    #[serde(default)]
    pub updatable: bool,
    /// Number of completed refreshes
    #[serde(default)]
    pub generation: u64,
}

impl SchemaFile {
    /// Builds the durable record of a catalog state.
    pub(crate) fn from_state(state: &CatalogState, registry: &GlobalPropertyRegistry) -> Self {
        let mut classes: Vec<ClassSchema> = state.classes.values().map(ClassSchema::from).collect();
        classes.sort_by(|a, b| name_key(&a.name).cmp(&name_key(&b.name)));

        let mut views: Vec<ViewSchema> = state.views.values().map(ViewSchema::from).collect();
        views.sort_by(|a, b| name_key(&a.class.name).cmp(&name_key(&b.class.name)));

        Self {
            version: SCHEMA_FORMAT_VERSION,
            schema_version: state.version,
            global_properties: registry.all().iter().map(|p| p.to_record()).collect(),
            classes,
            views,
            blob_clusters: state.blob_clusters.iter().copied().collect(),
        }
    }

    /// Rebuilds catalog state. The record must already be validated.
    pub(crate) fn to_state(&self, factory: &ClusterSelectionFactory) -> Result<CatalogState> {
        let mut state = CatalogState {
            version: self.schema_version,
            blob_clusters: self.blob_clusters.iter().copied().collect(),
            ..Default::default()
        };

        for class_schema in &self.classes {
            let class = class_schema.to_definition(factory)?;
            let key = name_key(&class.name);
            state.register_clusters(&key, &class.cluster_ids);
            state.classes.insert(key, class);
        }

        let links: Vec<(String, String)> = state
            .classes
            .values()
            .flat_map(|c| {
                c.super_classes
                    .iter()
                    .map(move |parent| (name_key(parent), c.name.clone()))
            })
            .collect();
        for (parent, child) in links {
            state.class_mut(&parent)?.add_subclass(&child);
        }

        for view_schema in &self.views {
            let view = view_schema.to_definition(factory)?;
            let key = name_key(view.name());
            for &id in view.cluster_ids() {
                state.clusters_to_views.insert(id, key.clone());
            }
            state.views.insert(key, view);
        }
        Ok(state)
    }
}

impl From<&ClassDefinition> for ClassSchema {
    fn from(class: &ClassDefinition) -> Self {
        Self {
            name: class.name.clone(),
            short_name: class.short_name.clone(),
            description: class.description.clone(),
            r#abstract: class.is_abstract,
            strict_mode: class.strict_mode,
            super_classes: class.super_classes.clone(),
            cluster_ids: class.cluster_ids.clone(),
            cluster_selection: class.cluster_selection.name().to_string(),
            custom: class.custom.clone(),
            properties: class.properties.values().map(PropertySchema::from).collect(),
        }
    }
}

impl ClassSchema {
    fn to_definition(&self, factory: &ClusterSelectionFactory) -> Result<ClassDefinition> {
        let mut class = ClassDefinition::new(
            &self.name,
            self.super_classes.clone(),
            self.cluster_ids.clone(),
            factory.create(&self.cluster_selection)?,
        );
        class.short_name = self.short_name.clone();
        class.description = self.description.clone();
        class.is_abstract = self.r#abstract;
        class.strict_mode = self.strict_mode;
        class.custom = self.custom.clone();
        for property_schema in &self.properties {
            let property = property_schema.to_descriptor()?;
            class.properties.insert(name_key(&property.name), property);
        }
        Ok(class)
    }
}

impl From<&PropertyDescriptor> for PropertySchema {
    fn from(property: &PropertyDescriptor) -> Self {
        Self {
            name: property.name.clone(),
            global_id: property.global_id,
            r#type: property.property_type.as_str().to_string(),
            linked_type: property.linked_type.map(|t| t.as_str().to_string()),
            linked_class: property.linked_class.clone(),
            not_null: property.not_null,
            mandatory: property.mandatory,
            readonly: property.readonly,
            min: property.min.clone(),
            max: property.max.clone(),
            default_value: property.default_value.clone(),
            regexp: property.regexp.clone(),
            collate: property.collate,
            description: property.description.clone(),
            custom: property.custom.clone(),
        }
    }
}

impl PropertySchema {
    fn to_descriptor(&self) -> Result<PropertyDescriptor> {
        let mut property =
            PropertyDescriptor::new(&self.name, self.global_id, self.r#type.parse()?);
        property.linked_type = self
            .linked_type
            .as_deref()
            .map(str::parse::<PropertyType>)
            .transpose()?;
        property.linked_class = self.linked_class.clone();
        property.not_null = self.not_null;
        property.mandatory = self.mandatory;
        property.readonly = self.readonly;
        property.min = self.min.clone();
        property.max = self.max.clone();
        property.default_value = self.default_value.clone();
        property.regexp = self.regexp.clone();
        property.collate = self.collate;
        property.description = self.description.clone();
        property.custom = self.custom.clone();
        Ok(property)
    }
}

impl From<&ViewDefinition> for ViewSchema {
    fn from(view: &ViewDefinition) -> Self {
        Self {
            class: ClassSchema::from(&view.class),
            query: view.query.clone(),
            update_interval_seconds: view.update_interval_seconds,
            watch_classes: view.watch_classes.clone(),
            nodes: view.nodes.clone(),
            required_index_configs: view.required_index_configs.clone(),
            update_strategy: view.update_strategy,
            active_index_names: view.active_index_names.clone(),
            last_refresh_time: view.last_refresh_time,
            origin_rid_field: view.origin_rid_field.clone(),
            updatable: view.updatable,
            generation: view.generation,
        }
    }
}

impl ViewSchema {
    fn to_definition(&self, factory: &ClusterSelectionFactory) -> Result<ViewDefinition> {
        let refresh_state = if self.last_refresh_time.is_some() && self.generation > 0 {
            RefreshState::Ready
        } else {
            RefreshState::Pending
        };
        Ok(ViewDefinition {
            class: self.class.to_definition(factory)?,
            query: self.query.clone(),
            update_interval_seconds: self.update_interval_seconds,
            watch_classes: self.watch_classes.clone(),
            nodes: self.nodes.clone(),
            required_index_configs: self.required_index_configs.clone(),
            update_strategy: self.update_strategy,
            active_index_names: self.active_index_names.clone(),
            last_refresh_time: self.last_refresh_time,
            origin_rid_field: self.origin_rid_field.clone(),
            updatable: self.updatable,
            refresh_state,
            generation: self.generation,
        })
    }
}

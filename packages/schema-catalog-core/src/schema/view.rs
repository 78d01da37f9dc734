//! View definitions and view index configuration.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::class::ClassDefinition;
use crate::error::{CatalogError, Result};
use crate::types::{Collate, PropertyType};

/// Which side of a map value an index key is taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IndexBy {
    Key,
    Value,
}

impl FromStr for IndexBy {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "KEY" => Ok(IndexBy::Key),
            "VALUE" => Ok(IndexBy::Value),
            other => Err(CatalogError::InvalidName {
                name: other.to_string(),
                reason: "indexBy must be KEY or VALUE".to_string(),
            }),
        }
    }
}

/// One key field of a view index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfigProperty {
    pub name: String,
    pub r#type: PropertyType,
    pub linked_type: Option<PropertyType>,
    pub collate: Collate,
    pub index_by: IndexBy,
}

/// Index a view needs after each refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewIndexConfig {
    pub index_type: String,
    pub engine: Option<String>,
    properties: Vec<IndexConfigProperty>,
}

impl ViewIndexConfig {
    pub fn new(index_type: impl Into<String>, engine: Option<String>) -> Self {
        Self {
            index_type: index_type.into(),
            engine,
            properties: Vec::new(),
        }
    }

    /// Appends a key field. Order is significant.
    pub fn add_property(
        &mut self,
        name: impl Into<String>,
        property_type: PropertyType,
        linked_type: Option<PropertyType>,
        collate: Collate,
        index_by: IndexBy,
    ) -> &mut Self {
        self.properties.push(IndexConfigProperty {
            name: name.into(),
            r#type: property_type,
            linked_type,
            collate,
            index_by,
        });
        self
    }

    pub fn properties(&self) -> &[IndexConfigProperty] {
        &self.properties
    }

    pub fn field_names(&self) -> Vec<String> {
        self.properties.iter().map(|p| p.name.clone()).collect()
    }

    /// Name of the index built for `view` by refresh number `generation`.
    pub fn index_name(&self, view: &str, generation: u64) -> String {
        format!("{}_{}_{}", view, self.field_names().join("_"), generation)
    }
}

/// How a view is kept up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateStrategy {
    #[default]
    Batch,
    Live,
}

impl fmt::Display for UpdateStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateStrategy::Batch => f.write_str("batch"),
            UpdateStrategy::Live => f.write_str("live"),
        }
    }
}

impl FromStr for UpdateStrategy {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "batch" => Ok(UpdateStrategy::Batch),
            "live" => Ok(UpdateStrategy::Live),
            other => Err(CatalogError::InvalidName {
                name: other.to_string(),
                reason: "updateStrategy must be batch or live".to_string(),
            }),
        }
    }
}

/// Outcome of the most recent population of a view.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RefreshState {
    #[default]
    Pending,
    Ready,
    Failed(String),
}

/// Request to create a view.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewConfig {
    pub name: String,
    pub query: String,
    pub updatable: bool,
    pub update_interval_seconds: Option<u64>,
    pub update_strategy: UpdateStrategy,
    pub watch_classes: Vec<String>,
    pub nodes: Vec<String>,
    pub origin_rid_field: Option<String>,
    pub indexes: Vec<ViewIndexConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ViewMetadata {
    #[serde(default)]
    updatable: bool,
    update_interval_seconds: Option<u64>,
    update_strategy: Option<String>,
    #[serde(default)]
    watch_classes: Vec<String>,
    #[serde(default)]
    nodes: Vec<String>,
    origin_rid_field: Option<String>,
    #[serde(default)]
    indexes: Vec<IndexMetadata>,
}

#[derive(Debug, Deserialize)]
struct IndexMetadata {
    r#type: String,
    engine: Option<String>,
    properties: IndexMap<String, IndexPropertyMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IndexPropertyMetadata {
    Type(String),
    Detailed {
        r#type: String,
        #[serde(rename = "linkedType")]
        linked_type: Option<String>,
        collate: Option<String>,
        #[serde(rename = "indexBy")]
        index_by: Option<String>,
    },
}

impl ViewConfig {
    pub fn new(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
            updatable: false,
            update_interval_seconds: None,
            update_strategy: UpdateStrategy::Batch,
            watch_classes: Vec::new(),
            nodes: Vec::new(),
            origin_rid_field: None,
            indexes: Vec::new(),
        }
    }

    /// Adds an explicit index to build on every refresh.
    pub fn add_index(&mut self, index_type: &str, engine: Option<&str>) -> &mut ViewIndexConfig {
        self.indexes
            .push(ViewIndexConfig::new(index_type, engine.map(str::to_string)));
        let last = self.indexes.len() - 1;
        &mut self.indexes[last]
    }

    /// Builds a view request from a JSON metadata document.
    ///
    /// Recognized keys: `updatable`, `updateIntervalSeconds`, `updateStrategy`,
    /// `watchClasses`, `nodes`, `originRidField` and `indexes`
    /// (`[{type, engine, properties: {name: TYPE | {type, linkedType, collate, indexBy}}}]`).
    pub fn from_metadata(name: &str, query: &str, metadata: &str) -> Result<Self> {
        let metadata: ViewMetadata = serde_json::from_str(metadata)
            .map_err(|e| CatalogError::Serialization(format!("Invalid view metadata: {}", e)))?;

        let mut config = ViewConfig::new(name, query);
        config.updatable = metadata.updatable;
        config.update_interval_seconds = metadata.update_interval_seconds;
        if let Some(strategy) = metadata.update_strategy.as_deref() {
            config.update_strategy = strategy.parse()?;
        }
        config.watch_classes = metadata.watch_classes;
        config.nodes = metadata.nodes;
        config.origin_rid_field = metadata.origin_rid_field;

        for index in metadata.indexes {
            let index_config = config.add_index(&index.r#type, index.engine.as_deref());
            for (field, spec) in index.properties {
                match spec {
                    IndexPropertyMetadata::Type(property_type) => {
                        index_config.add_property(
                            field,
                            property_type.parse()?,
                            None,
                            Collate::Default,
                            IndexBy::Key,
                        );
                    }
                    IndexPropertyMetadata::Detailed {
                        r#type,
                        linked_type,
                        collate,
                        index_by,
                    } => {
                        let linked_type = linked_type
                            .as_deref()
                            .map(str::parse::<PropertyType>)
                            .transpose()?;
                        let collate = collate
                            .as_deref()
                            .map(str::parse::<Collate>)
                            .transpose()?
                            .unwrap_or_default();
                        let index_by = index_by
                            .as_deref()
                            .map(str::parse::<IndexBy>)
                            .transpose()?
                            .unwrap_or(IndexBy::Key);
                        index_config.add_property(
                            field,
                            r#type.parse()?,
                            linked_type,
                            collate,
                            index_by,
                        );
                    }
                }
            }
        }
        Ok(config)
    }
}

/// A class whose content is the materialized result of a query.
#[derive(Debug, Clone)]
pub struct ViewDefinition {
    pub(crate) class: ClassDefinition,
    pub(crate) query: String,
    pub(crate) update_interval_seconds: u64,
    pub(crate) watch_classes: Vec<String>,
    pub(crate) nodes: Vec<String>,
    pub(crate) required_index_configs: Vec<ViewIndexConfig>,
    pub(crate) update_strategy: UpdateStrategy,
    pub(crate) active_index_names: Vec<String>,
    pub(crate) last_refresh_time: Option<u64>,
    pub(crate) origin_rid_field: Option<String>,
    pub(crate) updatable: bool,
    pub(crate) refresh_state: RefreshState,
    pub(crate) generation: u64,
}

impl ViewDefinition {
    /// The class side of the view.
    pub fn as_class(&self) -> &ClassDefinition {
        &self.class
    }

    pub fn name(&self) -> &str {
        self.class.name()
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn update_interval_seconds(&self) -> u64 {
        self.update_interval_seconds
    }

    pub fn watch_classes(&self) -> &[String] {
        &self.watch_classes
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn required_index_configs(&self) -> &[ViewIndexConfig] {
        &self.required_index_configs
    }

    pub fn update_strategy(&self) -> UpdateStrategy {
        self.update_strategy
    }

    pub fn active_index_names(&self) -> &[String] {
        &self.active_index_names
    }

    /// Milliseconds since the Unix epoch of the last completed refresh.
    pub fn last_refresh_time(&self) -> Option<u64> {
        self.last_refresh_time
    }

    pub fn origin_rid_field(&self) -> Option<&str> {
        self.origin_rid_field.as_deref()
    }

    pub fn is_updatable(&self) -> bool {
        self.updatable
    }

    pub fn refresh_state(&self) -> &RefreshState {
        &self.refresh_state
    }

    pub fn cluster_ids(&self) -> &[i32] {
        self.class.cluster_ids()
    }

    /// Number of completed refreshes.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Index names the current generation is expected to have built.
    pub fn implied_index_names(&self) -> Vec<String> {
        self.required_index_configs
            .iter()
            .map(|config| config.index_name(self.name(), self.generation))
            .collect()
    }

    /// Whether this node builds the view.
    pub fn is_built_on(&self, node: &str) -> bool {
        self.nodes.is_empty() || self.nodes.iter().any(|n| n == node)
    }
}

/// Resources to release after a view is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ViewRemovedMetadata {
    pub clusters: Vec<i32>,
    pub indexes: Vec<String>,
}

/// Resources to release after a class is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClassRemovedMetadata {
    pub clusters: Vec<i32>,
    pub indexes: Vec<String>,
}

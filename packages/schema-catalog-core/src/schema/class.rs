//! Class definitions.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use indexmap::IndexMap;

use super::property::PropertyDescriptor;
use crate::cluster::{ClusterSelectionStrategy, ABSTRACT_CLUSTER_ID};
use crate::error::{CatalogError, Result};

/// Lookup key for class and property names.
pub(crate) fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// A named record type with properties, super-types and clusters.
#[derive(Debug, Clone)]
pub struct ClassDefinition {
    pub(crate) name: String,
    pub(crate) short_name: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) is_abstract: bool,
    pub(crate) strict_mode: bool,
    pub(crate) super_classes: Vec<String>,
    pub(crate) subclasses: Vec<String>,
    pub(crate) properties: IndexMap<String, PropertyDescriptor>,
    pub(crate) cluster_ids: Vec<i32>,
    pub(crate) cluster_selection: Arc<dyn ClusterSelectionStrategy>,
    pub(crate) custom: IndexMap<String, String>,
}

impl ClassDefinition {
    pub(crate) fn new(
        name: &str,
        super_classes: Vec<String>,
        cluster_ids: Vec<i32>,
        cluster_selection: Arc<dyn ClusterSelectionStrategy>,
    ) -> Self {
        let is_abstract = cluster_ids == [ABSTRACT_CLUSTER_ID];
        Self {
            name: name.to_string(),
            short_name: None,
            description: None,
            is_abstract,
            strict_mode: false,
            super_classes,
            subclasses: Vec::new(),
            properties: IndexMap::new(),
            cluster_ids,
            cluster_selection,
            custom: IndexMap::new(),
        }
    }

    /// Display name (original case).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn short_name(&self) -> Option<&str> {
        self.short_name.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn is_strict_mode(&self) -> bool {
        self.strict_mode
    }

    /// Direct super-types in declaration order.
    pub fn super_classes(&self) -> &[String] {
        &self.super_classes
    }

    /// Direct subclasses.
    pub fn subclasses(&self) -> &[String] {
        &self.subclasses
    }

    pub fn has_super_classes(&self) -> bool {
        !self.super_classes.is_empty()
    }

    /// Own (non-inherited) property by case-insensitive name.
    pub fn own_property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.get(&name_key(name))
    }

    /// Own properties in creation order.
    pub fn own_properties(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.properties.values()
    }

    pub fn cluster_ids(&self) -> &[i32] {
        &self.cluster_ids
    }

    pub fn cluster_selection(&self) -> &Arc<dyn ClusterSelectionStrategy> {
        &self.cluster_selection
    }

    pub fn custom(&self, key: &str) -> Option<&str> {
        self.custom.get(key).map(String::as_str)
    }

    pub fn custom_keys(&self) -> impl Iterator<Item = &str> {
        self.custom.keys().map(String::as_str)
    }

    pub(crate) fn has_super_class_key(&self, key: &str) -> bool {
        self.super_classes.iter().any(|s| name_key(s) == key)
    }

    pub(crate) fn remove_subclass(&mut self, key: &str) {
        self.subclasses.retain(|s| name_key(s) != key);
    }

    pub(crate) fn add_subclass(&mut self, name: &str) {
        let key = name_key(name);
        if !self.subclasses.iter().any(|s| name_key(s) == key) {
            self.subclasses.push(name.to_string());
        }
    }
}

/// Attributes settable through the textual class interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassAttribute {
    Name,
    ShortName,
    SuperClass,
    SuperClasses,
    StrictMode,
    Abstract,
    AddCluster,
    RemoveCluster,
    ClusterSelection,
    Custom,
    Description,
}

impl ClassAttribute {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassAttribute::Name => "NAME",
            ClassAttribute::ShortName => "SHORTNAME",
            ClassAttribute::SuperClass => "SUPERCLASS",
            ClassAttribute::SuperClasses => "SUPERCLASSES",
            ClassAttribute::StrictMode => "STRICT_MODE",
            ClassAttribute::Abstract => "ABSTRACT",
            ClassAttribute::AddCluster => "ADD_CLUSTER",
            ClassAttribute::RemoveCluster => "REMOVE_CLUSTER",
            ClassAttribute::ClusterSelection => "CLUSTER_SELECTION",
            ClassAttribute::Custom => "CUSTOM",
            ClassAttribute::Description => "DESCRIPTION",
        }
    }
}

impl fmt::Display for ClassAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClassAttribute {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        let attribute = match s.trim().to_ascii_uppercase().as_str() {
            "NAME" => ClassAttribute::Name,
            "SHORTNAME" => ClassAttribute::ShortName,
            "SUPERCLASS" => ClassAttribute::SuperClass,
            "SUPERCLASSES" => ClassAttribute::SuperClasses,
            "STRICT_MODE" | "STRICTMODE" => ClassAttribute::StrictMode,
            "ABSTRACT" => ClassAttribute::Abstract,
            "ADD_CLUSTER" | "ADDCLUSTER" => ClassAttribute::AddCluster,
            "REMOVE_CLUSTER" | "REMOVECLUSTER" => ClassAttribute::RemoveCluster,
            "CLUSTER_SELECTION" | "CLUSTERSELECTION" => ClassAttribute::ClusterSelection,
            "CUSTOM" => ClassAttribute::Custom,
            "DESCRIPTION" => ClassAttribute::Description,
            other => {
                return Err(CatalogError::InvalidName {
                    name: other.to_string(),
                    reason: "unknown class attribute".to_string(),
                })
            }
        };
        Ok(attribute)
    }
}

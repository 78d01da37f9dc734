//! Property descriptors.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;

use super::constraint;
use crate::error::{CatalogError, Result};
use crate::types::{Collate, PropertyType};

/// A named, typed, constrained attribute of a class.
///
/// The descriptor references its global property by id. It is owned by
/// exactly one class definition and changed only through the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    pub(crate) name: String,
    pub(crate) global_id: u32,
    pub(crate) property_type: PropertyType,
    pub(crate) linked_type: Option<PropertyType>,
    pub(crate) linked_class: Option<String>,
    pub(crate) not_null: bool,
    pub(crate) mandatory: bool,
    pub(crate) readonly: bool,
    pub(crate) min: Option<String>,
    pub(crate) max: Option<String>,
    pub(crate) default_value: Option<String>,
    pub(crate) regexp: Option<String>,
    pub(crate) collate: Collate,
    pub(crate) description: Option<String>,
    pub(crate) custom: IndexMap<String, String>,
}

impl PropertyDescriptor {
    pub(crate) fn new(name: &str, global_id: u32, property_type: PropertyType) -> Self {
        Self {
            name: name.to_string(),
            global_id,
            property_type,
            linked_type: None,
            linked_class: None,
            not_null: false,
            mandatory: false,
            readonly: false,
            min: None,
            max: None,
            default_value: None,
            regexp: None,
            collate: Collate::Default,
            description: None,
            custom: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Id of the referenced global property.
    pub fn id(&self) -> u32 {
        self.global_id
    }

    pub fn property_type(&self) -> PropertyType {
        self.property_type
    }

    pub fn linked_type(&self) -> Option<PropertyType> {
        self.linked_type
    }

    pub fn linked_class(&self) -> Option<&str> {
        self.linked_class.as_deref()
    }

    pub fn is_not_null(&self) -> bool {
        self.not_null
    }

    pub fn is_mandatory(&self) -> bool {
        self.mandatory
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    pub fn min(&self) -> Option<&str> {
        self.min.as_deref()
    }

    pub fn max(&self) -> Option<&str> {
        self.max.as_deref()
    }

    pub fn default_value(&self) -> Option<&str> {
        self.default_value.as_deref()
    }

    pub fn regexp(&self) -> Option<&str> {
        self.regexp.as_deref()
    }

    pub fn collate(&self) -> Collate {
        self.collate
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn custom(&self, key: &str) -> Option<&str> {
        self.custom.get(key).map(String::as_str)
    }

    /// Custom attributes in insertion order.
    pub fn custom_keys(&self) -> impl Iterator<Item = &str> {
        self.custom.keys().map(String::as_str)
    }

    pub(crate) fn set_min(&mut self, value: Option<String>) -> Result<()> {
        constraint::check_min_max(
            &self.name,
            self.property_type,
            value.as_deref(),
            self.max.as_deref(),
        )?;
        self.min = value;
        Ok(())
    }

    pub(crate) fn set_max(&mut self, value: Option<String>) -> Result<()> {
        constraint::check_min_max(
            &self.name,
            self.property_type,
            self.min.as_deref(),
            value.as_deref(),
        )?;
        self.max = value;
        Ok(())
    }

    pub(crate) fn set_regexp(&mut self, value: Option<String>) -> Result<()> {
        if let Some(pattern) = value.as_deref() {
            constraint::check_regexp(&self.name, self.property_type, pattern)?;
        }
        self.regexp = value;
        Ok(())
    }

    pub(crate) fn set_default_value(&mut self, value: Option<String>) -> Result<()> {
        if let Some(default) = value.as_deref() {
            constraint::check_default_value(&self.name, self.property_type, default)?;
        }
        self.default_value = value;
        Ok(())
    }

    pub(crate) fn set_linked_type(&mut self, value: Option<PropertyType>) -> Result<()> {
        if let Some(linked) = value {
            constraint::check_linked_type(
                &self.name,
                self.property_type,
                linked,
                self.linked_class.as_deref(),
            )?;
        }
        self.linked_type = value;
        Ok(())
    }

    /// Caller checks that the class exists.
    pub(crate) fn set_linked_class(&mut self, value: Option<String>) -> Result<()> {
        if value.is_some() {
            constraint::check_linked_class(&self.name, self.property_type, self.linked_type)?;
        }
        self.linked_class = value;
        Ok(())
    }

    /// Re-validates stored constraints after a type change.
    pub(crate) fn revalidate(&self) -> Result<()> {
        constraint::check_min_max(
            &self.name,
            self.property_type,
            self.min.as_deref(),
            self.max.as_deref(),
        )?;
        if let Some(pattern) = self.regexp.as_deref() {
            constraint::check_regexp(&self.name, self.property_type, pattern)?;
        }
        if let Some(default) = self.default_value.as_deref() {
            constraint::check_default_value(&self.name, self.property_type, default)?;
        }
        if let Some(linked) = self.linked_type {
            constraint::check_linked_type(&self.name, self.property_type, linked, None)?;
        }
        if self.linked_class.is_some() {
            constraint::check_linked_class(&self.name, self.property_type, None)?;
        }
        Ok(())
    }
}

/// Attributes settable through the textual property interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyAttribute {
    LinkedClass,
    LinkedType,
    Min,
    Mandatory,
    Readonly,
    Max,
    Default,
    Name,
    NotNull,
    Regexp,
    Type,
    Collate,
    Custom,
    Description,
}

impl PropertyAttribute {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyAttribute::LinkedClass => "LINKEDCLASS",
            PropertyAttribute::LinkedType => "LINKEDTYPE",
            PropertyAttribute::Min => "MIN",
            PropertyAttribute::Mandatory => "MANDATORY",
            PropertyAttribute::Readonly => "READONLY",
            PropertyAttribute::Max => "MAX",
            PropertyAttribute::Default => "DEFAULT",
            PropertyAttribute::Name => "NAME",
            PropertyAttribute::NotNull => "NOTNULL",
            PropertyAttribute::Regexp => "REGEXP",
            PropertyAttribute::Type => "TYPE",
            PropertyAttribute::Collate => "COLLATE",
            PropertyAttribute::Custom => "CUSTOM",
            PropertyAttribute::Description => "DESCRIPTION",
        }
    }
}

impl fmt::Display for PropertyAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyAttribute {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        let attribute = match s.trim().to_ascii_uppercase().as_str() {
            "LINKEDCLASS" => PropertyAttribute::LinkedClass,
            "LINKEDTYPE" => PropertyAttribute::LinkedType,
            "MIN" => PropertyAttribute::Min,
            "MANDATORY" => PropertyAttribute::Mandatory,
            "READONLY" => PropertyAttribute::Readonly,
            "MAX" => PropertyAttribute::Max,
            "DEFAULT" => PropertyAttribute::Default,
            "NAME" => PropertyAttribute::Name,
            "NOTNULL" => PropertyAttribute::NotNull,
            "REGEXP" => PropertyAttribute::Regexp,
            "TYPE" => PropertyAttribute::Type,
            "COLLATE" => PropertyAttribute::Collate,
            "CUSTOM" => PropertyAttribute::Custom,
            "DESCRIPTION" => PropertyAttribute::Description,
            other => {
                return Err(CatalogError::InvalidName {
                    name: other.to_string(),
                    reason: "unknown property attribute".to_string(),
                })
            }
        };
        Ok(attribute)
    }
}

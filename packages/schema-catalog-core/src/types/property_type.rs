//! Property value types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// Value type of a property.
///
/// The numeric ids are stable and appear in binary records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum PropertyType {
    Boolean,
    Integer,
    Short,
    Long,
    Float,
    Double,
    DateTime,
    String,
    Binary,
    Embedded,
    EmbeddedList,
    EmbeddedSet,
    EmbeddedMap,
    Link,
    LinkList,
    LinkSet,
    LinkMap,
    Byte,
    Date,
    Decimal,
    LinkBag,
    Any,
}

impl PropertyType {
    pub const ALL: [PropertyType; 22] = [
        PropertyType::Boolean,
        PropertyType::Integer,
        PropertyType::Short,
        PropertyType::Long,
        PropertyType::Float,
        PropertyType::Double,
        PropertyType::DateTime,
        PropertyType::String,
        PropertyType::Binary,
        PropertyType::Embedded,
        PropertyType::EmbeddedList,
        PropertyType::EmbeddedSet,
        PropertyType::EmbeddedMap,
        PropertyType::Link,
        PropertyType::LinkList,
        PropertyType::LinkSet,
        PropertyType::LinkMap,
        PropertyType::Byte,
        PropertyType::Date,
        PropertyType::Decimal,
        PropertyType::LinkBag,
        PropertyType::Any,
    ];

    /// Symbolic name used in durable records.
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::Boolean => "BOOLEAN",
            PropertyType::Integer => "INTEGER",
            PropertyType::Short => "SHORT",
            PropertyType::Long => "LONG",
            PropertyType::Float => "FLOAT",
            PropertyType::Double => "DOUBLE",
            PropertyType::DateTime => "DATETIME",
            PropertyType::String => "STRING",
            PropertyType::Binary => "BINARY",
            PropertyType::Embedded => "EMBEDDED",
            PropertyType::EmbeddedList => "EMBEDDEDLIST",
            PropertyType::EmbeddedSet => "EMBEDDEDSET",
            PropertyType::EmbeddedMap => "EMBEDDEDMAP",
            PropertyType::Link => "LINK",
            PropertyType::LinkList => "LINKLIST",
            PropertyType::LinkSet => "LINKSET",
            PropertyType::LinkMap => "LINKMAP",
            PropertyType::Byte => "BYTE",
            PropertyType::Date => "DATE",
            PropertyType::Decimal => "DECIMAL",
            PropertyType::LinkBag => "LINKBAG",
            PropertyType::Any => "ANY",
        }
    }

    /// Stable numeric id.
    pub fn id(&self) -> u8 {
        match self {
            PropertyType::Boolean => 0,
            PropertyType::Integer => 1,
            PropertyType::Short => 2,
            PropertyType::Long => 3,
            PropertyType::Float => 4,
            PropertyType::Double => 5,
            PropertyType::DateTime => 6,
            PropertyType::String => 7,
            PropertyType::Binary => 8,
            PropertyType::Embedded => 9,
            PropertyType::EmbeddedList => 10,
            PropertyType::EmbeddedSet => 11,
            PropertyType::EmbeddedMap => 12,
            PropertyType::Link => 13,
            PropertyType::LinkList => 14,
            PropertyType::LinkSet => 15,
            PropertyType::LinkMap => 16,
            PropertyType::Byte => 17,
            PropertyType::Date => 19,
            PropertyType::Decimal => 21,
            PropertyType::LinkBag => 22,
            PropertyType::Any => 23,
        }
    }

    pub fn from_id(id: u8) -> Option<PropertyType> {
        Self::ALL.iter().copied().find(|t| t.id() == id)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            PropertyType::Byte
                | PropertyType::Short
                | PropertyType::Integer
                | PropertyType::Long
                | PropertyType::Float
                | PropertyType::Double
                | PropertyType::Decimal
        )
    }

    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            PropertyType::Byte | PropertyType::Short | PropertyType::Integer | PropertyType::Long
        )
    }

    pub fn is_link(&self) -> bool {
        matches!(
            self,
            PropertyType::Link
                | PropertyType::LinkList
                | PropertyType::LinkSet
                | PropertyType::LinkMap
                | PropertyType::LinkBag
        )
    }

    pub fn is_embedded(&self) -> bool {
        matches!(
            self,
            PropertyType::Embedded
                | PropertyType::EmbeddedList
                | PropertyType::EmbeddedSet
                | PropertyType::EmbeddedMap
        )
    }

    pub fn is_multi_value(&self) -> bool {
        matches!(
            self,
            PropertyType::EmbeddedList
                | PropertyType::EmbeddedSet
                | PropertyType::EmbeddedMap
                | PropertyType::LinkList
                | PropertyType::LinkSet
                | PropertyType::LinkMap
                | PropertyType::LinkBag
        )
    }

    /// Whether a linked class may be attached.
    pub fn supports_linked_class(&self) -> bool {
        self.is_link() || self.is_embedded()
    }

    /// Whether a linked (element) type may be attached.
    pub fn supports_linked_type(&self) -> bool {
        matches!(
            self,
            PropertyType::EmbeddedList | PropertyType::EmbeddedSet | PropertyType::EmbeddedMap
        )
    }

    /// Whether values of `from` can be widened to `self` without loss.
    pub fn is_castable_from(&self, from: PropertyType) -> bool {
        use PropertyType::*;
        if *self == from {
            return true;
        }
        let sources: &[PropertyType] = match self {
            Byte => &[Boolean],
            Short => &[Boolean, Byte],
            Integer => &[Boolean, Byte, Short],
            Long => &[Boolean, Byte, Short, Integer],
            Float => &[Boolean, Byte, Short, Integer],
            Double => &[Boolean, Byte, Short, Integer, Long, Float],
            Decimal => &[Boolean, Byte, Short, Integer, Long, Float, Double],
            LinkList => &[LinkSet],
            EmbeddedList => &[EmbeddedSet],
            _ => &[],
        };
        sources.contains(&from)
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyType {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == upper)
            .ok_or_else(|| CatalogError::UnknownPropertyType(s.to_string()))
    }
}

impl From<PropertyType> for String {
    fn from(value: PropertyType) -> Self {
        value.as_str().to_string()
    }
}

impl TryFrom<String> for PropertyType {
    type Error = CatalogError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

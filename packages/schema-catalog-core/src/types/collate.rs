//! Collation names accepted on properties and index keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// Comparison rule applied to property values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Collate {
    #[default]
    Default,
    CaseInsensitive,
}

impl Collate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collate::Default => "default",
            Collate::CaseInsensitive => "ci",
        }
    }
}

impl fmt::Display for Collate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collate {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "default" => Ok(Collate::Default),
            "ci" => Ok(Collate::CaseInsensitive),
            other => Err(CatalogError::invalid_constraint(
                "",
                "collate",
                format!("unknown collation '{}'", other),
            )),
        }
    }
}

impl From<Collate> for String {
    fn from(value: Collate) -> Self {
        value.as_str().to_string()
    }
}

impl TryFrom<String> for Collate {
    type Error = CatalogError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

//! Schema model: property descriptors, class and view definitions.

mod class;
pub mod constraint;
mod property;
mod view;

pub(crate) use class::name_key;
pub use class::{ClassAttribute, ClassDefinition};
pub use property::{PropertyAttribute, PropertyDescriptor};
pub use view::{
    ClassRemovedMetadata, IndexBy, IndexConfigProperty, RefreshState, UpdateStrategy, ViewConfig,
    ViewDefinition, ViewIndexConfig, ViewRemovedMetadata,
};

/// Parsed form of a `CUSTOM` attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CustomChange {
    Clear,
    Set(String, String),
    Remove(String),
}

impl CustomChange {
    /// Parses `name = value`, `name =` (remove) or `clear`.
    pub(crate) fn parse(value: &str) -> crate::error::Result<Self> {
        match value.find('=') {
            None if value.trim().eq_ignore_ascii_case("clear") => Ok(CustomChange::Clear),
            None => Err(crate::error::CatalogError::InvalidName {
                name: value.to_string(),
                reason: "expected <name> = <value> or clear".to_string(),
            }),
            Some(pos) => {
                let name = value[..pos].trim().to_string();
                let mut custom_value = value[pos + 1..].trim();
                if is_quoted(custom_value) {
                    custom_value = &custom_value[1..custom_value.len() - 1];
                }
                if custom_value.is_empty() {
                    Ok(CustomChange::Remove(name))
                } else {
                    Ok(CustomChange::Set(name, custom_value.to_string()))
                }
            }
        }
    }

    pub(crate) fn apply(self, custom: &mut indexmap::IndexMap<String, String>) {
        match self {
            CustomChange::Clear => custom.clear(),
            CustomChange::Set(name, value) => {
                custom.insert(name, value);
            }
            CustomChange::Remove(name) => {
                custom.shift_remove(&name);
            }
        }
    }
}

fn is_quoted(s: &str) -> bool {
    s.len() >= 2
        && ['"', '\'', '`']
            .iter()
            .any(|&q| s.starts_with(q) && s.ends_with(q))
}

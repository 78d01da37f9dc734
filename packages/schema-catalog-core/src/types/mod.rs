//! Property value types and collations.

mod collate;
mod property_type;

pub use collate::Collate;
pub use property_type::PropertyType;

//! Catalog error types.

use thiserror::Error;

/// Schema catalog operation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    /// Class (or view) not found
    #[error("Class '{class}' not found")]
    ClassNotFound { class: String },

    /// View not found
    #[error("View '{view}' not found")]
    ViewNotFound { view: String },

    /// Property not found in class
    #[error("Property '{property}' not found in class '{class}'")]
    PropertyNotFound { class: String, property: String },

    /// Class or view name already taken
    #[error("Class '{0}' already exists")]
    DuplicateClassName(String),

    /// Super-type graph would become cyclic or reference an unusable parent
    #[error("Invalid hierarchy for class '{class}': {reason}")]
    InvalidHierarchy { class: String, reason: String },

    /// Existing class has a different super-type set than requested
    #[error("Class '{class}' exists with super-types [{existing}], requested [{requested}]")]
    IncompatibleHierarchy {
        class: String,
        existing: String,
        requested: String,
    },

    /// Class cannot be dropped while subclasses exist
    #[error("Class '{class}' cannot be dropped because it has subclasses: {subclasses}")]
    ClassHasSubclasses { class: String, subclasses: String },

    /// Property name already bound to another type
    #[error("Property '{name}' conflicts: already defined as {existing}, requested {requested}")]
    PropertyNameConflict {
        name: String,
        existing: String,
        requested: String,
    },

    /// Unrecognized symbolic property type
    #[error("Unknown property type '{0}'")]
    UnknownPropertyType(String),

    /// Constraint value inconsistent with the property type
    #[error("Invalid constraint '{attribute}' on '{property}': {reason}")]
    InvalidConstraint {
        property: String,
        attribute: &'static str,
        reason: String,
    },

    /// Invalid class, property or cluster name
    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// Cluster already owned by another class or view
    #[error("Cluster {cluster_id} is already used by '{owner}'")]
    ClusterInUse { cluster_id: i32, owner: String },

    /// Mutation lock could not be obtained in time
    #[error("Schema is locked (waited {waited_ms} ms)")]
    SchemaLocked { waited_ms: u64 },

    /// Schema changes are not allowed inside a transaction
    #[error("Cannot change the schema while session {session} has an active transaction")]
    ActiveTransaction { session: u64 },

    /// Index type or engine not registered with the index manager
    #[error("Index type '{index_type}' with engine '{engine}' is not available")]
    IndexEngineUnavailable { index_type: String, engine: String },

    /// View query rejected by the query parser
    #[error("Invalid view query '{query}': {reason}")]
    ViewQueryInvalid { query: String, reason: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Data corruption detected in a durable schema record
    #[error("Data corruption detected: {0}")]
    DataCorruption(String),

    /// I/O error during persistence
    #[error("I/O error: {0}")]
    Io(String),

    /// Transient I/O error that may succeed on retry
    #[error("Transient I/O error: {0}")]
    TransientIo(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CatalogError>;

impl CatalogError {
    pub(crate) fn class_not_found(class: &str) -> Self {
        CatalogError::ClassNotFound {
            class: class.to_string(),
        }
    }

    pub(crate) fn invalid_constraint(
        property: &str,
        attribute: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        CatalogError::InvalidConstraint {
            property: property.to_string(),
            attribute,
            reason: reason.into(),
        }
    }
}

//! Catalog configuration.

use std::path::PathBuf;

/// Catalog configuration.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Data directory for the durable schema record
    pub data_dir: PathBuf,
    /// Clusters allocated for a new concrete class when none are given
    pub minimum_clusters: usize,
    /// Cluster selection strategy used when no super-type provides one
    pub default_cluster_selection: String,
    /// Maximum wait for the schema mutation lock in milliseconds
    pub schema_lock_timeout_ms: u64,
    /// Save the schema record after every committed mutation
    pub persist_on_commit: bool,
    /// Node name used to decide which views are built locally
    pub local_node_name: String,
    /// Populate new views in the background when they are created
    pub populate_views_on_create: bool,
    /// Refresh interval for views that do not declare one
    pub default_view_update_interval_seconds: u64,
    /// Maximum retry attempts for transient I/O errors
    pub persistence_max_retries: u32,
    /// Delay between retry attempts in milliseconds
    pub persistence_retry_delay_ms: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            minimum_clusters: 1,
            default_cluster_selection: "round-robin".to_string(),
            schema_lock_timeout_ms: 5000, // 5 seconds default
            persist_on_commit: false,
            local_node_name: "local".to_string(),
            populate_views_on_create: true,
            default_view_update_interval_seconds: 30,
            persistence_max_retries: 3,      // Default retry attempts
            persistence_retry_delay_ms: 100, // 100ms delay between retries
        }
    }
}

impl CatalogConfig {
    /// Lock timeout as a `Duration`.
    pub fn schema_lock_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.schema_lock_timeout_ms)
    }
}

//! Index manager collaborator and index lookup by field set.

use std::collections::{BTreeMap, HashMap, HashSet};

use parking_lot::RwLock;

use crate::error::{CatalogError, Result};

/// Live index known to the index manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    pub name: String,
    pub class_name: String,
    /// Key fields in key order.
    pub fields: Vec<String>,
    pub index_type: String,
    pub engine: String,
    pub cluster_ids: Vec<i32>,
    /// Records whose key fields are null are not indexed.
    pub null_values_ignored: bool,
}

impl IndexDefinition {
    pub fn new(
        name: impl Into<String>,
        class_name: impl Into<String>,
        fields: Vec<String>,
        index_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            class_name: class_name.into(),
            fields,
            index_type: index_type.into(),
            engine: String::new(),
            cluster_ids: Vec::new(),
            null_values_ignored: true,
        }
    }

    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = engine.into();
        self
    }

    pub fn with_cluster_ids(mut self, cluster_ids: Vec<i32>) -> Self {
        self.cluster_ids = cluster_ids;
        self
    }

    pub fn with_null_values_ignored(mut self, ignored: bool) -> Self {
        self.null_values_ignored = ignored;
        self
    }

    pub fn contains_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f.eq_ignore_ascii_case(field))
    }
}

/// Index engine registry and index lifecycle, owned by the storage layer.
pub trait IndexManager: Send + Sync {
    /// Whether the index type (and engine, when given) can be built.
    fn has_engine(&self, index_type: &str, engine: Option<&str>) -> bool;

    /// Creates an index and returns the stored definition.
    fn create_index(&self, definition: IndexDefinition) -> Result<IndexDefinition>;

    fn drop_index(&self, name: &str) -> Result<()>;

    fn get_index(&self, name: &str) -> Option<IndexDefinition>;

    /// Indexes defined directly on a class.
    fn class_indexes(&self, class_name: &str) -> Vec<IndexDefinition>;

    /// Every index the manager holds, used to seed the catalog on load.
    fn all_indexes(&self) -> Vec<IndexDefinition>;

    /// Moves the indexes of a renamed class.
    fn rename_class(&self, _old_name: &str, _new_name: &str) -> Result<()> {
        Ok(())
    }
}

/// Index manager that keeps definitions in memory.
#[derive(Debug)]
pub struct InMemoryIndexManager {
    /// index type -> default engine
    types: RwLock<HashMap<String, String>>,
    engines: RwLock<HashSet<String>>,
    indexes: RwLock<BTreeMap<String, IndexDefinition>>,
}

impl Default for InMemoryIndexManager {
    fn default() -> Self {
        let manager = Self {
            types: RwLock::new(HashMap::new()),
            engines: RwLock::new(HashSet::new()),
            indexes: RwLock::new(BTreeMap::new()),
        };
        for index_type in ["UNIQUE", "NOTUNIQUE", "FULLTEXT", "DICTIONARY"] {
            manager.register_type(index_type, "CELL_BTREE");
        }
        for index_type in ["UNIQUE_HASH_INDEX", "NOTUNIQUE_HASH_INDEX"] {
            manager.register_type(index_type, "HASH_INDEX");
        }
        manager
    }
}

impl InMemoryIndexManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an index type together with its default engine.
    pub fn register_type(&self, index_type: &str, default_engine: &str) {
        let engine = default_engine.to_ascii_uppercase();
        self.engines.write().insert(engine.clone());
        self.types
            .write()
            .insert(index_type.to_ascii_uppercase(), engine);
    }

    pub fn register_engine(&self, engine: &str) {
        self.engines.write().insert(engine.to_ascii_uppercase());
    }

    pub fn index_names(&self) -> Vec<String> {
        self.indexes.read().keys().cloned().collect()
    }
}

impl IndexManager for InMemoryIndexManager {
    fn has_engine(&self, index_type: &str, engine: Option<&str>) -> bool {
        if !self.types.read().contains_key(&index_type.to_ascii_uppercase()) {
            return false;
        }
        match engine {
            Some(engine) => self.engines.read().contains(&engine.to_ascii_uppercase()),
            None => true,
        }
    }

    fn create_index(&self, mut definition: IndexDefinition) -> Result<IndexDefinition> {
        let index_type = definition.index_type.to_ascii_uppercase();
        let engine = if definition.engine.is_empty() {
            None
        } else {
            Some(definition.engine.clone())
        };
        if !self.has_engine(&index_type, engine.as_deref()) {
            return Err(CatalogError::IndexEngineUnavailable {
                index_type: definition.index_type.clone(),
                engine: engine.unwrap_or_else(|| "default".to_string()),
            });
        }
        let engine = match engine {
            Some(engine) => engine.to_ascii_uppercase(),
            None => self
                .types
                .read()
                .get(&index_type)
                .cloned()
                .unwrap_or_default(),
        };
        definition.index_type = index_type;
        definition.engine = engine;

        let mut indexes = self.indexes.write();
        if indexes.contains_key(&definition.name) {
            return Err(CatalogError::InvalidName {
                name: definition.name.clone(),
                reason: "index already exists".to_string(),
            });
        }
        indexes.insert(definition.name.clone(), definition.clone());
        tracing::debug!(
            "Created index {} on {} ({})",
            definition.name,
            definition.class_name,
            definition.fields.join(", ")
        );
        Ok(definition)
    }

    fn drop_index(&self, name: &str) -> Result<()> {
        match self.indexes.write().remove(name) {
            Some(_) => Ok(()),
            None => Err(CatalogError::InvalidName {
                name: name.to_string(),
                reason: "index does not exist".to_string(),
            }),
        }
    }

    fn get_index(&self, name: &str) -> Option<IndexDefinition> {
        self.indexes.read().get(name).cloned()
    }

    fn class_indexes(&self, class_name: &str) -> Vec<IndexDefinition> {
        self.indexes
            .read()
            .values()
            .filter(|index| index.class_name.eq_ignore_ascii_case(class_name))
            .cloned()
            .collect()
    }

    fn all_indexes(&self) -> Vec<IndexDefinition> {
        self.indexes.read().values().cloned().collect()
    }

    fn rename_class(&self, old_name: &str, new_name: &str) -> Result<()> {
        for index in self.indexes.write().values_mut() {
            if index.class_name.eq_ignore_ascii_case(old_name) {
                index.class_name = new_name.to_string();
            }
        }
        Ok(())
    }
}

/// Selects the indexes usable for a lookup on exactly `fields`.
///
/// An index matches when its first `fields.len()` key fields are the requested
/// set in any order. Longer indexes only match when they also index nulls.
/// Results are de-duplicated by name and ordered by key count, then name.
pub fn involved_indexes<'a>(
    indexes: impl IntoIterator<Item = &'a IndexDefinition>,
    fields: &[String],
) -> Vec<IndexDefinition> {
    let wanted: HashSet<String> = fields.iter().map(|f| f.to_lowercase()).collect();
    if wanted.is_empty() {
        return Vec::new();
    }

    let mut matched: BTreeMap<String, IndexDefinition> = BTreeMap::new();
    for index in indexes {
        if index.fields.len() < wanted.len() {
            continue;
        }
        let prefix: HashSet<String> = index.fields[..wanted.len()]
            .iter()
            .map(|f| f.to_lowercase())
            .collect();
        if prefix != wanted {
            continue;
        }
        if index.fields.len() == wanted.len() || !index.null_values_ignored {
            matched
                .entry(index.name.clone())
                .or_insert_with(|| index.clone());
        }
    }

    let mut result: Vec<IndexDefinition> = matched.into_values().collect();
    result.sort_by(|a, b| {
        a.fields
            .len()
            .cmp(&b.fields.len())
            .then_with(|| a.name.cmp(&b.name))
    });
    result
}

//! Schema validation logic for corruption detection.

use std::collections::{HashMap, HashSet};

use crate::cluster::ABSTRACT_CLUSTER_ID;
use crate::error::{CatalogError, Result};
use crate::schema::name_key;
use crate::types::PropertyType;

use super::schema::{ClassSchema, SchemaFile};

/// Validates schema integrity for corruption detection.
///
/// # Arguments
/// * `schema` - Schema record to validate
///
/// # Returns
/// `Result<()>` indicating success or the first inconsistency found.
pub fn validate_schema(schema: &SchemaFile) -> Result<()> {
    let globals = validate_global_properties(schema)?;

    let mut names = HashSet::new();
    let mut clusters: HashMap<i32, String> = HashMap::new();
    for &id in &schema.blob_clusters {
        clusters.insert(id, "blob".to_string());
    }

    for class in &schema.classes {
        validate_class(class, &globals, &mut names, &mut clusters)?;
    }
    for view in &schema.views {
        validate_class(&view.class, &globals, &mut names, &mut clusters)?;
        if !view.class.super_classes.is_empty() {
            return Err(CatalogError::DataCorruption(format!(
                "View '{}' declares super-types",
                view.class.name
            )));
        }
    }

    validate_hierarchy(&schema.classes)?;
    Ok(())
}

/// Checks ids and names are unique and types are known.
fn validate_global_properties(schema: &SchemaFile) -> Result<HashMap<u32, (String, PropertyType)>> {
    let mut by_id = HashMap::new();
    let mut seen_names = HashSet::new();
    for record in &schema.global_properties {
        // Unknown symbols surface as UnknownPropertyType, like any other
        // global property record.
        let property_type = record.r#type.parse::<PropertyType>()?;
        if !seen_names.insert(record.name.clone()) {
            return Err(CatalogError::DataCorruption(format!(
                "Duplicate global property name '{}'",
                record.name
            )));
        }
        if by_id
            .insert(record.id, (record.name.clone(), property_type))
            .is_some()
        {
            return Err(CatalogError::DataCorruption(format!(
                "Duplicate global property id {}",
                record.id
            )));
        }
    }
    Ok(by_id)
}

/// Validates a single class schema.
fn validate_class(
    class: &ClassSchema,
    globals: &HashMap<u32, (String, PropertyType)>,
    names: &mut HashSet<String>,
    clusters: &mut HashMap<i32, String>,
) -> Result<()> {
    if class.name.trim().is_empty() {
        return Err(CatalogError::DataCorruption(
            "Class with empty name".to_string(),
        ));
    }
    if !names.insert(name_key(&class.name)) {
        return Err(CatalogError::DataCorruption(format!(
            "Duplicate class name '{}'",
            class.name
        )));
    }

    for &id in &class.cluster_ids {
        if id == ABSTRACT_CLUSTER_ID {
            continue;
        }
        if let Some(owner) = clusters.insert(id, class.name.clone()) {
            return Err(CatalogError::DataCorruption(format!(
                "Cluster {} is owned by both '{}' and '{}'",
                id, owner, class.name
            )));
        }
    }

    let mut property_names = HashSet::new();
    for property in &class.properties {
        if !property_names.insert(name_key(&property.name)) {
            return Err(CatalogError::DataCorruption(format!(
                "Duplicate property '{}' in class '{}'",
                property.name, class.name
            )));
        }
        let property_type = property.r#type.parse::<PropertyType>().map_err(|_| {
            CatalogError::DataCorruption(format!(
                "Unknown type '{}' for property '{}.{}'",
                property.r#type, class.name, property.name
            ))
        })?;
        match globals.get(&property.global_id) {
            Some((name, global_type)) if *name == property.name && *global_type == property_type => {}
            Some((name, global_type)) => {
                return Err(CatalogError::DataCorruption(format!(
                    "Property '{}.{}' ({}) does not match global property {} ({} {})",
                    class.name, property.name, property_type, property.global_id, name, global_type
                )));
            }
            None => {
                return Err(CatalogError::DataCorruption(format!(
                    "Property '{}.{}' references missing global property {}",
                    class.name, property.name, property.global_id
                )));
            }
        }
    }
    Ok(())
}

/// Checks that super-types exist and the hierarchy is acyclic.
fn validate_hierarchy(classes: &[ClassSchema]) -> Result<()> {
    let parents: HashMap<String, Vec<String>> = classes
        .iter()
        .map(|c| {
            (
                name_key(&c.name),
                c.super_classes.iter().map(|s| name_key(s)).collect(),
            )
        })
        .collect();

    for class in classes {
        for parent in &class.super_classes {
            if !parents.contains_key(&name_key(parent)) {
                return Err(CatalogError::DataCorruption(format!(
                    "Super-type '{}' of class '{}' not found",
                    parent, class.name
                )));
            }
        }
    }

    // Depth-first search with colouring: 1 = on stack, 2 = done.
    let mut marks: HashMap<&str, u8> = HashMap::new();
    for start in parents.keys() {
        let mut stack: Vec<(&str, usize)> = vec![(start.as_str(), 0)];
        while let Some((node, next_child)) = stack.pop() {
            if next_child == 0 {
                match marks.get(node) {
                    Some(2) => continue,
                    Some(1) => {
                        return Err(CatalogError::DataCorruption(format!(
                            "Cyclic hierarchy through class '{}'",
                            node
                        )))
                    }
                    _ => {
                        marks.insert(node, 1);
                    }
                }
            }
            let children = &parents[node];
            if next_child < children.len() {
                stack.push((node, next_child + 1));
                let child = children[next_child].as_str();
                match marks.get(child) {
                    Some(1) => {
                        return Err(CatalogError::DataCorruption(format!(
                            "Cyclic hierarchy through class '{}'",
                            child
                        )))
                    }
                    Some(2) => {}
                    _ => stack.push((child, 0)),
                }
            } else {
                marks.insert(node, 2);
            }
        }
    }
    Ok(())
}

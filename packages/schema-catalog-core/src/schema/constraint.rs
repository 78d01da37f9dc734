//! Validation of names and property constraint values.

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;

use crate::error::{CatalogError, Result};
use crate::types::PropertyType;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const FORBIDDEN_NAME_CHARS: [char; 5] = [':', ',', ';', ' ', '='];

fn check_name(name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CatalogError::InvalidName {
            name: name.to_string(),
            reason: "name is empty".to_string(),
        });
    }
    if let Some(c) = trimmed.chars().find(|c| FORBIDDEN_NAME_CHARS.contains(c)) {
        return Err(CatalogError::InvalidName {
            name: name.to_string(),
            reason: format!("character '{}' is not allowed", c),
        });
    }
    Ok(())
}

/// Validates a class or view name.
pub fn check_class_name(name: &str) -> Result<()> {
    check_name(name)
}

/// Validates a property name.
pub fn check_property_name(name: &str) -> Result<()> {
    check_name(name)
}

/// Parsed min/max bound, comparable within the same property type.
#[derive(Debug, Clone, PartialEq, PartialOrd)]
pub enum LimitValue {
    Integer(i64),
    Decimal(f64),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Length(u64),
}

/// Parses a min/max bound for a property of type `property_type`.
///
/// Numeric types bound the value, DATE and DATETIME bound the timestamp, and
/// strings, binaries and collections bound the length.
pub fn parse_limit(
    property: &str,
    property_type: PropertyType,
    attribute: &'static str,
    value: &str,
) -> Result<LimitValue> {
    let value = value.trim();
    let bad = |reason: String| CatalogError::invalid_constraint(property, attribute, reason);

    match property_type {
        PropertyType::Byte => value
            .parse::<i8>()
            .map(|v| LimitValue::Integer(v as i64))
            .map_err(|e| bad(format!("'{}' is not a BYTE: {}", value, e))),
        PropertyType::Short => value
            .parse::<i16>()
            .map(|v| LimitValue::Integer(v as i64))
            .map_err(|e| bad(format!("'{}' is not a SHORT: {}", value, e))),
        PropertyType::Integer => value
            .parse::<i32>()
            .map(|v| LimitValue::Integer(v as i64))
            .map_err(|e| bad(format!("'{}' is not an INTEGER: {}", value, e))),
        PropertyType::Long => value
            .parse::<i64>()
            .map(LimitValue::Integer)
            .map_err(|e| bad(format!("'{}' is not a LONG: {}", value, e))),
        PropertyType::Float | PropertyType::Double | PropertyType::Decimal => value
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(LimitValue::Decimal)
            .ok_or_else(|| bad(format!("'{}' is not a {}", value, property_type))),
        PropertyType::Date => NaiveDate::parse_from_str(value, DATE_FORMAT)
            .map(LimitValue::Date)
            .map_err(|e| bad(format!("'{}' is not a date (yyyy-MM-dd): {}", value, e))),
        PropertyType::DateTime => NaiveDateTime::parse_from_str(value, DATETIME_FORMAT)
            .map(LimitValue::DateTime)
            .map_err(|e| {
                bad(format!(
                    "'{}' is not a datetime (yyyy-MM-dd HH:mm:ss): {}",
                    value, e
                ))
            }),
        PropertyType::String | PropertyType::Binary => parse_length(value).map_err(bad),
        t if t.is_multi_value() => parse_length(value).map_err(bad),
        other => Err(bad(format!("{} does not support {}", other, attribute))),
    }
}

fn parse_length(value: &str) -> std::result::Result<LimitValue, String> {
    value
        .parse::<u64>()
        .map(LimitValue::Length)
        .map_err(|_| format!("'{}' is not a non-negative length", value))
}

/// Checks the bounds individually and, when both are present, that `min <= max`.
pub fn check_min_max(
    property: &str,
    property_type: PropertyType,
    min: Option<&str>,
    max: Option<&str>,
) -> Result<()> {
    let min = min
        .map(|v| parse_limit(property, property_type, "min", v))
        .transpose()?;
    let max = max
        .map(|v| parse_limit(property, property_type, "max", v))
        .transpose()?;
    if let (Some(min), Some(max)) = (&min, &max) {
        if min > max {
            return Err(CatalogError::invalid_constraint(
                property,
                "min",
                format!("min {:?} is greater than max {:?}", min, max),
            ));
        }
    }
    Ok(())
}

/// Regular expressions are accepted only on STRING properties and must compile.
pub fn check_regexp(property: &str, property_type: PropertyType, pattern: &str) -> Result<()> {
    if property_type != PropertyType::String {
        return Err(CatalogError::invalid_constraint(
            property,
            "regexp",
            format!("regexp is only allowed on STRING, not {}", property_type),
        ));
    }
    Regex::new(pattern)
        .map(|_| ())
        .map_err(|e| CatalogError::invalid_constraint(property, "regexp", e.to_string()))
}

/// Default values must parse as the property type; other types accept free text.
pub fn check_default_value(property: &str, property_type: PropertyType, value: &str) -> Result<()> {
    let trimmed = value.trim();
    let ok = match property_type {
        PropertyType::Boolean => trimmed.eq_ignore_ascii_case("true") || trimmed.eq_ignore_ascii_case("false"),
        PropertyType::Byte => trimmed.parse::<i8>().is_ok(),
        PropertyType::Short => trimmed.parse::<i16>().is_ok(),
        PropertyType::Integer => trimmed.parse::<i32>().is_ok(),
        PropertyType::Long => trimmed.parse::<i64>().is_ok(),
        PropertyType::Float | PropertyType::Double | PropertyType::Decimal => {
            trimmed.parse::<f64>().is_ok()
        }
        PropertyType::Date => NaiveDate::parse_from_str(trimmed, DATE_FORMAT).is_ok(),
        PropertyType::DateTime => NaiveDateTime::parse_from_str(trimmed, DATETIME_FORMAT).is_ok(),
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(CatalogError::invalid_constraint(
            property,
            "default",
            format!("'{}' is not a valid {}", value, property_type),
        ))
    }
}

/// A linked type needs an embedded collection and excludes a linked class.
pub fn check_linked_type(
    property: &str,
    property_type: PropertyType,
    linked_type: PropertyType,
    linked_class: Option<&str>,
) -> Result<()> {
    if !property_type.supports_linked_type() {
        return Err(CatalogError::invalid_constraint(
            property,
            "linkedType",
            format!("{} cannot have a linked type", property_type),
        ));
    }
    if let Some(class) = linked_class {
        return Err(CatalogError::invalid_constraint(
            property,
            "linkedType",
            format!("linked class '{}' is already set ({})", class, linked_type),
        ));
    }
    Ok(())
}

/// A linked class needs a link or embedded type and excludes a linked type.
pub fn check_linked_class(
    property: &str,
    property_type: PropertyType,
    linked_type: Option<PropertyType>,
) -> Result<()> {
    if !property_type.supports_linked_class() {
        return Err(CatalogError::invalid_constraint(
            property,
            "linkedClass",
            format!("{} cannot have a linked class", property_type),
        ));
    }
    if let Some(linked_type) = linked_type {
        return Err(CatalogError::invalid_constraint(
            property,
            "linkedClass",
            format!("linked type {} is already set", linked_type),
        ));
    }
    Ok(())
}

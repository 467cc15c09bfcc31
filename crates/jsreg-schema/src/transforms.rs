//! # Built-in Transforms
//!
//! Two visitors a registry installs on construction:
//!
//! - [`AddUndefinedDefaults`] (post stage): makes every property a schema
//!   declares present in the output, using `null` as the absent marker.
//! - [`InsertSchemaDefaults`] (pre stage): copies `default` values from
//!   property schemas into objects that lack the property.

use jsreg_core::JsonPointer;
use serde_json::{Map, Value};

use crate::visitor::{JsonVisitor, Visit};

/// Registered name of [`AddUndefinedDefaults`].
pub const ADD_UNDEFINED_DEFAULTS: &str = "add-undefined-defaults";

/// Registered name of [`InsertSchemaDefaults`].
pub const INSERT_SCHEMA_DEFAULTS: &str = "insert-schema-defaults";

/// Fills declared-but-absent properties with `null`.
///
/// - An absent (`null`) value whose schema is array-like becomes `[]`.
/// - An absent value whose schema is object-like becomes an object with
///   every declared property set to `null`.
/// - An existing object gains every declared property it lacks, as `null`.
///
/// A `null` whose schema admits `null` is a real value and is left alone.
/// Running the transform twice gives the same result as running it once.
#[derive(Debug, Default, Clone, Copy)]
pub struct AddUndefinedDefaults;

impl JsonVisitor for AddUndefinedDefaults {
    fn name(&self) -> &str {
        ADD_UNDEFINED_DEFAULTS
    }

    fn visit<'a>(
        &'a self,
        value: Value,
        _pointer: &'a JsonPointer,
        schema: Option<&'a Value>,
    ) -> Visit<'a> {
        Visit::Ready(Ok(fill_undefined(value, schema)))
    }
}

fn fill_undefined(value: Value, schema: Option<&Value>) -> Value {
    let Some(schema) = schema.and_then(Value::as_object) else {
        return value;
    };
    match value {
        Value::Null if !admits_null(schema) => {
            if is_array_like(schema) {
                Value::Array(Vec::new())
            } else if is_object_like(schema) {
                let mut filled = Map::new();
                for name in declared_properties(schema) {
                    filled.insert(name.clone(), Value::Null);
                }
                Value::Object(filled)
            } else {
                Value::Null
            }
        }
        Value::Object(mut map) if is_object_like(schema) => {
            for name in declared_properties(schema) {
                map.entry(name.clone()).or_insert(Value::Null);
            }
            Value::Object(map)
        }
        other => other,
    }
}

/// Inserts `properties[*].default` into objects missing that property.
///
/// Only defaults written directly on a property schema are used; a property
/// schema that is a `$ref` contributes nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct InsertSchemaDefaults;

impl JsonVisitor for InsertSchemaDefaults {
    fn name(&self) -> &str {
        INSERT_SCHEMA_DEFAULTS
    }

    fn visit<'a>(
        &'a self,
        value: Value,
        _pointer: &'a JsonPointer,
        schema: Option<&'a Value>,
    ) -> Visit<'a> {
        let properties = schema
            .and_then(|s| s.get("properties"))
            .and_then(Value::as_object);
        let value = match (value, properties) {
            (Value::Object(mut map), Some(properties)) => {
                for (name, property) in properties {
                    if let Some(default) = property.get("default") {
                        map.entry(name.clone()).or_insert_with(|| default.clone());
                    }
                }
                Value::Object(map)
            }
            (other, _) => other,
        };
        Visit::Ready(Ok(value))
    }
}

fn declared_properties(schema: &Map<String, Value>) -> impl Iterator<Item = &String> {
    schema
        .get("properties")
        .and_then(Value::as_object)
        .into_iter()
        .flat_map(|props| props.keys())
}

fn has_type(schema: &Map<String, Value>, name: &str) -> bool {
    match schema.get("type") {
        Some(Value::String(t)) => t == name,
        Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some(name)),
        _ => false,
    }
}

fn admits_null(schema: &Map<String, Value>) -> bool {
    has_type(schema, "null") || schema.get("nullable") == Some(&Value::Bool(true))
}

fn is_array_like(schema: &Map<String, Value>) -> bool {
    schema.contains_key("items") || has_type(schema, "array")
}

fn is_object_like(schema: &Map<String, Value>) -> bool {
    schema.contains_key("properties") || has_type(schema, "object")
}

//! Attribute flattener
//!
//! Turns a nested notification into the flat `path -> scalar` map that
//! attribute-based backends expect.

use serde::Serialize;
use serde_json::{Map, Value};

use contracts::ContractError;

/// Flat attribute map, keyed by structural path
pub type Attributes = Map<String, Value>;

/// Flatten any serializable value into dotted/bracketed attribute paths
///
/// Nested map keys are joined with `.`, list elements get an `[i]` suffix.
/// Nulls and empty strings are dropped; numbers and booleans keep their type.
///
/// # Errors
/// Serialization failure, or a top-level value that is not a map.
pub fn flatten<T: Serialize + ?Sized>(value: &T) -> Result<Attributes, ContractError> {
    let root = serde_json::to_value(value)?;
    let Value::Object(map) = root else {
        return Err(ContractError::Other(format!(
            "cannot flatten {}: expected a map at the top level",
            type_label(&root)
        )));
    };

    let mut out = Attributes::new();
    for (key, child) in map {
        flatten_into(&mut out, key, child);
    }
    Ok(out)
}

fn flatten_into(out: &mut Attributes, path: String, value: Value) {
    match value {
        Value::Null => {}
        Value::String(s) if s.is_empty() => {}
        Value::Object(map) => {
            for (key, child) in map {
                flatten_into(out, format!("{path}.{key}"), child);
            }
        }
        Value::Array(items) => {
            for (idx, child) in items.into_iter().enumerate() {
                flatten_into(out, format!("{path}[{idx}]"), child);
            }
        }
        scalar => {
            out.insert(path, scalar);
        }
    }
}

fn type_label(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

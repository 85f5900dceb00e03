//! Object describer
//!
//! Renders an arbitrary resource as indented, human-readable text in the
//! spirit of `kubectl describe`.

use std::fmt::{self, Write};

use serde_json::{Map, Value};

use contracts::ContractError;

/// Produces the full textual description of a resource
pub trait ObjectDescriber: Send + Sync {
    /// Describe `obj`
    ///
    /// # Errors
    /// Returns `ContractError::Describe` when the object cannot be rendered.
    fn describe(&self, obj: &Value) -> Result<String, ContractError>;
}

/// Generic describer working on any object with metadata
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultDescriber;

/// Column at which header values start
const HEADER_WIDTH: usize = 14;

/// Keys rendered in the header, or not at all
const SKIPPED_KEYS: [&str; 3] = ["apiVersion", "kind", "metadata"];

impl ObjectDescriber for DefaultDescriber {
    fn describe(&self, obj: &Value) -> Result<String, ContractError> {
        let kind = obj.get("kind").and_then(Value::as_str).unwrap_or("");
        let fail = |message: &str| ContractError::describe(kind, message);

        let map = obj.as_object().ok_or_else(|| fail("object is not a map"))?;
        let metadata = map
            .get("metadata")
            .and_then(Value::as_object)
            .ok_or_else(|| fail("object has no metadata"))?;

        let mut out = String::new();
        render(&mut out, kind, map, metadata).map_err(|e| fail(&e.to_string()))?;
        Ok(out)
    }
}

fn render(
    out: &mut String,
    kind: &str,
    object: &Map<String, Value>,
    metadata: &Map<String, Value>,
) -> fmt::Result {
    let meta_str = |key: &str| metadata.get(key).and_then(Value::as_str).unwrap_or("");

    header(out, "Name", meta_str("name"))?;
    if !meta_str("namespace").is_empty() {
        header(out, "Namespace", meta_str("namespace"))?;
    }
    if !kind.is_empty() {
        header(out, "Kind", kind)?;
    }
    string_map(out, "Labels", metadata.get("labels"))?;
    string_map(out, "Annotations", metadata.get("annotations"))?;
    if !meta_str("creationTimestamp").is_empty() {
        header(out, "Created", meta_str("creationTimestamp"))?;
    }

    for (key, value) in object {
        if SKIPPED_KEYS.contains(&key.as_str()) {
            continue;
        }
        field(out, 0, &title_case(key), value)?;
    }
    Ok(())
}

fn header(out: &mut String, label: &str, value: &str) -> fmt::Result {
    let label = if label.is_empty() {
        String::new()
    } else {
        format!("{label}:")
    };
    writeln!(out, "{label:<width$}{value}", width = HEADER_WIDTH)
}

fn string_map(out: &mut String, label: &str, value: Option<&Value>) -> fmt::Result {
    let entries = value.and_then(Value::as_object).filter(|m| !m.is_empty());
    let Some(entries) = entries else {
        return header(out, label, "<none>");
    };

    let mut first = true;
    for (key, value) in entries {
        let rendered = match value {
            Value::String(s) => format!("{key}={s}"),
            other => format!("{key}={other}"),
        };
        if first {
            header(out, label, &rendered)?;
            first = false;
        } else {
            header(out, "", &rendered)?;
        }
    }
    Ok(())
}

fn field(out: &mut String, indent: usize, key: &str, value: &Value) -> fmt::Result {
    let pad = " ".repeat(indent);
    match value {
        Value::Object(map) if map.is_empty() => writeln!(out, "{pad}{key}:  <none>"),
        Value::Object(map) => {
            writeln!(out, "{pad}{key}:")?;
            for (child_key, child) in map {
                field(out, indent + 2, child_key, child)?;
            }
            Ok(())
        }
        Value::Array(items) if items.is_empty() => writeln!(out, "{pad}{key}:  <none>"),
        Value::Array(items) => {
            writeln!(out, "{pad}{key}:")?;
            for item in items {
                list_item(out, indent + 2, item)?;
            }
            Ok(())
        }
        scalar => writeln!(out, "{pad}{key}:  {}", scalar_text(scalar)),
    }
}

fn list_item(out: &mut String, indent: usize, item: &Value) -> fmt::Result {
    let pad = " ".repeat(indent);
    match item {
        Value::Object(map) => {
            let mut entries = map.iter();
            match entries.next() {
                None => writeln!(out, "{pad}- <none>"),
                Some((first_key, first)) => {
                    // First entry shares the dash line, the rest align under it.
                    out.push_str(&pad);
                    out.push_str("- ");
                    let mut first_line = String::new();
                    field(&mut first_line, 0, first_key, first)?;
                    push_indented(out, &first_line, indent + 2);
                    for (key, value) in entries {
                        field(out, indent + 2, key, value)?;
                    }
                    Ok(())
                }
            }
        }
        Value::Array(_) => {
            out.push_str(&pad);
            out.push_str("-\n");
            field(out, indent + 2, "items", item)
        }
        scalar => writeln!(out, "{pad}- {}", scalar_text(scalar)),
    }
}

/// Append `block`, indenting every line after the first
fn push_indented(out: &mut String, block: &str, indent: usize) {
    let pad = " ".repeat(indent);
    for (idx, line) in block.lines().enumerate() {
        if idx > 0 {
            out.push_str(&pad);
        }
        out.push_str(line);
        out.push('\n');
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) if s.is_empty() => "<empty>".to_string(),
        Value::String(s) => s.clone(),
        Value::Null => "<none>".to_string(),
        other => other.to_string(),
    }
}

fn title_case(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

//! Deserialization of schema and heading-baseline JSON into typed structs.
//!
//! The schema document is the only input the engine refuses outright: a
//! document without a `fields` array, or with a field lacking an id, cannot
//! anchor any rule. Everything below the field level is parsed leniently.

use std::collections::HashSet;

use crate::types::*;

/// Errors during schema deserialization.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InterchangeError {
    /// The document is missing a required top-level member.
    #[error("schema missing required field: '{field}'")]
    MissingField { field: String },
    /// A field entry could not be used.
    #[error("field #{index}: {message}")]
    InvalidField { index: usize, message: String },
    /// Two fields share the same id.
    #[error("duplicate field id '{id}'")]
    DuplicateField { id: String },
}

impl FormSchema {
    /// Deserialize a form schema from the schema provider's JSON.
    pub fn from_json(doc: &serde_json::Value) -> Result<FormSchema, InterchangeError> {
        parse_form_schema(doc)
    }
}

/// Deserialize a form schema document.
///
/// Accepts either `{title, fields: [...]}` or a bare array of fields.
pub fn parse_form_schema(doc: &serde_json::Value) -> Result<FormSchema, InterchangeError> {
    let (title, fields_arr) = match doc {
        serde_json::Value::Array(arr) => (String::new(), arr),
        _ => {
            let arr = doc
                .get("fields")
                .and_then(|f| f.as_array())
                .ok_or_else(|| InterchangeError::MissingField {
                    field: "fields".to_string(),
                })?;
            let title = doc
                .get("title")
                .and_then(|t| t.as_str())
                .unwrap_or("")
                .to_string();
            (title, arr)
        }
    };

    let mut seen = HashSet::new();
    let mut fields = Vec::with_capacity(fields_arr.len());
    for (index, obj) in fields_arr.iter().enumerate() {
        let field = parse_field(index, obj)?;
        if !seen.insert(field.id.clone()) {
            return Err(InterchangeError::DuplicateField { id: field.id });
        }
        fields.push(field);
    }

    Ok(FormSchema { title, fields })
}

fn parse_field(index: usize, obj: &serde_json::Value) -> Result<FieldSchema, InterchangeError> {
    let id = obj
        .get("id")
        .and_then(scalar_to_string)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| InterchangeError::InvalidField {
            index,
            message: "missing 'id'".to_string(),
        })?;

    let label = obj
        .get("label")
        .or_else(|| obj.get("name"))
        .and_then(|l| l.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| id.clone());

    let field_type = obj
        .get("type")
        .and_then(|t| t.as_str())
        .map(FieldType::parse)
        .unwrap_or(FieldType::Text);

    let mut options = Vec::new();
    let mut groups = Vec::new();
    if let Some(arr) = obj.get("options").and_then(|o| o.as_array()) {
        for entry in arr {
            // A nested `options` array inside an option entry is a group.
            if let Some(group) = parse_group(entry) {
                groups.push(group);
            } else if let Some(opt) = parse_option(entry) {
                options.push(opt);
            }
        }
    }
    for key in ["groups", "optionGroups"] {
        if let Some(arr) = obj.get(key).and_then(|g| g.as_array()) {
            groups.extend(arr.iter().filter_map(parse_group));
        }
    }

    Ok(FieldSchema {
        id,
        label,
        field_type,
        options,
        groups,
    })
}

fn parse_group(entry: &serde_json::Value) -> Option<OptionGroup> {
    let arr = entry.get("options")?.as_array()?;
    let label = entry
        .get("label")
        .and_then(|l| l.as_str())
        .unwrap_or("")
        .to_string();
    Some(OptionGroup {
        label,
        options: arr.iter().filter_map(parse_option).collect(),
    })
}

/// Parse an option entry: an object with `value`/`label`, or a bare scalar
/// used as both.
fn parse_option(entry: &serde_json::Value) -> Option<FieldOption> {
    if entry.is_object() {
        let value = entry.get("value").and_then(scalar_to_string);
        let label = entry.get("label").and_then(scalar_to_string);
        return match (value, label) {
            (Some(value), Some(label)) => Some(FieldOption { value, label }),
            (Some(value), None) => Some(FieldOption {
                label: value.clone(),
                value,
            }),
            (None, Some(label)) => Some(FieldOption {
                value: label.clone(),
                label,
            }),
            (None, None) => None,
        };
    }
    let value = scalar_to_string(entry)?;
    Some(FieldOption {
        label: value.clone(),
        value,
    })
}

/// Parse the heading baseline supplied by the document-structure parser.
///
/// Accepts a bare array or an object wrapping one under `headings`,
/// `sections` or `items`. Non-object entries become empty records so that
/// array positions stay aligned with the input.
pub fn parse_heading_records(doc: &serde_json::Value) -> Vec<HeadingRecord> {
    let arr = match doc {
        serde_json::Value::Array(arr) => arr,
        _ => match ["headings", "sections", "items"]
            .iter()
            .find_map(|k| doc.get(*k).and_then(|v| v.as_array()))
        {
            Some(arr) => arr,
            None => return Vec::new(),
        },
    };
    arr.iter().map(parse_heading_record).collect()
}

fn parse_heading_record(obj: &serde_json::Value) -> HeadingRecord {
    let text = |key: &str| {
        obj.get(key)
            .and_then(scalar_to_string)
            .filter(|s| !s.is_empty())
    };
    HeadingRecord {
        id: text("id"),
        uid: text("uid"),
        key: text("key"),
        idx: obj.get("idx").and_then(stable_index),
        label: text("label").or_else(|| text("text")).or_else(|| text("title")),
        number: text("number"),
        level: obj
            .get("level")
            .and_then(|l| l.as_u64())
            .and_then(|l| u32::try_from(l).ok()),
    }
}

// ── Shared helpers ──────────────────────────────────────────────────

/// Read a JSON number as a stable heading index. Only finite integral
/// numbers qualify; strings never do.
pub fn stable_index(v: &serde_json::Value) -> Option<i64> {
    if let Some(i) = v.as_i64() {
        return Some(i);
    }
    let f = v.as_f64()?;
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

/// Stringify a JSON scalar. Objects, arrays and null yield `None`.
pub fn scalar_to_string(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

//! Value bag sanitization.
//!
//! For each declared field present in the raw bag, exactly one coercion
//! rule applies, chosen by the field's declared type. Values that cannot be
//! coerced are dropped; nothing here fails. Keys the schema does not
//! declare are passed through unchanged.

use std::collections::HashSet;

use rust_decimal::Decimal;

use formvis_interchange::{scalar_to_string, FieldSchema, FieldType, FormSchema};

use crate::value::{parse_calendar_date, parse_decimal, parse_number, FieldValue, ValueBag};

/// Sanitize a raw value bag against a schema.
///
/// A non-object `raw` is treated as an empty bag.
pub fn sanitize_values(schema: &FormSchema, raw: &serde_json::Value) -> ValueBag {
    let mut bag = ValueBag::new();
    let Some(raw_obj) = raw.as_object() else {
        return bag;
    };

    let mut declared = HashSet::with_capacity(schema.fields.len());
    for field in &schema.fields {
        declared.insert(field.id.as_str());
        if let Some(raw_val) = raw_obj.get(&field.id) {
            if let Some(value) = sanitize_field(field, raw_val) {
                bag.insert(field.id.clone(), value);
            }
        }
    }

    for (key, raw_val) in raw_obj {
        if !declared.contains(key.as_str()) {
            bag.insert(key.clone(), FieldValue::Raw(raw_val.clone()));
        }
    }

    bag
}

/// Apply the coercion rule for one declared field. `None` means "drop".
pub fn sanitize_field(field: &FieldSchema, raw: &serde_json::Value) -> Option<FieldValue> {
    match field.field_type {
        FieldType::Number => parse_number(raw).map(FieldValue::Number),
        FieldType::Switch | FieldType::Checkbox | FieldType::Boolean => {
            Some(FieldValue::Bool(is_truthy_flag(raw)))
        }
        FieldType::Date => parse_calendar_date(raw).map(FieldValue::Date),
        FieldType::Multichoice => Some(FieldValue::Choices(coerce_choices(raw))),
        FieldType::Select => scalar_to_string(raw)
            .filter(|s| !s.is_empty())
            .map(FieldValue::Text),
        FieldType::Address => sanitize_address(raw),
        FieldType::Datediff => sanitize_datediff(raw),
        FieldType::Text | FieldType::Table => stringify(raw)
            .filter(|s| !s.is_empty())
            .map(FieldValue::Text),
    }
}

/// `true`, `"true"`, `1` and `"1"` are on; everything else is off.
fn is_truthy_flag(raw: &serde_json::Value) -> bool {
    match raw {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::String(s) => s == "true" || s == "1",
        serde_json::Value::Number(n) => n.as_f64() == Some(1.0),
        _ => false,
    }
}

/// Coerce to a deduplicated list of non-empty strings, preserving first
/// occurrence order. Scalars are wrapped; null yields an empty list.
fn coerce_choices(raw: &serde_json::Value) -> Vec<String> {
    let candidates: Vec<String> = match raw {
        serde_json::Value::Array(arr) => arr.iter().filter_map(scalar_to_string).collect(),
        other => scalar_to_string(other).into_iter().collect(),
    };
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|s| !s.is_empty() && seen.insert(s.clone()))
        .collect()
}

fn sanitize_address(raw: &serde_json::Value) -> Option<FieldValue> {
    match raw {
        serde_json::Value::Object(map) => Some(FieldValue::Address(map.clone())),
        serde_json::Value::String(s) if !s.trim().is_empty() => {
            let mut map = serde_json::Map::new();
            map.insert(
                "formatted".to_string(),
                serde_json::Value::String(s.trim().to_string()),
            );
            Some(FieldValue::Address(map))
        }
        _ => None,
    }
}

fn sanitize_datediff(raw: &serde_json::Value) -> Option<FieldValue> {
    let obj = raw.as_object()?;
    let formatted = obj
        .get("formatted")
        .and_then(|f| f.as_str())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())?
        .to_string();
    let number = |key: &str| obj.get(key).and_then(parse_decimal).unwrap_or(Decimal::ZERO);
    Some(FieldValue::DateDiff {
        formatted,
        days: number("days"),
        months: number("months"),
        years: number("years"),
    })
}

/// Stringify for free-text fields. Compound values keep their JSON text.
fn stringify(raw: &serde_json::Value) -> Option<String> {
    match raw {
        serde_json::Value::Null => None,
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => Some(raw.to_string()),
        scalar => scalar_to_string(scalar),
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

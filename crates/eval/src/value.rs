//! Sanitized field values and the loose coercions shared by the sanitizer
//! and the matcher.
//!
//! Numbers are `rust_decimal::Decimal` whenever it can hold them, with an
//! `f64` fallback for finite values beyond its range. Dates are plain
//! `time::Date` calendar days.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

use formvis_interchange::scalar_to_string;

// ──────────────────────────────────────────────
// Numbers
// ──────────────────────────────────────────────

/// A coerced number.
///
/// `Float` only ever holds a finite value that `Decimal` cannot represent
/// (magnitudes past about 7.9e28, or more than 28 fractional digits).
#[derive(Debug, Clone, Copy)]
pub enum Numeric {
    Exact(Decimal),
    Float(f64),
}

impl Numeric {
    /// Wrap a float, rejecting NaN and infinities.
    pub fn float(f: f64) -> Option<Numeric> {
        f.is_finite().then_some(Numeric::Float(f))
    }

    pub fn to_f64(&self) -> f64 {
        match self {
            Numeric::Exact(d) => d.to_f64().unwrap_or(f64::NAN),
            Numeric::Float(f) => *f,
        }
    }

    /// Exact comparison between decimals; anything involving a float
    /// compares as `f64`.
    pub fn compare(&self, other: &Numeric) -> Option<Ordering> {
        match (self, other) {
            (Numeric::Exact(a), Numeric::Exact(b)) => Some(a.cmp(b)),
            _ => self.to_f64().partial_cmp(&other.to_f64()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Numeric::Exact(d) => decimal_to_json(*d),
            Numeric::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
        }
    }
}

impl From<Decimal> for Numeric {
    fn from(d: Decimal) -> Self {
        Numeric::Exact(d)
    }
}

impl PartialEq for Numeric {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }
}

// floats are finite, so equality is reflexive
impl Eq for Numeric {}

impl std::fmt::Display for Numeric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Numeric::Exact(d) => write!(f, "{}", d.normalize()),
            Numeric::Float(x) => write!(f, "{}", x),
        }
    }
}

// ──────────────────────────────────────────────
// Field values
// ──────────────────────────────────────────────

/// A canonical per-field value produced by the sanitizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Number(Numeric),
    Bool(bool),
    Date(Date),
    Text(String),
    /// Deduplicated option values of a multichoice field.
    Choices(Vec<String>),
    Address(serde_json::Map<String, serde_json::Value>),
    DateDiff {
        formatted: String,
        days: Decimal,
        months: Decimal,
        years: Decimal,
    },
    /// Values for keys the schema does not declare, passed through as-is.
    Raw(serde_json::Value),
}

impl FieldValue {
    /// Returns a human-readable type name for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Number(_) => "number",
            FieldValue::Bool(_) => "boolean",
            FieldValue::Date(_) => "date",
            FieldValue::Text(_) => "text",
            FieldValue::Choices(_) => "choices",
            FieldValue::Address(_) => "address",
            FieldValue::DateDiff { .. } => "datediff",
            FieldValue::Raw(_) => "raw",
        }
    }

    /// Null, `""` and empty sequences are empty; nothing else is.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.is_empty(),
            FieldValue::Choices(items) => items.is_empty(),
            FieldValue::Raw(v) => json_is_empty(v),
            _ => false,
        }
    }

    /// The value as a single comparable string, if it has one.
    pub fn as_text(&self) -> Option<String> {
        match self {
            FieldValue::Number(n) => Some(n.to_string()),
            FieldValue::Bool(b) => Some(b.to_string()),
            FieldValue::Date(d) => Some(format_date(*d)),
            FieldValue::Text(s) => Some(s.clone()),
            FieldValue::Choices(_) => None,
            FieldValue::Address(map) => map
                .get("formatted")
                .and_then(|f| f.as_str())
                .map(|s| s.to_string()),
            FieldValue::DateDiff { formatted, .. } => Some(formatted.clone()),
            FieldValue::Raw(v) => scalar_to_string(v),
        }
    }

    /// The value as a list of strings: sequences yield their items, scalars
    /// a single-element list, empty values an empty list.
    pub fn items(&self) -> Vec<String> {
        match self {
            FieldValue::Choices(items) => items.clone(),
            FieldValue::Raw(serde_json::Value::Array(arr)) => {
                arr.iter().filter_map(scalar_to_string).collect()
            }
            other => other
                .as_text()
                .filter(|s| !s.is_empty())
                .into_iter()
                .collect(),
        }
    }

    /// True for sequence-shaped values.
    pub fn is_sequence(&self) -> bool {
        matches!(
            self,
            FieldValue::Choices(_) | FieldValue::Raw(serde_json::Value::Array(_))
        )
    }

    pub fn as_number(&self) -> Option<Numeric> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Bool(_) | FieldValue::Choices(_) | FieldValue::Address(_) => None,
            FieldValue::Date(_) => None,
            FieldValue::DateDiff { days, .. } => Some(Numeric::Exact(*days)),
            FieldValue::Text(s) => parse_number_str(s),
            FieldValue::Raw(v) => parse_number(v),
        }
    }

    /// Serialize to the JSON shape consumers of the sanitized bag expect.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Number(n) => n.to_json(),
            FieldValue::Bool(b) => serde_json::Value::Bool(*b),
            FieldValue::Date(d) => serde_json::Value::String(format_date(*d)),
            FieldValue::Text(s) => serde_json::Value::String(s.clone()),
            FieldValue::Choices(items) => serde_json::json!(items),
            FieldValue::Address(map) => serde_json::Value::Object(map.clone()),
            FieldValue::DateDiff {
                formatted,
                days,
                months,
                years,
            } => serde_json::json!({
                "formatted": formatted,
                "days": decimal_to_json(*days),
                "months": decimal_to_json(*months),
                "years": decimal_to_json(*years),
            }),
            FieldValue::Raw(v) => v.clone(),
        }
    }
}

/// Sanitized values keyed by field id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueBag(pub BTreeMap<String, FieldValue>);

impl ValueBag {
    pub fn new() -> Self {
        ValueBag(BTreeMap::new())
    }

    pub fn get(&self, id: &str) -> Option<&FieldValue> {
        self.0.get(id)
    }

    pub fn insert(&mut self, id: String, value: FieldValue) {
        self.0.insert(id, value);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

// ──────────────────────────────────────────────
// Loose coercions
// ──────────────────────────────────────────────

/// Null, `""` (after trimming) and empty arrays are empty.
pub fn json_is_empty(v: &serde_json::Value) -> bool {
    match v {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.trim().is_empty(),
        serde_json::Value::Array(arr) => arr.is_empty(),
        _ => false,
    }
}

/// Numeric coercion of a JSON value. Booleans, objects and arrays are not
/// numbers. Finite values past `Decimal`'s range come back as
/// [`Numeric::Float`].
pub fn parse_number(v: &serde_json::Value) -> Option<Numeric> {
    match v {
        serde_json::Value::Number(n) => parse_decimal_str(&n.to_string())
            .map(Numeric::Exact)
            .or_else(|| n.as_f64().and_then(Numeric::float)),
        serde_json::Value::String(s) => parse_number_str(s),
        _ => None,
    }
}

pub fn parse_number_str(s: &str) -> Option<Numeric> {
    if let Some(d) = parse_decimal_str(s) {
        return Some(Numeric::Exact(d));
    }
    let trimmed = s.trim();
    // f64 parsing also accepts "inf" and "nan"; only digits qualify here
    if !trimmed.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    trimmed.parse::<f64>().ok().and_then(Numeric::float)
}

/// Decimal-only coercion, for members that are always small amounts.
pub fn parse_decimal(v: &serde_json::Value) -> Option<Decimal> {
    match v {
        serde_json::Value::Number(n) => parse_decimal_str(&n.to_string()),
        serde_json::Value::String(s) => parse_decimal_str(s),
        _ => None,
    }
}

pub fn parse_decimal_str(s: &str) -> Option<Decimal> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .ok()
}

fn decimal_to_json(d: Decimal) -> serde_json::Value {
    let normalized = d.normalize();
    if normalized.scale() == 0 {
        if let Ok(i) = i64::try_from(normalized) {
            return serde_json::Value::from(i);
        }
    }
    serde_json::Number::from_str(&normalized.to_string())
        .map(serde_json::Value::Number)
        .unwrap_or_else(|_| serde_json::Value::String(normalized.to_string()))
}

/// Parse a JSON value to a calendar day.
///
/// Accepts `YYYY-MM-DD`, RFC 3339 date-times (converted to UTC), a
/// `YYYY-MM-DD` prefix of any longer string, `DD/MM/YYYY`, and epoch
/// milliseconds.
pub fn parse_calendar_date(v: &serde_json::Value) -> Option<Date> {
    match v {
        serde_json::Value::String(s) => parse_calendar_str(s),
        serde_json::Value::Number(n) => {
            let millis = n.as_i64()?;
            let nanos = i128::from(millis) * 1_000_000;
            OffsetDateTime::from_unix_timestamp_nanos(nanos)
                .ok()
                .map(|dt| dt.date())
        }
        _ => None,
    }
}

fn parse_calendar_str(s: &str) -> Option<Date> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = OffsetDateTime::parse(trimmed, &Rfc3339) {
        return Some(dt.to_offset(time::UtcOffset::UTC).date());
    }
    if let Some(prefix) = trimmed.get(..10) {
        if let Ok(d) = Date::parse(prefix, &format_description!("[year]-[month]-[day]")) {
            return Some(d);
        }
    }
    Date::parse(trimmed, &format_description!("[day]/[month]/[year]")).ok()
}

/// Format a calendar day as `YYYY-MM-DD`.
pub fn format_date(d: Date) -> String {
    format!("{:04}-{:02}-{:02}", d.year(), u8::from(d.month()), d.day())
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

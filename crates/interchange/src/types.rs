//! Typed structs for the inputs handed to the engine by its collaborators.
//!
//! The schema provider supplies a [`FormSchema`]; the heading-baseline
//! provider supplies a flat list of [`HeadingRecord`]s. Both are parsed
//! leniently from `serde_json::Value` by the functions in
//! [`crate::deserialize`].

use serde::{Deserialize, Serialize};

// ── Field types ─────────────────────────────────────────────────────

/// Declared input type of a form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Number,
    Date,
    Datediff,
    Select,
    Multichoice,
    Switch,
    Checkbox,
    Boolean,
    Address,
    Table,
}

impl FieldType {
    /// Parse a declared type name. Matching is case-insensitive and accepts
    /// the aliases older schema producers emitted. Unknown names fall back
    /// to `Text`, which sanitizes and compares values as plain strings.
    pub fn parse(raw: &str) -> FieldType {
        let lowered = raw.trim().to_ascii_lowercase();
        match lowered.as_str() {
            "number" | "numeric" | "integer" | "currency" => FieldType::Number,
            "date" => FieldType::Date,
            "datediff" | "date_diff" | "duration" => FieldType::Datediff,
            "select" | "dropdown" | "radio" => FieldType::Select,
            "multichoice" | "multi_choice" | "multiselect" | "multi" => FieldType::Multichoice,
            "switch" | "toggle" => FieldType::Switch,
            "checkbox" => FieldType::Checkbox,
            "boolean" | "bool" => FieldType::Boolean,
            "address" => FieldType::Address,
            "table" => FieldType::Table,
            _ => FieldType::Text,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Number => "number",
            FieldType::Date => "date",
            FieldType::Datediff => "datediff",
            FieldType::Select => "select",
            FieldType::Multichoice => "multichoice",
            FieldType::Switch => "switch",
            FieldType::Checkbox => "checkbox",
            FieldType::Boolean => "boolean",
            FieldType::Address => "address",
            FieldType::Table => "table",
        }
    }

    /// True for the types whose value is one or more option values.
    pub fn is_choice(&self) -> bool {
        matches!(self, FieldType::Select | FieldType::Multichoice)
    }

    /// True for the types sanitized to a plain boolean.
    pub fn is_flag(&self) -> bool {
        matches!(
            self,
            FieldType::Switch | FieldType::Checkbox | FieldType::Boolean
        )
    }
}

// ── Schema ──────────────────────────────────────────────────────────

/// One selectable option of a select/multichoice field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOption {
    pub value: String,
    pub label: String,
}

/// A labelled group of options, used by grouped multichoice fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionGroup {
    pub label: String,
    pub options: Vec<FieldOption>,
}

/// A single form field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<FieldOption>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<OptionGroup>,
}

impl FieldSchema {
    /// Every option of the field: the flat list first, then each group's
    /// options in group order.
    pub fn all_options(&self) -> impl Iterator<Item = &FieldOption> {
        self.options
            .iter()
            .chain(self.groups.iter().flat_map(|g| g.options.iter()))
    }

    pub fn has_options(&self) -> bool {
        self.all_options().next().is_some()
    }
}

/// The form bound to a document template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormSchema {
    #[serde(default)]
    pub title: String,
    pub fields: Vec<FieldSchema>,
}

impl FormSchema {
    /// Linear lookup by exact id. Hot paths build a `SchemaIndex` instead.
    pub fn field(&self, id: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.id == id)
    }
}

// ── Heading baseline ────────────────────────────────────────────────

/// A heading/section record as produced by the document-structure parser.
///
/// Every member is optional because older parses omitted some of them; the
/// baseline index in the evaluator decides how missing members are filled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadingRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Stable index assigned by the upstream parse. Sparse, never an
    /// array position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idx: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Document numbering such as "2.1".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
}

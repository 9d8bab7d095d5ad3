//! Raw and canonical rule representations.
//!
//! Rule records arrive in several historical shapes. [`RawRule::parse`]
//! reads every alias exactly once and yields a typed record (or a
//! [`RuleParseError`]); normalization then resolves its references against
//! the schema to produce a [`CanonicalRule`].

use serde::{Deserialize, Serialize};

use formvis_interchange::{scalar_to_string, FieldSchema};

use crate::error::RuleParseError;
use crate::heading::HeadingTarget;

// ──────────────────────────────────────────────
// Vocabulary
// ──────────────────────────────────────────────

/// What a matching rule does to its targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Show,
    Hide,
}

impl Action {
    /// Case-insensitive `show`/`hide`.
    pub fn parse(raw: &str) -> Option<Action> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "show" => Some(Action::Show),
            "hide" => Some(Action::Hide),
            _ => None,
        }
    }
}

/// How a field-domain HIDE is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HideMode {
    Hide,
    Disable,
}

impl HideMode {
    pub fn parse(raw: &str) -> Option<HideMode> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "hide" | "hidden" => Some(HideMode::Hide),
            "disable" | "disabled" => Some(HideMode::Disable),
            _ => None,
        }
    }
}

/// Comparison operator of a rule or condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    Equals,
    NotEquals,
    AnyOf,
    AllOf,
    Contains,
    IsEmpty,
    IsNotEmpty,
    Gt,
    Lt,
    Gte,
    Lte,
}

impl Operator {
    /// Parse an operator name, accepting the symbolic and snake_case
    /// spellings older producers used.
    pub fn parse(raw: &str) -> Option<Operator> {
        let op = match raw.trim() {
            "equals" | "eq" | "=" | "==" | "===" | "is" => Operator::Equals,
            "notEquals" | "not_equals" | "neq" | "ne" | "!=" | "!==" | "isNot" => {
                Operator::NotEquals
            }
            "anyOf" | "any_of" | "in" | "oneOf" | "includesAny" => Operator::AnyOf,
            "allOf" | "all_of" | "includesAll" => Operator::AllOf,
            "contains" | "includes" => Operator::Contains,
            "isEmpty" | "is_empty" | "empty" => Operator::IsEmpty,
            "isNotEmpty" | "is_not_empty" | "notEmpty" | "filled" => Operator::IsNotEmpty,
            "gt" | ">" => Operator::Gt,
            "lt" | "<" => Operator::Lt,
            "gte" | ">=" => Operator::Gte,
            "lte" | "<=" => Operator::Lte,
            _ => return None,
        };
        Some(op)
    }

    /// Operators that compare magnitudes.
    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            Operator::Gt | Operator::Lt | Operator::Gte | Operator::Lte
        )
    }
}

/// The value(s) a rule compares against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expected {
    Many(Vec<serde_json::Value>),
    One(serde_json::Value),
}

impl Expected {
    /// Wrap an optional raw member. Arrays become `Many`, anything else
    /// (including absence, as null) becomes `One`.
    pub fn from_raw(raw: Option<&serde_json::Value>) -> Expected {
        match raw {
            Some(serde_json::Value::Array(arr)) => Expected::Many(arr.clone()),
            Some(v) => Expected::One(v.clone()),
            None => Expected::One(serde_json::Value::Null),
        }
    }

    /// Coerce to a sequence; null becomes the empty sequence.
    pub fn into_many(self) -> Expected {
        match self {
            Expected::Many(items) => Expected::Many(items),
            Expected::One(serde_json::Value::Null) => Expected::Many(Vec::new()),
            Expected::One(v) => Expected::Many(vec![v]),
        }
    }

    /// Every expected item, flattened. Null contributes nothing.
    pub fn items(&self) -> Vec<&serde_json::Value> {
        match self {
            Expected::Many(items) => items.iter().filter(|v| !v.is_null()).collect(),
            Expected::One(serde_json::Value::Null) => Vec::new(),
            Expected::One(v) => vec![v],
        }
    }

    pub fn first(&self) -> Option<&serde_json::Value> {
        self.items().into_iter().next()
    }
}

// ──────────────────────────────────────────────
// Canonical rules
// ──────────────────────────────────────────────

/// The option a trigger was written against.
///
/// With a `value`, the rule's operator and expected value already compare
/// the field against that option value, and the selector only adds a
/// slug-equality fallback. Without one, the trigger reads as a boolean
/// "is this option selected".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionSelector {
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// A resolved trigger. `field_id` always names a schema field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    pub field_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option: Option<OptionSelector>,
}

impl Trigger {
    pub fn field(field_id: impl Into<String>) -> Trigger {
        Trigger {
            field_id: field_id.into(),
            option: None,
        }
    }
}

/// An AND-combined extra condition of a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalCondition {
    pub trigger: Trigger,
    pub op: Operator,
    pub expected: Expected,
}

/// A rule after trigger and target resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalRule<T> {
    pub action: Action,
    pub trigger: Trigger,
    pub op: Operator,
    pub expected: Expected,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<CanonicalCondition>,
    /// Never empty.
    pub targets: Vec<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hide_mode: Option<HideMode>,
    /// The option composite the trigger was rewritten from, kept for
    /// diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,
    /// Conditions dropped because their reference did not resolve.
    #[serde(default)]
    pub dropped_conditions: usize,
}

impl<T> CanonicalRule<T> {
    pub fn field_id(&self) -> &str {
        &self.trigger.field_id
    }
}

pub type HeadingRule = CanonicalRule<HeadingTarget>;
pub type FieldRule = CanonicalRule<FieldTarget>;

/// A target type a canonical rule can carry.
pub trait RuleTarget: Sized {
    /// The default target used when none of a rule's targets resolve.
    fn from_trigger(field: &FieldSchema) -> Self;
}

/// A field or option a field-domain rule acts on. `id` is either the field
/// id or `<fieldId>__opt__<slug>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldTarget {
    pub id: String,
    pub field_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option_label: Option<String>,
    pub label: String,
}

impl RuleTarget for FieldTarget {
    fn from_trigger(field: &FieldSchema) -> Self {
        FieldTarget {
            id: field.id.clone(),
            field_id: field.id.clone(),
            option_value: None,
            option_label: None,
            label: field.label.clone(),
        }
    }
}

// ──────────────────────────────────────────────
// Raw rules
// ──────────────────────────────────────────────

/// An unresolved trigger reference as written by the producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawTrigger {
    /// A loose string: id, label, `label:option`, option label/value or
    /// option composite.
    Ref(String),
    /// An object naming an option by value and/or label.
    Option {
        field: Option<String>,
        value: Option<String>,
        label: Option<String>,
    },
}

impl RawTrigger {
    /// Text used in diagnostics.
    pub fn describe(&self) -> String {
        match self {
            RawTrigger::Ref(s) => s.clone(),
            RawTrigger::Option {
                field,
                value,
                label,
            } => format!(
                "{}[{}]",
                field.as_deref().unwrap_or("?"),
                value.as_deref().or(label.as_deref()).unwrap_or("?")
            ),
        }
    }

    fn parse(obj: &serde_json::Map<String, serde_json::Value>) -> Option<RawTrigger> {
        let reference = ["fieldId", "field", "whenField"]
            .iter()
            .find_map(|k| obj.get(*k).filter(|v| !v.is_null()));
        let option_value = obj.get("optionValue").and_then(scalar_to_string);
        let option_label = obj.get("optionLabel").and_then(scalar_to_string);
        let names_option = option_value.is_some() || option_label.is_some();

        match reference {
            Some(serde_json::Value::Object(inner)) => {
                let field = ["fieldId", "field", "id"]
                    .iter()
                    .find_map(|k| inner.get(*k).and_then(scalar_to_string));
                let value = inner.get("optionValue").and_then(scalar_to_string);
                let label = inner.get("optionLabel").and_then(scalar_to_string);
                if value.is_some() || label.is_some() {
                    Some(RawTrigger::Option {
                        field,
                        value,
                        label,
                    })
                } else {
                    field.map(RawTrigger::Ref)
                }
            }
            Some(v) => {
                let s = scalar_to_string(v)?;
                if names_option {
                    Some(RawTrigger::Option {
                        field: Some(s),
                        value: option_value,
                        label: option_label,
                    })
                } else {
                    Some(RawTrigger::Ref(s))
                }
            }
            None if names_option => Some(RawTrigger::Option {
                field: None,
                value: option_value,
                label: option_label,
            }),
            None => None,
        }
    }
}

/// An AND-condition as written by the producer.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCondition {
    pub trigger: RawTrigger,
    pub op: Operator,
    pub expected: Option<serde_json::Value>,
}

impl RawCondition {
    fn parse(v: &serde_json::Value) -> Option<RawCondition> {
        let obj = v.as_object()?;
        let trigger = RawTrigger::parse(obj)?;
        let op = parse_op(obj).ok()?;
        Some(RawCondition {
            trigger,
            op,
            expected: parse_expected(obj),
        })
    }
}

/// A rule record with every historical alias read into one place.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRule {
    pub action: Action,
    pub trigger: RawTrigger,
    pub op: Operator,
    pub expected: Option<serde_json::Value>,
    pub targets: Vec<serde_json::Value>,
    pub conditions: Vec<RawCondition>,
    /// Condition entries that could not be parsed at all.
    pub malformed_conditions: usize,
    pub hide_mode: Option<HideMode>,
}

impl RawRule {
    /// Parse a raw rule record.
    pub fn parse(v: &serde_json::Value) -> Result<RawRule, RuleParseError> {
        let obj = v.as_object().ok_or(RuleParseError::NotAnObject)?;

        let action_raw = obj
            .get("action")
            .and_then(|a| a.as_str())
            .ok_or(RuleParseError::MissingAction)?;
        let action = Action::parse(action_raw).ok_or_else(|| RuleParseError::UnknownAction {
            action: action_raw.to_string(),
        })?;

        let trigger = RawTrigger::parse(obj).ok_or(RuleParseError::MissingTrigger)?;
        let op = parse_op(obj)?;

        let targets = match obj.get("targets") {
            Some(serde_json::Value::Array(arr)) => arr.clone(),
            Some(serde_json::Value::Null) | None => Vec::new(),
            Some(single) => vec![single.clone()],
        };

        let mut conditions = Vec::new();
        let mut malformed_conditions = 0;
        if let Some(arr) = obj.get("conditions").and_then(|c| c.as_array()) {
            for entry in arr {
                match RawCondition::parse(entry) {
                    Some(cond) => conditions.push(cond),
                    None => malformed_conditions += 1,
                }
            }
        }

        let hide_mode = obj
            .get("hideMode")
            .and_then(|m| m.as_str())
            .and_then(HideMode::parse)
            .or_else(|| match obj.get("disable").and_then(|d| d.as_bool()) {
                Some(true) => Some(HideMode::Disable),
                _ => None,
            });

        Ok(RawRule {
            action,
            trigger,
            op,
            expected: parse_expected(obj),
            targets,
            conditions,
            malformed_conditions,
            hide_mode,
        })
    }
}

fn parse_op(obj: &serde_json::Map<String, serde_json::Value>) -> Result<Operator, RuleParseError> {
    match obj
        .get("op")
        .or_else(|| obj.get("operator"))
        .and_then(|o| o.as_str())
    {
        None => Ok(Operator::Equals),
        Some(raw) => Operator::parse(raw).ok_or_else(|| RuleParseError::UnknownOperator {
            op: raw.to_string(),
        }),
    }
}

fn parse_expected(obj: &serde_json::Map<String, serde_json::Value>) -> Option<serde_json::Value> {
    ["values", "value", "expected"]
        .iter()
        .find_map(|k| obj.get(*k).filter(|v| !v.is_null()))
        .cloned()
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

//! Rule normalization.
//!
//! Turns aggregated raw records into canonical rules: the trigger is
//! resolved against the schema (and rewritten when it names an option),
//! unresolvable AND-conditions are dropped, and targets are resolved per
//! domain. A rule never leaves here without a trigger field or without a
//! target.

use serde::{Serialize, Serializer};

use formvis_interchange::{scalar_to_string, FieldSchema, FormSchema};

use crate::error::RuleParseError;
use crate::heading::{HeadingBaseline, HeadingTarget};
use crate::resolve::{find_option, rewrite_option_trigger, OptionRef, RefKind, SchemaIndex};
use crate::rule::{
    CanonicalCondition, CanonicalRule, Expected, FieldTarget, Operator, OptionSelector,
    RawCondition, RawRule, RawTrigger, RuleTarget, Trigger,
};
use crate::slug::{is_option_ref, split_option_ref};

/// A raw record that did not become a canonical rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    /// Position in the input list.
    pub position: usize,
    #[serde(serialize_with = "serialize_display")]
    pub reason: RuleParseError,
}

fn serialize_display<S: Serializer>(err: &RuleParseError, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(err)
}

/// Canonical rules plus the records that were rejected on the way.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizeOutcome<T> {
    pub rules: Vec<CanonicalRule<T>>,
    pub rejected: Vec<Rejection>,
}

impl<T> Default for NormalizeOutcome<T> {
    fn default() -> Self {
        NormalizeOutcome {
            rules: Vec::new(),
            rejected: Vec::new(),
        }
    }
}

/// Normalize heading-domain rules.
///
/// With no baseline (or an empty one) targets are kept as written and only
/// nulls are dropped.
pub fn normalize_heading_rules(
    schema: &FormSchema,
    baseline: Option<&HeadingBaseline>,
    raw: &[serde_json::Value],
) -> NormalizeOutcome<HeadingTarget> {
    let normalizer = Normalizer::new(schema);
    let baseline = baseline.filter(|b| !b.is_empty());
    normalizer.run(raw, |_, targets| match baseline {
        Some(b) => targets.iter().filter_map(|t| b.normalize_target(t)).collect(),
        None => targets
            .iter()
            .filter(|t| !t.is_null())
            .map(HeadingTarget::from_raw)
            .collect(),
    })
}

/// Normalize field-domain rules.
pub fn normalize_field_rules(
    schema: &FormSchema,
    raw: &[serde_json::Value],
) -> NormalizeOutcome<FieldTarget> {
    let normalizer = Normalizer::new(schema);
    normalizer.run(raw, |trigger_field, targets| {
        targets
            .iter()
            .filter_map(|t| normalizer.field_target(t, trigger_field))
            .collect()
    })
}

// ──────────────────────────────────────────────
// Normalizer
// ──────────────────────────────────────────────

/// A trigger after resolution and option rewriting.
struct ResolvedTrigger<'a> {
    field: &'a FieldSchema,
    trigger: Trigger,
    op: Operator,
    expected: Expected,
    source_ref: Option<String>,
}

struct Normalizer<'a> {
    index: SchemaIndex<'a>,
}

impl<'a> Normalizer<'a> {
    fn new(schema: &'a FormSchema) -> Self {
        Normalizer {
            index: SchemaIndex::new(schema),
        }
    }

    fn run<T, F>(&self, raw: &[serde_json::Value], resolve_targets: F) -> NormalizeOutcome<T>
    where
        T: RuleTarget,
        F: Fn(&'a FieldSchema, &[serde_json::Value]) -> Vec<T>,
    {
        let mut outcome = NormalizeOutcome::default();
        for (position, record) in raw.iter().enumerate() {
            match self.normalize_one(record, &resolve_targets) {
                Ok(rule) => outcome.rules.push(rule),
                Err(reason) => {
                    tracing::debug!(position, %reason, "rule dropped");
                    outcome.rejected.push(Rejection { position, reason });
                }
            }
        }
        outcome
    }

    fn normalize_one<T, F>(
        &self,
        record: &serde_json::Value,
        resolve_targets: &F,
    ) -> Result<CanonicalRule<T>, RuleParseError>
    where
        T: RuleTarget,
        F: Fn(&'a FieldSchema, &[serde_json::Value]) -> Vec<T>,
    {
        let raw = RawRule::parse(record)?;
        let resolved = self
            .resolve_trigger(&raw.trigger, raw.op, raw.expected.as_ref())
            .ok_or_else(|| RuleParseError::UnresolvedTrigger {
                reference: raw.trigger.describe(),
            })?;

        let mut conditions = Vec::with_capacity(raw.conditions.len());
        let mut dropped = raw.malformed_conditions;
        for cond in &raw.conditions {
            match self.resolve_condition(cond) {
                Some(c) => conditions.push(c),
                None => {
                    tracing::debug!(
                        reference = %cond.trigger.describe(),
                        "condition dropped, reference does not resolve"
                    );
                    dropped += 1;
                }
            }
        }

        let mut targets = resolve_targets(resolved.field, raw.targets.as_slice());
        if targets.is_empty() {
            targets.push(T::from_trigger(resolved.field));
        }

        Ok(CanonicalRule {
            action: raw.action,
            trigger: resolved.trigger,
            op: resolved.op,
            expected: resolved.expected,
            conditions,
            targets,
            hide_mode: raw.hide_mode,
            source_ref: resolved.source_ref,
            dropped_conditions: dropped,
        })
    }

    fn resolve_condition(&self, cond: &RawCondition) -> Option<CanonicalCondition> {
        let resolved = self.resolve_trigger(&cond.trigger, cond.op, cond.expected.as_ref())?;
        Some(CanonicalCondition {
            trigger: resolved.trigger,
            op: resolved.op,
            expected: resolved.expected,
        })
    }

    /// Resolve a trigger reference. Option references are rewritten into
    /// a comparison on the parent field.
    fn resolve_trigger(
        &self,
        raw: &RawTrigger,
        op: Operator,
        expected: Option<&serde_json::Value>,
    ) -> Option<ResolvedTrigger<'a>> {
        let (field, option) = match raw {
            RawTrigger::Ref(reference) => {
                let field = self.index.resolve_field_ref(reference)?;
                let option = if is_option_ref(reference) {
                    self.index
                        .parse_option_field_ref(reference)
                        .filter(|r| r.kind == RefKind::Option)
                } else {
                    None
                };
                (field, option)
            }
            RawTrigger::Option {
                field,
                value,
                label,
            } => {
                let parent = field
                    .as_deref()
                    .and_then(|f| self.index.resolve_field_ref(f))
                    .or_else(|| value.as_deref().and_then(|v| self.index.option_owner(v)))
                    .or_else(|| label.as_deref().and_then(|l| self.index.option_owner(l)))?;
                let option = self
                    .index
                    .option_ref_from_parts(parent, value.as_deref(), label.as_deref());
                (parent, Some(option))
            }
        };

        let mut expected = Expected::from_raw(expected);
        if field.field_type.is_choice() {
            expected = expected.into_many();
        }

        let Some(option) = option else {
            return Some(ResolvedTrigger {
                field,
                trigger: Trigger::field(&field.id),
                op,
                expected,
                source_ref: None,
            });
        };

        // The descriptor's parent must still be a schema field; otherwise
        // stay on the field the reference first resolved to.
        let parent = self.index.field(&option.field_id).unwrap_or(field);
        let source_ref = Some(raw.describe());
        // the selector rides along so evaluation can fall back to slug
        // equality when the stored value is the option's label or slug
        let selector = OptionSelector {
            slug: option.option_slug.clone().unwrap_or_default(),
            value: option.option_value.clone(),
        };
        match rewrite_option_trigger(parent.field_type, &option) {
            Some((op, expected)) => Some(ResolvedTrigger {
                field: parent,
                trigger: Trigger {
                    field_id: parent.id.clone(),
                    option: Some(selector),
                },
                op,
                expected,
                source_ref,
            }),
            None => Some(ResolvedTrigger {
                field: parent,
                trigger: Trigger {
                    field_id: parent.id.clone(),
                    option: Some(selector),
                },
                op: Operator::Equals,
                expected: Expected::One(serde_json::Value::Bool(true)),
                source_ref,
            }),
        }
    }

    /// Resolve one field-domain target. Tried in order: an object naming
    /// an option, an option composite, `field:option`, a plain field id or
    /// label slug.
    fn field_target(
        &self,
        raw: &serde_json::Value,
        trigger_field: &'a FieldSchema,
    ) -> Option<FieldTarget> {
        if let Some(obj) = raw.as_object() {
            let field_ref = ["fieldId", "field", "id"]
                .iter()
                .find_map(|k| obj.get(*k).and_then(scalar_to_string));
            let value = obj.get("optionValue").and_then(scalar_to_string);
            let label = obj.get("optionLabel").and_then(scalar_to_string);
            if value.is_some() || label.is_some() {
                let field = field_ref
                    .as_deref()
                    .and_then(|f| self.index.resolve_field_ref(f))
                    .unwrap_or(trigger_field);
                let option = self
                    .index
                    .option_ref_from_parts(field, value.as_deref(), label.as_deref());
                return Some(target_from_ref(&option, field));
            }
            return field_ref.and_then(|f| self.field_target_str(&f, trigger_field));
        }
        scalar_to_string(raw).and_then(|s| self.field_target_str(&s, trigger_field))
    }

    fn field_target_str(&self, raw: &str, trigger_field: &'a FieldSchema) -> Option<FieldTarget> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Some((left, right)) = split_option_ref(raw) {
            let field = self
                .index
                .field_by_id_or_slug(left)
                .unwrap_or(trigger_field);
            let option = OptionRef::for_option(field, find_option(field, right), right);
            return Some(target_from_ref(&option, field));
        }
        if let Some((left, right)) = raw.split_once(':') {
            let field = self
                .index
                .field_by_id_or_slug(left)
                .or_else(|| self.index.field_by_label(left));
            if let Some(field) = field {
                let option = OptionRef::for_option(field, find_option(field, right), right);
                return Some(target_from_ref(&option, field));
            }
        }
        self.index
            .field_by_id_or_slug(raw)
            .map(FieldTarget::from_trigger)
    }
}

fn target_from_ref(option: &OptionRef, field: &FieldSchema) -> FieldTarget {
    FieldTarget {
        id: option.id.clone(),
        field_id: field.id.clone(),
        option_value: option.option_value.clone(),
        option_label: option.option_label.clone(),
        label: option
            .option_label
            .clone()
            .unwrap_or_else(|| field.label.clone()),
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

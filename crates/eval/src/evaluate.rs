//! Rule evaluation.
//!
//! Each pass is a single fold over the canonical rules in input order.
//! A rule matches when its trigger comparison holds and every AND-condition
//! holds; a matched rule applies its effect to each of its targets through
//! the map's precedence ladder. The heading and field passes write separate
//! maps and never see each other's results.

use formvis_interchange::{FieldSchema, FieldType, FormSchema};

use crate::heading::HeadingIdxResolver;
use crate::matcher::matches;
use crate::provenance::{EvaluationTrace, ProvenanceCollector};
use crate::resolve::{option_slug, SchemaIndex};
use crate::rule::{
    Action, CanonicalRule, Expected, FieldRule, HeadingRule, HideMode, Operator, OptionSelector,
    Trigger,
};
use crate::sanitize::sanitize_values;
use crate::slug::slugify;
use crate::value::{FieldValue, ValueBag};
use crate::visibility::{FieldVisibility, HeadingVisibility, Visibility, VisibilityMap};

/// Result of one evaluation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation<K: Ord> {
    pub map: VisibilityMap<K>,
    pub trace: EvaluationTrace,
}

/// Evaluate heading-domain rules against a raw value bag.
pub fn evaluate_heading_rules(
    schema: &FormSchema,
    raw_values: &serde_json::Value,
    rules: &[HeadingRule],
    resolver: &dyn HeadingIdxResolver,
) -> Evaluation<i64> {
    Evaluator::new(schema, raw_values).heading_pass(rules, resolver)
}

/// Evaluate field-domain rules against a raw value bag. Rules without a
/// hide mode use `default_hide_mode`.
pub fn evaluate_field_rules(
    schema: &FormSchema,
    raw_values: &serde_json::Value,
    rules: &[FieldRule],
    default_hide_mode: HideMode,
) -> Evaluation<String> {
    Evaluator::new(schema, raw_values).field_pass(rules, default_hide_mode)
}

/// Sanitized values plus the schema lookups both passes share.
pub struct Evaluator<'a> {
    index: SchemaIndex<'a>,
    values: ValueBag,
}

impl<'a> Evaluator<'a> {
    pub fn new(schema: &'a FormSchema, raw_values: &serde_json::Value) -> Self {
        Evaluator {
            index: SchemaIndex::new(schema),
            values: sanitize_values(schema, raw_values),
        }
    }

    pub fn values(&self) -> &ValueBag {
        &self.values
    }

    pub fn heading_pass(
        &self,
        rules: &[HeadingRule],
        resolver: &dyn HeadingIdxResolver,
    ) -> Evaluation<i64> {
        let mut map = HeadingVisibility::new();
        let mut trace = EvaluationTrace::new();

        for (position, rule) in rules.iter().enumerate() {
            let mut collector = ProvenanceCollector::new();
            if !self.rule_matches(rule, &mut collector) {
                continue;
            }
            let effect = match rule.action {
                Action::Show => Visibility::Show,
                Action::Hide => Visibility::Hide,
            };
            let mut keys = Vec::new();
            for target in &rule.targets {
                let Some(idx) = resolver.resolve_idx(target) else {
                    continue;
                };
                map.apply(idx, effect);
                keys.push(idx.to_string());
            }
            tracing::debug!(position, %effect, targets = keys.len(), "heading rule matched");
            trace.push(collector.into_match(position, effect, keys));
        }

        Evaluation { map, trace }
    }

    pub fn field_pass(
        &self,
        rules: &[FieldRule],
        default_hide_mode: HideMode,
    ) -> Evaluation<String> {
        let mut map = FieldVisibility::new();
        let mut trace = EvaluationTrace::new();

        for (position, rule) in rules.iter().enumerate() {
            let mut collector = ProvenanceCollector::new();
            if !self.rule_matches(rule, &mut collector) {
                continue;
            }
            let effect = match (rule.action, rule.hide_mode.unwrap_or(default_hide_mode)) {
                (Action::Show, _) => Visibility::Show,
                (Action::Hide, HideMode::Hide) => Visibility::Hide,
                (Action::Hide, HideMode::Disable) => Visibility::Disable,
            };
            let keys: Vec<String> = rule.targets.iter().map(|t| t.id.clone()).collect();
            for key in &keys {
                map.apply(key.clone(), effect);
            }
            tracing::debug!(position, %effect, targets = keys.len(), "field rule matched");
            trace.push(collector.into_match(position, effect, keys));
        }

        Evaluation { map, trace }
    }

    fn rule_matches<T>(
        &self,
        rule: &CanonicalRule<T>,
        collector: &mut ProvenanceCollector,
    ) -> bool {
        self.holds(&rule.trigger, rule.op, &rule.expected, collector)
            && rule
                .conditions
                .iter()
                .all(|c| self.holds(&c.trigger, c.op, &c.expected, collector))
    }

    fn holds(
        &self,
        trigger: &Trigger,
        op: Operator,
        expected: &Expected,
        collector: &mut ProvenanceCollector,
    ) -> bool {
        let (actual, field_type) = self.read_trigger(trigger, collector);
        if matches(op, actual.as_ref(), expected, field_type) {
            return true;
        }
        // a rewritten option trigger also accepts the option's label or slug
        match &trigger.option {
            Some(selector) if selector.value.is_some() => option_selected(
                self.index.field(&trigger.field_id),
                actual.as_ref(),
                selector,
            ),
            _ => false,
        }
    }

    /// Current value and semantic type of a trigger. Selectors without a
    /// value read as a boolean "is this option selected".
    fn read_trigger(
        &self,
        trigger: &Trigger,
        collector: &mut ProvenanceCollector,
    ) -> (Option<FieldValue>, FieldType) {
        collector.record_field(&trigger.field_id);
        let field = self.index.field(&trigger.field_id);
        let value = self.values.get(&trigger.field_id);
        match &trigger.option {
            Some(selector) if selector.value.is_none() => {
                let selected = option_selected(field, value, selector);
                (Some(FieldValue::Bool(selected)), FieldType::Boolean)
            }
            _ => (
                value.cloned(),
                field.map_or(FieldType::Text, |f| f.field_type),
            ),
        }
    }
}

/// Is the option named by `selector` selected in `value`? Multichoice
/// values are searched by membership, everything else by equality; either
/// way a value or a slug match counts.
fn option_selected(
    field: Option<&FieldSchema>,
    value: Option<&FieldValue>,
    selector: &OptionSelector,
) -> bool {
    let Some(value) = value else {
        return false;
    };
    let catalog_value = field
        .and_then(|f| f.all_options().find(|o| option_slug(o) == selector.slug))
        .map(|o| o.value.as_str());
    let wanted = selector.value.as_deref().or(catalog_value);
    let hit = |candidate: &str| {
        wanted == Some(candidate)
            || (!selector.slug.is_empty() && slugify(candidate) == selector.slug)
    };
    match field.map(|f| f.field_type) {
        Some(FieldType::Multichoice) => value.items().iter().any(|i| hit(i)),
        _ => value.as_text().is_some_and(|t| hit(&t)),
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heading::{DirectIdx, HeadingTarget};
    use crate::rule::{CanonicalCondition, FieldTarget, RuleTarget};
    use formvis_interchange::FieldOption;
    use serde_json::json;

    fn schema() -> FormSchema {
        FormSchema {
            title: String::new(),
            fields: vec![
                FieldSchema {
                    id: "f1".into(),
                    label: "Pets".into(),
                    field_type: FieldType::Select,
                    options: vec![
                        FieldOption {
                            value: "yes".into(),
                            label: "Yes".into(),
                        },
                        FieldOption {
                            value: "no".into(),
                            label: "No".into(),
                        },
                    ],
                    groups: vec![],
                },
                FieldSchema {
                    id: "f4".into(),
                    label: "Region".into(),
                    field_type: FieldType::Multichoice,
                    options: vec![FieldOption {
                        value: "N".into(),
                        label: "North".into(),
                    }],
                    groups: vec![],
                },
                FieldSchema {
                    id: "rent".into(),
                    label: "Rent".into(),
                    field_type: FieldType::Number,
                    options: vec![],
                    groups: vec![],
                },
            ],
        }
    }

    fn heading_rule(
        action: Action,
        field: &str,
        op: Operator,
        expected: serde_json::Value,
        idx: i64,
    ) -> HeadingRule {
        CanonicalRule {
            action,
            trigger: Trigger::field(field),
            op,
            expected: Expected::from_raw(Some(&expected)),
            conditions: vec![],
            targets: vec![HeadingTarget {
                id: format!("h{idx}"),
                idx: Some(idx),
                label: String::new(),
            }],
            hide_mode: None,
            source_ref: None,
            dropped_conditions: 0,
        }
    }

    #[test]
    fn matched_rule_writes_its_targets() {
        let s = schema();
        let rules = vec![heading_rule(Action::Hide, "f1", Operator::Equals, json!(["no"]), 3)];
        let out = evaluate_heading_rules(&s, &json!({"f1": "no"}), &rules, &DirectIdx);
        assert_eq!(out.map.get(&3), Some(Visibility::Hide));
        assert_eq!(out.trace.len(), 1);
        assert_eq!(out.trace.0[0].keys, vec!["3"]);

        let out = evaluate_heading_rules(&s, &json!({"f1": "yes"}), &rules, &DirectIdx);
        assert!(out.map.is_empty());
        assert!(out.trace.is_empty());
    }

    #[test]
    fn conditions_are_anded() {
        let s = schema();
        let mut rule = heading_rule(Action::Hide, "f1", Operator::Equals, json!(["no"]), 3);
        rule.conditions.push(CanonicalCondition {
            trigger: Trigger::field("rent"),
            op: Operator::Gt,
            expected: Expected::One(json!(1000)),
        });
        let rules = vec![rule];
        let cheap = json!({"f1": "no", "rent": "900"});
        let cheap = evaluate_heading_rules(&s, &cheap, &rules, &DirectIdx);
        assert!(cheap.map.is_empty());
        let dear = json!({"f1": "no", "rent": 1500});
        let dear = evaluate_heading_rules(&s, &dear, &rules, &DirectIdx);
        assert_eq!(dear.map.get(&3), Some(Visibility::Hide));
        assert_eq!(dear.trace.0[0].fields_used, vec!["f1", "rent"]);
    }

    #[test]
    fn targets_without_idx_write_nothing() {
        let s = schema();
        let mut rule = heading_rule(Action::Hide, "f1", Operator::IsNotEmpty, json!(null), 0);
        rule.targets = vec![HeadingTarget::from_trigger(&s.fields[0])];
        let out = evaluate_heading_rules(&s, &json!({"f1": "no"}), &[rule], &DirectIdx);
        assert!(out.map.is_empty());
        assert_eq!(out.trace.len(), 1);
    }

    #[test]
    fn option_selector_reads_as_boolean() {
        let s = schema();
        let rule = FieldRule {
            action: Action::Hide,
            trigger: Trigger {
                field_id: "f4".into(),
                option: Some(OptionSelector {
                    slug: "north".into(),
                    value: None,
                }),
            },
            op: Operator::Equals,
            expected: Expected::One(json!(true)),
            conditions: vec![],
            targets: vec![FieldTarget::from_trigger(&s.fields[0])],
            hide_mode: None,
            source_ref: None,
            dropped_conditions: 0,
        };
        let rules = vec![rule];
        let on = evaluate_field_rules(&s, &json!({"f4": ["E", "N"]}), &rules, HideMode::Hide);
        assert_eq!(on.map.get(&"f1".to_string()), Some(Visibility::Hide));
        let off = evaluate_field_rules(&s, &json!({"f4": ["E"]}), &rules, HideMode::Hide);
        assert!(off.map.is_empty());
    }

    #[test]
    fn rewritten_option_trigger_falls_back_to_slug() {
        let s = schema();
        let rule = FieldRule {
            action: Action::Hide,
            trigger: Trigger {
                field_id: "f4".into(),
                option: Some(OptionSelector {
                    slug: "north".into(),
                    value: Some("N".into()),
                }),
            },
            op: Operator::AnyOf,
            expected: Expected::Many(vec![json!("N")]),
            conditions: vec![],
            targets: vec![FieldTarget::from_trigger(&s.fields[0])],
            hide_mode: None,
            source_ref: None,
            dropped_conditions: 0,
        };
        let rules = vec![rule];
        for values in [json!({"f4": ["N"]}), json!({"f4": ["north"]}), json!({"f4": ["North"]})] {
            let out = evaluate_field_rules(&s, &values, &rules, HideMode::Hide);
            assert_eq!(out.map.get(&"f1".to_string()), Some(Visibility::Hide), "{values}");
        }
        let miss = evaluate_field_rules(&s, &json!({"f4": ["south"]}), &rules, HideMode::Hide);
        assert!(miss.map.is_empty());
    }

    #[test]
    fn field_hide_mode_picks_disable() {
        let s = schema();
        let mut rule = FieldRule {
            action: Action::Hide,
            trigger: Trigger::field("f1"),
            op: Operator::Equals,
            expected: Expected::Many(vec![json!("no")]),
            conditions: vec![],
            targets: vec![FieldTarget::from_trigger(&s.fields[2])],
            hide_mode: None,
            source_ref: None,
            dropped_conditions: 0,
        };
        let values = json!({"f1": "no"});
        let out = evaluate_field_rules(&s, &values, &[rule.clone()], HideMode::Disable);
        assert_eq!(out.map.get(&"rent".to_string()), Some(Visibility::Disable));

        rule.hide_mode = Some(HideMode::Hide);
        let out = evaluate_field_rules(&s, &values, &[rule], HideMode::Disable);
        assert_eq!(out.map.get(&"rent".to_string()), Some(Visibility::Hide));
    }
}

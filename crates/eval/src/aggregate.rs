//! Rule aggregation.
//!
//! Rule state accumulates across several historical storage shapes: bare
//! arrays, arrays nested in arrays, JSON text inside JSON, and wrapper
//! objects under a handful of container names. The walker here flattens
//! all of that into one list of rule-like objects with a bounded descent,
//! and [`resolve_rules_for_state`] applies the container policy.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;

/// Source name recorded when the top-level collections won.
pub const ROOT_SOURCE: &str = "<root>";

/// Which rule collections to aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleDomain {
    Heading,
    Field,
}

impl RuleDomain {
    /// Top-level collection names of this domain.
    pub fn rule_keys<'c>(&self, config: &'c EngineConfig) -> &'c [String] {
        match self {
            RuleDomain::Heading => &config.heading_rule_keys,
            RuleDomain::Field => &config.field_rule_keys,
        }
    }

    /// Whether a state that is just an array of rules belongs to this
    /// domain. Only the heading domain claims one, matching `rules` being
    /// a heading collection name.
    pub fn owns_bare_collection(&self) -> bool {
        matches!(self, RuleDomain::Heading)
    }
}

/// An object is a rule as soon as it carries any of these members.
pub fn is_rule_like(obj: &serde_json::Map<String, serde_json::Value>) -> bool {
    ["action", "fieldId", "whenField", "targets"]
        .iter()
        .any(|k| obj.contains_key(*k))
}

// ──────────────────────────────────────────────
// Walker
// ──────────────────────────────────────────────

/// A node the walker gave up on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discard {
    /// A string that does not parse as JSON.
    NotJson,
    /// A node below the configured depth bound.
    DepthExceeded { depth: usize },
}

/// Receives the walker's findings.
pub trait RuleVisitor {
    fn visit_rule(&mut self, rule: &serde_json::Value);

    fn visit_discard(&mut self, _discard: Discard) {}
}

/// Collects accepted rules and counts discards.
#[derive(Debug, Default)]
pub struct RuleCollector {
    pub rules: Vec<serde_json::Value>,
    pub discarded: usize,
}

impl RuleVisitor for RuleCollector {
    fn visit_rule(&mut self, rule: &serde_json::Value) {
        self.rules.push(rule.clone());
    }

    fn visit_discard(&mut self, _discard: Discard) {
        self.discarded += 1;
    }
}

/// Walk `node`, reporting every rule-like object to `visitor`.
///
/// Arrays are descended into, strings are parsed as JSON and descended
/// into, rule-like objects are accepted as-is and any other object is
/// searched through its member values. Scalars are ignored.
pub fn walk_rules(node: &serde_json::Value, max_depth: usize, visitor: &mut dyn RuleVisitor) {
    walk(node, 0, max_depth, visitor);
}

fn walk(
    node: &serde_json::Value,
    depth: usize,
    max_depth: usize,
    visitor: &mut dyn RuleVisitor,
) {
    if depth > max_depth {
        tracing::warn!(depth, max_depth, "rule collection nested too deep, truncated");
        visitor.visit_discard(Discard::DepthExceeded { depth });
        return;
    }
    match node {
        serde_json::Value::Array(items) => {
            for item in items {
                walk(item, depth + 1, max_depth, visitor);
            }
        }
        serde_json::Value::String(text) => match serde_json::from_str::<serde_json::Value>(text) {
            Ok(parsed) => walk(&parsed, depth + 1, max_depth, visitor),
            Err(_) => visitor.visit_discard(Discard::NotJson),
        },
        serde_json::Value::Object(obj) if is_rule_like(obj) => visitor.visit_rule(node),
        serde_json::Value::Object(obj) => {
            for value in obj.values() {
                walk(value, depth + 1, max_depth, visitor);
            }
        }
        _ => {}
    }
}

/// Flatten an arbitrarily nested rule collection.
pub fn normalize_rule_collection(
    raw: &serde_json::Value,
    max_depth: usize,
) -> Vec<serde_json::Value> {
    let mut collector = RuleCollector::default();
    walk_rules(raw, max_depth, &mut collector);
    collector.rules
}

// ──────────────────────────────────────────────
// Dedup
// ──────────────────────────────────────────────

/// Comparison key: the record minus its volatile members, serialized with
/// sorted keys.
fn dedupe_key(rule: &serde_json::Value, volatile_keys: &[String]) -> String {
    match rule {
        serde_json::Value::Object(obj) => {
            let stripped: serde_json::Map<String, serde_json::Value> = obj
                .iter()
                .filter(|(k, _)| !volatile_keys.iter().any(|v| v == *k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            serde_json::Value::Object(stripped).to_string()
        }
        other => other.to_string(),
    }
}

/// Drop structural duplicates, keeping the first original record
/// (volatile members included). Idempotent.
pub fn dedupe_rules(
    rules: Vec<serde_json::Value>,
    volatile_keys: &[String],
) -> Vec<serde_json::Value> {
    let mut seen = HashSet::new();
    rules
        .into_iter()
        .filter(|rule| seen.insert(dedupe_key(rule, volatile_keys)))
        .collect()
}

// ──────────────────────────────────────────────
// Container policy
// ──────────────────────────────────────────────

/// Aggregated rules of one domain and where they came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregatedRules {
    pub rules: Vec<serde_json::Value>,
    /// Containers that contributed, in search order.
    pub sources: Vec<String>,
    /// True when the top-level collections won.
    pub direct: bool,
    /// Nodes the walker discarded.
    pub discarded: usize,
}

/// Collect one domain's rules from a state document.
///
/// Non-empty top-level collections win outright. Otherwise every payload
/// container (in configured order) is searched for the same collection
/// names, and each container that yields rules is recorded as a source. A
/// bare array (or JSON text holding one) as the whole state is a top-level
/// heading collection and holds no field rules.
pub fn resolve_rules_for_state(
    state: &serde_json::Value,
    domain: RuleDomain,
    config: &EngineConfig,
) -> AggregatedRules {
    let parsed: serde_json::Value;
    let state = match state {
        serde_json::Value::String(text) => match serde_json::from_str(text) {
            Ok(v) => {
                parsed = v;
                &parsed
            }
            Err(_) => return AggregatedRules::default(),
        },
        other => other,
    };

    let keys = domain.rule_keys(config);
    let mut collector = RuleCollector::default();

    match state {
        serde_json::Value::Array(_) if domain.owns_bare_collection() => {
            walk_rules(state, config.max_depth, &mut collector)
        }
        serde_json::Value::Object(obj) => {
            for key in keys {
                if let Some(collection) = obj.get(key) {
                    walk_rules(collection, config.max_depth, &mut collector);
                }
            }
        }
        _ => return AggregatedRules::default(),
    }

    if !collector.rules.is_empty() {
        tracing::debug!(
            domain = ?domain,
            count = collector.rules.len(),
            "using top-level rule collections"
        );
        return AggregatedRules {
            rules: dedupe_rules(collector.rules, &config.volatile_keys),
            sources: vec![ROOT_SOURCE.to_string()],
            direct: true,
            discarded: collector.discarded,
        };
    }

    let mut sources = Vec::new();
    for name in &config.payload_containers {
        let Some(container) = state.get(name) else {
            continue;
        };
        let container = match container {
            serde_json::Value::String(text) => {
                match serde_json::from_str::<serde_json::Value>(text) {
                    Ok(v) => v,
                    Err(_) => {
                        collector.visit_discard(Discard::NotJson);
                        continue;
                    }
                }
            }
            other => other.clone(),
        };
        let before = collector.rules.len();
        for key in keys {
            if let Some(collection) = container.get(key) {
                walk_rules(collection, config.max_depth, &mut collector);
            }
        }
        let added = collector.rules.len() - before;
        if added > 0 {
            tracing::debug!(source = %name, count = added, "aggregated rules from container");
            sources.push(name.clone());
        }
    }

    AggregatedRules {
        rules: dedupe_rules(collector.rules, &config.volatile_keys),
        sources,
        direct: false,
        discarded: collector.discarded,
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn volatile() -> Vec<String> {
        EngineConfig::default().volatile_keys
    }

    #[test]
    fn flattens_nested_arrays_and_json_text() {
        let raw = json!([
            [{"action": "HIDE", "fieldId": "a"}],
            "[{\"action\":\"SHOW\",\"fieldId\":\"b\"}]",
            {"wrapper": {"inner": [{"targets": [1]}]}},
            "not json",
            42,
            null
        ]);
        let rules = normalize_rule_collection(&raw, 32);
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[1]["fieldId"], "b");
        assert_eq!(rules[2]["targets"], json!([1]));
    }

    #[test]
    fn rule_like_objects_are_not_descended() {
        let raw = json!({"action": "HIDE", "fieldId": "a", "conditions": [{"fieldId": "b"}]});
        assert_eq!(normalize_rule_collection(&raw, 32).len(), 1);
    }

    #[test]
    fn discards_are_reported() {
        let mut collector = RuleCollector::default();
        walk_rules(&json!(["nope", [[[{"action": "HIDE"}]]]]), 2, &mut collector);
        assert!(collector.rules.is_empty());
        assert_eq!(collector.discarded, 2);
    }

    #[test]
    fn dedupe_ignores_volatile_members() {
        let rules = vec![
            json!({"action": "HIDE", "fieldId": "a", "ts": 1}),
            json!({"fieldId": "a", "action": "HIDE", "ts": 2, "version": 7}),
            json!({"action": "SHOW", "fieldId": "a", "ts": 3}),
        ];
        let out = dedupe_rules(rules, &volatile());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["ts"], 1);
        assert_eq!(dedupe_rules(out.clone(), &volatile()), out);
    }

    #[test]
    fn top_level_collections_win() {
        let state = json!({
            "rules": [{"action": "HIDE", "fieldId": "a"}],
            "payload": {"rules": [{"action": "SHOW", "fieldId": "b"}]}
        });
        let agg = resolve_rules_for_state(&state, RuleDomain::Heading, &EngineConfig::default());
        assert!(agg.direct);
        assert_eq!(agg.sources, vec![ROOT_SOURCE]);
        assert_eq!(agg.rules.len(), 1);
        assert_eq!(agg.rules[0]["fieldId"], "a");
    }

    #[test]
    fn containers_are_merged_and_recorded() {
        let rule = json!({"action": "HIDE", "fieldId": "a", "ts": 1});
        let state = json!({
            "rules": [],
            "payload": {"rules": [rule.clone()]},
            "formState": serde_json::to_string(&json!({"headingRules": [
                {"action": "HIDE", "fieldId": "a", "ts": 9},
                {"action": "SHOW", "fieldId": "c"}
            ]})).unwrap(),
            "meta": "garbage",
            "data": {"fieldRules": [{"action": "HIDE", "fieldId": "z"}]}
        });
        let agg = resolve_rules_for_state(&state, RuleDomain::Heading, &EngineConfig::default());
        assert!(!agg.direct);
        assert_eq!(agg.sources, vec!["payload", "formState"]);
        assert_eq!(agg.rules.len(), 2);
        assert_eq!(agg.rules[0], rule);
        assert_eq!(agg.discarded, 1);

        let fields = resolve_rules_for_state(&state, RuleDomain::Field, &EngineConfig::default());
        assert_eq!(fields.sources, vec!["data"]);
        assert_eq!(fields.rules.len(), 1);
    }

    #[test]
    fn bare_array_state_is_heading_only() {
        let state = json!([{"action": "HIDE", "fieldId": "a", "targets": [{"idx": 3}]}]);
        let config = EngineConfig::default();
        let headings = resolve_rules_for_state(&state, RuleDomain::Heading, &config);
        assert!(headings.direct);
        assert_eq!(headings.rules.len(), 1);
        assert_eq!(headings.sources, vec![ROOT_SOURCE]);

        let fields = resolve_rules_for_state(&state, RuleDomain::Field, &config);
        assert!(!fields.direct);
        assert!(fields.rules.is_empty());
        assert!(fields.sources.is_empty());
    }
}

//! Provenance records for evaluation passes.
//!
//! Each matched rule leaves a record of its input position, its effect,
//! the fields its trigger and conditions read, and the map keys it
//! targeted. Operators use this to explain why a section vanished.

use serde::Serialize;

use crate::visibility::Visibility;

/// Provenance record for one matched rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleMatch {
    /// Position of the rule in the normalized list.
    pub position: usize,
    pub effect: Visibility,
    /// Field ids read while deciding the match.
    pub fields_used: Vec<String>,
    /// Map keys the rule applied its effect to.
    pub keys: Vec<String>,
}

/// All matched rules of one evaluation pass, in rule order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct EvaluationTrace(pub Vec<RuleMatch>);

impl EvaluationTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: RuleMatch) {
        self.0.push(record);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Matched rules that targeted `key`.
    pub fn explain<'t>(&'t self, key: &'t str) -> impl Iterator<Item = &'t RuleMatch> + 't {
        self.0.iter().filter(move |m| m.keys.iter().any(|k| k == key))
    }
}

/// Tracks field reads while one rule is evaluated.
#[derive(Debug, Clone, Default)]
pub struct ProvenanceCollector {
    pub fields_used: Vec<String>,
}

impl ProvenanceCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a field read.
    pub fn record_field(&mut self, field_id: &str) {
        if !self.fields_used.iter().any(|f| f == field_id) {
            self.fields_used.push(field_id.to_string());
        }
    }

    /// Finalize into a [`RuleMatch`].
    pub fn into_match(self, position: usize, effect: Visibility, keys: Vec<String>) -> RuleMatch {
        RuleMatch {
            position,
            effect,
            fields_used: self.fields_used,
            keys,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collector_deduplicates_fields() {
        let mut c = ProvenanceCollector::new();
        c.record_field("f1");
        c.record_field("f2");
        c.record_field("f1");
        assert_eq!(c.fields_used, vec!["f1", "f2"]);
    }

    #[test]
    fn into_match() {
        let mut c = ProvenanceCollector::new();
        c.record_field("f1");
        let m = c.into_match(3, Visibility::Hide, vec!["25".into()]);
        assert_eq!(m.position, 3);
        assert_eq!(m.fields_used, vec!["f1"]);
        let trace = EvaluationTrace(vec![m]);
        assert_eq!(trace.explain("25").count(), 1);
        assert_eq!(trace.explain("26").count(), 0);
    }
}

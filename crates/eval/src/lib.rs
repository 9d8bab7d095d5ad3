//! Conditional-visibility rule engine -- accepts a form schema, a value bag
//! and accumulated rule state, produces visibility maps for document
//! headings and for form fields.
//!
//! The pipeline is aggregation (flatten and dedupe rule records from every
//! storage shape), normalization (resolve loose references against the
//! schema and the heading baseline), and evaluation (fold the canonical
//! rules over the sanitized values). Every stage is total: bad input
//! degrades to fewer rules or fewer map entries, never to an error.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod evaluate;
pub mod heading;
pub mod matcher;
pub mod normalize;
pub mod provenance;
pub mod resolve;
pub mod rule;
pub mod sanitize;
pub mod slug;
pub mod value;
pub mod visibility;

use serde::Serialize;

use formvis_interchange::FormSchema;

pub use aggregate::{
    dedupe_rules, normalize_rule_collection, resolve_rules_for_state, AggregatedRules, RuleDomain,
};
pub use config::EngineConfig;
pub use error::{ConfigError, RuleParseError};
pub use evaluate::{evaluate_field_rules, evaluate_heading_rules, Evaluation, Evaluator};
pub use heading::{DirectIdx, HeadingBaseline, HeadingIdxResolver, HeadingTarget};
pub use normalize::{normalize_field_rules, normalize_heading_rules, NormalizeOutcome, Rejection};
pub use provenance::{EvaluationTrace, RuleMatch};
pub use resolve::{OptionRef, SchemaIndex};
pub use rule::{Action, CanonicalRule, FieldRule, FieldTarget, HeadingRule, HideMode, Operator};
pub use sanitize::sanitize_values;
pub use value::{FieldValue, Numeric, ValueBag};
pub use visibility::{FieldVisibility, HeadingVisibility, Visibility, VisibilityMap};

/// Everything one document evaluation reads.
#[derive(Debug, Clone)]
pub struct DocumentInput {
    pub schema: FormSchema,
    /// Raw value bag, keyed by field id.
    pub values: serde_json::Value,
    /// Rule state as stored: top-level collections and/or payload
    /// containers.
    pub state: serde_json::Value,
    /// Heading baseline, when one has been parsed.
    pub headings: Option<HeadingBaseline>,
}

/// Rejected records of both domains.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Rejections {
    pub heading: Vec<Rejection>,
    pub field: Vec<Rejection>,
}

/// Output of [`evaluate_document`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilityReport {
    pub headings: HeadingVisibility,
    pub fields: FieldVisibility,
    pub heading_trace: EvaluationTrace,
    pub field_trace: EvaluationTrace,
    pub heading_sources: Vec<String>,
    pub field_sources: Vec<String>,
    pub rejected: Rejections,
}

/// Run aggregation, normalization and both evaluation passes.
///
/// `config` is expected to have passed [`EngineConfig::validate`].
pub fn evaluate_document(input: &DocumentInput, config: &EngineConfig) -> VisibilityReport {
    let heading_raw = resolve_rules_for_state(&input.state, RuleDomain::Heading, config);
    let field_raw = resolve_rules_for_state(&input.state, RuleDomain::Field, config);

    let heading_rules =
        normalize_heading_rules(&input.schema, input.headings.as_ref(), &heading_raw.rules);
    let field_rules = normalize_field_rules(&input.schema, &field_raw.rules);

    let evaluator = Evaluator::new(&input.schema, &input.values);
    let headings = match &input.headings {
        Some(baseline) => evaluator.heading_pass(&heading_rules.rules, baseline),
        None => evaluator.heading_pass(&heading_rules.rules, &DirectIdx),
    };
    let fields = evaluator.field_pass(&field_rules.rules, config.default_hide_mode);

    VisibilityReport {
        headings: headings.map,
        fields: fields.map,
        heading_trace: headings.trace,
        field_trace: fields.trace,
        heading_sources: heading_raw.sources,
        field_sources: field_raw.sources,
        rejected: Rejections {
            heading: heading_rules.rejected,
            field: field_rules.rejected,
        },
    }
}

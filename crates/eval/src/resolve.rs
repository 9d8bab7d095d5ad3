//! Schema lookup indexes and loose reference resolution.
//!
//! Rule producers reference fields by id, by label, by `label:option`, by
//! an option's label or value, or by an option composite. Resolution runs
//! an ordered list of independent [`ResolveStrategy`]s and keeps the first
//! hit. A reference nothing matches resolves to `None`; callers drop the
//! referencing rule or condition.

use std::collections::HashMap;

use serde::Serialize;

use formvis_interchange::{FieldOption, FieldSchema, FieldType, FormSchema};

use crate::rule::{Expected, Operator};
use crate::slug::{option_matches, option_ref, slugify, split_option_ref};

// ──────────────────────────────────────────────
// Index
// ──────────────────────────────────────────────

/// Lookup tables over a form schema. Where two entries collide, the first
/// in schema order wins.
#[derive(Debug, Clone)]
pub struct SchemaIndex<'a> {
    schema: &'a FormSchema,
    by_id: HashMap<&'a str, &'a FieldSchema>,
    by_label: HashMap<String, &'a FieldSchema>,
    by_label_slug: HashMap<String, &'a FieldSchema>,
    by_option: HashMap<String, &'a FieldSchema>,
}

impl<'a> SchemaIndex<'a> {
    pub fn new(schema: &'a FormSchema) -> Self {
        let mut by_id = HashMap::new();
        let mut by_label = HashMap::new();
        let mut by_label_slug = HashMap::new();
        let mut by_option = HashMap::new();

        for field in &schema.fields {
            by_id.entry(field.id.as_str()).or_insert(field);
            by_label
                .entry(field.label.trim().to_lowercase())
                .or_insert(field);
            let slug = slugify(&field.label);
            if !slug.is_empty() {
                by_label_slug.entry(slug).or_insert(field);
            }
            for opt in field.all_options() {
                by_option
                    .entry(opt.label.trim().to_lowercase())
                    .or_insert(field);
                by_option
                    .entry(opt.value.trim().to_lowercase())
                    .or_insert(field);
            }
        }

        SchemaIndex {
            schema,
            by_id,
            by_label,
            by_label_slug,
            by_option,
        }
    }

    pub fn schema(&self) -> &'a FormSchema {
        self.schema
    }

    /// Exact id lookup.
    pub fn field(&self, id: &str) -> Option<&'a FieldSchema> {
        self.by_id.get(id).copied()
    }

    /// Case-insensitive exact label lookup.
    pub fn field_by_label(&self, label: &str) -> Option<&'a FieldSchema> {
        self.by_label.get(&label.trim().to_lowercase()).copied()
    }

    /// Lookup by id, falling back to the slug of the label.
    pub fn field_by_id_or_slug(&self, raw: &str) -> Option<&'a FieldSchema> {
        let trimmed = raw.trim();
        self.field(trimmed)
            .or_else(|| self.by_label_slug.get(&slugify(trimmed)).copied())
    }

    /// The field owning an option whose label or value equals `raw`
    /// (case-insensitive).
    pub fn option_owner(&self, raw: &str) -> Option<&'a FieldSchema> {
        self.by_option.get(&raw.trim().to_lowercase()).copied()
    }

    /// The first field carrying an option whose label slug equals the slug
    /// of `raw`.
    pub fn option_owner_by_slug(&self, raw: &str) -> Option<&'a FieldSchema> {
        let wanted = slugify(raw);
        if wanted.is_empty() {
            return None;
        }
        self.schema
            .fields
            .iter()
            .find(|f| f.all_options().any(|o| slugify(&o.label) == wanted))
    }

    /// Resolve a loose field reference using the default strategy order.
    pub fn resolve_field_ref(&self, raw: &str) -> Option<&'a FieldSchema> {
        first_match(&ResolveStrategy::ORDER, self, raw).map(|(_, field)| field)
    }

    /// Parse `<fieldId>__opt__<slugOrValue>` (or a plain field reference)
    /// into a descriptor.
    ///
    /// An unknown option on a known field is not an error: the descriptor
    /// carries `option_value: None` and a synthetic id, so a rule naming a
    /// since-renamed option still round-trips.
    pub fn parse_option_field_ref(&self, raw: &str) -> Option<OptionRef> {
        let trimmed = raw.trim();
        let Some((left, right)) = split_option_ref(trimmed) else {
            return self.resolve_field_ref(trimmed).map(OptionRef::for_field);
        };
        let field = self
            .field(left)
            .or_else(|| self.resolve_field_ref(left))
            .or_else(|| self.resolve_field_ref(trimmed))?;
        Some(OptionRef::for_option(field, find_option(field, right), right))
    }

    /// Build a descriptor from separately supplied option value and label.
    pub fn option_ref_from_parts(
        &self,
        field: &'a FieldSchema,
        value: Option<&str>,
        label: Option<&str>,
    ) -> OptionRef {
        let matched = value
            .and_then(|v| field.all_options().find(|o| o.value == v))
            .or_else(|| label.and_then(|l| find_option(field, l)))
            .or_else(|| value.and_then(|v| find_option(field, v)));
        match matched {
            Some(opt) => OptionRef::for_option(field, Some(opt), &opt.label),
            None => {
                let mut descriptor =
                    OptionRef::for_option(field, None, label.or(value).unwrap_or_default());
                descriptor.option_value = value.map(|v| v.to_string());
                descriptor.option_label = label.map(|l| l.to_string());
                descriptor
            }
        }
    }
}

/// Find an option on `field` by slug, tolerating raw labels and values.
pub fn find_option<'f>(field: &'f FieldSchema, raw: &str) -> Option<&'f FieldOption> {
    field
        .all_options()
        .find(|o| option_matches(raw, &o.value, &o.label))
}

/// Canonical slug of an option: its label's slug, or its value's when the
/// label slugs to nothing.
pub fn option_slug(opt: &FieldOption) -> String {
    let slug = slugify(&opt.label);
    if slug.is_empty() {
        slugify(&opt.value)
    } else {
        slug
    }
}

// ──────────────────────────────────────────────
// Strategies
// ──────────────────────────────────────────────

/// One independent way of resolving a loose field reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolveStrategy {
    /// The string is a field id.
    ExactId,
    /// The string is a field label (case-insensitive).
    ExactLabel,
    /// `label:anything`: the part before the first `:` is a label.
    ColonPrefixLabel,
    /// The string is the label or value of some field's option.
    OptionOwner,
    /// `<fieldId>__opt__<slug>`: the left part is an id, else the right
    /// part slug-matches some field's option label.
    OptionComposite,
}

impl ResolveStrategy {
    /// Default resolution order.
    pub const ORDER: [ResolveStrategy; 5] = [
        ResolveStrategy::ExactId,
        ResolveStrategy::ExactLabel,
        ResolveStrategy::ColonPrefixLabel,
        ResolveStrategy::OptionOwner,
        ResolveStrategy::OptionComposite,
    ];

    pub fn apply<'a>(&self, index: &SchemaIndex<'a>, raw: &str) -> Option<&'a FieldSchema> {
        match self {
            ResolveStrategy::ExactId => index.field(raw),
            ResolveStrategy::ExactLabel => index.field_by_label(raw),
            ResolveStrategy::ColonPrefixLabel => {
                let (left, _) = raw.split_once(':')?;
                index.field_by_label(left)
            }
            ResolveStrategy::OptionOwner => index.option_owner(raw),
            ResolveStrategy::OptionComposite => {
                let (left, right) = split_option_ref(raw)?;
                index
                    .field(left)
                    .or_else(|| index.option_owner_by_slug(right))
            }
        }
    }
}

/// Run `strategies` in order and return the first hit with the strategy
/// that produced it. Blank references never resolve.
pub fn first_match<'a>(
    strategies: &[ResolveStrategy],
    index: &SchemaIndex<'a>,
    raw: &str,
) -> Option<(ResolveStrategy, &'a FieldSchema)> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    strategies
        .iter()
        .find_map(|s| s.apply(index, trimmed).map(|field| (*s, field)))
}

// ──────────────────────────────────────────────
// Option references
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefKind {
    Field,
    Option,
}

/// A resolved field or option reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionRef {
    pub kind: RefKind,
    pub field_id: String,
    pub option_slug: Option<String>,
    pub option_value: Option<String>,
    pub option_label: Option<String>,
    /// The field id, or `<fieldId>__opt__<slug>` for options.
    pub id: String,
}

impl OptionRef {
    pub fn for_field(field: &FieldSchema) -> OptionRef {
        OptionRef {
            kind: RefKind::Field,
            field_id: field.id.clone(),
            option_slug: None,
            option_value: None,
            option_label: None,
            id: field.id.clone(),
        }
    }

    /// Descriptor for an option of `field`. `raw` supplies the slug when
    /// no option matched.
    pub fn for_option(
        field: &FieldSchema,
        matched: Option<&FieldOption>,
        raw: &str,
    ) -> OptionRef {
        let slug = match matched {
            Some(opt) => option_slug(opt),
            None => {
                let slug = slugify(raw);
                if slug.is_empty() {
                    raw.trim().to_string()
                } else {
                    slug
                }
            }
        };
        OptionRef {
            kind: RefKind::Option,
            field_id: field.id.clone(),
            id: option_ref(&field.id, &slug),
            option_slug: Some(slug),
            option_value: matched.map(|o| o.value.clone()),
            option_label: matched.map(|o| o.label.clone()),
        }
    }
}

/// Rewrite an option trigger into "is this option selected" on its parent
/// field. Returns `None` when the option value is unknown.
pub fn rewrite_option_trigger(
    field_type: FieldType,
    option: &OptionRef,
) -> Option<(Operator, Expected)> {
    let value = option.option_value.as_ref()?;
    let expected = Expected::Many(vec![serde_json::Value::String(value.clone())]);
    let op = match field_type {
        FieldType::Multichoice => Operator::AnyOf,
        // select and everything else: string equality on the value
        _ => Operator::Equals,
    };
    Some((op, expected))
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use formvis_interchange::OptionGroup;

    fn opt(value: &str, label: &str) -> FieldOption {
        FieldOption {
            value: value.to_string(),
            label: label.to_string(),
        }
    }

    fn schema() -> FormSchema {
        FormSchema {
            title: "Lease".into(),
            fields: vec![
                FieldSchema {
                    id: "f1".into(),
                    label: "Pets Allowed".into(),
                    field_type: FieldType::Select,
                    options: vec![opt("yes", "Yes"), opt("no", "No")],
                    groups: vec![],
                },
                FieldSchema {
                    id: "f4".into(),
                    label: "Region".into(),
                    field_type: FieldType::Multichoice,
                    options: vec![],
                    groups: vec![OptionGroup {
                        label: "Coast".into(),
                        options: vec![opt("N", "North"), opt("S", "Southern Côte")],
                    }],
                },
                FieldSchema {
                    id: "notes".into(),
                    label: "Notes".into(),
                    field_type: FieldType::Text,
                    options: vec![],
                    groups: vec![],
                },
            ],
        }
    }

    #[test]
    fn each_strategy_in_isolation() {
        let s = schema();
        let idx = SchemaIndex::new(&s);
        let id = |f: Option<&FieldSchema>| f.map(|f| f.id.clone());
        assert_eq!(id(ResolveStrategy::ExactId.apply(&idx, "f1")), Some("f1".into()));
        assert_eq!(id(ResolveStrategy::ExactId.apply(&idx, "F1")), None);
        assert_eq!(
            id(ResolveStrategy::ExactLabel.apply(&idx, "pets allowed")),
            Some("f1".into())
        );
        assert_eq!(
            id(ResolveStrategy::ColonPrefixLabel.apply(&idx, "Region:North")),
            Some("f4".into())
        );
        assert_eq!(id(ResolveStrategy::ColonPrefixLabel.apply(&idx, "Region")), None);
        assert_eq!(
            id(ResolveStrategy::OptionOwner.apply(&idx, "north")),
            Some("f4".into())
        );
        assert_eq!(
            id(ResolveStrategy::OptionComposite.apply(&idx, "f1__opt__yes")),
            Some("f1".into())
        );
        assert_eq!(
            id(ResolveStrategy::OptionComposite.apply(&idx, "gone__opt__southern_cote")),
            Some("f4".into())
        );
    }

    #[test]
    fn first_match_reports_winning_strategy() {
        let s = schema();
        let idx = SchemaIndex::new(&s);
        let (strategy, field) = first_match(&ResolveStrategy::ORDER, &idx, " Notes ").unwrap();
        assert_eq!(strategy, ResolveStrategy::ExactLabel);
        assert_eq!(field.id, "notes");
        assert!(first_match(&ResolveStrategy::ORDER, &idx, "   ").is_none());
        assert!(idx.resolve_field_ref("nothing here").is_none());
    }

    #[test]
    fn resolves_every_field_by_its_own_id() {
        let s = schema();
        let idx = SchemaIndex::new(&s);
        for f in &s.fields {
            assert_eq!(idx.resolve_field_ref(&f.id), Some(f));
        }
    }

    #[test]
    fn parses_matched_option_composite() {
        let s = schema();
        let idx = SchemaIndex::new(&s);
        let parsed = idx.parse_option_field_ref("f4__opt__north").unwrap();
        assert_eq!(parsed.kind, RefKind::Option);
        assert_eq!(parsed.field_id, "f4");
        assert_eq!(parsed.option_value.as_deref(), Some("N"));
        assert_eq!(parsed.option_label.as_deref(), Some("North"));
        assert_eq!(parsed.id, "f4__opt__north");
    }

    #[test]
    fn option_composite_tolerates_raw_label_or_value() {
        let s = schema();
        let idx = SchemaIndex::new(&s);
        let by_label = idx.parse_option_field_ref("f4__opt__Southern Côte").unwrap();
        assert_eq!(by_label.option_value.as_deref(), Some("S"));
        assert_eq!(by_label.id, "f4__opt__southern_cote");
        let by_value = idx.parse_option_field_ref("f4__opt__S").unwrap();
        assert_eq!(by_value.option_value.as_deref(), Some("S"));
    }

    #[test]
    fn unmatched_option_keeps_synthetic_id() {
        let s = schema();
        let idx = SchemaIndex::new(&s);
        let parsed = idx.parse_option_field_ref("f1__opt__Maybe Later").unwrap();
        assert_eq!(parsed.kind, RefKind::Option);
        assert_eq!(parsed.option_value, None);
        assert_eq!(parsed.option_slug.as_deref(), Some("maybe_later"));
        assert_eq!(parsed.id, "f1__opt__maybe_later");
    }

    #[test]
    fn left_segment_is_re_resolved() {
        let s = schema();
        let idx = SchemaIndex::new(&s);
        let parsed = idx.parse_option_field_ref("Pets Allowed__opt__no").unwrap();
        assert_eq!(parsed.field_id, "f1");
        assert_eq!(parsed.option_value.as_deref(), Some("no"));
    }

    #[test]
    fn plain_reference_is_field_kind() {
        let s = schema();
        let idx = SchemaIndex::new(&s);
        let parsed = idx.parse_option_field_ref("Region").unwrap();
        assert_eq!(parsed.kind, RefKind::Field);
        assert_eq!(parsed.id, "f4");
        assert!(idx.parse_option_field_ref("unknown__opt__x").is_none());
    }

    #[test]
    fn rewrite_depends_on_field_type() {
        let s = schema();
        let idx = SchemaIndex::new(&s);
        let north = idx.parse_option_field_ref("f4__opt__north").unwrap();
        assert_eq!(
            rewrite_option_trigger(FieldType::Multichoice, &north),
            Some((Operator::AnyOf, Expected::Many(vec![serde_json::json!("N")])))
        );
        let no = idx.parse_option_field_ref("f1__opt__no").unwrap();
        assert_eq!(
            rewrite_option_trigger(FieldType::Select, &no),
            Some((Operator::Equals, Expected::Many(vec![serde_json::json!("no")])))
        );
        let unknown = idx.parse_option_field_ref("f1__opt__zzz").unwrap();
        assert_eq!(rewrite_option_trigger(FieldType::Select, &unknown), None);
    }

    #[test]
    fn option_parts_match_by_value_then_label() {
        let s = schema();
        let idx = SchemaIndex::new(&s);
        let f4 = idx.field("f4").unwrap();
        let by_label = idx.option_ref_from_parts(f4, None, Some("North"));
        assert_eq!(by_label.option_value.as_deref(), Some("N"));
        let unknown = idx.option_ref_from_parts(f4, Some("W"), Some("West"));
        assert_eq!(unknown.option_value.as_deref(), Some("W"));
        assert_eq!(unknown.id, "f4__opt__west");
    }
}

//! Heading baseline index.
//!
//! Gives every document heading a stable identity that survives re-parses
//! and array reordering. A heading's `idx` comes from the upstream parse
//! and is an opaque key: array position only stands in for it when the
//! record carries none, and a positional idx never displaces a real one.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use formvis_interchange::{
    parse_heading_records, scalar_to_string, stable_index, FieldSchema, HeadingRecord,
};

use crate::rule::RuleTarget;
use crate::slug::slugify;

/// A heading with its stable identity filled in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BaselineEntry {
    pub id: String,
    pub idx: i64,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
    /// True when `idx` was taken from the record rather than its position.
    pub explicit_idx: bool,
}

/// A resolved heading-domain rule target.
///
/// `idx` is `None` only for targets preserved verbatim without a baseline
/// or synthesized from a label alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadingTarget {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idx: Option<i64>,
    #[serde(default)]
    pub label: String,
}

impl HeadingTarget {
    /// Read a target without any baseline: pull out whatever id, idx and
    /// label the producer wrote.
    pub fn from_raw(raw: &serde_json::Value) -> HeadingTarget {
        match raw {
            serde_json::Value::Object(obj) => {
                let idx = obj.get("idx").and_then(index_of);
                let id = ["id", "uid", "key"]
                    .iter()
                    .find_map(|k| obj.get(*k).and_then(scalar_to_string))
                    .or_else(|| idx.map(synthetic_id))
                    .unwrap_or_default();
                HeadingTarget {
                    id,
                    idx,
                    label: label_of(obj).unwrap_or_default(),
                }
            }
            other => {
                let idx = index_of(other);
                HeadingTarget {
                    id: idx
                        .map(synthetic_id)
                        .or_else(|| scalar_to_string(other))
                        .unwrap_or_default(),
                    idx,
                    label: String::new(),
                }
            }
        }
    }

    fn from_entry(entry: &BaselineEntry) -> HeadingTarget {
        HeadingTarget {
            id: entry.id.clone(),
            idx: Some(entry.idx),
            label: entry.label.clone(),
        }
    }
}

impl RuleTarget for HeadingTarget {
    fn from_trigger(field: &FieldSchema) -> Self {
        HeadingTarget {
            id: field.id.clone(),
            idx: None,
            label: field.label.clone(),
        }
    }
}

/// Turns a heading target into the idx a visibility map is keyed by.
pub trait HeadingIdxResolver {
    fn resolve_idx(&self, target: &HeadingTarget) -> Option<i64>;
}

/// Trusts the idx already on the target. Used when no baseline loaded.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectIdx;

impl HeadingIdxResolver for DirectIdx {
    fn resolve_idx(&self, target: &HeadingTarget) -> Option<i64> {
        target.idx
    }
}

/// Stable-identity index over a document's headings.
#[derive(Debug, Clone, Default)]
pub struct HeadingBaseline {
    entries: Vec<BaselineEntry>,
    by_id: HashMap<String, usize>,
    by_idx: HashMap<String, usize>,
    by_number: HashMap<String, usize>,
    by_slug: HashMap<String, usize>,
}

impl HeadingBaseline {
    /// Build the index from records in document order.
    pub fn build(records: &[HeadingRecord]) -> HeadingBaseline {
        let entries: Vec<BaselineEntry> = records
            .iter()
            .enumerate()
            .map(|(pos, rec)| {
                let explicit_idx = rec.idx.is_some();
                let idx = rec.idx.unwrap_or(pos as i64);
                let id = rec
                    .id
                    .clone()
                    .or_else(|| rec.uid.clone())
                    .or_else(|| rec.key.clone())
                    .unwrap_or_else(|| synthetic_id(idx));
                BaselineEntry {
                    id,
                    idx,
                    label: rec.label.clone().unwrap_or_default(),
                    number: rec.number.as_ref().map(|n| n.trim().to_string()),
                    level: rec.level,
                    explicit_idx,
                }
            })
            .collect();

        let mut by_id = HashMap::new();
        let mut by_idx = HashMap::new();
        let mut by_number = HashMap::new();
        let mut by_slug = HashMap::new();

        // Explicit idx values claim their keys before any positional one.
        for (i, entry) in entries.iter().enumerate().filter(|(_, e)| e.explicit_idx) {
            by_idx.entry(entry.idx.to_string()).or_insert(i);
        }
        for (i, entry) in entries.iter().enumerate().filter(|(_, e)| !e.explicit_idx) {
            by_idx.entry(entry.idx.to_string()).or_insert(i);
        }

        for (i, (entry, rec)) in entries.iter().zip(records).enumerate() {
            by_id.entry(entry.id.clone()).or_insert(i);
            for alias in [&rec.uid, &rec.key].into_iter().flatten() {
                by_id.entry(alias.clone()).or_insert(i);
            }
            if let Some(number) = entry.number.as_ref().filter(|n| !n.is_empty()) {
                by_number.entry(number.clone()).or_insert(i);
            }
            let slug = slugify(&entry.label);
            if !slug.is_empty() {
                by_slug.entry(slug).or_insert(i);
            }
        }

        HeadingBaseline {
            entries,
            by_id,
            by_idx,
            by_number,
            by_slug,
        }
    }

    /// Parse and index the heading-baseline provider's JSON.
    pub fn from_json(doc: &serde_json::Value) -> HeadingBaseline {
        HeadingBaseline::build(&parse_heading_records(doc))
    }

    pub fn entries(&self) -> &[BaselineEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn by_id(&self, id: &str) -> Option<&BaselineEntry> {
        self.by_id.get(id.trim()).map(|&i| &self.entries[i])
    }

    pub fn by_idx(&self, idx: &str) -> Option<&BaselineEntry> {
        self.by_idx.get(idx.trim()).map(|&i| &self.entries[i])
    }

    pub fn by_number(&self, number: &str) -> Option<&BaselineEntry> {
        self.by_number.get(number.trim()).map(|&i| &self.entries[i])
    }

    pub fn by_label(&self, label: &str) -> Option<&BaselineEntry> {
        self.by_slug.get(&slugify(label)).map(|&i| &self.entries[i])
    }

    /// Resolve an arbitrary target representation to a baseline heading.
    ///
    /// Objects try id/uid, then idx/key, then number, then label slug, and
    /// finally synthesize a target from whatever idx/label they carry.
    /// Strings and numbers try id, idx, number and label slug, then fall
    /// back to reading a finite integral value as a direct idx (never as
    /// an array position). `None` only when nothing usable is present.
    pub fn normalize_target(&self, raw: &serde_json::Value) -> Option<HeadingTarget> {
        match raw {
            serde_json::Value::Null => None,
            serde_json::Value::Object(obj) => self.normalize_object(obj),
            serde_json::Value::Array(_) => None,
            primitive => self.normalize_primitive(primitive),
        }
    }

    fn normalize_object(
        &self,
        obj: &serde_json::Map<String, serde_json::Value>,
    ) -> Option<HeadingTarget> {
        let text = |key: &str| obj.get(key).and_then(key_text);

        let hit = ["id", "uid"]
            .iter()
            .find_map(|k| text(k).and_then(|s| self.by_id(&s)))
            .or_else(|| {
                ["idx", "key"]
                    .iter()
                    .find_map(|k| text(k).and_then(|s| self.by_idx(&s)))
            })
            .or_else(|| text("number").and_then(|s| self.by_number(&s)))
            .or_else(|| label_of(obj).and_then(|l| self.by_label(&l)));
        if let Some(entry) = hit {
            return Some(HeadingTarget::from_entry(entry));
        }

        let idx = obj.get("idx").and_then(index_of);
        let label = label_of(obj);
        if idx.is_none() && label.is_none() {
            return None;
        }
        let id = text("id")
            .or_else(|| idx.map(synthetic_id))
            .unwrap_or_default();
        Some(HeadingTarget {
            id,
            idx,
            label: label.unwrap_or_default(),
        })
    }

    fn normalize_primitive(&self, raw: &serde_json::Value) -> Option<HeadingTarget> {
        let s = key_text(raw)?;
        let hit = self
            .by_id(&s)
            .or_else(|| self.by_idx(&s))
            .or_else(|| self.by_number(&s))
            .or_else(|| self.by_label(&s));
        if let Some(entry) = hit {
            return Some(HeadingTarget::from_entry(entry));
        }
        index_of(raw).map(|idx| HeadingTarget {
            id: synthetic_id(idx),
            idx: Some(idx),
            label: String::new(),
        })
    }
}

impl HeadingIdxResolver for HeadingBaseline {
    /// Lookups by id, number and label happen in [`Self::normalize_target`].
    /// By evaluation time the idx on the target is final, and a target
    /// without one (such as a default derived from the trigger field) maps
    /// to nothing, even when its label names a heading.
    fn resolve_idx(&self, target: &HeadingTarget) -> Option<i64> {
        target.idx
    }
}

/// `sec_NNNNNN` id for headings whose record carries none.
pub fn synthetic_id(idx: i64) -> String {
    format!("sec_{:06}", idx)
}

/// Text form of a lookup key. Integral numbers print without a fraction so
/// `25.0` and `"25"` address the same heading.
fn key_text(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::Number(_) => stable_index(v)
            .map(|i| i.to_string())
            .or_else(|| scalar_to_string(v)),
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// An idx from a number or a finite integral numeric string.
fn index_of(v: &serde_json::Value) -> Option<i64> {
    match v {
        serde_json::Value::String(s) => {
            let f: f64 = s.trim().parse().ok()?;
            stable_index(&serde_json::json!(f))
        }
        other => stable_index(other),
    }
}

fn label_of(obj: &serde_json::Map<String, serde_json::Value>) -> Option<String> {
    ["label", "text", "title"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(|v| v.as_str()))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(idx: Option<i64>, label: &str) -> HeadingRecord {
        HeadingRecord {
            idx,
            label: Some(label.to_string()),
            ..HeadingRecord::default()
        }
    }

    #[test]
    fn sparse_idx_is_independent_of_order() {
        let forward = HeadingBaseline::build(&[record(Some(10), "Intro"), record(Some(25), "Scope")]);
        let reversed =
            HeadingBaseline::build(&[record(Some(25), "Scope"), record(Some(10), "Intro")]);
        for baseline in [forward, reversed] {
            let target = baseline.normalize_target(&json!(25)).unwrap();
            assert_eq!(target.idx, Some(25));
            assert_eq!(target.label, "Scope");
            let target = baseline.normalize_target(&json!("1")).unwrap();
            assert_eq!(target.idx, Some(1));
            assert_eq!(target.label, "");
        }
    }

    #[test]
    fn positional_idx_never_displaces_explicit_idx() {
        // The second record has no idx and sits at position 1, which the
        // first record claims explicitly.
        let baseline = HeadingBaseline::build(&[record(Some(1), "Real"), record(None, "Loose")]);
        assert_eq!(baseline.by_idx("1").unwrap().label, "Real");
        assert_eq!(baseline.entries()[1].idx, 1);
        assert!(!baseline.entries()[1].explicit_idx);
    }

    #[test]
    fn ids_fall_back_to_uid_key_and_synthetic() {
        let records = vec![
            HeadingRecord {
                uid: Some("u-1".into()),
                idx: Some(4),
                ..HeadingRecord::default()
            },
            HeadingRecord {
                key: Some("k-2".into()),
                idx: Some(5),
                ..HeadingRecord::default()
            },
            HeadingRecord {
                idx: Some(6),
                ..HeadingRecord::default()
            },
        ];
        let baseline = HeadingBaseline::build(&records);
        let ids: Vec<_> = baseline.entries().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["u-1", "k-2", "sec_000006"]);
        assert_eq!(baseline.by_id("sec_000006").unwrap().idx, 6);
    }

    #[test]
    fn object_targets_follow_priority() {
        let baseline = HeadingBaseline::build(&[
            HeadingRecord {
                id: Some("h-intro".into()),
                idx: Some(10),
                label: Some("Intro".into()),
                number: Some("1".into()),
                level: Some(1),
                ..HeadingRecord::default()
            },
            HeadingRecord {
                idx: Some(25),
                label: Some("Scope of Works".into()),
                number: Some("2.1".into()),
                ..HeadingRecord::default()
            },
        ]);
        let idx_of = |v: serde_json::Value| baseline.normalize_target(&v).and_then(|t| t.idx);
        assert_eq!(idx_of(json!({"id": "h-intro", "idx": 25})), Some(10));
        assert_eq!(idx_of(json!({"idx": 25})), Some(25));
        assert_eq!(idx_of(json!({"number": "2.1"})), Some(25));
        assert_eq!(idx_of(json!({"label": "scope of works"})), Some(25));
        assert_eq!(idx_of(json!("2.1")), Some(25));
        assert_eq!(idx_of(json!("Scope of Works")), Some(25));
        assert_eq!(idx_of(json!("h-intro")), Some(10));
    }

    #[test]
    fn unmatched_objects_are_synthesized_not_discarded() {
        let baseline = HeadingBaseline::build(&[record(Some(10), "Intro")]);
        let target = baseline.normalize_target(&json!({"idx": 99})).unwrap();
        assert_eq!(
            target,
            HeadingTarget {
                id: "sec_000099".into(),
                idx: Some(99),
                label: String::new()
            }
        );
        let target = baseline
            .normalize_target(&json!({"label": "Annex"}))
            .unwrap();
        assert_eq!(target.idx, None);
        assert_eq!(target.label, "Annex");
        assert!(baseline.normalize_target(&json!({"id": "ghost"})).is_none());
        assert!(baseline.normalize_target(&json!("ghost")).is_none());
        assert!(baseline.normalize_target(&json!(null)).is_none());
    }

    #[test]
    fn raw_targets_without_baseline() {
        assert_eq!(
            HeadingTarget::from_raw(&json!({"idx": 3})),
            HeadingTarget {
                id: "sec_000003".into(),
                idx: Some(3),
                label: String::new()
            }
        );
        assert_eq!(HeadingTarget::from_raw(&json!("7")).idx, Some(7));
        assert_eq!(HeadingTarget::from_raw(&json!("intro")).id, "intro");
    }

    #[test]
    fn resolver_uses_target_idx_only() {
        let baseline = HeadingBaseline::build(&[record(Some(10), "Intro")]);
        let with_idx = HeadingTarget {
            id: "x".into(),
            idx: Some(3),
            label: String::new(),
        };
        assert_eq!(baseline.resolve_idx(&with_idx), Some(3));
        let by_label = HeadingTarget {
            id: "x".into(),
            idx: None,
            label: "Intro".into(),
        };
        assert_eq!(baseline.resolve_idx(&by_label), None);
        assert_eq!(DirectIdx.resolve_idx(&by_label), None);
    }

    #[test]
    fn trigger_default_target_never_matches_a_heading_label() {
        let field = FieldSchema {
            id: "deposit".into(),
            label: "Deposit".into(),
            field_type: formvis_interchange::FieldType::Number,
            options: vec![],
            groups: vec![],
        };
        let baseline = HeadingBaseline::build(&[
            record(Some(3), "Pets"),
            record(Some(4), "Deposit"),
        ]);
        let target = HeadingTarget::from_trigger(&field);
        assert_eq!(baseline.resolve_idx(&target), None);
    }
}

//! Slugs and option composite references.
//!
//! A slug is the lowercase, diacritic-stripped, `_`-delimited form of a
//! label. Option composites join a field id and an option slug with
//! [`OPTION_DELIMITER`].

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Separator between the field id and the option slug in a composite
/// reference such as `region__opt__north`.
pub const OPTION_DELIMITER: &str = "__opt__";

/// Slugify a label: strip diacritics, lowercase, collapse every run of
/// non-alphanumerics into a single `_`, and trim `_` from both ends.
pub fn slugify(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for ch in raw.nfd() {
        if is_combining_mark(ch) {
            continue;
        }
        if ch.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

/// Build the composite id `<field_id>__opt__<slug>`.
pub fn option_ref(field_id: &str, slug: &str) -> String {
    format!("{}{}{}", field_id, OPTION_DELIMITER, slug)
}

/// Split a composite reference into its field and option segments.
pub fn split_option_ref(raw: &str) -> Option<(&str, &str)> {
    raw.split_once(OPTION_DELIMITER)
}

pub fn is_option_ref(raw: &str) -> bool {
    raw.contains(OPTION_DELIMITER)
}

/// True when `candidate` names the option given by `value`/`label`.
///
/// Callers pass slugs, raw labels or raw values interchangeably, so both
/// sides are re-slugified before comparing.
pub fn option_matches(candidate: &str, value: &str, label: &str) -> bool {
    if candidate == value {
        return true;
    }
    let wanted = slugify(candidate);
    if wanted.is_empty() {
        return false;
    }
    wanted == slugify(label) || wanted == slugify(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_diacritics_and_collapses_separators() {
        assert_eq!(slugify("Déclaration  d'impôts"), "declaration_d_impots");
        assert_eq!(slugify("  North / South  "), "north_south");
        assert_eq!(slugify("2.1 Scope"), "2_1_scope");
    }

    #[test]
    fn slug_is_idempotent() {
        let once = slugify("Ça Va -- Bien?");
        assert_eq!(slugify(&once), once);
    }

    #[test]
    fn empty_and_symbol_only_labels_slug_to_empty() {
        assert_eq!(slugify(""), "");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn composite_round_trip() {
        let id = option_ref("f4", "north");
        assert_eq!(id, "f4__opt__north");
        assert_eq!(split_option_ref(&id), Some(("f4", "north")));
        assert!(is_option_ref(&id));
        assert!(!is_option_ref("f4"));
    }

    #[test]
    fn option_matches_accepts_slug_label_or_value() {
        assert!(option_matches("north", "N", "North"));
        assert!(option_matches("North", "N", "North"));
        assert!(option_matches("N", "N", "North"));
        assert!(option_matches("n", "N", "North"));
        assert!(!option_matches("south", "N", "North"));
        assert!(!option_matches("", "N", "North"));
    }
}

//! Operator matching.
//!
//! Every comparison is total: operands that cannot be coerced make the
//! comparison false rather than failing. Date triggers compare calendar
//! days; everything else goes through the generic matcher.

use std::cmp::Ordering;

use formvis_interchange::{scalar_to_string, FieldType};

use crate::rule::{Expected, Operator};
use crate::value::{parse_calendar_date, parse_number, parse_number_str, FieldValue};

/// Does `actual` (of semantic type `field_type`) satisfy `op` against
/// `expected`? A missing value is `None`.
pub fn matches(
    op: Operator,
    actual: Option<&FieldValue>,
    expected: &Expected,
    field_type: FieldType,
) -> bool {
    if field_type == FieldType::Date {
        if let Some(result) = match_date(op, actual, expected) {
            return result;
        }
    }
    match_generic(op, actual, expected, field_type)
}

// ──────────────────────────────────────────────
// Dates
// ──────────────────────────────────────────────

/// Julian day of a value, if it reads as a calendar date.
fn day_of(value: &FieldValue) -> Option<i32> {
    match value {
        FieldValue::Date(d) => Some(d.to_julian_day()),
        other => {
            let text = other.as_text()?;
            parse_calendar_date(&serde_json::Value::String(text)).map(|d| d.to_julian_day())
        }
    }
}

/// Date comparison for the operators it covers; `None` hands the operator
/// to the generic matcher.
fn match_date(op: Operator, actual: Option<&FieldValue>, expected: &Expected) -> Option<bool> {
    if !(op.is_ordering() || matches!(op, Operator::Equals | Operator::NotEquals)) {
        return None;
    }
    let actual = actual.and_then(day_of);
    let expected = expected
        .first()
        .and_then(parse_calendar_date)
        .map(|d| d.to_julian_day());
    let (Some(a), Some(e)) = (actual, expected) else {
        return Some(false);
    };
    Some(compare(op, a.cmp(&e)))
}

fn compare(op: Operator, ord: Ordering) -> bool {
    match op {
        Operator::Equals => ord == Ordering::Equal,
        Operator::NotEquals => ord != Ordering::Equal,
        Operator::Gt => ord == Ordering::Greater,
        Operator::Lt => ord == Ordering::Less,
        Operator::Gte => ord != Ordering::Less,
        Operator::Lte => ord != Ordering::Greater,
        _ => false,
    }
}

// ──────────────────────────────────────────────
// Generic
// ──────────────────────────────────────────────

fn match_generic(
    op: Operator,
    actual: Option<&FieldValue>,
    expected: &Expected,
    field_type: FieldType,
) -> bool {
    let items = actual.map(|v| v.items()).unwrap_or_default();
    let wanted = expected.items();

    match op {
        Operator::Equals | Operator::AnyOf => overlaps(&items, &wanted),
        Operator::NotEquals => !overlaps(&items, &wanted),
        Operator::AllOf => {
            actual.is_some_and(|v| v.is_sequence())
                && wanted.iter().all(|w| items.iter().any(|i| loose_eq(i, w)))
        }
        Operator::Contains => {
            if field_type != FieldType::Text {
                return false;
            }
            let Some(haystack) = actual.and_then(|v| v.as_text()) else {
                return false;
            };
            let haystack = haystack.to_lowercase();
            wanted
                .iter()
                .filter_map(|w| scalar_to_string(w))
                .any(|needle| haystack.contains(&needle.to_lowercase()))
        }
        Operator::IsEmpty => actual.map_or(true, |v| v.is_empty()),
        Operator::IsNotEmpty => actual.is_some_and(|v| !v.is_empty()),
        Operator::Gt | Operator::Lt | Operator::Gte | Operator::Lte => {
            let lhs = actual.and_then(|v| v.as_number());
            let rhs = expected.first().and_then(parse_number);
            match (lhs, rhs) {
                (Some(a), Some(b)) => a.compare(&b).is_some_and(|ord| compare(op, ord)),
                _ => false,
            }
        }
    }
}

fn overlaps(items: &[String], wanted: &[&serde_json::Value]) -> bool {
    items
        .iter()
        .any(|item| wanted.iter().any(|w| loose_eq(item, w)))
}

/// String equality, or numeric equality when both sides read as numbers
/// (`"1.0"` equals `1`).
fn loose_eq(actual: &str, expected: &serde_json::Value) -> bool {
    let Some(text) = scalar_to_string(expected) else {
        return false;
    };
    if text == actual {
        return true;
    }
    match (parse_number_str(actual), parse_number_str(&text)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::str::FromStr;
    use time::macros::date;

    fn text(s: &str) -> FieldValue {
        FieldValue::Text(s.to_string())
    }

    fn choices(items: &[&str]) -> FieldValue {
        FieldValue::Choices(items.iter().map(|s| s.to_string()).collect())
    }

    fn check(op: Operator, actual: Option<&FieldValue>, expected: serde_json::Value) -> bool {
        check_typed(op, actual, expected, FieldType::Select)
    }

    fn check_typed(
        op: Operator,
        actual: Option<&FieldValue>,
        expected: serde_json::Value,
        field_type: FieldType,
    ) -> bool {
        matches(op, actual, &Expected::from_raw(Some(&expected)), field_type)
    }

    #[test]
    fn equals_and_not_equals() {
        let v = text("no");
        assert!(check(Operator::Equals, Some(&v), json!(["no"])));
        assert!(!check(Operator::Equals, Some(&v), json!(["yes"])));
        assert!(check(Operator::NotEquals, Some(&v), json!("yes")));
        assert!(!check(Operator::Equals, None, json!(["no"])));
        assert!(check(Operator::NotEquals, None, json!(["no"])));
    }

    #[test]
    fn equals_is_numeric_aware() {
        let v = FieldValue::Number(Decimal::from_str("1.50").unwrap().into());
        assert!(check(Operator::Equals, Some(&v), json!(1.5)));
        let on = FieldValue::Bool(true);
        assert!(check(Operator::Equals, Some(&on), json!(true)));
        assert!(check(Operator::Equals, Some(&on), json!("true")));
    }

    #[test]
    fn any_of_and_all_of() {
        let v = choices(&["N", "E"]);
        assert!(check(Operator::AnyOf, Some(&v), json!(["N"])));
        assert!(check(Operator::AnyOf, Some(&text("N")), json!(["S", "N"])));
        assert!(!check(Operator::AnyOf, Some(&v), json!(["S"])));
        assert!(check(Operator::AllOf, Some(&v), json!(["E", "N"])));
        assert!(!check(Operator::AllOf, Some(&v), json!(["E", "S"])));
        // a scalar is never "all of" anything
        assert!(!check(Operator::AllOf, Some(&text("N")), json!(["N"])));
    }

    #[test]
    fn contains_is_text_only_and_case_insensitive() {
        let v = text("Large Dog");
        assert!(check_typed(Operator::Contains, Some(&v), json!("dog"), FieldType::Text));
        assert!(!check_typed(Operator::Contains, Some(&v), json!("dog"), FieldType::Select));
        assert!(!check_typed(Operator::Contains, None, json!("dog"), FieldType::Text));
    }

    #[test]
    fn emptiness() {
        assert!(check(Operator::IsEmpty, None, json!(null)));
        assert!(check(Operator::IsEmpty, Some(&choices(&[])), json!(null)));
        assert!(check(Operator::IsEmpty, Some(&FieldValue::Raw(json!(""))), json!(null)));
        assert!(!check(Operator::IsEmpty, Some(&FieldValue::Bool(false)), json!(null)));
        assert!(check(Operator::IsNotEmpty, Some(&text("x")), json!(null)));
        assert!(!check(Operator::IsNotEmpty, None, json!(null)));
    }

    #[test]
    fn ordering_never_fails() {
        let v = FieldValue::Number(Decimal::from(10).into());
        assert!(check(Operator::Gt, Some(&v), json!("9.5")));
        assert!(check(Operator::Lte, Some(&v), json!([10])));
        assert!(!check(Operator::Gt, Some(&v), json!("ten")));
        assert!(!check(Operator::Lt, Some(&text("abc")), json!(5)));
        assert!(!check(Operator::Gte, None, json!(5)));
    }

    #[test]
    fn ordering_spans_decimal_range() {
        let huge = FieldValue::Number(crate::value::Numeric::Float(1e30));
        assert!(check(Operator::Gt, Some(&huge), json!(2000)));
        assert!(check(Operator::Lt, Some(&huge), json!(1e31)));
        assert!(check(Operator::Equals, Some(&huge), json!(1e30)));
        let small = FieldValue::Number(Decimal::from(5).into());
        assert!(check(Operator::Lt, Some(&small), json!(1e30)));
    }

    #[test]
    fn dates_compare_by_calendar_day() {
        let v = FieldValue::Date(date!(2024 - 03 - 05));
        let day = |op, expected| check_typed(op, Some(&v), expected, FieldType::Date);
        assert!(day(Operator::Equals, json!(["2024-03-05T23:00:00Z"])));
        assert!(day(Operator::Gt, json!("04/03/2024")));
        assert!(day(Operator::Lte, json!("2024-03-05")));
        assert!(!day(Operator::Lt, json!("not a date")));
        assert!(day(Operator::IsNotEmpty, json!(null)));
    }
}

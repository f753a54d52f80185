//! Predicate evaluation
//!
//! Evaluates a predicate tree against a materialized object. Used by stores
//! that execute fetch requests in memory.
//!
//! Rules:
//! - No type coercion: `"123"` never equals `123`.
//! - A missing or null attribute only satisfies `== null` and `!= <non-null>`.
//! - String operands are folded according to the comparison's mode.

use std::cmp::Ordering;

use regex::Regex;
use serde_json::Value;

use crate::query::{Comparison, ComparisonMode, ComparisonOp, Predicate};
use crate::store::ManagedObject;

/// Evaluates predicates against objects
pub struct PredicateFilter;

impl PredicateFilter {
    /// Checks if an object satisfies the predicate (None matches everything)
    pub fn matches(object: &ManagedObject, predicate: Option<&Predicate>) -> bool {
        match predicate {
            Some(p) => Self::matches_predicate(object, p),
            None => true,
        }
    }

    fn matches_predicate(object: &ManagedObject, predicate: &Predicate) -> bool {
        match predicate {
            Predicate::Comparison(cmp) => Self::matches_comparison(object.value(&cmp.attribute), cmp),
            // AND semantics
            Predicate::And(parts) => parts.iter().all(|p| Self::matches_predicate(object, p)),
        }
    }

    /// Checks one comparison against an attribute value
    pub fn matches_comparison(actual: &Value, cmp: &Comparison) -> bool {
        let mode = cmp.mode;
        match cmp.op {
            ComparisonOp::Eq => Self::eq_match(actual, &cmp.value, mode),
            ComparisonOp::Ne => !Self::eq_match(actual, &cmp.value, mode),
            ComparisonOp::Gt => Self::order(actual, &cmp.value, mode) == Some(Ordering::Greater),
            ComparisonOp::Gte => matches!(
                Self::order(actual, &cmp.value, mode),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            ComparisonOp::Lt => Self::order(actual, &cmp.value, mode) == Some(Ordering::Less),
            ComparisonOp::Lte => matches!(
                Self::order(actual, &cmp.value, mode),
                Some(Ordering::Less | Ordering::Equal)
            ),
            ComparisonOp::In => match &cmp.value {
                Value::Array(candidates) => {
                    candidates.iter().any(|c| Self::eq_match(actual, c, mode))
                }
                _ => false,
            },
            ComparisonOp::Contains => Self::contains_match(actual, &cmp.value, mode),
            ComparisonOp::BeginsWith => {
                Self::string_match(actual, &cmp.value, mode, |a, b| a.starts_with(b))
            }
            ComparisonOp::EndsWith => {
                Self::string_match(actual, &cmp.value, mode, |a, b| a.ends_with(b))
            }
            ComparisonOp::Like => Self::string_match(actual, &cmp.value, mode, wildcard_match),
            ComparisonOp::Matches => Self::regex_match(actual, &cmp.value, mode),
        }
    }

    /// Equality; strings honour the comparison mode
    fn eq_match(actual: &Value, expected: &Value, mode: ComparisonMode) -> bool {
        match (actual, expected) {
            (Value::String(a), Value::String(b)) => mode.fold(a) == mode.fold(b),
            (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
                (Some(af), Some(bf)) => af == bf,
                _ => a == b,
            },
            _ => actual == expected,
        }
    }

    /// Ordering between same-typed numbers or strings; None otherwise
    fn order(actual: &Value, bound: &Value, mode: ComparisonMode) -> Option<Ordering> {
        match (actual, bound) {
            (Value::Number(a), Value::Number(b)) => {
                if let (Some(ai), Some(bi)) = (a.as_i64(), b.as_i64()) {
                    return Some(ai.cmp(&bi));
                }
                a.as_f64()?.partial_cmp(&b.as_f64()?)
            }
            (Value::String(a), Value::String(b)) => Some(mode.fold(a).cmp(&mode.fold(b))),
            _ => None,
        }
    }

    fn contains_match(actual: &Value, needle: &Value, mode: ComparisonMode) -> bool {
        match (actual, needle) {
            (Value::String(a), Value::String(b)) => mode.fold(a).contains(mode.fold(b).as_ref()),
            (Value::Array(items), _) => items.iter().any(|item| Self::eq_match(item, needle, mode)),
            _ => false,
        }
    }

    fn string_match(
        actual: &Value,
        operand: &Value,
        mode: ComparisonMode,
        test: impl Fn(&str, &str) -> bool,
    ) -> bool {
        match (actual, operand) {
            (Value::String(a), Value::String(b)) => test(&mode.fold(a), &mode.fold(b)),
            _ => false,
        }
    }

    fn regex_match(actual: &Value, pattern: &Value, mode: ComparisonMode) -> bool {
        let (Value::String(text), Value::String(pattern)) = (actual, pattern) else {
            return false;
        };
        let pattern = format!(
            "{}^(?:{})$",
            if mode.is_case_insensitive() { "(?i)" } else { "" },
            pattern
        );
        match Regex::new(&pattern) {
            Ok(re) => {
                if mode.is_diacritic_insensitive() {
                    re.is_match(&ComparisonMode::DiacriticInsensitive.fold(text))
                } else {
                    re.is_match(text)
                }
            }
            Err(_) => false,
        }
    }
}

/// Whole-string match with `*` (any run) and `?` (any one char) wildcards
fn wildcard_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    let (mut t, mut p) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((star_p, star_t)) = star {
            p = star_p + 1;
            t = star_t + 1;
            star = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

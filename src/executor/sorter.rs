//! Result sorting
//!
//! Multi-key, stable sorting of materialized objects. Earlier descriptors
//! are primary keys; later ones only break ties.

use std::cmp::Ordering;

use serde_json::Value;

use crate::query::{ComparisonMode, SortDescriptor};
use crate::store::ManagedObject;

/// Sorts result objects
pub struct ResultSorter;

impl ResultSorter {
    /// Sorts objects according to the descriptors.
    ///
    /// Sort is stable: objects equal on every key keep their input order.
    pub fn sort(objects: &mut [ManagedObject], descriptors: &[SortDescriptor]) {
        if descriptors.is_empty() {
            return;
        }
        objects.sort_by(|a, b| Self::compare(a, b, descriptors));
    }

    /// Compares two objects on a descriptor sequence
    pub fn compare(a: &ManagedObject, b: &ManagedObject, descriptors: &[SortDescriptor]) -> Ordering {
        for descriptor in descriptors {
            let ordering = Self::compare_values(
                a.get(&descriptor.attribute),
                b.get(&descriptor.attribute),
                descriptor.mode,
            );
            let ordering = if descriptor.ascending {
                ordering
            } else {
                ordering.reverse()
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// Compares two JSON values for sorting.
    ///
    /// Ordering rules:
    /// - missing < null < bool < number < string
    /// - For same types, natural ordering; strings folded by `mode`
    pub fn compare_values(a: Option<&Value>, b: Option<&Value>, mode: ComparisonMode) -> Ordering {
        match (a, b) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a_val), Some(b_val)) => {
                let type_order = |v: &Value| -> u8 {
                    match v {
                        Value::Null => 0,
                        Value::Bool(_) => 1,
                        Value::Number(_) => 2,
                        Value::String(_) => 3,
                        Value::Array(_) => 4,
                        Value::Object(_) => 5,
                    }
                };

                let a_type = type_order(a_val);
                let b_type = type_order(b_val);
                if a_type != b_type {
                    return a_type.cmp(&b_type);
                }

                match (a_val, b_val) {
                    (Value::Bool(a_b), Value::Bool(b_b)) => a_b.cmp(b_b),
                    (Value::Number(a_n), Value::Number(b_n)) => {
                        if let (Some(ai), Some(bi)) = (a_n.as_i64(), b_n.as_i64()) {
                            return ai.cmp(&bi);
                        }
                        let a_f = a_n.as_f64().unwrap_or(0.0);
                        let b_f = b_n.as_f64().unwrap_or(0.0);
                        a_f.partial_cmp(&b_f).unwrap_or(Ordering::Equal)
                    }
                    (Value::String(a_s), Value::String(b_s)) => {
                        // Fall back to exact order so folded-equal strings stay deterministic
                        mode.fold(a_s)
                            .cmp(&mode.fold(b_s))
                            .then_with(|| a_s.cmp(b_s))
                    }
                    // Arrays and objects not compared
                    _ => Ordering::Equal,
                }
            }
        }
    }
}

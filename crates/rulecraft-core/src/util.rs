// SPDX-License-Identifier: Apache-2.0
//! Shared utilities: comparison operators, numeric/string coercion, entity
//! slice normalization, and deep equality.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Comparison operator used by where-clause leaves and distance triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// String substring containment.
    Contains,
    /// Membership: left value equals any element of a right-hand sequence.
    In,
}

/// Compares `left` against `right` using `op`.
///
/// Numeric comparison is used when both sides coerce to a number;
/// otherwise comparison falls back to lexicographic string comparison.
/// `Contains` and `In` are string/sequence-only operators.
#[must_use]
pub fn compare(left: &Value, op: Operator, right: &Value) -> bool {
    match op {
        Operator::Contains => left
            .as_comparable_string()
            .contains(&right.as_comparable_string()),
        Operator::In => match right {
            Value::Sequence(items) => items.iter().any(|v| values_equal(left, v)),
            _ => false,
        },
        Operator::Eq => values_equal(left, right),
        Operator::Ne => !values_equal(left, right),
        Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte => {
            match (left.as_f64(), right.as_f64()) {
                (Some(l), Some(r)) => numeric_compare(l, op, r),
                _ => {
                    let l = left.as_comparable_string();
                    let r = right.as_comparable_string();
                    string_compare(&l, op, &r)
                }
            }
        }
    }
}

fn numeric_compare(l: f64, op: Operator, r: f64) -> bool {
    match op {
        Operator::Lt => l < r,
        Operator::Lte => l <= r,
        Operator::Gt => l > r,
        Operator::Gte => l >= r,
        _ => unreachable!("numeric_compare only called for ordering operators"),
    }
}

fn string_compare(l: &str, op: Operator, r: &str) -> bool {
    match op {
        Operator::Lt => l < r,
        Operator::Lte => l <= r,
        Operator::Gt => l > r,
        Operator::Gte => l >= r,
        _ => unreachable!("string_compare only called for ordering operators"),
    }
}

/// Value equality used by `Eq`/`Ne`/`In`: numeric coercion first (so
/// `Int(1) == Float(1.0)`), falling back to structural equality.
#[must_use]
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(_), Value::String(_)) => a == b,
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
            _ => a == b,
        },
    }
}

/// Deep-equality check for change detection, used by `on-change` triggers.
/// `Value` owns its tree with no aliasing, so this is exactly
/// `PartialEq::eq`; kept as a named function so trigger code reads at its
/// own level of abstraction.
#[must_use]
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    a == b
}

/// Deep-copies a value for `on-change` snapshotting. `Value::clone` already
/// performs a full structural copy (no shared interior state), which is
/// the only valid deep-copy semantics for an owned tree.
#[must_use]
pub fn deep_copy(v: &Value) -> Value {
    v.clone()
}

/// Normalizes a resolved value into an entity slice for pipeline/effect
/// target iteration. Accepts a sequence directly, or wraps a single
/// record/map as a one-element slice (mirrors "targets unset -> apply once
/// with the root state as the entity").
#[must_use]
pub fn as_entity_slice(v: &Value) -> Vec<&Value> {
    match v {
        Value::Sequence(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_and_lexicographic_fallback() {
        assert!(compare(&Value::Int(1), Operator::Lt, &Value::Int(2)));
        assert!(compare(
            &Value::String("apple".into()),
            Operator::Lt,
            &Value::String("banana".into())
        ));
    }

    #[test]
    fn contains_and_in_operators() {
        assert!(compare(
            &Value::String("hello world".into()),
            Operator::Contains,
            &Value::String("world".into())
        ));
        let seq = Value::Sequence(vec![Value::Int(1), Value::Int(2)]);
        assert!(compare(&Value::Int(2), Operator::In, &seq));
        assert!(!compare(&Value::Int(3), Operator::In, &seq));
    }

    #[test]
    fn int_and_float_compare_equal() {
        assert!(values_equal(&Value::Int(1), &Value::Float(1.0)));
    }
}

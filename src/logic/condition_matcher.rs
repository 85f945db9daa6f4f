use serde_json::Value;
use std::cmp::Ordering;

use crate::model::{Comparison, Condition, EvaluationContext, Operand, Operator};

/// Evaluates condition trees against an evaluation context.
///
/// Evaluation is total: malformed operands and missing properties make a leaf
/// evaluate to `false`, never an error. Missing-property policy:
/// - a property that is absent, or present with JSON `null`, is *absent*;
/// - an absent property never satisfies a comparison, including `not_equals`
///   and `not_in`;
/// - `is_not_present` is the only leaf that matches an absent property;
/// - a reference operand pointing at an absent property fails the comparison.
///
/// `{"not": ...}` negates the whole subtree, so `not(equals)` on an absent
/// property is `true`.
pub struct ConditionMatcher;

impl ConditionMatcher {
    pub fn matches(condition: &Condition, context: &EvaluationContext) -> bool {
        match condition {
            Condition::Literal(result) => *result,
            Condition::All { all } => all.iter().all(|c| Self::matches(c, context)),
            Condition::Any { any } => any.iter().any(|c| Self::matches(c, context)),
            Condition::Not { not } => !Self::matches(not, context),
            Condition::Compare(comparison) => Self::matches_comparison(comparison, context),
        }
    }

    fn matches_comparison(comparison: &Comparison, context: &EvaluationContext) -> bool {
        let left = lookup(context, &comparison.property);

        match comparison.operator {
            Operator::IsPresent => return left.is_some(),
            Operator::IsNotPresent => return left.is_none(),
            _ => {}
        }

        let Some(left) = left else {
            return false;
        };
        let right = match &comparison.value {
            Operand::Literal(value) => value,
            Operand::Reference(reference) => match lookup(context, &reference.property) {
                Some(value) => value,
                None => return false,
            },
        };

        match comparison.operator {
            Operator::Equals => values_equal(left, right),
            Operator::NotEquals => !values_equal(left, right),
            Operator::In => match right {
                Value::Array(candidates) => candidates.iter().any(|c| values_equal(left, c)),
                _ => false,
            },
            Operator::NotIn => match right {
                Value::Array(candidates) => !candidates.iter().any(|c| values_equal(left, c)),
                _ => false,
            },
            Operator::GreaterThan => compare_values(left, right) == Some(Ordering::Greater),
            Operator::GreaterThanOrEqual => matches!(
                compare_values(left, right),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Operator::LessThan => compare_values(left, right) == Some(Ordering::Less),
            Operator::LessThanOrEqual => matches!(
                compare_values(left, right),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Operator::Contains => match (left, right) {
                (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
                (Value::Array(items), needle) => items.iter().any(|item| values_equal(item, needle)),
                _ => false,
            },
            Operator::StartsWith => match (left, right) {
                (Value::String(s), Value::String(prefix)) => s.starts_with(prefix.as_str()),
                _ => false,
            },
            Operator::EndsWith => match (left, right) {
                (Value::String(s), Value::String(suffix)) => s.ends_with(suffix.as_str()),
                _ => false,
            },
            // Presence checks returned early
            Operator::IsPresent | Operator::IsNotPresent => false,
        }
    }
}

/// Resolve a dotted property path; `null` values count as absent
pub fn lookup<'a>(context: &'a EvaluationContext, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    // An exact key wins over a nested path, so flat contexts with dotted keys work
    if let Some(value) = context.get(path) {
        return non_null(value);
    }

    let mut segments = path.split('.');
    let mut current = context.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    non_null(current)
}

fn non_null(value: &Value) -> Option<&Value> {
    if value.is_null() {
        None
    } else {
        Some(value)
    }
}

/// JSON equality where `1` and `1.0` are the same number
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => match (l.as_f64(), r.as_f64()) {
            (Some(lf), Some(rf)) => lf == rf,
            _ => l == r,
        },
        _ => left == right,
    }
}

/// Ordering for comparison operators. Numbers compare numerically, numeric
/// strings compare as numbers, other strings lexicographically; anything else
/// is unordered.
fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l.as_f64()?.partial_cmp(&r.as_f64()?),
        (Value::String(l), Value::String(r)) => match (l.parse::<f64>(), r.parse::<f64>()) {
            (Ok(lf), Ok(rf)) => lf.partial_cmp(&rf),
            _ => Some(l.cmp(r)),
        },
        (Value::Number(l), Value::String(r)) => l.as_f64()?.partial_cmp(&r.parse::<f64>().ok()?),
        (Value::String(l), Value::Number(r)) => l.parse::<f64>().ok()?.partial_cmp(&r.as_f64()?),
        _ => None,
    }
}

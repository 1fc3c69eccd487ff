/// `processing.if` evaluation
///
/// Both operands are compared as numbers when each parses as a finite
/// float, otherwise as strings (byte-wise). The rule applies to every
/// operator, so `"1.0" = "1"` holds.
///
/// The payload value is the left operand. Graphs authored against the older
/// `comparisonValue OP value` reading flip for `>`, `<`, `>=` and `<=`.

use crate::flow::types::{ComparisonOperator, IfConfig};
use crate::runtime::template::{lookup, stringify};
use serde_json::Value;
use std::cmp::Ordering;

/// Evaluate `value_at(path) OP comparison_value` against `input`
pub fn evaluate(config: &IfConfig, input: &Value) -> bool {
    let left = stringify(lookup(input, &config.path));
    let right = if config.comparison_value_is_path {
        stringify(lookup(input, &config.comparison_value))
    } else {
        config.comparison_value.clone()
    };

    let ordering = compare(&left, &right);
    let result = match config.comparison_operator {
        ComparisonOperator::Equal => ordering == Ordering::Equal,
        ComparisonOperator::NotEqual => ordering != Ordering::Equal,
        ComparisonOperator::GreaterThan => ordering == Ordering::Greater,
        ComparisonOperator::LessThan => ordering == Ordering::Less,
        ComparisonOperator::GreaterThanOrEqual => ordering != Ordering::Less,
        ComparisonOperator::LessThanOrEqual => ordering != Ordering::Greater,
    };

    tracing::debug!(
        "🔀 Condition '{}' ({:?}) {:?} '{}' -> {}",
        config.path,
        left,
        config.comparison_operator,
        right,
        result
    );
    result
}

fn compare(left: &str, right: &str) -> Ordering {
    match (as_number(left), as_number(right)) {
        (Some(l), Some(r)) => l.partial_cmp(&r).unwrap_or(Ordering::Equal),
        _ => left.cmp(right),
    }
}

fn as_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(path: &str, op: ComparisonOperator, value: &str) -> IfConfig {
        IfConfig {
            path: path.into(),
            comparison_operator: op,
            comparison_value: value.into(),
            comparison_value_is_path: false,
        }
    }

    #[test]
    fn string_equality_selects_branch() {
        let cfg = config("status", ComparisonOperator::Equal, "open");
        assert!(evaluate(&cfg, &json!({ "status": "open" })));
        assert!(!evaluate(&cfg, &json!({ "status": "closed" })));
    }

    #[test]
    fn numbers_compare_numerically() {
        let input = json!({ "temperature": 9, "reading": "10.5" });
        assert!(!evaluate(&config("temperature", ComparisonOperator::GreaterThan, "10"), &input));
        assert!(evaluate(&config("reading", ComparisonOperator::GreaterThan, "9"), &input));
        assert!(evaluate(&config("temperature", ComparisonOperator::Equal, "9.0"), &input));
        assert!(evaluate(&config("temperature", ComparisonOperator::LessThanOrEqual, "9"), &input));
        assert!(evaluate(&config("temperature", ComparisonOperator::GreaterThanOrEqual, "9"), &input));
    }

    #[test]
    fn payload_value_is_the_left_operand() {
        let input = json!({ "count": 5 });
        assert!(evaluate(&config("count", ComparisonOperator::GreaterThan, "3"), &input));
        assert!(!evaluate(&config("count", ComparisonOperator::LessThan, "3"), &input));
        assert!(evaluate(&config("count", ComparisonOperator::LessThanOrEqual, "7"), &input));
        assert!(!evaluate(&config("count", ComparisonOperator::GreaterThanOrEqual, "7"), &input));
    }

    #[test]
    fn mixed_operands_fall_back_to_lexical() {
        let input = json!({ "name": "b" });
        assert!(evaluate(&config("name", ComparisonOperator::GreaterThan, "a"), &input));
        assert!(evaluate(&config("name", ComparisonOperator::GreaterThan, "10"), &input));
        assert!(evaluate(&config("name", ComparisonOperator::NotEqual, "B"), &input));
    }

    #[test]
    fn missing_value_reads_as_empty_string() {
        let input = json!({});
        assert!(evaluate(&config("missing", ComparisonOperator::Equal, ""), &input));
        assert!(evaluate(&config("missing", ComparisonOperator::LessThan, "a"), &input));
    }

    #[test]
    fn comparison_value_can_be_a_path() {
        let mut cfg = config("used", ComparisonOperator::GreaterThanOrEqual, "limits.max");
        cfg.comparison_value_is_path = true;
        assert!(evaluate(&cfg, &json!({ "used": 12, "limits": { "max": 10 } })));
        assert!(!evaluate(&cfg, &json!({ "used": 2, "limits": { "max": 10 } })));
    }
}

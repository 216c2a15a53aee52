use crate::ast::Condition;
use crate::error::EvalResult;

use super::expression::{evaluate_bool, is_truthy, VariableLookup};

/// Evaluate a condition. `and`/`or` groups stop at the first operand that
/// decides the result.
pub fn evaluate(condition: &Condition, scope: &dyn VariableLookup) -> EvalResult<bool> {
    match condition {
        Condition::Literal(value) => Ok(is_truthy(value)),
        Condition::Expr(expr) => Ok(evaluate_bool(expr, scope)?),
        Condition::And(items) => {
            for item in items {
                if !evaluate(item, scope)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Condition::Or(items) => {
            for item in items {
                if evaluate(item, scope)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Condition::Not(inner) => Ok(!evaluate(inner, scope)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvalError;
    use serde_json::{json, Value};
    use std::collections::HashMap;

    fn scope() -> HashMap<String, Value> {
        let mut vars = HashMap::new();
        vars.insert("balance".to_string(), json!(100));
        vars.insert("status".to_string(), json!("active"));
        vars
    }

    fn check(condition: Value) -> EvalResult<bool> {
        evaluate(&Condition::parse(&condition)?, &scope())
    }

    #[test]
    fn test_simple_conditions() {
        assert!(check(json!("balance >= 100")).unwrap());
        assert!(check(json!("{{status}} == 'active'")).unwrap());
        assert!(!check(json!(null)).unwrap());
        assert!(check(json!(1)).unwrap());
    }

    #[test]
    fn test_compound_short_circuit() {
        // the malformed second operand is never evaluated
        assert!(!check(json!({"and": ["balance > 500", "balance <> 1"]})).unwrap());
        assert!(check(json!({"or": ["status == 'active'", "balance <> 1"]})).unwrap());
        assert!(check(json!({"not": {"and": [true, false]}})).unwrap());
        assert!(check(json!({"and": []})).unwrap());
        assert!(!check(json!({"or": []})).unwrap());
    }

    #[test]
    fn test_malformed_expression_is_an_error() {
        assert!(matches!(
            check(json!({"or": ["balance > 500", "balance <> 1"]})),
            Err(EvalError::Expression(_))
        ));
    }
}

//! `{{ }}` placeholder substitution.
//!
//! A placeholder holding a plain path is looked up; anything else is
//! evaluated as an expression. Placeholders that cannot be resolved are
//! left in the output verbatim.

use serde_json::Value;

use super::expression::{display, Expression, VariableLookup};
use super::path::is_path;

pub fn has_placeholders(text: &str) -> bool {
    text.contains("{{")
}

/// Substitute every placeholder in `text`, always producing a string.
pub fn resolve_template(text: &str, scope: &dyn VariableLookup) -> String {
    if !has_placeholders(text) {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let inner = &after_open[..end];
        match resolve_placeholder(inner, scope) {
            Some(value) => out.push_str(&display(&value)),
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after_open[end + 2..];
    }
    out.push_str(rest);
    out
}

/// Resolve a string value. A string consisting of exactly one placeholder
/// yields the placeholder's typed value.
pub fn resolve_string(text: &str, scope: &dyn VariableLookup) -> Value {
    if let Some(inner) = single_placeholder(text) {
        return resolve_placeholder(inner, scope).unwrap_or_else(|| Value::String(text.to_string()));
    }
    Value::String(resolve_template(text, scope))
}

/// Resolve a value of any shape. Strings go through [`resolve_string`],
/// arrays and objects are resolved element-wise, other values pass through.
pub fn resolve_value(value: &Value, scope: &dyn VariableLookup) -> Value {
    match value {
        Value::String(s) => resolve_string(s, scope),
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve_value(v, scope)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_value(v, scope)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn single_placeholder(text: &str) -> Option<&str> {
    let inner = text.strip_prefix("{{")?.strip_suffix("}}")?;
    if inner.contains("{{") || inner.contains("}}") {
        return None;
    }
    Some(inner)
}

fn resolve_placeholder(inner: &str, scope: &dyn VariableLookup) -> Option<Value> {
    let inner = inner.trim();
    if inner.is_empty() {
        return None;
    }
    if is_path(inner) {
        return scope.lookup(inner);
    }
    let expression = Expression::parse(inner).ok()?;
    if !expression.is_fully_bound(scope) {
        return None;
    }
    expression.evaluate(scope).ok()
}

//! `foreach`, `map`, `filter`, `while` and `repeat`.
//!
//! Loop bindings go through [`ExecutionContext::bind_local`] and are simply
//! overwritten on every pass; they are not scoped per iteration and keep
//! their last value once the loop ends.

use serde_json::{json, Value};
use tracing::debug;

use super::condition;
use super::context::ExecutionContext;
use super::expression::VariableLookup;
use super::interpreter::{execute_steps, StepFlow};
use super::path::is_path;
use crate::ast::{FilterNode, ForEachNode, IterSpec, MapNode, RepeatNode, WhileNode};
use crate::error::{EvalError, EvalResult};

/// Resolve a loop's `in` to its elements. Arrays iterate in order; objects
/// iterate their entries as `{key, value}` pairs.
pub(crate) fn collect_items(source: &Value, ctx: &ExecutionContext) -> EvalResult<Vec<Value>> {
    let resolved = match source {
        Value::String(name) if is_path(name) => ctx
            .lookup(name)
            .ok_or_else(|| EvalError::InvalidAction(format!("loop source '{}' is not set", name)))?,
        other => ctx.resolve_value(other),
    };
    match resolved {
        Value::Array(items) => Ok(items),
        Value::Object(entries) => Ok(entries
            .into_iter()
            .map(|(key, value)| json!({"key": key, "value": value}))
            .collect()),
        other => Err(EvalError::InvalidAction(format!("cannot iterate over {}", other))),
    }
}

pub(crate) fn bind_iteration(iter: &IterSpec, index: usize, item: Value, ctx: &ExecutionContext) {
    ctx.bind_local(&iter.item, item);
    if let Some(name) = &iter.index {
        ctx.bind_local(name, Value::from(index));
    }
}

/// Yields the number of iterations.
pub async fn run_foreach(node: &ForEachNode, ctx: &ExecutionContext) -> EvalResult<StepFlow> {
    let items = collect_items(&node.iter.source, ctx)?;
    let count = items.len();
    for (index, item) in items.into_iter().enumerate() {
        bind_iteration(&node.iter, index, item, ctx);
        if let StepFlow::Return(value) = execute_steps(&node.body, ctx).await? {
            return Ok(StepFlow::Return(value));
        }
    }
    debug!(item = %node.iter.item, iterations = count, "foreach finished");
    Ok(StepFlow::Continue(Value::from(count)))
}

/// Yields one element per item: the resolved `expression`, else the value
/// of the body's last step, else the item itself.
pub async fn run_map(node: &MapNode, ctx: &ExecutionContext) -> EvalResult<StepFlow> {
    let items = collect_items(&node.iter.source, ctx)?;
    let mut mapped = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        bind_iteration(&node.iter, index, item.clone(), ctx);
        let value = match &node.expression {
            Some(expression) => ctx.resolve_value(expression),
            None if node.body.is_empty() => item,
            None => match execute_steps(&node.body, ctx).await? {
                StepFlow::Return(value) => return Ok(StepFlow::Return(value)),
                StepFlow::Continue(value) => value,
            },
        };
        mapped.push(value);
    }
    Ok(StepFlow::Continue(Value::Array(mapped)))
}

pub fn run_filter(node: &FilterNode, ctx: &ExecutionContext) -> EvalResult<Value> {
    let items = collect_items(&node.iter.source, ctx)?;
    let mut kept = Vec::new();
    for (index, item) in items.into_iter().enumerate() {
        bind_iteration(&node.iter, index, item.clone(), ctx);
        if condition::evaluate(&node.condition, ctx)? {
            kept.push(item);
        }
    }
    Ok(Value::Array(kept))
}

/// Re-checks the condition before every pass. Fails with `LoopLimit` once
/// the iteration cap is reached and the condition still holds.
pub async fn run_while(node: &WhileNode, ctx: &ExecutionContext) -> EvalResult<StepFlow> {
    let limit = node
        .max_iterations
        .unwrap_or(ctx.config().max_while_iterations);
    let mut iterations = 0usize;
    while condition::evaluate(&node.condition, ctx)? {
        if iterations >= limit {
            return Err(EvalError::LoopLimit { limit });
        }
        iterations += 1;
        if let StepFlow::Return(value) = execute_steps(&node.body, ctx).await? {
            return Ok(StepFlow::Return(value));
        }
    }
    debug!(iterations, "while finished");
    Ok(StepFlow::Continue(Value::from(iterations)))
}

pub async fn run_repeat(node: &RepeatNode, ctx: &ExecutionContext) -> EvalResult<StepFlow> {
    let resolved = ctx.resolve_reference(&node.times);
    let times = resolved
        .as_u64()
        .or_else(|| resolved.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64))
        .or_else(|| resolved.as_str().and_then(|s| s.trim().parse().ok()))
        .ok_or_else(|| {
            EvalError::InvalidAction(format!(
                "repeat `times` must be a non-negative integer, got {}",
                resolved
            ))
        })?;

    for index in 0..times {
        ctx.bind_local(&node.index, Value::from(index));
        ctx.bind_local(&node.iteration, Value::from(index + 1));
        if let StepFlow::Return(value) = execute_steps(&node.body, ctx).await? {
            return Ok(StepFlow::Return(value));
        }
    }
    Ok(StepFlow::Continue(Value::from(times)))
}

//! The dispatcher: runs step lists and routes each step to its construct.

use std::time::{Duration, Instant};

use async_recursion::async_recursion;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::context::{ExecutionContext, StepRecord};
use super::expression::VariableLookup;
use super::path::is_path;
use super::{condition, loops, parallel};
use crate::ast::{Action, DomainNode, MeasureNode, SetScope, Step, TryNode};
use crate::error::{EvalError, EvalResult};
use crate::handler::DomainAction;
use crate::observer::StepEvent;

/// Outcome of a step or step list.
#[derive(Debug, Clone, PartialEq)]
pub enum StepFlow {
    /// Carry on with the next step; holds the value of the last step.
    Continue(Value),
    /// A `return` step was reached; unwind to the enclosing keyword call.
    Return(Value),
}

impl StepFlow {
    pub fn into_value(self) -> Value {
        match self {
            StepFlow::Continue(value) | StepFlow::Return(value) => value,
        }
    }

    pub fn is_return(&self) -> bool {
        matches!(self, StepFlow::Return(_))
    }
}

/// Run `steps` in order. The first error stops the list and is re-raised
/// tagged with the 1-based index of the failing step.
#[async_recursion]
pub async fn execute_steps(steps: &[Step], ctx: &ExecutionContext) -> EvalResult<StepFlow> {
    let mut last = Value::Null;
    for (position, step) in steps.iter().enumerate() {
        let index = position + 1;
        match execute_step(step, index, ctx).await.map_err(|e| e.at_step(index))? {
            StepFlow::Return(value) => return Ok(StepFlow::Return(value)),
            StepFlow::Continue(value) => last = value,
        }
    }
    Ok(StepFlow::Continue(last))
}

/// Run a single step: notify the observer, dispatch, bind `returns`, and
/// append to the result log. A failing step marked `continueOnError`
/// yields `null` instead of an error.
#[async_recursion]
pub async fn execute_step(step: &Step, index: usize, ctx: &ExecutionContext) -> EvalResult<StepFlow> {
    let label = step.describe();
    let depth = ctx.depth();
    debug!(index, depth, kind = step.action.kind(), step = %label, "dispatching step");
    ctx.observer().on_event(&StepEvent::started(index, depth, &label));

    let started = Instant::now();
    let outcome = dispatch(step, ctx).await;
    let elapsed = started.elapsed();

    if let (Ok(StepFlow::Continue(value)), Some(name)) = (&outcome, &step.returns) {
        ctx.bind_local(name, value.clone());
    }

    ctx.observer()
        .on_event(&StepEvent::finished(index, depth, &label, outcome.is_ok(), elapsed));
    if !step.action.is_control() || ctx.config().record_control_steps {
        ctx.record(StepRecord {
            index,
            depth,
            kind: step.action.kind().to_string(),
            label,
            success: outcome.is_ok(),
            error: outcome.as_ref().err().map(|e| e.to_string()),
            value: outcome.as_ref().ok().map(|flow| match flow {
                StepFlow::Continue(v) | StepFlow::Return(v) => v.clone(),
            }),
            elapsed_ms: elapsed.as_millis() as u64,
        })
        .await;
    }

    match outcome {
        Err(err) if step.continue_on_error => {
            warn!(index, error = %err, "step failed, continuing");
            Ok(StepFlow::Continue(Value::Null))
        }
        other => other,
    }
}

async fn dispatch(step: &Step, ctx: &ExecutionContext) -> EvalResult<StepFlow> {
    match &step.action {
        Action::Keyword(call) => {
            let args = call.args.iter().map(|arg| ctx.resolve_value(arg)).collect();
            Ok(StepFlow::Continue(invoke_keyword(&call.name, args, ctx).await?))
        }
        Action::If(node) => {
            if condition::evaluate(&node.condition, ctx)? {
                execute_steps(&node.then, ctx).await
            } else {
                execute_steps(&node.otherwise, ctx).await
            }
        }
        Action::ForEach(node) => loops::run_foreach(node, ctx).await,
        Action::Map(node) => loops::run_map(node, ctx).await,
        Action::Filter(node) => loops::run_filter(node, ctx).map(StepFlow::Continue),
        Action::While(node) => loops::run_while(node, ctx).await,
        Action::Repeat(node) => loops::run_repeat(node, ctx).await,
        Action::Parallel(node) => parallel::run_parallel(node, ctx).await.map(StepFlow::Continue),
        Action::Race(node) => parallel::run_race(node, ctx).await.map(StepFlow::Continue),
        Action::Batch(node) => parallel::run_batch(node, ctx).await.map(StepFlow::Continue),
        Action::ParallelForEach(node) => parallel::run_foreach(node, ctx)
            .await
            .map(StepFlow::Continue),
        Action::Try(node) => run_try(node, ctx).await,
        Action::Set { scope, names } => {
            let mut last = Value::Null;
            for (name, value) in names {
                let value = ctx.resolve_value(value);
                match scope {
                    SetScope::Global => ctx.set_variable(name, value.clone()),
                    SetScope::Local => ctx.bind_local(name, value.clone()),
                }
                last = value;
            }
            Ok(StepFlow::Continue(last))
        }
        Action::Return(value) => Ok(StepFlow::Return(ctx.resolve_value(value))),
        Action::Measure(node) => run_measure(node, ctx).await,
        Action::Domain(node) => run_domain(node, step, ctx).await.map(StepFlow::Continue),
    }
}

/// Call a keyword in a fresh frame on top of `ctx`.
///
/// The frame lives in a child context, so the caller's scope is untouched
/// whichever way the call ends. Fails with `RecursionLimit` when the call
/// would exceed the configured depth.
#[tracing::instrument(skip(args, ctx), level = "debug")]
pub async fn invoke_keyword(name: &str, args: Vec<Value>, ctx: &ExecutionContext) -> EvalResult<Value> {
    let definition = ctx
        .keywords()
        .resolve(name)
        .ok_or_else(|| EvalError::UnknownKeyword(name.to_string()))?;

    let max_depth = ctx.config().max_keyword_depth;
    if ctx.depth() + 1 > max_depth {
        return Err(EvalError::RecursionLimit {
            name: name.to_string(),
            max_depth,
        });
    }

    let frame = ctx.enter_frame(definition.bind_arguments(args));
    let flow = execute_steps(&definition.steps, &frame)
        .await
        .map_err(|e| e.in_keyword(name))?;

    let value = match flow {
        StepFlow::Return(value) => value,
        StepFlow::Continue(_) => match &definition.returns {
            Some(reference) => resolve_return_reference(reference, &frame),
            None => Value::Null,
        },
    };
    debug!(keyword = name, "keyword finished");
    Ok(value)
}

fn resolve_return_reference(reference: &str, frame: &ExecutionContext) -> Value {
    if is_path(reference) {
        return frame.lookup(reference.trim()).unwrap_or(Value::Null);
    }
    frame.resolve_reference(&Value::String(reference.to_string()))
}

/// `finally` always runs. Its own failure or `return` takes precedence over
/// the outcome of the body and `catch`.
async fn run_try(node: &TryNode, ctx: &ExecutionContext) -> EvalResult<StepFlow> {
    let outcome = match execute_steps(&node.body, ctx).await {
        Ok(flow) => Ok(flow),
        Err(err) => match &node.catch {
            Some(catch) => {
                debug!(error = %err, "caught error");
                ctx.bind_local(&node.binding, error_value(&err));
                execute_steps(catch, ctx).await
            }
            None => Err(err),
        },
    };

    if !node.finally.is_empty() {
        if let StepFlow::Return(value) = execute_steps(&node.finally, ctx).await? {
            return Ok(StepFlow::Return(value));
        }
    }
    outcome
}

/// The value a `catch` block sees for `err`.
pub fn error_value(err: &EvalError) -> Value {
    json!({
        "message": err.root_cause().to_string(),
        "kind": err.kind(),
        "trace": err.to_string(),
    })
}

async fn run_measure(node: &MeasureNode, ctx: &ExecutionContext) -> EvalResult<StepFlow> {
    if let Some(value) = &node.value {
        let resolved = ctx.resolve_value(value);
        let sample = resolved
            .as_f64()
            .or_else(|| resolved.as_str().and_then(|s| s.trim().parse().ok()))
            .ok_or_else(|| {
                EvalError::InvalidAction(format!(
                    "measure '{}' needs a numeric value, got {}",
                    node.name, resolved
                ))
            })?;
        ctx.metrics().record(&node.name, sample);
        return Ok(StepFlow::Continue(resolved));
    }

    let started = Instant::now();
    let flow = execute_steps(&node.body, ctx).await;
    let elapsed = started.elapsed();
    ctx.metrics().record(&node.name, millis(elapsed));
    debug!(metric = %node.name, elapsed_ms = millis(elapsed), "measured");
    flow
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

async fn run_domain(node: &DomainNode, step: &Step, ctx: &ExecutionContext) -> EvalResult<Value> {
    if !ctx.handler().supports(&node.name) {
        return Err(EvalError::UnknownAction { keys: step.keys() });
    }
    let action = DomainAction {
        name: node.name.clone(),
        params: ctx.resolve_value(&node.params),
        options: node
            .options
            .iter()
            .map(|(k, v)| (k.clone(), ctx.resolve_value(v)))
            .collect(),
        raw_params: node.params.clone(),
    };
    Ok(ctx.handler().handle(&action, ctx).await?)
}

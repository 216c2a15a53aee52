//! Domain actions: the injected handler seam and a few domain-neutral
//! actions every scenario can use.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::eval::context::ExecutionContext;
use crate::eval::expression::{display, is_truthy};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActionError {
    #[error("assertion failed: {message}")]
    Assertion { message: String },
    #[error("action failed: {0}")]
    Failed(String),
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
}

/// A domain action with its parameters resolved against the caller's
/// variables.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainAction {
    pub name: String,
    pub params: Value,
    /// `from`, `message` and `timeout`, resolved.
    pub options: Map<String, Value>,
    /// Parameters as written, before template substitution.
    pub raw_params: Value,
}

impl DomainAction {
    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }
}

#[async_trait]
pub trait ActionHandler: Send + Sync {
    fn supports(&self, name: &str) -> bool;

    async fn handle(&self, action: &DomainAction, ctx: &ExecutionContext) -> Result<Value, ActionError>;
}

/// Handlers tried in order; the first one that supports an action runs it.
#[derive(Default)]
pub struct HandlerChain {
    handlers: Vec<Arc<dyn ActionHandler>>,
}

impl HandlerChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, handler: Arc<dyn ActionHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn push(&mut self, handler: Arc<dyn ActionHandler>) {
        self.handlers.push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[async_trait]
impl ActionHandler for HandlerChain {
    fn supports(&self, name: &str) -> bool {
        self.handlers.iter().any(|h| h.supports(name))
    }

    async fn handle(&self, action: &DomainAction, ctx: &ExecutionContext) -> Result<Value, ActionError> {
        match self.handlers.iter().find(|h| h.supports(&action.name)) {
            Some(handler) => handler.handle(action, ctx).await,
            None => Err(ActionError::Failed(format!("no handler for '{}'", action.name))),
        }
    }
}

/// `assert`, `log`, `sleep`/`wait` and `echo`.
pub struct StandardActions;

impl StandardActions {
    pub const NAMES: &'static [&'static str] = &["assert", "log", "sleep", "wait", "echo"];

    fn assert(action: &DomainAction, ctx: &ExecutionContext) -> Result<Value, ActionError> {
        // {assert: "x == 4"} or {assert: {condition: "x == 4", message: "..."}}
        let (condition, message) = match &action.raw_params {
            Value::Object(spec) => (
                spec.get("condition")
                    .or_else(|| spec.get("that"))
                    .cloned()
                    .ok_or_else(|| ActionError::InvalidParams("assert needs a condition".to_string()))?,
                action.params.get("message").cloned(),
            ),
            other => (other.clone(), None),
        };
        let message = message.or_else(|| action.option("message").cloned());

        let passed = match &condition {
            Value::String(expr) => {
                let value = ctx
                    .evaluate_expression(expr)
                    .map_err(|e| ActionError::InvalidParams(e.to_string()))?;
                is_truthy(&value)
            }
            other => is_truthy(other),
        };
        if passed {
            return Ok(Value::Bool(true));
        }
        Err(ActionError::Assertion {
            message: match message {
                Some(m) => display(&m),
                None => display(&condition),
            },
        })
    }

    fn log(action: &DomainAction) -> Value {
        let message = match &action.params {
            Value::Object(spec) if spec.contains_key("message") => spec.get("message").map(display).unwrap_or_default(),
            other => display(other),
        };
        info!(target: "scenario", "{}", message);
        Value::String(message)
    }

    async fn sleep(action: &DomainAction) -> Result<Value, ActionError> {
        let millis = match &action.params {
            Value::Object(spec) => spec.get("ms").or_else(|| spec.get("duration")).and_then(as_millis),
            other => as_millis(other),
        }
        .ok_or_else(|| {
            ActionError::InvalidParams(format!("{} expects milliseconds, got {}", action.name, action.params))
        })?;
        debug!(millis, "sleeping");
        tokio::time::sleep(Duration::from_millis(millis)).await;
        Ok(Value::Null)
    }
}

fn as_millis(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

#[async_trait]
impl ActionHandler for StandardActions {
    fn supports(&self, name: &str) -> bool {
        Self::NAMES.contains(&name)
    }

    async fn handle(&self, action: &DomainAction, ctx: &ExecutionContext) -> Result<Value, ActionError> {
        match action.name.as_str() {
            "assert" => Self::assert(action, ctx),
            "log" => Ok(Self::log(action)),
            "sleep" | "wait" => Self::sleep(action).await,
            "echo" => Ok(action.params.clone()),
            other => Err(ActionError::Failed(format!("unsupported standard action '{}'", other))),
        }
    }
}

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::expression::{self, ExpressionError, VariableLookup};
use super::path::{get_path, parse_path, PathSegment};
use super::template;
use crate::config::EngineConfig;
use crate::handler::{ActionHandler, StandardActions};
use crate::keyword::KeywordRegistry;
use crate::metrics::MetricsStore;
use crate::observer::{StepObserver, TracingObserver};

type Frame = Arc<DashMap<String, Value>>;

/// One entry of the append-only result log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    /// 1-based position within its step list.
    pub index: usize,
    /// Keyword nesting depth the step ran at.
    pub depth: usize,
    pub kind: String,
    pub label: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    pub elapsed_ms: u64,
}

/// State shared by reference between a context, its keyword frames and its
/// forks.
pub struct SharedContext {
    config: EngineConfig,
    handler: Arc<dyn ActionHandler>,
    keywords: Arc<KeywordRegistry>,
    observer: Arc<dyn StepObserver>,
    results: RwLock<Vec<StepRecord>>,
    metrics: MetricsStore,
}

impl SharedContext {
    pub fn new(handler: Arc<dyn ActionHandler>) -> Self {
        Self {
            config: EngineConfig::default(),
            handler,
            keywords: Arc::new(KeywordRegistry::new()),
            observer: Arc::new(TracingObserver),
            results: RwLock::new(Vec::new()),
            metrics: MetricsStore::new(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_keywords(mut self, keywords: Arc<KeywordRegistry>) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn StepObserver>) -> Self {
        self.observer = observer;
        self
    }
}

/// Variables visible to a running step list.
///
/// Globals are shared with every keyword frame entered from this context.
/// Each keyword call gets a child context with one more frame on top; the
/// caller's context is never modified, so dropping the child restores the
/// caller's view on every exit path.
pub struct ExecutionContext {
    globals: Frame,
    frames: Vec<Frame>,
    shared: Arc<SharedContext>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new(SharedContext::new(Arc::new(StandardActions)))
    }
}

impl ExecutionContext {
    pub fn new(shared: SharedContext) -> Self {
        Self {
            globals: Arc::new(DashMap::new()),
            frames: Vec::new(),
            shared: Arc::new(shared),
        }
    }

    /// Global variable, `None` when unset.
    pub fn get_variable(&self, name: &str) -> Option<Value> {
        self.globals.get(name).map(|v| v.clone())
    }

    #[tracing::instrument(skip(self, value), level = "debug")]
    pub fn set_variable(&self, name: &str, value: Value) {
        self.globals.insert(name.to_string(), value);
    }

    pub fn remove_variable(&self, name: &str) -> Option<Value> {
        self.globals.remove(name).map(|(_, v)| v)
    }

    /// Bind into the current keyword frame, or globals at top level.
    pub fn bind_local(&self, name: &str, value: Value) {
        match self.frames.last() {
            Some(frame) => {
                frame.insert(name.to_string(), value);
            }
            None => self.set_variable(name, value),
        }
    }

    pub fn unbind_local(&self, name: &str) {
        match self.frames.last() {
            Some(frame) => {
                frame.remove(name);
            }
            None => {
                self.globals.remove(name);
            }
        }
    }

    /// Number of keyword frames above the top level.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Child context for a keyword call with `bindings` as its frame.
    pub(crate) fn enter_frame(&self, bindings: Map<String, Value>) -> Self {
        let mut frames = self.frames.clone();
        frames.push(Arc::new(bindings.into_iter().collect()));
        debug!(depth = frames.len(), "entering keyword frame");
        Self {
            globals: self.globals.clone(),
            frames,
            shared: self.shared.clone(),
        }
    }

    /// Copy of the variable layer for a concurrent operation. Writes made
    /// through the fork are not seen by this context; handler, keywords,
    /// result log and metrics stay shared.
    pub fn fork(&self) -> Self {
        Self {
            globals: Arc::new(copy_frame(&self.globals)),
            frames: self.frames.iter().map(|f| Arc::new(copy_frame(f))).collect(),
            shared: self.shared.clone(),
        }
    }

    /// Snapshot of the global variables.
    pub fn globals(&self) -> Map<String, Value> {
        self.globals
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Snapshot of everything visible from here: globals overlaid with the
    /// current frame.
    pub fn visible_variables(&self) -> Map<String, Value> {
        let mut visible = self.globals();
        if let Some(frame) = self.frames.last() {
            for entry in frame.iter() {
                visible.insert(entry.key().clone(), entry.value().clone());
            }
        }
        visible
    }

    /// Resolve a string through template substitution; other values pass
    /// through unchanged.
    pub fn resolve_reference(&self, value: &Value) -> Value {
        match value {
            Value::String(text) => template::resolve_string(text, self),
            other => other.clone(),
        }
    }

    /// Resolve strings anywhere inside `value`.
    pub fn resolve_value(&self, value: &Value) -> Value {
        template::resolve_value(value, self)
    }

    pub fn resolve_template(&self, text: &str) -> String {
        template::resolve_template(text, self)
    }

    pub fn evaluate_expression(&self, expr: &str) -> Result<Value, ExpressionError> {
        expression::evaluate(expr, self)
    }

    pub async fn record(&self, record: StepRecord) {
        self.shared.results.write().await.push(record);
    }

    pub async fn results(&self) -> Vec<StepRecord> {
        self.shared.results.read().await.clone()
    }

    pub fn metrics(&self) -> &MetricsStore {
        &self.shared.metrics
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    pub fn handler(&self) -> &dyn ActionHandler {
        self.shared.handler.as_ref()
    }

    pub fn keywords(&self) -> &KeywordRegistry {
        &self.shared.keywords
    }

    pub fn observer(&self) -> &dyn StepObserver {
        self.shared.observer.as_ref()
    }
}

impl VariableLookup for ExecutionContext {
    fn lookup(&self, path: &str) -> Option<Value> {
        let (root, segments) = parse_path(path)?;
        if let Some(frame) = self.frames.last() {
            if let Some(value) = frame.get(&root) {
                return get_path(value.value(), &segments).cloned();
            }
        }
        if let Some(value) = self.globals.get(&root) {
            return get_path(value.value(), &segments).cloned();
        }
        builtin(&root, &segments)
    }
}

fn builtin(root: &str, segments: &[PathSegment]) -> Option<Value> {
    match (root, segments) {
        ("now", []) => Some(Value::from(Utc::now().timestamp_millis())),
        ("timestamp", []) => Some(Value::String(Utc::now().to_rfc3339())),
        ("uuid", []) => Some(Value::String(Uuid::new_v4().to_string())),
        ("env", [PathSegment::Key(name)]) => std::env::var(name).ok().map(Value::String),
        _ => None,
    }
}

fn copy_frame(frame: &DashMap<String, Value>) -> DashMap<String, Value> {
    frame
        .iter()
        .map(|e| (e.key().clone(), e.value().clone()))
        .collect()
}

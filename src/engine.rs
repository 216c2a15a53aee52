use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::dataset::{DatasetSource, FileDatasetSource};
use crate::error::{EvalError, InternalResult};
use crate::eval::data_driven::{run_for_each_row, DataDrivenSummary};
use crate::eval::{execute_step, execute_steps, ExecutionContext, SharedContext, StepFlow, StepRecord};
use crate::handler::{ActionHandler, HandlerChain, StandardActions};
use crate::keyword::{KeywordLibrary, KeywordRegistry};
use crate::metrics::MetricSummary;
use crate::observer::{StepObserver, TracingObserver};
use crate::scenario::Scenario;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportError {
    pub message: String,
    pub kind: String,
}

impl From<&EvalError> for ReportError {
    fn from(err: &EvalError) -> Self {
        Self {
            message: err.to_string(),
            kind: err.kind().to_string(),
        }
    }
}

/// Outcome of one scenario run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioReport {
    pub name: String,
    pub success: bool,
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ReportError>,
    /// Every failure swallowed by scenario-level `continueOnError`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ReportError>,
    pub steps: Vec<StepRecord>,
    pub metrics: BTreeMap<String, MetricSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<DataDrivenSummary>,
    pub variables: Map<String, Value>,
    pub elapsed_ms: u64,
}

/// Runs scenarios against a fixed set of handlers, keyword libraries and
/// configuration. Every run gets its own variables, registry and result
/// log.
pub struct Engine {
    config: EngineConfig,
    handler: Arc<dyn ActionHandler>,
    libraries: Vec<Arc<dyn KeywordLibrary>>,
    observer: Arc<dyn StepObserver>,
    datasets: Arc<dyn DatasetSource>,
}

impl Default for Engine {
    fn default() -> Self {
        EngineBuilder::new().build()
    }
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A fresh context wired to this engine, with an empty keyword registry
    /// backed by the engine's libraries.
    pub fn new_context(&self) -> ExecutionContext {
        self.context_with(KeywordRegistry::with_libraries(self.libraries.clone()))
    }

    fn context_with(&self, registry: KeywordRegistry) -> ExecutionContext {
        let shared = SharedContext::new(self.handler.clone())
            .with_config(self.config.clone())
            .with_keywords(Arc::new(registry))
            .with_observer(self.observer.clone());
        ExecutionContext::new(shared)
    }

    /// Run `scenario` to completion.
    ///
    /// Step failures are reported in the returned [`ScenarioReport`]; only
    /// setup problems (an invalid keyword, an unreadable dataset) come back
    /// as `Err`.
    #[tracing::instrument(skip_all, fields(scenario = %scenario.name))]
    pub async fn run(&self, scenario: &Scenario) -> InternalResult<ScenarioReport> {
        let registry = KeywordRegistry::with_libraries(self.libraries.clone());
        for (name, definition) in &scenario.keywords {
            registry.register(name, definition.clone())?;
        }
        let ctx = self.context_with(registry);
        for (name, value) in &scenario.variables {
            let resolved = ctx.resolve_value(value);
            ctx.set_variable(name, resolved);
        }

        let started = Instant::now();
        let mut value = Value::Null;
        let mut error = None;
        let mut failures = Vec::new();
        let mut rows = None;

        match &scenario.data {
            Some(spec) => {
                let dataset = self.datasets.load(spec).await?;
                match run_for_each_row(&dataset, &scenario.steps, &ctx, scenario.continue_on_error).await {
                    Ok(summary) => {
                        failures = summary
                            .rows
                            .iter()
                            .filter_map(|row| {
                                row.error.as_ref().map(|message| ReportError {
                                    message: format!("row {}: {}", row.index, message),
                                    kind: "RowError".to_string(),
                                })
                            })
                            .collect();
                        rows = Some(summary);
                    }
                    Err(err) => error = Some(ReportError::from(&err)),
                }
            }
            None if scenario.continue_on_error => {
                for (index, step) in scenario.steps.iter().enumerate() {
                    match execute_step(step, index + 1, &ctx).await {
                        Ok(StepFlow::Continue(v)) => value = v,
                        Ok(StepFlow::Return(v)) => {
                            value = v;
                            break;
                        }
                        Err(err) => {
                            let err = err.at_step(index + 1);
                            warn!(error = %err, "scenario step failed, continuing");
                            failures.push(ReportError::from(&err));
                        }
                    }
                }
            }
            None => match execute_steps(&scenario.steps, &ctx).await {
                Ok(flow) => value = flow.into_value(),
                Err(err) => error = Some(ReportError::from(&err)),
            },
        }

        let report = ScenarioReport {
            name: scenario.name.clone(),
            success: error.is_none() && failures.is_empty(),
            value,
            error,
            failures,
            steps: ctx.results().await,
            metrics: ctx.metrics().summaries(),
            rows,
            variables: ctx.globals(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            success = report.success,
            steps = report.steps.len(),
            elapsed_ms = report.elapsed_ms,
            "scenario finished"
        );
        Ok(report)
    }
}

pub struct EngineBuilder {
    config: EngineConfig,
    handlers: HandlerChain,
    standard_actions: bool,
    libraries: Vec<Arc<dyn KeywordLibrary>>,
    observer: Arc<dyn StepObserver>,
    datasets: Arc<dyn DatasetSource>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            handlers: HandlerChain::new(),
            standard_actions: true,
            libraries: Vec::new(),
            observer: Arc::new(TracingObserver),
            datasets: Arc::new(FileDatasetSource::new()),
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Handlers are consulted in the order they were added, before the
    /// standard actions.
    pub fn handler(mut self, handler: Arc<dyn ActionHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn without_standard_actions(mut self) -> Self {
        self.standard_actions = false;
        self
    }

    pub fn library(mut self, library: Arc<dyn KeywordLibrary>) -> Self {
        self.libraries.push(library);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn StepObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn dataset_source(mut self, source: Arc<dyn DatasetSource>) -> Self {
        self.datasets = source;
        self
    }

    pub fn build(self) -> Engine {
        let mut handlers = self.handlers;
        if self.standard_actions {
            handlers.push(Arc::new(StandardActions));
        }
        Engine {
            config: self.config,
            handler: Arc::new(handlers),
            libraries: self.libraries,
            observer: self.observer,
            datasets: self.datasets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyword::StaticKeywordLibrary;
    use crate::keyword::KeywordDefinition;
    use crate::ast::parse_steps;
    use serde_json::json;

    fn scenario(value: Value) -> Scenario {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_run_plain_steps() {
        let engine = Engine::default();
        let report = engine
            .run(&scenario(json!({
                "name": "sum",
                "variables": {"base": 2, "double": "{{base * 2}}"},
                "keywords": {"add": {"params": ["a", "b"], "steps": [{"return": "{{a + b}}"}]}},
                "steps": [
                    {"run": "add", "args": ["{{double}}", 1], "returns": "total"},
                    {"assert": "total == 5"},
                    {"echo": "{{total}}"}
                ]
            })))
            .await
            .unwrap();
        assert!(report.success);
        assert_eq!(report.value, json!(5));
        assert_eq!(report.variables.get("double"), Some(&json!(4)));
        assert_eq!(report.steps.len(), 3);
        assert!(report.error.is_none());
    }

    #[tokio::test]
    async fn test_failure_is_reported_not_returned() {
        let engine = Engine::default();
        let report = engine
            .run(&scenario(json!({
                "name": "broken",
                "steps": [{"log": "start"}, {"transfer": {"to": "bob"}}, {"log": "never"}]
            })))
            .await
            .unwrap();
        assert!(!report.success);
        let error = report.error.unwrap();
        assert_eq!(error.kind, "UnknownActionError");
        assert!(error.message.starts_with("step 2:"));
        assert_eq!(report.steps.len(), 2);
    }

    #[tokio::test]
    async fn test_scenario_continue_on_error() {
        let engine = Engine::default();
        let report = engine
            .run(&scenario(json!({
                "name": "lenient",
                "continueOnError": true,
                "steps": [{"assert": false}, {"echo": "after"}]
            })))
            .await
            .unwrap();
        assert!(!report.success);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, "AssertionError");
        assert_eq!(report.value, json!("after"));
    }

    #[tokio::test]
    async fn test_data_driven_scenario() {
        let engine = Engine::default();
        let report = engine
            .run(&scenario(json!({
                "name": "rows",
                "data": {"rows": [{"n": 1}, {"n": 2}]},
                "steps": [{"measure": {"name": "n", "value": "{{row.n}}"}}]
            })))
            .await
            .unwrap();
        assert!(report.success);
        let rows = report.rows.unwrap();
        assert_eq!(rows.passed, 2);
        assert_eq!(report.metrics["n"].total, 3.0);
    }

    #[tokio::test]
    async fn test_library_keywords_and_fresh_contexts() {
        let library = StaticKeywordLibrary::new().with(
            "ping",
            KeywordDefinition::new("", vec![], parse_steps(&json!([{"return": "pong"}])).unwrap()),
        );
        let engine = Engine::builder().library(Arc::new(library)).build();
        let ctx = engine.new_context();
        let flow = execute_steps(&parse_steps(&json!([{"run": "ping"}])).unwrap(), &ctx)
            .await
            .unwrap();
        assert_eq!(flow.into_value(), json!("pong"));
        assert_eq!(engine.new_context().results().await.len(), 0);
    }

    #[tokio::test]
    async fn test_invalid_keyword_is_a_setup_error() {
        let mut bad = scenario(json!({"name": "bad", "steps": [{"log": "x"}]}));
        bad.keywords
            .insert("empty".to_string(), KeywordDefinition::new("", vec![], vec![]));
        assert!(matches!(
            Engine::default().run(&bad).await,
            Err(crate::Error::Eval(EvalError::InvalidKeyword { .. }))
        ));
    }
}

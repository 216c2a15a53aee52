//! Scenario steps as a closed sum type.
//!
//! Steps arrive as loose JSON/YAML objects whose kind is given by which key
//! is present. They are parsed once into [`Action`] and dispatched by
//! pattern matching afterwards.
//!
//! Dispatch priority, first match wins:
//! 1. `run` / `keyword`
//! 2. `if`
//! 3. `foreach` / `map` / `filter`
//! 4. `while`
//! 5. `repeat`
//! 6. `parallel` (array, config, `race`, `batch` and `forEach` forms)
//! 7. `try`
//! 8. `set` / `let`
//! 9. `return`
//! 10. `measure`
//! 11. a single remaining key, handed to the injected action handler

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{EvalError, EvalResult};

pub type Steps = Vec<Step>;

/// Keys that modify a step instead of selecting its kind.
pub const AUXILIARY_KEYS: &[&str] = &["returns", "assign", "continueOnError", "name", "description"];

/// Keys forwarded untouched to domain handlers.
pub const OPTION_KEYS: &[&str] = &["from", "message", "timeout"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Step {
    pub action: Action,
    /// Variable receiving the step's value (`returns` or `assign`).
    pub returns: Option<String>,
    pub continue_on_error: bool,
    pub label: Option<String>,
    raw: Value,
}

impl Step {
    pub fn parse(value: &Value) -> EvalResult<Self> {
        let node = value
            .as_object()
            .ok_or_else(|| EvalError::InvalidAction(format!("step must be an object, got {}", value)))?;

        let returns = match node.get("returns").or_else(|| node.get("assign")) {
            None | Some(Value::Null) => None,
            Some(Value::String(name)) => Some(strip_braces(name).to_string()),
            Some(other) => {
                return Err(EvalError::InvalidAction(format!(
                    "`returns` must be a variable name, got {}",
                    other
                )))
            }
        };
        let continue_on_error = node
            .get("continueOnError")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let label = node
            .get("name")
            .or_else(|| node.get("description"))
            .and_then(Value::as_str)
            .map(String::from);

        Ok(Self {
            action: Action::parse(node)?,
            returns,
            continue_on_error,
            label,
            raw: value.clone(),
        })
    }

    /// The node as it was written.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Keys of the original node, used in unknown-action errors.
    pub fn keys(&self) -> Vec<String> {
        self.raw
            .as_object()
            .map(|node| node.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Short human-readable rendering for observers and the result log.
    pub fn describe(&self) -> String {
        if let Some(label) = &self.label {
            return label.clone();
        }
        match &self.action {
            Action::Keyword(call) => format!("run {}", call.name),
            Action::Domain(node) => node.name.clone(),
            Action::Set { scope, names } => format!("{} {}", scope.as_str(), names_of(names)),
            other => other.kind().to_string(),
        }
    }
}

fn names_of(values: &[(String, Value)]) -> String {
    values
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl TryFrom<Value> for Step {
    type Error = EvalError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Step::parse(&value)
    }
}

impl From<Step> for Value {
    fn from(step: Step) -> Self {
        step.raw
    }
}

/// Parse a step list. A single object is accepted as a one-step list and
/// `null` as an empty one.
pub fn parse_steps(value: &Value) -> EvalResult<Steps> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items.iter().map(Step::parse).collect(),
        Value::Object(_) => Ok(vec![Step::parse(value)?]),
        other => Err(EvalError::InvalidAction(format!(
            "expected a list of steps, got {}",
            other
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Action {
    Keyword(KeywordCall),
    If(IfNode),
    #[strum(serialize = "foreach")]
    ForEach(ForEachNode),
    Map(MapNode),
    Filter(FilterNode),
    While(WhileNode),
    Repeat(RepeatNode),
    Parallel(ParallelNode),
    Race(RaceNode),
    Batch(BatchNode),
    #[strum(serialize = "parallel_foreach")]
    ParallelForEach(ParallelForEachNode),
    Try(TryNode),
    Set {
        scope: SetScope,
        names: Vec<(String, Value)>,
    },
    Return(Value),
    Measure(MeasureNode),
    Domain(DomainNode),
}

impl Action {
    pub fn kind(&self) -> &'static str {
        self.into()
    }

    /// `set`, `let` and `return` only touch variables.
    pub fn is_control(&self) -> bool {
        matches!(self, Action::Set { .. } | Action::Return(_))
    }

    fn parse(node: &Map<String, Value>) -> EvalResult<Self> {
        if let Some(name) = node.get("run").or_else(|| node.get("keyword")) {
            return KeywordCall::parse(name, node).map(Action::Keyword);
        }
        if let Some(condition) = node.get("if") {
            return IfNode::parse(condition, node).map(Action::If);
        }
        if let Some(spec) = node.get("foreach") {
            let spec = object(spec, "foreach")?;
            return Ok(Action::ForEach(ForEachNode {
                iter: IterSpec::parse(spec, "foreach")?,
                body: parse_steps(field(spec, "do"))?,
            }));
        }
        if let Some(spec) = node.get("map") {
            let spec = object(spec, "map")?;
            return Ok(Action::Map(MapNode {
                iter: IterSpec::parse(spec, "map")?,
                body: parse_steps(field(spec, "do"))?,
                expression: spec.get("expression").cloned(),
            }));
        }
        if let Some(spec) = node.get("filter") {
            let spec = object(spec, "filter")?;
            let condition = spec.get("condition").ok_or_else(|| missing("filter", "condition"))?;
            return Ok(Action::Filter(FilterNode {
                iter: IterSpec::parse(spec, "filter")?,
                condition: Condition::parse(condition)?,
            }));
        }
        if let Some(spec) = node.get("while") {
            let spec = object(spec, "while")?;
            let condition = spec.get("condition").ok_or_else(|| missing("while", "condition"))?;
            return Ok(Action::While(WhileNode {
                condition: Condition::parse(condition)?,
                body: parse_steps(field(spec, "do"))?,
                max_iterations: opt_usize(spec, "maxIterations")?,
            }));
        }
        if let Some(spec) = node.get("repeat") {
            let spec = object(spec, "repeat")?;
            return Ok(Action::Repeat(RepeatNode {
                times: spec.get("times").cloned().ok_or_else(|| missing("repeat", "times"))?,
                body: parse_steps(field(spec, "do"))?,
                index: opt_string(spec, "index").unwrap_or_else(|| "index".to_string()),
                iteration: opt_string(spec, "iteration").unwrap_or_else(|| "iteration".to_string()),
            }));
        }
        if let Some(spec) = node.get("parallel") {
            return parse_parallel(spec);
        }
        if let Some(body) = node.get("try") {
            return Ok(Action::Try(TryNode {
                body: parse_steps(body)?,
                catch: node.get("catch").map(parse_steps).transpose()?,
                finally: parse_steps(field(node, "finally"))?,
                binding: opt_string(node, "as").unwrap_or_else(|| "error".to_string()),
            }));
        }
        if let Some(spec) = node.get("set") {
            return parse_assignments(spec, node, SetScope::Global).map(|names| Action::Set {
                scope: SetScope::Global,
                names,
            });
        }
        if let Some(spec) = node.get("let") {
            return parse_assignments(spec, node, SetScope::Local).map(|names| Action::Set {
                scope: SetScope::Local,
                names,
            });
        }
        if let Some(value) = node.get("return") {
            return Ok(Action::Return(value.clone()));
        }
        if let Some(spec) = node.get("measure") {
            return MeasureNode::parse(spec).map(Action::Measure);
        }

        let candidates: Vec<&String> = node
            .keys()
            .filter(|k| !AUXILIARY_KEYS.contains(&k.as_str()) && !OPTION_KEYS.contains(&k.as_str()))
            .collect();
        match candidates.as_slice() {
            [name] => {
                let options = node
                    .iter()
                    .filter(|(k, _)| OPTION_KEYS.contains(&k.as_str()))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                Ok(Action::Domain(DomainNode {
                    name: (*name).clone(),
                    params: node.get(*name).cloned().unwrap_or(Value::Null),
                    options,
                }))
            }
            _ => Err(EvalError::UnknownAction {
                keys: node.keys().cloned().collect(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeywordCall {
    pub name: String,
    pub args: Vec<Value>,
}

impl KeywordCall {
    fn parse(name: &Value, node: &Map<String, Value>) -> EvalResult<Self> {
        let name = name
            .as_str()
            .ok_or_else(|| EvalError::InvalidAction(format!("keyword name must be a string, got {}", name)))?;
        let args = match node.get("args").or_else(|| node.get("params")) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.clone(),
            Some(other) => vec![other.clone()],
        };
        Ok(Self {
            name: name.to_string(),
            args,
        })
    }
}

/// A boolean test: literal, expression string or a compound group.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Literal(Value),
    Expr(String),
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    pub fn parse(value: &Value) -> EvalResult<Self> {
        match value {
            Value::String(expr) => Ok(Condition::Expr(expr.clone())),
            Value::Bool(_) | Value::Number(_) | Value::Null => Ok(Condition::Literal(value.clone())),
            Value::Object(group) => {
                if let Some(items) = group.get("and") {
                    Ok(Condition::And(Self::parse_group(items, "and")?))
                } else if let Some(items) = group.get("or") {
                    Ok(Condition::Or(Self::parse_group(items, "or")?))
                } else if let Some(inner) = group.get("not") {
                    Ok(Condition::Not(Box::new(Self::parse(inner)?)))
                } else {
                    Err(EvalError::InvalidAction(format!(
                        "condition object needs `and`, `or` or `not`, got {}",
                        value
                    )))
                }
            }
            Value::Array(_) => Err(EvalError::InvalidAction(format!(
                "condition must not be a bare list: {}",
                value
            ))),
        }
    }

    fn parse_group(items: &Value, op: &str) -> EvalResult<Vec<Condition>> {
        items
            .as_array()
            .ok_or_else(|| EvalError::InvalidAction(format!("`{}` expects a list of conditions", op)))?
            .iter()
            .map(Self::parse)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfNode {
    pub condition: Condition,
    pub then: Steps,
    pub otherwise: Steps,
}

impl IfNode {
    fn parse(condition: &Value, node: &Map<String, Value>) -> EvalResult<Self> {
        // nested form: {if: {condition, then, else}}
        if let Some(nested) = condition.as_object().filter(|o| o.contains_key("condition")) {
            return Ok(Self {
                condition: Condition::parse(field(nested, "condition"))?,
                then: parse_steps(field(nested, "then"))?,
                otherwise: parse_steps(field(nested, "else"))?,
            });
        }
        Ok(Self {
            condition: Condition::parse(condition)?,
            then: parse_steps(field(node, "then"))?,
            otherwise: parse_steps(field(node, "else"))?,
        })
    }
}

/// Loop variable names plus the collection to iterate.
#[derive(Debug, Clone, PartialEq)]
pub struct IterSpec {
    pub item: String,
    pub index: Option<String>,
    pub source: Value,
}

impl IterSpec {
    fn parse(spec: &Map<String, Value>, construct: &str) -> EvalResult<Self> {
        Ok(Self {
            item: opt_string(spec, "item").unwrap_or_else(|| "item".to_string()),
            index: opt_string(spec, "index"),
            source: spec.get("in").cloned().ok_or_else(|| missing(construct, "in"))?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForEachNode {
    pub iter: IterSpec,
    pub body: Steps,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapNode {
    pub iter: IterSpec,
    pub body: Steps,
    /// Value template producing each element; overrides `body` when set.
    pub expression: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterNode {
    pub iter: IterSpec,
    pub condition: Condition,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileNode {
    pub condition: Condition,
    pub body: Steps,
    pub max_iterations: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RepeatNode {
    pub times: Value,
    pub body: Steps,
    pub index: String,
    pub iteration: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParallelNode {
    pub actions: Steps,
    pub max_concurrency: Option<usize>,
    pub fail_fast: Option<bool>,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RaceNode {
    pub actions: Steps,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchNode {
    pub actions: Steps,
    pub size: Option<usize>,
    pub delay: Option<Duration>,
    pub max_retries: Option<u32>,
    pub retry_delay: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParallelForEachNode {
    pub iter: IterSpec,
    pub body: Steps,
    pub max_concurrency: Option<usize>,
    pub fail_fast: Option<bool>,
    pub timeout: Option<Duration>,
}

fn parse_parallel(spec: &Value) -> EvalResult<Action> {
    let config = match spec {
        Value::Array(_) => {
            return Ok(Action::Parallel(ParallelNode {
                actions: parse_steps(spec)?,
                max_concurrency: None,
                fail_fast: None,
                timeout: None,
            }))
        }
        Value::Object(config) => config,
        other => {
            return Err(EvalError::InvalidAction(format!(
                "`parallel` expects a list or an object, got {}",
                other
            )))
        }
    };

    if let Some(race) = config.get("race") {
        let (actions, timeout) = match race {
            Value::Object(inner) => (field(inner, "actions"), opt_duration(inner, "timeout")?),
            other => (other, None),
        };
        return Ok(Action::Race(RaceNode {
            actions: parse_steps(actions)?,
            timeout: timeout.or(opt_duration(config, "timeout")?),
        }));
    }

    if let Some(batch) = config.get("batch") {
        let (actions, settings) = match batch {
            Value::Object(inner) => (field(inner, "actions"), inner),
            other => (other, config),
        };
        return Ok(Action::Batch(BatchNode {
            actions: parse_steps(actions)?,
            size: opt_usize(settings, "size")?,
            delay: opt_duration(settings, "delay")?,
            max_retries: opt_usize(settings, "maxRetries")?.map(|n| n as u32),
            retry_delay: opt_duration(settings, "retryDelay")?,
        }));
    }

    if let Some(for_each) = config.get("forEach") {
        let inner = object(for_each, "parallel.forEach")?;
        return Ok(Action::ParallelForEach(ParallelForEachNode {
            iter: IterSpec::parse(inner, "parallel.forEach")?,
            body: parse_steps(field(inner, "do"))?,
            max_concurrency: opt_usize(inner, "maxConcurrency")?.or(opt_usize(config, "maxConcurrency")?),
            fail_fast: opt_bool(inner, "failFast").or(opt_bool(config, "failFast")),
            timeout: opt_duration(inner, "timeout")?.or(opt_duration(config, "timeout")?),
        }));
    }

    if let Some(actions) = config.get("actions") {
        return Ok(Action::Parallel(ParallelNode {
            actions: parse_steps(actions)?,
            max_concurrency: opt_usize(config, "maxConcurrency")?,
            fail_fast: opt_bool(config, "failFast"),
            timeout: opt_duration(config, "timeout")?,
        }));
    }

    Err(EvalError::InvalidAction(format!(
        "`parallel` object needs `actions`, `race`, `batch` or `forEach`, got keys [{}]",
        config.keys().cloned().collect::<Vec<_>>().join(", ")
    )))
}

#[derive(Debug, Clone, PartialEq)]
pub struct TryNode {
    pub body: Steps,
    /// `None` when no `catch` was given; the error then propagates after
    /// `finally` has run.
    pub catch: Option<Steps>,
    pub finally: Steps,
    /// Variable the caught error is bound to.
    pub binding: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetScope {
    /// `set`: global variables.
    Global,
    /// `let`: the current keyword frame, globals at top level.
    Local,
}

impl SetScope {
    pub fn as_str(self) -> &'static str {
        match self {
            SetScope::Global => "set",
            SetScope::Local => "let",
        }
    }
}

fn parse_assignments(
    spec: &Value,
    node: &Map<String, Value>,
    scope: SetScope,
) -> EvalResult<Vec<(String, Value)>> {
    match spec {
        Value::Object(values) => Ok(values.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        Value::String(name) => {
            let value = node.get("value").cloned().ok_or_else(|| missing(scope.as_str(), "value"))?;
            Ok(vec![(strip_braces(name).to_string(), value)])
        }
        other => Err(EvalError::InvalidAction(format!(
            "`{}` expects an object or a variable name, got {}",
            scope.as_str(),
            other
        ))),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeasureNode {
    pub name: String,
    pub body: Steps,
    /// Explicit sample to record instead of timing `body`.
    pub value: Option<Value>,
}

impl MeasureNode {
    fn parse(spec: &Value) -> EvalResult<Self> {
        let spec = object(spec, "measure")?;
        let name = opt_string(spec, "name").ok_or_else(|| missing("measure", "name"))?;
        let value = spec.get("value").cloned();
        let body = parse_steps(field(spec, "do"))?;
        if value.is_none() && body.is_empty() {
            return Err(EvalError::InvalidAction(format!(
                "measure '{}' needs either `do` or `value`",
                name
            )));
        }
        Ok(Self { name, body, value })
    }
}

/// A step handed to the injected action handler, before resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainNode {
    pub name: String,
    pub params: Value,
    pub options: Map<String, Value>,
}

static NULL: Value = Value::Null;

fn field<'a>(node: &'a Map<String, Value>, key: &str) -> &'a Value {
    node.get(key).unwrap_or(&NULL)
}

fn object<'a>(value: &'a Value, construct: &str) -> EvalResult<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| EvalError::InvalidAction(format!("`{}` expects an object, got {}", construct, value)))
}

fn missing(construct: &str, key: &str) -> EvalError {
    EvalError::InvalidAction(format!("`{}` is missing `{}`", construct, key))
}

fn opt_string(node: &Map<String, Value>, key: &str) -> Option<String> {
    node.get(key).and_then(Value::as_str).map(String::from)
}

fn opt_bool(node: &Map<String, Value>, key: &str) -> Option<bool> {
    node.get(key).and_then(Value::as_bool)
}

fn opt_usize(node: &Map<String, Value>, key: &str) -> EvalResult<Option<usize>> {
    match node.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
            .map(|n| Some(n as usize))
            .ok_or_else(|| {
                EvalError::InvalidAction(format!("`{}` must be a non-negative integer, got {}", key, value))
            }),
    }
}

/// Durations are written as milliseconds.
fn opt_duration(node: &Map<String, Value>, key: &str) -> EvalResult<Option<Duration>> {
    Ok(opt_usize(node, key)?.map(|ms| Duration::from_millis(ms as u64)))
}

/// `{{name}}` and `name` both name the variable `name`.
fn strip_braces(name: &str) -> &str {
    let trimmed = name.trim();
    trimmed
        .strip_prefix("{{")
        .and_then(|s| s.strip_suffix("}}"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn parse(value: Value) -> Step {
        Step::parse(&value).unwrap()
    }

    #[test]
    fn test_keyword_wins_over_domain_shape() {
        let step = parse(json!({"run": "transfer", "transfer": {"to": "bob"}, "args": [1, 2], "returns": "tx"}));
        assert_eq!(
            step.action,
            Action::Keyword(KeywordCall {
                name: "transfer".to_string(),
                args: vec![json!(1), json!(2)],
            })
        );
        assert_eq!(step.returns.as_deref(), Some("tx"));
    }

    #[test]
    fn test_keyword_named_params() {
        let step = parse(json!({"keyword": "login", "params": {"user": "alice"}}));
        assert_eq!(
            step.action,
            Action::Keyword(KeywordCall {
                name: "login".to_string(),
                args: vec![json!({"user": "alice"})],
            })
        );
    }

    #[test]
    fn test_if_forms() {
        let flat = parse(json!({"if": "x > 1", "then": [{"log": "big"}], "else": {"log": "small"}}));
        let nested = parse(json!({"if": {"condition": "x > 1", "then": [{"log": "big"}], "else": [{"log": "small"}]}}));
        assert_eq!(flat.action, nested.action);
        let Action::If(node) = flat.action else {
            panic!("expected if");
        };
        assert_eq!(node.condition, Condition::Expr("x > 1".to_string()));
        assert_eq!(node.otherwise.len(), 1);
    }

    #[test]
    fn test_compound_condition() {
        let condition = Condition::parse(&json!({"and": ["a", {"or": [true, {"not": "b"}]}]})).unwrap();
        assert_eq!(
            condition,
            Condition::And(vec![
                Condition::Expr("a".to_string()),
                Condition::Or(vec![
                    Condition::Literal(json!(true)),
                    Condition::Not(Box::new(Condition::Expr("b".to_string()))),
                ]),
            ])
        );
        assert!(Condition::parse(&json!({"xor": []})).is_err());
    }

    #[test]
    fn test_parallel_forms() {
        let array = parse(json!({"parallel": [{"log": "a"}, {"log": "b"}]}));
        assert!(matches!(array.action, Action::Parallel(ParallelNode { ref actions, .. }) if actions.len() == 2));

        let config = parse(json!({"parallel": {"actions": [{"log": "a"}], "maxConcurrency": 2, "failFast": false, "timeout": 50}}));
        assert_eq!(
            config.action,
            Action::Parallel(ParallelNode {
                actions: parse_steps(&json!([{"log": "a"}])).unwrap(),
                max_concurrency: Some(2),
                fail_fast: Some(false),
                timeout: Some(Duration::from_millis(50)),
            })
        );

        let race = parse(json!({"parallel": {"race": [{"log": "a"}], "timeout": 10}}));
        assert!(matches!(race.action, Action::Race(RaceNode { timeout: Some(t), .. }) if t == Duration::from_millis(10)));

        let batch = parse(json!({"parallel": {"batch": {"actions": [{"log": "a"}], "size": 2, "maxRetries": 3}}}));
        assert!(matches!(batch.action, Action::Batch(BatchNode { size: Some(2), max_retries: Some(3), .. })));

        let for_each = parse(json!({"parallel": {"forEach": {"item": "user", "in": "{{users}}", "do": [{"log": "{{user}}"}]}}}));
        assert!(matches!(for_each.action, Action::ParallelForEach(ParallelForEachNode { ref iter, .. }) if iter.item == "user"));

        assert!(Step::parse(&json!({"parallel": {"threads": 3}})).is_err());
    }

    #[test]
    fn test_set_and_let() {
        let set = parse(json!({"set": {"x": 1}}));
        assert_eq!(
            set.action,
            Action::Set {
                scope: SetScope::Global,
                names: vec![("x".to_string(), json!(1))],
            }
        );
        let let_step = parse(json!({"let": "{{y}}", "value": "{{x + 1}}"}));
        assert_eq!(
            let_step.action,
            Action::Set {
                scope: SetScope::Local,
                names: vec![("y".to_string(), json!("{{x + 1}}"))],
            }
        );
        assert_eq!(let_step.describe(), "let y");
    }

    #[test]
    fn test_domain_action_and_options() {
        let step = parse(json!({"transfer": {"to": "bob"}, "from": "alice", "message": "pay", "continueOnError": true}));
        assert!(step.continue_on_error);
        let Action::Domain(node) = &step.action else {
            panic!("expected domain action");
        };
        assert_eq!(node.name, "transfer");
        assert_eq!(node.params, json!({"to": "bob"}));
        assert_eq!(node.options.get("from"), Some(&json!("alice")));
        assert_eq!(step.describe(), "transfer");
    }

    #[test]
    fn test_unknown_action_names_keys() {
        let err = Step::parse(&json!({"transfer": {}, "deploy": {}})).unwrap_err();
        assert_eq!(err.to_string(), "unknown action with keys [transfer, deploy]");

        let err = Step::parse(&json!({"returns": "x"})).unwrap_err();
        assert!(matches!(err, EvalError::UnknownAction { .. }));
    }

    #[test]
    fn test_measure_requires_body_or_value() {
        assert!(Step::parse(&json!({"measure": {"name": "t"}})).is_err());
        let step = parse(json!({"measure": {"name": "gas", "value": 21000}}));
        assert_eq!(step.action.kind(), "measure");
    }

    #[test]
    fn test_serde_round_trip_keeps_raw_node() {
        let raw = json!([{"set": {"x": 1}}, {"while": {"condition": "x < 4", "do": [{"set": {"x": "{{x + 1}}"}}]}}]);
        let steps: Steps = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(steps[1].action.kind(), "while");
        assert_eq!(serde_json::to_value(&steps).unwrap(), raw);
    }
}

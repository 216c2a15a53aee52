use std::time::Duration;

use thiserror::Error;

use crate::dataset::DatasetError;
use crate::eval::expression::ExpressionError;
use crate::handler::ActionError;
use crate::scenario::ScenarioError;

/// Errors raised while interpreting a step list.
///
/// The `Step`, `Keyword`, `Row` and `ParallelFailed` variants only add
/// location context around another error; [`EvalError::root_cause`] strips
/// them again.
#[derive(Error, Debug, Clone)]
pub enum EvalError {
    #[error("unknown action with keys [{}]", .keys.join(", "))]
    UnknownAction { keys: Vec<String> },
    #[error("invalid action: {0}")]
    InvalidAction(String),
    #[error("unknown keyword '{0}'")]
    UnknownKeyword(String),
    #[error("invalid keyword '{name}': {reason}")]
    InvalidKeyword { name: String, reason: String },
    #[error("keyword '{name}' exceeded the maximum call depth of {max_depth}")]
    RecursionLimit { name: String, max_depth: usize },
    #[error("while loop exceeded {limit} iterations")]
    LoopLimit { limit: usize },
    #[error("expression error: {0}")]
    Expression(#[from] ExpressionError),
    #[error(transparent)]
    Action(#[from] ActionError),
    #[error("operation timed out after {}ms", .after.as_millis())]
    Timeout { after: Duration },
    #[error("all {} race operations failed: {}", .failures.len(), .failures.join("; "))]
    RaceExhausted { failures: Vec<String> },
    #[error("parallel operation {index} failed: {source}")]
    ParallelFailed {
        index: usize,
        source: Box<EvalError>,
    },
    #[error("row {index}: {source}")]
    Row {
        index: usize,
        source: Box<EvalError>,
    },
    #[error("step {index}: {source}")]
    Step {
        index: usize,
        source: Box<EvalError>,
    },
    #[error("keyword '{name}': {source}")]
    Keyword {
        name: String,
        source: Box<EvalError>,
    },
}

pub type EvalResult<T> = Result<T, EvalError>;

impl EvalError {
    pub fn at_step(self, index: usize) -> Self {
        EvalError::Step {
            index,
            source: Box::new(self),
        }
    }

    pub fn in_keyword(self, name: &str) -> Self {
        EvalError::Keyword {
            name: name.to_string(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping step/keyword/row wrappers.
    pub fn root_cause(&self) -> &EvalError {
        match self {
            EvalError::Step { source, .. }
            | EvalError::Keyword { source, .. }
            | EvalError::Row { source, .. }
            | EvalError::ParallelFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Stable name of the root error, exposed to `catch` blocks.
    pub fn kind(&self) -> &'static str {
        match self.root_cause() {
            EvalError::UnknownAction { .. } => "UnknownActionError",
            EvalError::InvalidAction(_) => "InvalidActionError",
            EvalError::UnknownKeyword(_) => "UnknownKeywordError",
            EvalError::InvalidKeyword { .. } => "InvalidKeywordError",
            EvalError::RecursionLimit { .. } => "RecursionLimitError",
            EvalError::LoopLimit { .. } => "LoopLimitError",
            EvalError::Expression(_) => "ExpressionError",
            EvalError::Action(ActionError::Assertion { .. }) => "AssertionError",
            EvalError::Action(_) => "ActionError",
            EvalError::Timeout { .. } => "TimeoutError",
            EvalError::RaceExhausted { .. } => "RaceError",
            // wrappers never survive root_cause
            EvalError::ParallelFailed { .. }
            | EvalError::Row { .. }
            | EvalError::Step { .. }
            | EvalError::Keyword { .. } => "Error",
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Eval error: {0}")]
    Eval(#[from] EvalError),
    #[error("Scenario error: {0}")]
    Scenario(#[from] ScenarioError),
    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type InternalResult<T> = Result<T, Error>;

impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }
}

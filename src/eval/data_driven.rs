use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::context::ExecutionContext;
use super::interpreter::{execute_steps, StepFlow};
use crate::ast::Step;
use crate::error::{EvalError, EvalResult};

/// Variable holding the current row.
pub const ROW: &str = "row";
/// 0-based index of the current row.
pub const ROW_INDEX: &str = "rowIndex";
/// Number of rows in the dataset.
pub const ROW_COUNT: &str = "rowCount";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowOutcome {
    pub index: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataDrivenSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub rows: Vec<RowOutcome>,
}

impl DataDrivenSummary {
    fn push(&mut self, outcome: RowOutcome) {
        if outcome.success {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
        self.rows.push(outcome);
    }
}

/// Run `steps` once per row with `row`, `rowIndex` and `rowCount` bound as
/// globals for the duration of the pass. Earlier values of those globals
/// are put back after each pass.
///
/// Without `continue_on_error` the first failing row stops the run and its
/// error is returned tagged with the row index.
#[tracing::instrument(skip_all, fields(rows = rows.len(), continue_on_error = continue_on_error), level = "debug")]
pub async fn run_for_each_row(
    rows: &[Value],
    steps: &[Step],
    ctx: &ExecutionContext,
    continue_on_error: bool,
) -> EvalResult<DataDrivenSummary> {
    let mut summary = DataDrivenSummary {
        total: rows.len(),
        ..Default::default()
    };

    for (index, row) in rows.iter().enumerate() {
        let shadowed: Vec<(&str, Option<Value>)> = [ROW, ROW_INDEX, ROW_COUNT]
            .into_iter()
            .map(|name| (name, ctx.get_variable(name)))
            .collect();
        ctx.set_variable(ROW, row.clone());
        ctx.set_variable(ROW_INDEX, Value::from(index));
        ctx.set_variable(ROW_COUNT, Value::from(rows.len()));

        let started = Instant::now();
        let outcome = execute_steps(steps, ctx).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        for (name, previous) in shadowed {
            match previous {
                Some(value) => ctx.set_variable(name, value),
                None => {
                    ctx.remove_variable(name);
                }
            }
        }

        match outcome {
            Ok(flow) => {
                debug!(index, "row passed");
                summary.push(RowOutcome {
                    index,
                    success: true,
                    value: Some(StepFlow::into_value(flow)),
                    error: None,
                    elapsed_ms,
                });
            }
            Err(err) if continue_on_error => {
                warn!(index, error = %err, "row failed, continuing");
                summary.push(RowOutcome {
                    index,
                    success: false,
                    value: None,
                    error: Some(err.to_string()),
                    elapsed_ms,
                });
            }
            Err(err) => {
                return Err(EvalError::Row {
                    index,
                    source: Box::new(err),
                })
            }
        }
    }

    info!(
        total = summary.total,
        passed = summary.passed,
        failed = summary.failed,
        "data-driven run finished"
    );
    Ok(summary)
}

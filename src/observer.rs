//! Step start/finish notifications. Observers are informational only and
//! cannot influence control flow.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, trace};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum StepEvent {
    Started {
        index: usize,
        depth: usize,
        label: String,
    },
    Finished {
        index: usize,
        depth: usize,
        label: String,
        success: bool,
        elapsed_ms: u64,
    },
}

impl StepEvent {
    pub fn started(index: usize, depth: usize, label: &str) -> Self {
        StepEvent::Started {
            index,
            depth,
            label: label.to_string(),
        }
    }

    pub fn finished(index: usize, depth: usize, label: &str, success: bool, elapsed: Duration) -> Self {
        StepEvent::Finished {
            index,
            depth,
            label: label.to_string(),
            success,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }
}

pub trait StepObserver: Send + Sync {
    fn on_event(&self, event: &StepEvent);
}

/// Emits step events as tracing records.
pub struct TracingObserver;

impl StepObserver for TracingObserver {
    fn on_event(&self, event: &StepEvent) {
        match event {
            StepEvent::Started { index, depth, label } => {
                trace!(index, depth, step = %label, "step started");
            }
            StepEvent::Finished {
                index,
                depth,
                label,
                success,
                elapsed_ms,
            } => {
                debug!(index, depth, step = %label, success, elapsed_ms, "step finished");
            }
        }
    }
}

pub struct NoopObserver;

impl StepObserver for NoopObserver {
    fn on_event(&self, _event: &StepEvent) {}
}

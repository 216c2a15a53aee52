#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use scenario_engine::{
    parse_steps, ActionError, ActionHandler, DomainAction, Engine, ExecutionContext, Step,
};
use serde_json::Value;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[ctor::ctor]
fn init_tests() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

pub fn steps(value: Value) -> Vec<Step> {
    parse_steps(&value).expect("valid steps")
}

/// `track: {id, delay?, fail?, panic?}` sleeps `delay` ms while tracking how many
/// tracked actions are in flight, then returns its `id` (fails when `fail`, panics when `panic`).
#[derive(Default)]
pub struct TrackingHandler {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    started: Mutex<Vec<Value>>,
}

impl TrackingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> Vec<Value> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActionHandler for TrackingHandler {
    fn supports(&self, name: &str) -> bool {
        name == "track"
    }

    async fn handle(&self, action: &DomainAction, _ctx: &ExecutionContext) -> Result<Value, ActionError> {
        let id = action.params.get("id").cloned().unwrap_or(Value::Null);
        let delay = action.params.get("delay").and_then(Value::as_u64).unwrap_or(20);
        let fail = action.params.get("fail").and_then(Value::as_bool).unwrap_or(false);

        self.started.lock().unwrap().push(id.clone());
        if action.params.get("panic").and_then(Value::as_bool).unwrap_or(false) {
            panic!("track {} panicked", id);
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if fail {
            return Err(ActionError::Failed(format!("track {} failed", id)));
        }
        Ok(id)
    }
}

/// `flaky: {}` fails until it has been called `succeed_on` times.
pub struct FlakyHandler {
    attempts: AtomicU32,
    succeed_on: u32,
}

impl FlakyHandler {
    pub fn new(succeed_on: u32) -> Arc<Self> {
        Arc::new(Self {
            attempts: AtomicU32::new(0),
            succeed_on,
        })
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActionHandler for FlakyHandler {
    fn supports(&self, name: &str) -> bool {
        name == "flaky"
    }

    async fn handle(&self, _action: &DomainAction, _ctx: &ExecutionContext) -> Result<Value, ActionError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt < self.succeed_on {
            return Err(ActionError::Failed(format!("attempt {} failed", attempt)));
        }
        Ok(Value::from(attempt))
    }
}

pub fn engine_with(handler: Arc<dyn ActionHandler>) -> Engine {
    Engine::builder().handler(handler).build()
}

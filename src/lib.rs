pub mod ast;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod eval;
pub mod handler;
pub mod keyword;
pub mod metrics;
pub mod observer;
pub mod scenario;

// Re-exports
pub use ast::{parse_steps, Action, Condition, Step};
pub use config::EngineConfig;
pub use engine::{Engine, EngineBuilder, ScenarioReport};
pub use error::*;
pub use eval::{execute_steps, invoke_keyword, ExecutionContext, SharedContext, StepFlow};
pub use handler::{ActionError, ActionHandler, DomainAction, HandlerChain, StandardActions};
pub use keyword::{KeywordDefinition, KeywordLibrary, KeywordRegistry};
pub use scenario::{Scenario, ScenarioError};

#[cfg(test)]
#[ctor::ctor]
fn init_tests() {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

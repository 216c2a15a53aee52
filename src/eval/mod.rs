pub mod condition;
pub mod context;
pub mod data_driven;
pub mod expression;
pub mod interpreter;
pub mod loops;
pub mod parallel;
pub mod path;
pub mod template;

pub use context::{ExecutionContext, SharedContext, StepRecord};
pub use interpreter::{execute_step, execute_steps, invoke_keyword, StepFlow};

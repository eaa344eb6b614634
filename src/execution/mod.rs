//! Pipeline execution engine

pub mod engine;
pub mod executor;
pub mod plan;
pub mod scheduler;

pub use engine::{EventHandler, ExecutionEngine, ExecutionError, ExecutionEvent};
pub use executor::StageExecutor;
pub use plan::{plan, RunPlan, StagePlan, StepPlan};
pub use scheduler::{Schedule, StageScheduler};

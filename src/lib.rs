pub mod task;
pub mod context;
pub mod config;
pub mod registry;
pub mod cycle_check;
pub mod scheduler;
pub mod retry;
pub mod modifiers;
pub mod reporter;
pub mod executor;

pub use task::{Task, TaskExt};
pub use context::{Context, SharedContext};
pub use config::{ConfigProvider, StaticConfigProvider, YamlConfigProvider};
pub use registry::Registry;
pub use cycle_check::find_cycle;
pub use scheduler::build_order;
pub use retry::{Retry, RetryPolicy};
pub use modifiers::{ResourceGate, Skippable};
pub use reporter::{ConsolePlanReporter, PlanReporter, TracingPlanReporter};
pub use executor::{ExecutionMode, FailurePolicy, PipelineExecutor, RunSummary};

use std::sync::Arc;
use thiserror::Error;

pub type ConfigMap = serde_json::Map<String, serde_json::Value>;
pub type BoxTask = Arc<dyn Task>;
pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Duplicate task name: {0}")]
    DuplicateTask(String),
    #[error("Task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },
    #[error("Circular dependency detected among {unresolved:?} (cycle: {})", .cycle.join(" -> "))]
    CyclicDependency {
        unresolved: Vec<String>,
        cycle: Vec<String>,
    },
    #[error("{0}")]
    TaskFailed(String),
    #[error("Resource not available: {resource}")]
    ResourceUnavailable { resource: String },
    #[error("Task {task} failed: {message}")]
    TaskExecution {
        task: String,
        message: String,
        /// Tasks that never ran, in plan order.
        blocked: Vec<String>,
        /// Further failures in the same run, as `(task, message)`.
        other_failures: Vec<(String, String)>,
    },
    #[error("Deadline exceeded with {} task(s) not run", .pending.len())]
    DeadlineExceeded { pending: Vec<String> },
    #[error("Context cancelled: {0}")]
    ContextCancelled(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// 任务体内部失败的便捷构造
    pub fn failed(message: impl Into<String>) -> Self {
        Self::TaskFailed(message.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::ContextCancelled(_))
    }
}

use thiserror::Error;

pub use crate::drivers::DriverError;
pub use crate::tasks::TaskStateError;
pub use crate::template::TemplateError;

use crate::tasks::TaskId;

/// Rejected structure configuration. The structure is left unchanged.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("an agent owns exactly one task; got {count}")]
    AgentTaskLimit { count: usize },
    #[error("agents do not support fail_fast")]
    AgentFailFast,
    #[error("duplicate task id `{0}`")]
    DuplicateTask(TaskId),
    #[error("unknown task id `{0}`")]
    UnknownTask(TaskId),
    #[error("edge `{parent}` -> `{child}` would create a cycle")]
    CycleDetected { parent: TaskId, child: TaskId },
    #[error("task graph contains a cycle through {}", join_ids(.0))]
    CyclicGraph(Vec<TaskId>),
    #[error("pipeline tasks form a single chain; `{0}` would branch it")]
    BranchingPipeline(TaskId),
    #[error("conflicting memory configuration: {0}")]
    ConflictingMemory(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("tool `{0}` is not registered")]
    ToolNotFound(String),
    #[error("off-prompt output needs task memory but none is configured")]
    MissingTaskMemory,
    #[error("task produced an error artifact: {0}")]
    ErrorOutput(String),
    #[error(transparent)]
    State(#[from] TaskStateError),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StructureError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("task `{task_id}` failed: {source}")]
    TaskFailed { task_id: TaskId, source: TaskError },
    #[error(transparent)]
    TaskState(#[from] TaskStateError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("snapshot serialization failed: {0}")]
    Serialization(String),
}

impl StructureError {
    /// Stable machine-readable class, used by the CLI envelope.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::TaskFailed {
                source: TaskError::Driver(DriverError::NotConfigured { .. }), ..
            } => "driver_not_configured",
            Self::TaskFailed { .. } => "task_failed",
            Self::TaskState(_) => "task_state",
            Self::Template(_) => "template",
            Self::Serialization(_) => "serialization",
        }
    }

    pub fn failed_task(&self) -> Option<&TaskId> {
        match self {
            Self::TaskFailed { task_id, .. } => Some(task_id),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for StructureError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

fn join_ids(ids: &[TaskId]) -> String {
    ids.iter().map(|id| format!("`{id}`")).collect::<Vec<_>>().join(", ")
}

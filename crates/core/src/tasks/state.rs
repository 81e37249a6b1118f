use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle of a task within one structure run.
///
/// ```text
/// Pending -> Running -> Finished
///                   \-> Errored
/// ```
///
/// Transitions only move forward; `reset` is the single way back to
/// `Pending`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    #[default]
    Pending,
    Running,
    Finished,
    Errored,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Finished => "Finished",
            Self::Errored => "Errored",
        }
    }

    /// Finished or Errored: children waiting on this task may proceed.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Finished | Self::Errored)
    }

    pub fn can_transition_to(&self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Finished)
                | (Self::Running, Self::Errored)
        )
    }

    pub(crate) fn transition(self, next: TaskState) -> Result<TaskState, TaskStateError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TaskStateError::InvalidTransition { from: self, to: next })
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskState {
    type Err = TaskStateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "Pending" => Ok(Self::Pending),
            "Running" => Ok(Self::Running),
            "Finished" => Ok(Self::Finished),
            "Errored" => Ok(Self::Errored),
            other => Err(TaskStateError::Unknown(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TaskStateError {
    #[error("invalid task transition from {from} to {to}")]
    InvalidTransition { from: TaskState, to: TaskState },
    #[error("unknown task state `{0}`")]
    Unknown(String),
}

pub mod context;
pub mod state;
pub mod task;

pub use context::{StructureRef, TaskContext};
pub use state::{TaskState, TaskStateError};
pub use task::{Task, TaskId, TaskKind, DEFAULT_PROMPT_INPUT};

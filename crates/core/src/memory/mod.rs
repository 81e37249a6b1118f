pub mod conversation;
pub mod task;

pub use conversation::{ConversationMemory, Run, SharedConversationMemory};
pub use task::{QueryMatch, TaskMemory, TextArtifactStorage, DEFAULT_TASK_MEMORY_NAME};

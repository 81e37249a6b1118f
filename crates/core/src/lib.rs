pub mod artifacts;
pub mod config;
pub mod drivers;
pub mod errors;
pub mod events;
pub mod memory;
pub mod prompt;
pub mod rules;
pub mod structures;
pub mod tasks;
pub mod template;
pub mod tools;

pub use artifacts::{Artifact, ArtifactKind};
pub use config::{AppConfig, ConfigError, DriverSettings, StructureSettings};
pub use drivers::{
    DeltaStream, DriverError, DriversConfig, DummyEmbeddingDriver, DummyPromptDriver,
    EmbeddingDriver, FileManagerDriver, PromptDriver,
};
pub use errors::{StructureError, TaskError, ValidationError};
pub use events::{EventListener, InMemoryEventListener, StructureEvent, StructureEventKind};
pub use memory::{ConversationMemory, Run, SharedConversationMemory, TaskMemory};
pub use prompt::{DeltaMessage, Message, PromptStack, Role};
pub use rules::{Rule, Ruleset, DEFAULT_RULESET_NAME};
pub use structures::{
    Structure, StructureBuilder, StructureKind, StructureRunResult, StructureSnapshot,
};
pub use tasks::{Task, TaskContext, TaskId, TaskKind, TaskState};
pub use tools::{Tool, ToolRegistry};

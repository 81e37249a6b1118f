pub(crate) mod graph;
pub mod snapshot;
pub mod structure;

use serde::{Deserialize, Serialize};

pub use snapshot::{ConversationMemorySnapshot, StructureSnapshot, TaskSnapshot};
pub use structure::{RunHook, Structure, StructureBuilder, StructureRunResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StructureKind {
    Agent,
    Pipeline,
    Workflow,
}

impl StructureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "Agent",
            Self::Pipeline => "Pipeline",
            Self::Workflow => "Workflow",
        }
    }
}

impl std::str::FromStr for StructureKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "agent" => Ok(Self::Agent),
            "pipeline" => Ok(Self::Pipeline),
            "workflow" => Ok(Self::Workflow),
            other => Err(format!(
                "unsupported structure type `{other}` (expected agent|pipeline|workflow)"
            )),
        }
    }
}

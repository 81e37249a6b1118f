use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::artifacts::Artifact;
use crate::drivers::DriversConfig;
use crate::errors::StructureError;
use crate::memory::{ConversationMemory, Run, SharedConversationMemory};
use crate::rules::{Rule, Ruleset};
use crate::structures::{Structure, StructureBuilder, StructureKind};
use crate::tasks::{Task, TaskId, TaskKind, TaskState};

pub const CONVERSATION_MEMORY_TYPE: &str = "ConversationMemory";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMemorySnapshot {
    #[serde(rename = "type")]
    pub kind: String,
    pub runs: Vec<Run>,
    #[serde(default)]
    pub meta: Map<String, Value>,
    #[serde(default)]
    pub max_runs: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    #[serde(flatten)]
    pub kind: TaskKind,
    pub id: TaskId,
    pub state: TaskState,
    pub input: String,
    #[serde(default)]
    pub parent_ids: Vec<TaskId>,
    #[serde(default)]
    pub child_ids: Vec<TaskId>,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub rulesets: Vec<Ruleset>,
    #[serde(default)]
    pub output: Option<Artifact>,
}

/// Serializable form of a structure: tasks, links, states, outputs and
/// conversation memory. Drivers, tools, listeners and hooks are supplied
/// again on restore.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureSnapshot {
    #[serde(rename = "type")]
    pub kind: StructureKind,
    pub id: String,
    #[serde(default)]
    pub fail_fast: bool,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub rulesets: Vec<Ruleset>,
    pub tasks: Vec<TaskSnapshot>,
    #[serde(default)]
    pub conversation_memory: Option<ConversationMemorySnapshot>,
}

impl From<&Task> for TaskSnapshot {
    fn from(task: &Task) -> Self {
        Self {
            kind: task.kind.clone(),
            id: task.id.clone(),
            state: task.state,
            input: task.input.clone(),
            parent_ids: task.parent_ids.clone(),
            child_ids: task.child_ids.clone(),
            rules: task.rules.clone(),
            rulesets: task.rulesets.clone(),
            output: task.output.clone(),
        }
    }
}

impl From<TaskSnapshot> for Task {
    fn from(snapshot: TaskSnapshot) -> Self {
        Task {
            id: snapshot.id,
            kind: snapshot.kind,
            state: snapshot.state,
            input: snapshot.input,
            parent_ids: snapshot.parent_ids,
            child_ids: snapshot.child_ids,
            output: snapshot.output,
            resolved_input: None,
            rules: snapshot.rules,
            rulesets: snapshot.rulesets,
            prompt_driver: None,
        }
    }
}

impl From<&ConversationMemory> for ConversationMemorySnapshot {
    fn from(memory: &ConversationMemory) -> Self {
        Self {
            kind: CONVERSATION_MEMORY_TYPE.to_string(),
            runs: memory.runs().to_vec(),
            meta: memory.meta().clone(),
            max_runs: memory.max_runs(),
        }
    }
}

impl Structure {
    pub fn to_snapshot(&self) -> StructureSnapshot {
        StructureSnapshot {
            kind: self.kind,
            id: self.id.clone(),
            fail_fast: self.fail_fast,
            rules: self.rules.clone(),
            rulesets: self.rulesets.clone(),
            tasks: self.tasks.iter().map(TaskSnapshot::from).collect(),
            conversation_memory: self
                .conversation_memory
                .as_ref()
                .map(|memory| ConversationMemorySnapshot::from(&memory.snapshot())),
        }
    }

    /// Rebuilds a structure and re-checks every invariant the snapshot
    /// claims to satisfy.
    pub fn from_snapshot(
        snapshot: StructureSnapshot,
        drivers: DriversConfig,
    ) -> Result<Self, StructureError> {
        let mut builder = StructureBuilder::new(snapshot.kind)
            .id(snapshot.id)
            .fail_fast(snapshot.fail_fast)
            .rules(snapshot.rules)
            .drivers(drivers);
        for ruleset in snapshot.rulesets {
            builder = builder.ruleset(ruleset);
        }

        builder = match snapshot.conversation_memory {
            Some(memory) if memory.kind != CONVERSATION_MEMORY_TYPE => {
                return Err(StructureError::Serialization(format!(
                    "unsupported conversation memory type `{}`",
                    memory.kind
                )));
            }
            Some(memory) => builder.conversation_memory(SharedConversationMemory::new(
                ConversationMemory::restore(memory.runs, memory.max_runs, memory.meta),
            )),
            None => builder.without_conversation_memory(),
        };

        let mut structure = builder.build()?;
        if !snapshot.tasks.is_empty() || structure.kind != StructureKind::Agent {
            structure.tasks = snapshot.tasks.into_iter().map(Task::from).collect();
        }
        structure.validate()?;
        Ok(structure)
    }

    pub fn to_json(&self) -> Result<String, StructureError> {
        Ok(serde_json::to_string_pretty(&self.to_snapshot())?)
    }

    pub fn from_json(json: &str, drivers: DriversConfig) -> Result<Self, StructureError> {
        let snapshot: StructureSnapshot = serde_json::from_str(json)?;
        Self::from_snapshot(snapshot, drivers)
    }
}

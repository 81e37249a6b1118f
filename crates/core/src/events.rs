use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tasks::TaskId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructureEventKind {
    StructureRunStarted,
    StructureRunFinished,
    TaskStarted,
    TaskFinished,
    CompletionChunk,
}

impl StructureEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StructureRunStarted => "structure.run_started",
            Self::StructureRunFinished => "structure.run_finished",
            Self::TaskStarted => "task.started",
            Self::TaskFinished => "task.finished",
            Self::CompletionChunk => "task.completion_chunk",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureEvent {
    pub event_id: String,
    pub structure_id: String,
    pub task_id: Option<TaskId>,
    pub kind: StructureEventKind,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl StructureEvent {
    pub fn new(
        structure_id: impl Into<String>,
        task_id: Option<TaskId>,
        kind: StructureEventKind,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            structure_id: structure_id.into(),
            task_id,
            kind,
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &StructureEvent);
}

#[derive(Clone, Default)]
pub struct InMemoryEventListener {
    events: Arc<Mutex<Vec<StructureEvent>>>,
}

impl InMemoryEventListener {
    pub fn events(&self) -> Vec<StructureEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn kinds(&self) -> Vec<StructureEventKind> {
        self.events().into_iter().map(|event| event.kind).collect()
    }
}

impl EventListener for InMemoryEventListener {
    fn on_event(&self, event: &StructureEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

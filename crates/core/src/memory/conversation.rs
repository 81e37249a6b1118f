use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::artifacts::Artifact;
use crate::prompt::PromptStack;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub input: Artifact,
    pub output: Artifact,
}

impl Run {
    pub fn new(input: Artifact, output: Artifact) -> Self {
        Self { id: Uuid::new_v4().simple().to_string(), input, output }
    }
}

/// Bounded FIFO of completed runs. `add_run` is the only way runs change.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConversationMemory {
    runs: Vec<Run>,
    max_runs: Option<usize>,
    meta: Map<String, Value>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_runs(max_runs: usize) -> Self {
        Self { max_runs: Some(max_runs), ..Self::default() }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    /// Rebuilds memory from persisted parts, applying the run limit.
    pub fn restore(runs: Vec<Run>, max_runs: Option<usize>, meta: Map<String, Value>) -> Self {
        let mut memory = Self { runs, max_runs, meta };
        memory.evict();
        memory
    }

    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    pub fn max_runs(&self) -> Option<usize> {
        self.max_runs
    }

    pub fn meta(&self) -> &Map<String, Value> {
        &self.meta
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn add_run(&mut self, input: Artifact, output: Artifact) -> Run {
        let run = Run::new(input, output);
        self.runs.push(run.clone());
        self.evict();
        run
    }

    /// Appends one user/assistant pair per run, oldest first.
    pub fn add_to_prompt_stack(&self, prompt_stack: &mut PromptStack) {
        for run in &self.runs {
            prompt_stack.add_user_message(run.input.clone());
            prompt_stack.add_assistant_message(run.output.clone());
        }
    }

    fn evict(&mut self) {
        if let Some(max_runs) = self.max_runs {
            if self.runs.len() > max_runs {
                let excess = self.runs.len() - max_runs;
                self.runs.drain(..excess);
            }
        }
    }
}

/// Handle to a conversation memory shared by several structures.
///
/// The mutex keeps access memory-safe; interleaving concurrent runs against
/// the same memory is up to the caller.
#[derive(Clone, Default)]
pub struct SharedConversationMemory {
    inner: Arc<Mutex<ConversationMemory>>,
}

impl SharedConversationMemory {
    pub fn new(memory: ConversationMemory) -> Self {
        Self { inner: Arc::new(Mutex::new(memory)) }
    }

    pub fn with_max_runs(max_runs: usize) -> Self {
        Self::new(ConversationMemory::with_max_runs(max_runs))
    }

    fn lock(&self) -> MutexGuard<'_, ConversationMemory> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn snapshot(&self) -> ConversationMemory {
        self.lock().clone()
    }

    pub fn runs(&self) -> Vec<Run> {
        self.lock().runs().to_vec()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn max_runs(&self) -> Option<usize> {
        self.lock().max_runs()
    }

    pub fn add_run(&self, input: Artifact, output: Artifact) -> Run {
        self.lock().add_run(input, output)
    }

    pub fn same_memory(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl From<ConversationMemory> for SharedConversationMemory {
    fn from(memory: ConversationMemory) -> Self {
        Self::new(memory)
    }
}

impl fmt::Debug for SharedConversationMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedConversationMemory").field(&*self.lock()).finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ConversationMemory, Run, SharedConversationMemory};
    use crate::artifacts::Artifact;
    use crate::prompt::{PromptStack, Role};

    #[test]
    fn keeps_only_the_latest_runs() {
        let mut memory = ConversationMemory::with_max_runs(2);
        for index in 0..5 {
            memory.add_run(
                Artifact::text(format!("in {index}")),
                Artifact::text(format!("out {index}")),
            );
        }

        let inputs: Vec<String> = memory.runs().iter().map(|run| run.input.to_text()).collect();
        assert_eq!(inputs, vec!["in 3", "in 4"]);
    }

    #[test]
    fn unbounded_memory_keeps_everything() {
        let mut memory = ConversationMemory::new();
        for _ in 0..4 {
            memory.add_run(Artifact::text("q"), Artifact::text("a"));
        }
        assert_eq!(memory.len(), 4);
        assert_eq!(memory.max_runs(), None);
    }

    #[test]
    fn restore_applies_the_limit() {
        let runs = (0..3)
            .map(|index| Run::new(Artifact::text(index.to_string()), Artifact::text("a")))
            .collect();
        let mut meta = serde_json::Map::new();
        meta.insert("owner".to_string(), json!("ops"));

        let memory = ConversationMemory::restore(runs, Some(1), meta);
        assert_eq!(memory.len(), 1);
        assert_eq!(memory.runs()[0].input, Artifact::text("2"));
        assert_eq!(memory.meta().get("owner"), Some(&json!("ops")));
    }

    #[test]
    fn prompt_stack_gets_one_pair_per_run() {
        let mut memory = ConversationMemory::new();
        memory.add_run(Artifact::text("first q"), Artifact::text("first a"));
        memory.add_run(Artifact::text("second q"), Artifact::text("second a"));

        let mut stack = PromptStack::new();
        memory.add_to_prompt_stack(&mut stack);

        let turns: Vec<(Role, String)> =
            stack.messages().iter().map(|message| (message.role, message.to_text())).collect();
        assert_eq!(
            turns,
            vec![
                (Role::User, "first q".to_string()),
                (Role::Assistant, "first a".to_string()),
                (Role::User, "second q".to_string()),
                (Role::Assistant, "second a".to_string()),
            ]
        );
    }

    #[test]
    fn shared_handles_see_the_same_runs() {
        let shared = SharedConversationMemory::with_max_runs(3);
        let other = shared.clone();
        other.add_run(Artifact::text("q"), Artifact::text("a"));

        assert!(shared.same_memory(&other));
        assert_eq!(shared.len(), 1);
        assert!(!shared.same_memory(&SharedConversationMemory::default()));
    }
}

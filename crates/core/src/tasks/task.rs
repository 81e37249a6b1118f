use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::artifacts::Artifact;
use crate::drivers::{run_prompt, DriversConfig, PromptDriver};
use crate::errors::TaskError;
use crate::memory::{ConversationMemory, TaskMemory};
use crate::prompt::PromptStack;
use crate::rules::{render_rulesets, Rule, Ruleset};
use crate::tasks::context::TaskContext;
use crate::tasks::state::{TaskState, TaskStateError};
use crate::template::TemplateError;
use crate::tools::ToolRegistry;

pub const DEFAULT_PROMPT_INPUT: &str = "{{ args[0] }}";

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TaskKind {
    /// Sends a prompt stack to the prompt driver.
    #[serde(rename = "PromptTask")]
    Prompt,
    /// Outputs its rendered input.
    #[serde(rename = "TextTask")]
    Text,
    /// Runs a registered tool on its rendered input.
    #[serde(rename = "ToolTask")]
    Tool { tool: String, off_prompt: bool },
}

impl TaskKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Prompt => "PromptTask",
            Self::Text => "TextTask",
            Self::Tool { .. } => "ToolTask",
        }
    }
}

/// A unit of work inside a structure.
///
/// Tasks reference their neighbours by id only; the owning structure keeps
/// both directions of every edge in sync.
#[derive(Clone)]
pub struct Task {
    pub(crate) id: TaskId,
    pub(crate) kind: TaskKind,
    pub(crate) state: TaskState,
    pub(crate) input: String,
    pub(crate) parent_ids: Vec<TaskId>,
    pub(crate) child_ids: Vec<TaskId>,
    pub(crate) output: Option<Artifact>,
    pub(crate) resolved_input: Option<Artifact>,
    pub(crate) rules: Vec<Rule>,
    pub(crate) rulesets: Vec<Ruleset>,
    pub(crate) prompt_driver: Option<Arc<dyn PromptDriver>>,
}

impl Task {
    fn with_kind(kind: TaskKind, input: impl Into<String>) -> Self {
        Self {
            id: TaskId::generate(),
            kind,
            state: TaskState::Pending,
            input: input.into(),
            parent_ids: Vec::new(),
            child_ids: Vec::new(),
            output: None,
            resolved_input: None,
            rules: Vec::new(),
            rulesets: Vec::new(),
            prompt_driver: None,
        }
    }

    pub fn prompt(input: impl Into<String>) -> Self {
        Self::with_kind(TaskKind::Prompt, input)
    }

    pub fn text(input: impl Into<String>) -> Self {
        Self::with_kind(TaskKind::Text, input)
    }

    pub fn tool(tool: impl Into<String>, input: impl Into<String>) -> Self {
        Self::with_kind(TaskKind::Tool { tool: tool.into(), off_prompt: false }, input)
    }

    pub fn with_id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_rule(mut self, rule: impl Into<Rule>) -> Self {
        self.rules.push(rule.into());
        self
    }

    pub fn with_rules(mut self, rules: impl IntoIterator<Item = Rule>) -> Self {
        self.rules.extend(rules);
        self
    }

    pub fn with_ruleset(mut self, ruleset: Ruleset) -> Self {
        self.rulesets.push(ruleset);
        self
    }

    /// Declares a parent; a workflow wires the reverse edge when the task is added.
    pub fn with_parent(mut self, parent_id: impl Into<TaskId>) -> Self {
        push_unique(&mut self.parent_ids, parent_id.into());
        self
    }

    pub fn with_child(mut self, child_id: impl Into<TaskId>) -> Self {
        push_unique(&mut self.child_ids, child_id.into());
        self
    }

    pub fn with_prompt_driver(mut self, driver: impl PromptDriver + 'static) -> Self {
        self.prompt_driver = Some(Arc::new(driver));
        self
    }

    /// Sends tool output to task memory; only meaningful for tool tasks.
    pub fn with_off_prompt(mut self, enabled: bool) -> Self {
        if let TaskKind::Tool { off_prompt, .. } = &mut self.kind {
            *off_prompt = enabled;
        }
        self
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Unrendered input template.
    pub fn input_template(&self) -> &str {
        &self.input
    }

    /// Input as rendered for the most recent execution.
    pub fn resolved_input(&self) -> Option<&Artifact> {
        self.resolved_input.as_ref()
    }

    pub fn parent_ids(&self) -> &[TaskId] {
        &self.parent_ids
    }

    pub fn child_ids(&self) -> &[TaskId] {
        &self.child_ids
    }

    pub fn output(&self) -> Option<&Artifact> {
        self.output.as_ref()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rulesets(&self) -> &[Ruleset] {
        &self.rulesets
    }

    pub fn prompt_driver(&self) -> Option<&dyn PromptDriver> {
        self.prompt_driver.as_deref()
    }

    pub fn is_pending(&self) -> bool {
        self.state == TaskState::Pending
    }

    pub fn is_running(&self) -> bool {
        self.state == TaskState::Running
    }

    pub fn is_finished(&self) -> bool {
        self.state == TaskState::Finished
    }

    pub fn is_errored(&self) -> bool {
        self.state == TaskState::Errored
    }

    pub fn start(&mut self) -> Result<(), TaskStateError> {
        self.state = self.state.transition(TaskState::Running)?;
        Ok(())
    }

    pub fn finish(&mut self, output: Artifact) -> Result<(), TaskStateError> {
        self.state = self.state.transition(TaskState::Finished)?;
        self.output = Some(output);
        Ok(())
    }

    pub fn fail(&mut self, output: Artifact) -> Result<(), TaskStateError> {
        self.state = self.state.transition(TaskState::Errored)?;
        self.output = Some(output);
        Ok(())
    }

    /// Back to Pending with no output; links are kept.
    pub fn reset(&mut self) {
        self.state = TaskState::Pending;
        self.output = None;
        self.resolved_input = None;
    }

    pub(crate) fn add_parent_id(&mut self, parent_id: TaskId) {
        push_unique(&mut self.parent_ids, parent_id);
    }

    pub(crate) fn add_child_id(&mut self, child_id: TaskId) {
        push_unique(&mut self.child_ids, child_id);
    }

    pub(crate) fn remove_parent_id(&mut self, parent_id: &TaskId) {
        self.parent_ids.retain(|id| id != parent_id);
    }

    pub(crate) fn remove_child_id(&mut self, child_id: &TaskId) {
        self.child_ids.retain(|id| id != child_id);
    }

    /// Runs the task once: Pending -> Running -> Finished | Errored.
    ///
    /// Failures are recorded as an Error output before being returned.
    pub(crate) fn execute(&mut self, env: &mut TaskEnv<'_>) -> Result<(), TaskError> {
        self.start()?;

        match self.produce(env) {
            Ok(artifact) if !artifact.is_error() => {
                self.finish(artifact)?;
                Ok(())
            }
            Ok(artifact) => {
                let message = artifact.to_text();
                self.fail(artifact)?;
                Err(TaskError::ErrorOutput(message))
            }
            Err(error) => {
                self.fail(Artifact::error(error.to_string()))?;
                Err(error)
            }
        }
    }

    fn produce(&mut self, env: &mut TaskEnv<'_>) -> Result<Artifact, TaskError> {
        let input = env.context.render(&self.input)?;
        self.resolved_input = Some(Artifact::text(input.clone()));

        match &self.kind {
            TaskKind::Text => Ok(Artifact::text(input)),
            TaskKind::Prompt => {
                let prompt_stack = assemble_prompt_stack(env.rulesets, env.memory, &input, None)?;
                let driver = match self.prompt_driver.as_deref() {
                    Some(driver) => driver,
                    None => env.drivers.prompt.as_ref(),
                };
                let message = run_prompt(
                    driver,
                    &prompt_stack,
                    env.drivers.stream,
                    env.drivers.max_attempts,
                    &mut *env.on_chunk,
                )?;
                Ok(message.into_artifact())
            }
            TaskKind::Tool { tool, off_prompt } => {
                let runner =
                    env.tools.get(tool).ok_or_else(|| TaskError::ToolNotFound(tool.clone()))?;
                let output = runner.run(&Artifact::text(input), env.task_memory.as_deref())?;
                if !*off_prompt || output.is_error() {
                    return Ok(output);
                }

                let memory = env.task_memory.as_deref_mut().ok_or(TaskError::MissingTaskMemory)?;
                let namespace = self.id.as_str();
                memory.store_artifact(namespace, output)?;
                Ok(Artifact::text(memory.pointer_text(tool, namespace)))
            }
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("input", &self.input)
            .field("parent_ids", &self.parent_ids)
            .field("child_ids", &self.child_ids)
            .field("output", &self.output)
            .field("rules", &self.rules)
            .field("rulesets", &self.rulesets)
            .field("prompt_driver", &self.prompt_driver.as_ref().map(|driver| driver.name()))
            .finish()
    }
}

/// Everything a task borrows from its structure while it executes.
pub(crate) struct TaskEnv<'a> {
    pub context: &'a TaskContext,
    pub rulesets: &'a [Ruleset],
    pub memory: Option<&'a ConversationMemory>,
    pub drivers: &'a DriversConfig,
    pub tools: &'a ToolRegistry,
    pub task_memory: Option<&'a mut TaskMemory>,
    pub on_chunk: &'a mut dyn FnMut(&str),
}

/// System rules, then one user/assistant pair per remembered run, then the
/// input; `output` is appended when inspecting a task that already ran.
pub(crate) fn assemble_prompt_stack(
    rulesets: &[Ruleset],
    memory: Option<&ConversationMemory>,
    input: &str,
    output: Option<&Artifact>,
) -> Result<PromptStack, TemplateError> {
    let mut prompt_stack = PromptStack::new();
    if let Some(system) = render_rulesets(rulesets)? {
        prompt_stack.add_system_message(system);
    }
    if let Some(memory) = memory {
        memory.add_to_prompt_stack(&mut prompt_stack);
    }
    prompt_stack.add_user_message(input);
    if let Some(output) = output {
        prompt_stack.add_assistant_message(output.clone());
    }
    Ok(prompt_stack)
}

fn push_unique(ids: &mut Vec<TaskId>, id: TaskId) {
    if !ids.contains(&id) {
        ids.push(id);
    }
}

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::artifacts::Artifact;
use crate::config::StructureSettings;
use crate::drivers::DriversConfig;
use crate::errors::{StructureError, TaskError, ValidationError};
use crate::events::{EventListener, StructureEvent, StructureEventKind};
use crate::memory::{
    ConversationMemory, SharedConversationMemory, TaskMemory, DEFAULT_TASK_MEMORY_NAME,
};
use crate::prompt::PromptStack;
use crate::rules::{effective_rulesets, Rule, Ruleset};
use crate::structures::{graph, StructureKind};
use crate::tasks::task::{assemble_prompt_stack, TaskEnv};
use crate::tasks::{StructureRef, Task, TaskContext, TaskId, TaskKind, DEFAULT_PROMPT_INPUT};
use crate::template::referenced_arg_count;
use crate::tools::{Tool, ToolRegistry};

pub type RunHook = Arc<dyn Fn(&Structure) + Send + Sync>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructureRunResult {
    pub structure_id: String,
    pub output_task_id: Option<TaskId>,
    pub output: Option<Artifact>,
}

impl StructureRunResult {
    pub fn output_text(&self) -> String {
        self.output.as_ref().map(Artifact::to_text).unwrap_or_default()
    }

    pub fn is_error(&self) -> bool {
        self.output.as_ref().is_some_and(Artifact::is_error)
    }
}

/// Owns a set of tasks and runs them in dependency order.
///
/// An agent holds exactly one task, a pipeline a single chain in insertion
/// order, a workflow any acyclic graph. Every configuration call either
/// succeeds completely or leaves the structure untouched.
pub struct Structure {
    pub(super) id: String,
    pub(super) kind: StructureKind,
    pub(super) tasks: Vec<Task>,
    pub(super) rules: Vec<Rule>,
    pub(super) rulesets: Vec<Ruleset>,
    pub(super) conversation_memory: Option<SharedConversationMemory>,
    pub(super) task_memory: Option<TaskMemory>,
    pub(super) fail_fast: bool,
    pub(super) drivers: DriversConfig,
    pub(super) tools: ToolRegistry,
    pub(super) listeners: Vec<Arc<dyn EventListener>>,
    pub(super) on_before_run: Option<RunHook>,
    pub(super) on_after_run: Option<RunHook>,
    pub(super) execution_args: Vec<String>,
}

impl Structure {
    pub fn agent() -> StructureBuilder {
        StructureBuilder::new(StructureKind::Agent)
    }

    pub fn pipeline() -> StructureBuilder {
        StructureBuilder::new(StructureKind::Pipeline)
    }

    pub fn workflow() -> StructureBuilder {
        StructureBuilder::new(StructureKind::Workflow)
    }

    pub fn builder(kind: StructureKind) -> StructureBuilder {
        StructureBuilder::new(kind)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> StructureKind {
        self.kind
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        graph::position(&self.tasks, id).map(|at| &self.tasks[at])
    }

    /// Mutable access for state inspection and manual transitions; links
    /// can only change through the structure.
    pub fn task_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        graph::position(&self.tasks, id).map(|at| &mut self.tasks[at])
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rulesets(&self) -> &[Ruleset] {
        &self.rulesets
    }

    pub fn fail_fast(&self) -> bool {
        self.fail_fast
    }

    pub fn set_fail_fast(&mut self, fail_fast: bool) -> Result<(), ValidationError> {
        if fail_fast && self.kind == StructureKind::Agent {
            return Err(ValidationError::AgentFailFast);
        }
        self.fail_fast = fail_fast;
        Ok(())
    }

    pub fn drivers(&self) -> &DriversConfig {
        &self.drivers
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn conversation_memory(&self) -> Option<&SharedConversationMemory> {
        self.conversation_memory.as_ref()
    }

    pub fn task_memory(&self) -> Option<&TaskMemory> {
        self.task_memory.as_ref()
    }

    pub fn execution_args(&self) -> &[String] {
        &self.execution_args
    }

    /// Args visible to templates until the next run finishes.
    pub fn set_execution_args<I, S>(&mut self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.execution_args = args.into_iter().map(Into::into).collect();
    }

    pub fn register_tool(&mut self, tool: impl Tool + 'static) {
        self.tools.register(tool);
    }

    pub fn add_listener(&mut self, listener: Arc<dyn EventListener>) {
        self.listeners.push(listener);
    }

    pub fn set_on_before_run(&mut self, hook: impl Fn(&Structure) + Send + Sync + 'static) {
        self.on_before_run = Some(Arc::new(hook));
    }

    pub fn set_on_after_run(&mut self, hook: impl Fn(&Structure) + Send + Sync + 'static) {
        self.on_after_run = Some(Arc::new(hook));
    }

    pub fn add_task(&mut self, task: Task) -> Result<(), ValidationError> {
        self.check_memory_for(&task)?;
        if self.kind != StructureKind::Agent && graph::position(&self.tasks, &task.id).is_some() {
            return Err(ValidationError::DuplicateTask(task.id.clone()));
        }

        match self.kind {
            StructureKind::Agent => {
                let mut task = task;
                task.parent_ids.clear();
                task.child_ids.clear();
                self.tasks = vec![task];
                Ok(())
            }
            StructureKind::Pipeline => self.append_to_chain(task),
            StructureKind::Workflow => self.add_to_graph(task),
        }
    }

    /// Adds `tasks` in order; on failure none of them are kept.
    pub fn add_tasks(&mut self, tasks: Vec<Task>) -> Result<(), ValidationError> {
        if self.kind == StructureKind::Agent && tasks.len() > 1 {
            return Err(ValidationError::AgentTaskLimit { count: tasks.len() });
        }

        let backup = self.tasks.clone();
        for task in tasks {
            if let Err(error) = self.add_task(task) {
                self.tasks = backup;
                return Err(error);
            }
        }
        Ok(())
    }

    /// Places `task` directly after `after`, taking over its children.
    pub fn insert_task(&mut self, after: &TaskId, task: Task) -> Result<(), ValidationError> {
        if self.kind == StructureKind::Agent {
            return Err(ValidationError::AgentTaskLimit { count: self.tasks.len() + 1 });
        }
        self.check_memory_for(&task)?;

        let at = self.require(after)?;
        if graph::position(&self.tasks, &task.id).is_some() {
            return Err(ValidationError::DuplicateTask(task.id.clone()));
        }

        let mut task = task;
        let id = task.id.clone();
        let parents = std::mem::take(&mut task.parent_ids);
        let children = std::mem::take(&mut task.child_ids);
        if self.kind == StructureKind::Pipeline && (!parents.is_empty() || !children.is_empty()) {
            return Err(ValidationError::BranchingPipeline(id));
        }

        let mut tasks = self.tasks.clone();
        let former_children = tasks[at].child_ids.clone();
        for child in &former_children {
            graph::unlink(&mut tasks, after, child);
        }
        tasks.insert(at + 1, task);
        graph::link(&mut tasks, after, &id)?;
        for child in &former_children {
            graph::link(&mut tasks, &id, child)?;
        }
        for parent in &parents {
            graph::link(&mut tasks, parent, &id)?;
        }
        for child in &children {
            graph::link(&mut tasks, &id, child)?;
        }

        self.tasks = tasks;
        Ok(())
    }

    /// Adds a dependency edge between two workflow tasks.
    pub fn add_edge(&mut self, parent: &TaskId, child: &TaskId) -> Result<(), ValidationError> {
        match self.kind {
            StructureKind::Agent => {
                Err(ValidationError::AgentTaskLimit { count: self.tasks.len() + 1 })
            }
            StructureKind::Pipeline => Err(ValidationError::BranchingPipeline(parent.clone())),
            StructureKind::Workflow => {
                let mut tasks = self.tasks.clone();
                graph::link(&mut tasks, parent, child)?;
                self.tasks = tasks;
                Ok(())
            }
        }
    }

    pub fn order_tasks(&self) -> Result<Vec<&Task>, ValidationError> {
        Ok(self.execution_order()?.into_iter().map(|at| &self.tasks[at]).collect())
    }

    pub fn input_task(&self) -> Option<&Task> {
        let order = self.execution_order().ok()?;
        order.first().map(|&at| &self.tasks[at])
    }

    pub fn output_task(&self) -> Option<&Task> {
        let order = self.execution_order().ok()?;
        order.last().map(|&at| &self.tasks[at])
    }

    pub fn finished_tasks(&self) -> Vec<&Task> {
        self.tasks.iter().filter(|task| task.is_finished()).collect()
    }

    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(Task::is_running)
    }

    /// Every task's output, keyed in the order tasks were added.
    pub fn task_outputs(&self) -> IndexMap<TaskId, Option<Artifact>> {
        self.tasks.iter().map(|task| (task.id.clone(), task.output.clone())).collect()
    }

    pub fn context(&self, task_id: &TaskId) -> Result<TaskContext, ValidationError> {
        Ok(self.context_at(self.require(task_id)?))
    }

    pub fn task_rulesets(&self, task_id: &TaskId) -> Result<Vec<Ruleset>, ValidationError> {
        Ok(self.rulesets_at(self.require(task_id)?))
    }

    /// Renders a task's input against the current execution args.
    pub fn task_input(&self, task_id: &TaskId) -> Result<Artifact, StructureError> {
        let at = self.require(task_id)?;
        let rendered = self.context_at(at).render(&self.tasks[at].input)?;
        Ok(Artifact::text(rendered))
    }

    /// The prompt stack a task would send now, followed by its own output
    /// when it already has one.
    pub fn prompt_stack(&self, task_id: &TaskId) -> Result<PromptStack, StructureError> {
        let at = self.require(task_id)?;
        let task = &self.tasks[at];
        let input = self.context_at(at).render(&task.input)?;
        let memory = self.conversation_memory.as_ref().map(SharedConversationMemory::snapshot);
        let rulesets = self.rulesets_at(at);
        Ok(assemble_prompt_stack(&rulesets, memory.as_ref(), &input, task.output.as_ref())?)
    }

    pub fn run<I, S>(&mut self, args: I) -> Result<StructureRunResult, StructureError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let order = self.execution_order()?;
        for task in &mut self.tasks {
            task.reset();
        }
        self.set_execution_args(args);

        info!(
            event_name = "structure.run.started",
            structure_id = %self.id,
            kind = self.kind.as_str(),
            task_count = self.tasks.len(),
            "structure run started"
        );
        self.publish(StructureEvent::new(&self.id, None, StructureEventKind::StructureRunStarted));
        if let Some(hook) = self.on_before_run.clone() {
            hook(self);
        }

        if let Err(error) = self.execute_in_order(&order) {
            self.execution_args.clear();
            warn!(
                event_name = "structure.run.halted",
                structure_id = %self.id,
                error = %error,
                "structure run halted"
            );
            self.publish(
                StructureEvent::new(&self.id, None, StructureEventKind::StructureRunFinished)
                    .with_metadata("outcome", "failed"),
            );
            return Err(error);
        }

        let input = order.first().and_then(|&at| self.tasks[at].resolved_input.clone());
        let output_task = order.last().map(|&at| &self.tasks[at]);
        let output_task_id = output_task.map(|task| task.id.clone());
        let output = output_task.and_then(|task| task.output.clone());

        if let (Some(memory), Some(input), Some(output)) =
            (&self.conversation_memory, input, output.clone())
        {
            memory.add_run(input, output);
        }
        self.execution_args.clear();

        info!(
            event_name = "structure.run.finished",
            structure_id = %self.id,
            finished = self.finished_tasks().len(),
            errored = self.tasks.iter().filter(|task| task.is_errored()).count(),
            "structure run finished"
        );
        self.publish(
            StructureEvent::new(&self.id, None, StructureEventKind::StructureRunFinished)
                .with_metadata("outcome", "completed"),
        );
        if let Some(hook) = self.on_after_run.clone() {
            hook(self);
        }

        Ok(StructureRunResult { structure_id: self.id.clone(), output_task_id, output })
    }

    pub(super) fn execution_order(&self) -> Result<Vec<usize>, ValidationError> {
        match self.kind {
            StructureKind::Agent | StructureKind::Pipeline => Ok((0..self.tasks.len()).collect()),
            StructureKind::Workflow => graph::topological_order(&self.tasks),
        }
    }

    /// Re-checks every structural invariant; used after restoring a snapshot.
    pub(super) fn validate(&self) -> Result<(), ValidationError> {
        graph::check_links(&self.tasks)?;
        match self.kind {
            StructureKind::Agent => {
                if self.fail_fast {
                    return Err(ValidationError::AgentFailFast);
                }
                if self.tasks.len() != 1 {
                    return Err(ValidationError::AgentTaskLimit { count: self.tasks.len() });
                }
            }
            StructureKind::Pipeline => graph::check_chain(&self.tasks)?,
            StructureKind::Workflow => {
                graph::topological_order(&self.tasks)?;
            }
        }
        for task in &self.tasks {
            self.check_memory_for(task)?;
        }
        Ok(())
    }

    fn require(&self, task_id: &TaskId) -> Result<usize, ValidationError> {
        graph::position(&self.tasks, task_id)
            .ok_or_else(|| ValidationError::UnknownTask(task_id.clone()))
    }

    fn check_memory_for(&self, task: &Task) -> Result<(), ValidationError> {
        let off_prompt = matches!(task.kind, TaskKind::Tool { off_prompt: true, .. });
        if off_prompt && self.task_memory.is_none() {
            return Err(ValidationError::ConflictingMemory(format!(
                "task `{}` sends output off prompt but the structure has no task memory",
                task.id
            )));
        }
        Ok(())
    }

    fn append_to_chain(&mut self, task: Task) -> Result<(), ValidationError> {
        if !task.child_ids.is_empty() {
            return Err(ValidationError::BranchingPipeline(task.id.clone()));
        }
        match self.tasks.last() {
            Some(last) if task.parent_ids.iter().any(|id| id != &last.id) => {
                return Err(ValidationError::BranchingPipeline(task.id.clone()));
            }
            None if !task.parent_ids.is_empty() => {
                return Err(ValidationError::UnknownTask(task.parent_ids[0].clone()));
            }
            _ => {}
        }

        let mut task = task;
        if let Some(last) = self.tasks.last_mut() {
            last.add_child_id(task.id.clone());
            task.add_parent_id(last.id.clone());
        }
        self.tasks.push(task);
        Ok(())
    }

    fn add_to_graph(&mut self, task: Task) -> Result<(), ValidationError> {
        let mut task = task;
        let id = task.id.clone();
        let parents = std::mem::take(&mut task.parent_ids);
        let children = std::mem::take(&mut task.child_ids);

        let mut tasks = self.tasks.clone();
        tasks.push(task);
        for parent in &parents {
            graph::link(&mut tasks, parent, &id)?;
        }
        for child in &children {
            graph::link(&mut tasks, &id, child)?;
        }

        self.tasks = tasks;
        Ok(())
    }

    fn context_at(&self, at: usize) -> TaskContext {
        let task = &self.tasks[at];
        let parents: Vec<&Task> =
            task.parent_ids.iter().filter_map(|id| self.task(id)).collect();

        let parent_output = parents
            .first()
            .and_then(|parent| parent.output.as_ref())
            .map(Artifact::to_text)
            .unwrap_or_default();
        let parent_outputs = parents
            .iter()
            .filter_map(|parent| {
                parent.output.as_ref().map(|output| (parent.id.to_string(), output.to_text()))
            })
            .collect();
        let parents_output_text = parents
            .iter()
            .filter_map(|parent| parent.output.as_ref())
            .map(Artifact::to_text)
            .collect::<Vec<_>>()
            .join("\n");

        // An out-of-range index is reported when the input is rendered.
        let mut args = self.execution_args.clone();
        let referenced = referenced_arg_count(&task.input).unwrap_or(0);
        if args.len() < referenced {
            args.resize(referenced, String::new());
        }

        TaskContext {
            structure: StructureRef { id: self.id.clone(), kind: self.kind },
            args,
            parent_output,
            parent_outputs,
            parents_output_text,
            parent_ids: task.parent_ids.clone(),
            child_ids: task.child_ids.clone(),
        }
    }

    fn rulesets_at(&self, at: usize) -> Vec<Ruleset> {
        let task = &self.tasks[at];
        effective_rulesets(&self.rulesets, &self.rules, &task.rulesets, &task.rules)
    }

    fn execute_in_order(&mut self, order: &[usize]) -> Result<(), StructureError> {
        for &at in order {
            self.execute_task(at)?;
        }
        Ok(())
    }

    fn execute_task(&mut self, at: usize) -> Result<(), StructureError> {
        let context = self.context_at(at);
        let rulesets = self.rulesets_at(at);
        let memory = self.conversation_memory.as_ref().map(SharedConversationMemory::snapshot);
        let task_id = self.tasks[at].id.clone();

        debug!(
            event_name = "task.run.started",
            structure_id = %self.id,
            task_id = %task_id,
            task_type = self.tasks[at].kind.type_name(),
            "task started"
        );
        self.publish(StructureEvent::new(
            &self.id,
            Some(task_id.clone()),
            StructureEventKind::TaskStarted,
        ));

        let Structure { id, tasks, drivers, tools, task_memory, listeners, .. } = self;
        let mut on_chunk = |chunk: &str| {
            let kind = StructureEventKind::CompletionChunk;
            let event = StructureEvent::new(id.as_str(), Some(task_id.clone()), kind)
                .with_metadata("chunk", chunk);
            for listener in listeners.iter() {
                listener.on_event(&event);
            }
        };
        let mut env = TaskEnv {
            context: &context,
            rulesets: &rulesets,
            memory: memory.as_ref(),
            drivers: &*drivers,
            tools: &*tools,
            task_memory: task_memory.as_mut(),
            on_chunk: &mut on_chunk,
        };
        let result = tasks[at].execute(&mut env);

        let state = self.tasks[at].state;
        self.publish(
            StructureEvent::new(&self.id, Some(task_id.clone()), StructureEventKind::TaskFinished)
                .with_metadata("state", state.as_str()),
        );

        match result {
            Ok(()) => {
                debug!(
                    event_name = "task.run.finished",
                    structure_id = %self.id,
                    task_id = %task_id,
                    "task finished"
                );
                Ok(())
            }
            Err(TaskError::State(error)) => Err(error.into()),
            Err(error) => {
                warn!(
                    event_name = "task.run.errored",
                    structure_id = %self.id,
                    task_id = %task_id,
                    fail_fast = self.fail_fast,
                    error = %error,
                    "task errored"
                );
                if self.fail_fast {
                    Err(StructureError::TaskFailed { task_id, source: error })
                } else {
                    Ok(())
                }
            }
        }
    }

    fn publish(&self, event: StructureEvent) {
        for listener in &self.listeners {
            listener.on_event(&event);
        }
    }
}

impl fmt::Debug for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Structure")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("tasks", &self.tasks)
            .field("rules", &self.rules)
            .field("rulesets", &self.rulesets)
            .field("conversation_memory", &self.conversation_memory)
            .field("task_memory", &self.task_memory)
            .field("fail_fast", &self.fail_fast)
            .field("drivers", &self.drivers)
            .field("tools", &self.tools)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

enum TaskMemorySetting {
    Default,
    Custom(TaskMemory),
    Disabled,
}

pub struct StructureBuilder {
    kind: StructureKind,
    id: Option<String>,
    tasks: Vec<Task>,
    rules: Vec<Rule>,
    rulesets: Vec<Ruleset>,
    conversation_memory: Option<SharedConversationMemory>,
    task_memory: TaskMemorySetting,
    fail_fast: bool,
    drivers: DriversConfig,
    tools: ToolRegistry,
    listeners: Vec<Arc<dyn EventListener>>,
    on_before_run: Option<RunHook>,
    on_after_run: Option<RunHook>,
}

impl StructureBuilder {
    pub fn new(kind: StructureKind) -> Self {
        Self {
            kind,
            id: None,
            tasks: Vec::new(),
            rules: Vec::new(),
            rulesets: Vec::new(),
            conversation_memory: Some(SharedConversationMemory::default()),
            task_memory: TaskMemorySetting::Default,
            fail_fast: false,
            drivers: DriversConfig::default(),
            tools: ToolRegistry::new(),
            listeners: Vec::new(),
            on_before_run: None,
            on_after_run: None,
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn tasks(mut self, tasks: impl IntoIterator<Item = Task>) -> Self {
        self.tasks.extend(tasks);
        self
    }

    pub fn rule(mut self, rule: impl Into<Rule>) -> Self {
        self.rules.push(rule.into());
        self
    }

    pub fn rules(mut self, rules: impl IntoIterator<Item = Rule>) -> Self {
        self.rules.extend(rules);
        self
    }

    pub fn ruleset(mut self, ruleset: Ruleset) -> Self {
        self.rulesets.push(ruleset);
        self
    }

    pub fn conversation_memory(mut self, memory: SharedConversationMemory) -> Self {
        self.conversation_memory = Some(memory);
        self
    }

    pub fn without_conversation_memory(mut self) -> Self {
        self.conversation_memory = None;
        self
    }

    pub fn task_memory(mut self, memory: TaskMemory) -> Self {
        self.task_memory = TaskMemorySetting::Custom(memory);
        self
    }

    pub fn without_task_memory(mut self) -> Self {
        self.task_memory = TaskMemorySetting::Disabled;
        self
    }

    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn drivers(mut self, drivers: DriversConfig) -> Self {
        self.drivers = drivers;
        self
    }

    pub fn tool(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn listener(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn on_before_run(mut self, hook: impl Fn(&Structure) + Send + Sync + 'static) -> Self {
        self.on_before_run = Some(Arc::new(hook));
        self
    }

    pub fn on_after_run(mut self, hook: impl Fn(&Structure) + Send + Sync + 'static) -> Self {
        self.on_after_run = Some(Arc::new(hook));
        self
    }

    /// Applies the `[structure]` config section. Agents never take
    /// `fail_fast` from configuration.
    pub fn settings(mut self, settings: &StructureSettings) -> Self {
        if self.kind != StructureKind::Agent {
            self.fail_fast = settings.fail_fast;
        }
        self.conversation_memory = settings.conversation_memory.then(|| {
            let memory = match settings.max_runs {
                Some(max_runs) => ConversationMemory::with_max_runs(max_runs),
                None => ConversationMemory::new(),
            };
            SharedConversationMemory::new(memory)
        });
        if !settings.task_memory {
            self.task_memory = TaskMemorySetting::Disabled;
        }
        self
    }

    pub fn build(self) -> Result<Structure, ValidationError> {
        if self.kind == StructureKind::Agent {
            if self.fail_fast {
                return Err(ValidationError::AgentFailFast);
            }
            if self.tasks.len() > 1 {
                return Err(ValidationError::AgentTaskLimit { count: self.tasks.len() });
            }
        }

        let task_memory = match self.task_memory {
            TaskMemorySetting::Default => Some(TaskMemory::new(
                DEFAULT_TASK_MEMORY_NAME,
                Arc::clone(&self.drivers.embedding),
            )),
            TaskMemorySetting::Custom(memory) => Some(memory),
            TaskMemorySetting::Disabled => None,
        };

        let mut structure = Structure {
            id: self.id.unwrap_or_else(|| Uuid::new_v4().simple().to_string()),
            kind: self.kind,
            tasks: Vec::new(),
            rules: self.rules,
            rulesets: self.rulesets,
            conversation_memory: self.conversation_memory,
            task_memory,
            fail_fast: self.fail_fast,
            drivers: self.drivers,
            tools: self.tools,
            listeners: self.listeners,
            on_before_run: self.on_before_run,
            on_after_run: self.on_after_run,
            execution_args: Vec::new(),
        };
        structure.add_tasks(self.tasks)?;
        if structure.kind == StructureKind::Agent && structure.tasks.is_empty() {
            // Agents given tools default to running the first one registered.
            let task = match structure.tools.first() {
                Some(tool) => Task::tool(tool.name(), DEFAULT_PROMPT_INPUT),
                None => Task::prompt(DEFAULT_PROMPT_INPUT),
            };
            structure.tasks.push(task);
        }

        debug!(
            event_name = "structure.built",
            structure_id = %structure.id,
            kind = structure.kind.as_str(),
            task_count = structure.tasks.len(),
            "structure built"
        );
        Ok(structure)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::Structure;
    use crate::artifacts::Artifact;
    use crate::config::StructureSettings;
    use crate::drivers::DriverError;
    use crate::errors::ValidationError;
    use crate::memory::TaskMemory;
    use crate::tasks::{Task, TaskId, TaskKind, TaskState};
    use crate::tools::Tool;

    #[test]
    fn agent_gets_a_default_prompt_task() {
        let agent = Structure::agent().build().expect("agent");
        assert_eq!(agent.tasks().len(), 1);
        assert_eq!(agent.tasks()[0].input_template(), "{{ args[0] }}");
    }

    #[test]
    fn agent_with_tools_defaults_to_a_tool_task() {
        struct Shout;

        impl Tool for Shout {
            fn name(&self) -> &str {
                "shout"
            }

            fn run(
                &self,
                input: &Artifact,
                _: Option<&TaskMemory>,
            ) -> Result<Artifact, DriverError> {
                Ok(Artifact::text(input.to_text().to_uppercase()))
            }
        }

        let mut agent = Structure::agent().tool(Shout).build().expect("agent");
        assert_eq!(agent.tasks().len(), 1);
        assert_eq!(
            agent.tasks()[0].kind(),
            &TaskKind::Tool { tool: "shout".to_string(), off_prompt: false }
        );

        let result = agent.run(["hey"]).expect("run");
        assert_eq!(result.output_text(), "HEY");
    }

    #[test]
    fn agent_add_task_replaces_and_rejects_batches() {
        let mut agent = Structure::agent().build().expect("agent");
        agent.add_task(Task::text("one").with_id("one")).expect("replace");
        agent.add_task(Task::text("two").with_id("two")).expect("replace");
        assert_eq!(agent.tasks().len(), 1);
        assert_eq!(agent.tasks()[0].id(), &TaskId::from("two"));

        let error = agent.add_tasks(vec![Task::text("a"), Task::text("b")]).expect_err("two tasks");
        assert_eq!(error, ValidationError::AgentTaskLimit { count: 2 });
        assert_eq!(agent.tasks()[0].id(), &TaskId::from("two"));

        let error = Structure::agent()
            .tasks([Task::text("a"), Task::text("b")])
            .build()
            .expect_err("limit");
        assert_eq!(error, ValidationError::AgentTaskLimit { count: 2 });
        assert_eq!(
            Structure::agent().fail_fast(true).build().expect_err("fail fast"),
            ValidationError::AgentFailFast
        );
    }

    #[test]
    fn pipeline_links_predecessor_and_successor() {
        let pipeline = Structure::pipeline()
            .tasks([
                Task::text("a").with_id("a"),
                Task::text("b").with_id("b"),
                Task::text("c").with_id("c"),
            ])
            .build()
            .expect("pipeline");

        let b = pipeline.task(&TaskId::from("b")).expect("b");
        assert_eq!(b.parent_ids(), &[TaskId::from("a")]);
        assert_eq!(b.child_ids(), &[TaskId::from("c")]);
        assert_eq!(pipeline.input_task().map(Task::id), Some(&TaskId::from("a")));
        assert_eq!(pipeline.output_task().map(Task::id), Some(&TaskId::from("c")));
    }

    #[test]
    fn pipeline_rejects_branches_and_duplicates() {
        let mut pipeline = Structure::pipeline()
            .tasks([Task::text("a").with_id("a"), Task::text("b").with_id("b")])
            .build()
            .expect("pipeline");

        let error = pipeline.add_task(Task::text("x").with_parent("a")).expect_err("branch");
        assert!(matches!(error, ValidationError::BranchingPipeline(_)));
        let error = pipeline.add_task(Task::text("dup").with_id("a")).expect_err("duplicate");
        assert_eq!(error, ValidationError::DuplicateTask(TaskId::from("a")));
        assert_eq!(pipeline.tasks().len(), 2);
        assert!(pipeline.add_edge(&TaskId::from("a"), &TaskId::from("b")).is_err());
    }

    #[test]
    fn pipeline_insert_rewires_the_chain() {
        let mut pipeline = Structure::pipeline()
            .tasks([Task::text("a").with_id("a"), Task::text("c").with_id("c")])
            .build()
            .expect("pipeline");

        pipeline.insert_task(&TaskId::from("a"), Task::text("b").with_id("b")).expect("insert");

        let order: Vec<&str> = pipeline.tasks().iter().map(|task| task.id().as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        let c = pipeline.task(&TaskId::from("c")).expect("c");
        assert_eq!(c.parent_ids(), &[TaskId::from("b")]);
        let a = pipeline.task(&TaskId::from("a")).expect("a");
        assert_eq!(a.child_ids(), &[TaskId::from("b")]);
    }

    #[test]
    fn workflow_add_task_wires_both_directions_and_stays_atomic() {
        let mut workflow = Structure::workflow()
            .task(Task::text("root").with_id("root"))
            .task(Task::text("leaf").with_id("leaf").with_parent("root"))
            .build()
            .expect("workflow");

        let root = workflow.task(&TaskId::from("root")).expect("root");
        assert_eq!(root.child_ids(), &[TaskId::from("leaf")]);

        let error = workflow
            .add_task(Task::text("loop").with_id("loop").with_parent("leaf").with_child("root"))
            .expect_err("cycle");
        assert_eq!(
            error,
            ValidationError::CycleDetected {
                parent: TaskId::from("loop"),
                child: TaskId::from("root"),
            }
        );
        assert_eq!(workflow.tasks().len(), 2);
        assert_eq!(
            workflow.task(&TaskId::from("leaf")).map(|leaf| leaf.child_ids().len()),
            Some(0)
        );

        let error = workflow.add_task(Task::text("x").with_parent("ghost")).expect_err("unknown");
        assert_eq!(error, ValidationError::UnknownTask(TaskId::from("ghost")));
    }

    #[test]
    fn off_prompt_tools_need_task_memory() {
        let error = Structure::pipeline()
            .without_task_memory()
            .task(Task::tool("search", "q").with_off_prompt(true))
            .build()
            .expect_err("conflict");
        assert!(matches!(error, ValidationError::ConflictingMemory(_)));
    }

    #[test]
    fn args_are_padded_and_consumed_once() {
        let mut pipeline = Structure::pipeline()
            .task(Task::text("{{ args[0] }}-{{ args[1] }}").with_id("t"))
            .build()
            .expect("pipeline");
        let id = TaskId::from("t");

        pipeline.set_execution_args(["test1", "test2"]);
        assert_eq!(pipeline.task_input(&id).expect("input"), Artifact::text("test1-test2"));

        let result = pipeline.run(["only"]).expect("run");
        assert_eq!(result.output_text(), "only-");
        assert!(pipeline.execution_args().is_empty());
        assert_eq!(pipeline.task_input(&id).expect("input"), Artifact::text("-"));
        assert_eq!(pipeline.context(&id).expect("context").args, vec!["", ""]);
    }

    #[test]
    fn hooks_fire_once_per_run() {
        let before = Arc::new(AtomicUsize::new(0));
        let after = Arc::new(AtomicUsize::new(0));
        let (before_hook, after_hook) = (Arc::clone(&before), Arc::clone(&after));

        let mut pipeline = Structure::pipeline()
            .id("hooked")
            .task(Task::text("x"))
            .on_before_run(move |structure| {
                assert_eq!(structure.id(), "hooked");
                before_hook.fetch_add(1, Ordering::SeqCst);
            })
            .on_after_run(move |structure| {
                assert!(structure.tasks().iter().all(Task::is_finished));
                after_hook.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .expect("pipeline");

        pipeline.run(Vec::<String>::new()).expect("run");
        assert_eq!(before.load(Ordering::SeqCst), 1);
        assert_eq!(after.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn is_running_reflects_task_state() {
        let mut agent = Structure::agent().build().expect("agent");
        assert!(!agent.is_running());

        let id = agent.tasks()[0].id().clone();
        agent.task_mut(&id).expect("task").start().expect("start");
        assert!(agent.is_running());
        assert_eq!(agent.tasks()[0].state(), TaskState::Running);
    }

    #[test]
    fn settings_configure_memory_and_fail_fast() {
        let settings = StructureSettings {
            fail_fast: true,
            conversation_memory: true,
            max_runs: Some(2),
            task_memory: false,
        };

        let pipeline = Structure::pipeline().settings(&settings).build().expect("pipeline");
        assert!(pipeline.fail_fast());
        assert_eq!(pipeline.conversation_memory().and_then(|memory| memory.max_runs()), Some(2));
        assert!(pipeline.task_memory().is_none());

        let agent =
            Structure::agent().settings(&settings).build().expect("agent ignores fail_fast");
        assert!(!agent.fail_fast());

        let quiet = StructureSettings { conversation_memory: false, ..settings };
        let pipeline = Structure::pipeline().settings(&quiet).build().expect("pipeline");
        assert!(pipeline.conversation_memory().is_none());
    }

    #[test]
    fn task_outputs_lists_every_task_in_insertion_order() {
        let mut workflow = Structure::workflow()
            .task(Task::text("z").with_id("zeta"))
            .task(Task::text("a").with_id("alpha"))
            .task(Task::text("m").with_id("mid").with_parent("zeta").with_parent("alpha"))
            .build()
            .expect("workflow");

        let before = workflow.task_outputs();
        let ids: Vec<&str> = before.keys().map(TaskId::as_str).collect();
        assert_eq!(ids, vec!["zeta", "alpha", "mid"]);
        assert!(before.values().all(Option::is_none));

        workflow.run(Vec::<String>::new()).expect("run");
        let after = workflow.task_outputs();
        assert_eq!(after.get_index(1), Some((&TaskId::from("alpha"), &Some(Artifact::text("a")))));

        let context = workflow.context(&TaskId::from("mid")).expect("context");
        let parents: Vec<&str> = context.parent_outputs.keys().map(String::as_str).collect();
        assert_eq!(parents, vec!["zeta", "alpha"]);
    }

    #[test]
    fn oversized_arg_index_errors_the_task_without_padding() {
        let mut pipeline = Structure::pipeline()
            .task(Task::text("{{ args[18446744073709551615] }}").with_id("huge"))
            .task(Task::text("{{ args.400000000 }}").with_id("large"))
            .build()
            .expect("pipeline");

        let huge = TaskId::from("huge");
        assert!(pipeline.context(&huge).expect("context").args.is_empty());

        let result = pipeline.run(["x"]).expect("run completes");
        for task in pipeline.tasks() {
            assert_eq!(task.state(), TaskState::Errored);
        }
        assert!(result.output_text().contains("exceeds the highest supported index"));
    }
}

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::artifacts::Artifact;
use crate::drivers::DriverError;
use crate::memory::TaskMemory;

pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// `memory` is the structure's task memory, when it has one, so a tool
    /// can read back artifacts earlier tools stored off prompt.
    fn run(&self, input: &Artifact, memory: Option<&TaskMemory>) -> Result<Artifact, DriverError>;
}

/// Tools a structure can dispatch to, keyed by name in registration order.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: IndexMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `tool`, replacing any tool already registered under its
    /// name. A replacement keeps the original registration slot.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_shared(Arc::new(tool));
    }

    pub fn register_shared(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|tool| tool.as_ref())
    }

    /// The earliest registered tool.
    pub fn first(&self) -> Option<&dyn Tool> {
        self.tools.first().map(|(_, tool)| tool.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.tools.keys()).finish()
    }
}

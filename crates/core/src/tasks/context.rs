use indexmap::IndexMap;
use serde::Serialize;

use crate::structures::StructureKind;
use crate::tasks::TaskId;
use crate::template::{self, TemplateError};

/// Lookup key for the structure that owns a task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StructureRef {
    pub id: String,
    pub kind: StructureKind,
}

/// Variables visible to a task's input template.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TaskContext {
    pub structure: StructureRef,
    pub args: Vec<String>,
    /// Text of the first parent's output; empty when there is none.
    pub parent_output: String,
    /// Parent id to output text, in parent order.
    pub parent_outputs: IndexMap<String, String>,
    pub parents_output_text: String,
    pub parent_ids: Vec<TaskId>,
    pub child_ids: Vec<TaskId>,
}

impl TaskContext {
    pub fn render(&self, template: &str) -> Result<String, TemplateError> {
        template::referenced_arg_count(template)?;
        let context = tera::Context::from_serialize(self)?;
        template::render(template, &context)
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::{StructureRef, TaskContext};
    use crate::structures::StructureKind;
    use crate::tasks::TaskId;

    fn context() -> TaskContext {
        TaskContext {
            structure: StructureRef { id: "s-1".to_string(), kind: StructureKind::Workflow },
            args: vec!["alpha".to_string(), String::new()],
            parent_output: "first".to_string(),
            parent_outputs: IndexMap::from([
                ("a".to_string(), "first".to_string()),
                ("b".to_string(), "second".to_string()),
            ]),
            parents_output_text: "first\nsecond".to_string(),
            parent_ids: vec![TaskId::from("a"), TaskId::from("b")],
            child_ids: Vec::new(),
        }
    }

    #[test]
    fn renders_args_and_parent_outputs() {
        let rendered = context()
            .render("{{ args[0] }}|{{ args[1] }}|{{ parent_outputs.b }}|{{ structure.kind }}")
            .expect("render");
        assert_eq!(rendered, "alpha||second|Workflow");
    }

    #[test]
    fn iterates_parent_ids() {
        let rendered = context()
            .render("{% for id in parent_ids %}{{ id }};{% endfor %}{{ parents_output_text }}")
            .expect("render");
        assert_eq!(rendered, "a;b;first\nsecond");
    }

    #[test]
    fn oversized_arg_index_fails_to_render() {
        let error = context().render("{{ args[4000000000] }}").expect_err("index too large");
        assert!(error.to_string().contains("args[4000000000]"));
    }
}

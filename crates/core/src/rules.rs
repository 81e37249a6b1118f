use std::fmt;

use serde::{Deserialize, Serialize};
use tera::Context;

use crate::template::{self, TemplateError};

pub const DEFAULT_RULESET_NAME: &str = "Default Ruleset";

const RULESETS_TEMPLATE: &str = "{% for ruleset in rulesets %}{% if not loop.first %}
{% endif %}Ruleset name: {{ ruleset.name }}
{% for rule in ruleset.rules %}{{ rule.value }}
{% endfor %}{% endfor %}";

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rule {
    value: String,
}

impl Rule {
    pub fn new(value: impl Into<String>) -> Self {
        Self { value: value.into() }
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl From<&str> for Rule {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ruleset {
    pub name: String,
    pub rules: Vec<Rule>,
}

impl Ruleset {
    pub fn new(name: impl Into<String>, rules: Vec<Rule>) -> Self {
        Self { name: name.into(), rules }
    }
}

/// Rulesets a task runs with: structure rulesets, then the task's own,
/// then one `Default Ruleset` gathering loose rules (structure rules first).
pub fn effective_rulesets(
    structure_rulesets: &[Ruleset],
    structure_rules: &[Rule],
    task_rulesets: &[Ruleset],
    task_rules: &[Rule],
) -> Vec<Ruleset> {
    let mut rulesets: Vec<Ruleset> =
        structure_rulesets.iter().chain(task_rulesets).cloned().collect();

    let loose: Vec<Rule> = structure_rules.iter().chain(task_rules).cloned().collect();
    if !loose.is_empty() {
        rulesets.push(Ruleset::new(DEFAULT_RULESET_NAME, loose));
    }

    rulesets
}

/// Renders rulesets into system message text; `None` when there is nothing
/// to render.
pub fn render_rulesets(rulesets: &[Ruleset]) -> Result<Option<String>, TemplateError> {
    if rulesets.iter().all(|ruleset| ruleset.rules.is_empty()) {
        return Ok(None);
    }

    let mut context = Context::new();
    context.insert("rulesets", rulesets);
    let rendered = template::render(RULESETS_TEMPLATE, &context)?;
    Ok(Some(rendered.trim_end().to_string()))
}

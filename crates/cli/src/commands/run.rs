use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use strand_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use strand_core::structures::Structure;
use strand_drivers::{drivers_from_settings, FileLoader, LocalFileManagerDriver, TextLoader};
use tracing::info;

use crate::commands::{CommandResult, EXIT_CONFIG, EXIT_INPUT, EXIT_STRUCTURE, EXIT_TASK_ERROR};

const COMMAND: &str = "run";

#[derive(Debug, Default)]
pub struct RunRequest {
    pub prompt: Vec<String>,
    pub input_file: Option<PathBuf>,
    pub overrides: ConfigOverrides,
}

pub fn run(request: RunRequest) -> CommandResult {
    let config = match AppConfig::load(LoadOptions {
        overrides: request.overrides,
        ..LoadOptions::default()
    }) {
        Ok(config) => config,
        Err(error) => {
            let message = error.to_string();
            return CommandResult::failure(COMMAND, "config_validation", message, EXIT_CONFIG);
        }
    };

    let prompt = match resolve_prompt(&request.prompt, request.input_file.as_deref()) {
        Ok(prompt) => prompt,
        Err(error) => {
            return CommandResult::failure(COMMAND, "input", format!("{error:#}"), EXIT_INPUT);
        }
    };

    let mut agent = match Structure::agent()
        .settings(&config.structure)
        .drivers(drivers_from_settings(&config.drivers))
        .build()
    {
        Ok(agent) => agent,
        Err(error) => {
            return CommandResult::failure(COMMAND, "validation", error.to_string(), EXIT_STRUCTURE)
        }
    };

    info!(
        event_name = "cli.run.started",
        provider = config.drivers.prompt_provider.as_str(),
        prompt_chars = prompt.chars().count(),
        "running agent"
    );
    match agent.run([prompt]) {
        Ok(result) if result.is_error() => CommandResult::task_failure(
            COMMAND,
            "task_error",
            result.output_task_id.as_ref().map(|id| id.as_str()),
            result.output_text(),
            EXIT_TASK_ERROR,
        ),
        Ok(result) => CommandResult::success(COMMAND, result.output_text()),
        Err(error) => CommandResult::task_failure(
            COMMAND,
            error.error_class(),
            error.failed_task().map(|id| id.as_str()),
            error.to_string(),
            EXIT_TASK_ERROR,
        ),
    }
}

/// Joins the prompt words and the optional file contents with a blank line.
fn resolve_prompt(words: &[String], input_file: Option<&Path>) -> anyhow::Result<String> {
    let mut parts = Vec::new();
    let inline = words.join(" ");
    if !inline.trim().is_empty() {
        parts.push(inline);
    }

    if let Some(path) = input_file {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .with_context(|| format!("`{}` does not name a file", path.display()))?;
        let workdir =
            path.parent().filter(|parent| !parent.as_os_str().is_empty()).unwrap_or(Path::new("."));

        let loader = TextLoader::new(Arc::new(LocalFileManagerDriver::new(workdir)));
        let contents = loader
            .load(file_name)
            .with_context(|| format!("could not load input file `{}`", path.display()))?
            .to_text();
        if !contents.trim().is_empty() {
            parts.push(contents.trim_end().to_string());
        }
    }

    if parts.is_empty() {
        bail!("no prompt given; pass prompt words or --input-file");
    }
    Ok(parts.join("\n\n"))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::resolve_prompt;

    #[test]
    fn prompt_words_and_file_contents_are_joined() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("context.txt");
        fs::write(&path, "file body\n").expect("write input");

        let prompt = resolve_prompt(&["summarize".to_string(), "this".to_string()], Some(&path))
            .expect("prompt");
        assert_eq!(prompt, "summarize this\n\nfile body");
    }

    #[test]
    fn empty_prompt_is_rejected() {
        let error = resolve_prompt(&[" ".to_string()], None).expect_err("empty prompt");
        assert!(error.to_string().contains("no prompt given"));
    }

    #[test]
    fn missing_input_file_reports_its_path() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("absent.txt");

        let error = resolve_prompt(&[], Some(&path)).expect_err("missing file");
        assert!(format!("{error:#}").contains("absent.txt"));
    }
}

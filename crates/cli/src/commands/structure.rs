use std::fs;
use std::path::PathBuf;

use strand_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use strand_core::structures::{Structure, StructureKind};
use strand_drivers::drivers_from_settings;
use tracing::info;

use crate::commands::{CommandResult, EXIT_CONFIG, EXIT_INPUT, EXIT_STRUCTURE, EXIT_TASK_ERROR};

const COMMAND: &str = "structure";

#[derive(Debug, Default)]
pub struct StructureRequest {
    pub snapshot: PathBuf,
    pub args: Vec<String>,
    pub save: bool,
    pub overrides: ConfigOverrides,
}

pub fn run(request: StructureRequest) -> CommandResult {
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

    let raw = match fs::read_to_string(&request.snapshot) {
        Ok(raw) => raw,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "input",
                format!("could not read snapshot `{}`: {error}", request.snapshot.display()),
                EXIT_INPUT,
            )
        }
    };

    let mut structure = match Structure::from_json(&raw, drivers_from_settings(&config.drivers)) {
        Ok(structure) => structure,
        Err(error) => {
            let message = error.to_string();
            return CommandResult::failure(COMMAND, error.error_class(), message, EXIT_STRUCTURE);
        }
    };
    // agents never run fail-fast, so only chains and graphs pick it up
    if config.structure.fail_fast && structure.kind() != StructureKind::Agent {
        if let Err(error) = structure.set_fail_fast(true) {
            return CommandResult::failure(COMMAND, "validation", error.to_string(), EXIT_STRUCTURE);
        }
    }

    info!(
        event_name = "cli.structure.started",
        structure_id = %structure.id(),
        kind = structure.kind().as_str(),
        args = request.args.len(),
        "running structure snapshot"
    );
    let outcome = structure.run(request.args);

    if request.save {
        let saved = structure
            .to_json()
            .map_err(|error| error.to_string())
            .and_then(|json| fs::write(&request.snapshot, json).map_err(|error| error.to_string()));
        if let Err(error) = saved {
            return CommandResult::failure(
                COMMAND,
                "save",
                format!("could not save snapshot `{}`: {error}", request.snapshot.display()),
                EXIT_INPUT,
            );
        }
    }

    match outcome {
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

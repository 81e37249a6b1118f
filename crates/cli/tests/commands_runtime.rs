use std::env;
use std::fs;
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use strand_cli::commands::run::RunRequest;
use strand_cli::commands::structure::StructureRequest;
use strand_cli::commands::{config, doctor, run, structure};
use strand_core::structures::Structure;
use strand_core::tasks::Task;
use tempfile::TempDir;

#[test]
fn run_returns_mock_output_with_mock_provider() {
    with_env(
        &[
            ("STRAND_DRIVERS_PROMPT_PROVIDER", "mock"),
            ("STRAND_DRIVERS_MOCK_OUTPUT", "hello there"),
        ],
        || {
            let result = run::run(RunRequest {
                prompt: vec!["say".to_string(), "hi".to_string()],
                ..RunRequest::default()
            });
            assert_eq!(result.exit_code, 0, "expected successful agent run");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["command"], "run");
            assert_eq!(payload["status"], "ok");
            assert_eq!(payload["message"], "hello there");
        },
    );
}

#[test]
fn run_reports_unconfigured_prompt_driver_as_task_error() {
    with_env(&[], || {
        let result =
            run::run(RunRequest { prompt: vec!["hi".to_string()], ..RunRequest::default() });
        assert_eq!(result.exit_code, 1, "dummy driver should fail the task");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "task_error");
        assert!(payload["message"].as_str().unwrap_or_default().contains("not configured"));
    });
}

#[test]
fn run_echoes_input_file_contents() {
    with_env(&[("STRAND_DRIVERS_PROMPT_PROVIDER", "echo")], || {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("prompt.txt");
        fs::write(&path, "from a file\n").expect("write prompt");

        let result = run::run(RunRequest { input_file: Some(path), ..RunRequest::default() });
        assert_eq!(result.exit_code, 0);
        assert_eq!(parse_payload(&result.output)["message"], "from a file");
    });
}

#[test]
fn run_rejects_an_empty_prompt() {
    with_env(&[("STRAND_DRIVERS_PROMPT_PROVIDER", "mock")], || {
        let result = run::run(RunRequest::default());
        assert_eq!(result.exit_code, 3);
        assert_eq!(parse_payload(&result.output)["error_class"], "input");
    });
}

#[test]
fn run_returns_config_failure_for_invalid_env() {
    with_env(&[("STRAND_DRIVERS_MAX_ATTEMPTS", "0")], || {
        let result =
            run::run(RunRequest { prompt: vec!["hi".to_string()], ..RunRequest::default() });
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn structure_runs_a_snapshot_and_saves_it() {
    with_env(&[], || {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("pipeline.json");
        let pipeline = Structure::pipeline()
            .id("pipeline-1")
            .task(Task::text("{{ args[0] }}").with_id("draft"))
            .task(Task::text("{{ parent_output }}!").with_id("shout"))
            .build()
            .expect("pipeline");
        fs::write(&path, pipeline.to_json().expect("json")).expect("write snapshot");

        let result = structure::run(StructureRequest {
            snapshot: path.clone(),
            args: vec!["hello".to_string()],
            save: true,
            ..StructureRequest::default()
        });
        assert_eq!(result.exit_code, 0);
        assert_eq!(parse_payload(&result.output)["message"], "hello!");

        let saved = parse_payload(&fs::read_to_string(&path).expect("saved snapshot"));
        assert_eq!(saved["type"], "Pipeline");
        assert_eq!(saved["tasks"][1]["state"], "Finished");
        assert_eq!(saved["tasks"][1]["output"]["value"], "hello!");
        assert_eq!(saved["conversation_memory"]["runs"].as_array().map(Vec::len), Some(1));
    });
}

#[test]
fn structure_reports_fail_fast_task_failure() {
    with_env(&[], || {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("pipeline.json");
        let pipeline = Structure::pipeline()
            .fail_fast(true)
            .task(Task::prompt("{{ args[0] }}").with_id("ask"))
            .task(Task::text("never").with_id("after"))
            .build()
            .expect("pipeline");
        fs::write(&path, pipeline.to_json().expect("json")).expect("write snapshot");

        let result = structure::run(StructureRequest {
            snapshot: path,
            args: vec!["q".to_string()],
            ..StructureRequest::default()
        });
        assert_eq!(result.exit_code, 1);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "driver_not_configured");
        assert_eq!(payload["task_id"], "ask");
    });
}

#[test]
fn structure_rejects_malformed_snapshots() {
    with_env(&[], || {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").expect("write snapshot");

        let result =
            structure::run(StructureRequest { snapshot: path, ..StructureRequest::default() });
        assert_eq!(result.exit_code, 4);
        assert_eq!(parse_payload(&result.output)["error_class"], "serialization");

        let missing = dir.path().join("missing.json");
        let result =
            structure::run(StructureRequest { snapshot: missing, ..StructureRequest::default() });
        assert_eq!(result.exit_code, 3);
        assert_eq!(parse_payload(&result.output)["error_class"], "input");
    });
}

#[test]
fn config_attributes_env_sources() {
    with_env(&[("STRAND_DRIVERS_MODEL", "tiny"), ("STRAND_LOG_LEVEL", "debug")], || {
        let output = config::run();
        assert!(output.contains("- drivers.model = tiny (source: env (STRAND_DRIVERS_MODEL))"));
        assert!(output.contains("- logging.level = debug (source: env (STRAND_LOG_LEVEL))"));
        assert!(output.contains("- structure.max_runs = <unbounded> (source: default)"));
    });
}

#[test]
fn doctor_flags_the_dummy_prompt_driver() {
    with_env(&[], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 1);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "fail");
        assert_eq!(payload["checks"][0]["status"], "pass");
        assert_eq!(payload["checks"][1]["name"], "prompt_driver");
        assert_eq!(payload["checks"][1]["status"], "fail");
        assert_eq!(payload["checks"][2]["status"], "pass");
    });
}

#[test]
fn doctor_passes_with_mock_provider() {
    with_env(&[("STRAND_DRIVERS_PROMPT_PROVIDER", "mock")], || {
        let result = doctor::run(false);
        assert_eq!(result.exit_code, 0);
        assert!(result.output.starts_with("doctor: all readiness checks passed"));
        assert!(result.output.contains("- [ok] prompt_driver:"));
    });
}

#[test]
fn doctor_skips_driver_checks_when_config_fails() {
    with_env(&[("STRAND_STRUCTURE_MAX_RUNS", "0")], || {
        let payload = parse_payload(&doctor::run(true).output);
        assert_eq!(payload["checks"][0]["status"], "fail");
        assert_eq!(payload["checks"][1]["status"], "skipped");
        assert_eq!(payload["checks"][2]["status"], "skipped");
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "STRAND_STRUCTURE_FAIL_FAST",
        "STRAND_STRUCTURE_CONVERSATION_MEMORY",
        "STRAND_STRUCTURE_MAX_RUNS",
        "STRAND_STRUCTURE_TASK_MEMORY",
        "STRAND_DRIVERS_PROMPT_PROVIDER",
        "STRAND_DRIVERS_MODEL",
        "STRAND_DRIVERS_MAX_ATTEMPTS",
        "STRAND_DRIVERS_STREAM",
        "STRAND_DRIVERS_MOCK_OUTPUT",
        "STRAND_DRIVERS_EMBEDDING_PROVIDER",
        "STRAND_DRIVERS_EMBEDDING_DIMENSIONS",
        "STRAND_LOGGING_LEVEL",
        "STRAND_LOGGING_FORMAT",
        "STRAND_LOG_LEVEL",
        "STRAND_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use strand_core::config::{AppConfig, LoadOptions, DEFAULT_CONFIG_FILE};
use toml::Value;

struct ConfigField {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(format!("- {} = {} (source: {source})", field.key, field.value));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<ConfigField> {
    let structure = &config.structure;
    let drivers = &config.drivers;

    vec![
        ConfigField {
            key: "structure.fail_fast",
            value: structure.fail_fast.to_string(),
            env_keys: &["STRAND_STRUCTURE_FAIL_FAST"],
        },
        ConfigField {
            key: "structure.conversation_memory",
            value: structure.conversation_memory.to_string(),
            env_keys: &["STRAND_STRUCTURE_CONVERSATION_MEMORY"],
        },
        ConfigField {
            key: "structure.max_runs",
            value: structure
                .max_runs
                .map_or_else(|| "<unbounded>".to_string(), |max| max.to_string()),
            env_keys: &["STRAND_STRUCTURE_MAX_RUNS"],
        },
        ConfigField {
            key: "structure.task_memory",
            value: structure.task_memory.to_string(),
            env_keys: &["STRAND_STRUCTURE_TASK_MEMORY"],
        },
        ConfigField {
            key: "drivers.prompt_provider",
            value: drivers.prompt_provider.as_str().to_string(),
            env_keys: &["STRAND_DRIVERS_PROMPT_PROVIDER"],
        },
        ConfigField {
            key: "drivers.model",
            value: drivers.model.clone(),
            env_keys: &["STRAND_DRIVERS_MODEL"],
        },
        ConfigField {
            key: "drivers.max_attempts",
            value: drivers.max_attempts.to_string(),
            env_keys: &["STRAND_DRIVERS_MAX_ATTEMPTS"],
        },
        ConfigField {
            key: "drivers.stream",
            value: drivers.stream.to_string(),
            env_keys: &["STRAND_DRIVERS_STREAM"],
        },
        ConfigField {
            key: "drivers.mock_output",
            value: format!("{:?}", drivers.mock_output),
            env_keys: &["STRAND_DRIVERS_MOCK_OUTPUT"],
        },
        ConfigField {
            key: "drivers.embedding_provider",
            value: drivers.embedding_provider.as_str().to_string(),
            env_keys: &["STRAND_DRIVERS_EMBEDDING_PROVIDER"],
        },
        ConfigField {
            key: "drivers.embedding_dimensions",
            value: drivers.embedding_dimensions.to_string(),
            env_keys: &["STRAND_DRIVERS_EMBEDDING_DIMENSIONS"],
        },
        ConfigField {
            key: "logging.level",
            value: config.logging.level.clone(),
            env_keys: &["STRAND_LOGGING_LEVEL", "STRAND_LOG_LEVEL"],
        },
        ConfigField {
            key: "logging.format",
            value: format!("{:?}", config.logging.format).to_ascii_lowercase(),
            env_keys: &["STRAND_LOGGING_FORMAT", "STRAND_LOG_FORMAT"],
        },
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    let set_env = env_keys
        .iter()
        .find(|key| env::var(key).is_ok_and(|value| !value.trim().is_empty()));
    if let Some(env_key) = set_env {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

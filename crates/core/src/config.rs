use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "strand.toml";

#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub structure: StructureSettings,
    pub drivers: DriverSettings,
    pub logging: LoggingConfig,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StructureSettings {
    pub fail_fast: bool,
    pub conversation_memory: bool,
    pub max_runs: Option<usize>,
    pub task_memory: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DriverSettings {
    pub prompt_provider: PromptProvider,
    pub model: String,
    pub max_attempts: u32,
    pub stream: bool,
    pub mock_output: String,
    pub embedding_provider: EmbeddingProvider,
    pub embedding_dimensions: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptProvider {
    Mock,
    Echo,
    Dummy,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    Hash,
    Dummy,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub fail_fast: Option<bool>,
    pub max_runs: Option<usize>,
    pub prompt_provider: Option<PromptProvider>,
    pub model: Option<String>,
    pub stream: Option<bool>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            structure: StructureSettings::default(),
            drivers: DriverSettings {
                prompt_provider: PromptProvider::Dummy,
                model: "mock-model".to_string(),
                max_attempts: 1,
                stream: false,
                mock_output: "mock output".to_string(),
                embedding_provider: EmbeddingProvider::Hash,
                embedding_dimensions: 64,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl Default for StructureSettings {
    fn default() -> Self {
        Self { fail_fast: false, conversation_memory: true, max_runs: None, task_memory: true }
    }
}

impl std::str::FromStr for PromptProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mock" => Ok(Self::Mock),
            "echo" => Ok(Self::Echo),
            "dummy" => Ok(Self::Dummy),
            other => Err(ConfigError::Validation(format!(
                "unsupported prompt provider `{other}` (expected mock|echo|dummy)"
            ))),
        }
    }
}

impl PromptProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mock => "mock",
            Self::Echo => "echo",
            Self::Dummy => "dummy",
        }
    }
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hash" => Ok(Self::Hash),
            "dummy" => Ok(Self::Dummy),
            other => Err(ConfigError::Validation(format!(
                "unsupported embedding provider `{other}` (expected hash|dummy)"
            ))),
        }
    }
}

impl EmbeddingProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hash => "hash",
            Self::Dummy => "dummy",
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    /// defaults -> config file -> `STRAND_*` env -> overrides -> validation
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(structure) = patch.structure {
            if let Some(fail_fast) = structure.fail_fast {
                self.structure.fail_fast = fail_fast;
            }
            if let Some(conversation_memory) = structure.conversation_memory {
                self.structure.conversation_memory = conversation_memory;
            }
            if let Some(max_runs) = structure.max_runs {
                self.structure.max_runs = Some(max_runs);
            }
            if let Some(task_memory) = structure.task_memory {
                self.structure.task_memory = task_memory;
            }
        }

        if let Some(drivers) = patch.drivers {
            if let Some(prompt_provider) = drivers.prompt_provider {
                self.drivers.prompt_provider = prompt_provider;
            }
            if let Some(model) = drivers.model {
                self.drivers.model = model;
            }
            if let Some(max_attempts) = drivers.max_attempts {
                self.drivers.max_attempts = max_attempts;
            }
            if let Some(stream) = drivers.stream {
                self.drivers.stream = stream;
            }
            if let Some(mock_output) = drivers.mock_output {
                self.drivers.mock_output = mock_output;
            }
            if let Some(embedding_provider) = drivers.embedding_provider {
                self.drivers.embedding_provider = embedding_provider;
            }
            if let Some(embedding_dimensions) = drivers.embedding_dimensions {
                self.drivers.embedding_dimensions = embedding_dimensions;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("STRAND_STRUCTURE_FAIL_FAST") {
            self.structure.fail_fast = parse_bool("STRAND_STRUCTURE_FAIL_FAST", &value)?;
        }
        if let Some(value) = read_env("STRAND_STRUCTURE_CONVERSATION_MEMORY") {
            self.structure.conversation_memory =
                parse_bool("STRAND_STRUCTURE_CONVERSATION_MEMORY", &value)?;
        }
        if let Some(value) = read_env("STRAND_STRUCTURE_MAX_RUNS") {
            self.structure.max_runs = Some(parse_usize("STRAND_STRUCTURE_MAX_RUNS", &value)?);
        }
        if let Some(value) = read_env("STRAND_STRUCTURE_TASK_MEMORY") {
            self.structure.task_memory = parse_bool("STRAND_STRUCTURE_TASK_MEMORY", &value)?;
        }

        if let Some(value) = read_env("STRAND_DRIVERS_PROMPT_PROVIDER") {
            self.drivers.prompt_provider = value.parse()?;
        }
        if let Some(value) = read_env("STRAND_DRIVERS_MODEL") {
            self.drivers.model = value;
        }
        if let Some(value) = read_env("STRAND_DRIVERS_MAX_ATTEMPTS") {
            self.drivers.max_attempts = parse_u32("STRAND_DRIVERS_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("STRAND_DRIVERS_STREAM") {
            self.drivers.stream = parse_bool("STRAND_DRIVERS_STREAM", &value)?;
        }
        if let Some(value) = read_env("STRAND_DRIVERS_MOCK_OUTPUT") {
            self.drivers.mock_output = value;
        }
        if let Some(value) = read_env("STRAND_DRIVERS_EMBEDDING_PROVIDER") {
            self.drivers.embedding_provider = value.parse()?;
        }
        if let Some(value) = read_env("STRAND_DRIVERS_EMBEDDING_DIMENSIONS") {
            self.drivers.embedding_dimensions =
                parse_usize("STRAND_DRIVERS_EMBEDDING_DIMENSIONS", &value)?;
        }

        let log_level = read_env("STRAND_LOGGING_LEVEL").or_else(|| read_env("STRAND_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("STRAND_LOGGING_FORMAT").or_else(|| read_env("STRAND_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(fail_fast) = overrides.fail_fast {
            self.structure.fail_fast = fail_fast;
        }
        if let Some(max_runs) = overrides.max_runs {
            self.structure.max_runs = Some(max_runs);
        }
        if let Some(prompt_provider) = overrides.prompt_provider {
            self.drivers.prompt_provider = prompt_provider;
        }
        if let Some(model) = overrides.model {
            self.drivers.model = model;
        }
        if let Some(stream) = overrides.stream {
            self.drivers.stream = stream;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_structure(&self.structure)?;
        validate_drivers(&self.drivers)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_structure(structure: &StructureSettings) -> Result<(), ConfigError> {
    if structure.max_runs == Some(0) {
        return Err(ConfigError::Validation(
            "structure.max_runs must be greater than zero (omit it for unbounded memory)"
                .to_string(),
        ));
    }
    if structure.max_runs.is_some() && !structure.conversation_memory {
        return Err(ConfigError::Validation(
            "structure.max_runs is set but structure.conversation_memory is disabled".to_string(),
        ));
    }
    Ok(())
}

fn validate_drivers(drivers: &DriverSettings) -> Result<(), ConfigError> {
    if drivers.model.trim().is_empty() {
        return Err(ConfigError::Validation("drivers.model must not be empty".to_string()));
    }

    if drivers.max_attempts == 0 || drivers.max_attempts > 10 {
        return Err(ConfigError::Validation(
            "drivers.max_attempts must be in range 1..=10".to_string(),
        ));
    }

    if drivers.embedding_dimensions == 0 || drivers.embedding_dimensions > 4096 {
        return Err(ConfigError::Validation(
            "drivers.embedding_dimensions must be in range 1..=4096".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    structure: Option<StructurePatch>,
    drivers: Option<DriversPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct StructurePatch {
    fail_fast: Option<bool>,
    conversation_memory: Option<bool>,
    max_runs: Option<usize>,
    task_memory: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct DriversPatch {
    prompt_provider: Option<PromptProvider>,
    model: Option<String>,
    max_attempts: Option<u32>,
    stream: Option<bool>,
    mock_output: Option<String>,
    embedding_provider: Option<EmbeddingProvider>,
    embedding_dimensions: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use tempfile::TempDir;

    use super::{
        AppConfig, ConfigError, ConfigOverrides, EmbeddingProvider, LoadOptions, LogFormat,
        PromptProvider,
    };

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_select_dummy_prompt_driver() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(
            config.drivers.prompt_provider == PromptProvider::Dummy,
            "prompt provider should default to dummy",
        )?;
        ensure(
            config.drivers.embedding_provider == EmbeddingProvider::Hash,
            "embedding provider should default to hash",
        )?;
        ensure(config.structure.conversation_memory, "conversation memory should be on")?;
        ensure(config.structure.max_runs.is_none(), "memory should be unbounded by default")?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_STRAND_MODEL", "model-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("strand.toml");
            fs::write(
                &path,
                r#"
[drivers]
prompt_provider = "mock"
model = "${TEST_STRAND_MODEL}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.drivers.model == "model-from-env", "model should come from env")?;
            ensure(
                config.drivers.prompt_provider == PromptProvider::Mock,
                "prompt provider should come from file",
            )
        })();

        clear_vars(&["TEST_STRAND_MODEL"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("STRAND_LOG_LEVEL", "warn");
        env::set_var("STRAND_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )
        })();

        clear_vars(&["STRAND_LOG_LEVEL", "STRAND_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("STRAND_DRIVERS_PROMPT_PROVIDER", "echo");
        env::set_var("STRAND_STRUCTURE_MAX_RUNS", "5");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("strand.toml");
            fs::write(
                &path,
                r#"
[structure]
fail_fast = true
max_runs = 2

[drivers]
prompt_provider = "mock"
model = "from-file"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    model: Some("from-override".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.drivers.model == "from-override", "override model should win")?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.drivers.prompt_provider == PromptProvider::Echo,
                "env prompt provider should win over file and defaults",
            )?;
            ensure(config.structure.max_runs == Some(5), "env max_runs should win over file")?;
            ensure(config.structure.fail_fast, "file fail_fast should win over defaults")
        })();

        clear_vars(&["STRAND_DRIVERS_PROMPT_PROVIDER", "STRAND_STRUCTURE_MAX_RUNS"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("STRAND_STRUCTURE_MAX_RUNS", "0");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("structure.max_runs")
            );
            ensure(has_message, "validation failure should mention structure.max_runs")
        })();

        clear_vars(&["STRAND_STRUCTURE_MAX_RUNS"]);
        result
    }

    #[test]
    fn malformed_env_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("STRAND_DRIVERS_MAX_ATTEMPTS", "many");

        let result = match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::InvalidEnvOverride { key, .. }) => {
                ensure(key == "STRAND_DRIVERS_MAX_ATTEMPTS", "error should name the variable")
            }
            Err(other) => Err(format!("unexpected error: {other}")),
            Ok(_) => Err("expected invalid override".to_string()),
        };

        clear_vars(&["STRAND_DRIVERS_MAX_ATTEMPTS"]);
        result
    }

    #[test]
    fn required_file_must_exist() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let missing = dir.path().join("absent.toml");
        let result = AppConfig::load(LoadOptions {
            config_path: Some(missing.clone()),
            require_file: true,
            ..LoadOptions::default()
        });

        ensure(
            matches!(result, Err(ConfigError::MissingConfigFile(ref path)) if path == &missing),
            "missing required file should be reported with its path",
        )
    }
}

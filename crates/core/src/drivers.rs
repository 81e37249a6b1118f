//! Capability contracts for the collaborators a structure delegates to.
//!
//! Concrete drivers live in `strand-drivers`; the core only knows these
//! traits and the dummy implementations that [`DriversConfig::default`]
//! resolves to. Dummy drivers construct fine and fail with
//! [`DriverError::NotConfigured`] the first time they are used.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::artifacts::Artifact;
use crate::prompt::{DeltaMessage, Message, PromptStack};

pub type DeltaStream = Box<dyn Iterator<Item = Result<DeltaMessage, DriverError>> + Send>;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DriverError {
    #[error("{driver} is not configured; `{operation}` is unavailable")]
    NotConfigured { driver: String, operation: String },
    #[error("{driver} does not support `{operation}`")]
    Unsupported { driver: String, operation: String },
    #[error("driver call failed: {0}")]
    Failed(String),
}

impl DriverError {
    pub fn not_configured(driver: &str, operation: &str) -> Self {
        Self::NotConfigured { driver: driver.to_string(), operation: operation.to_string() }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

pub trait PromptDriver: Send + Sync {
    fn name(&self) -> &str;

    fn model(&self) -> Option<&str> {
        None
    }

    fn try_run(&self, prompt_stack: &PromptStack) -> Result<Message, DriverError>;

    fn try_stream(&self, _prompt_stack: &PromptStack) -> Result<DeltaStream, DriverError> {
        Err(DriverError::Unsupported {
            driver: self.name().to_string(),
            operation: "try_stream".to_string(),
        })
    }
}

pub trait EmbeddingDriver: Send + Sync {
    fn name(&self) -> &str;

    fn embed_text(&self, text: &str) -> Result<Vec<f32>, DriverError>;
}

pub trait FileManagerDriver: Send + Sync {
    fn name(&self) -> &str;

    fn load_file(&self, path: &str) -> Result<Artifact, DriverError>;

    fn save_file(&self, path: &str, value: &Artifact) -> Result<(), DriverError>;

    fn list_files(&self, path: &str) -> Result<Vec<String>, DriverError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DummyPromptDriver;

impl PromptDriver for DummyPromptDriver {
    fn name(&self) -> &str {
        "DummyPromptDriver"
    }

    fn try_run(&self, _prompt_stack: &PromptStack) -> Result<Message, DriverError> {
        Err(DriverError::not_configured(self.name(), "try_run"))
    }

    fn try_stream(&self, _prompt_stack: &PromptStack) -> Result<DeltaStream, DriverError> {
        Err(DriverError::not_configured(self.name(), "try_stream"))
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DummyEmbeddingDriver;

impl EmbeddingDriver for DummyEmbeddingDriver {
    fn name(&self) -> &str {
        "DummyEmbeddingDriver"
    }

    fn embed_text(&self, _text: &str) -> Result<Vec<f32>, DriverError> {
        Err(DriverError::not_configured(self.name(), "embed_text"))
    }
}

/// Driver selection shared by every task of a structure.
#[derive(Clone)]
pub struct DriversConfig {
    pub prompt: Arc<dyn PromptDriver>,
    pub embedding: Arc<dyn EmbeddingDriver>,
    pub stream: bool,
    pub max_attempts: u32,
}

impl Default for DriversConfig {
    fn default() -> Self {
        Self {
            prompt: Arc::new(DummyPromptDriver),
            embedding: Arc::new(DummyEmbeddingDriver),
            stream: false,
            max_attempts: 1,
        }
    }
}

impl fmt::Debug for DriversConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriversConfig")
            .field("prompt", &self.prompt.name())
            .field("embedding", &self.embedding.name())
            .field("stream", &self.stream)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

impl DriversConfig {
    pub fn with_prompt_driver(mut self, driver: impl PromptDriver + 'static) -> Self {
        self.prompt = Arc::new(driver);
        self
    }

    pub fn with_embedding_driver(mut self, driver: impl EmbeddingDriver + 'static) -> Self {
        self.embedding = Arc::new(driver);
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }
}

/// Calls `driver` with retries on transient failures. When `stream` is set
/// the deltas are surfaced through `on_chunk` and assembled into one
/// assistant message.
pub fn run_prompt(
    driver: &dyn PromptDriver,
    prompt_stack: &PromptStack,
    stream: bool,
    max_attempts: u32,
    on_chunk: &mut dyn FnMut(&str),
) -> Result<Message, DriverError> {
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let result = if stream {
            collect_stream(driver, prompt_stack, on_chunk)
        } else {
            driver.try_run(prompt_stack)
        };

        match result {
            Err(error) if error.is_retryable() && attempt < max_attempts => {
                warn!(
                    event_name = "driver.prompt.retry",
                    driver = driver.name(),
                    attempt,
                    max_attempts,
                    error = %error,
                    "prompt driver failed, retrying"
                );
                attempt += 1;
            }
            other => return other,
        }
    }
}

fn collect_stream(
    driver: &dyn PromptDriver,
    prompt_stack: &PromptStack,
    on_chunk: &mut dyn FnMut(&str),
) -> Result<Message, DriverError> {
    let mut text = String::new();
    for delta in driver.try_stream(prompt_stack)? {
        if let Some(chunk) = delta?.content {
            on_chunk(&chunk);
            text.push_str(&chunk);
        }
    }
    Ok(Message::assistant(text))
}

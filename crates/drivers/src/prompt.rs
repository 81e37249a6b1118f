use std::sync::atomic::{AtomicUsize, Ordering};

use strand_core::drivers::{DeltaStream, DriverError, PromptDriver};
use strand_core::prompt::{DeltaMessage, Message, PromptStack};
use tracing::debug;

pub const DEFAULT_MOCK_OUTPUT: &str = "mock output";

/// Answers every prompt with a fixed text.
#[derive(Clone, Debug)]
pub struct MockPromptDriver {
    model: String,
    mock_output: String,
}

impl Default for MockPromptDriver {
    fn default() -> Self {
        Self { model: "mock-model".to_string(), mock_output: DEFAULT_MOCK_OUTPUT.to_string() }
    }
}

impl MockPromptDriver {
    pub fn new(mock_output: impl Into<String>) -> Self {
        Self { mock_output: mock_output.into(), ..Self::default() }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

impl PromptDriver for MockPromptDriver {
    fn name(&self) -> &str {
        "MockPromptDriver"
    }

    fn model(&self) -> Option<&str> {
        Some(&self.model)
    }

    fn try_run(&self, prompt_stack: &PromptStack) -> Result<Message, DriverError> {
        debug!(
            event_name = "driver.prompt.mock",
            model = %self.model,
            messages = prompt_stack.len(),
            "mock prompt driver answered"
        );
        Ok(Message::assistant(self.mock_output.clone()))
    }

    fn try_stream(&self, _prompt_stack: &PromptStack) -> Result<DeltaStream, DriverError> {
        Ok(word_chunks(&self.mock_output))
    }
}

/// Replies with the text of the last user message.
#[derive(Clone, Copy, Debug, Default)]
pub struct EchoPromptDriver;

impl PromptDriver for EchoPromptDriver {
    fn name(&self) -> &str {
        "EchoPromptDriver"
    }

    fn try_run(&self, prompt_stack: &PromptStack) -> Result<Message, DriverError> {
        prompt_stack
            .last_user_message()
            .map(|message| Message::assistant(message.to_text()))
            .ok_or_else(|| DriverError::Failed("prompt stack has no user message".to_string()))
    }

    fn try_stream(&self, prompt_stack: &PromptStack) -> Result<DeltaStream, DriverError> {
        let answer = self.try_run(prompt_stack)?;
        Ok(word_chunks(&answer.to_text()))
    }
}

/// Fails its first `max_failures` calls, then answers like [`MockPromptDriver`].
#[derive(Debug)]
pub struct MockFailingPromptDriver {
    max_failures: usize,
    attempts: AtomicUsize,
    inner: MockPromptDriver,
}

impl MockFailingPromptDriver {
    pub fn new(max_failures: usize) -> Self {
        Self { max_failures, attempts: AtomicUsize::new(0), inner: MockPromptDriver::default() }
    }

    /// Never recovers.
    pub fn always() -> Self {
        Self::new(usize::MAX)
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn next_attempt(&self) -> Result<(), DriverError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.max_failures {
            Err(DriverError::Failed(format!("failed attempt {}", attempt + 1)))
        } else {
            Ok(())
        }
    }
}

impl PromptDriver for MockFailingPromptDriver {
    fn name(&self) -> &str {
        "MockFailingPromptDriver"
    }

    fn try_run(&self, prompt_stack: &PromptStack) -> Result<Message, DriverError> {
        self.next_attempt()?;
        self.inner.try_run(prompt_stack)
    }

    fn try_stream(&self, prompt_stack: &PromptStack) -> Result<DeltaStream, DriverError> {
        self.next_attempt()?;
        self.inner.try_stream(prompt_stack)
    }
}

fn word_chunks(text: &str) -> DeltaStream {
    let chunks: Vec<Result<DeltaMessage, DriverError>> =
        text.split_inclusive(' ').map(|chunk| Ok(DeltaMessage::chunk(chunk))).collect();
    Box::new(chunks.into_iter())
}

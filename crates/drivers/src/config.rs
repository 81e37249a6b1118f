use std::sync::Arc;

use strand_core::config::{DriverSettings, EmbeddingProvider, PromptProvider};
use strand_core::drivers::{
    DriversConfig, DummyEmbeddingDriver, DummyPromptDriver, EmbeddingDriver, PromptDriver,
};
use tracing::debug;

use crate::embedding::HashEmbeddingDriver;
use crate::prompt::{EchoPromptDriver, MockPromptDriver};

pub fn prompt_driver_from_settings(settings: &DriverSettings) -> Arc<dyn PromptDriver> {
    match settings.prompt_provider {
        PromptProvider::Mock => Arc::new(
            MockPromptDriver::new(settings.mock_output.clone()).with_model(settings.model.clone()),
        ),
        PromptProvider::Echo => Arc::new(EchoPromptDriver),
        PromptProvider::Dummy => Arc::new(DummyPromptDriver),
    }
}

pub fn embedding_driver_from_settings(settings: &DriverSettings) -> Arc<dyn EmbeddingDriver> {
    match settings.embedding_provider {
        EmbeddingProvider::Hash => {
            Arc::new(HashEmbeddingDriver::new(settings.embedding_dimensions))
        }
        EmbeddingProvider::Dummy => Arc::new(DummyEmbeddingDriver),
    }
}

pub fn drivers_from_settings(settings: &DriverSettings) -> DriversConfig {
    let config = DriversConfig {
        prompt: prompt_driver_from_settings(settings),
        embedding: embedding_driver_from_settings(settings),
        stream: settings.stream,
        max_attempts: settings.max_attempts.max(1),
    };
    debug!(
        event_name = "drivers.configured",
        prompt = config.prompt.name(),
        embedding = config.embedding.name(),
        stream = config.stream,
        max_attempts = config.max_attempts,
        "drivers configured"
    );
    config
}

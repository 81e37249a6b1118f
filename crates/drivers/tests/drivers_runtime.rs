use std::sync::Arc;

use strand_core::artifacts::Artifact;
use strand_core::config::{AppConfig, PromptProvider};
use strand_core::drivers::{DriversConfig, FileManagerDriver};
use strand_core::structures::Structure;
use strand_core::tasks::Task;
use strand_drivers::{
    drivers_from_settings, EchoPromptDriver, FileLoader, LocalFileManagerDriver, TextLoader,
};
use tempfile::TempDir;

#[test]
fn loaded_text_flows_through_an_echo_agent() {
    let dir = TempDir::new().expect("tempdir");
    let manager: Arc<dyn FileManagerDriver> = Arc::new(LocalFileManagerDriver::new(dir.path()));
    manager.save_file("prompt.txt", &Artifact::text("summarize the release notes")).expect("save");

    let prompt = TextLoader::new(manager).load("prompt.txt").expect("load prompt").to_text();
    let mut agent = Structure::agent()
        .drivers(DriversConfig::default().with_prompt_driver(EchoPromptDriver))
        .build()
        .expect("agent");

    let result = agent.run([prompt]).expect("run");
    assert_eq!(result.output_text(), "summarize the release notes");
}

#[test]
fn settings_driven_pipeline_uses_the_mock_provider() {
    let mut config = AppConfig::default();
    config.drivers.prompt_provider = PromptProvider::Mock;
    config.drivers.mock_output = "drafted".to_string();
    config.drivers.stream = true;

    let mut pipeline = Structure::pipeline()
        .settings(&config.structure)
        .drivers(drivers_from_settings(&config.drivers))
        .task(Task::prompt("{{ args[0] }}"))
        .task(Task::text("final: {{ parent_output }}"))
        .build()
        .expect("pipeline");

    let result = pipeline.run(["write it"]).expect("run");
    assert_eq!(result.output_text(), "final: drafted");
    assert_eq!(pipeline.conversation_memory().map(|memory| memory.len()), Some(1));
}

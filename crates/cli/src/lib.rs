pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use strand_core::config::{AppConfig, ConfigOverrides, LoadOptions, PromptProvider};

#[derive(Debug, Parser)]
#[command(
    name = "strand",
    about = "Strand operator CLI",
    long_about = "Run agents and serialized structures, inspect configuration, and check driver readiness.",
    after_help = "Examples:\n  strand run \"summarize this\" --provider mock\n  strand structure pipeline.json topic --save\n  strand doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run a single-task agent on a prompt and print its output")]
    Run {
        #[arg(help = "Prompt words, joined with spaces")]
        prompt: Vec<String>,
        #[arg(long, help = "Read (more) prompt text from a file")]
        input_file: Option<PathBuf>,
        #[command(flatten)]
        driver: DriverArgs,
    },
    #[command(about = "Rehydrate a structure snapshot, run it, and optionally save it back")]
    Structure {
        #[arg(help = "Path to a structure snapshot (JSON)")]
        snapshot: PathBuf,
        #[arg(help = "Execution args exposed to task templates as `args`")]
        args: Vec<String>,
        #[arg(long, help = "Write the post-run snapshot back to the same path")]
        save: bool,
        #[arg(long, help = "Halt at the first errored task")]
        fail_fast: bool,
        #[command(flatten)]
        driver: DriverArgs,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config and probe prompt and embedding driver readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

#[derive(Debug, Args)]
struct DriverArgs {
    #[arg(long, help = "Prompt provider: mock | echo | dummy")]
    provider: Option<PromptProvider>,
    #[arg(long, help = "Model name passed to the prompt driver")]
    model: Option<String>,
    #[arg(long, help = "Stream completion chunks from the prompt driver")]
    stream: bool,
}

impl DriverArgs {
    fn into_overrides(self) -> ConfigOverrides {
        ConfigOverrides {
            prompt_provider: self.provider,
            model: self.model,
            stream: self.stream.then_some(true),
            ..ConfigOverrides::default()
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    if let Ok(config) = AppConfig::load(LoadOptions::default()) {
        logging::init_logging(&config);
    }

    let result = match cli.command {
        Command::Run { prompt, input_file, driver } => {
            commands::run::run(commands::run::RunRequest {
                prompt,
                input_file,
                overrides: driver.into_overrides(),
            })
        }
        Command::Structure { snapshot, args, save, fail_fast, driver } => {
            let mut overrides = driver.into_overrides();
            overrides.fail_fast = fail_fast.then_some(true);
            commands::structure::run(commands::structure::StructureRequest {
                snapshot,
                args,
                save,
                overrides,
            })
        }
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

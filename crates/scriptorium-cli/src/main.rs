//! Scriptorium CLI: list, validate and run story-writing agent pipelines.

use clap::{CommandFactory, Parser, Subcommand};
use scriptorium_cli::commands;
use scriptorium_cli::commands::pipeline::RunOptions;

/// Scriptorium CLI: agent pipelines for story writing
#[derive(Parser)]
#[command(name = "scriptorium", version, about = "Scriptorium CLI: agent pipelines for story writing")]
pub struct Cli {
    /// Directory with `agents/` and `pipelines/` preset YAML files.
    /// Defaults to ./presets and the user config directory.
    #[arg(long, global = true, env = "SCRIPTORIUM_PRESET_DIR")]
    preset_dir: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List agent presets
    Agents,

    /// List pipeline presets
    Pipelines,

    /// Validate a pipeline YAML file without executing it
    Validate {
        /// Path to the pipeline YAML file
        file: String,
        /// Treat unrecognized conditions and misconfigured steps as errors
        #[arg(long)]
        strict: bool,
    },

    /// Run a pipeline preset against a scripted model
    Run {
        /// Pipeline preset ID (e.g. "quality-prose-with-revision")
        pipeline_id: String,
        /// Pipeline input YAML (instruction, previous text, lorebook entries)
        #[arg(long)]
        input: String,
        /// Scripted model replies YAML, one reply per model call
        #[arg(long)]
        replies: String,
        /// Echo streamed output as it arrives
        #[arg(long)]
        stream: bool,
        /// Print the full run result as JSON
        #[arg(long)]
        json: bool,
        /// Treat unrecognized conditions and misconfigured steps as errors
        #[arg(long)]
        strict: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries generated text and JSON.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scriptorium_core=warn,scriptorium_cli=info".into()),
        )
        .init();

    let result = if let Some(command) = cli.command {
        match commands::load_catalog(cli.preset_dir.as_deref()) {
            Err(e) => Err(e),
            Ok(catalog) => match command {
                Commands::Agents => commands::presets::list_agents(&catalog).await,
                Commands::Pipelines => commands::presets::list_pipelines(&catalog).await,
                Commands::Validate { file, strict } => {
                    commands::pipeline::validate(&catalog, &file, strict).await
                }
                Commands::Run {
                    pipeline_id,
                    input,
                    replies,
                    stream,
                    json,
                    strict,
                } => {
                    let options = RunOptions {
                        stream,
                        json,
                        strict,
                    };
                    commands::pipeline::run(catalog, &pipeline_id, &input, &replies, &options).await
                }
            },
        }
    } else {
        Cli::command().print_help().ok();
        println!();
        Ok(())
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

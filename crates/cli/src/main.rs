//! Orchestrator CLI: the main entry point.
//!
//! Commands:
//! - `serve`   Start the HTTP API
//! - `ask`     Run the agent once and print its trace
//! - `tools`   List the tool catalog
//! - `runs`    Browse or delete run history
//! - `models`  List model display names

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "orchestrator",
    about = "Orchestrator: a tool-using LLM agent with inspectable runs",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.orchestrator/config.toml)
    #[arg(long, global = true, env = "ORCHESTRATOR_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run the agent on one goal
    Ask {
        /// What you want done
        goal: String,

        /// Comma-separated tool ids, or "auto" for all of them
        #[arg(short, long)]
        tools: Option<String>,

        /// Model display name, e.g. "Claude Sonnet 4.5"
        #[arg(short, long)]
        model: Option<String>,

        /// Override the iteration cap
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        max_iterations: Option<u32>,
    },

    /// List available tools
    Tools,

    /// Browse run history
    Runs {
        #[command(subcommand)]
        action: Option<RunsAction>,

        /// How many runs to list
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },

    /// List configured models
    Models,
}

#[derive(Subcommand)]
enum RunsAction {
    /// Show one run step by step
    Show { id: String },

    /// Delete a run and its steps
    Delete { id: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { port } => commands::serve::run(config, port).await?,
        Commands::Ask {
            goal,
            tools,
            model,
            max_iterations,
        } => commands::ask::run(config, goal, tools, model, max_iterations).await?,
        Commands::Tools => commands::tools::run(config).await?,
        Commands::Runs { action, limit } => match action {
            None => commands::runs::list(config, limit).await?,
            Some(RunsAction::Show { id }) => commands::runs::show(config, &id).await?,
            Some(RunsAction::Delete { id }) => commands::runs::delete(config, &id).await?,
        },
        Commands::Models => commands::models::run(&config),
    }

    Ok(())
}

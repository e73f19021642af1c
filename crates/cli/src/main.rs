//! agentrelay CLI: the main entry point.
//!
//! Commands:
//! - `onboard`   Initialize config and memory directories
//! - `pipelines` List enabled pipelines
//! - `run`       Run a pipeline, optionally generating memories
//! - `smart`     Let the agents plan and run the workflow
//! - `plan`      Describe the workflow without running it
//! - `memories`  Prune stored memories against a new prompt

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "agentrelay",
    about = "agentrelay: multi-agent pipeline orchestration",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration
    Onboard,

    /// List enabled pipelines
    Pipelines,

    /// Run a registered pipeline
    Run {
        /// Pipeline id (see `agentrelay pipelines`)
        pipeline: String,

        /// The request to work on
        prompt: String,

        /// Generate and store per-step memories
        #[arg(short, long)]
        memory: bool,
    },

    /// Interpret, plan and execute dynamically
    Smart {
        prompt: String,
    },

    /// Describe which agents would handle a request
    Plan {
        prompt: String,
    },

    /// Show which stored memories matter for a new prompt
    Memories {
        pipeline: String,
        prompt: String,
    },
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
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Pipelines => commands::pipelines::run().await?,
        Commands::Run {
            pipeline,
            prompt,
            memory,
        } => commands::run::pipeline(&pipeline, &prompt, memory).await?,
        Commands::Smart { prompt } => commands::run::smart(&prompt).await?,
        Commands::Plan { prompt } => commands::run::plan(&prompt).await?,
        Commands::Memories { pipeline, prompt } => {
            commands::memories::run(&pipeline, &prompt).await?
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_accepts_memory_flag() {
        let cli =
            Cli::try_parse_from(["agentrelay", "run", "quick-fix", "fix it", "--memory"]).unwrap();
        match cli.command {
            Commands::Run { pipeline, memory, .. } => {
                assert_eq!(pipeline, "quick-fix");
                assert!(memory);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn verbose_is_global() {
        let cli = Cli::try_parse_from(["agentrelay", "smart", "do it", "-v"]).unwrap();
        assert!(cli.verbose);
    }
}

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vessel_common::config::DEFAULT_DATA_DIR;

#[derive(Parser)]
#[command(name = "vessel-cli")]
#[command(about = "Vessel CLI - Inspect and drive container executions", long_about = None)]
struct Cli {
    /// Root directory of the execution store
    #[arg(long, global = true, env = "VESSEL_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an execution from a JSON creation payload
    Create {
        /// Payload file, or '-' for stdin
        #[arg(short, long)]
        payload: String,
    },

    /// Print the derived status of an execution
    Status {
        id: String,
    },

    /// Print the full metadata document of an execution
    Show {
        id: String,
    },

    /// Print the structured logs of an execution
    Logs {
        id: String,
    },

    /// Run one terminal-state check and capture logs if the container has stopped
    Check {
        id: String,
    },

    /// Record the container launched for an execution
    Attach {
        id: String,

        /// Container id as known to the runtime
        container_id: String,
    },

    /// Print (and create) the outputs directory of an execution
    Outputs {
        id: String,
    },

    /// List all executions, oldest first
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let data_dir = cli.data_dir;

    match cli.command {
        Commands::Create { payload } => {
            commands::create(&data_dir, &payload)?;
        }
        Commands::Status { id } => {
            commands::status(&data_dir, &id)?;
        }
        Commands::Show { id } => {
            commands::show(&data_dir, &id)?;
        }
        Commands::Logs { id } => {
            commands::logs(&data_dir, &id).await?;
        }
        Commands::Check { id } => {
            commands::check(&data_dir, &id).await?;
        }
        Commands::Attach { id, container_id } => {
            commands::attach(&data_dir, &id, &container_id)?;
        }
        Commands::Outputs { id } => {
            commands::outputs(&data_dir, &id)?;
        }
        Commands::List => {
            commands::list(&data_dir)?;
        }
    }

    Ok(())
}

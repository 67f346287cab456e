//! Turnstile CLI — the main entry point.
//!
//! Commands:
//! - `run`     — Drive one thread against a replay script, print chunks
//! - `serve`   — Start the HTTP gateway
//! - `config`  — Show the effective (or default) configuration
//! - `doctor`  — Diagnose configuration and capabilities

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "turnstile",
    about = "Turnstile — iterative agent-turn controller",
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
    /// Run a thread to completion and print each chunk as a JSON line
    Run {
        /// Session seed (thread, project, starting messages) as JSON
        #[arg(long)]
        log: PathBuf,

        /// Replay script of executor turns as JSON
        #[arg(long)]
        script: PathBuf,

        /// Thread to run (defaults to the seed's thread)
        #[arg(long)]
        thread: Option<String>,

        /// Project the thread belongs to (defaults to the seed's project)
        #[arg(long)]
        project: Option<String>,

        /// Override the iteration bound
        #[arg(long)]
        max_iterations: Option<u32>,
    },

    /// Start the HTTP gateway server
    Serve {
        /// Replay script of executor turns as JSON
        #[arg(long)]
        script: PathBuf,

        /// Session seed to load before serving
        #[arg(long)]
        log: Option<PathBuf>,

        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the configuration as TOML (secrets redacted)
    Config {
        /// Print the built-in defaults instead
        #[arg(long)]
        default: bool,
    },

    /// Diagnose configuration and capabilities
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing; stdout is reserved for command output
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            log,
            script,
            thread,
            project,
            max_iterations,
        } => {
            commands::run::run(commands::run::RunArgs {
                log,
                script,
                thread,
                project,
                max_iterations,
            })
            .await?
        }
        Commands::Serve { script, log, port } => commands::serve::run(script, log, port).await?,
        Commands::Config { default } => commands::config_cmd::run(default).await?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}

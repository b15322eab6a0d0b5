//! Wirecheck CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "wirecheck")]
#[command(about = "Flags exported code that no production entry point can reach", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory holding wirecheck.toml and the graph store (defaults to current directory)
    #[arg(short, long, global = true, default_value = ".")]
    root: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Map a local working tree as the repository's default branch
    Map {
        /// Repository identifier, `owner/name`
        #[arg(long)]
        repo: String,

        /// Revision label recorded with the snapshot
        #[arg(long, default_value = "local")]
        revision: String,
    },
    /// Analyze a candidate tree against the mapped default branch
    Check {
        #[arg(long)]
        repo: String,

        /// Working tree of the proposed change
        #[arg(long)]
        candidate: PathBuf,

        #[arg(long, default_value = "candidate")]
        revision: String,
    },
    /// List unreachable exports of the mapped default branch
    Unreachable {
        #[arg(long)]
        repo: String,

        /// Only report modules whose path starts with this prefix
        #[arg(long)]
        module: Option<String>,
    },
    /// Re-map the working tree whenever a source file changes
    Watch {
        #[arg(long)]
        repo: String,
    },
    /// Start the HTTP server and update scheduler
    Serve {
        /// Port to listen on (overrides wirecheck.toml)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (overrides wirecheck.toml)
        #[arg(long)]
        host: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Ignoring unreadable .env file: {e}");
        }
    }

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!("wirecheck={}", log_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!("Wirecheck v{}", env!("CARGO_PKG_VERSION"));
    let settings = commands::load_settings(&cli.root)?;

    match cli.command {
        Commands::Map { repo, revision } => {
            commands::map(&cli.root, &settings, &repo, &revision).await?;
        }
        Commands::Check {
            repo,
            candidate,
            revision,
        } => {
            let blocking = commands::check(&cli.root, &settings, &repo, candidate, &revision).await?;
            if blocking {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Unreachable { repo, module } => {
            commands::unreachable(&cli.root, &settings, &repo, module.as_deref()).await?;
        }
        Commands::Watch { repo } => {
            commands::watch(cli.root, settings, &repo).await?;
        }
        Commands::Serve { port, host } => {
            commands::serve(&cli.root, settings, host, port).await?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

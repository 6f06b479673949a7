//! Cinedex CLI
//!
//! Runs and maintains the cinedex API server.
//!
//! # Commands
//!
//! - `serve` - Run the HTTP API until SIGINT or SIGTERM
//! - `migrate` - Apply the PostgreSQL schema
//! - `version` - Show version information
//!
//! Every flag can also be set through a `CINEDEX_*` environment variable.

mod commands;

use clap::{Parser, Subcommand};
use commands::serve::ServeArgs;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Cinedex movie catalog API.
#[derive(Parser)]
#[command(name = "cinedex")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long, env = "CINEDEX_VERBOSE")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API server
    Serve(ServeArgs),

    /// Apply the database schema
    Migrate {
        /// PostgreSQL connection string
        #[arg(long, env = "CINEDEX_DB_DSN")]
        dsn: String,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose when set.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = match cli.command {
        Commands::Serve(args) => commands::serve::run(args).await,
        Commands::Migrate { dsn } => commands::migrate::run(&dsn).await,
        Commands::Version => {
            println!("cinedex CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("cinedex core v{}", cinedex_core::VERSION);
            println!("cinedex server v{}", cinedex_server::VERSION);
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "cinedex exited with an error");
            ExitCode::FAILURE
        }
    }
}

//! Unified skiff CLI.
//!
//! - `skiff client` - Run the tunnel client with its local SOCKS5 relay

use std::process::ExitCode;

use clap::{Parser, Subcommand};

/// Skiff unified CLI.
#[derive(Parser)]
#[command(
    name = "skiff",
    version,
    about = "QUIC tunnel client with a local SOCKS5 relay",
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the tunnel client.
    #[command(name = "client", alias = "proxy-client")]
    Client(Box<skiff_client::ClientArgs>),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Client(args) => skiff_client::cli::run(*args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

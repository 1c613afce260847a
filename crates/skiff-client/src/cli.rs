//! CLI module for skiff-client.

use std::io;
use std::path::PathBuf;

use clap::Parser;
use skiff_config::{CliOverrides, LoggingConfig, apply_overrides, load_config};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Skiff client CLI arguments.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "skiff-client",
    version,
    about = "QUIC tunnel client with a local SOCKS5 front-end"
)]
pub struct ClientArgs {
    /// Config file path (toml/json/jsonc/yaml).
    #[arg(short, long, default_value = "client.toml")]
    pub config: PathBuf,

    #[command(flatten)]
    pub overrides: CliOverrides,
}

/// Load configuration, install logging and run until Ctrl+C / SIGTERM.
pub async fn run(args: ClientArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(&args.config)?;
    apply_overrides(&mut config, &args.overrides);

    init_tracing(&config.logging);
    info!(
        version = skiff_core::VERSION,
        config = %args.config.display(),
        "{} client starting",
        skiff_core::PROJECT_NAME
    );

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal_handler().await;
        info!("shutdown signal received");
        shutdown_signal.cancel();
    });

    crate::run(config, shutdown).await?;
    Ok(())
}

async fn shutdown_signal_handler() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn filter_directives(config: &LoggingConfig) -> String {
    let mut directives = config.level.as_deref().unwrap_or("info").to_string();
    for (module, level) in &config.filters {
        directives.push_str(&format!(",{module}={level}"));
    }
    directives
}

fn init_tracing(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_new(filter_directives(config)).unwrap_or_else(|_| EnvFilter::new("info"));

    let writer = match config.output.as_deref() {
        Some("stdout") => BoxMakeWriter::new(io::stdout),
        _ => BoxMakeWriter::new(io::stderr),
    };

    let registry = tracing_subscriber::registry().with(filter);
    match config.format.as_deref() {
        Some("json") => registry.with(fmt::layer().json().with_writer(writer)).init(),
        Some("compact") => registry
            .with(fmt::layer().compact().with_writer(writer))
            .init(),
        _ => registry.with(fmt::layer().with_writer(writer)).init(),
    }
}

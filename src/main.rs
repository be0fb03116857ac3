mod echo;

use std::{io, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use lantern_kernel::{serve, ConnectionInfo, KernelConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::echo::EchoEngine;

#[derive(Parser, Debug)]
#[command(name = "lantern", version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Jupyter connection file written by the front-end
    #[arg(value_name = "FILE")]
    connection_file: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long)]
    debug: bool,

    /// Identity used in broadcast topics
    #[arg(long, value_name = "ID")]
    identity: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();

    let connection = ConnectionInfo::from_file(&cli.connection_file).with_context(|| {
        format!(
            "failed to load connection file {}",
            cli.connection_file.display()
        )
    })?;

    let mut config = KernelConfig::default();
    if let Some(identity) = cli.identity {
        config.identity = identity;
    }

    let handle = serve(&connection, config, Arc::new(EchoEngine::new()))
        .await
        .context("failed to start kernel")?;
    info!(connection_file = %cli.connection_file.display(), "kernel running");

    tokio::select! {
        _ = handle.wait_for_shutdown() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, shutting down");
            handle.shutdown();
        }
    }
    handle.wait().await;

    info!("kernel stopped");
    Ok(())
}

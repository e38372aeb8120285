//! Serve command for running the allezon server
//!
//! Runs the HTTP surface together with the stream pipeline until SIGINT
//! or SIGTERM arrives, then drains the consumers and flushes the rollups.

use allezon_server::{AllezonServer, ServerConfig};
use anyhow::Result;
use clap::Args;
use tracing::{info, warn};

use crate::config::ConfigLoader;

/// Arguments for the serve command
#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Port to listen on (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Host to bind to (overrides config)
    #[arg(long)]
    pub host: Option<String>,
}

impl ServeArgs {
    /// Apply command-line overrides on top of the loaded server config
    pub fn apply(&self, config: &mut ServerConfig) {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
    }
}

/// Run the serve command
pub async fn run(args: ServeArgs) -> Result<()> {
    let config = ConfigLoader::load()?;
    let engine = config.engine();
    let mut server_config = config.server;
    args.apply(&mut server_config);

    info!(
        addr = %server_config.addr(),
        partitions = engine.log.partition_count,
        "Starting allezon server"
    );

    let server = AllezonServer::new(server_config, engine)?;
    server.run(shutdown_signal()).await?;

    info!("allezon server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

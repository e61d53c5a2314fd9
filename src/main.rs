//! Plasma Net Server
//!
//! Runs the service server until Ctrl-C. Configuration comes from the TOML
//! file named by the first argument or `PLASMA_CONFIG`, otherwise from
//! defaults, and `PLASMA_*` variables override either.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use plasma_net::{
    network::{forward_to_tracing, GameServer, ServerConfig},
    PROTOCOL_VERSION, VERSION,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Plasma Net Server v{} (protocol v{})", VERSION, PROTOCOL_VERSION);

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("PLASMA_CONFIG").ok())
        .map(PathBuf::from);
    let config = match &config_path {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ServerConfig::from_env().context("reading config from environment")?,
    };
    info!("Bind address: {}", config.bind_addr);
    info!("Max connections: {}", config.max_connections);
    info!("Session cipher: {:?}", config.crypto.cipher);

    let server = Arc::new(GameServer::new(config).context("starting server")?);
    server
        .log()
        .register(forward_to_tracing)
        .context("registering log handler")?;

    let signal_server = server.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                signal_server.shutdown();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    server.run().await?;
    info!("Server stopped");
    Ok(())
}

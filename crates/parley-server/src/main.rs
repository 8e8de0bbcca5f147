use std::net::SocketAddr;

use anyhow::Result;
use clap::Parser;
use tracing::info;

mod config;
mod server;
mod telemetry;

use config::{LogFormat, ServerConfig};

/// Parley signaling server.
#[derive(Debug, Parser)]
#[command(name = "parley-server", version, about)]
struct Cli {
    /// Listen address (overrides PARLEY_BIND_ADDR)
    #[arg(long, value_name = "ADDR")]
    bind: Option<SocketAddr>,

    /// Emit logs as JSON (overrides PARLEY_LOG_FORMAT)
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut server_config = ServerConfig::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load server configuration: {}", e))?;
    if let Some(bind) = cli.bind {
        server_config.bind_addr = bind;
    }
    if cli.log_json {
        server_config.log_format = LogFormat::Json;
    }

    telemetry::init(server_config.log_format)
        .map_err(|e| anyhow::anyhow!("Failed to init telemetry: {}", e))?;

    info!("Parley Server starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    server_config.log_config();

    server::start(server_config).await?;

    info!("Parley Server stopped");
    Ok(())
}

use anyhow::Result;
use clap::Parser;
use mac_bridge_core::{ConfigStore, CONFIG_ENV};
use mac_bridge_mcp::http::{serve_http, DEFAULT_HOST, DEFAULT_PORT};
use mac_bridge_mcp::stdio::serve_stdio;
use mac_bridge_mcp::McpServer;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mac-bridge")]
#[command(about = "MCP tool server for macOS automation, Philips Hue and myVAILLANT heating")]
#[command(version)]
struct Args {
    /// Serve over HTTP (POST /mcp) instead of stdio
    #[arg(long)]
    http: bool,

    /// Address to bind in HTTP mode
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// Port to listen on in HTTP mode
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Path to config.json
    #[arg(long, env = CONFIG_ENV)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // stdout carries the protocol in stdio mode
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mac_bridge=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let store = match args.config {
        Some(path) => ConfigStore::new(path),
        None => ConfigStore::default(),
    };
    tracing::info!(config = %store.path().display(), "starting mac-bridge");

    let server = Arc::new(McpServer::new(store));

    if args.http {
        serve_http(server, &args.host, args.port).await
    } else {
        serve_stdio(server).await
    }
}

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ja3print_core::preread::DEFAULT_MAX_PREREAD;
use ja3print_core::variables::VariableRegistry;

mod connection;
mod output;
mod routes;

#[derive(Parser)]
#[command(name = "ja3print-proxy")]
#[command(about = "TCP proxy that fingerprints TLS ClientHellos (JA3) before forwarding them")]
struct Cli {
    /// Address to accept client connections on
    #[arg(short, long, default_value = "0.0.0.0:8443")]
    listen: SocketAddr,

    /// Upstream for connections without a matching route
    #[arg(short, long)]
    upstream: SocketAddr,

    /// Send a JA3 hash to its own upstream: HASH=ADDR (repeatable)
    #[arg(short, long = "route")]
    routes: Vec<String>,

    /// How long to wait for a complete ClientHello, in milliseconds
    #[arg(long, default_value_t = 5000)]
    preread_timeout_ms: u64,

    /// Maximum bytes buffered while waiting for the ClientHello
    #[arg(long, default_value_t = DEFAULT_MAX_PREREAD)]
    max_preread: usize,

    /// Output format: "text" (human-readable) or "json" (NDJSON, one object per line)
    #[arg(short, long, default_value = "text")]
    output: String,

    /// Print verbose output (raw JA3 strings)
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    let format = output::OutputFormat::parse(&cli.output)?;
    let routes = routes::RouteTable::parse(cli.upstream, &cli.routes)?;
    let route_count = routes.len();

    let registry = VariableRegistry::with_ja3();
    let config = Arc::new(connection::ProxyConfig::new(
        &registry,
        routes,
        Duration::from_millis(cli.preread_timeout_ms),
        cli.max_preread,
        format,
        cli.verbose,
    )?);

    let listener = TcpListener::bind(cli.listen)
        .await
        .with_context(|| format!("Failed to bind {}", cli.listen))?;

    info!("ja3print proxy listening on {}", cli.listen);
    info!(
        "Default upstream: {} ({} JA3 routes)",
        cli.upstream, route_count
    );

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                error!("accept failed: {}", e);
                continue;
            }
        };

        let config = Arc::clone(&config);
        tokio::spawn(async move {
            if let Err(e) = connection::handle(stream, peer, &config).await {
                error!("[{}] {:#}", peer, e);
            }
        });
    }
}

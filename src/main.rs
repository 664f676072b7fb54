//! HerdStore node binary.
//!
//! One process is one cluster member.  The orchestrator starts each
//! node with its role, port and peer list; everything after that runs
//! over the HTTP surface.  SIGTERM/SIGINT stop accepting connections
//! and let in-flight requests finish -- recovery happens on the next
//! startup from the snapshot and WAL.

use std::sync::Arc;

use clap::Parser;
use tracing::info;

use herdstore::config::LoggingConfig;
use herdstore::Role;

/// Command-line arguments for a HerdStore node.
#[derive(Parser, Debug)]
#[command(name = "herdstore", version, about = "Replicated key-value store node")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long)]
    config: Option<String>,

    /// Starting role: leader or follower.
    #[arg(long)]
    role: Option<Role>,

    /// Port to listen on; doubles as the node identifier.
    #[arg(long)]
    port: Option<u16>,

    /// Ports of the peer nodes.
    #[arg(long, num_args = 1..)]
    peers: Option<Vec<u16>>,

    /// Bind host address.
    #[arg(long)]
    host: Option<String>,

    /// Directory for snapshot.json and wal.log.
    #[arg(long)]
    data_dir: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => herdstore::config::load_config(path)?,
        None => herdstore::Config::default(),
    };

    // CLI flags win over the config file; the orchestrator drives nodes
    // entirely through them.
    if let Some(role) = cli.role {
        config.node.role = role;
    }
    if let Some(port) = cli.port {
        config.node.port = port;
    }
    if let Some(host) = cli.host {
        config.node.host = host;
    }
    if let Some(peers) = cli.peers {
        config.cluster.peers = peers;
    }
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }
    config.validate()?;

    init_tracing(&config.logging);
    if let Some(path) = &cli.config {
        info!("loaded configuration from {}", path);
    }

    // Initialize Prometheus metrics recorder and register metric descriptions.
    herdstore::metrics::init_metrics();
    herdstore::metrics::describe_metrics();

    // Every startup is a recovery: the node comes up from whatever the
    // snapshot and WAL hold.
    let node = Arc::new(herdstore::Node::new(config.clone())?);
    let _background = herdstore::spawn_background(Arc::clone(&node));

    let app = herdstore::server::app(Arc::clone(&node));

    let bind_addr = format!("{}:{}", config.node.host, config.node.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(id = node.id, role = %config.node.role, "herdstore listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(id = node.id, "herdstore shut down");

    Ok(())
}

/// Initialize tracing from the logging config; `RUST_LOG` wins when set.
fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    if logging.format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        },
    }
}

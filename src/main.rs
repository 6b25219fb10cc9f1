use clap::Parser;
use pbft_common::{PbftConfig, Wallet};
use pbft_replica::network::ReplicaNetwork;
use pbft_replica::{rest_api, Replica};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Command line arguments for a PBFT node
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Secret the node's keypair is derived from (e.g. "NODE-0")
    #[arg(short, long)]
    secret: String,

    /// Host to bind both servers on
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// WebSocket port for peer traffic
    #[arg(short, long, default_value_t = 8080)]
    ws_port: u16,

    /// Admin HTTP port, defaults to ws-port + 10000
    #[arg(long)]
    http_port: Option<u16>,

    /// Comma separated peer addresses (host:port)
    #[arg(short, long, value_delimiter = ',')]
    peers: Vec<String>,

    /// Path to the YAML configuration file
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match &args.config {
        Some(path) => match PbftConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load config: {}", e);
                return;
            }
        },
        None => PbftConfig::default(),
    };

    let http_port = match args.http_port {
        Some(port) => port,
        None => match args.ws_port.checked_add(10000) {
            Some(port) => port,
            None => {
                error!("ws-port {} leaves no room for the default http port", args.ws_port);
                return;
            }
        },
    };
    let ws_addr = format!("{}:{}", args.host, args.ws_port);
    let http_addr = format!("{}:{}", args.host, http_port);

    let network = Arc::new(ReplicaNetwork::new());
    let replica = match Replica::new(network, Wallet::new(&args.secret), config) {
        Ok(replica) => Arc::new(replica),
        Err(e) => {
            error!("Failed to create replica: {}", e);
            return;
        }
    };

    info!(
        "Starting node {} on {} (threshold {}, {} validators)",
        replica.public_key().short(),
        ws_addr,
        replica.config().tx_threshold,
        replica.config().num_of_nodes
    );
    if let Err(e) = replica.clone().run(&ws_addr, &args.peers).await {
        error!("Replica failed: {}", e);
        return;
    }

    let app = rest_api::router(replica);
    let listener = match TcpListener::bind(&http_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind admin API on {}: {}", http_addr, e);
            return;
        }
    };
    info!("Starting admin API on {}", http_addr);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Admin API failed: {}", e);
        }
    });

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to wait for shutdown signal: {}", e);
    }
    info!("Shutting down");
}

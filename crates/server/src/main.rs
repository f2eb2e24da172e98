//! TWAP oracle - Uniswap V3 spot/TWAP/slippage over WebSocket
//!
//! Main entry point for the streaming server

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use twap_core::AppConfig;
use twap_price_feed::{
    AggregatorConfig, PriceAggregator, RpcTransport, SharedSnapshotCache, SnapshotSource,
};
use twap_server::{Publisher, WsServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("Starting TWAP oracle v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;
    let rpc_url = config.rpc_url()?;

    // Connect to Ethereum
    let transport = RpcTransport::connect(rpc_url)
        .await
        .context("Failed to connect to Ethereum RPC")?;
    info!(chain_id = transport.chain_id(), pools = config.pools.len(), "Price feed ready");

    // Create aggregator over the configured pools
    let aggregator_config = AggregatorConfig {
        read_timeout: config.publisher.read_timeout(),
    };
    let aggregator = PriceAggregator::new(aggregator_config, config.pools.clone(), Arc::new(transport));

    for pool in aggregator.pools() {
        info!(pair = %pool.pair, address = %pool.address, abi = pool.abi.name(), "Pool registered");
    }

    let source: Arc<dyn SnapshotSource> = if config.publisher.shared_cache {
        warn!(
            max_age = ?config.publisher.cache_max_age(),
            "Shared snapshot cache enabled; subscribers with equal windows share reads"
        );
        Arc::new(SharedSnapshotCache::new(aggregator, config.publisher.cache_max_age()))
    } else {
        Arc::new(aggregator)
    };

    let publisher = Publisher::new(source, config.publisher.interval());
    let server = WsServer::new(config.server.clone(), publisher);

    // Setup shutdown channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    // Spawn shutdown signal handler
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    error!("Failed to install signal handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received Ctrl+C");
            }
            _ = terminate => {
                info!("Received termination signal");
            }
        }

        let _ = shutdown_tx.send(());
    });

    // Start server
    info!("WebSocket server listening on ws://{}{}", server.address(), server.path());
    info!("Press Ctrl+C to shutdown");

    if let Err(e) = server.start_with_shutdown(shutdown_rx).await {
        error!("Server error: {}", e);
        return Err(e);
    }

    info!("Server shutdown complete");
    Ok(())
}

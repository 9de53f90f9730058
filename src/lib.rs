pub mod chain_adapter;
pub mod commands;
pub mod config;

use tracing_subscriber::EnvFilter;

pub use chain_adapter::{ChainAdapterError, ChiaRpcClient, FullNodeRpc, WalletRpc};
pub use commands::CommandError;
pub use config::{ConfigError, RpcConfig, Service};

// ============================================================================
// Logging
// ============================================================================

/// Install the stderr log subscriber. `RUST_LOG` wins unless `verbose`
/// forces debug output.
pub fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    // A second call (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

// ============================================================================
// Service clients
// ============================================================================

pub fn full_node_client(config: &RpcConfig) -> Result<FullNodeRpc, ChainAdapterError> {
    ChiaRpcClient::for_service(config, Service::FullNode).map(FullNodeRpc)
}

/// Wallet client, logged in as `fingerprint` when given.
pub async fn wallet_client(
    config: &RpcConfig,
    fingerprint: Option<u32>,
) -> Result<WalletRpc, CommandError> {
    let wallet = WalletRpc(ChiaRpcClient::for_service(config, Service::Wallet)?);
    if let Some(fingerprint) = fingerprint {
        wallet.log_in(fingerprint).await?;
    }
    Ok(wallet)
}

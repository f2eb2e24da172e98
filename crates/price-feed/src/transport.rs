//! Contract-call transport
//!
//! The engine only needs "send a read-only call, get bytes back". `RpcTransport`
//! does that over an alloy provider; tests plug in an in-memory transport.

use alloy::network::TransactionBuilder;
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::eth::TransactionRequest;
use alloy::transports::BoxTransport;
use alloy_primitives::{Address, Bytes};
use tracing::{debug, info};

use twap_core::{PriceError, PriceResult};

/// Issues read-only contract calls
///
/// Implementations must tolerate concurrent calls from many pool tasks.
#[async_trait::async_trait]
pub trait CallTransport: Send + Sync {
    /// `eth_call` against `to` with ABI-encoded `input`
    async fn call(&self, to: Address, input: Bytes) -> PriceResult<Bytes>;
}

/// JSON-RPC transport over http(s) or ws(s)
pub struct RpcTransport {
    provider: RootProvider<BoxTransport>,
    chain_id: u64,
}

impl RpcTransport {
    /// Connect and query the chain id; an unreachable node is an error here,
    /// not on the first pool read
    pub async fn connect(rpc_url: &str) -> anyhow::Result<Self> {
        info!("Connecting to RPC endpoint");

        let provider = ProviderBuilder::new().on_builtin(rpc_url).await?;
        let chain_id = provider.get_chain_id().await?;

        info!(chain_id, "Connected to Ethereum");
        Ok(Self::with_provider(provider, chain_id))
    }

    /// Wrap an existing provider without probing it
    pub fn with_provider(provider: RootProvider<BoxTransport>, chain_id: u64) -> Self {
        Self { provider, chain_id }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }
}

#[async_trait::async_trait]
impl CallTransport for RpcTransport {
    async fn call(&self, to: Address, input: Bytes) -> PriceResult<Bytes> {
        debug!(%to, len = input.len(), "eth_call");

        let tx = TransactionRequest::default().with_to(to).with_input(input);

        self.provider
            .call(&tx)
            .await
            .map_err(|e| PriceError::Transport(e.to_string()))
    }
}

//! In-memory transport serving ABI-encoded pool state
//!
//! Enabled for this crate's tests and, through the `test-util` feature, for
//! downstream test suites.

use alloy_primitives::{aliases::U160, Address, Bytes, U256};
use alloy_sol_types::SolCall;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use twap_core::{PriceError, PriceResult};

use crate::reader::IUniswapV3PoolState::{observeCall, slot0Call};
use crate::transport::CallTransport;

/// Canned state for one pool
#[derive(Debug, Clone)]
pub struct MockPool {
    pub sqrt_price_x96: U256,
    pub tick: i32,
    pub tick_cumulatives: Vec<i64>,
    pub delay: Option<Duration>,
    pub failure: Option<String>,
    pub raw_output: Option<Bytes>,
}

impl MockPool {
    pub fn new(sqrt_price_x96: U256, tick_cumulatives: Vec<i64>) -> Self {
        Self {
            sqrt_price_x96,
            tick: 0,
            tick_cumulatives,
            delay: None,
            failure: None,
            raw_output: None,
        }
    }

    pub fn with_tick(mut self, tick: i32) -> Self {
        self.tick = tick;
        self
    }

    /// Sleep before answering each call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every call with a transport error
    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    /// Answer every call with these bytes instead of a valid encoding
    pub fn with_raw_output(mut self, output: Bytes) -> Self {
        self.raw_output = Some(output);
        self
    }
}

/// [`CallTransport`] backed by a map of [`MockPool`]s
#[derive(Debug, Default)]
pub struct MockTransport {
    pools: HashMap<Address, MockPool>,
    calls: AtomicUsize,
    last_seconds_agos: Mutex<Option<Vec<u32>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pool(mut self, address: Address, pool: MockPool) -> Self {
        self.pools.insert(address, pool);
        self
    }

    /// Total calls answered or failed
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// `secondsAgos` of the most recent `observe` call
    pub fn last_seconds_agos(&self) -> Option<Vec<u32>> {
        self.last_seconds_agos.lock().clone()
    }

    fn respond(&self, pool: &MockPool, input: &[u8]) -> PriceResult<Bytes> {
        if let Some(raw) = &pool.raw_output {
            return Ok(raw.clone());
        }

        let selector = input.get(..4).unwrap_or_default();
        if selector == slot0Call::SELECTOR {
            let sqrt = U256::from(U160::from(pool.sqrt_price_x96));
            let encoded =
                slot0Call::abi_encode_returns(&(sqrt, pool.tick, 0u16, 1u16, 1u16, 0u8, true));
            return Ok(Bytes::from(encoded));
        }

        if selector == observeCall::SELECTOR {
            let call = observeCall::abi_decode(input, true)
                .map_err(|e| PriceError::Transport(e.to_string()))?;
            *self.last_seconds_agos.lock() = Some(call.secondsAgos);

            let seconds_per_liquidity = vec![U256::from(U160::ZERO); pool.tick_cumulatives.len()];
            let encoded = observeCall::abi_encode_returns(&(
                pool.tick_cumulatives.clone(),
                seconds_per_liquidity,
            ));
            return Ok(Bytes::from(encoded));
        }

        Err(PriceError::Transport("execution reverted".to_string()))
    }
}

#[async_trait::async_trait]
impl CallTransport for MockTransport {
    async fn call(&self, to: Address, input: Bytes) -> PriceResult<Bytes> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        let pool = self
            .pools
            .get(&to)
            .ok_or_else(|| PriceError::Transport(format!("no contract at {to}")))?;

        if let Some(delay) = pool.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &pool.failure {
            return Err(PriceError::Transport(message.clone()));
        }

        self.respond(pool, &input)
    }
}

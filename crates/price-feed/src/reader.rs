//! Pool state reads
//!
//! Exactly one contract call per operation: `slot0()` for the packed price
//! state, `observe([0, window])` for the cumulative tick pair.

use alloy_primitives::{Bytes, U256};
use alloy_sol_types::{sol, SolCall};
use std::sync::Arc;
use tracing::trace;

use twap_core::{
    CumulativeObservation, PoolAbi, PoolConfig, PriceError, PriceResult, Slot0Snapshot,
    TwapWindow,
};

use crate::transport::CallTransport;

sol! {
    /// Read-only subset of the Uniswap V3 pool interface
    #[derive(Debug)]
    interface IUniswapV3PoolState {
        function slot0() external view returns (
            uint160 sqrtPriceX96,
            int24 tick,
            uint16 observationIndex,
            uint16 observationCardinality,
            uint16 observationCardinalityNext,
            uint8 feeProtocol,
            bool unlocked
        );

        function observe(uint32[] calldata secondsAgos) external view returns (
            int56[] memory tickCumulatives,
            uint160[] memory secondsPerLiquidityCumulativeX128s
        );
    }
}

use IUniswapV3PoolState::{observeCall, slot0Call};

/// Reads raw pool state through a [`CallTransport`]
pub struct PoolReader<T: ?Sized> {
    transport: Arc<T>,
}

impl<T: CallTransport + ?Sized> PoolReader<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }

    /// Current sqrt price, tick and observation bookkeeping
    pub async fn read_slot0(&self, pool: &PoolConfig) -> PriceResult<Slot0Snapshot> {
        match pool.abi {
            PoolAbi::UniswapV3 => {
                let input = slot0Call {}.abi_encode();
                let output = self.transport.call(pool.address, Bytes::from(input)).await?;
                trace!(pair = %pool.pair, len = output.len(), "slot0 returned");
                decode_slot0(&output)
            }
        }
    }

    /// Tick cumulatives at [now, now - window]
    pub async fn read_cumulative(
        &self,
        pool: &PoolConfig,
        window: TwapWindow,
    ) -> PriceResult<CumulativeObservation> {
        match pool.abi {
            PoolAbi::UniswapV3 => {
                let input = observeCall {
                    secondsAgos: vec![0, window.secs()],
                }
                .abi_encode();
                let output = self.transport.call(pool.address, Bytes::from(input)).await?;
                trace!(pair = %pool.pair, len = output.len(), "observe returned");
                decode_observe(&output)
            }
        }
    }
}

fn decode_error(err: impl std::fmt::Display) -> PriceError {
    PriceError::Decode(err.to_string())
}

fn decode_slot0(data: &[u8]) -> PriceResult<Slot0Snapshot> {
    let ret = slot0Call::abi_decode_returns(data, true).map_err(decode_error)?;

    Ok(Slot0Snapshot {
        sqrt_price_x96: U256::from(ret.sqrtPriceX96),
        tick: i32::try_from(ret.tick).map_err(|_| decode_error("tick out of range"))?,
        observation_index: ret.observationIndex,
        observation_cardinality: ret.observationCardinality,
        observation_cardinality_next: ret.observationCardinalityNext,
        fee_protocol: ret.feeProtocol,
        unlocked: ret.unlocked,
    })
}

fn decode_observe(data: &[u8]) -> PriceResult<CumulativeObservation> {
    let ret = observeCall::abi_decode_returns(data, true).map_err(decode_error)?;

    let tick_cumulatives = ret
        .tickCumulatives
        .into_iter()
        .map(|c| i64::try_from(c).map_err(|_| decode_error("tick cumulative out of range")))
        .collect::<PriceResult<Vec<_>>>()?;
    let seconds_per_liquidity = ret
        .secondsPerLiquidityCumulativeX128s
        .into_iter()
        .map(U256::from)
        .collect();

    CumulativeObservation::new(tick_cumulatives, seconds_per_liquidity)
}

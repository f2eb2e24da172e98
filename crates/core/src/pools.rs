//! Pool definitions
//!
//! Every priced pool is described by static configuration: address, pair label,
//! quoting decimals and the ABI used to read it. Nothing here is validated
//! against an on-chain registry.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

/// Default number of fractional digits in published prices
pub const DEFAULT_PRECISION: u32 = 8;

/// Contract interface used to read a pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolAbi {
    /// `slot0()` and `observe(uint32[])`
    #[default]
    UniswapV3,
}

impl PoolAbi {
    pub fn name(&self) -> &'static str {
        match self {
            PoolAbi::UniswapV3 => "uniswap-v3",
        }
    }
}

/// Static description of one priced pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub address: Address,
    /// Label used as the key in published snapshots, e.g. "WBTC/USDC" (quote per one base)
    pub pair: String,
    /// Quoting decimals; prices are scaled by 10^(decimals1 - decimals0)
    pub decimals0: u8,
    pub decimals1: u8,
    #[serde(default)]
    pub abi: PoolAbi,
    /// Fractional digits of spot/TWAP strings (18 for wei-scale pairs)
    #[serde(default = "default_precision")]
    pub precision: u32,
    /// Extra 10^n applied after normalization, for pairs whose quoting convention
    /// differs from their on-chain decimals
    #[serde(default)]
    pub price_adjustment_exponent: i32,
    /// Publish slippage for this pool
    #[serde(default = "default_slippage")]
    pub slippage: bool,
}

fn default_precision() -> u32 {
    DEFAULT_PRECISION
}

fn default_slippage() -> bool {
    true
}

impl PoolConfig {
    pub fn new(address: Address, pair: &str, decimals0: u8, decimals1: u8) -> Self {
        Self {
            address,
            pair: pair.to_string(),
            decimals0,
            decimals1,
            abi: PoolAbi::UniswapV3,
            precision: DEFAULT_PRECISION,
            price_adjustment_exponent: 0,
            slippage: true,
        }
    }

    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_price_adjustment(mut self, exponent: i32) -> Self {
        self.price_adjustment_exponent = exponent;
        self
    }

    pub fn without_slippage(mut self) -> Self {
        self.slippage = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_defaults() {
        let json = r#"{
            "address": "0x8ad599c3a0ff1de082011efddc58f1908eb6e6d8",
            "pair": "WETH/USDC",
            "decimals0": 18,
            "decimals1": 6
        }"#;
        let pool: PoolConfig = serde_json::from_str(json).unwrap();

        assert_eq!(pool.pair, "WETH/USDC");
        assert_eq!(pool.abi, PoolAbi::UniswapV3);
        assert_eq!(pool.precision, DEFAULT_PRECISION);
        assert_eq!(pool.price_adjustment_exponent, 0);
        assert!(pool.slippage);
    }

    #[test]
    fn test_builder() {
        let pool = PoolConfig::new(Address::repeat_byte(1), "PEPE/ETH", 18, 18)
            .with_precision(18)
            .with_price_adjustment(-12)
            .without_slippage();

        assert_eq!(pool.precision, 18);
        assert_eq!(pool.price_adjustment_exponent, -12);
        assert!(!pool.slippage);
    }
}

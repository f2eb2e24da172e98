//! Multi-pool snapshots and their wire format

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::math::format_fixed;
use crate::types::{PricePoint, TwapWindow};

/// Slippage is always published with this many fractional digits
pub const SLIPPAGE_PRECISION: u32 = 8;

/// A price point together with the precision it is published at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedPool {
    pub point: PricePoint,
    pub precision: u32,
}

/// Prices of every pool that succeeded in one cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pools: BTreeMap<String, PricedPool>,
    window: TwapWindow,
}

impl Snapshot {
    pub fn new(window: TwapWindow, pools: BTreeMap<String, PricedPool>) -> Self {
        Self { pools, window }
    }

    pub fn empty(window: TwapWindow) -> Self {
        Self::new(window, BTreeMap::new())
    }

    pub fn window(&self) -> TwapWindow {
        self.window
    }

    pub fn get(&self, pair: &str) -> Option<&PricedPool> {
        self.pools.get(pair)
    }

    pub fn pairs(&self) -> impl Iterator<Item = &str> {
        self.pools.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Fixed-point string form sent to subscribers
    pub fn to_payload(&self) -> SnapshotPayload {
        let pools = self
            .pools
            .iter()
            .map(|(pair, priced)| {
                let entry = PoolPricePayload {
                    spot_price: format_fixed(priced.point.spot, priced.precision),
                    twap_price: format_fixed(priced.point.twap, priced.precision),
                    slippage_percent: priced
                        .point
                        .slippage
                        .map(|s| format_fixed(s, SLIPPAGE_PRECISION)),
                };
                (pair.clone(), entry)
            })
            .collect();

        SnapshotPayload {
            pools,
            window: self.window.secs(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.to_payload())
    }
}

/// JSON document pushed once per cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotPayload {
    pub pools: BTreeMap<String, PoolPricePayload>,
    pub window: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolPricePayload {
    pub spot_price: String,
    pub twap_price: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slippage_percent: Option<String>,
}

impl PoolPricePayload {
    /// Parse the decimal strings back
    pub fn decimals(&self) -> Option<(Decimal, Decimal, Option<Decimal>)> {
        let spot = self.spot_price.parse().ok()?;
        let twap = self.twap_price.parse().ok()?;
        let slippage = match &self.slippage_percent {
            Some(s) => Some(s.parse().ok()?),
            None => None,
        };
        Some((spot, twap, slippage))
    }
}

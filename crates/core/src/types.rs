//! Core type definitions

use alloy_primitives::U256;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{PriceError, PriceResult};

/// TWAP window in seconds, always within [`TwapWindow::MIN_SECS`, `TwapWindow::MAX_SECS`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct TwapWindow(u32);

impl TwapWindow {
    pub const MIN_SECS: u32 = 30;
    pub const MAX_SECS: u32 = 86_400;
    pub const DEFAULT_SECS: u32 = 900;

    pub const DEFAULT: TwapWindow = TwapWindow(Self::DEFAULT_SECS);

    /// `None` when outside the allowed range
    pub fn new(secs: u32) -> Option<Self> {
        (Self::MIN_SECS..=Self::MAX_SECS)
            .contains(&secs)
            .then_some(Self(secs))
    }

    /// Parse a `window` request value, falling back to the default when it is
    /// absent, unparseable or out of range
    pub fn from_param(param: Option<&str>) -> Self {
        param
            .filter(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|p| p.parse::<u32>().ok())
            .and_then(Self::new)
            .unwrap_or_default()
    }

    /// Extract and parse `window` from a raw query string such as `window=60&x=1`
    ///
    /// The value is percent-decoded first; the first `window` key wins.
    pub fn from_query(query: Option<&str>) -> Self {
        let param = query.and_then(|q| {
            form_urlencoded::parse(q.as_bytes())
                .find(|(key, _)| key == "window")
                .map(|(_, value)| value.into_owned())
        });
        Self::from_param(param.as_deref())
    }

    pub fn secs(&self) -> u32 {
        self.0
    }
}

impl Default for TwapWindow {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u32> for TwapWindow {
    type Error = String;

    fn try_from(secs: u32) -> Result<Self, Self::Error> {
        Self::new(secs).ok_or_else(|| {
            format!(
                "window {}s outside [{}, {}]",
                secs,
                Self::MIN_SECS,
                Self::MAX_SECS
            )
        })
    }
}

impl From<TwapWindow> for u32 {
    fn from(window: TwapWindow) -> Self {
        window.0
    }
}

impl fmt::Display for TwapWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

/// Decoded `slot0()` result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot0Snapshot {
    pub sqrt_price_x96: U256,
    pub tick: i32,
    pub observation_index: u16,
    pub observation_cardinality: u16,
    pub observation_cardinality_next: u16,
    pub fee_protocol: u8,
    pub unlocked: bool,
}

/// Decoded `observe(secondsAgos)` result, indexed like the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CumulativeObservation {
    tick_cumulatives: Vec<i64>,
    seconds_per_liquidity_cumulative_x128: Vec<U256>,
}

impl CumulativeObservation {
    /// Index 0 is "now", index 1 is "window seconds ago"
    pub fn new(
        tick_cumulatives: Vec<i64>,
        seconds_per_liquidity_cumulative_x128: Vec<U256>,
    ) -> PriceResult<Self> {
        if tick_cumulatives.len() < 2 {
            return Err(PriceError::InsufficientData {
                available: tick_cumulatives.len(),
            });
        }
        Ok(Self {
            tick_cumulatives,
            seconds_per_liquidity_cumulative_x128,
        })
    }

    pub fn tick_cumulatives(&self) -> &[i64] {
        &self.tick_cumulatives
    }

    pub fn seconds_per_liquidity_cumulative_x128(&self) -> &[U256] {
        &self.seconds_per_liquidity_cumulative_x128
    }

    /// Arithmetic mean tick over the window; the division is done in floating
    /// point so fractional ticks survive
    pub fn average_tick(&self, window: TwapWindow) -> f64 {
        let tick_diff = self.tick_cumulatives[0] - self.tick_cumulatives[1];
        tick_diff as f64 / f64::from(window.secs())
    }
}

/// Spot, TWAP and slippage for one pool at one point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricePoint {
    pub spot: Decimal,
    pub twap: Decimal,
    /// Percent; `None` when the pool does not publish slippage
    pub slippage: Option<Decimal>,
}

//! Per-pool price computation
//!
//! One parameterized engine prices every configured pool: the pool's decimals,
//! adjustment exponent and slippage flag are the only things that vary.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

use twap_core::math::{price_from_sqrt_x96_scaled, price_from_tick_scaled, slippage_percent};
use twap_core::{
    CumulativeObservation, PoolConfig, PoolError, PricePoint, PriceResult, Slot0Snapshot,
    TwapWindow,
};

use crate::reader::PoolReader;
use crate::transport::CallTransport;

/// Computes spot, TWAP and slippage for one pool at a time
pub struct PriceEngine<T: ?Sized> {
    reader: PoolReader<T>,
}

impl<T: CallTransport + ?Sized> PriceEngine<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            reader: PoolReader::new(transport),
        }
    }

    /// Read the pool twice and derive its [`PricePoint`]
    ///
    /// Errors carry the pool address and the failing stage. No retries happen
    /// here; the next publish cycle is the retry.
    pub async fn compute_price_point(
        &self,
        pool: &PoolConfig,
        window: TwapWindow,
    ) -> Result<PricePoint, PoolError> {
        self.compute(pool, window)
            .await
            .map_err(|e| PoolError::new(pool.address, pool.pair.as_str(), e))
    }

    async fn compute(&self, pool: &PoolConfig, window: TwapWindow) -> PriceResult<PricePoint> {
        let slot0 = self.reader.read_slot0(pool).await?;
        let spot = spot_price(pool, &slot0)?;

        let observation = self.reader.read_cumulative(pool, window).await?;
        let twap = twap_price(pool, &observation, window)?;

        let slippage = if pool.slippage {
            Some(slippage_percent(spot, twap)?)
        } else {
            None
        };

        debug!(
            pair = %pool.pair,
            tick = slot0.tick,
            %spot,
            %twap,
            window = window.secs(),
            "Priced pool"
        );

        Ok(PricePoint { spot, twap, slippage })
    }
}

/// Spot price from the packed sqrt price
pub fn spot_price(pool: &PoolConfig, slot0: &Slot0Snapshot) -> PriceResult<Decimal> {
    Ok(price_from_sqrt_x96_scaled(
        slot0.sqrt_price_x96,
        quote_exponent(pool),
    )?)
}

/// TWAP from the cumulative tick pair
pub fn twap_price(
    pool: &PoolConfig,
    observation: &CumulativeObservation,
    window: TwapWindow,
) -> PriceResult<Decimal> {
    let avg_tick = observation.average_tick(window);
    Ok(price_from_tick_scaled(avg_tick, quote_exponent(pool))?)
}

/// Decimal normalization plus the pool's own adjustment, as one power of ten
///
/// Applied before the raw ratio becomes a `Decimal`, so small ratios keep
/// their digits.
pub fn quote_exponent(pool: &PoolConfig) -> i32 {
    i32::from(pool.decimals1) - i32::from(pool.decimals0) + pool.price_adjustment_exponent
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockPool, MockTransport};
    use alloy_primitives::{Address, U256};
    use rust_decimal::prelude::*;
    use std::str::FromStr;
    use twap_core::math::{price_from_tick, significant_digits, LN_1_0001, MIN_SIGNIFICANT_DIGITS};
    use twap_core::{MathError, PriceError, Stage};

    const Q96: u32 = 96;

    fn engine(mock: MockTransport) -> PriceEngine<MockTransport> {
        PriceEngine::new(Arc::new(mock))
    }

    fn approx(a: Decimal, b: Decimal, tolerance: f64) -> bool {
        let (a, b) = (a.to_f64().unwrap(), b.to_f64().unwrap());
        ((a - b) / b).abs() < tolerance
    }

    #[tokio::test]
    async fn test_twap_example() {
        let pool = PoolConfig::new(Address::repeat_byte(1), "A/B", 18, 18);
        let mock = MockTransport::new().with_pool(
            pool.address,
            MockPool::new(U256::from(1u8) << Q96, vec![100_000, 99_100]),
        );

        let point = engine(mock)
            .compute_price_point(&pool, TwapWindow::DEFAULT)
            .await
            .unwrap();

        assert_eq!(point.spot, Decimal::ONE);
        assert_eq!(point.twap, price_from_tick(1.0).unwrap());
        let slippage = point.slippage.unwrap().to_f64().unwrap();
        assert!((slippage - 0.009999).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_negative_ticks_and_decimals() {
        // raw spot 0.25 with 10^(6-18) scaling
        let pool = PoolConfig::new(Address::repeat_byte(2), "USDC/WETH", 18, 6);
        let mock = MockTransport::new().with_pool(
            pool.address,
            MockPool::new(U256::from(1u8) << 95, vec![-1_386_000, 0]),
        );
        let window = TwapWindow::new(100).unwrap();

        let point = engine(mock).compute_price_point(&pool, window).await.unwrap();

        assert_eq!(point.spot, Decimal::from_str("0.00000000000025").unwrap());
        // avg tick -13860 is about 0.25 before scaling
        assert!(approx(point.twap, Decimal::from_str("0.00000000000025").unwrap(), 1e-3));
        assert!(point.slippage.unwrap() < Decimal::ONE);
    }

    #[tokio::test]
    async fn test_price_adjustment_exponent() {
        let base = PoolConfig::new(Address::repeat_byte(3), "DAI/USDC", 6, 18);
        let adjusted = base.clone().with_price_adjustment(-12);
        let mock = MockTransport::new().with_pool(
            base.address,
            MockPool::new(U256::from(1u8) << Q96, vec![0, 0]),
        );
        let engine = engine(mock);

        let plain = engine.compute_price_point(&base, TwapWindow::DEFAULT).await.unwrap();
        let shifted = engine.compute_price_point(&adjusted, TwapWindow::DEFAULT).await.unwrap();

        assert_eq!(plain.spot, Decimal::from(1_000_000_000_000u64));
        assert_eq!(shifted.spot, Decimal::ONE);
        assert_eq!(shifted.twap, Decimal::ONE);
        // slippage is scale-free
        assert_eq!(plain.slippage, shifted.slippage);
    }

    #[tokio::test]
    async fn test_slippage_disabled() {
        let pool = PoolConfig::new(Address::repeat_byte(4), "A/B", 18, 18).without_slippage();
        let mock = MockTransport::new()
            .with_pool(pool.address, MockPool::new(U256::from(1u8) << Q96, vec![10, 0]));

        let point = engine(mock)
            .compute_price_point(&pool, TwapWindow::DEFAULT)
            .await
            .unwrap();
        assert!(point.slippage.is_none());
    }

    #[tokio::test]
    async fn test_errors_are_tagged() {
        let pool = PoolConfig::new(Address::repeat_byte(5), "A/B", 18, 18);
        let mock = MockTransport::new()
            .with_pool(pool.address, MockPool::new(U256::from(1u8) << Q96, vec![10]));

        let err = engine(mock)
            .compute_price_point(&pool, TwapWindow::DEFAULT)
            .await
            .unwrap_err();

        assert_eq!(err.pool, pool.address);
        assert_eq!(err.pair, "A/B");
        assert_eq!(err.stage, Stage::Decode);
        assert!(matches!(err.source, PriceError::InsufficientData { available: 1 }));
    }

    #[tokio::test]
    async fn test_small_prices_keep_significant_digits() {
        // raw ratios near 1e-20 on an 18-decimal token quoted in a 6-decimal stable
        let pool = PoolConfig::new(Address::repeat_byte(6), "MEME/USDC", 6, 18).with_precision(18);
        let mock = MockTransport::new().with_pool(
            pool.address,
            MockPool::new(U256::from(8_139_000_000_000_000_000u64), vec![-46_000_000, 0]),
        );

        let point = engine(mock)
            .compute_price_point(&pool, TwapWindow::new(100).unwrap())
            .await
            .unwrap();

        assert_eq!(
            point.spot,
            Decimal::from_i128_with_scale(105_531_698_851_650_509_704, 28)
        );
        assert!(significant_digits(point.spot) >= MIN_SIGNIFICANT_DIGITS);
        assert!(significant_digits(point.twap) >= MIN_SIGNIFICANT_DIGITS);

        let expected_twap = (-460_000.0 * LN_1_0001).exp() * 1e12;
        assert!(approx(point.twap, Decimal::from_f64(expected_twap).unwrap(), 1e-12));
    }

    #[tokio::test]
    async fn test_unrepresentable_twap_is_math_error() {
        // 1e-20 shifted down another 28 places cannot keep its digits
        let pool = PoolConfig::new(Address::repeat_byte(7), "A/B", 28, 0);
        let mock = MockTransport::new().with_pool(
            pool.address,
            MockPool::new(U256::from(1u8) << Q96, vec![-46_000_000, 0]),
        );

        let err = engine(mock)
            .compute_price_point(&pool, TwapWindow::new(100).unwrap())
            .await
            .unwrap_err();

        assert_eq!(err.stage, Stage::Compute);
        assert!(matches!(
            err.source,
            PriceError::Math(MathError::PrecisionLoss(_))
        ));
    }

    #[test]
    fn test_quote_exponent() {
        let pool = PoolConfig::new(Address::ZERO, "DAI/USDC", 6, 18);
        assert_eq!(quote_exponent(&pool), 12);
        assert_eq!(quote_exponent(&pool.with_price_adjustment(-12)), 0);
    }

    #[test]
    fn test_spot_price_zero_sqrt() {
        let pool = PoolConfig::new(Address::ZERO, "A/B", 6, 18);
        let slot0 = Slot0Snapshot {
            sqrt_price_x96: U256::ZERO,
            tick: 0,
            observation_index: 0,
            observation_cardinality: 1,
            observation_cardinality_next: 1,
            fee_protocol: 0,
            unlocked: true,
        };
        assert_eq!(spot_price(&pool, &slot0).unwrap(), Decimal::ZERO);
    }
}

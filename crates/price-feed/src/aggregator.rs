//! Snapshot aggregator - prices every configured pool concurrently

use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

use twap_core::{PoolConfig, PoolError, PriceError, PricePoint, PricedPool, Snapshot, TwapWindow};

use crate::engine::PriceEngine;
use crate::transport::CallTransport;

/// Anything that can produce a snapshot for a window
#[async_trait::async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn snapshot(&self, window: TwapWindow) -> Snapshot;
}

/// Aggregator configuration
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Deadline for one pool's reads; expiry counts as a normal pool failure
    pub read_timeout: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(2_500),
        }
    }
}

/// Runs the price engine over the pool set and assembles snapshots
pub struct PriceAggregator<T: ?Sized> {
    config: AggregatorConfig,
    pools: Arc<[PoolConfig]>,
    engine: PriceEngine<T>,
}

impl<T: CallTransport + ?Sized> PriceAggregator<T> {
    pub fn new(config: AggregatorConfig, pools: Vec<PoolConfig>, transport: Arc<T>) -> Self {
        Self {
            config,
            pools: pools.into(),
            engine: PriceEngine::new(transport),
        }
    }

    pub fn pools(&self) -> &[PoolConfig] {
        &self.pools
    }

    /// Price all pools concurrently and keep the ones that succeeded
    ///
    /// A failing or slow pool never holds back the others beyond the read
    /// timeout; it is logged and left out of this cycle's snapshot.
    pub async fn build_snapshot(&self, window: TwapWindow) -> Snapshot {
        let start = Instant::now();

        let tasks = self.pools.iter().map(|pool| self.price_pool(pool, window));
        let results = join_all(tasks).await;

        let mut priced = BTreeMap::new();
        for (pool, result) in self.pools.iter().zip(results) {
            match result {
                Ok(point) => {
                    priced.insert(
                        pool.pair.clone(),
                        PricedPool {
                            point,
                            precision: pool.precision,
                        },
                    );
                }
                Err(e) => {
                    warn!(
                        pool = %e.pool,
                        pair = %e.pair,
                        stage = %e.stage,
                        error = %e.source,
                        "Pool skipped this cycle"
                    );
                }
            }
        }

        debug!(
            priced = priced.len(),
            configured = self.pools.len(),
            window = window.secs(),
            "Snapshot built in {:?}",
            start.elapsed()
        );

        Snapshot::new(window, priced)
    }

    async fn price_pool(
        &self,
        pool: &PoolConfig,
        window: TwapWindow,
    ) -> Result<PricePoint, PoolError> {
        let deadline = self.config.read_timeout;

        match timeout(deadline, self.engine.compute_price_point(pool, window)).await {
            Ok(result) => result,
            Err(_) => Err(PoolError::new(
                pool.address,
                pool.pair.as_str(),
                PriceError::Timeout(deadline),
            )),
        }
    }
}

#[async_trait::async_trait]
impl<T: CallTransport + ?Sized> SnapshotSource for PriceAggregator<T> {
    async fn snapshot(&self, window: TwapWindow) -> Snapshot {
        self.build_snapshot(window).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockPool, MockTransport};
    use alloy_primitives::{Address, Bytes, U256};

    fn healthy() -> MockPool {
        MockPool::new(U256::from(1u8) << 96, vec![100_000, 99_100])
    }

    fn pool(byte: u8, pair: &str) -> PoolConfig {
        PoolConfig::new(Address::repeat_byte(byte), pair, 18, 18)
    }

    fn aggregator(
        pools: Vec<PoolConfig>,
        mock: MockTransport,
        read_timeout: Duration,
    ) -> PriceAggregator<MockTransport> {
        PriceAggregator::new(AggregatorConfig { read_timeout }, pools, Arc::new(mock))
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_successes() {
        let pools = vec![
            pool(1, "AAA/ETH"),
            pool(2, "BBB/ETH"),
            pool(3, "CCC/ETH"),
            pool(4, "DDD/ETH"),
        ];
        let mock = MockTransport::new()
            .with_pool(pools[0].address, healthy())
            .with_pool(pools[1].address, healthy().failing("connection reset"))
            .with_pool(pools[2].address, healthy())
            .with_pool(
                pools[3].address,
                healthy().with_raw_output(Bytes::from_static(b"nope")),
            );

        let snapshot = aggregator(pools, mock, Duration::from_secs(1))
            .build_snapshot(TwapWindow::DEFAULT)
            .await;

        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.get("AAA/ETH").is_some());
        assert!(snapshot.get("CCC/ETH").is_some());
        assert!(snapshot.get("BBB/ETH").is_none());
        assert_eq!(snapshot.window(), TwapWindow::DEFAULT);
    }

    #[tokio::test]
    async fn test_all_failures_yield_empty_snapshot() {
        let pools = vec![pool(1, "AAA/ETH"), pool(2, "BBB/ETH")];
        let mock = MockTransport::new();

        let snapshot = aggregator(pools, mock, Duration::from_secs(1))
            .build_snapshot(TwapWindow::DEFAULT)
            .await;

        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_slow_pool_times_out() {
        let pools = vec![pool(1, "FAST/ETH"), pool(2, "SLOW/ETH")];
        let mock = MockTransport::new()
            .with_pool(pools[0].address, healthy())
            .with_pool(pools[1].address, healthy().with_delay(Duration::from_secs(30)));

        let start = Instant::now();
        let snapshot = aggregator(pools, mock, Duration::from_millis(100))
            .build_snapshot(TwapWindow::DEFAULT)
            .await;

        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.get("FAST/ETH").is_some());
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_pools_run_concurrently() {
        let pools: Vec<_> = (1..=5u8).map(|i| pool(i, &format!("P{i}/ETH"))).collect();
        let mut mock = MockTransport::new();
        for p in &pools {
            mock = mock.with_pool(p.address, healthy().with_delay(Duration::from_millis(200)));
        }

        let start = Instant::now();
        let snapshot = aggregator(pools, mock, Duration::from_secs(5))
            .build_snapshot(TwapWindow::DEFAULT)
            .await;

        // two sequential 200ms reads per pool, five pools in parallel
        assert_eq!(snapshot.len(), 5);
        assert!(start.elapsed() < Duration::from_millis(1_500));
    }

    #[tokio::test]
    async fn test_precision_carried_into_snapshot() {
        let pepe = pool(1, "PEPE/ETH").with_precision(18);
        let mock = MockTransport::new().with_pool(pepe.address, healthy());

        let snapshot = aggregator(vec![pepe], mock, Duration::from_secs(1))
            .snapshot(TwapWindow::new(60).unwrap())
            .await;

        assert_eq!(snapshot.get("PEPE/ETH").unwrap().precision, 18);
        assert_eq!(snapshot.window().secs(), 60);
    }
}

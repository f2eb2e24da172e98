//! Pool price feed: reads Uniswap V3 pool state and turns it into snapshots
//!
//! Pipeline per cycle:
//! - `transport`: read-only contract calls (alloy JSON-RPC in production)
//! - `reader`: `slot0()` / `observe()` encoding and decoding
//! - `engine`: spot, TWAP and slippage for one pool
//! - `aggregator`: all pools concurrently, failures skipped
//! - `cache`: optional snapshot sharing between subscribers

pub mod transport;
pub mod reader;
pub mod engine;
pub mod aggregator;
pub mod cache;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use aggregator::{AggregatorConfig, PriceAggregator, SnapshotSource};
pub use cache::SharedSnapshotCache;
pub use engine::PriceEngine;
pub use reader::PoolReader;
pub use transport::{CallTransport, RpcTransport};

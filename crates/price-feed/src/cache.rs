//! Shared snapshot cache
//!
//! Opt-in alternative to per-subscriber polling: subscribers asking for the same
//! window within `max_age` of each other reuse one snapshot, so chain reads no
//! longer scale with the subscriber count. Two subscribers missing the cache at
//! the same moment may both trigger a cycle; the later insert wins.

use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::trace;

use twap_core::{Snapshot, TwapWindow};

use crate::aggregator::SnapshotSource;

#[derive(Debug, Clone)]
struct CachedSnapshot {
    snapshot: Snapshot,
    taken_at: Instant,
}

impl CachedSnapshot {
    fn is_fresh(&self, max_age: Duration) -> bool {
        self.taken_at.elapsed() < max_age
    }
}

/// Wraps a [`SnapshotSource`] and memoizes its output per window
pub struct SharedSnapshotCache<S> {
    inner: S,
    max_age: Duration,
    entries: DashMap<TwapWindow, CachedSnapshot>,
}

impl<S: SnapshotSource> SharedSnapshotCache<S> {
    pub fn new(inner: S, max_age: Duration) -> Self {
        Self {
            inner,
            max_age,
            entries: DashMap::new(),
        }
    }

    /// Windows currently held, fresh or not
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait::async_trait]
impl<S: SnapshotSource> SnapshotSource for SharedSnapshotCache<S> {
    async fn snapshot(&self, window: TwapWindow) -> Snapshot {
        let cached = self
            .entries
            .get(&window)
            .filter(|entry| entry.is_fresh(self.max_age))
            .map(|entry| entry.snapshot.clone());

        if let Some(snapshot) = cached {
            trace!(window = window.secs(), "Shared snapshot hit");
            return snapshot;
        }

        let snapshot = self.inner.snapshot(window).await;

        let max_age = self.max_age;
        self.entries.retain(|_, entry| entry.is_fresh(max_age));
        self.entries.insert(
            window,
            CachedSnapshot {
                snapshot: snapshot.clone(),
                taken_at: Instant::now(),
            },
        );

        snapshot
    }
}

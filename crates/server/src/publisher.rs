//! Per-subscriber publish loop
//!
//! Each subscriber runs its own loop with its own window:
//! snapshot -> serialize -> push -> pause, strictly in sequence. The loop ends
//! on the first failed push or when the subscriber disconnects.

use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use twap_core::TwapWindow;
use twap_price_feed::SnapshotSource;

/// Push failures; the remote end is considered gone
#[derive(Debug, Error)]
pub enum PushError {
    #[error("Subscriber closed: {0}")]
    Closed(String),
}

/// Where serialized snapshots go
#[async_trait::async_trait]
pub trait SnapshotSink: Send {
    async fn push(&mut self, payload: String) -> Result<(), PushError>;
}

#[async_trait::async_trait]
impl<S> SnapshotSink for SplitSink<WebSocketStream<S>, Message>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn push(&mut self, payload: String) -> Result<(), PushError> {
        self.send(Message::Text(payload))
            .await
            .map_err(|e| PushError::Closed(e.to_string()))
    }
}

#[async_trait::async_trait]
impl SnapshotSink for mpsc::Sender<String> {
    async fn push(&mut self, payload: String) -> Result<(), PushError> {
        self.send(payload)
            .await
            .map_err(|_| PushError::Closed("receiver dropped".to_string()))
    }
}

/// Subscriber lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    Connected,
    Streaming,
    Closed,
}

/// Why a subscriber loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    PushFailed,
    Disconnected,
}

/// A connected client: its sink and the window it asked for
pub struct Subscriber<K> {
    id: Uuid,
    window: TwapWindow,
    sink: K,
    state: SubscriberState,
}

impl<K: SnapshotSink> Subscriber<K> {
    pub fn new(window: TwapWindow, sink: K) -> Self {
        Self {
            id: Uuid::new_v4(),
            window,
            sink,
            state: SubscriberState::Connected,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn window(&self) -> TwapWindow {
        self.window
    }

    pub fn state(&self) -> SubscriberState {
        self.state
    }
}

/// Drives subscriber loops against a shared [`SnapshotSource`]
pub struct Publisher {
    source: Arc<dyn SnapshotSource>,
    interval: Duration,
}

impl Publisher {
    pub fn new(source: Arc<dyn SnapshotSource>, interval: Duration) -> Self {
        Self { source, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Stream to `subscriber` until a push fails or `disconnected` fires
    ///
    /// A disconnect is honoured at the inter-cycle pause, or right after an
    /// in-flight snapshot completes, in which case that snapshot is dropped.
    pub async fn run<K: SnapshotSink>(
        &self,
        subscriber: &mut Subscriber<K>,
        mut disconnected: oneshot::Receiver<()>,
    ) -> CloseReason {
        let id = subscriber.id;
        let window = subscriber.window;
        subscriber.state = SubscriberState::Streaming;
        info!(subscriber = %id, window = window.secs(), "Subscriber streaming");

        let reason = loop {
            let snapshot = self.source.snapshot(window).await;

            if disconnect_signalled(&mut disconnected) {
                debug!(subscriber = %id, "Discarding snapshot for closed subscriber");
                break CloseReason::Disconnected;
            }

            if snapshot.is_empty() {
                warn!(subscriber = %id, window = window.secs(), "No pool data available this cycle");
            }

            match snapshot.to_json() {
                Ok(payload) => {
                    if let Err(e) = subscriber.sink.push(payload).await {
                        warn!(subscriber = %id, error = %e, "Push failed");
                        break CloseReason::PushFailed;
                    }
                    debug!(subscriber = %id, pools = snapshot.len(), "Snapshot pushed");
                }
                Err(e) => {
                    error!(subscriber = %id, error = %e, "Snapshot serialization failed");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = &mut disconnected => break CloseReason::Disconnected,
            }
        };

        subscriber.state = SubscriberState::Closed;
        info!(subscriber = %id, ?reason, "Subscriber closed");
        reason
    }
}

/// True once the disconnect signal was sent or its sender dropped
fn disconnect_signalled(rx: &mut oneshot::Receiver<()>) -> bool {
    !matches!(rx.try_recv(), Err(oneshot::error::TryRecvError::Empty))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use twap_core::{Snapshot, SnapshotPayload};

    struct StubSource {
        delay: Duration,
        cycles: AtomicUsize,
    }

    impl StubSource {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                cycles: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait::async_trait]
    impl SnapshotSource for StubSource {
        async fn snapshot(&self, window: TwapWindow) -> Snapshot {
            self.cycles.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Snapshot::empty(window)
        }
    }

    struct BrokenSink;

    #[async_trait::async_trait]
    impl SnapshotSink for BrokenSink {
        async fn push(&mut self, _payload: String) -> Result<(), PushError> {
            Err(PushError::Closed("connection reset".to_string()))
        }
    }

    #[tokio::test]
    async fn test_pushes_each_cycle_with_subscriber_window() {
        let source = StubSource::new(Duration::ZERO);
        let publisher = Publisher::new(source.clone(), Duration::from_millis(10));
        let (tx, mut rx) = mpsc::channel(16);
        let (disconnect_tx, disconnect_rx) = oneshot::channel();

        let window = TwapWindow::new(60).unwrap();
        let handle = tokio::spawn(async move {
            let mut subscriber = Subscriber::new(window, tx);
            let reason = publisher.run(&mut subscriber, disconnect_rx).await;
            (reason, subscriber.state())
        });

        for _ in 0..3 {
            let payload: SnapshotPayload = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
            assert_eq!(payload.window, 60);
            // empty snapshots are still pushed
            assert!(payload.pools.is_empty());
        }

        disconnect_tx.send(()).unwrap();
        let (reason, state) = handle.await.unwrap();
        assert_eq!(reason, CloseReason::Disconnected);
        assert_eq!(state, SubscriberState::Closed);
    }

    #[tokio::test]
    async fn test_push_failure_closes_subscriber() {
        let source = StubSource::new(Duration::ZERO);
        let publisher = Publisher::new(source.clone(), Duration::from_millis(10));
        let (_disconnect_tx, disconnect_rx) = oneshot::channel();

        let mut subscriber = Subscriber::new(TwapWindow::DEFAULT, BrokenSink);
        assert_eq!(subscriber.state(), SubscriberState::Connected);

        let reason = publisher.run(&mut subscriber, disconnect_rx).await;

        assert_eq!(reason, CloseReason::PushFailed);
        assert_eq!(subscriber.state(), SubscriberState::Closed);
        assert_eq!(source.cycles.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dropped_receiver_closes_subscriber() {
        let source = StubSource::new(Duration::ZERO);
        let publisher = Publisher::new(source, Duration::from_millis(10));
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let (_disconnect_tx, disconnect_rx) = oneshot::channel();

        let mut subscriber = Subscriber::new(TwapWindow::DEFAULT, tx);
        let reason = publisher.run(&mut subscriber, disconnect_rx).await;

        assert_eq!(reason, CloseReason::PushFailed);
    }

    #[tokio::test]
    async fn test_disconnect_during_read_discards_snapshot() {
        let source = StubSource::new(Duration::from_millis(100));
        let publisher = Publisher::new(source.clone(), Duration::from_secs(5));
        let (tx, mut rx) = mpsc::channel(4);
        let (disconnect_tx, disconnect_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let mut subscriber = Subscriber::new(TwapWindow::DEFAULT, tx);
            publisher.run(&mut subscriber, disconnect_rx).await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        disconnect_tx.send(()).unwrap();

        assert_eq!(handle.await.unwrap(), CloseReason::Disconnected);
        // the in-flight read finished but nothing was pushed
        assert_eq!(source.cycles.load(Ordering::SeqCst), 1);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_disconnect_sender_ends_loop() {
        let source = StubSource::new(Duration::ZERO);
        let publisher = Publisher::new(source, Duration::from_secs(5));
        let (tx, _rx) = mpsc::channel(4);
        let (disconnect_tx, disconnect_rx) = oneshot::channel::<()>();
        drop(disconnect_tx);

        let mut subscriber = Subscriber::new(TwapWindow::DEFAULT, tx);
        let reason = publisher.run(&mut subscriber, disconnect_rx).await;

        assert_eq!(reason, CloseReason::Disconnected);
    }
}

//! WebSocket front end for the TWAP oracle
//!
//! Accepts subscribers, reads their TWAP window from the upgrade request and
//! streams a priced snapshot to each of them on a fixed cadence.

pub mod publisher;
pub mod server;

pub use publisher::{CloseReason, PushError, Publisher, SnapshotSink, Subscriber, SubscriberState};
pub use server::WsServer;

//! # Relay Layer
//!
//! Everything downstream of a successful classification: the durable append-only
//! result store and the message-bus client with its liveness heartbeat.
//!
//! The `EventSink` and `EventPublisher` traits are the seams the ingestion service
//! depends on; the sink append and the bus publish are independent, best-effort
//! side effects with no cross-operation transaction.

pub mod bus;
pub mod event;
pub mod sink;

pub use bus::*;
pub use event::*;
pub use sink::*;

use crate::error::AppResult;
use async_trait::async_trait;

/// Durable append-only store of classification outcomes.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn append(&self, event: &ClassificationEvent) -> AppResult<()>;
}

/// Publisher onto the message bus consumers subscribe to.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish_event(&self, event: &ClassificationEvent) -> AppResult<()>;
    async fn publish_heartbeat(&self) -> AppResult<()>;
}

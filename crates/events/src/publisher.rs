//! Publishing capability.

use async_trait::async_trait;
use thiserror::Error;

use crate::Event;

/// Errors surfaced by [`EventPublisher::publish`].
///
/// There is no partial success: either the backing store durably accepted
/// the message or the call failed and the caller decides whether to retry,
/// fall back, or drop. The publisher itself never retries — a retry after a
/// partial side effect is a business decision, not a transport one.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The event could not be encoded for the wire.
    #[error("failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The broker rejected the message or the channel is unusable.
    #[error("broker refused publish: {0}")]
    Broker(String),
}

/// Publishes domain events.
///
/// Implementations:
/// - [`crate::InMemoryPublisher`] — ordered in-process log, never fails;
///   for tests and broker-less environments.
/// - `orderflow-infra`'s NATS publisher — durable topic-exchange delivery.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: Event) -> Result<(), PublishError>;
}

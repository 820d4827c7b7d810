//! Broker error model.

use thiserror::Error;

use orderflow_events::PatternError;

use crate::config::ConfigError;

/// Errors raised by the broker-backed publisher and consumer.
///
/// Setup errors (connection, exchange, queue, subscribe) are fatal to the
/// call that hit them and are never retried internally. Delivery-loop
/// errors (deserialization, handler failure) never surface here; they are
/// resolved inside the loop via the ack/nack protocol.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The broker is unreachable or the connection handshake failed.
    #[error("broker connection failed: {0}")]
    Connection(String),

    /// Declaring the event stream failed. Also covers an existing stream
    /// with conflicting durability attributes, which the broker rejects.
    #[error("event stream setup failed: {0}")]
    Exchange(String),

    /// Declaring the durable consumer for a queue failed.
    #[error("queue {queue:?} setup failed: {reason}")]
    Queue { queue: String, reason: String },

    /// Opening the delivery stream failed after setup succeeded.
    #[error("failed to start consuming: {0}")]
    Subscribe(String),

    /// The routing pattern does not parse.
    #[error("invalid routing pattern: {0}")]
    Pattern(#[from] PatternError),

    /// The pattern is valid but the broker cannot express it as a binding
    /// (multi-segment wildcard in a non-final position).
    #[error("routing pattern {0:?} is not expressible as a broker binding")]
    UnsupportedPattern(String),

    /// `consume` was called on an instance that already runs a delivery
    /// loop. One instance, one queue, one pattern.
    #[error("consumer is already bound to a queue")]
    AlreadyConsuming,

    /// Releasing broker resources failed. Reported, never fatal to exit.
    #[error("close failed: {0}")]
    Close(String),

    /// The requested operation contradicts the supplied configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

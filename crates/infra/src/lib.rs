//! Infrastructure layer: broker-backed messaging and its configuration.
//!
//! The abstractions live in `orderflow-events` as pure mechanics. This crate
//! provides the broker-backed implementations (NATS JetStream) plus the
//! configuration/factory glue that selects an implementation at startup.

pub mod config;
pub mod error;
pub mod factory;
pub mod nats;

pub use config::{BrokerKind, ConfigError, MessagingConfig};
pub use error::BrokerError;
pub use factory::{consumer_from_config, publisher_from_config};
pub use nats::consumer::{ConsumerHandle, ConsumerOptions, ConsumerState, NatsEventConsumer};
pub use nats::publisher::NatsEventPublisher;

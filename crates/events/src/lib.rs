//! Event model and pub/sub abstractions (mechanics only).
//!
//! This crate defines the units the messaging layer moves around and the
//! capability traits at its seams. It makes no transport assumptions:
//! broker-backed implementations live in `orderflow-infra`.
//!
//! ## Delivery contract
//!
//! - **At-least-once**: a delivered event may be redelivered; handlers must
//!   be idempotent.
//! - **Ordering**: only within one queue consumed by one instance; nothing
//!   is guaranteed across queues or instances.
//! - **Immutability**: an [`Event`] is a fact. It is never mutated between
//!   construction and the handler call.

pub mod event;
pub mod handler;
pub mod in_memory;
pub mod outbox;
pub mod pattern;
pub mod publisher;

pub use event::{Event, EventError};
pub use handler::{EventHandler, FnHandler, LoggingHandler, ShutdownSignal};
pub use in_memory::InMemoryPublisher;
pub use outbox::EventOutbox;
pub use pattern::{PatternError, RoutingPattern};
pub use publisher::{EventPublisher, PublishError};

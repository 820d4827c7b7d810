//! Outbox extension point (store-then-publish).
//!
//! Publishing after a business write can lose events if the process dies
//! between the two. The outbox pattern closes that window: record the event
//! in the same transaction as the business write, then publish from the
//! recorded set asynchronously.
//!
//! This crate specifies the seam only. No implementation ships; wiring one
//! in means implementing both methods against the business database and
//! running [`drain_pending`](EventOutbox::drain_pending) from a background
//! task.

use async_trait::async_trait;

use crate::{Event, EventPublisher};

/// Transactional staging area for events awaiting publication.
#[async_trait]
pub trait EventOutbox: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    /// Record an event alongside the business write that produced it.
    ///
    /// Must participate in the caller's transaction: if the business write
    /// rolls back, so does the recorded event.
    async fn record_pending(&self, event: &Event) -> Result<(), Self::Error>;

    /// Publish recorded events and mark them processed.
    ///
    /// At-least-once: a crash between publish and mark may re-publish on the
    /// next drain. Consumers are idempotent, so that is acceptable.
    async fn drain_pending(&self, publisher: &dyn EventPublisher) -> Result<usize, Self::Error>;
}

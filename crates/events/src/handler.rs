//! Handling capability: what consumers invoke per delivery.

use std::future::Future;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::info;

use crate::Event;

/// Cooperative shutdown signal handed to every handler invocation.
///
/// Carries the consumer's drain notification into the handler so
/// long-running work can stop early instead of being abandoned at the
/// drain deadline. Handlers that finish quickly may ignore it.
///
/// Clones observe a shutdown requested before the clone was made.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: Option<watch::Receiver<()>>,
}

impl ShutdownSignal {
    pub fn new(rx: watch::Receiver<()>) -> Self {
        Self { rx: Some(rx) }
    }

    /// A signal that never fires, for callers without a drain lifecycle.
    pub fn none() -> Self {
        Self { rx: None }
    }

    /// Whether shutdown has been requested. A dropped sender counts as a
    /// request.
    pub fn is_shutting_down(&self) -> bool {
        self.rx
            .as_ref()
            .is_some_and(|rx| rx.has_changed().unwrap_or(true))
    }

    /// Resolves once shutdown is requested. Pends forever for
    /// [`ShutdownSignal::none`].
    pub async fn cancelled(&mut self) {
        match self.rx.as_mut() {
            Some(rx) => {
                // Err means the sender is gone, which is shutdown too.
                let _ = rx.changed().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

/// Processes one delivered event.
///
/// The return value drives the acknowledgement decision:
/// - `Ok` → the delivery is acknowledged and removed from the queue,
/// - `Err` → the delivery is rejected with requeue and will be redelivered.
///
/// Handlers must therefore be **idempotent**: at-least-once delivery means
/// the same event may arrive more than once. A handler that fails
/// permanently causes indefinite redelivery unless the consumer was
/// configured with a delivery cap.
///
/// The shutdown signal reflects the owning consumer's drain; a handler
/// that checks it can cut long work short and still choose its own return
/// value (and thus the ack decision) for the interrupted delivery.
///
/// This is a single-method capability so alternative behaviors compose by
/// decoration ([`LoggingHandler`]) rather than by branching on labels.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, shutdown: ShutdownSignal, event: Event) -> anyhow::Result<()>;
}

/// Adapter turning a plain async closure into an [`EventHandler`].
///
/// The closure never sees the shutdown signal; implement [`EventHandler`]
/// directly when a handler needs it.
pub struct FnHandler<F> {
    f: F,
}

impl<F, Fut> FnHandler<F>
where
    F: Fn(Event) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Event) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle(&self, _shutdown: ShutdownSignal, event: Event) -> anyhow::Result<()> {
        (self.f)(event).await
    }
}

/// Decorator that logs each delivery around the inner handler.
pub struct LoggingHandler<H> {
    inner: H,
    name: &'static str,
}

impl<H: EventHandler> LoggingHandler<H> {
    pub fn new(name: &'static str, inner: H) -> Self {
        Self { inner, name }
    }
}

#[async_trait]
impl<H: EventHandler> EventHandler for LoggingHandler<H> {
    async fn handle(&self, shutdown: ShutdownSignal, event: Event) -> anyhow::Result<()> {
        info!(
            handler = self.name,
            event_type = event.event_type(),
            aggregate_id = event.aggregate_id(),
            "handling event"
        );

        let result = self.inner.handle(shutdown, event).await;

        if let Err(err) = &result {
            info!(handler = self.name, error = %err, "handler failed; delivery will be requeued");
        }
        result
    }
}

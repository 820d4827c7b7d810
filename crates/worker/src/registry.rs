//! Worker-kind to handler mapping, resolved once at process start.

use std::collections::HashMap;
use std::sync::Arc;

use orderflow_events::{EventHandler, LoggingHandler};

use crate::handlers::{NotificationEventHandler, OrderEventHandler, SmsEventHandler};
use crate::kind::WorkerKind;

type HandlerCtor = fn() -> Arc<dyn EventHandler>;

/// Registered mapping from the closed set of worker kinds to handler
/// constructors. Because [`WorkerKind`] parsing already rejects unknown
/// labels, every kind resolves here — a registry miss is a programming
/// error, not a runtime branch.
pub struct HandlerRegistry {
    handlers: HashMap<WorkerKind, HandlerCtor>,
}

impl HandlerRegistry {
    /// The default registry: every worker kind wired to its handler,
    /// wrapped in per-delivery logging.
    pub fn with_defaults() -> Self {
        let mut handlers: HashMap<WorkerKind, HandlerCtor> = HashMap::new();
        handlers.insert(WorkerKind::Order, || {
            Arc::new(LoggingHandler::new("order", OrderEventHandler))
        });
        handlers.insert(WorkerKind::Notification, || {
            Arc::new(LoggingHandler::new("notification", NotificationEventHandler))
        });
        handlers.insert(WorkerKind::Sms, || {
            Arc::new(LoggingHandler::new("sms", SmsEventHandler))
        });
        Self { handlers }
    }

    pub fn resolve(&self, kind: WorkerKind) -> Arc<dyn EventHandler> {
        let ctor = self
            .handlers
            .get(&kind)
            .unwrap_or_else(|| panic!("no handler registered for worker kind {kind}"));
        ctor()
    }
}

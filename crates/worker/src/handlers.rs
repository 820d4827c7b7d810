//! Per-kind event handlers.
//!
//! These carry the side effects of the surrounding system; here they log
//! the work they stand in for. All of them tolerate unknown event types
//! under their pattern (log and acknowledge) — a new event type must never
//! wedge a queue in an infinite redelivery loop.

use async_trait::async_trait;
use tracing::info;

use orderflow_events::{Event, EventHandler, ShutdownSignal};

fn payload_str<'a>(event: &'a Event, key: &str) -> &'a str {
    event.payload().get(key).and_then(|v| v.as_str()).unwrap_or("")
}

/// Handles `order.*`: fulfilment side effects per order lifecycle step.
#[derive(Debug, Default)]
pub struct OrderEventHandler;

#[async_trait]
impl EventHandler for OrderEventHandler {
    async fn handle(&self, _shutdown: ShutdownSignal, event: Event) -> anyhow::Result<()> {
        let order_id = event.aggregate_id();
        match event.event_type() {
            "order.created" => {
                info!(order_id, "order created; scheduling fulfilment");
            }
            "order.confirmed" => {
                info!(order_id, "order confirmed");
            }
            "order.delivered" => {
                info!(order_id, "order delivered; closing out");
            }
            "order.cancelled" => {
                info!(order_id, "order cancelled; releasing reservations");
            }
            other => {
                info!(order_id, event_type = other, "unhandled order event");
            }
        }
        Ok(())
    }
}

/// Handles `notification.*`: outbound email/SMS dispatch.
#[derive(Debug, Default)]
pub struct NotificationEventHandler;

#[async_trait]
impl EventHandler for NotificationEventHandler {
    async fn handle(&self, _shutdown: ShutdownSignal, event: Event) -> anyhow::Result<()> {
        match event.event_type() {
            "notification.email" => {
                let to = payload_str(&event, "to");
                let subject = payload_str(&event, "subject");
                info!(to, subject, "sending email notification");
            }
            "notification.sms" => {
                let phone = payload_str(&event, "phone");
                info!(phone, "sending sms notification");
            }
            other => {
                info!(event_type = other, "unhandled notification event");
            }
        }
        Ok(())
    }
}

/// Handles `sms.*`: dedicated SMS dispatch.
#[derive(Debug, Default)]
pub struct SmsEventHandler;

#[async_trait]
impl EventHandler for SmsEventHandler {
    async fn handle(&self, _shutdown: ShutdownSignal, event: Event) -> anyhow::Result<()> {
        let phone = payload_str(&event, "phone");
        let message = payload_str(&event, "message");
        info!(phone, message, event_type = event.event_type(), "sending sms");
        Ok(())
    }
}

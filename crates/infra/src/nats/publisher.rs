//! Broker-backed publisher (durable topic-exchange delivery).

use std::sync::atomic::{AtomicBool, Ordering};

use async_nats::jetstream::Context as JetStreamContext;
use async_nats::{Client, ConnectOptions, HeaderMap};
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, instrument};

use orderflow_events::{Event, EventPublisher, PublishError};

use crate::error::BrokerError;
use crate::nats::{ensure_event_stream, event_subject};

/// Publishes events to the durable event stream.
///
/// Owns its connection exclusively; it is never shared with consumers or
/// other publisher instances. Construction connects and declares the
/// stream eagerly, so a misconfigured broker fails fast at startup.
pub struct NatsEventPublisher {
    client: Client,
    jetstream: JetStreamContext,
    exchange: String,
    closed: AtomicBool,
}

impl NatsEventPublisher {
    /// Connect and declare the event stream.
    ///
    /// If the stream declare fails after the connection opened, the
    /// connection is released before the error returns (no leaked handles
    /// on partial construction).
    pub async fn connect(broker_url: &str, exchange: &str) -> Result<Self, BrokerError> {
        let options = ConnectOptions::new().name("orderflow-publisher");
        let client = async_nats::connect_with_options(broker_url, options)
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        let jetstream = async_nats::jetstream::new(client.clone());
        if let Err(err) = ensure_event_stream(&jetstream, exchange).await {
            // Dropping the last clone tears the connection down.
            drop(jetstream);
            drop(client);
            return Err(err);
        }

        Ok(Self {
            client,
            jetstream,
            exchange: exchange.to_string(),
            closed: AtomicBool::new(false),
        })
    }

    /// Flush buffered publishes and mark the publisher unusable.
    ///
    /// The channel drains before the connection is released (which happens
    /// on drop). Calling twice is a no-op; close never panics or blocks
    /// indefinitely.
    pub async fn close(&self) -> Result<(), BrokerError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.client
            .flush()
            .await
            .map_err(|e| BrokerError::Close(e.to_string()))
    }
}

#[async_trait]
impl EventPublisher for NatsEventPublisher {
    /// Publish one event: subject `{exchange}.{type}`, persistent body,
    /// redundant headers for filtering without deserialization, and a
    /// unique message id for downstream dedup/tracing.
    ///
    /// Returns only after the broker confirms durable storage. No internal
    /// retry: a failed publish is the caller's decision to retry, fall
    /// back, or drop.
    #[instrument(
        skip(self, event),
        fields(event_type = event.event_type(), aggregate_id = event.aggregate_id())
    )]
    async fn publish(&self, event: Event) -> Result<(), PublishError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PublishError::Broker("publisher is closed".to_string()));
        }

        let subject = event_subject(&self.exchange, event.event_type());
        let body = serde_json::to_vec(&event)?;

        let message_id = format!(
            "{}-{}",
            event.aggregate_id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        );

        let mut headers = HeaderMap::new();
        headers.insert("Nats-Msg-Id", message_id.as_str());
        headers.insert("event-type", event.event_type());
        headers.insert("aggregate-id", event.aggregate_id());
        headers.insert("event-timestamp", event.timestamp().to_string().as_str());

        let ack = self
            .jetstream
            .publish_with_headers(subject.clone(), headers, body.into())
            .await
            .map_err(|e| PublishError::Broker(e.to_string()))?;

        // Storage ack: the message persisted to disk on the broker.
        ack.await.map_err(|e| PublishError::Broker(e.to_string()))?;

        debug!(subject = %subject, message_id = %message_id, "event published");
        Ok(())
    }
}

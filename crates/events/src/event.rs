//! The immutable unit of exchange between producers and consumers.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Validation errors raised at event construction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventError {
    /// The event type is empty.
    #[error("event type must be non-empty")]
    EmptyType,

    /// The aggregate identifier is empty.
    #[error("aggregate id must be non-empty")]
    EmptyAggregateId,
}

/// A domain event.
///
/// Events are:
/// - **immutable** (treat them as facts; fields are accessor-only)
/// - **self-describing on the wire** (all four fields serialize)
/// - **routed by type**: `event_type` is a dot-delimited taxonomy
///   (e.g. `"order.created"`) used verbatim as the routing key.
///
/// `payload` is an opaque, schema-less document. The messaging layer never
/// validates or versions its shape; that is a producer/consumer contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    event_type: String,
    aggregate_id: String,
    payload: JsonValue,
    /// Seconds since epoch, producer-set. Diagnostics only; never used to
    /// enforce ordering.
    timestamp: i64,
}

impl Event {
    /// Build an event stamped with the current time.
    pub fn new(
        event_type: impl Into<String>,
        aggregate_id: impl Into<String>,
        payload: JsonValue,
    ) -> Result<Self, EventError> {
        Self::with_timestamp(event_type, aggregate_id, payload, Utc::now().timestamp())
    }

    /// Build an event with an explicit timestamp (replay, tests).
    pub fn with_timestamp(
        event_type: impl Into<String>,
        aggregate_id: impl Into<String>,
        payload: JsonValue,
        timestamp: i64,
    ) -> Result<Self, EventError> {
        let event_type = event_type.into();
        if event_type.is_empty() {
            return Err(EventError::EmptyType);
        }
        let aggregate_id = aggregate_id.into();
        if aggregate_id.is_empty() {
            return Err(EventError::EmptyAggregateId);
        }

        Ok(Self {
            event_type,
            aggregate_id,
            payload,
            timestamp,
        })
    }

    /// The dot-delimited type, used verbatim as the routing key.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// The business entity this event concerns (correlation/tracing only).
    pub fn aggregate_id(&self) -> &str {
        &self.aggregate_id
    }

    pub fn payload(&self) -> &JsonValue {
        &self.payload
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

//! NATS JetStream messaging adapters.
//!
//! Mapping from the exchange/queue model onto JetStream:
//!
//! - **Topic exchange** → one durable, file-backed stream capturing
//!   `{exchange}.>`; declared idempotently by publisher and consumer alike.
//! - **Routing key** → the wire subject `{exchange}.{event_type}`; the
//!   exchange name namespaces the subject space, the event type rides on it
//!   verbatim.
//! - **Queue binding** → a durable pull consumer named after the queue,
//!   with filter subjects translated from the routing pattern (`*` → `*`;
//!   trailing `#` → two filters, since `>` alone misses the bare prefix).
//! - **Prefetch / manual ack** → `max_ack_pending` + `AckPolicy::Explicit`.
//! - **Ack / requeue / reject** → `AckKind::{Ack, Nak, Term}`.

pub mod consumer;
pub mod publisher;

use async_nats::jetstream::Context as JetStreamContext;
use async_nats::jetstream::stream::{
    Config as StreamConfig, RetentionPolicy, StorageType, Stream as StreamHandle,
};
use tracing::{debug, info};

use orderflow_events::RoutingPattern;

use crate::error::BrokerError;

/// Wire subject for a published event.
pub(crate) fn event_subject(exchange: &str, event_type: &str) -> String {
    format!("{exchange}.{event_type}")
}

/// Stream name derived from the exchange name (`orderflow.events` →
/// `ORDERFLOW_EVENTS`; stream names cannot contain dots).
pub(crate) fn stream_name(exchange: &str) -> String {
    exchange.replace(['.', '-'], "_").to_uppercase()
}

/// Translate a routing pattern into JetStream filter subjects.
///
/// `*` maps directly. A trailing `#` matches zero or more segments while
/// the broker's `>` matches one or more, so `prefix.#` becomes two
/// filters, `prefix` and `prefix.>`, to keep the bare prefix covered. The
/// broker only supports `>` as the final token, so an interior `#` is a
/// valid pattern but not a valid binding, and is rejected here rather
/// than silently narrowed.
pub(crate) fn filter_subjects(
    exchange: &str,
    pattern: &RoutingPattern,
) -> Result<Vec<String>, BrokerError> {
    if !pattern.multi_wildcard_is_terminal() {
        return Err(BrokerError::UnsupportedPattern(pattern.as_str().to_string()));
    }

    let segments: Vec<&str> = pattern.as_str().split('.').collect();
    match segments.split_last() {
        Some((&"#", head)) if !head.is_empty() => {
            let prefix = format!("{exchange}.{}", head.join("."));
            Ok(vec![prefix.clone(), format!("{prefix}.>")])
        }
        // A lone `#`: event types are never empty, so `>` covers the
        // whole subject space under the exchange.
        Some((&"#", _)) => Ok(vec![format!("{exchange}.>")]),
        _ => Ok(vec![format!("{exchange}.{}", segments.join("."))]),
    }
}

/// Declare the event stream (idempotent).
///
/// When the stream already exists it is reused as-is; when it exists with
/// conflicting attributes the broker rejects the declare and the error
/// surfaces to the caller.
pub(crate) async fn ensure_event_stream(
    jetstream: &JetStreamContext,
    exchange: &str,
) -> Result<StreamHandle, BrokerError> {
    let name = stream_name(exchange);

    if let Ok(stream) = jetstream.get_stream(&name).await {
        debug!(stream = %name, "event stream already declared");
        return Ok(stream);
    }

    info!(stream = %name, exchange = %exchange, "declaring event stream");

    let config = StreamConfig {
        name: name.clone(),
        subjects: vec![format!("{exchange}.>")],
        // Durable across broker restarts; retained until limits, so every
        // bound queue gets its own copy (topic-exchange fan-out).
        storage: StorageType::File,
        retention: RetentionPolicy::Limits,
        max_messages: 1_000_000,
        num_replicas: 1,
        ..Default::default()
    };

    jetstream
        .create_stream(config)
        .await
        .map_err(|e| BrokerError::Exchange(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(s: &str) -> RoutingPattern {
        RoutingPattern::parse(s).unwrap()
    }

    #[test]
    fn subjects_are_namespaced_by_exchange() {
        assert_eq!(
            event_subject("orderflow.events", "order.created"),
            "orderflow.events.order.created"
        );
    }

    #[test]
    fn stream_name_is_uppercased_and_dot_free() {
        assert_eq!(stream_name("orderflow.events"), "ORDERFLOW_EVENTS");
        assert_eq!(stream_name("staging-bus"), "STAGING_BUS");
    }

    #[test]
    fn exact_and_single_wildcard_translate_verbatim() {
        assert_eq!(
            filter_subjects("ex", &pattern("order.created")).unwrap(),
            ["ex.order.created"]
        );
        assert_eq!(filter_subjects("ex", &pattern("order.*")).unwrap(), ["ex.order.*"]);
    }

    #[test]
    fn lone_multi_wildcard_becomes_full_wildcard() {
        assert_eq!(filter_subjects("ex", &pattern("#")).unwrap(), ["ex.>"]);
    }

    #[test]
    fn trailing_multi_wildcard_also_covers_the_bare_prefix() {
        // `notification.#` matches the plain `notification` type too;
        // `>` alone would not.
        assert_eq!(
            filter_subjects("ex", &pattern("notification.#")).unwrap(),
            ["ex.notification", "ex.notification.>"]
        );
        assert_eq!(
            filter_subjects("ex", &pattern("order.created.#")).unwrap(),
            ["ex.order.created", "ex.order.created.>"]
        );
    }

    #[test]
    fn interior_multi_wildcard_is_not_a_binding() {
        let err = filter_subjects("ex", &pattern("order.#.failed")).unwrap_err();
        assert!(matches!(err, BrokerError::UnsupportedPattern(_)));
    }
}

//! End-to-end delivery properties against a live broker.
//!
//! These tests need `nats-server -js` listening on localhost:4222 and are
//! ignored by default:
//!
//! ```sh
//! cargo test -p orderflow-infra -- --ignored
//! ```
//!
//! Each test uses its own exchange (and therefore its own stream) so runs
//! do not interfere.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::anyhow;
use serde_json::json;
use tokio::sync::watch;
use tokio::time::sleep;

use orderflow_events::{Event, EventHandler, EventPublisher, FnHandler};
use orderflow_infra::{ConsumerOptions, ConsumerState, NatsEventConsumer, NatsEventPublisher};

const BROKER_URL: &str = "nats://localhost:4222";

fn unique_exchange(label: &str) -> String {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("test.{label}.{nanos}")
}

fn order_event(aggregate_id: &str) -> Event {
    Event::new("order.created", aggregate_id, json!({"total": 50.0})).unwrap()
}

#[tokio::test]
#[ignore = "requires a running nats-server with JetStream"]
async fn handler_failure_requeues_until_success() {
    let exchange = unique_exchange("retry");
    let publisher = NatsEventPublisher::connect(BROKER_URL, &exchange).await.unwrap();
    publisher.publish(order_event("order-1")).await.unwrap();

    // Fails exactly once, succeeds on redelivery.
    let attempts = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&attempts);
    let handler = Arc::new(FnHandler::new(move |_event: Event| {
        let seen = Arc::clone(&seen);
        async move {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(anyhow!("transient failure"))
            } else {
                Ok(())
            }
        }
    }));

    let consumer = NatsEventConsumer::connect(BROKER_URL, &exchange).await.unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let handle = consumer
        .consume(shutdown_rx, "retry_queue", "order.*", handler)
        .await
        .unwrap();

    sleep(Duration::from_secs(2)).await;

    // Invoked exactly twice: first delivery failed, redelivery acked.
    assert_eq!(attempts.load(Ordering::SeqCst), 2);

    shutdown_tx.send(()).unwrap();
    handle.join().await;
    consumer.close().await.unwrap();
    publisher.close().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running nats-server with JetStream"]
async fn malformed_body_never_reaches_the_handler() {
    let exchange = unique_exchange("malformed");
    // Declare the stream via a throwaway publisher, then inject garbage
    // directly under the events subject space.
    let publisher = NatsEventPublisher::connect(BROKER_URL, &exchange).await.unwrap();

    let client = async_nats::connect(BROKER_URL).await.unwrap();
    let jetstream = async_nats::jetstream::new(client);
    jetstream
        .publish(format!("{exchange}.order.created"), "not json".into())
        .await
        .unwrap()
        .await
        .unwrap();

    let invocations = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&invocations);
    let handler = Arc::new(FnHandler::new(move |_event: Event| {
        let seen = Arc::clone(&seen);
        async move {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }));

    let consumer = NatsEventConsumer::connect(BROKER_URL, &exchange).await.unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let handle = consumer
        .consume(shutdown_rx, "malformed_queue", "order.*", handler)
        .await
        .unwrap();

    sleep(Duration::from_secs(2)).await;

    // Rejected without requeue before deserialization could hand it over.
    assert_eq!(invocations.load(Ordering::SeqCst), 0);

    shutdown_tx.send(()).unwrap();
    handle.join().await;
    consumer.close().await.unwrap();
    publisher.close().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running nats-server with JetStream"]
async fn prefetch_one_serializes_handler_invocations() {
    let exchange = unique_exchange("serial");
    let publisher = NatsEventPublisher::connect(BROKER_URL, &exchange).await.unwrap();
    for i in 0..5 {
        publisher.publish(order_event(&format!("order-{i}"))).await.unwrap();
    }

    let in_flight = Arc::new(AtomicUsize::new(0));
    let overlapped = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicUsize::new(0));

    let (in_flight2, overlapped2, done2) =
        (Arc::clone(&in_flight), Arc::clone(&overlapped), Arc::clone(&done));
    let handler = Arc::new(FnHandler::new(move |_event: Event| {
        let in_flight = Arc::clone(&in_flight2);
        let overlapped = Arc::clone(&overlapped2);
        let done = Arc::clone(&done2);
        async move {
            if in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                overlapped.fetch_add(1, Ordering::SeqCst);
            }
            sleep(Duration::from_millis(50)).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
            done.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }));

    let consumer = NatsEventConsumer::connect(BROKER_URL, &exchange).await.unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let handle = consumer
        .consume(shutdown_rx, "serial_queue", "order.*", handler)
        .await
        .unwrap();

    sleep(Duration::from_secs(3)).await;

    assert_eq!(done.load(Ordering::SeqCst), 5);
    assert_eq!(overlapped.load(Ordering::SeqCst), 0, "invocations overlapped");

    shutdown_tx.send(()).unwrap();
    handle.join().await;
    consumer.close().await.unwrap();
    publisher.close().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running nats-server with JetStream"]
async fn shutdown_drains_the_in_flight_handler() {
    let exchange = unique_exchange("drain");
    let publisher = NatsEventPublisher::connect(BROKER_URL, &exchange).await.unwrap();
    publisher.publish(order_event("order-1")).await.unwrap();

    let completed = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&completed);
    let handler = Arc::new(FnHandler::new(move |_event: Event| {
        let seen = Arc::clone(&seen);
        async move {
            // Long enough that shutdown arrives mid-handler.
            sleep(Duration::from_millis(500)).await;
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }));

    let consumer = NatsEventConsumer::connect(BROKER_URL, &exchange).await.unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let handle = consumer
        .consume(shutdown_rx, "drain_queue", "order.*", handler)
        .await
        .unwrap();

    // Let the delivery start, then cancel while the handler is running.
    sleep(Duration::from_millis(200)).await;
    shutdown_tx.send(()).unwrap();
    handle.join().await;

    // The in-flight handler completed (and was acked) before Closed.
    assert_eq!(completed.load(Ordering::SeqCst), 1);
    consumer.close().await.unwrap();
    publisher.close().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running nats-server with JetStream"]
async fn routing_pattern_filters_deliveries() {
    let exchange = unique_exchange("routing");
    let publisher = NatsEventPublisher::connect(BROKER_URL, &exchange).await.unwrap();

    for event_type in ["order.created", "order.cancelled", "order.created.v2", "payment.settled"] {
        let event = Event::new(event_type, "agg-1", json!({})).unwrap();
        publisher.publish(event).await.unwrap();
    }

    let received = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let handler = Arc::new(FnHandler::new(move |event: Event| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().unwrap().push(event.event_type().to_string());
            Ok(())
        }
    }));

    let consumer = NatsEventConsumer::connect(BROKER_URL, &exchange).await.unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let handle = consumer
        .consume(shutdown_rx, "routing_queue", "order.*", handler)
        .await
        .unwrap();

    sleep(Duration::from_secs(2)).await;

    let mut seen = received.lock().unwrap().clone();
    seen.sort();
    // One dot-delimited segment after "order": no bare "order", no v2,
    // no payments.
    assert_eq!(seen, ["order.cancelled", "order.created"]);

    shutdown_tx.send(()).unwrap();
    handle.join().await;
    consumer.close().await.unwrap();
    publisher.close().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running nats-server with JetStream"]
async fn trailing_hash_binding_receives_the_bare_prefix_type() {
    let exchange = unique_exchange("hash");
    let publisher = NatsEventPublisher::connect(BROKER_URL, &exchange).await.unwrap();

    // `notification.#` covers zero extra segments: the plain type must
    // arrive alongside the dotted ones.
    for event_type in ["notification", "notification.email", "payment.settled"] {
        let event = Event::new(event_type, "agg-1", json!({})).unwrap();
        publisher.publish(event).await.unwrap();
    }

    let received = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let handler = Arc::new(FnHandler::new(move |event: Event| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().unwrap().push(event.event_type().to_string());
            Ok(())
        }
    }));

    let consumer = NatsEventConsumer::connect(BROKER_URL, &exchange).await.unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let handle = consumer
        .consume(shutdown_rx, "hash_queue", "notification.#", handler)
        .await
        .unwrap();

    sleep(Duration::from_secs(2)).await;

    let mut seen = received.lock().unwrap().clone();
    seen.sort();
    assert_eq!(seen, ["notification", "notification.email"]);

    shutdown_tx.send(()).unwrap();
    handle.join().await;
    consumer.close().await.unwrap();
    publisher.close().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running nats-server with JetStream"]
async fn handler_slower_than_ack_wait_is_not_redelivered() {
    let exchange = unique_exchange("slow");
    let publisher = NatsEventPublisher::connect(BROKER_URL, &exchange).await.unwrap();
    publisher.publish(order_event("order-1")).await.unwrap();

    let invocations = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&invocations);
    let handler = Arc::new(FnHandler::new(move |_event: Event| {
        let seen = Arc::clone(&seen);
        async move {
            seen.fetch_add(1, Ordering::SeqCst);
            // Well past the ack deadline below; the in-progress heartbeat
            // must keep the delivery leased.
            sleep(Duration::from_secs(3)).await;
            Ok(())
        }
    }));

    let options = ConsumerOptions {
        ack_wait: Duration::from_secs(1),
        ..ConsumerOptions::default()
    };
    let consumer = NatsEventConsumer::connect_with_options(BROKER_URL, &exchange, options)
        .await
        .unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let handle = consumer
        .consume(shutdown_rx, "slow_queue", "order.*", handler)
        .await
        .unwrap();

    sleep(Duration::from_secs(6)).await;

    assert_eq!(invocations.load(Ordering::SeqCst), 1, "slow handler was redelivered");

    shutdown_tx.send(()).unwrap();
    handle.join().await;
    consumer.close().await.unwrap();
    publisher.close().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running nats-server with JetStream"]
async fn no_deliveries_once_shutdown_is_signaled() {
    let exchange = unique_exchange("stopped");
    let publisher = NatsEventPublisher::connect(BROKER_URL, &exchange).await.unwrap();
    for i in 0..3 {
        publisher.publish(order_event(&format!("order-{i}"))).await.unwrap();
    }

    let invocations = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&invocations);
    let handler = Arc::new(FnHandler::new(move |_event: Event| {
        let seen = Arc::clone(&seen);
        async move {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }));

    let consumer = NatsEventConsumer::connect(BROKER_URL, &exchange).await.unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    // Signaled before the loop starts: it must drain without dispatching
    // even though deliveries are already buffered.
    shutdown_tx.send(()).unwrap();

    let handle = consumer
        .consume(shutdown_rx, "stopped_queue", "order.*", handler)
        .await
        .unwrap();
    handle.join().await;

    assert_eq!(invocations.load(Ordering::SeqCst), 0);
    consumer.close().await.unwrap();
    publisher.close().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running nats-server with JetStream"]
async fn consume_twice_on_one_instance_fails_fast() {
    let exchange = unique_exchange("rebind");
    let consumer = NatsEventConsumer::connect_with_options(
        BROKER_URL,
        &exchange,
        ConsumerOptions::default(),
    )
    .await
    .unwrap();

    let handler: Arc<dyn EventHandler> =
        Arc::new(FnHandler::new(|_event: Event| async { anyhow::Ok(()) }));
    let (_shutdown_tx, shutdown_rx) = watch::channel(());

    let handle = consumer
        .consume(shutdown_rx.clone(), "rebind_queue", "order.*", Arc::clone(&handler))
        .await
        .unwrap();
    assert_ne!(handle.state(), ConsumerState::Closed);

    let second = consumer
        .consume(shutdown_rx, "other_queue", "payment.*", handler)
        .await;
    assert!(matches!(second, Err(orderflow_infra::BrokerError::AlreadyConsuming)));

    consumer.close().await.unwrap();
}

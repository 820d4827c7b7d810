//! Broker-backed consumer: queue binding, QoS, and the ack/nack loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_nats::jetstream::consumer::pull::Config as PullConsumerConfig;
use async_nats::jetstream::consumer::{AckPolicy, PullConsumer};
use async_nats::jetstream::{AckKind, Context as JetStreamContext, Message};
use async_nats::{Client, ConnectOptions};
use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use orderflow_events::{Event, EventHandler, RoutingPattern, ShutdownSignal};

use crate::error::BrokerError;
use crate::nats::{ensure_event_stream, filter_subjects};

/// Lifecycle of a consumer instance.
///
/// `Created → Bound → Consuming → Draining → Closed`, no transition
/// skipped. `Bound` requires the full setup sequence (stream, queue,
/// binding, QoS, registration); `Draining` begins when the shutdown signal
/// is observed and ends when the in-flight handler, if any, has returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Created,
    Bound,
    Consuming,
    Draining,
    Closed,
}

/// Tuning for a consumer instance.
#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    /// Maximum unacknowledged deliveries in flight. The backpressure bound:
    /// 1 trades throughput for fairness and serialized handling. Never
    /// unbounded.
    pub prefetch: i64,
    /// Cap on delivery attempts per message. `None` preserves the default
    /// behavior: requeue forever. A permanently failing handler then
    /// redelivers indefinitely; set a cap to shed such messages instead.
    pub max_deliver: Option<i64>,
    /// How long the broker waits for an ack before redelivering. A safety
    /// net for crashed consumers only: while a handler runs, the delivery
    /// loop keeps extending the deadline, so a handler slower than this is
    /// not redelivered. Must be positive.
    pub ack_wait: Duration,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            prefetch: 1,
            max_deliver: None,
            ack_wait: Duration::from_secs(30),
        }
    }
}

/// Binds a durable queue to the event stream and runs the delivery loop.
///
/// One instance, one queue, one pattern: [`consume`](Self::consume) can be
/// called once. Parallelism comes from running multiple instances against
/// the same queue name; the broker arbitrates which instance receives which
/// message.
pub struct NatsEventConsumer {
    client: Client,
    jetstream: JetStreamContext,
    exchange: String,
    options: ConsumerOptions,
    started: AtomicBool,
    closed: AtomicBool,
}

/// Handle to a running delivery loop.
pub struct ConsumerHandle {
    state: watch::Receiver<ConsumerState>,
    join: Option<JoinHandle<()>>,
}

impl ConsumerHandle {
    /// Current lifecycle state of the loop.
    pub fn state(&self) -> ConsumerState {
        *self.state.borrow()
    }

    /// Wait for the loop to reach `Closed`.
    pub async fn join(mut self) {
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }
}

impl NatsEventConsumer {
    /// Connect with default options (prefetch 1, unlimited redelivery).
    pub async fn connect(broker_url: &str, exchange: &str) -> Result<Self, BrokerError> {
        Self::connect_with_options(broker_url, exchange, ConsumerOptions::default()).await
    }

    pub async fn connect_with_options(
        broker_url: &str,
        exchange: &str,
        options: ConsumerOptions,
    ) -> Result<Self, BrokerError> {
        let connect = ConnectOptions::new().name("orderflow-consumer");
        let client = async_nats::connect_with_options(broker_url, connect)
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        let jetstream = async_nats::jetstream::new(client.clone());

        Ok(Self {
            client,
            jetstream,
            exchange: exchange.to_string(),
            options,
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    /// Bind `queue_name` to the event stream under `routing_pattern` and
    /// start the delivery loop on its own task.
    ///
    /// Setup sequence, each step fatal on error: declare the stream,
    /// declare the durable queue consumer, bind it with the translated
    /// pattern, set the prefetch bound, register without auto-ack. Success
    /// means the loop is running; from then on delivery errors are handled
    /// entirely inside it via the ack/nack protocol:
    ///
    /// - malformed body → reject **without** requeue (retrying cannot fix it),
    /// - handler error → reject **with** requeue (the sole retry mechanism),
    /// - handler success → acknowledge.
    ///
    /// The shutdown signal stops new deliveries; a handler already running
    /// always finishes and its ack decision is made before the loop exits.
    #[instrument(skip(self, shutdown, handler), fields(queue = queue_name, pattern = routing_pattern))]
    pub async fn consume(
        &self,
        shutdown: watch::Receiver<()>,
        queue_name: &str,
        routing_pattern: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<ConsumerHandle, BrokerError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(BrokerError::AlreadyConsuming);
        }

        let pattern = RoutingPattern::parse(routing_pattern)?;
        let filters = filter_subjects(&self.exchange, &pattern)?;

        // 1. Exchange-equivalent: durable stream, idempotent declare.
        let stream = ensure_event_stream(&self.jetstream, &self.exchange).await?;

        // 2-4. Durable queue + binding + QoS, one declare on this broker.
        let consumer_config = PullConsumerConfig {
            durable_name: Some(queue_name.to_string()),
            filter_subjects: filters.clone(),
            ack_policy: AckPolicy::Explicit,
            ack_wait: self.options.ack_wait,
            max_ack_pending: self.options.prefetch,
            max_deliver: self.options.max_deliver.unwrap_or(-1),
            ..Default::default()
        };

        let consumer: PullConsumer = stream
            .get_or_create_consumer(queue_name, consumer_config)
            .await
            .map_err(|e| BrokerError::Queue {
                queue: queue_name.to_string(),
                reason: e.to_string(),
            })?;

        // 5. Register for deliveries; acks are explicit from here on.
        let messages = consumer
            .messages()
            .await
            .map_err(|e| BrokerError::Subscribe(e.to_string()))?;

        let (state_tx, state_rx) = watch::channel(ConsumerState::Bound);
        info!(queue = queue_name, filters = ?filters, "queue bound, starting delivery loop");

        // Derived from the pristine receiver so handlers started after the
        // shutdown send still observe it.
        let signal = ShutdownSignal::new(shutdown.clone());
        let queue = queue_name.to_string();
        let ack_wait = self.options.ack_wait;
        let join = tokio::spawn(delivery_loop(
            messages, shutdown, signal, handler, state_tx, queue, ack_wait,
        ));

        Ok(ConsumerHandle {
            state: state_rx,
            join: Some(join),
        })
    }

    /// Flush and mark the consumer unusable. The connection itself is
    /// released on drop, after the channel drained. Idempotent.
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

async fn delivery_loop(
    mut messages: async_nats::jetstream::consumer::pull::Stream,
    mut shutdown: watch::Receiver<()>,
    signal: ShutdownSignal,
    handler: Arc<dyn EventHandler>,
    state: watch::Sender<ConsumerState>,
    queue: String,
    ack_wait: Duration,
) {
    let _ = state.send(ConsumerState::Consuming);

    loop {
        tokio::select! {
            // Shutdown wins over a buffered delivery: once the signal is
            // observable, no further message is dispatched. A handler
            // mid-flight is inside the other branch and completes first.
            biased;

            _ = shutdown.changed() => {
                let _ = state.send(ConsumerState::Draining);
                info!(queue = %queue, "shutdown observed, draining consumer");
                break;
            }
            delivery = messages.next() => match delivery {
                None => {
                    warn!(queue = %queue, "delivery stream closed by broker");
                    let _ = state.send(ConsumerState::Draining);
                    break;
                }
                Some(Err(err)) => {
                    // Transient pull error; the broker redelivers anything
                    // unacknowledged, so keep pulling.
                    warn!(queue = %queue, error = %err, "delivery error");
                }
                Some(Ok(message)) => {
                    dispatch(handler.as_ref(), signal.clone(), message, &queue, ack_wait).await;
                }
            }
        }
    }

    let _ = state.send(ConsumerState::Closed);
}

/// Decode one delivery and drive the ack decision from the handler result.
///
/// While the handler runs, the broker's ack deadline is extended on a
/// heartbeat so a handler slower than `ack_wait` is not redelivered
/// mid-flight. No timeout is placed around the handler itself.
async fn dispatch(
    handler: &dyn EventHandler,
    signal: ShutdownSignal,
    message: Message,
    queue: &str,
    ack_wait: Duration,
) {
    let event: Event = match serde_json::from_slice(&message.payload) {
        Ok(event) => event,
        Err(err) => {
            // Malformed can never become well-formed by retrying: reject
            // without requeue so it does not loop forever.
            warn!(queue = %queue, error = %err, "malformed event body, rejecting without requeue");
            if let Err(ack_err) = message.ack_with(AckKind::Term).await {
                warn!(queue = %queue, error = %ack_err, "failed to reject malformed message");
            }
            return;
        }
    };

    let event_type = event.event_type().to_string();
    let aggregate_id = event.aggregate_id().to_string();

    let heartbeat = (ack_wait / 2).max(Duration::from_millis(50));
    let mut keepalive = tokio::time::interval(heartbeat);
    keepalive.tick().await; // the first tick is immediate

    let work = handler.handle(signal, event);
    tokio::pin!(work);
    let result = loop {
        tokio::select! {
            result = &mut work => break result,
            _ = keepalive.tick() => {
                if let Err(ack_err) = message.ack_with(AckKind::Progress).await {
                    warn!(queue = %queue, event_type = %event_type, error = %ack_err, "in-progress heartbeat failed");
                }
            }
        }
    };

    match result {
        Ok(()) => {
            if let Err(ack_err) = message.ack().await {
                warn!(queue = %queue, event_type = %event_type, error = %ack_err, "ack failed");
            }
        }
        Err(err) => {
            // Requeue for redelivery: the sole retry mechanism. No backoff
            // and, unless max_deliver was capped, no attempt limit.
            warn!(
                queue = %queue,
                event_type = %event_type,
                aggregate_id = %aggregate_id,
                error = %err,
                "handler failed, requeueing"
            );
            if let Err(ack_err) = message.ack_with(AckKind::Nak(None)).await {
                warn!(queue = %queue, event_type = %event_type, error = %ack_err, "nack failed");
            }
        }
    }
}

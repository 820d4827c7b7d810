//! Construction glue: configuration in, publisher/consumer out.
//!
//! Pure selection, no retry, no fallback. An unknown broker kind already
//! failed at configuration parse time; an unreachable broker fails here,
//! fast, at startup.

use std::sync::Arc;

use orderflow_events::{EventPublisher, InMemoryPublisher};

use crate::config::{BrokerKind, ConfigError, MessagingConfig};
use crate::error::BrokerError;
use crate::nats::consumer::{ConsumerOptions, NatsEventConsumer};
use crate::nats::publisher::NatsEventPublisher;

/// Build the publisher selected by configuration.
///
/// `memory` needs no connection; `nats` connects and declares the event
/// stream eagerly.
pub async fn publisher_from_config(
    config: &MessagingConfig,
) -> Result<Arc<dyn EventPublisher>, BrokerError> {
    match config.broker {
        BrokerKind::Memory => Ok(Arc::new(InMemoryPublisher::new())),
        BrokerKind::Nats => {
            let publisher = NatsEventPublisher::connect(&config.broker_url, &config.exchange).await?;
            Ok(Arc::new(publisher))
        }
    }
}

/// Build a broker-backed consumer.
///
/// Consumers only exist for real brokers: the in-process publisher has no
/// delivery side, so requesting a consumer under `memory` is a
/// configuration error, not a silent downgrade.
pub async fn consumer_from_config(
    config: &MessagingConfig,
    options: ConsumerOptions,
) -> Result<NatsEventConsumer, BrokerError> {
    match config.broker {
        BrokerKind::Memory => Err(BrokerError::Config(ConfigError::ConsumerRequiresBroker(
            config.broker.as_str().to_string(),
        ))),
        BrokerKind::Nats => {
            NatsEventConsumer::connect_with_options(&config.broker_url, &config.exchange, options)
                .await
        }
    }
}

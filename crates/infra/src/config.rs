//! Messaging configuration, read from the environment at construction time.
//!
//! ```text
//! MESSAGE_BROKER_KIND  memory | nats   (default: memory)
//! BROKER_URL           broker URL      (default: nats://localhost:4222)
//! EVENT_EXCHANGE       exchange name   (default: orderflow.events)
//! ```
//!
//! Unknown broker kinds fail closed: a typo is a configuration error, not a
//! silent fallback to the in-process publisher.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Default broker endpoint (local server, default credentials).
pub const DEFAULT_BROKER_URL: &str = "nats://localhost:4222";

/// Default exchange name; doubles as the wire subject prefix.
pub const DEFAULT_EXCHANGE: &str = "orderflow.events";

const BROKER_KIND_VAR: &str = "MESSAGE_BROKER_KIND";
const BROKER_URL_VAR: &str = "BROKER_URL";
const EXCHANGE_VAR: &str = "EVENT_EXCHANGE";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown message broker kind {0:?} (expected \"memory\" or \"nats\")")]
    UnknownBrokerKind(String),

    /// Exchange names become broker subject prefixes, so wildcard
    /// characters and whitespace are not representable.
    #[error("invalid exchange name {0:?}")]
    InvalidExchange(String),

    /// A consumer was requested but the configured broker kind has no
    /// delivery side (the in-process publisher is publish-only).
    #[error("broker kind {0:?} cannot consume; configure a real broker")]
    ConsumerRequiresBroker(String),
}

/// Which publisher/consumer implementation to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerKind {
    /// In-process ordered log; tests and broker-less environments.
    Memory,
    /// NATS JetStream; durable topic-exchange delivery.
    Nats,
}

impl BrokerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Nats => "nats",
        }
    }
}

impl FromStr for BrokerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(Self::Memory),
            "nats" => Ok(Self::Nats),
            other => Err(ConfigError::UnknownBrokerKind(other.to_string())),
        }
    }
}

impl fmt::Display for BrokerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection parameters for the messaging subsystem.
///
/// Pure data: no validation beyond "is this a known broker kind / a
/// representable exchange name", and no connection attempt until a
/// publisher or consumer is actually constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagingConfig {
    pub broker: BrokerKind,
    pub broker_url: String,
    pub exchange: String,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            broker: BrokerKind::Memory,
            broker_url: DEFAULT_BROKER_URL.to_string(),
            exchange: DEFAULT_EXCHANGE.to_string(),
        }
    }
}

impl MessagingConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key/value lookup.
    ///
    /// Tests use this to avoid mutating process-global environment state.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(kind) = lookup(BROKER_KIND_VAR).filter(|v| !v.is_empty()) {
            config.broker = kind.parse()?;
        }
        if let Some(url) = lookup(BROKER_URL_VAR).filter(|v| !v.is_empty()) {
            config.broker_url = url;
        }
        if let Some(exchange) = lookup(EXCHANGE_VAR).filter(|v| !v.is_empty()) {
            config.exchange = exchange;
        }

        validate_exchange(&config.exchange)?;
        Ok(config)
    }
}

fn validate_exchange(exchange: &str) -> Result<(), ConfigError> {
    let representable = !exchange.is_empty()
        && exchange
            .split('.')
            .all(|seg| !seg.is_empty() && seg.chars().all(|c| !c.is_whitespace() && !"*>#".contains(c)));

    if representable {
        Ok(())
    } else {
        Err(ConfigError::InvalidExchange(exchange.to_string()))
    }
}

//! The closed set of worker kinds.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// The label names no registered worker kind. Startup fails fast;
    /// there is no fall-through default.
    #[error("unknown worker kind {0:?} (expected \"order\", \"notification\" or \"sms\")")]
    UnknownWorkerKind(String),

    #[error("missing worker kind argument")]
    MissingWorkerKind,
}

/// Which handler a worker process runs.
///
/// A closed enum rather than a free-form string: every kind resolves to a
/// handler at process start, and an unknown label is a startup error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerKind {
    Order,
    Notification,
    Sms,
}

impl WorkerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Order => "order",
            Self::Notification => "notification",
            Self::Sms => "sms",
        }
    }

    pub const ALL: [WorkerKind; 3] = [Self::Order, Self::Notification, Self::Sms];
}

impl FromStr for WorkerKind {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "order" => Ok(Self::Order),
            // "email" ran the notification handler historically; keep the alias.
            "notification" | "email" => Ok(Self::Notification),
            "sms" => Ok(Self::Sms),
            other => Err(WorkerError::UnknownWorkerKind(other.to_string())),
        }
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

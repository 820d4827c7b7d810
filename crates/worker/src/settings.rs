//! Queue/pattern settings for one worker process.

use crate::kind::{WorkerError, WorkerKind};

/// Where a worker binds and what it receives.
///
/// Defaults derive from the kind (`order` → queue `order_queue`, pattern
/// `order.*`); `QUEUE_NAME` / `ROUTING_PATTERN` environment variables
/// override the defaults, positional arguments override both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSettings {
    pub kind: WorkerKind,
    pub queue_name: String,
    pub routing_pattern: String,
}

impl WorkerSettings {
    pub fn for_kind(kind: WorkerKind) -> Self {
        Self {
            kind,
            queue_name: format!("{kind}_queue"),
            routing_pattern: format!("{kind}.*"),
        }
    }

    /// Resolve settings from a label, positional overrides, and an
    /// environment lookup.
    pub fn resolve(
        label: Option<&str>,
        queue_arg: Option<&str>,
        pattern_arg: Option<&str>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, WorkerError> {
        let kind: WorkerKind = label.ok_or(WorkerError::MissingWorkerKind)?.parse()?;
        let mut settings = Self::for_kind(kind);

        if let Some(queue) = lookup("QUEUE_NAME").filter(|v| !v.is_empty()) {
            settings.queue_name = queue;
        }
        if let Some(pattern) = lookup("ROUTING_PATTERN").filter(|v| !v.is_empty()) {
            settings.routing_pattern = pattern;
        }
        if let Some(queue) = queue_arg {
            settings.queue_name = queue.to_string();
        }
        if let Some(pattern) = pattern_arg {
            settings.routing_pattern = pattern.to_string();
        }

        Ok(settings)
    }
}

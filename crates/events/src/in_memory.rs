//! In-process publisher for tests/dev.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::{Event, EventPublisher, PublishError};

/// In-process event log.
///
/// - No IO / no broker
/// - Unbounded ordered append log
/// - `publish` never fails
/// - Safe for concurrent producers plus a test-side reader
///
/// Not a delivery mechanism: nothing consumes from it across process
/// boundaries. It exists for unit tests and for environments without a
/// broker configured.
#[derive(Debug, Default)]
pub struct InMemoryPublisher {
    events: Mutex<Vec<Event>>,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all published events, in publish order.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().expect("event log poisoned").clone()
    }

    /// Reset the log to empty.
    pub fn clear(&self) {
        self.events.lock().expect("event log poisoned").clear();
    }

    pub fn len(&self) -> usize {
        self.events.lock().expect("event log poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventPublisher for InMemoryPublisher {
    async fn publish(&self, event: Event) -> Result<(), PublishError> {
        self.events.lock().expect("event log poisoned").push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;

    fn event(event_type: &str) -> Event {
        Event::with_timestamp(event_type, "agg-1", json!({}), 0).unwrap()
    }

    #[tokio::test]
    async fn preserves_publish_order() {
        let publisher = InMemoryPublisher::new();

        for t in ["a.one", "b.two", "c.three"] {
            publisher.publish(event(t)).await.unwrap();
        }

        let types: Vec<_> = publisher
            .events()
            .iter()
            .map(|e| e.event_type().to_string())
            .collect();
        assert_eq!(types, ["a.one", "b.two", "c.three"]);
    }

    #[tokio::test]
    async fn clear_empties_the_log() {
        let publisher = InMemoryPublisher::new();
        publisher.publish(event("a.one")).await.unwrap();
        assert!(!publisher.is_empty());

        publisher.clear();
        assert!(publisher.events().is_empty());
    }

    #[tokio::test]
    async fn concurrent_producers_lose_nothing() {
        let publisher = Arc::new(InMemoryPublisher::new());

        let mut tasks = Vec::new();
        for producer in 0..8 {
            let publisher = Arc::clone(&publisher);
            tasks.push(tokio::spawn(async move {
                for i in 0..50 {
                    let ev = Event::with_timestamp(
                        "order.created",
                        format!("p{producer}-{i}"),
                        json!({}),
                        0,
                    )
                    .unwrap();
                    publisher.publish(ev).await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(publisher.len(), 8 * 50);
    }
}

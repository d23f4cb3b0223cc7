use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

/// Local broadcast of workflow lifecycle events
///
/// Observers (diagnostics, UI, tests) subscribe; publishing never blocks and
/// succeeds even when nobody is listening. Slow subscribers lag and lose the
/// oldest events rather than holding up the polling thread.
#[derive(Debug, Clone)]
pub struct WorkflowEventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

/// Event that has been published
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedEvent {
    pub name: String,
    pub context: Value,
    pub published_at: DateTime<Utc>,
}

impl WorkflowEventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event with the given name and context
    pub fn publish(&self, event_name: impl Into<String>, context: Value) {
        let event = PublishedEvent {
            name: event_name.into(),
            context,
            published_at: Utc::now(),
        };
        // No subscribers is fine
        if let Err(broadcast::error::SendError(event)) = self.sender.send(event) {
            trace!(event = %event.name, "📣 EVENTS: No subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for WorkflowEventPublisher {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let publisher = WorkflowEventPublisher::default();
        publisher.publish("workflow.accepted", json!({}));
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscribers_receive_events_in_order() {
        let publisher = WorkflowEventPublisher::new(8);
        let mut receiver = publisher.subscribe();
        publisher.publish("a", json!({ "n": 1 }));
        publisher.publish("b", json!({ "n": 2 }));

        assert_eq!(receiver.recv().await.unwrap().name, "a");
        let second = receiver.recv().await.unwrap();
        assert_eq!(second.name, "b");
        assert_eq!(second.context["n"], 2);
    }
}

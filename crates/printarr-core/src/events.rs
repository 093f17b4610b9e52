//! In-process pub/sub event broadcaster (spec.md §4.9): progress and
//! state-transition events fanned out to streaming subscribers, with a
//! periodic heartbeat and drop-on-slow-subscriber semantics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Bound on each subscriber's buffered queue. A subscriber that falls
/// this far behind is dropped rather than back-pressuring publishers.
const SUBSCRIBER_QUEUE_CAPACITY: usize = 256;

pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    JobCreated,
    JobStarted,
    JobProgress,
    JobCompleted,
    JobFailed,
    JobCanceled,
    DesignStatusChanged,
    DesignCreated,
    QueueUpdated,
    SyncStatus,
    SettingsChanged,
    Heartbeat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(event_type: EventType, payload: serde_json::Value) -> Self {
        Self {
            event_type,
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn heartbeat() -> Self {
        Self::new(EventType::Heartbeat, serde_json::Value::Null)
    }
}

/// Process-wide fan-out topic. Cheap to clone; every clone shares the
/// same underlying broadcast channel.
#[derive(Clone)]
pub struct Broadcaster {
    sender: broadcast::Sender<Event>,
}

impl Default for Broadcaster {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(SUBSCRIBER_QUEUE_CAPACITY);
        Self { sender }
    }
}

/// An active subscription. Unsubscribes (drops the receiver) when this
/// value goes out of scope on any control-flow path, including early
/// return or panic unwind.
pub struct Subscription {
    receiver: broadcast::Receiver<Event>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                // A slow subscriber was dropped past the queue bound;
                // resume from the next event rather than erroring out.
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, event_type: EventType, payload: serde_json::Value) {
        // No receivers is not an error: publishing happens whether or not
        // anyone is currently streaming events.
        let _ = self.sender.send(Event::new(event_type, payload));
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let broadcaster = Broadcaster::new();
        let mut sub = broadcaster.subscribe();
        broadcaster.publish(EventType::JobCreated, serde_json::json!({"job_id": "1"}));

        let event = sub.recv().await.unwrap();
        assert_eq!(event.event_type, EventType::JobCreated);
    }

    #[tokio::test]
    async fn dropping_subscription_unsubscribes() {
        let broadcaster = Broadcaster::new();
        {
            let _sub = broadcaster.subscribe();
            assert_eq!(broadcaster.subscriber_count(), 1);
        }
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_error() {
        let broadcaster = Broadcaster::new();
        broadcaster.publish(EventType::Heartbeat, serde_json::Value::Null);
    }
}

//! Post-reload events.
//!
//! Every reload request sent to the monitoring system is followed by a
//! [`PostReloadEvent`] carrying the outcome, delivered to all subscribers.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

/// Outcome of one reload request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostReloadEvent {
    /// Reload endpoint that was called.
    pub url: String,
    /// HTTP status returned by the endpoint, if a response arrived.
    pub status: Option<u16>,
    /// Transport or status error, if any.
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl PostReloadEvent {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.status.is_some_and(|s| (200..300).contains(&s))
    }

    /// Get a description of the event for logging.
    pub fn description(&self) -> String {
        match (&self.status, &self.error) {
            (_, Some(error)) => format!("Reload of {} failed: {}", self.url, error),
            (Some(status), None) => format!("Reload of {} returned {}", self.url, status),
            (None, None) => format!("Reload of {} sent", self.url),
        }
    }
}

/// Default channel capacity for reload events.
const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Broadcaster for post-reload events.
///
/// Uses tokio's broadcast channel to distribute events to multiple subscribers.
pub struct ReloadEventBroadcaster {
    sender: broadcast::Sender<PostReloadEvent>,
}

impl ReloadEventBroadcaster {
    /// Create a new broadcaster with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new broadcaster with specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to post-reload events.
    pub fn subscribe(&self) -> broadcast::Receiver<PostReloadEvent> {
        self.sender.subscribe()
    }

    /// Publish a post-reload event.
    ///
    /// Returns the number of receivers that received the event.
    /// Returns 0 if there are no active subscribers.
    pub fn publish(&self, event: PostReloadEvent) -> usize {
        tracing::debug!("Publishing reload event: {}", event.description());
        // send() returns Err if there are no receivers, which is fine
        self.sender.send(event).unwrap_or(0)
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ReloadEventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ReloadEventBroadcaster {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(status: Option<u16>, error: Option<&str>) -> PostReloadEvent {
        PostReloadEvent {
            url: "http://prom:9090/-/reload".to_string(),
            status,
            error: error.map(str::to_string),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_event_success() {
        assert!(event(Some(200), None).is_success());
        assert!(!event(Some(500), None).is_success());
        assert!(!event(None, Some("connection refused")).is_success());
    }

    #[tokio::test]
    async fn test_broadcaster_publish_subscribe() {
        let broadcaster = ReloadEventBroadcaster::new();
        let mut receiver = broadcaster.subscribe();

        let sent = event(Some(200), None);
        assert_eq!(broadcaster.publish(sent.clone()), 1);

        let received = receiver.recv().await.unwrap();
        assert_eq!(received, sent);
    }

    #[test]
    fn test_broadcaster_no_subscribers() {
        let broadcaster = ReloadEventBroadcaster::new();
        assert_eq!(broadcaster.subscriber_count(), 0);
        assert_eq!(broadcaster.publish(event(Some(200), None)), 0);
    }
}

//! Fire-and-forget fan-out of mutation events (C10).
//!
//! The teacher's event sink is a single `app_handle.emit("STATE_UPDATE", ...)`
//! call whose result is discarded — a successful command never fails because
//! its event didn't reach a listener. This generalizes that single sink into
//! a per-project subscriber registry backed by `tokio::sync::broadcast`
//! (already a teacher dependency by way of `tokio`), so many projects can be
//! served by one process and each gets its own event stream.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::OperationSource;

/// `spec.md` §4.10: `{source, version, user_id, user_name}`, published once
/// per successful mutating batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineUpdated {
    pub project_id: String,
    pub sequence_id: String,
    pub source: OperationSource,
    pub version: u64,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
}

const CHANNEL_CAPACITY: usize = 256;

/// Registry of per-project broadcast channels. Subscribers register and
/// deregister under a mutex held only for the map update itself, never
/// across a send (spec.md §5's shared-resource policy for this component).
#[derive(Default)]
pub struct EventPublisher {
    channels: Mutex<HashMap<String, broadcast::Sender<TimelineUpdated>>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events for `project_id`. Creates the channel on first
    /// subscriber; the channel outlives individual subscribers (a later
    /// subscriber on the same project gets the same sender).
    pub fn subscribe(&self, project_id: &str) -> broadcast::Receiver<TimelineUpdated> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels
            .entry(project_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publish best-effort, at-most-once. No subscribers and a full channel
    /// both resolve the same way: the event is dropped and nothing here ever
    /// surfaces an error to the caller — publisher failure never fails the
    /// underlying operation (spec.md §4.10, §7).
    pub fn publish(&self, event: TimelineUpdated) {
        let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(sender) = channels.get(&event.project_id) {
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let publisher = EventPublisher::new();
        let mut rx = publisher.subscribe("p1");
        publisher.publish(TimelineUpdated {
            project_id: "p1".to_string(),
            sequence_id: "s1".to_string(),
            source: OperationSource::Editor,
            version: 2,
            user_id: Some("u1".to_string()),
            user_name: None,
        });
        let received = rx.recv().await.unwrap();
        assert_eq!(received.version, 2);
    }

    #[test]
    fn publish_without_subscribers_does_not_panic() {
        let publisher = EventPublisher::new();
        publisher.publish(TimelineUpdated {
            project_id: "no-subscribers".to_string(),
            sequence_id: "s1".to_string(),
            source: OperationSource::ApiV1,
            version: 1,
            user_id: None,
            user_name: None,
        });
    }

    #[tokio::test]
    async fn events_for_different_projects_do_not_cross() {
        let publisher = EventPublisher::new();
        let mut rx_a = publisher.subscribe("a");
        let _rx_b = publisher.subscribe("b");
        publisher.publish(TimelineUpdated {
            project_id: "b".to_string(),
            sequence_id: "s1".to_string(),
            source: OperationSource::Editor,
            version: 1,
            user_id: None,
            user_name: None,
        });
        assert!(rx_a.try_recv().is_err());
    }
}

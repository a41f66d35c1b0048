use std::fmt;

use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventKind {
    #[serde(rename = "orgs-created")]
    OrgsCreated,
    #[serde(rename = "orgs-updated")]
    OrgsUpdated,
    #[serde(rename = "orgs-deleted")]
    OrgsDeleted,
    #[serde(rename = "projects-created")]
    ProjectsCreated,
    #[serde(rename = "projects-updated")]
    ProjectsUpdated,
    #[serde(rename = "projects-deleted")]
    ProjectsDeleted,
    #[serde(rename = "users-created")]
    UsersCreated,
    #[serde(rename = "users-updated")]
    UsersUpdated,
    #[serde(rename = "users-deleted")]
    UsersDeleted,
}

impl EventKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::OrgsCreated => "orgs-created",
            EventKind::OrgsUpdated => "orgs-updated",
            EventKind::OrgsDeleted => "orgs-deleted",
            EventKind::ProjectsCreated => "projects-created",
            EventKind::ProjectsUpdated => "projects-updated",
            EventKind::ProjectsDeleted => "projects-deleted",
            EventKind::UsersCreated => "users-created",
            EventKind::UsersUpdated => "users-updated",
            EventKind::UsersDeleted => "users-deleted",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Post-commit notification carrying the affected resource ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub kind: EventKind,
    pub ids: Vec<String>,
}

impl Event {
    pub fn new(kind: EventKind, ids: Vec<String>) -> Self {
        Self { kind, ids }
    }
}

/// Fire-and-forget sink for committed changes. Implementations must not block.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: Event);
}

/// Logs every event.
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, event: Event) {
        tracing::info!(event = %event.kind, ids = ?event.ids, "committed");
    }
}

/// Fans events out to in-process subscribers. Events sent with no subscriber
/// are dropped.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Event>,
}

impl BroadcastNotifier {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, event: Event) {
        tracing::debug!(event = %event.kind, "broadcasting");
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_subscriber() {
        let notifier = BroadcastNotifier::new(8);
        let mut rx = notifier.subscribe();

        notifier.notify(Event::new(EventKind::OrgsUpdated, vec!["acme".into()]));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::OrgsUpdated);
        assert_eq!(event.ids, vec!["acme".to_string()]);
    }

    #[test]
    fn test_broadcast_without_subscribers_is_dropped() {
        let notifier = BroadcastNotifier::new(8);
        notifier.notify(Event::new(EventKind::UsersDeleted, vec!["carol".into()]));
    }

    #[test]
    fn test_event_kind_serializes_as_wire_name() {
        let json = serde_json::to_string(&EventKind::ProjectsDeleted).unwrap();
        assert_eq!(json, "\"projects-deleted\"");
    }
}

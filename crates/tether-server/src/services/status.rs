//! Status publisher — serializes registry state for dashboard observers.
//!
//! Read-only with respect to sessions: it snapshots, serializes, and writes.

use std::sync::Arc;

use tether_protocol::StatusSnapshot;

use crate::ws::registry::SessionRegistry;

#[derive(Debug, Clone)]
pub struct StatusPublisher {
    registry: Arc<SessionRegistry>,
    /// Logical name of the status observer channel.
    channel: String,
}

impl StatusPublisher {
    pub fn new(registry: Arc<SessionRegistry>, channel: impl Into<String>) -> Self {
        Self {
            registry,
            channel: channel.into(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.registry
            .snapshot()
            .into_iter()
            .map(|s| (s.name, s.connected, s.label))
            .collect()
    }

    pub fn render(&self) -> String {
        self.snapshot().to_json()
    }

    /// Send the current snapshot to one session.
    pub fn publish(&self, target: &str) -> bool {
        let body = self.render();
        match self.registry.send_to(target, &body) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(%target, error = %e, "Status publish skipped");
                false
            }
        }
    }

    /// Push the snapshot to the status channel, if an observer is connected.
    pub fn notify_change(&self) -> bool {
        self.publish(&self.channel)
    }

    /// Send the snapshot to every connected session.
    pub fn broadcast_all(&self) -> usize {
        let body = self.render();
        let mut delivered = 0;
        self.registry.for_each(
            |_| true,
            |_, handle| {
                if handle.send_text(&body) {
                    delivered += 1;
                }
            },
        );
        tracing::debug!(delivered, "Status broadcast");
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::registry::ConnectionHandle;
    use axum::extract::ws::Message;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn connect(registry: &SessionRegistry, name: &str) -> UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        registry.upsert_on_connect(name, None, ConnectionHandle::new(tx));
        rx
    }

    fn last_json(rx: &mut UnboundedReceiver<Message>) -> Option<serde_json::Value> {
        let mut last = None;
        while let Ok(Message::Text(t)) = rx.try_recv() {
            last = serde_json::from_str(t.as_str()).ok();
        }
        last
    }

    #[test]
    fn test_snapshot_serialization() {
        let registry = Arc::new(SessionRegistry::new());
        let _a = connect(&registry, "espLeds");
        let _b = connect(&registry, "ipadAlma");
        registry.mark_disconnected("ipadAlma");

        let publisher = StatusPublisher::new(registry, "dashboard");
        let value: serde_json::Value = serde_json::from_str(&publisher.render()).unwrap();

        assert_eq!(value["espLeds"], serde_json::json!([true, "espLeds"]));
        assert_eq!(value["ipadAlma"], serde_json::json!([false, "ipadAlma"]));
        assert_eq!(value.as_object().unwrap().len(), 2);
    }

    #[test]
    fn test_notify_change_targets_status_channel() {
        let registry = Arc::new(SessionRegistry::new());
        let mut dash = connect(&registry, "dashboard");
        let mut esp = connect(&registry, "espFire");

        let publisher = StatusPublisher::new(registry, "dashboard");
        assert!(publisher.notify_change());

        let value = last_json(&mut dash).unwrap();
        assert_eq!(value["espFire"], serde_json::json!([true, "espFire"]));
        assert_eq!(value["dashboard"], serde_json::json!([true, "dashboard"]));
        assert!(last_json(&mut esp).is_none());
    }

    #[test]
    fn test_notify_without_observer_is_noop() {
        let registry = Arc::new(SessionRegistry::new());
        let _esp = connect(&registry, "espFire");
        let publisher = StatusPublisher::new(registry.clone(), "dashboard");

        assert!(!publisher.notify_change());
        assert!(registry.is_connected("espFire"));
    }

    #[test]
    fn test_broadcast_all_reaches_connected_sessions() {
        let registry = Arc::new(SessionRegistry::new());
        let mut a = connect(&registry, "a");
        let mut b = connect(&registry, "b");
        let mut c = connect(&registry, "c");
        registry.mark_disconnected("c");

        let publisher = StatusPublisher::new(registry, "dashboard");
        assert_eq!(publisher.broadcast_all(), 2);
        assert_eq!(last_json(&mut a).unwrap()["c"], serde_json::json!([false, "c"]));
        assert!(last_json(&mut b).is_some());
        assert!(last_json(&mut c).is_none());
    }
}

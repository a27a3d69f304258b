//! Heartbeat monitor — probes every session and drops the silent ones.
//!
//! Runs every `heartbeat.ping_interval_secs`. A session that has not
//! answered since the previous tick accrues a miss; at
//! `heartbeat.max_missed_heartbeats` misses its connection is closed and the
//! record removed, and the status channel is pushed a fresh snapshot.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::AppState;

pub fn start(state: Arc<AppState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = Duration::from_secs(state.config.heartbeat.ping_interval_secs);
        let max_missed = state.config.heartbeat.max_missed_heartbeats;

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            "Heartbeat monitor started (every {}s, drop after {} misses)",
            period.as_secs(),
            max_missed
        );

        loop {
            interval.tick().await;

            let report = state.registry.sweep(max_missed);

            if !report.expired.is_empty() {
                tracing::info!(
                    count = report.expired.len(),
                    names = ?report.expired,
                    "Heartbeat monitor: dropped silent sessions"
                );
                state.publisher.notify_change();
            }

            tracing::debug!(
                probed = report.probed,
                suspect = report.suspect,
                "Heartbeat tick"
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::registry::ConnectionHandle;
    use axum::extract::ws::Message;
    use tether_common::TetherConfig;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn connect(state: &AppState, name: &str) -> UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        state
            .registry
            .upsert_on_connect(name, None, ConnectionHandle::new(tx));
        rx
    }

    fn frames(rx: &mut UnboundedReceiver<Message>) -> Vec<Message> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_session_dropped_and_observer_notified() {
        let mut config = TetherConfig::default();
        config.heartbeat.ping_interval_secs = 5;
        config.heartbeat.max_missed_heartbeats = 3;
        let state = Arc::new(AppState::new(config));

        let mut dash = connect(&state, "dashboard");
        let mut esp = connect(&state, "espFire");

        let monitor = start(state.clone());

        // The dashboard keeps answering, the ESP stays silent.
        for _ in 0..5 {
            tokio::time::sleep(Duration::from_secs(5)).await;
            state.router.route("dashboard", "pong");
        }

        assert!(state.registry.lookup("espFire").is_none());
        assert!(state.registry.is_connected("dashboard"));

        let esp_frames = frames(&mut esp);
        let closes = esp_frames
            .iter()
            .filter(|m| matches!(m, Message::Close(_)))
            .count();
        assert_eq!(closes, 1);
        assert!(esp_frames
            .iter()
            .any(|m| matches!(m, Message::Text(t) if t.as_str() == "ping")));

        let last_status = frames(&mut dash)
            .into_iter()
            .filter_map(|m| match m {
                Message::Text(t) if t.as_str().starts_with('{') => {
                    serde_json::from_str::<serde_json::Value>(t.as_str()).ok()
                }
                _ => None,
            })
            .last()
            .unwrap();
        assert!(last_status.get("espFire").is_none());
        assert_eq!(last_status["dashboard"], serde_json::json!([true, "dashboard"]));

        monitor.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_acknowledging_session_survives() {
        let mut config = TetherConfig::default();
        config.heartbeat.ping_interval_secs = 5;
        config.heartbeat.max_missed_heartbeats = 1;
        let state = Arc::new(AppState::new(config));
        let _rx = connect(&state, "espLeds");

        let monitor = start(state.clone());
        for _ in 0..10 {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            state.router.route("espLeds", "pong");
        }

        assert!(state.registry.is_connected("espLeds"));
        monitor.abort();
    }
}

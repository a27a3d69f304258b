//! Status resync — periodically pushes the snapshot to the status channel.
//!
//! Covers observers that missed a push-on-change update. With
//! `status.resync_broadcast` every connected session gets the snapshot.
//! Disabled when `status.resync_interval_secs` is 0.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::AppState;

pub fn start(state: Arc<AppState>) -> Option<JoinHandle<()>> {
    let secs = state.config.status.resync_interval_secs;
    if secs == 0 {
        tracing::info!("Status resync disabled");
        return None;
    }

    let broadcast = state.config.status.resync_broadcast;

    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(secs));

        tracing::info!(
            "Status resync started (every {}s, channel {}, broadcast {})",
            secs,
            state.publisher.channel(),
            broadcast
        );

        loop {
            interval.tick().await;
            if broadcast {
                let delivered = state.publisher.broadcast_all();
                tracing::debug!(delivered, "Status resync broadcast");
            } else if state.publisher.notify_change() {
                tracing::debug!("Status resync pushed");
            }
        }
    }))
}

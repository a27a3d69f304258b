//! Background workers — periodic tasks running alongside the server.

pub mod heartbeat_monitor;
pub mod status_resync;

use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::AppState;

/// Start all background worker tasks. Returns handles that can be
/// used to abort them on shutdown.
pub fn start_all_workers(state: Arc<AppState>) -> Vec<JoinHandle<()>> {
    let mut handles = vec![heartbeat_monitor::start(state.clone())];
    handles.extend(status_resync::start(state));
    handles
}

//! In-memory registry of named WebSocket sessions.
//!
//! One record per logical name; a reconnect under the same name replaces the
//! previous connection handle. Every mutation, including the whole liveness
//! tick, runs under a single write lock so counters are never updated with a
//! read-then-write race. Outbound frames are pushed onto unbounded channels,
//! so holding the lock never waits on socket I/O.

use std::collections::HashMap;

use axum::extract::ws::Message;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use uuid::Uuid;

use tether_common::{TetherError, TetherResult};
use tether_protocol::PING;

/// Channel sender capable of pushing WS frames to a connected peer.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// Write/close capability for one client connection.
///
/// The frames are drained by the connection's writer task; a `Close` frame
/// makes the writer flush it and stop, which in turn ends the connection
/// worker.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    tx: WsSender,
}

impl ConnectionHandle {
    pub fn new(tx: WsSender) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queue a text frame. Returns `false` if the writer is gone.
    pub fn send_text(&self, text: &str) -> bool {
        self.tx.send(Message::Text(text.to_owned().into())).is_ok()
    }

    /// Queue a binary frame. Returns `false` if the writer is gone.
    pub fn send_binary(&self, data: Vec<u8>) -> bool {
        self.tx.send(Message::Binary(data.into())).is_ok()
    }

    /// Ask the writer to send a close frame and stop.
    pub(crate) fn close(&self) {
        let _ = self.tx.send(Message::Close(None));
    }
}

#[derive(Debug)]
struct SessionRecord {
    handle: ConnectionHandle,
    label: String,
    connected: bool,
    last_heartbeat_ack: Instant,
    missed_heartbeats: u32,
    connected_at: DateTime<Utc>,
}

impl SessionRecord {
    fn info(&self, name: &str) -> SessionInfo {
        SessionInfo {
            name: name.to_string(),
            label: self.label.clone(),
            connected: self.connected,
            missed_heartbeats: self.missed_heartbeats,
            last_heartbeat_ack_ms: self.last_heartbeat_ack.elapsed().as_millis() as u64,
            connected_at: self.connected_at,
            connection_id: self.handle.id(),
        }
    }
}

/// Observable copy of a session record. Never carries the handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub name: String,
    pub label: String,
    pub connected: bool,
    pub missed_heartbeats: u32,
    /// Milliseconds since the last heartbeat acknowledgment.
    pub last_heartbeat_ack_ms: u64,
    pub connected_at: DateTime<Utc>,
    pub connection_id: Uuid,
}

/// One line of the status snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub name: String,
    pub connected: bool,
    pub label: String,
}

/// Outcome of one liveness tick.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Sessions that were sent a probe.
    pub probed: usize,
    /// Sessions with at least one missed heartbeat that survived the tick.
    pub suspect: usize,
    /// Sessions whose connection was closed and record removed.
    pub expired: Vec<String>,
}

#[derive(Debug, Default)]
struct Inner {
    sessions: HashMap<String, SessionRecord>,
    /// When the previous liveness tick ran.
    last_sweep: Option<Instant>,
}

/// Central registry shared across all connection workers and the monitor.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    inner: RwLock<Inner>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Lifecycle ───────────────────────────────────────────

    /// Insert or replace the session for `name`.
    ///
    /// A previous connection under the same name is force-closed. Returns
    /// `true` if a record was replaced.
    pub fn upsert_on_connect(
        &self,
        name: &str,
        label: Option<String>,
        handle: ConnectionHandle,
    ) -> bool {
        let conn_id = handle.id();
        let record = SessionRecord {
            handle,
            label: label.unwrap_or_else(|| name.to_string()),
            connected: true,
            last_heartbeat_ack: Instant::now(),
            missed_heartbeats: 0,
            connected_at: Utc::now(),
        };

        let previous = self.inner.write().sessions.insert(name.to_string(), record);

        match previous {
            Some(old) => {
                if old.handle.id() != conn_id {
                    old.handle.close();
                }
                tracing::info!(
                    %name,
                    %conn_id,
                    old_conn_id = %old.handle.id(),
                    "Session replaced"
                );
                true
            }
            None => {
                tracing::info!(%name, %conn_id, "Session registered");
                false
            }
        }
    }

    /// Flag the session as disconnected, keeping its record for status
    /// reporting until the liveness monitor drops it. Idempotent.
    ///
    /// Returns `true` if the session was connected before the call.
    pub fn mark_disconnected(&self, name: &str) -> bool {
        let mut inner = self.inner.write();
        match inner.sessions.get_mut(name) {
            Some(rec) if rec.connected => {
                rec.connected = false;
                tracing::info!(%name, "Session marked disconnected");
                true
            }
            _ => false,
        }
    }

    /// Like [`mark_disconnected`](Self::mark_disconnected), but only if the
    /// session still belongs to connection `conn_id`. A worker whose
    /// connection was superseded must not flip the replacement's status.
    pub fn mark_connection_closed(&self, name: &str, conn_id: Uuid) -> bool {
        let mut inner = self.inner.write();
        match inner.sessions.get_mut(name) {
            Some(rec) if rec.handle.id() == conn_id && rec.connected => {
                rec.connected = false;
                tracing::info!(%name, %conn_id, "Session connection closed");
                true
            }
            Some(rec) if rec.handle.id() != conn_id => {
                tracing::debug!(%name, %conn_id, "Superseded connection closed");
                false
            }
            _ => false,
        }
    }

    /// Delete the record and close its connection.
    pub fn remove(&self, name: &str) -> bool {
        let removed = self.inner.write().sessions.remove(name);
        match removed {
            Some(rec) => {
                rec.handle.close();
                tracing::info!(%name, conn_id = %rec.handle.id(), "Session removed");
                true
            }
            None => false,
        }
    }

    /// Close every connection and empty the registry. Used on shutdown.
    pub fn close_all(&self) -> usize {
        let drained: Vec<(String, SessionRecord)> = {
            let mut inner = self.inner.write();
            inner.last_sweep = None;
            inner.sessions.drain().collect()
        };
        for (_, rec) in &drained {
            rec.handle.close();
        }
        if !drained.is_empty() {
            tracing::info!(count = drained.len(), "Closed all sessions");
        }
        drained.len()
    }

    // ─── Queries ─────────────────────────────────────────────

    pub fn lookup(&self, name: &str) -> Option<SessionInfo> {
        self.inner.read().sessions.get(name).map(|rec| rec.info(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().sessions.contains_key(name)
    }

    pub fn is_connected(&self, name: &str) -> bool {
        self.inner
            .read()
            .sessions
            .get(name)
            .is_some_and(|rec| rec.connected)
    }

    /// Consistent point-in-time status of every session, ordered by name.
    pub fn snapshot(&self) -> Vec<SessionStatus> {
        let mut out: Vec<SessionStatus> = self
            .inner
            .read()
            .sessions
            .iter()
            .map(|(name, rec)| SessionStatus {
                name: name.clone(),
                connected: rec.connected,
                label: rec.label.clone(),
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Full details of every session, ordered by name.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        let mut out: Vec<SessionInfo> = self
            .inner
            .read()
            .sessions
            .iter()
            .map(|(name, rec)| rec.info(name))
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub fn len(&self) -> usize {
        self.inner.read().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn connected_count(&self) -> usize {
        self.inner
            .read()
            .sessions
            .values()
            .filter(|rec| rec.connected)
            .count()
    }

    /// Apply `action` to every session whose name matches `predicate`.
    ///
    /// Only connected sessions are visited: a disconnected record has no
    /// writer left to hand to `action`. The matching handles are collected
    /// under the read lock and the actions run after it is released, so an
    /// action may call back into the registry. Returns the number visited.
    pub fn for_each<P, F>(&self, predicate: P, mut action: F) -> usize
    where
        P: Fn(&str) -> bool,
        F: FnMut(&str, &ConnectionHandle),
    {
        let targets: Vec<(String, ConnectionHandle)> = self
            .inner
            .read()
            .sessions
            .iter()
            .filter(|(name, rec)| rec.connected && predicate(name.as_str()))
            .map(|(name, rec)| (name.clone(), rec.handle.clone()))
            .collect();

        for (name, handle) in &targets {
            action(name, handle);
        }
        targets.len()
    }

    // ─── Delivery ────────────────────────────────────────────

    /// Queue a text frame for `name`.
    pub fn send_to(&self, name: &str, text: &str) -> TetherResult<()> {
        let inner = self.inner.read();
        let rec = inner
            .sessions
            .get(name)
            .ok_or_else(|| TetherError::UnknownRecipient(name.to_string()))?;
        if !rec.connected {
            return Err(TetherError::NotConnected(name.to_string()));
        }
        if !rec.handle.send_text(text) {
            // Counted as a missed heartbeat by the next liveness tick.
            tracing::debug!(%name, "Write to stale connection failed");
            return Err(TetherError::NotConnected(name.to_string()));
        }
        Ok(())
    }

    /// Queue a binary frame for `name`.
    pub fn send_binary_to(&self, name: &str, data: Vec<u8>) -> TetherResult<()> {
        let inner = self.inner.read();
        let rec = inner
            .sessions
            .get(name)
            .ok_or_else(|| TetherError::UnknownRecipient(name.to_string()))?;
        if !rec.connected || !rec.handle.send_binary(data) {
            return Err(TetherError::NotConnected(name.to_string()));
        }
        Ok(())
    }

    // ─── Liveness ────────────────────────────────────────────

    /// Record a heartbeat acknowledgment: resets the miss counter and marks
    /// the session connected. Returns `false` for unknown names.
    pub fn acknowledge(&self, name: &str) -> bool {
        self.acknowledge_if(name, |_| true)
    }

    /// Like [`acknowledge`](Self::acknowledge), but only if the session
    /// still belongs to connection `conn_id`. A superseded connection's late
    /// answer must not refresh its replacement.
    pub fn acknowledge_connection(&self, name: &str, conn_id: Uuid) -> bool {
        self.acknowledge_if(name, |rec| rec.handle.id() == conn_id)
    }

    fn acknowledge_if(&self, name: &str, owns: impl Fn(&SessionRecord) -> bool) -> bool {
        let mut inner = self.inner.write();
        match inner.sessions.get_mut(name) {
            Some(rec) if owns(rec) => {
                rec.last_heartbeat_ack = Instant::now();
                rec.missed_heartbeats = 0;
                rec.connected = true;
                true
            }
            _ => false,
        }
    }

    /// Whether connection `conn_id` currently owns the session for `name`.
    pub fn is_current(&self, name: &str, conn_id: Uuid) -> bool {
        self.inner
            .read()
            .sessions
            .get(name)
            .is_some_and(|rec| rec.handle.id() == conn_id)
    }

    /// Run one liveness tick.
    ///
    /// Every session that has not acknowledged since the previous tick gets
    /// its miss counter bumped; sessions reaching `max_missed` are closed and
    /// removed; every surviving connected session is sent a probe.
    pub fn sweep(&self, max_missed: u32) -> SweepReport {
        let now = Instant::now();
        let mut report = SweepReport::default();
        let mut inner = self.inner.write();
        let previous = inner.last_sweep.replace(now);

        inner.sessions.retain(|name, rec| {
            if previous.is_some_and(|prev| rec.last_heartbeat_ack < prev) {
                rec.missed_heartbeats += 1;
            }
            if rec.missed_heartbeats >= max_missed {
                rec.handle.close();
                tracing::info!(
                    %name,
                    missed = rec.missed_heartbeats,
                    connected = rec.connected,
                    "Session expired after missed heartbeats"
                );
                report.expired.push(name.clone());
                false
            } else {
                true
            }
        });

        for (name, rec) in inner.sessions.iter() {
            if rec.missed_heartbeats > 0 {
                report.suspect += 1;
            }
            if !rec.connected {
                continue;
            }
            if rec.handle.send_text(PING) {
                report.probed += 1;
            } else {
                tracing::debug!(%name, "Heartbeat probe failed, counting as missed");
            }
        }

        report.expired.sort();
        report
    }
}

//! # tether-protocol
//!
//! Wire vocabulary shared by the Tether relay and its clients.
//!
//! Every frame is a UTF-8 text message. Two payloads are reserved for the
//! heartbeat and never reach application routing: [`PING`] and [`PONG`].
//! The status channel additionally understands [`ControlRequest`] JSON and
//! answers with a [`StatusSnapshot`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Heartbeat probe, sent by the server every ping interval.
pub const PING: &str = "ping";

/// Heartbeat acknowledgment, sent by clients in reply to [`PING`].
pub const PONG: &str = "pong";

/// Separates a logical name from the command in prefix-addressed payloads
/// (`"espLeds:turn_on"`).
pub const ADDRESS_SEPARATOR: char = ':';

/// Longest accepted logical name.
pub const MAX_NAME_LEN: usize = 64;

/// Default listen port of the relay.
pub const DEFAULT_PORT: u16 = 8080;

/// Default heartbeat interval in seconds.
pub const DEFAULT_PING_INTERVAL_SECS: u64 = 5;

/// Default number of unanswered probes before a session is dropped.
pub const DEFAULT_MAX_MISSED_HEARTBEATS: u32 = 3;

/// Returns `true` if `text` is one of the heartbeat tokens.
pub fn is_reserved(text: &str) -> bool {
    text == PING || text == PONG
}

// ─── Control channel ─────────────────────────────────────────

/// Requests understood on the status channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlRequest {
    /// `{"type": "get_status"}` — reply with the current snapshot.
    GetStatus,
}

impl ControlRequest {
    /// Parse a control payload. Anything that is not a well-formed request
    /// yields `None` and is treated as a routable command by the relay.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}

/// Point-in-time connectivity of every session:
/// `{"espLeds": [true, "espLeds"], "ipadAlma": [false, "ipadAlma"]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusSnapshot(pub BTreeMap<String, (bool, String)>);

impl StatusSnapshot {
    pub fn insert(&mut self, name: impl Into<String>, connected: bool, label: impl Into<String>) {
        self.0.insert(name.into(), (connected, label.into()));
    }

    pub fn get(&self, name: &str) -> Option<&(bool, String)> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json(&self) -> String {
        // A map of string keys to (bool, String) cannot fail to serialize.
        serde_json::to_string(&self.0).unwrap_or_else(|_| "{}".to_string())
    }
}

impl FromIterator<(String, bool, String)> for StatusSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, bool, String)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, connected, label)| (name, (connected, label)))
                .collect(),
        )
    }
}

// ─── Addressing ──────────────────────────────────────────────

/// If `payload` is addressed to `name` (`"<name>:<command>"`), return the
/// command part.
pub fn strip_address<'a>(payload: &'a str, name: &str) -> Option<&'a str> {
    payload
        .strip_prefix(name)?
        .strip_prefix(ADDRESS_SEPARATOR)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("name is empty")]
    Empty,

    #[error("name is longer than {MAX_NAME_LEN} characters")]
    TooLong,

    #[error("name contains invalid character {0:?}")]
    InvalidChar(char),

    #[error("name {0:?} is a reserved heartbeat token")]
    Reserved(String),
}

/// Validate a logical name: 1–64 characters of `[A-Za-z0-9_.-]`.
///
/// The separator is excluded so that a name can always be recovered from an
/// addressed payload.
pub fn validate_name(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty);
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(NameError::TooLong);
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(NameError::InvalidChar(c));
    }
    if is_reserved(name) {
        return Err(NameError::Reserved(name.to_string()));
    }
    Ok(())
}

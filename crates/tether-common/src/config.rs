use serde::Deserialize;

use crate::error::TetherResult;
use tether_protocol::{
    validate_name, DEFAULT_MAX_MISSED_HEARTBEATS, DEFAULT_PING_INTERVAL_SECS, DEFAULT_PORT,
};

/// Environment variable naming an optional TOML config file.
pub const CONFIG_FILE_ENV: &str = "TETHER_CONFIG";

/// Config file read when `TETHER_CONFIG` is unset (may be absent).
pub const DEFAULT_CONFIG_FILE: &str = "tether.toml";

/// Top-level relay configuration.
/// Loaded from an optional TOML file overlaid with environment variables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TetherConfig {
    /// Server settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Liveness monitor settings
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    /// Status channel settings
    #[serde(default)]
    pub status: StatusConfig,
    /// Static forwarding routes between devices
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to (default: 0.0.0.0)
    #[serde(default = "default_host")]
    pub host: String,
    /// Listen port (default: 8080)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Log level used when RUST_LOG is unset (default: info)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit JSON log lines (default: false)
    #[serde(default)]
    pub log_json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatConfig {
    /// Seconds between two probes (default: 5)
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
    /// Unanswered ticks before a session is dropped (default: 3)
    #[serde(default = "default_max_missed")]
    pub max_missed_heartbeats: u32,
    /// Whether a binary frame counts as a heartbeat acknowledgment (default: true)
    #[serde(default = "default_true")]
    pub binary_is_activity: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusConfig {
    /// Logical name of the status/control channel (default: dashboard)
    #[serde(default = "default_status_channel")]
    pub channel: String,
    /// Seconds between unsolicited snapshot pushes; 0 disables (default: 30)
    #[serde(default = "default_resync_interval")]
    pub resync_interval_secs: u64,
    /// Send the periodic snapshot to every connected session instead of
    /// the status channel only (default: false)
    #[serde(default)]
    pub resync_broadcast: bool,
}

/// One forwarding rule: text from `from` matching `commands` goes to `to`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RouteConfig {
    pub from: String,
    pub to: String,
    /// Exact payloads to forward. Empty forwards everything.
    #[serde(default)]
    pub commands: Vec<String>,
    /// Text sent back to `from` when `to` is not connected.
    #[serde(default)]
    pub unavailable_reply: Option<String>,
}

impl TetherConfig {
    /// Load config from the optional config file and environment variables
    /// (`TETHER_SERVER__PORT=9000`).
    pub fn load() -> TetherResult<Self> {
        let path =
            std::env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

        let cfg = config::Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(
                config::Environment::default()
                    .prefix("TETHER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let parsed: Self = cfg.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Parse a TOML document, without consulting the environment.
    pub fn from_toml(source: &str) -> TetherResult<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?;

        let parsed: Self = cfg.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> TetherResult<()> {
        if self.heartbeat.ping_interval_secs == 0 {
            return Err(invalid("heartbeat.ping_interval_secs must be positive").into());
        }
        if self.heartbeat.max_missed_heartbeats == 0 {
            return Err(invalid("heartbeat.max_missed_heartbeats must be positive").into());
        }
        validate_name(&self.status.channel)
            .map_err(|e| invalid(&format!("status.channel: {e}")))?;
        for route in &self.routes {
            validate_name(&route.from)
                .and_then(|_| validate_name(&route.to))
                .map_err(|e| invalid(&format!("route {} -> {}: {e}", route.from, route.to)))?;
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> config::ConfigError {
    config::ConfigError::Message(msg.to_string())
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: default_ping_interval(),
            max_missed_heartbeats: default_max_missed(),
            binary_is_activity: true,
        }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            channel: default_status_channel(),
            resync_interval_secs: default_resync_interval(),
            resync_broadcast: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_ping_interval() -> u64 {
    DEFAULT_PING_INTERVAL_SECS
}
fn default_max_missed() -> u32 {
    DEFAULT_MAX_MISSED_HEARTBEATS
}
fn default_true() -> bool {
    true
}
fn default_status_channel() -> String {
    "dashboard".to_string()
}
fn default_resync_interval() -> u64 {
    30
}

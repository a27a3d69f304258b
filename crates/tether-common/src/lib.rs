//! # tether-common
//!
//! Shared configuration and error types for the Tether relay.

pub mod config;
pub mod error;

pub use self::config::{HeartbeatConfig, RouteConfig, ServerConfig, StatusConfig, TetherConfig};
pub use self::error::{TetherError, TetherResult};

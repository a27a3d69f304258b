//! Relay services — routing, application routes, and status publishing.

pub mod router;
pub mod routes;
pub mod status;

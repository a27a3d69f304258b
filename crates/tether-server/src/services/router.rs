//! Message router — classifies inbound text and decides who receives it.
//!
//! Heartbeat tokens are consumed here and never reach application routing.
//! Text from the status channel is either a control request or a
//! prefix-addressed command (`"<name>:<command>"`); text from any other name
//! goes to that name's route handlers.

use std::sync::Arc;

use tether_protocol::{is_reserved, strip_address, ControlRequest, PING, PONG};
use uuid::Uuid;

use crate::services::routes::{RouteContext, RouteTable};
use crate::services::status::StatusPublisher;
use crate::ws::registry::SessionRegistry;

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// `"pong"` recorded as a heartbeat acknowledgment.
    Acknowledged,
    /// `"ping"` answered with `"pong"`.
    ProbeAnswered,
    /// Status snapshot sent back to the status channel.
    StatusSent,
    /// Prefix-addressed command delivered to this many sessions.
    Dispatched(usize),
    /// Handed to this many route handlers.
    Handled(usize),
    /// Nobody was interested.
    Dropped,
}

#[derive(Debug)]
pub struct MessageRouter {
    registry: Arc<SessionRegistry>,
    routes: RouteTable,
    publisher: StatusPublisher,
    /// Whether an inbound binary frame refreshes the sender's heartbeat.
    binary_is_activity: bool,
}

impl MessageRouter {
    pub fn new(
        registry: Arc<SessionRegistry>,
        routes: RouteTable,
        publisher: StatusPublisher,
    ) -> Self {
        Self {
            registry,
            routes,
            publisher,
            binary_is_activity: true,
        }
    }

    pub fn binary_is_activity(mut self, enabled: bool) -> Self {
        self.binary_is_activity = enabled;
        self
    }

    /// Route text read from connection `conn_id`. Frames from a connection
    /// that no longer owns `sender` are dropped, heartbeat answers included.
    pub fn route_connection(&self, sender: &str, conn_id: Uuid, payload: &str) -> RouteOutcome {
        if payload == PONG {
            if self.registry.acknowledge_connection(sender, conn_id) {
                return RouteOutcome::Acknowledged;
            }
            tracing::debug!(%sender, %conn_id, "Heartbeat ack from superseded connection");
            return RouteOutcome::Dropped;
        }
        if !self.registry.is_current(sender, conn_id) {
            tracing::debug!(%sender, %conn_id, "Frame from superseded connection dropped");
            return RouteOutcome::Dropped;
        }
        self.route(sender, payload)
    }

    /// Route a binary frame read from connection `conn_id`, counting it as
    /// heartbeat activity when configured.
    pub fn route_binary_connection(
        &self,
        sender: &str,
        conn_id: Uuid,
        data: &[u8],
    ) -> RouteOutcome {
        if !self.registry.is_current(sender, conn_id) {
            tracing::debug!(%sender, %conn_id, "Binary frame from superseded connection dropped");
            return RouteOutcome::Dropped;
        }
        if self.binary_is_activity {
            self.registry.acknowledge_connection(sender, conn_id);
        }
        self.route_binary(sender, data)
    }

    /// Route one inbound text payload from `sender`.
    pub fn route(&self, sender: &str, payload: &str) -> RouteOutcome {
        match payload {
            PONG => {
                if !self.registry.acknowledge(sender) {
                    tracing::debug!(%sender, "Heartbeat ack from unregistered name");
                }
                return RouteOutcome::Acknowledged;
            }
            PING => {
                self.send_to(sender, PONG);
                return RouteOutcome::ProbeAnswered;
            }
            _ => {}
        }

        if sender == self.publisher.channel() {
            return self.route_control(sender, payload);
        }

        let handlers = self.routes.handlers(sender);
        if handlers.is_empty() {
            tracing::debug!(%sender, %payload, "No route for sender, dropping");
            return RouteOutcome::Dropped;
        }

        tracing::debug!(%sender, %payload, handlers = handlers.len(), "Routing text");
        let ctx = RouteContext::new(sender, &self.registry);
        for handler in handlers {
            handler.on_text(&ctx, payload);
        }
        RouteOutcome::Handled(handlers.len())
    }

    /// Route one inbound binary frame from `sender` to its handlers.
    pub fn route_binary(&self, sender: &str, data: &[u8]) -> RouteOutcome {
        let handlers = self.routes.handlers(sender);
        if handlers.is_empty() {
            tracing::debug!(%sender, bytes = data.len(), "No route for binary frame, dropping");
            return RouteOutcome::Dropped;
        }
        let ctx = RouteContext::new(sender, &self.registry);
        for handler in handlers {
            handler.on_binary(&ctx, data);
        }
        RouteOutcome::Handled(handlers.len())
    }

    /// Deliver text to `name`. Fails if the name is unknown or not connected.
    pub fn send_to(&self, name: &str, text: &str) -> bool {
        match self.registry.send_to(name, text) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(%name, error = %e, "Delivery failed");
                false
            }
        }
    }

    fn route_control(&self, sender: &str, payload: &str) -> RouteOutcome {
        match ControlRequest::parse(payload) {
            Some(ControlRequest::GetStatus) => {
                self.publisher.publish(sender);
                RouteOutcome::StatusSent
            }
            None => RouteOutcome::Dispatched(self.dispatch_by_prefix(payload)),
        }
    }

    /// Forward `"<name>:<command>"` as `"<command>"` to every connected
    /// session whose name prefixes the payload. Returns the delivery count.
    pub fn dispatch_by_prefix(&self, payload: &str) -> usize {
        let mut delivered = 0;
        let matched = self.registry.for_each(
            |name| strip_address(payload, name).is_some(),
            |name, handle| {
                let Some(command) = strip_address(payload, name) else {
                    return;
                };
                if is_reserved(command) {
                    tracing::warn!(%name, %command, "Refusing to forward a heartbeat token");
                    return;
                }
                if handle.send_text(command) {
                    tracing::info!(%name, %command, "Dispatched command");
                    delivered += 1;
                }
            },
        );

        if matched == 0 {
            tracing::info!(%payload, "No session matches command, dropping");
        }
        delivered
    }
}

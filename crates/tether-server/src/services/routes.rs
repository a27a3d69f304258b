//! Application routes — what a named device's messages do.
//!
//! Each logical name may have any number of [`RouteHandler`]s. They see every
//! application text (heartbeat tokens never reach them) and every binary
//! frame sent by that name, and decide for themselves where to forward it
//! through [`RouteContext::send_to`].

use std::collections::HashMap;
use std::sync::Arc;

use tether_common::RouteConfig;

use crate::ws::registry::SessionRegistry;

/// Registry access handed to a route handler for one inbound message.
pub struct RouteContext<'a> {
    sender: &'a str,
    registry: &'a Arc<SessionRegistry>,
}

impl<'a> RouteContext<'a> {
    pub fn new(sender: &'a str, registry: &'a Arc<SessionRegistry>) -> Self {
        Self { sender, registry }
    }

    /// Logical name of the session that sent the message.
    pub fn sender(&self) -> &str {
        self.sender
    }

    /// Forward text to another session. Returns `false` if it is unknown or
    /// not connected.
    pub fn send_to(&self, name: &str, text: &str) -> bool {
        match self.registry.send_to(name, text) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(
                    from = %self.sender,
                    to = %name,
                    error = %e,
                    "Route delivery failed"
                );
                false
            }
        }
    }

    /// Forward a binary frame to another session, unmodified.
    pub fn send_binary_to(&self, name: &str, data: &[u8]) -> bool {
        match self.registry.send_binary_to(name, data.to_vec()) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(
                    from = %self.sender,
                    to = %name,
                    error = %e,
                    "Binary delivery failed"
                );
                false
            }
        }
    }

    /// Answer the sender.
    pub fn reply(&self, text: &str) -> bool {
        self.send_to(self.sender, text)
    }
}

/// Per-name application callback.
pub trait RouteHandler: Send + Sync {
    fn on_text(&self, ctx: &RouteContext<'_>, text: &str);

    fn on_binary(&self, ctx: &RouteContext<'_>, data: &[u8]) {
        tracing::debug!(from = %ctx.sender(), bytes = data.len(), "Binary frame ignored");
    }
}

/// Forwards selected commands from one device to another, answering the
/// sender with an advisory text when the target is offline. Binary frames
/// are forwarded as-is; the command list only filters text.
#[derive(Debug, Clone)]
pub struct ForwardRoute {
    to: String,
    commands: Vec<String>,
    unavailable_reply: Option<String>,
}

impl ForwardRoute {
    pub fn new(to: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            commands: Vec::new(),
            unavailable_reply: None,
        }
    }

    /// Only forward these exact payloads.
    pub fn commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.commands = commands.into_iter().map(Into::into).collect();
        self
    }

    pub fn unavailable_reply(mut self, reply: impl Into<String>) -> Self {
        self.unavailable_reply = Some(reply.into());
        self
    }

    fn accepts(&self, text: &str) -> bool {
        self.commands.is_empty() || self.commands.iter().any(|c| c == text)
    }
}

impl From<&RouteConfig> for ForwardRoute {
    fn from(cfg: &RouteConfig) -> Self {
        Self {
            to: cfg.to.clone(),
            commands: cfg.commands.clone(),
            unavailable_reply: cfg.unavailable_reply.clone(),
        }
    }
}

impl RouteHandler for ForwardRoute {
    fn on_text(&self, ctx: &RouteContext<'_>, text: &str) {
        if !self.accepts(text) {
            return;
        }
        if ctx.send_to(&self.to, text) {
            tracing::info!(from = %ctx.sender(), to = %self.to, %text, "Forwarded");
        } else {
            tracing::warn!(
                from = %ctx.sender(),
                to = %self.to,
                %text,
                "Forward target not connected"
            );
            if let Some(reply) = &self.unavailable_reply {
                ctx.reply(reply);
            }
        }
    }

    fn on_binary(&self, ctx: &RouteContext<'_>, data: &[u8]) {
        if ctx.send_binary_to(&self.to, data) {
            tracing::debug!(
                from = %ctx.sender(),
                to = %self.to,
                bytes = data.len(),
                "Forwarded binary"
            );
        } else {
            tracing::warn!(from = %ctx.sender(), to = %self.to, "Binary target not connected");
        }
    }
}

/// Immutable name → handlers table, built once at startup.
#[derive(Default)]
pub struct RouteTable {
    routes: HashMap<String, Vec<Box<dyn RouteHandler>>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(routes: &[RouteConfig]) -> Self {
        let mut table = Self::new();
        for cfg in routes {
            table.add(&cfg.from, ForwardRoute::from(cfg));
        }
        table
    }

    pub fn add(&mut self, name: &str, handler: impl RouteHandler + 'static) -> &mut Self {
        self.routes
            .entry(name.to_string())
            .or_default()
            .push(Box::new(handler));
        self
    }

    pub fn handlers(&self, name: &str) -> &[Box<dyn RouteHandler>] {
        self.routes.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_route(&self, name: &str) -> bool {
        self.routes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.routes.keys().collect();
        names.sort();
        f.debug_struct("RouteTable").field("names", &names).finish()
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

    fn texts(rx: &mut UnboundedReceiver<Message>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(Message::Text(t)) = rx.try_recv() {
            out.push(t.as_str().to_owned());
        }
        out
    }

    #[test]
    fn test_forward_selected_command() {
        let registry = Arc::new(SessionRegistry::new());
        let mut phone = connect(&registry, "phoneFire");
        let mut esp = connect(&registry, "espFire");

        let route = ForwardRoute::new("espFire").commands(["souffle"]);
        let ctx = RouteContext::new("phoneFire", &registry);

        route.on_text(&ctx, "souffle");
        route.on_text(&ctx, "something_else");

        assert_eq!(texts(&mut esp), vec!["souffle"]);
        assert!(texts(&mut phone).is_empty());
    }

    #[test]
    fn test_unavailable_reply_goes_back_to_sender() {
        let registry = Arc::new(SessionRegistry::new());
        let mut phone = connect(&registry, "phoneFire");

        let route = ForwardRoute::new("espFire")
            .commands(["souffle"])
            .unavailable_reply("Esp Fireplace not connected");
        route.on_text(&RouteContext::new("phoneFire", &registry), "souffle");

        assert_eq!(texts(&mut phone), vec!["Esp Fireplace not connected"]);
    }

    #[test]
    fn test_empty_command_list_forwards_everything() {
        let registry = Arc::new(SessionRegistry::new());
        let _ipad = connect(&registry, "ipadAlma");
        let mut leds = connect(&registry, "espLeds");

        let route = ForwardRoute::new("espLeds");
        let ctx = RouteContext::new("ipadAlma", &registry);
        route.on_text(&ctx, "autel_1");
        route.on_text(&ctx, "rainbow");

        assert_eq!(texts(&mut leds), vec!["autel_1", "rainbow"]);
    }

    #[test]
    fn test_binary_forwarded_unmodified() {
        let registry = Arc::new(SessionRegistry::new());
        let mut phone = connect(&registry, "phoneFire");
        let mut esp = connect(&registry, "espFire");

        let route = ForwardRoute::new("espFire").commands(["souffle"]);
        let frame = [0x01, 0xFF, 0x00, 0x7E];
        route.on_binary(&RouteContext::new("phoneFire", &registry), &frame);

        match esp.try_recv() {
            Ok(Message::Binary(data)) => assert_eq!(data.as_ref(), &frame[..]),
            other => panic!("expected a binary frame, got {other:?}"),
        }
        assert!(esp.try_recv().is_err());
        assert!(phone.try_recv().is_err());
    }

    #[test]
    fn test_binary_to_offline_target_is_dropped() {
        let registry = Arc::new(SessionRegistry::new());
        let mut esp = connect(&registry, "espFire");
        registry.mark_disconnected("espFire");

        let ctx = RouteContext::new("phoneFire", &registry);
        assert!(!ctx.send_binary_to("espFire", &[1, 2, 3]));
        assert!(esp.try_recv().is_err());
    }

    #[test]
    fn test_table_from_config_groups_by_sender() {
        let table = RouteTable::from_config(&[
            RouteConfig {
                from: "phoneFire".into(),
                to: "espFire".into(),
                commands: vec!["souffle".into()],
                unavailable_reply: None,
            },
            RouteConfig {
                from: "phoneFire".into(),
                to: "espBougie".into(),
                commands: vec!["allumer".into()],
                unavailable_reply: None,
            },
        ]);

        assert_eq!(table.handlers("phoneFire").len(), 2);
        assert!(table.handlers("espFire").is_empty());
        assert!(table.has_route("phoneFire"));
        assert_eq!(table.len(), 2);
    }
}

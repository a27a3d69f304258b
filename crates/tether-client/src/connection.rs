//! WebSocket connection management for a device client.
//!
//! Announces the logical name through the URL path, answers heartbeat
//! probes, prints inbound commands, and forwards operator input.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;

use tether_protocol::{is_reserved, PING, PONG};

/// Build `<server>/ws/<name>[?label=..]`.
pub fn endpoint_url(server: &str, name: &str, label: Option<&str>) -> anyhow::Result<Url> {
    let mut url = Url::parse(server)?;
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("server URL cannot be a base: {}", server))?
        .pop_if_empty()
        .push("ws")
        .push(name);
    if let Some(label) = label {
        url.query_pairs_mut().append_pair("label", label);
    }
    Ok(url)
}

/// Connect and run until the server closes the socket.
///
/// `commands` carries operator input; it survives reconnects.
pub async fn connect_and_run(
    url: &Url,
    commands: &mut mpsc::UnboundedReceiver<String>,
) -> anyhow::Result<()> {
    let (ws_stream, _) = connect_async(url.as_str()).await?;
    tracing::info!(%url, "WebSocket connected to relay");

    let (mut ws_write, mut ws_read) = ws_stream.split();

    loop {
        tokio::select! {
            msg = ws_read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if text.as_str() == PING {
                        ws_write.send(Message::Text(PONG.into())).await?;
                        tracing::trace!("Heartbeat answered");
                    } else {
                        tracing::debug!(%text, "Command received");
                        println!("{}", text);
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    tracing::info!(bytes = data.len(), "Binary frame received");
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(?frame, "Relay closed the connection");
                    return Ok(());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(()),
            },
            line = commands.recv() => match line {
                Some(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if is_reserved(line) {
                        tracing::warn!(%line, "Heartbeat tokens cannot be sent as commands");
                        continue;
                    }
                    ws_write.send(Message::Text(line.to_string())).await?;
                }
                None => {
                    // Input closed: leave politely.
                    ws_write.send(Message::Close(None)).await?;
                    return Ok(());
                }
            },
        }
    }
}

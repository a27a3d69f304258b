//! # Tether Client
//!
//! Minimal device client for the Tether relay. Connects under a logical
//! name, keeps the heartbeat alive, prints every command it receives, and
//! sends each stdin line as a command.
//!
//! ## Usage
//!
//! ```sh
//! tether-client --name espFire                              # Local relay
//! tether-client --name dashboard --server ws://relay:8080   # Remote relay
//! echo 'espLeds:turn_on' | tether-client --name dashboard --once
//! ```

mod connection;

use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tether-client", about = "Tether relay device client")]
struct Args {
    /// Relay base URL
    #[arg(long, default_value = "ws://127.0.0.1:8080")]
    server: String,
    /// Logical name to register under
    #[arg(long)]
    name: String,
    /// Display label for the status dashboard
    #[arg(long)]
    label: Option<String>,
    /// Seconds to wait before reconnecting
    #[arg(long, default_value_t = 3)]
    reconnect_secs: u64,
    /// Exit after the first connection ends instead of reconnecting
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    tether_protocol::validate_name(&args.name)?;
    let url = connection::endpoint_url(&args.server, &args.name, args.label.as_deref())?;

    // Operator input → commands channel
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    loop {
        tracing::info!("Connecting to relay: {}", url);

        match connection::connect_and_run(&url, &mut rx).await {
            Ok(()) => {
                tracing::info!("Connection closed gracefully");
            }
            Err(e) => {
                tracing::error!("Connection error: {}", e);
            }
        }

        if args.once {
            break;
        }

        tracing::info!("Reconnecting in {}s", args.reconnect_secs);
        tokio::time::sleep(Duration::from_secs(args.reconnect_secs)).await;
    }

    Ok(())
}

//! D-Bus WebSocket Bridge: entry point.
//!
//! This binary accepts WebSocket connections from JSON clients and attaches
//! each one to its own D-Bus connection.  Clients call methods and subscribe
//! to signals by sending JSON envelopes; replies and signals come back the
//! same way.
//!
//! # Usage
//!
//! ```text
//! dbus-ws-bridge [OPTIONS]
//!
//! Options:
//!   --ws-bind <ADDR>          WebSocket bind address [default: 127.0.0.1]
//!   --ws-port <PORT>          WebSocket listener port [default: 2024]
//!   --bus <BUS>               Default bus: session or system [default: session]
//!   --call-timeout <SECS>     Method call timeout in seconds [default: 25]
//!   --ping-interval <SECS>    WebSocket ping interval, 0 disables [default: 30]
//!   --signal-queue <N>        Buffered signals per subscription [default: 64]
//!   --max-value-depth <N>     Nesting limit for client values [default: 64]
//! ```
//!
//! # Environment variable overrides
//!
//! CLI args take precedence when both are present.
//!
//! | Variable                  | Default     | Description                      |
//! |---------------------------|-------------|----------------------------------|
//! | `DBUS_WS_BIND`            | `127.0.0.1` | WebSocket bind address           |
//! | `DBUS_WS_PORT`            | `2024`      | WebSocket listener port          |
//! | `DBUS_WS_BUS`             | `session`   | Bus used without `?connection=`  |
//! | `DBUS_WS_CALL_TIMEOUT`    | `25`        | Method call timeout (secs)       |
//! | `DBUS_WS_PING_INTERVAL`   | `30`        | WebSocket ping interval (secs)   |
//! | `DBUS_WS_SIGNAL_QUEUE`    | `64`        | Buffered signals per stream      |
//! | `DBUS_WS_MAX_VALUE_DEPTH` | `64`        | Nesting limit for client values  |

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dbus_ws_bridge::domain::{BridgeConfig, BusTarget};
use dbus_ws_bridge::infrastructure::run_server;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// D-Bus WebSocket bridge.
///
/// Exposes D-Bus method calls and signals to JSON clients over a WebSocket.
#[derive(Debug, Parser)]
#[command(
    name = "dbus-ws-bridge",
    about = "Exposes D-Bus method calls and signals to WebSocket clients as JSON",
    version
)]
struct Cli {
    /// IP address to bind the WebSocket server to.
    ///
    /// Anyone who can reach this address can call methods on the bus, so the
    /// default only accepts local connections.
    #[arg(long, default_value = "127.0.0.1", env = "DBUS_WS_BIND")]
    ws_bind: String,

    /// TCP port for the WebSocket server to listen on.
    #[arg(long, default_value_t = 2024, env = "DBUS_WS_PORT")]
    ws_port: u16,

    /// Bus used when a client does not pass `?connection=session|system`.
    #[arg(long, default_value = "session", env = "DBUS_WS_BUS")]
    bus: BusTarget,

    /// Method call timeout in seconds.
    #[arg(long, default_value_t = 25, env = "DBUS_WS_CALL_TIMEOUT")]
    call_timeout: u64,

    /// WebSocket ping interval in seconds; 0 disables pings.
    #[arg(long, default_value_t = 30, env = "DBUS_WS_PING_INTERVAL")]
    ping_interval: u64,

    /// Signals buffered per subscription before the bus connection applies
    /// back-pressure.
    #[arg(long, default_value_t = 64, env = "DBUS_WS_SIGNAL_QUEUE")]
    signal_queue: usize,

    /// Deepest container nesting accepted in client values.
    #[arg(long, default_value_t = 64, env = "DBUS_WS_MAX_VALUE_DEPTH")]
    max_value_depth: usize,
}

impl Cli {
    /// Converts the parsed CLI arguments into a [`BridgeConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if `--ws-bind` is not a valid IP address, or if a
    /// limit that must be positive is zero.
    fn into_bridge_config(self) -> anyhow::Result<BridgeConfig> {
        let ws_bind_addr: SocketAddr = format!("{}:{}", self.ws_bind, self.ws_port)
            .parse()
            .with_context(|| {
                format!(
                    "invalid WebSocket bind address: '{}:{}'",
                    self.ws_bind, self.ws_port
                )
            })?;

        anyhow::ensure!(self.call_timeout > 0, "--call-timeout must be at least 1 second");
        anyhow::ensure!(self.signal_queue > 0, "--signal-queue must be at least 1");
        anyhow::ensure!(self.max_value_depth > 0, "--max-value-depth must be at least 1");

        Ok(BridgeConfig {
            ws_bind_addr,
            default_bus: self.bus,
            call_timeout: Duration::from_secs(self.call_timeout),
            ping_interval: Duration::from_secs(self.ping_interval),
            signal_queue_capacity: self.signal_queue,
            max_value_depth: self.max_value_depth,
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// 1. `tracing_subscriber` is initialised; `RUST_LOG` controls the level.
/// 2. CLI arguments are parsed into a [`BridgeConfig`].
/// 3. A Ctrl+C handler clears a shared `AtomicBool`.
/// 4. [`run_server`] accepts clients until the flag is cleared.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_bridge_config()?;

    info!(
        "D-Bus WebSocket bridge starting: ws={}, default bus={}, call timeout={:?}",
        config.ws_bind_addr, config.default_bus, config.call_timeout
    );

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    // The accept loop polls `running` every 200 ms.
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    run_server(config, running).await?;

    info!("D-Bus WebSocket bridge stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

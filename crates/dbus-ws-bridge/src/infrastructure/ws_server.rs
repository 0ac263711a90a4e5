//! WebSocket server: accept loop and per-connection task management.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting incoming TCP connections from clients.
//! 3. Upgrading each connection to a WebSocket, rejecting other paths with
//!    404 and a bad `connection` parameter with 400.
//! 4. Opening a D-Bus connection for the bus the client asked for.
//! 5. Running one `select!` loop per client over its WebSocket frames, its
//!    transport events, and the ping timer.
//! 6. Gracefully shutting down when the `running` flag is cleared.
//!
//! # Scalability
//!
//! Each client runs in its own Tokio task with its own D-Bus connection, so
//! one slow peer never blocks another.  Within a connection, method calls run
//! on spawned tasks; only frame decoding and bookkeeping happen on the
//! connection task.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use dbus_ws_core::{encode_output, Decoder, ErrorType, OutputMessage};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{interval_at, timeout, Instant, Interval};
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        http::StatusCode,
        Error as WsError, Message as WsMessage,
    },
    WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::domain::config::{BridgeConfig, BusTarget, WS_PATH};
use crate::infrastructure::connection::ConnectionDriver;
use crate::infrastructure::dbus_transport::ZbusTransport;

type WsSink = SplitSink<WebSocketStream<TcpStream>, WsMessage>;

// ── Public API ────────────────────────────────────────────────────────────────

/// Runs the WebSocket accept loop until `running` is set to `false`.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot be bound (e.g., the port is
/// already in use or the process lacks permission to bind).
pub async fn run_server(config: BridgeConfig, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.ws_bind_addr)
        .await
        .with_context(|| {
            format!(
                "failed to bind WebSocket listener on {}",
                config.ws_bind_addr
            )
        })?;

    info!("WebSocket bridge listening on ws://{}{WS_PATH}", config.ws_bind_addr);

    let config = Arc::new(config);

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // Short accept timeout so the shutdown flag is polled even when idle.
        match timeout(Duration::from_millis(200), listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                debug!("new TCP connection from {peer_addr}");
                let cfg = Arc::clone(&config);
                tokio::spawn(async move {
                    handle_client(stream, peer_addr, cfg).await;
                });
            }
            Ok(Err(e)) => {
                // Transient (e.g. too many open file descriptors); keep serving.
                error!("accept error: {e}");
            }
            Err(_) => {}
        }
    }

    Ok(())
}

// ── Per-connection handler ────────────────────────────────────────────────────

async fn handle_client(raw_stream: TcpStream, peer_addr: SocketAddr, config: Arc<BridgeConfig>) {
    match run_connection(raw_stream, peer_addr, config).await {
        Ok(()) => info!("connection {peer_addr} closed normally"),
        Err(e) => warn!("connection {peer_addr} closed with error: {e:#}"),
    }
}

/// Checks the upgrade request path and picks the bus from its query.
fn select_bus(request: &Request, default_bus: BusTarget) -> Result<BusTarget, ErrorResponse> {
    let uri = request.uri();
    if uri.path() != WS_PATH {
        return Err(reject(
            StatusCode::NOT_FOUND,
            format!("no WebSocket endpoint at {}", uri.path()),
        ));
    }
    BusTarget::from_query(uri.query(), default_bus).map_err(|msg| reject(StatusCode::BAD_REQUEST, msg))
}

fn reject(status: StatusCode, message: String) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(message));
    *response.status_mut() = status;
    response
}

async fn run_connection(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    config: Arc<BridgeConfig>,
) -> anyhow::Result<()> {
    // ── Step 1: WebSocket handshake, choosing the bus from the query ──────────
    let mut selected = config.default_bus;
    let default_bus = config.default_bus;
    let ws_stream = accept_hdr_async(raw_stream, |request: &Request, response: Response| {
        selected = select_bus(request, default_bus)?;
        Ok(response)
    })
    .await
    .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    // ── Step 2: Open the D-Bus connection ─────────────────────────────────────
    let transport = match ZbusTransport::connect(
        selected,
        config.call_timeout,
        config.signal_queue_capacity,
    )
    .await
    {
        Ok(transport) => transport,
        Err(e) => {
            let message = OutputMessage::error(None, ErrorType::DBusError, format!("{e:#}"));
            // Best effort: the client may already be gone.
            let _ = send_message(&mut ws_tx, &message).await;
            let _ = ws_tx.send(WsMessage::Close(None)).await;
            return Err(e);
        }
    };

    let mut driver = ConnectionDriver::new(Arc::new(transport), Decoder::new(config.max_value_depth));
    let connection = driver.id();
    info!(%connection, bus = %selected, "WebSocket connection established: {peer_addr}");

    // ── Step 3: Frame / event loop ────────────────────────────────────────────
    let mut ping = (!config.ping_interval.is_zero())
        .then(|| interval_at(Instant::now() + config.ping_interval, config.ping_interval));

    let result = loop {
        let outbound = tokio::select! {
            frame = ws_rx.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => driver.handle_frame(&text),
                Some(Ok(WsMessage::Binary(_))) => driver.handle_binary_frame(),
                Some(Ok(WsMessage::Close(_))) | None => {
                    debug!(%connection, "client closed the WebSocket");
                    break Ok(());
                }
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => continue,
                Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) => {
                    debug!(%connection, "client WebSocket closed abruptly");
                    break Ok(());
                }
                Some(Err(e)) => break Err(anyhow::Error::new(e).context("WebSocket read failed")),
            },
            Some(event) = driver.next_event() => driver.handle_transport_event(event),
            _ = tick(&mut ping) => {
                if let Err(e) = ws_tx.send(WsMessage::Ping(Vec::new())).await {
                    break Err(anyhow::Error::new(e).context("WebSocket ping failed"));
                }
                continue;
            }
        };

        if let Err(e) = send_all(&mut ws_tx, outbound).await {
            break Err(e);
        }
    };

    // ── Step 4: Release everything this connection held ───────────────────────
    driver.close().await;
    result
}

async fn tick(ping: &mut Option<Interval>) {
    match ping {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn send_all(ws_tx: &mut WsSink, messages: Vec<OutputMessage>) -> anyhow::Result<()> {
    for message in &messages {
        send_message(ws_tx, message).await?;
    }
    Ok(())
}

async fn send_message(ws_tx: &mut WsSink, message: &OutputMessage) -> anyhow::Result<()> {
    let json = encode_output(message).context("failed to encode outbound message")?;
    ws_tx
        .send(WsMessage::Text(json))
        .await
        .context("WebSocket send failed")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

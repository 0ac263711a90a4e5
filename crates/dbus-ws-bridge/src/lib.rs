//! dbus-ws-bridge library crate.
//!
//! This crate provides a WebSocket-to-D-Bus bridge: JSON clients connect over
//! a WebSocket, call D-Bus methods, and subscribe to D-Bus signals.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Client (JSON over WebSocket)
//!         ↕
//! [dbus-ws-bridge]
//!   ├── domain/             Pure types: BridgeConfig, pending requests, subscriptions
//!   ├── application/        Per-connection state machine (sans I/O)
//!   │     ├── session/        frame → protocol → commands / replies
//!   │     ├── correlator/     requestId ⇄ in-flight D-Bus call
//!   │     ├── signal_router/  signal key → subscribers, filters, refcounts
//!   │     └── transport/      the D-Bus seam (trait + commands + events)
//!   └── infrastructure/
//!         ├── ws_server/      WebSocket accept loop (tokio-tungstenite)
//!         ├── connection/     executes session commands on tokio tasks
//!         ├── dbus_transport/ zbus implementation of the transport seam
//!         └── dbus_values/    DBusValue ⇄ zvariant conversion
//! ```
//!
//! # Layer rules
//!
//! - `domain` depends only on `dbus-ws-core` (no I/O, no async, no frameworks).
//! - `application` depends on `domain` and `dbus-ws-core`; the only async item
//!   is the [`application::transport::Transport`] trait it defines.
//! - `infrastructure` depends on all other layers plus `tokio`, `tungstenite`
//!   and `zbus`.
//!
//! Keeping the session logic free of sockets means every protocol rule
//! (duplicate ids, filter matching, unsubscribe bookkeeping) is tested with
//! plain function calls and a fake transport instead of a live bus.

/// Domain layer: pure business-logic types (no I/O).
pub mod domain;

/// Application layer: per-connection protocol state machine.
pub mod application;

/// Infrastructure layer: WebSocket server and D-Bus connection.
pub mod infrastructure;

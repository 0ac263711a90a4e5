//! Infrastructure layer for dbus-ws-bridge.
//!
//! The infrastructure layer handles all I/O: accepting WebSocket connections
//! from clients and talking to the message bus.
//!
//! # Responsibilities
//!
//! - Binding a TCP listener and performing the WebSocket upgrade
//! - Opening one D-Bus connection per client
//! - Converting values between the core model and zvariant
//! - Running session commands on Tokio tasks and feeding results back
//! - Handling the graceful shutdown signal
//!
//! # What does NOT belong here?
//!
//! - Request correlation and subscription bookkeeping (application layer)
//! - JSON encoding rules (`dbus-ws-core`)
//! - Configuration parsing (that is done in `main.rs`)

pub mod connection;
pub mod dbus_transport;
pub mod dbus_values;
pub mod ws_server;

pub use connection::ConnectionDriver;
pub use dbus_transport::ZbusTransport;
pub use ws_server::run_server;

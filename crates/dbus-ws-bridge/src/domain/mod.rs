//! Domain layer for dbus-ws-bridge.
//!
//! The domain layer contains pure business-logic types that have no
//! dependencies on I/O, networking, or external frameworks.
//!
//! # What belongs in the domain layer?
//!
//! - Configuration structures
//! - The bookkeeping records for in-flight requests and signal subscriptions
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, `zbus`, or `WebSocket` types
//! - File I/O or environment variable reading

pub mod config;
pub mod request;
pub mod subscription;

pub use config::{BridgeConfig, BusTarget};
pub use request::{Correlation, PendingRequest, RequestKind, RequestState};
pub use subscription::Subscription;

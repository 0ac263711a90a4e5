//! Application layer for dbus-ws-bridge.
//!
//! The application layer decides *what* happens for each client frame and
//! each bus event, but delegates *how* to the infrastructure layer.
//!
//! # Responsibilities
//!
//! - Correlating client request ids with bus replies
//! - Reference counting signal subscriptions per signal key
//! - Turning frames and transport events into replies and transport commands
//! - Defining the [`Transport`] seam the infrastructure layer implements
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or bus connections (that is infrastructure)
//! - Tokio task spawning (that happens in the infrastructure layer)
//! - JSON value encoding (that lives in `dbus-ws-core`)

pub mod correlator;
pub mod session;
pub mod signal_router;
pub mod transport;

pub use correlator::{CorrelationError, Correlator};
pub use session::{Session, Step};
pub use signal_router::{RouterError, SignalRouter, SubscribeOutcome};
pub use transport::{
    CallError, Generation, RemoteError, SignalStream, Transport, TransportCommand, TransportError,
    TransportEvent,
};

//! The D-Bus seam.
//!
//! The session never touches the bus.  It emits [`TransportCommand`]s and
//! consumes [`TransportEvent`]s; the infrastructure layer turns commands into
//! [`Transport`] calls on spawned tasks and feeds the results back as events.

use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use dbus_ws_core::{DBusValue, MethodCall, SignalKey};
use futures_util::Stream;
use thiserror::Error;

use crate::domain::Correlation;

/// Signal argument lists for one signal key, in arrival order.
pub type SignalStream = Pin<Box<dyn Stream<Item = Vec<DBusValue>> + Send>>;

/// A D-Bus error reply from the remote peer.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{name}")]
pub struct RemoteError {
    pub name: String,
    pub args: Vec<DBusValue>,
}

impl RemoteError {
    /// Error name reported when a call exceeds the configured timeout.
    pub const TIMEOUT: &'static str = "org.freedesktop.DBus.Error.Timeout";

    pub fn timeout(after: Duration) -> Self {
        Self {
            name: Self::TIMEOUT.to_owned(),
            args: vec![DBusValue::string(format!(
                "method call timed out after {} ms",
                after.as_millis()
            ))],
        }
    }
}

/// Why a method call produced no return value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    /// The peer answered with an error (or the call timed out).
    #[error("remote error {0}")]
    Remote(RemoteError),

    /// The call never completed on the bus: marshalling or connection failure.
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Signal delivery could not be set up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("signal registration failed: {0}")]
pub struct TransportError(pub String);

/// One registration attempt for a signal key.
///
/// A key that is released and subscribed again gets a fresh generation, so
/// results still queued from an earlier attempt can be told apart from the
/// current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(pub u64);

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Asynchronous access to one bus connection.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Invokes a method and waits for its reply.
    async fn call(&self, call: MethodCall) -> Result<Vec<DBusValue>, CallError>;

    /// Starts delivery of signals matching `key`.
    async fn subscribe(&self, key: &SignalKey) -> Result<SignalStream, TransportError>;

    /// Stops delivery for `key`.  Dropping the stream already stops local
    /// delivery; this releases anything held on the bus side.
    async fn unsubscribe(&self, key: &SignalKey);
}

/// Work the session asks the infrastructure layer to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCommand {
    Call {
        correlation: Correlation,
        call: MethodCall,
    },
    Subscribe {
        key: SignalKey,
        generation: Generation,
    },
    Unsubscribe {
        key: SignalKey,
        generation: Generation,
    },
}

/// Results reported back to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    CallReturned {
        correlation: Correlation,
        result: Result<Vec<DBusValue>, CallError>,
    },
    Subscribed {
        key: SignalKey,
        generation: Generation,
        result: Result<(), TransportError>,
    },
    Signal {
        key: SignalKey,
        generation: Generation,
        args: Vec<DBusValue>,
    },
    /// The signal stream for `key` ended on its own (bus disconnect).
    SignalStreamEnded {
        key: SignalKey,
        generation: Generation,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_error_uses_standard_name() {
        let err = RemoteError::timeout(Duration::from_millis(1500));
        assert_eq!(err.name, "org.freedesktop.DBus.Error.Timeout");
        assert_eq!(err.args, vec![DBusValue::string("method call timed out after 1500 ms")]);
    }

    #[test]
    fn test_generation_display() {
        assert_eq!(Generation(7).to_string(), "#7");
    }

    #[test]
    fn test_call_error_display() {
        let err = CallError::Transport("socket closed".into());
        assert_eq!(err.to_string(), "transport failure: socket closed");
    }
}

//! Bookkeeping records for client requests that are still in flight.

use std::fmt;
use std::time::{Duration, Instant};

use dbus_ws_core::RequestId;

/// How an in-flight request is tracked.
///
/// Requests with a client `requestId` are tracked under that id.  A
/// `CallMethod` without one gets an internal token so its reply can still be
/// matched; the reply then carries no `requestId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Correlation {
    Client(RequestId),
    Internal(u64),
}

impl Correlation {
    /// The client-visible id, if any.
    pub fn request_id(self) -> Option<RequestId> {
        match self {
            Correlation::Client(id) => Some(id),
            Correlation::Internal(_) => None,
        }
    }
}

/// The client message that created a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    MethodCall,
    Subscribe,
    Unsubscribe,
}

impl fmt::Display for RequestKind {
    /// Uses the client envelope name, so diagnostics read like the frame
    /// that created the request.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RequestKind::MethodCall => "CallMethod",
            RequestKind::Subscribe => "SubscribeSignal",
            RequestKind::Unsubscribe => "UnsubscribeSignal",
        })
    }
}

/// Lifecycle of a request id on one connection.
///
/// ```text
/// Idle ──register──▶ AwaitingTransport ──reply/error/success──▶ Idle
/// ```
///
/// Completion releases the record, so a completed id reads back as `Idle`
/// and may be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    AwaitingTransport,
}

/// A request that has been dispatched and not yet answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub correlation: Correlation,
    pub kind: RequestKind,
    pub created_at: Instant,
}

impl PendingRequest {
    pub fn new(correlation: Correlation, kind: RequestKind) -> Self {
        Self {
            correlation,
            kind,
            created_at: Instant::now(),
        }
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_correlation_exposes_request_id() {
        assert_eq!(Correlation::Client(7).request_id(), Some(7));
    }

    #[test]
    fn test_internal_correlation_has_no_request_id() {
        assert_eq!(Correlation::Internal(7).request_id(), None);
    }

    #[test]
    fn test_client_and_internal_tokens_never_collide() {
        assert_ne!(Correlation::Client(1), Correlation::Internal(1));
    }

    #[test]
    fn test_request_kind_displays_envelope_name() {
        assert_eq!(RequestKind::Subscribe.to_string(), "SubscribeSignal");
    }

    #[test]
    fn test_new_pending_request_is_fresh() {
        let pending = PendingRequest::new(Correlation::Client(1), RequestKind::MethodCall);
        assert!(pending.age() < Duration::from_secs(5));
        assert_eq!(pending.kind, RequestKind::MethodCall);
    }
}

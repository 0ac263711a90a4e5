//! Request correlator.
//!
//! Tracks every request that has been dispatched but not answered, keyed by
//! its [`Correlation`].  A client `requestId` may only have one live request
//! at a time across all request kinds; a second one is refused rather than
//! overwriting the first.

use std::collections::HashMap;

use dbus_ws_core::{DBusValue, ErrorType, MethodCall, OutputMessage, RequestId};
use thiserror::Error;
use tracing::trace;

use super::transport::{CallError, TransportCommand};
use crate::domain::{Correlation, PendingRequest, RequestKind, RequestState};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorrelationError {
    #[error("request id {id} is already in flight as a {live} request")]
    DuplicateRequestId { id: RequestId, live: RequestKind },
}

#[derive(Debug, Default)]
pub struct Correlator {
    pending: HashMap<Correlation, PendingRequest>,
    next_internal: u64,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new in-flight request.
    ///
    /// # Errors
    ///
    /// [`CorrelationError::DuplicateRequestId`] if `request_id` is live.
    pub fn register(
        &mut self,
        request_id: Option<RequestId>,
        kind: RequestKind,
    ) -> Result<Correlation, CorrelationError> {
        let correlation = match request_id {
            Some(id) => {
                let correlation = Correlation::Client(id);
                if let Some(live) = self.pending.get(&correlation) {
                    return Err(CorrelationError::DuplicateRequestId {
                        id,
                        live: live.kind,
                    });
                }
                correlation
            }
            None => {
                self.next_internal += 1;
                Correlation::Internal(self.next_internal)
            }
        };
        self.pending
            .insert(correlation, PendingRequest::new(correlation, kind));
        Ok(correlation)
    }

    /// Registers a method call and returns the command that dispatches it.
    ///
    /// # Errors
    ///
    /// [`CorrelationError::DuplicateRequestId`] if `request_id` is live.
    pub fn submit_call(
        &mut self,
        request_id: Option<RequestId>,
        call: MethodCall,
    ) -> Result<TransportCommand, CorrelationError> {
        let correlation = self.register(request_id, RequestKind::MethodCall)?;
        Ok(TransportCommand::Call { correlation, call })
    }

    /// Resolves a method call.  Returns `None` when the request is no longer
    /// pending; a late reply is dropped, never re-delivered.
    pub fn on_transport_return(
        &mut self,
        correlation: Correlation,
        result: Result<Vec<DBusValue>, CallError>,
    ) -> Option<OutputMessage> {
        let Some(pending) = self.complete(correlation) else {
            trace!(?correlation, "dropping reply for a request that is no longer pending");
            return None;
        };
        let request_id = pending.correlation.request_id();
        trace!(
            ?correlation,
            kind = %pending.kind,
            elapsed_ms = pending.age().as_millis() as u64,
            "call completed"
        );

        Some(match result {
            Ok(args) => OutputMessage::MethodReturn { request_id, args },
            Err(CallError::Remote(remote)) => OutputMessage::MethodError {
                request_id,
                error_name: remote.name,
                args: remote.args,
            },
            Err(CallError::Transport(reason)) => {
                OutputMessage::error(request_id, ErrorType::DBusError, reason)
            }
        })
    }

    /// Releases a request and returns its record, if it was pending.
    pub fn complete(&mut self, correlation: Correlation) -> Option<PendingRequest> {
        self.pending.remove(&correlation)
    }

    pub fn state(&self, request_id: RequestId) -> RequestState {
        if self.pending.contains_key(&Correlation::Client(request_id)) {
            RequestState::AwaitingTransport
        } else {
            RequestState::Idle
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drops every pending request without replying.  Returns how many were
    /// dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

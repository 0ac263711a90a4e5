//! Error taxonomy reported to clients in `Error` messages.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::messages::{OutputMessage, RequestId};
use crate::names::NameError;
use crate::value::ValueError;

/// The `errorType` field of an `Error` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorType {
    /// The D-Bus transport failed (connection lost, signal delivery ended).
    DBusError,
    /// The bridge refused the request (duplicate id, unknown subscription).
    ServerError,
    /// The frame is not a known message shape.
    UnsupportedFormat,
    /// The frame is not valid JSON or a field has the wrong JSON type.
    JsonError,
    /// A bus name, path, interface, member or signature is malformed.
    DBusFormatError,
    /// A typed value is malformed.
    DBusValueError,
}

/// Everything that can go wrong while handling one client message.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    #[error("malformed JSON: {0}")]
    Json(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Format(#[from] NameError),

    #[error(transparent)]
    Value(ValueError),

    #[error("{0}")]
    Server(String),

    #[error("D-Bus failure: {0}")]
    DBus(String),
}

impl ProtocolError {
    pub fn error_type(&self) -> ErrorType {
        match self {
            ProtocolError::Json(_) => ErrorType::JsonError,
            ProtocolError::UnsupportedFormat(_) => ErrorType::UnsupportedFormat,
            ProtocolError::Format(_) => ErrorType::DBusFormatError,
            ProtocolError::Value(_) => ErrorType::DBusValueError,
            ProtocolError::Server(_) => ErrorType::ServerError,
            ProtocolError::DBus(_) => ErrorType::DBusError,
        }
    }
}

impl From<ValueError> for ProtocolError {
    /// Value errors that are really shape or name errors keep their own type.
    fn from(err: ValueError) -> Self {
        match err {
            ValueError::UnsupportedFormat(reason) => ProtocolError::UnsupportedFormat(reason),
            ValueError::Name(name) => ProtocolError::Format(name),
            other => ProtocolError::Value(other),
        }
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::Json(err.to_string())
    }
}

/// A [`ProtocolError`] attributed to a request, if the id could be recovered.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{error}")]
pub struct RequestError {
    pub request_id: Option<RequestId>,
    #[source]
    pub error: ProtocolError,
}

impl RequestError {
    pub fn new(request_id: Option<RequestId>, error: impl Into<ProtocolError>) -> Self {
        Self {
            request_id,
            error: error.into(),
        }
    }

    pub fn error_type(&self) -> ErrorType {
        self.error.error_type()
    }
}

impl From<RequestError> for OutputMessage {
    fn from(err: RequestError) -> Self {
        OutputMessage::Error {
            request_id: err.request_id,
            error_type: err.error.error_type(),
            message: err.error.to_string(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! # dbus-ws-core
//!
//! Shared library for the D-Bus WebSocket bridge containing the typed D-Bus
//! value model, the D-Bus name validators, and the JSON message protocol
//! spoken by WebSocket clients.
//!
//! This crate has no I/O: no sockets, no D-Bus connection, no async runtime.
//! Everything here is a pure transformation that can be tested in isolation.
//!
//! # Architecture overview
//!
//! A WebSocket client talks to the bridge in JSON.  D-Bus, on the other hand,
//! is strongly typed: every value on the bus has a signature such as `u`,
//! `as` or `a{sv}`.  This crate is the translation layer between the two.
//!
//! - **`names`** – Validated newtypes for bus names, object paths, interface
//!   names, member names and signatures.  A value of one of these types has
//!   always passed its grammar check.
//!
//! - **`value`** – [`DBusValue`], a recursive tagged union covering every
//!   D-Bus type, the [`ValueType`] descriptor used for empty containers, a
//!   D-Bus signature parser, and the JSON codec for both.
//!
//! - **`protocol`** – The inbound and outbound message envelopes
//!   ([`InputMessage`], [`OutputMessage`]), the error envelope, and
//!   [`decode_input`], which turns one WebSocket text frame into a fully
//!   validated message or an error that can be reported back to the client.

pub mod names;
pub mod protocol;
pub mod value;

pub use names::{BusName, InterfaceName, MemberName, NameError, NameKind, ObjectPath, Signature};
pub use protocol::codec::{decode_input, decode_input_with, encode_output};
pub use protocol::error::{ErrorType, ProtocolError, RequestError};
pub use protocol::messages::{
    ArgFilter, InputMessage, MethodCall, OutputMessage, RequestId, SignalKey, SubscriptionKey,
};
pub use value::codec::{decode_value, decode_value_type, encode_value, encode_value_type, Decoder};
pub use value::{DBusValue, PrimitiveType, ValueError, ValueType};

//! JSON message protocol spoken over the WebSocket.
//!
//! Each WebSocket text frame carries exactly one message: a JSON object with a
//! single key naming the message kind.
//!
//! ```text
//! client → bridge   {"CallMethod":{...}}  {"SubscribeSignal":{...}}  {"UnsubscribeSignal":{...}}
//! bridge → client   {"MethodReturn":{...}} {"MethodError":{...}} {"Signal":{...}}
//!                   {"Success":{...}}      {"Error":{...}}
//! ```
//!
//! - [`messages`] – the typed messages.
//! - [`codec`] – frame ⇄ message conversion with full name and value validation.
//! - [`error`] – the error taxonomy reported back to clients.

pub mod codec;
pub mod error;
pub mod messages;

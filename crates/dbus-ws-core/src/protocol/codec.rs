//! Frame codec for the WebSocket JSON protocol.
//!
//! Decoding runs in stages so that every failure can be reported with the
//! right [`ErrorType`](super::error::ErrorType) and, whenever possible, the
//! client's `requestId`:
//!
//! ```text
//! text ─▶ JSON ─▶ envelope {"Kind":{body}} ─▶ requestId ─▶ fields ─▶ names ─▶ args
//!         │        │                                       │         │        │
//!     JsonError  UnsupportedFormat                    JsonError  DBusFormatError
//!                                                                      DBusValueError
//! ```

use serde::Deserialize;
use serde_json::Value as Json;

use super::error::{ProtocolError, RequestError};
use super::messages::{
    ArgFilter, InputMessage, MethodCall, OutputMessage, RequestId, SignalKey, SubscriptionKey,
};
use crate::names::{BusName, InterfaceName, MemberName, ObjectPath};
use crate::value::codec::Decoder;

const CALL_METHOD: &str = "CallMethod";
const SUBSCRIBE_SIGNAL: &str = "SubscribeSignal";
const UNSUBSCRIBE_SIGNAL: &str = "UnsubscribeSignal";

// ── Public API ────────────────────────────────────────────────────────────────

/// Decodes one WebSocket text frame with the default value depth limit.
///
/// # Errors
///
/// See [`decode_input_with`].
///
/// # Examples
///
/// ```rust
/// use dbus_ws_core::{decode_input, InputMessage};
///
/// let frame = r#"{"CallMethod":{"requestId":1,"destination":"org.freedesktop.DBus",
///     "path":"/org/freedesktop/DBus","interface":"org.freedesktop.DBus",
///     "methodName":"ListNames","args":[]}}"#;
/// let msg = decode_input(frame).unwrap();
/// assert!(matches!(msg, InputMessage::CallMethod { request_id: Some(1), .. }));
/// ```
pub fn decode_input(text: &str) -> Result<InputMessage, RequestError> {
    decode_input_with(text, &Decoder::default())
}

/// Decodes one WebSocket text frame into a validated [`InputMessage`].
///
/// # Errors
///
/// Returns a [`RequestError`] carrying the `requestId` when one could be read
/// from the message body before the failure:
///
/// - `JsonError` – not JSON, or a field has the wrong JSON type.
/// - `UnsupportedFormat` – not a single-key envelope, or an unknown message.
/// - `DBusFormatError` – a malformed bus name, path, interface or member.
/// - `DBusValueError` – a malformed argument value.
pub fn decode_input_with(text: &str, decoder: &Decoder) -> Result<InputMessage, RequestError> {
    let json: Json = serde_json::from_str(text).map_err(|e| RequestError::new(None, e))?;

    let Json::Object(envelope) = json else {
        return Err(unsupported(None, "a message must be a JSON object"));
    };
    let mut entries = envelope.into_iter();
    let (Some((kind, body)), None) = (entries.next(), entries.next()) else {
        return Err(unsupported(None, "a message must contain exactly one message kind"));
    };

    let request_id = body.get("requestId").and_then(Json::as_u64);

    match kind.as_str() {
        CALL_METHOD => decode_call_method(body, request_id, decoder),
        SUBSCRIBE_SIGNAL => {
            let (request_id, subscription) = decode_signal_request(body, request_id)?;
            Ok(InputMessage::SubscribeSignal {
                request_id,
                subscription,
            })
        }
        UNSUBSCRIBE_SIGNAL => {
            let (request_id, subscription) = decode_signal_request(body, request_id)?;
            Ok(InputMessage::UnsubscribeSignal {
                request_id,
                subscription,
            })
        }
        other => Err(unsupported(
            request_id,
            &format!("unknown message kind '{other}'"),
        )),
    }
}

/// Encodes one outbound message as a WebSocket text frame.
///
/// # Errors
///
/// Returns the serializer error; none is expected for well-formed values.
pub fn encode_output(msg: &OutputMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(msg)
}

// ── Decoding stages ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCallMethod {
    #[serde(default)]
    request_id: Option<RequestId>,
    #[serde(default)]
    destination: Option<String>,
    path: String,
    #[serde(default)]
    interface: Option<String>,
    method_name: String,
    #[serde(default)]
    args: Vec<Json>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSignalRequest {
    request_id: RequestId,
    destination: String,
    path: String,
    interface: String,
    #[serde(alias = "name")]
    method_name: String,
    #[serde(default)]
    args: Vec<ArgFilter>,
}

fn decode_call_method(
    body: Json,
    request_id: Option<RequestId>,
    decoder: &Decoder,
) -> Result<InputMessage, RequestError> {
    let raw: RawCallMethod =
        serde_json::from_value(body).map_err(|e| RequestError::new(request_id, e))?;
    let request_id = raw.request_id;
    let fail = |e: ProtocolError| RequestError::new(request_id, e);

    let destination = raw
        .destination
        .map(BusName::new)
        .transpose()
        .map_err(|e| fail(e.into()))?;
    let path = ObjectPath::new(raw.path).map_err(|e| fail(e.into()))?;
    let interface = raw
        .interface
        .map(InterfaceName::new)
        .transpose()
        .map_err(|e| fail(e.into()))?;
    let member = MemberName::new(raw.method_name).map_err(|e| fail(e.into()))?;
    let args = decoder
        .decode_values(&raw.args)
        .map_err(|e| fail(e.into()))?;

    Ok(InputMessage::CallMethod {
        request_id,
        call: MethodCall {
            destination,
            path,
            interface,
            member,
            args,
        },
    })
}

fn decode_signal_request(
    body: Json,
    request_id: Option<RequestId>,
) -> Result<(RequestId, SubscriptionKey), RequestError> {
    let raw: RawSignalRequest =
        serde_json::from_value(body).map_err(|e| RequestError::new(request_id, e))?;
    let request_id = raw.request_id;
    let fail = |e: ProtocolError| RequestError::new(Some(request_id), e);

    let key = SignalKey {
        destination: BusName::new(raw.destination).map_err(|e| fail(e.into()))?,
        path: ObjectPath::new(raw.path).map_err(|e| fail(e.into()))?,
        interface: InterfaceName::new(raw.interface).map_err(|e| fail(e.into()))?,
        member: MemberName::new(raw.method_name).map_err(|e| fail(e.into()))?,
    };

    Ok((request_id, SubscriptionKey::new(key, raw.args)))
}

fn unsupported(request_id: Option<RequestId>, reason: &str) -> RequestError {
    RequestError::new(request_id, ProtocolError::UnsupportedFormat(reason.to_owned()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::error::ErrorType;
    use crate::value::DBusValue;

    const NOTIFY: &str = r#"{"CallMethod":{"requestId":123,"destination":"org.freedesktop.Notifications","path":"/org/freedesktop/Notifications","interface":"org.freedesktop.Notifications","methodName":"Notify","args":[{"type":"string","value":"app"},{"type":"u32","value":0},{"type":"string","value":""},{"type":"string","value":"Hello"},{"type":"string","value":"World"},{"type":"array","valueType":"string"},{"type":"dict","keyType":"string","valueType":"variant"},{"type":"i32","value":5000}]}}"#;

    fn error_of(text: &str) -> RequestError {
        decode_input(text).unwrap_err()
    }

    #[test]
    fn test_decode_notify_call() {
        let InputMessage::CallMethod { request_id, call } = decode_input(NOTIFY).unwrap() else {
            panic!("expected CallMethod");
        };
        assert_eq!(request_id, Some(123));
        assert_eq!(call.member.as_str(), "Notify");
        assert_eq!(call.args.len(), 8);
        assert_eq!(call.args[1], DBusValue::U32(0));
        assert_eq!(call.args[6].signature(), "a{sv}");
    }

    #[test]
    fn test_call_without_request_id_or_interface() {
        let text = r#"{"CallMethod":{"path":"/","methodName":"Ping"}}"#;
        let InputMessage::CallMethod { request_id, call } = decode_input(text).unwrap() else {
            panic!("expected CallMethod");
        };
        assert_eq!(request_id, None);
        assert_eq!(call.destination, None);
        assert_eq!(call.interface, None);
        assert!(call.args.is_empty());
    }

    #[test]
    fn test_invalid_json_is_json_error_without_id() {
        let err = error_of("{not json");
        assert_eq!(err.error_type(), ErrorType::JsonError);
        assert_eq!(err.request_id, None);
    }

    #[test]
    fn test_unknown_kind_is_unsupported_format() {
        let err = error_of(r#"{"Introspect":{"requestId":4}}"#);
        assert_eq!(err.error_type(), ErrorType::UnsupportedFormat);
        assert_eq!(err.request_id, Some(4));
    }

    #[test]
    fn test_two_kinds_in_one_envelope_is_unsupported() {
        let err = error_of(r#"{"CallMethod":{},"SubscribeSignal":{}}"#);
        assert_eq!(err.error_type(), ErrorType::UnsupportedFormat);
    }

    #[test]
    fn test_array_envelope_is_unsupported() {
        assert_eq!(error_of("[]").error_type(), ErrorType::UnsupportedFormat);
    }

    #[test]
    fn test_missing_field_is_json_error_with_id() {
        let err = error_of(r#"{"CallMethod":{"requestId":8,"methodName":"Ping"}}"#);
        assert_eq!(err.error_type(), ErrorType::JsonError);
        assert_eq!(err.request_id, Some(8));
    }

    #[test]
    fn test_bad_object_path_is_format_error_with_id() {
        let err = error_of(r#"{"CallMethod":{"requestId":7,"path":"org/x","methodName":"Ping"}}"#);
        assert_eq!(err.error_type(), ErrorType::DBusFormatError);
        assert_eq!(err.request_id, Some(7));
    }

    #[test]
    fn test_bad_bus_name_is_format_error() {
        let err = error_of(
            r#"{"CallMethod":{"requestId":1,"destination":"org","path":"/","methodName":"Ping"}}"#,
        );
        assert_eq!(err.error_type(), ErrorType::DBusFormatError);
    }

    #[test]
    fn test_bad_argument_is_value_error() {
        let err = error_of(
            r#"{"CallMethod":{"requestId":2,"path":"/","methodName":"Ping","args":[{"type":"u8","value":999}]}}"#,
        );
        assert_eq!(err.error_type(), ErrorType::DBusValueError);
        assert_eq!(err.request_id, Some(2));
    }

    #[test]
    fn test_unknown_argument_type_is_unsupported_format() {
        let err = error_of(
            r#"{"CallMethod":{"requestId":2,"path":"/","methodName":"Ping","args":[{"type":"quux","value":1}]}}"#,
        );
        assert_eq!(err.error_type(), ErrorType::UnsupportedFormat);
    }

    #[test]
    fn test_decode_subscribe_with_filters() {
        let text = r#"{"SubscribeSignal":{"requestId":3,"destination":"org.freedesktop.DBus","path":"/org/freedesktop/DBus","interface":"org.freedesktop.DBus","methodName":"NameOwnerChanged","args":[[0,"org.example"]]}}"#;
        let InputMessage::SubscribeSignal {
            request_id,
            subscription,
        } = decode_input(text).unwrap()
        else {
            panic!("expected SubscribeSignal");
        };
        assert_eq!(request_id, 3);
        assert_eq!(subscription.filters, vec![ArgFilter::new(0, "org.example")]);
    }

    #[test]
    fn test_subscribe_requires_request_id() {
        let text = r#"{"SubscribeSignal":{"destination":"org.freedesktop.DBus","path":"/","interface":"org.freedesktop.DBus","methodName":"X"}}"#;
        assert_eq!(error_of(text).error_type(), ErrorType::JsonError);
    }

    #[test]
    fn test_unsubscribe_accepts_name_alias() {
        let text = r#"{"UnsubscribeSignal":{"requestId":4,"destination":"org.freedesktop.DBus","path":"/","interface":"org.freedesktop.DBus","name":"NameOwnerChanged"}}"#;
        assert!(matches!(
            decode_input(text).unwrap(),
            InputMessage::UnsubscribeSignal { request_id: 4, .. }
        ));
    }

    #[test]
    fn test_decoder_depth_limit_is_honoured() {
        let text = r#"{"CallMethod":{"requestId":1,"path":"/","methodName":"Ping","args":[{"type":"variant","value":{"type":"u8","value":1}}]}}"#;
        assert!(decode_input_with(text, &Decoder::new(2)).is_ok());
        let err = decode_input_with(text, &Decoder::new(1)).unwrap_err();
        assert_eq!(err.error_type(), ErrorType::DBusValueError);
    }

    #[test]
    fn test_encode_output() {
        let text = encode_output(&OutputMessage::Success { request_id: 1 }).unwrap();
        assert_eq!(text, r#"{"Success":{"requestId":1}}"#);
    }
}

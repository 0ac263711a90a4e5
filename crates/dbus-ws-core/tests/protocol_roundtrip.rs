//! Integration tests for the dbus-ws-core message protocol.
//!
//! These tests drive whole WebSocket frames through `decode_input` and
//! `encode_output`, the same entry points the bridge uses.

use dbus_ws_core::{
    decode_input, encode_output, ArgFilter, BusName, DBusValue, ErrorType, InputMessage,
    InterfaceName, MemberName, ObjectPath, OutputMessage, RequestError, SignalKey,
    SubscriptionKey,
};

fn name_owner_changed() -> SignalKey {
    SignalKey {
        destination: BusName::new("org.freedesktop.DBus").unwrap(),
        path: ObjectPath::new("/org/freedesktop/DBus").unwrap(),
        interface: InterfaceName::new("org.freedesktop.DBus").unwrap(),
        member: MemberName::new("NameOwnerChanged").unwrap(),
    }
}

#[test]
fn test_subscribe_frame_decodes_to_subscription_key() {
    let frame = r#"{"SubscribeSignal":{"requestId":3,"destination":"org.freedesktop.DBus","path":"/org/freedesktop/DBus","interface":"org.freedesktop.DBus","methodName":"NameOwnerChanged","args":[[0,"org.example.App"]]}}"#;

    let msg = decode_input(frame).expect("decode must succeed");

    assert_eq!(
        msg,
        InputMessage::SubscribeSignal {
            request_id: 3,
            subscription: SubscriptionKey::new(
                name_owner_changed(),
                vec![ArgFilter::new(0, "org.example.App")]
            ),
        }
    );
}

#[test]
fn test_signal_output_decodes_back_to_same_message() {
    let original = OutputMessage::Signal {
        key: SubscriptionKey::new(name_owner_changed(), vec![ArgFilter::new(0, "org.example.App")]),
        args: vec![
            DBusValue::string("org.example.App"),
            DBusValue::string(""),
            DBusValue::string(":1.42"),
        ],
    };

    let text = encode_output(&original).expect("encode must succeed");
    let decoded: OutputMessage = serde_json::from_str(&text).expect("decode must succeed");

    assert_eq!(decoded, original);
}

#[test]
fn test_method_error_wire_format() {
    let msg = OutputMessage::MethodError {
        request_id: Some(11),
        error_name: "org.freedesktop.DBus.Error.ServiceUnknown".to_string(),
        args: vec![DBusValue::string("The name is not activatable")],
    };

    let text = encode_output(&msg).unwrap();

    assert_eq!(
        text,
        r#"{"MethodError":{"requestId":11,"errorName":"org.freedesktop.DBus.Error.ServiceUnknown","args":[{"type":"string","value":"The name is not activatable"}]}}"#
    );
}

#[test]
fn test_decode_failure_becomes_error_frame_with_request_id() {
    let frame = r#"{"CallMethod":{"requestId":55,"path":"/bad//path","methodName":"Ping"}}"#;

    let err: RequestError = decode_input(frame).unwrap_err();
    let text = encode_output(&OutputMessage::from(err)).unwrap();
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();

    assert_eq!(json["Error"]["requestId"], 55);
    assert_eq!(json["Error"]["errorType"], "DBusFormatError");
}

#[test]
fn test_error_types_cover_every_decode_stage() {
    let cases = [
        ("nope", ErrorType::JsonError),
        (r#"{"Hello":{}}"#, ErrorType::UnsupportedFormat),
        (
            r#"{"CallMethod":{"requestId":1,"path":"/","methodName":"Bad.Name"}}"#,
            ErrorType::DBusFormatError,
        ),
        (
            r#"{"CallMethod":{"requestId":1,"path":"/","methodName":"Ping","args":[{"type":"array"}]}}"#,
            ErrorType::DBusValueError,
        ),
    ];

    for (frame, expected) in cases {
        let err = decode_input(frame).unwrap_err();
        assert_eq!(err.error_type(), expected, "frame: {frame}");
    }
}

#[test]
fn test_range_and_homogeneity_violations_are_value_errors() {
    let args = [
        r#"{"type":"u8","value":256}"#,
        r#"{"type":"i16","value":40000}"#,
        r#"{"type":"array","valueType":"string","value":[{"type":"u32","value":7}]}"#,
        r#"{"type":"array","value":[{"type":"array","valueType":"string"},{"type":"array","value":[{"type":"u32","value":7}]}]}"#,
    ];

    for arg in args {
        let frame = format!(
            r#"{{"CallMethod":{{"requestId":9,"path":"/","methodName":"Ping","args":[{arg}]}}}}"#
        );
        let err = decode_input(&frame).unwrap_err();
        assert_eq!(err.error_type(), ErrorType::DBusValueError, "arg: {arg}");
        assert_eq!(err.request_id, Some(9), "arg: {arg}");
    }
}

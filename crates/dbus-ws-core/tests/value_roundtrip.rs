//! Integration tests for the dbus-ws-core value codec.
//!
//! These tests push representative D-Bus values through the public JSON API
//! and check that decoding the encoded form gives back the same value, and
//! that the wire text stays stable for the shapes clients depend on.

use dbus_ws_core::{
    decode_value, encode_value, DBusValue, ObjectPath, PrimitiveType, Signature, ValueType,
};
use serde_json::json;

/// Encodes a value and decodes it again, asserting the result is unchanged.
fn roundtrip(value: DBusValue) -> DBusValue {
    let json = encode_value(&value);
    let text = serde_json::to_string(&json).expect("encode must succeed");
    let parsed: serde_json::Value = serde_json::from_str(&text).expect("text must be JSON");
    decode_value(&parsed).expect("decode must succeed")
}

#[test]
fn test_roundtrip_every_primitive() {
    let values = vec![
        DBusValue::U8(u8::MAX),
        DBusValue::Bool(true),
        DBusValue::I16(i16::MIN),
        DBusValue::U16(u16::MAX),
        DBusValue::I32(-42),
        DBusValue::U32(u32::MAX),
        DBusValue::I64(i64::MIN),
        DBusValue::U64(u64::MAX),
        DBusValue::F64(2.5),
        DBusValue::string("hello"),
        DBusValue::Signature(Signature::new("a{sv}").unwrap()),
        DBusValue::ObjectPath(ObjectPath::new("/org/freedesktop/DBus").unwrap()),
        DBusValue::Fd(3),
    ];
    for value in values {
        assert_eq!(roundtrip(value.clone()), value);
    }
}

#[test]
fn test_roundtrip_notification_hints() {
    let hints = DBusValue::dict(
        PrimitiveType::Str,
        ValueType::Variant,
        vec![
            (
                DBusValue::string("urgency"),
                DBusValue::Variant(Box::new(DBusValue::U8(2))),
            ),
            (
                DBusValue::string("category"),
                DBusValue::Variant(Box::new(DBusValue::string("email.arrived"))),
            ),
        ],
    )
    .unwrap();

    assert_eq!(roundtrip(hints.clone()), hints);
}

#[test]
fn test_roundtrip_empty_containers_keep_their_types() {
    let empty_array = DBusValue::array(
        ValueType::Struct(vec![
            ValueType::Primitive(PrimitiveType::I32),
            ValueType::Primitive(PrimitiveType::Str),
        ]),
        vec![],
    )
    .unwrap();
    let empty_dict = DBusValue::dict(
        PrimitiveType::U32,
        ValueType::Array(Box::new(ValueType::Variant)),
        vec![],
    )
    .unwrap();

    let decoded_array = roundtrip(empty_array.clone());
    let decoded_dict = roundtrip(empty_dict.clone());

    assert_eq!(decoded_array, empty_array);
    assert_eq!(decoded_array.signature(), "a(is)");
    assert_eq!(decoded_dict, empty_dict);
    assert_eq!(decoded_dict.signature(), "a{uav}");
}

#[test]
fn test_roundtrip_non_string_dict_keys() {
    let dict = DBusValue::dict(
        PrimitiveType::ObjectPath,
        ValueType::Primitive(PrimitiveType::Bool),
        vec![(
            DBusValue::ObjectPath(ObjectPath::new("/a/b").unwrap()),
            DBusValue::Bool(false),
        )],
    )
    .unwrap();

    assert_eq!(roundtrip(dict.clone()), dict);
}

#[test]
fn test_roundtrip_nested_struct_in_array() {
    let entry = |n: i32, name: &str| {
        DBusValue::structure(vec![DBusValue::I32(n), DBusValue::string(name)]).unwrap()
    };
    let array = DBusValue::array(
        ValueType::from_signature("(is)").unwrap(),
        vec![entry(1, "one"), entry(2, "two")],
    )
    .unwrap();

    assert_eq!(roundtrip(array.clone()), array);
}

#[test]
fn test_wire_text_for_notify_arguments() {
    let args = vec![
        DBusValue::string("app"),
        DBusValue::U32(0),
        DBusValue::array(ValueType::Primitive(PrimitiveType::Str), vec![]).unwrap(),
        DBusValue::dict(PrimitiveType::Str, ValueType::Variant, vec![]).unwrap(),
    ];
    let json: Vec<serde_json::Value> = args.iter().map(encode_value).collect();

    assert_eq!(
        serde_json::Value::Array(json),
        json!([
            {"type": "string", "value": "app"},
            {"type": "u32", "value": 0},
            {"type": "array", "valueType": "string"},
            {"type": "dict", "keyType": "string", "valueType": "variant"}
        ])
    );
}

#[test]
fn test_dict_entry_order_is_preserved() {
    let text = r#"{"type":"dict","value":{"z":{"type":"u8","value":1},"a":{"type":"u8","value":2}}}"#;
    let value = decode_value(&serde_json::from_str(text).unwrap()).unwrap();
    assert_eq!(serde_json::to_string(&encode_value(&value)).unwrap(), text);
}

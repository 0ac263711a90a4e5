//! Message types exchanged between WebSocket clients and the bridge.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::ErrorType;
use crate::names::{BusName, InterfaceName, MemberName, ObjectPath};
use crate::value::DBusValue;

/// Client-chosen identifier used to correlate a request with its reply.
pub type RequestId = u64;

/// Identifies one D-Bus signal: who emits it, on which object, and its name.
///
/// On the wire the member is named `methodName`; `name` is accepted as an
/// alias when decoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignalKey {
    pub destination: BusName,
    pub path: ObjectPath,
    pub interface: InterfaceName,
    #[serde(rename = "methodName", alias = "name")]
    pub member: MemberName,
}

impl fmt::Display for SignalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}.{}",
            self.destination, self.path, self.interface, self.member
        )
    }
}

/// Requires signal argument `index` to be a string-like value equal to `value`.
///
/// Serialized as the JSON tuple `[index, "value"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(u8, String)", into = "(u8, String)")]
pub struct ArgFilter {
    pub index: u8,
    pub value: String,
}

impl ArgFilter {
    pub fn new(index: u8, value: impl Into<String>) -> Self {
        Self {
            index,
            value: value.into(),
        }
    }

    /// Returns `true` when `args[index]` is a string, object path or signature
    /// equal to the expected text.  A missing argument never matches.
    pub fn matches(&self, args: &[DBusValue]) -> bool {
        args.get(usize::from(self.index))
            .and_then(DBusValue::as_str)
            .is_some_and(|text| text == self.value)
    }
}

impl From<(u8, String)> for ArgFilter {
    fn from((index, value): (u8, String)) -> Self {
        Self { index, value }
    }
}

impl From<ArgFilter> for (u8, String) {
    fn from(filter: ArgFilter) -> Self {
        (filter.index, filter.value)
    }
}

/// A signal key together with its argument filters.
///
/// This is the identity of one subscription: two subscriptions on the same
/// key with different filters are distinct.  Serialized as the key fields plus
/// `args: [[index, "value"], ...]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionKey {
    #[serde(flatten)]
    pub key: SignalKey,
    #[serde(default, rename = "args")]
    pub filters: Vec<ArgFilter>,
}

impl SubscriptionKey {
    pub fn new(key: SignalKey, filters: Vec<ArgFilter>) -> Self {
        Self { key, filters }
    }

    /// Returns `true` when every filter matches `args`.
    pub fn matches(&self, args: &[DBusValue]) -> bool {
        self.filters.iter().all(|filter| filter.matches(args))
    }
}

/// A validated D-Bus method invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    /// `None` sends the call without a destination (peer-to-peer style).
    pub destination: Option<BusName>,
    pub path: ObjectPath,
    pub interface: Option<InterfaceName>,
    pub member: MemberName,
    pub args: Vec<DBusValue>,
}

impl fmt::Display for MethodCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let destination = self.destination.as_ref().map_or("-", BusName::as_str);
        let interface = self.interface.as_ref().map_or("-", InterfaceName::as_str);
        write!(f, "{destination} {} {interface}.{}", self.path, self.member)
    }
}

/// A fully decoded and validated client message.
#[derive(Debug, Clone, PartialEq)]
pub enum InputMessage {
    CallMethod {
        request_id: Option<RequestId>,
        call: MethodCall,
    },
    SubscribeSignal {
        request_id: RequestId,
        subscription: SubscriptionKey,
    },
    UnsubscribeSignal {
        request_id: RequestId,
        subscription: SubscriptionKey,
    },
}

impl InputMessage {
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            InputMessage::CallMethod { request_id, .. } => *request_id,
            InputMessage::SubscribeSignal { request_id, .. }
            | InputMessage::UnsubscribeSignal { request_id, .. } => Some(*request_id),
        }
    }

    /// The envelope key this message travels under.
    pub fn kind(&self) -> &'static str {
        match self {
            InputMessage::CallMethod { .. } => "CallMethod",
            InputMessage::SubscribeSignal { .. } => "SubscribeSignal",
            InputMessage::UnsubscribeSignal { .. } => "UnsubscribeSignal",
        }
    }
}

/// A message sent from the bridge to a client.
///
/// Serialized externally tagged, e.g. `{"Success":{"requestId":3}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all_fields = "camelCase")]
pub enum OutputMessage {
    MethodReturn {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<RequestId>,
        args: Vec<DBusValue>,
    },
    MethodError {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<RequestId>,
        error_name: String,
        args: Vec<DBusValue>,
    },
    Signal {
        key: SubscriptionKey,
        args: Vec<DBusValue>,
    },
    Success {
        request_id: RequestId,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<RequestId>,
        error_type: ErrorType,
        message: String,
    },
}

impl OutputMessage {
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            OutputMessage::MethodReturn { request_id, .. }
            | OutputMessage::MethodError { request_id, .. }
            | OutputMessage::Error { request_id, .. } => *request_id,
            OutputMessage::Success { request_id } => Some(*request_id),
            OutputMessage::Signal { .. } => None,
        }
    }

    pub fn error(request_id: Option<RequestId>, error_type: ErrorType, message: impl Into<String>) -> Self {
        OutputMessage::Error {
            request_id,
            error_type,
            message: message.into(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SignalKey {
        SignalKey {
            destination: BusName::new("org.freedesktop.DBus").unwrap(),
            path: ObjectPath::new("/org/freedesktop/DBus").unwrap(),
            interface: InterfaceName::new("org.freedesktop.DBus").unwrap(),
            member: MemberName::new("NameOwnerChanged").unwrap(),
        }
    }

    #[test]
    fn test_arg_filter_serializes_as_tuple() {
        let filter = ArgFilter::new(0, "org.example");
        assert_eq!(serde_json::to_string(&filter).unwrap(), r#"[0,"org.example"]"#);
    }

    #[test]
    fn test_arg_filter_matches_string_like_args() {
        let filter = ArgFilter::new(1, "/a");
        let args = vec![
            DBusValue::U8(0),
            DBusValue::ObjectPath(ObjectPath::new("/a").unwrap()),
        ];
        assert!(filter.matches(&args));
    }

    #[test]
    fn test_arg_filter_ignores_non_string_args() {
        let filter = ArgFilter::new(0, "1");
        assert!(!filter.matches(&[DBusValue::U32(1)]));
    }

    #[test]
    fn test_arg_filter_with_missing_index_does_not_match() {
        let filter = ArgFilter::new(3, "x");
        assert!(!filter.matches(&[DBusValue::string("x")]));
    }

    #[test]
    fn test_subscription_without_filters_matches_everything() {
        let sub = SubscriptionKey::new(key(), vec![]);
        assert!(sub.matches(&[]));
    }

    #[test]
    fn test_signal_key_accepts_name_alias() {
        let json = r#"{"destination":"org.freedesktop.DBus","path":"/org/freedesktop/DBus","interface":"org.freedesktop.DBus","name":"NameOwnerChanged"}"#;
        let parsed: SignalKey = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, key());
    }

    #[test]
    fn test_success_wire_format() {
        let msg = OutputMessage::Success { request_id: 3 };
        assert_eq!(serde_json::to_string(&msg).unwrap(), r#"{"Success":{"requestId":3}}"#);
    }

    #[test]
    fn test_method_return_without_request_id_omits_field() {
        let msg = OutputMessage::MethodReturn {
            request_id: None,
            args: vec![],
        };
        assert_eq!(serde_json::to_string(&msg).unwrap(), r#"{"MethodReturn":{"args":[]}}"#);
    }

    #[test]
    fn test_error_wire_format() {
        let msg = OutputMessage::error(Some(9), ErrorType::ServerError, "duplicate");
        assert_eq!(
            serde_json::to_string(&msg).unwrap(),
            r#"{"Error":{"requestId":9,"errorType":"ServerError","message":"duplicate"}}"#
        );
    }

    #[test]
    fn test_signal_wire_format_carries_filters_as_args() {
        let msg = OutputMessage::Signal {
            key: SubscriptionKey::new(key(), vec![ArgFilter::new(0, "org.example")]),
            args: vec![DBusValue::string("org.example")],
        };
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["Signal"]["key"]["methodName"], "NameOwnerChanged");
        assert_eq!(json["Signal"]["key"]["args"][0][1], "org.example");
        assert_eq!(json["Signal"]["args"][0]["type"], "string");
    }

    #[test]
    fn test_request_id_accessors() {
        assert_eq!(OutputMessage::Success { request_id: 4 }.request_id(), Some(4));
        let signal = OutputMessage::Signal {
            key: SubscriptionKey::new(key(), vec![]),
            args: vec![],
        };
        assert_eq!(signal.request_id(), None);
    }
}

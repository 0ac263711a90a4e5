//! D-Bus name validators.
//!
//! Every identifier a client sends (bus names, object paths, interface and
//! member names, signatures) is checked here when the message is decoded.
//! A name that fails its grammar rejects the whole message before anything is
//! dispatched to the bus.
//!
//! Each kind of name has a newtype ([`BusName`], [`ObjectPath`], ...) whose only
//! constructor runs the check, so holding a `BusName` means holding a valid
//! bus name.  The newtypes serialize as plain JSON strings and re-validate when
//! deserialized.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::value::signature;

/// Maximum length of bus names, interface names, member names and signatures.
pub const MAX_NAME_LEN: usize = 255;

static BUS_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^:?[A-Za-z0-9_-]+(\.[A-Za-z0-9_-]+)+$").expect("bus name regex is valid")
});

static OBJECT_PATH_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/([A-Za-z0-9_]+(/[A-Za-z0-9_]+)*)?$").expect("object path regex is valid")
});

static INTERFACE_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)+$")
        .expect("interface name regex is valid")
});

static MEMBER_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("member name regex is valid")
});

static SIGNATURE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[{}()ybnqiuxtdsogavh]+$").expect("signature regex is valid")
});

/// The kind of D-Bus identifier being validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameKind {
    BusName,
    ObjectPath,
    InterfaceName,
    MemberName,
    Signature,
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NameKind::BusName => "bus name",
            NameKind::ObjectPath => "object path",
            NameKind::InterfaceName => "interface name",
            NameKind::MemberName => "member name",
            NameKind::Signature => "signature",
        })
    }
}

/// A D-Bus identifier failed its grammar check.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} '{value}': {reason}")]
pub struct NameError {
    pub kind: NameKind,
    pub value: String,
    pub reason: String,
}

impl NameError {
    fn new(kind: NameKind, value: &str, reason: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.to_owned(),
            reason: reason.into(),
        }
    }
}

/// Checks `value` against the grammar for `kind`.
///
/// # Errors
///
/// Returns [`NameError`] describing the first rule the value breaks.
///
/// # Examples
///
/// ```rust
/// use dbus_ws_core::names::{validate, NameKind};
///
/// assert!(validate(NameKind::BusName, "org.freedesktop.Notifications").is_ok());
/// assert!(validate(NameKind::BusName, "org").is_err());
/// assert!(validate(NameKind::ObjectPath, "/org/freedesktop/Notifications").is_ok());
/// assert!(validate(NameKind::ObjectPath, "org/x").is_err());
/// ```
pub fn validate(kind: NameKind, value: &str) -> Result<(), NameError> {
    let (regex, max_len) = match kind {
        NameKind::BusName => (&*BUS_NAME_REGEX, Some(MAX_NAME_LEN)),
        NameKind::ObjectPath => (&*OBJECT_PATH_REGEX, None),
        NameKind::InterfaceName => (&*INTERFACE_NAME_REGEX, Some(MAX_NAME_LEN)),
        NameKind::MemberName => (&*MEMBER_NAME_REGEX, Some(MAX_NAME_LEN)),
        NameKind::Signature => (&*SIGNATURE_REGEX, Some(MAX_NAME_LEN)),
    };

    if let Some(max_len) = max_len {
        if value.len() > max_len {
            return Err(NameError::new(
                kind,
                value,
                format!("longer than {max_len} characters"),
            ));
        }
    }

    if !regex.is_match(value) {
        return Err(NameError::new(kind, value, "does not match the D-Bus grammar"));
    }

    if kind == NameKind::Signature {
        signature::parse_types(value).map_err(|reason| NameError::new(kind, value, reason))?;
    }

    Ok(())
}

macro_rules! validated_name {
    ($(#[$meta:meta])* $name:ident, $kind:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(String);

        impl $name {
            /// Validates `value` and wraps it.
            ///
            /// # Errors
            ///
            /// Returns [`NameError`] if `value` breaks the grammar.
            pub fn new(value: impl Into<String>) -> Result<Self, NameError> {
                let value = value.into();
                validate($kind, &value)?;
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl TryFrom<&str> for $name {
            type Error = NameError;

            fn try_from(value: &str) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl TryFrom<String> for $name {
            type Error = NameError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl FromStr for $name {
            type Err = NameError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                Self::new(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let value = String::deserialize(deserializer)?;
                Self::new(value).map_err(serde::de::Error::custom)
            }
        }
    };
}

validated_name!(
    /// A unique (`:1.42`) or well-known (`org.freedesktop.Notifications`) bus name.
    BusName,
    NameKind::BusName
);

validated_name!(
    /// A D-Bus object path such as `/org/freedesktop/Notifications`.
    ObjectPath,
    NameKind::ObjectPath
);

validated_name!(
    /// A dotted interface name such as `org.freedesktop.DBus.Properties`.
    InterfaceName,
    NameKind::InterfaceName
);

validated_name!(
    /// A method or signal name such as `Notify`.
    MemberName,
    NameKind::MemberName
);

validated_name!(
    /// A D-Bus type signature: a sequence of complete types such as `sa{sv}`.
    Signature,
    NameKind::Signature
);

// ── Tests ─────────────────────────────────────────────────────────────────────

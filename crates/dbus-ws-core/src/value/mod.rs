//! The typed D-Bus value model.
//!
//! [`DBusValue`] mirrors the D-Bus type system one-to-one so that a value
//! decoded from JSON can be marshalled onto the bus without guessing.  The
//! [`ValueType`] descriptor names a type without carrying a value; it is what
//! an empty array or dict uses to say what it would contain.
//!
//! Containers are homogeneous.  The checked constructors
//! ([`DBusValue::array`], [`DBusValue::dict`], [`DBusValue::structure`]) and
//! [`DBusValue::validate`] enforce that every element matches the declared
//! element type and that dict keys are unique.

pub mod codec;
pub mod signature;

use std::collections::HashSet;
use std::fmt;

use thiserror::Error;

use crate::names::{NameError, NameKind, ObjectPath, Signature};

// ── Types ─────────────────────────────────────────────────────────────────────

/// The D-Bus basic types.  These are the only types allowed as dict keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    U8,
    Bool,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F64,
    Str,
    Signature,
    ObjectPath,
    Fd,
}

impl PrimitiveType {
    pub const ALL: [PrimitiveType; 13] = [
        PrimitiveType::U8,
        PrimitiveType::Bool,
        PrimitiveType::I16,
        PrimitiveType::U16,
        PrimitiveType::I32,
        PrimitiveType::U32,
        PrimitiveType::I64,
        PrimitiveType::U64,
        PrimitiveType::F64,
        PrimitiveType::Str,
        PrimitiveType::Signature,
        PrimitiveType::ObjectPath,
        PrimitiveType::Fd,
    ];

    /// The name used for this type in the JSON `type` discriminator.
    pub fn name(self) -> &'static str {
        match self {
            PrimitiveType::U8 => "u8",
            PrimitiveType::Bool => "bool",
            PrimitiveType::I16 => "i16",
            PrimitiveType::U16 => "u16",
            PrimitiveType::I32 => "i32",
            PrimitiveType::U32 => "u32",
            PrimitiveType::I64 => "i64",
            PrimitiveType::U64 => "u64",
            PrimitiveType::F64 => "f64",
            PrimitiveType::Str => "string",
            PrimitiveType::Signature => "signature",
            PrimitiveType::ObjectPath => "objectPath",
            PrimitiveType::Fd => "fd",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.name() == name)
    }

    /// The single-character D-Bus signature code for this type.
    pub fn code(self) -> char {
        match self {
            PrimitiveType::U8 => 'y',
            PrimitiveType::Bool => 'b',
            PrimitiveType::I16 => 'n',
            PrimitiveType::U16 => 'q',
            PrimitiveType::I32 => 'i',
            PrimitiveType::U32 => 'u',
            PrimitiveType::I64 => 'x',
            PrimitiveType::U64 => 't',
            PrimitiveType::F64 => 'd',
            PrimitiveType::Str => 's',
            PrimitiveType::Signature => 'g',
            PrimitiveType::ObjectPath => 'o',
            PrimitiveType::Fd => 'h',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.code() == code)
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A D-Bus type without a value.
///
/// Displays as its D-Bus signature, e.g. `a{sv}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    Primitive(PrimitiveType),
    Variant,
    Array(Box<ValueType>),
    Dict(PrimitiveType, Box<ValueType>),
    Struct(Vec<ValueType>),
}

impl ValueType {
    /// The D-Bus signature string for this type.
    pub fn signature(&self) -> String {
        let mut out = String::new();
        self.write_signature(&mut out);
        out
    }

    fn write_signature(&self, out: &mut String) {
        match self {
            ValueType::Primitive(ty) => out.push(ty.code()),
            ValueType::Variant => out.push('v'),
            ValueType::Array(element) => {
                out.push('a');
                element.write_signature(out);
            }
            ValueType::Dict(key, value) => {
                out.push_str("a{");
                out.push(key.code());
                value.write_signature(out);
                out.push('}');
            }
            ValueType::Struct(fields) => {
                out.push('(');
                for field in fields {
                    field.write_signature(out);
                }
                out.push(')');
            }
        }
    }

    /// Parses a signature holding exactly one complete type.
    ///
    /// # Errors
    ///
    /// Returns [`NameError`] of kind [`NameKind::Signature`] when the string is
    /// not a single well-formed complete type.
    pub fn from_signature(signature: &str) -> Result<Self, NameError> {
        signature::parse_single(signature).map_err(|reason| NameError {
            kind: NameKind::Signature,
            value: signature.to_owned(),
            reason,
        })
    }

    /// Nesting depth of the type; a primitive has depth 1.
    pub fn depth(&self) -> usize {
        match self {
            ValueType::Primitive(_) | ValueType::Variant => 1,
            ValueType::Array(element) => 1 + element.depth(),
            ValueType::Dict(_, value) => 1 + value.depth(),
            ValueType::Struct(fields) => 1 + fields.iter().map(ValueType::depth).max().unwrap_or(0),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature())
    }
}

impl From<PrimitiveType> for ValueType {
    fn from(ty: PrimitiveType) -> Self {
        ValueType::Primitive(ty)
    }
}

// ── Values ────────────────────────────────────────────────────────────────────

/// A typed D-Bus value.
///
/// Array and dict values always carry their element types so that an empty
/// container still has a complete signature.
#[derive(Debug, Clone, PartialEq)]
pub enum DBusValue {
    U8(u8),
    Bool(bool),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F64(f64),
    Str(String),
    Signature(Signature),
    ObjectPath(ObjectPath),
    /// A Unix file descriptor number.
    Fd(i32),
    Variant(Box<DBusValue>),
    Array {
        value_type: ValueType,
        elements: Vec<DBusValue>,
    },
    Dict {
        key_type: PrimitiveType,
        value_type: ValueType,
        entries: Vec<(DBusValue, DBusValue)>,
    },
    Struct(Vec<DBusValue>),
}

/// Errors produced while building or decoding a [`DBusValue`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    /// The JSON does not describe any known value shape.
    #[error("unsupported value format: {0}")]
    UnsupportedFormat(String),

    /// A string typed as an object path or signature failed its grammar.
    #[error(transparent)]
    Name(#[from] NameError),

    #[error("{ty} value out of range: {value}")]
    OutOfRange { ty: PrimitiveType, value: String },

    #[error("invalid {ty} value: {reason}")]
    InvalidPrimitive { ty: PrimitiveType, reason: String },

    #[error("{container} is missing its '{field}' field")]
    MissingField {
        container: String,
        field: &'static str,
    },

    #[error("element type mismatch: expected '{expected}', found '{found}'")]
    TypeMismatch { expected: ValueType, found: ValueType },

    #[error("invalid container: {0}")]
    InvalidContainer(String),

    #[error("value nesting exceeds the maximum depth of {0}")]
    TooDeep(usize),
}

impl DBusValue {
    /// Builds an array after checking every element against `value_type`.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::TypeMismatch`] for the first element of another type.
    pub fn array(value_type: ValueType, elements: Vec<DBusValue>) -> Result<Self, ValueError> {
        check_elements(&value_type, &elements)?;
        Ok(DBusValue::Array {
            value_type,
            elements,
        })
    }

    /// Builds a dict after checking key and value types and key uniqueness.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::TypeMismatch`] for a mistyped entry or
    /// [`ValueError::InvalidContainer`] for a duplicate key.
    pub fn dict(
        key_type: PrimitiveType,
        value_type: ValueType,
        entries: Vec<(DBusValue, DBusValue)>,
    ) -> Result<Self, ValueError> {
        check_entries(key_type, &value_type, &entries)?;
        Ok(DBusValue::Dict {
            key_type,
            value_type,
            entries,
        })
    }

    /// Builds a struct.  D-Bus has no empty structs.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::InvalidContainer`] when `fields` is empty.
    pub fn structure(fields: Vec<DBusValue>) -> Result<Self, ValueError> {
        if fields.is_empty() {
            return Err(ValueError::InvalidContainer(
                "struct must have at least one field".to_owned(),
            ));
        }
        Ok(DBusValue::Struct(fields))
    }

    pub fn string(value: impl Into<String>) -> Self {
        DBusValue::Str(value.into())
    }

    /// The primitive type of this value, or `None` for containers.
    pub fn primitive_type(&self) -> Option<PrimitiveType> {
        Some(match self {
            DBusValue::U8(_) => PrimitiveType::U8,
            DBusValue::Bool(_) => PrimitiveType::Bool,
            DBusValue::I16(_) => PrimitiveType::I16,
            DBusValue::U16(_) => PrimitiveType::U16,
            DBusValue::I32(_) => PrimitiveType::I32,
            DBusValue::U32(_) => PrimitiveType::U32,
            DBusValue::I64(_) => PrimitiveType::I64,
            DBusValue::U64(_) => PrimitiveType::U64,
            DBusValue::F64(_) => PrimitiveType::F64,
            DBusValue::Str(_) => PrimitiveType::Str,
            DBusValue::Signature(_) => PrimitiveType::Signature,
            DBusValue::ObjectPath(_) => PrimitiveType::ObjectPath,
            DBusValue::Fd(_) => PrimitiveType::Fd,
            DBusValue::Variant(_)
            | DBusValue::Array { .. }
            | DBusValue::Dict { .. }
            | DBusValue::Struct(_) => return None,
        })
    }

    /// The full type of this value.
    pub fn value_type(&self) -> ValueType {
        if let Some(ty) = self.primitive_type() {
            return ValueType::Primitive(ty);
        }
        match self {
            DBusValue::Variant(_) => ValueType::Variant,
            DBusValue::Array { value_type, .. } => ValueType::Array(Box::new(value_type.clone())),
            DBusValue::Dict {
                key_type,
                value_type,
                ..
            } => ValueType::Dict(*key_type, Box::new(value_type.clone())),
            DBusValue::Struct(fields) => {
                ValueType::Struct(fields.iter().map(DBusValue::value_type).collect())
            }
            _ => unreachable!("primitive values are handled above"),
        }
    }

    /// The D-Bus signature of this value.
    pub fn signature(&self) -> String {
        self.value_type().signature()
    }

    /// The text of a string-like value (string, object path or signature).
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DBusValue::Str(s) => Some(s),
            DBusValue::ObjectPath(p) => Some(p.as_str()),
            DBusValue::Signature(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Renders a primitive as the text used for a JSON object key.
    ///
    /// Returns `None` for containers, which cannot be dict keys.
    pub fn to_key_string(&self) -> Option<String> {
        Some(match self {
            DBusValue::U8(v) => v.to_string(),
            DBusValue::Bool(v) => v.to_string(),
            DBusValue::I16(v) => v.to_string(),
            DBusValue::U16(v) => v.to_string(),
            DBusValue::I32(v) => v.to_string(),
            DBusValue::U32(v) => v.to_string(),
            DBusValue::I64(v) => v.to_string(),
            DBusValue::U64(v) => v.to_string(),
            DBusValue::F64(v) => v.to_string(),
            DBusValue::Fd(v) => v.to_string(),
            DBusValue::Str(_) | DBusValue::ObjectPath(_) | DBusValue::Signature(_) => {
                self.as_str()?.to_owned()
            }
            _ => return None,
        })
    }

    /// Checks container homogeneity and key uniqueness recursively.
    ///
    /// Values built through the checked constructors or the JSON decoder are
    /// always valid; this is for values assembled by hand.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<(), ValueError> {
        match self {
            DBusValue::Variant(inner) => inner.validate(),
            DBusValue::Array {
                value_type,
                elements,
            } => {
                check_elements(value_type, elements)?;
                elements.iter().try_for_each(DBusValue::validate)
            }
            DBusValue::Dict {
                key_type,
                value_type,
                entries,
            } => {
                check_entries(*key_type, value_type, entries)?;
                entries.iter().try_for_each(|(_, value)| value.validate())
            }
            DBusValue::Struct(fields) => {
                if fields.is_empty() {
                    return Err(ValueError::InvalidContainer(
                        "struct must have at least one field".to_owned(),
                    ));
                }
                fields.iter().try_for_each(DBusValue::validate)
            }
            _ => Ok(()),
        }
    }
}

pub(crate) fn check_elements(expected: &ValueType, elements: &[DBusValue]) -> Result<(), ValueError> {
    for element in elements {
        let found = element.value_type();
        if &found != expected {
            return Err(ValueError::TypeMismatch {
                expected: expected.clone(),
                found,
            });
        }
    }
    Ok(())
}

pub(crate) fn check_entries(
    key_type: PrimitiveType,
    value_type: &ValueType,
    entries: &[(DBusValue, DBusValue)],
) -> Result<(), ValueError> {
    let mut seen = HashSet::with_capacity(entries.len());
    for (key, value) in entries {
        if key.primitive_type() != Some(key_type) {
            return Err(ValueError::TypeMismatch {
                expected: ValueType::Primitive(key_type),
                found: key.value_type(),
            });
        }
        let found = value.value_type();
        if &found != value_type {
            return Err(ValueError::TypeMismatch {
                expected: value_type.clone(),
                found,
            });
        }
        if let Some(text) = key.to_key_string() {
            if seen.contains(&text) {
                return Err(ValueError::InvalidContainer(format!(
                    "duplicate dict key '{text}'"
                )));
            }
            seen.insert(text);
        }
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

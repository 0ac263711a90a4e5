//! Conversion between [`DBusValue`] and zvariant values.
//!
//! Outbound values are already type-checked by the core decoder, so the
//! conversion here is structural.  Inbound values come from the bus and are
//! trusted to be well formed; they are re-validated only where the core
//! model is stricter than zvariant (object path and signature grammar).

use dbus_ws_core::{
    DBusValue, NameError, ObjectPath, PrimitiveType, Signature as SignatureName, ValueType,
};
use thiserror::Error;
use zbus::message::Body;
use zbus::zvariant::{self, Signature, StructureBuilder, Value};

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("{0} cannot be sent over this connection")]
    Unsupported(&'static str),

    #[error("unexpected {0} in D-Bus message")]
    Unexpected(String),

    #[error(transparent)]
    Name(#[from] NameError),

    #[error("marshalling failed: {0}")]
    ZVariant(#[from] zvariant::Error),

    #[error("signature rejected by zvariant: {0}")]
    Signature(zvariant::signature::Error),

    #[error("message body could not be read: {0}")]
    Body(#[from] zbus::Error),
}

// `zvariant::signature::Error` does not implement `std::error::Error`, so it
// cannot be a thiserror `#[from]` source; provide the conversion by hand.
impl From<zvariant::signature::Error> for ConversionError {
    fn from(err: zvariant::signature::Error) -> Self {
        ConversionError::Signature(err)
    }
}

// ── DBusValue → zvariant ──────────────────────────────────────────────────────

pub fn primitive_signature(ty: PrimitiveType) -> Signature {
    match ty {
        PrimitiveType::U8 => Signature::U8,
        PrimitiveType::Bool => Signature::Bool,
        PrimitiveType::I16 => Signature::I16,
        PrimitiveType::U16 => Signature::U16,
        PrimitiveType::I32 => Signature::I32,
        PrimitiveType::U32 => Signature::U32,
        PrimitiveType::I64 => Signature::I64,
        PrimitiveType::U64 => Signature::U64,
        PrimitiveType::F64 => Signature::F64,
        PrimitiveType::Str => Signature::Str,
        PrimitiveType::Signature => Signature::Signature,
        PrimitiveType::ObjectPath => Signature::ObjectPath,
        PrimitiveType::Fd => Signature::Fd,
    }
}

pub fn type_signature(ty: &ValueType) -> Signature {
    match ty {
        ValueType::Primitive(p) => primitive_signature(*p),
        ValueType::Variant => Signature::Variant,
        ValueType::Array(element) => Signature::array(type_signature(element)),
        ValueType::Dict(key, value) => Signature::dict(primitive_signature(*key), type_signature(value)),
        ValueType::Struct(fields) => {
            let fields: Vec<Signature> = fields.iter().map(type_signature).collect();
            Signature::Structure(fields.into())
        }
    }
}

pub fn to_zvariant(value: &DBusValue) -> Result<Value<'static>, ConversionError> {
    Ok(match value {
        DBusValue::U8(v) => Value::U8(*v),
        DBusValue::Bool(v) => Value::Bool(*v),
        DBusValue::I16(v) => Value::I16(*v),
        DBusValue::U16(v) => Value::U16(*v),
        DBusValue::I32(v) => Value::I32(*v),
        DBusValue::U32(v) => Value::U32(*v),
        DBusValue::I64(v) => Value::I64(*v),
        DBusValue::U64(v) => Value::U64(*v),
        DBusValue::F64(v) => Value::F64(*v),
        DBusValue::Str(v) => Value::from(v.clone()),
        DBusValue::Signature(v) => Value::Signature(v.as_str().parse::<Signature>()?),
        DBusValue::ObjectPath(v) => {
            Value::ObjectPath(zvariant::ObjectPath::try_from(v.as_str().to_owned())?)
        }
        // A bare descriptor number is meaningless in another process; passing
        // descriptors needs SCM_RIGHTS, which a JSON client cannot provide.
        DBusValue::Fd(_) => return Err(ConversionError::Unsupported("file descriptor")),
        DBusValue::Variant(inner) => Value::Value(Box::new(to_zvariant(inner)?)),
        DBusValue::Array {
            value_type,
            elements,
        } => {
            let mut array = zvariant::Array::new(&type_signature(value_type));
            for element in elements {
                array.append(to_zvariant(element)?)?;
            }
            Value::Array(array)
        }
        DBusValue::Dict {
            key_type,
            value_type,
            entries,
        } => {
            let mut dict =
                zvariant::Dict::new(&primitive_signature(*key_type), &type_signature(value_type));
            for (key, value) in entries {
                dict.append(to_zvariant(key)?, to_zvariant(value)?)?;
            }
            Value::Dict(dict)
        }
        DBusValue::Struct(fields) => Value::Structure(structure(fields)?),
    })
}

/// Builds a message body from an argument list.  `None` means the call has
/// no arguments and should be sent with an empty body.
pub fn to_body(args: &[DBusValue]) -> Result<Option<zvariant::Structure<'static>>, ConversionError> {
    if args.is_empty() {
        return Ok(None);
    }
    structure(args).map(Some)
}

fn structure(fields: &[DBusValue]) -> Result<zvariant::Structure<'static>, ConversionError> {
    let mut builder = StructureBuilder::new();
    for field in fields {
        builder.push_value(to_zvariant(field)?);
    }
    Ok(builder.build()?)
}

// ── zvariant → DBusValue ──────────────────────────────────────────────────────

/// Reads every argument of a message body.  An empty body yields no values.
pub fn from_body(body: &Body) -> Result<Vec<DBusValue>, ConversionError> {
    if body.is_empty() {
        return Ok(Vec::new());
    }
    let structure: zvariant::Structure<'_> = body.deserialize()?;
    structure.fields().iter().map(from_zvariant).collect()
}

pub fn from_zvariant(value: &Value<'_>) -> Result<DBusValue, ConversionError> {
    Ok(match value {
        Value::U8(v) => DBusValue::U8(*v),
        Value::Bool(v) => DBusValue::Bool(*v),
        Value::I16(v) => DBusValue::I16(*v),
        Value::U16(v) => DBusValue::U16(*v),
        Value::I32(v) => DBusValue::I32(*v),
        Value::U32(v) => DBusValue::U32(*v),
        Value::I64(v) => DBusValue::I64(*v),
        Value::U64(v) => DBusValue::U64(*v),
        Value::F64(v) => DBusValue::F64(*v),
        Value::Str(v) => DBusValue::Str(v.to_string()),
        Value::Signature(v) => DBusValue::Signature(SignatureName::new(v.to_string())?),
        Value::ObjectPath(v) => DBusValue::ObjectPath(ObjectPath::new(v.as_str())?),
        Value::Value(inner) => DBusValue::Variant(Box::new(from_zvariant(inner)?)),
        Value::Array(array) => DBusValue::Array {
            value_type: ValueType::from_signature(&array.element_signature().to_string())?,
            elements: array.iter().map(from_zvariant).collect::<Result<_, _>>()?,
        },
        Value::Dict(dict) => {
            let ValueType::Dict(key_type, value_type) =
                ValueType::from_signature(&dict.signature().to_string())?
            else {
                return Err(ConversionError::Unexpected(format!(
                    "dict signature {}",
                    dict.signature()
                )));
            };
            let entries = dict
                .iter()
                .map(|(k, v)| Ok((from_zvariant(k)?, from_zvariant(v)?)))
                .collect::<Result<_, ConversionError>>()?;
            DBusValue::Dict {
                key_type,
                value_type: *value_type,
                entries,
            }
        }
        Value::Structure(fields) => DBusValue::Struct(
            fields
                .fields()
                .iter()
                .map(from_zvariant)
                .collect::<Result<_, _>>()?,
        ),
        #[cfg(unix)]
        Value::Fd(fd) => {
            use std::os::fd::{AsFd, AsRawFd};
            DBusValue::Fd(fd.as_fd().as_raw_fd())
        }
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: DBusValue) -> DBusValue {
        let z = to_zvariant(&value).unwrap();
        from_zvariant(&z).unwrap()
    }

    #[test]
    fn test_type_signature_matches_core_signature() {
        let ty = ValueType::from_signature("a{sv}").unwrap();
        assert_eq!(type_signature(&ty).to_string(), "a{sv}");
        let ty = ValueType::from_signature("(ias)").unwrap();
        assert_eq!(type_signature(&ty).to_string(), "(ias)");
    }

    #[test]
    fn test_primitives_survive_zvariant() {
        for value in [
            DBusValue::U8(7),
            DBusValue::Bool(true),
            DBusValue::I16(-3),
            DBusValue::U64(u64::MAX),
            DBusValue::F64(1.5),
            DBusValue::string("hello"),
            DBusValue::ObjectPath(ObjectPath::new("/org/example").unwrap()),
            DBusValue::Signature(SignatureName::new("a{sv}").unwrap()),
        ] {
            assert_eq!(round_trip(value.clone()), value);
        }
    }

    #[test]
    fn test_signature_value_is_marshalled_as_signature() {
        let value = DBusValue::Signature(SignatureName::new("(ias)").unwrap());

        let Value::Signature(signature) = to_zvariant(&value).unwrap() else {
            panic!("expected a signature value");
        };

        assert_eq!(signature.to_string(), "(ias)");
    }

    #[test]
    fn test_empty_array_keeps_element_type() {
        let value = DBusValue::array(ValueType::from_signature("s").unwrap(), vec![]).unwrap();
        assert_eq!(round_trip(value.clone()), value);
    }

    #[test]
    fn test_hints_dict_survives_zvariant() {
        let value = DBusValue::dict(
            PrimitiveType::Str,
            ValueType::Variant,
            vec![(
                DBusValue::string("urgency"),
                DBusValue::Variant(Box::new(DBusValue::U8(1))),
            )],
        )
        .unwrap();
        assert_eq!(round_trip(value.clone()), value);
    }

    #[test]
    fn test_struct_survives_zvariant() {
        let value =
            DBusValue::structure(vec![DBusValue::I32(1), DBusValue::string("x")]).unwrap();
        assert_eq!(round_trip(value.clone()), value);
    }

    #[test]
    fn test_fd_is_not_sent() {
        assert!(matches!(
            to_zvariant(&DBusValue::Fd(3)),
            Err(ConversionError::Unsupported(_))
        ));
    }

    #[test]
    fn test_empty_argument_list_has_no_body() {
        assert!(to_body(&[]).unwrap().is_none());
        let body = to_body(&[DBusValue::U32(1), DBusValue::string("a")]).unwrap().unwrap();
        assert_eq!(body.fields().len(), 2);
    }
}

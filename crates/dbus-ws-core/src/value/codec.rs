//! JSON codec for [`DBusValue`] and [`ValueType`].
//!
//! # Value format
//!
//! Every value is a JSON object with a `type` discriminator:
//!
//! ```text
//! {"type":"u32","value":7}
//! {"type":"variant","value":{"type":"string","value":"hi"}}
//! {"type":"array","value":[{"type":"u8","value":1}]}
//! {"type":"array","valueType":"string"}                      (empty array)
//! {"type":"dict","value":{"a":{"type":"bool","value":true}}}
//! {"type":"dict","keyType":"u32","value":{"7":{"type":"string","value":"x"}}}
//! {"type":"dict","keyType":"string","valueType":"variant"}   (empty dict)
//! {"type":"struct","value":[{"type":"i32","value":-1}]}
//! ```
//!
//! A container carries either `value` (and its element type is taken from the
//! elements) or `valueType` (and it is empty), never both.  Dict keys are JSON
//! object keys and are parsed according to `keyType`, which defaults to
//! `string`.
//!
//! # Type descriptor format
//!
//! ```text
//! "u8" | "bool" | ... | "fd" | "variant"
//! {"array":{"valueType":<descriptor>}}
//! {"dict":{"keyType":<primitive>,"valueType":<descriptor>}}
//! {"struct":{"fields":[<descriptor>, ...]}}
//! ```
//!
//! Inside a descriptor `valueType` defaults to `variant` and `keyType` to
//! `string`.  A D-Bus signature string such as `"a{sv}"` is also accepted as a
//! descriptor.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value as Json};

use super::{check_elements, check_entries, DBusValue, PrimitiveType, ValueError, ValueType};
use crate::names::{ObjectPath, Signature};

/// Default limit on value nesting accepted from clients.
pub const DEFAULT_MAX_DEPTH: usize = 64;

const TYPE_FIELD: &str = "type";
const VALUE_FIELD: &str = "value";
const VALUE_TYPE_FIELD: &str = "valueType";
const KEY_TYPE_FIELD: &str = "keyType";

/// Decodes a value with the default depth limit.
///
/// # Errors
///
/// See [`Decoder::decode_value`].
pub fn decode_value(json: &Json) -> Result<DBusValue, ValueError> {
    Decoder::default().decode_value(json)
}

/// Decodes a type descriptor with the default depth limit.
///
/// # Errors
///
/// See [`Decoder::decode_value_type`].
pub fn decode_value_type(json: &Json) -> Result<ValueType, ValueError> {
    Decoder::default().decode_value_type(json)
}

/// JSON → [`DBusValue`] decoder with a nesting limit.
///
/// Depth counts every value and descriptor level, so a primitive is depth 1
/// and `{"type":"variant","value":{"type":"u8",...}}` is depth 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoder {
    max_depth: usize,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

impl Decoder {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Decodes one value.
    ///
    /// # Errors
    ///
    /// - [`ValueError::UnsupportedFormat`] if the JSON is not a value object or
    ///   names an unknown type.
    /// - [`ValueError::Name`] if an object path or signature is malformed.
    /// - Any other [`ValueError`] for out-of-range numbers, container shape
    ///   errors, mixed element types and excessive nesting.
    pub fn decode_value(&self, json: &Json) -> Result<DBusValue, ValueError> {
        self.value(json, 0)
    }

    /// Decodes a list of values, such as method arguments.
    ///
    /// # Errors
    ///
    /// Returns the first element's error.
    pub fn decode_values(&self, values: &[Json]) -> Result<Vec<DBusValue>, ValueError> {
        values.iter().map(|json| self.decode_value(json)).collect()
    }

    /// Decodes one type descriptor.
    ///
    /// # Errors
    ///
    /// [`ValueError::UnsupportedFormat`] for unknown descriptors, and
    /// [`ValueError::InvalidContainer`] for non-basic dict keys or empty structs.
    pub fn decode_value_type(&self, json: &Json) -> Result<ValueType, ValueError> {
        self.value_type(json, 0)
    }

    fn enter(&self, depth: usize) -> Result<usize, ValueError> {
        let depth = depth + 1;
        if depth > self.max_depth {
            return Err(ValueError::TooDeep(self.max_depth));
        }
        Ok(depth)
    }

    fn value(&self, json: &Json, depth: usize) -> Result<DBusValue, ValueError> {
        let depth = self.enter(depth)?;

        let object = json.as_object().ok_or_else(|| {
            ValueError::UnsupportedFormat(format!("expected a value object, found {}", kind_of(json)))
        })?;
        let ty = match object.get(TYPE_FIELD) {
            Some(Json::String(ty)) => ty.as_str(),
            Some(_) => {
                return Err(ValueError::UnsupportedFormat(
                    "'type' must be a string".to_owned(),
                ))
            }
            None => {
                return Err(ValueError::UnsupportedFormat(
                    "value object has no 'type'".to_owned(),
                ))
            }
        };

        match ty {
            "variant" => {
                let inner = required(object, "variant", VALUE_FIELD)?;
                Ok(DBusValue::Variant(Box::new(self.value(inner, depth)?)))
            }
            "array" => self.array(object, depth),
            "dict" => self.dict(object, depth),
            "struct" => self.structure(object, depth),
            other => match PrimitiveType::from_name(other) {
                Some(primitive) => {
                    let raw = required(object, primitive.name(), VALUE_FIELD)?;
                    decode_primitive(primitive, raw)
                }
                None => Err(ValueError::UnsupportedFormat(format!(
                    "unknown value type '{other}'"
                ))),
            },
        }
    }

    fn array(&self, object: &Map<String, Json>, depth: usize) -> Result<DBusValue, ValueError> {
        match contents(object, "array")? {
            Contents::Empty(descriptor) => Ok(DBusValue::Array {
                value_type: self.value_type(descriptor, depth)?,
                elements: Vec::new(),
            }),
            Contents::Populated(raw) => {
                let items = raw.as_array().ok_or_else(|| {
                    ValueError::InvalidContainer("array 'value' must be a JSON array".to_owned())
                })?;
                let elements = items
                    .iter()
                    .map(|item| self.value(item, depth))
                    .collect::<Result<Vec<_>, _>>()?;
                let value_type = elements
                    .first()
                    .map(DBusValue::value_type)
                    .ok_or_else(|| {
                        ValueError::InvalidContainer(
                            "an empty array must declare its 'valueType'".to_owned(),
                        )
                    })?;
                check_elements(&value_type, &elements)?;
                Ok(DBusValue::Array {
                    value_type,
                    elements,
                })
            }
        }
    }

    fn dict(&self, object: &Map<String, Json>, depth: usize) -> Result<DBusValue, ValueError> {
        let key_type = match object.get(KEY_TYPE_FIELD) {
            Some(raw) => key_type(raw)?,
            None => PrimitiveType::Str,
        };

        match contents(object, "dict")? {
            Contents::Empty(descriptor) => Ok(DBusValue::Dict {
                key_type,
                value_type: self.value_type(descriptor, depth)?,
                entries: Vec::new(),
            }),
            Contents::Populated(raw) => {
                let map = raw.as_object().ok_or_else(|| {
                    ValueError::InvalidContainer("dict 'value' must be a JSON object".to_owned())
                })?;
                let entries = map
                    .iter()
                    .map(|(text, raw_value)| {
                        Ok((decode_key(key_type, text)?, self.value(raw_value, depth)?))
                    })
                    .collect::<Result<Vec<_>, ValueError>>()?;
                let value_type = entries
                    .first()
                    .map(|(_, value)| value.value_type())
                    .ok_or_else(|| {
                        ValueError::InvalidContainer(
                            "an empty dict must declare its 'valueType'".to_owned(),
                        )
                    })?;
                check_entries(key_type, &value_type, &entries)?;
                Ok(DBusValue::Dict {
                    key_type,
                    value_type,
                    entries,
                })
            }
        }
    }

    fn structure(&self, object: &Map<String, Json>, depth: usize) -> Result<DBusValue, ValueError> {
        let raw = required(object, "struct", VALUE_FIELD)?;
        let items = raw.as_array().ok_or_else(|| {
            ValueError::InvalidContainer("struct 'value' must be a JSON array".to_owned())
        })?;
        let fields = items
            .iter()
            .map(|item| self.value(item, depth))
            .collect::<Result<Vec<_>, _>>()?;
        DBusValue::structure(fields)
    }

    fn value_type(&self, json: &Json, depth: usize) -> Result<ValueType, ValueError> {
        let depth = self.enter(depth)?;

        match json {
            Json::String(name) => {
                if name == "variant" {
                    return Ok(ValueType::Variant);
                }
                if let Some(primitive) = PrimitiveType::from_name(name) {
                    return Ok(ValueType::Primitive(primitive));
                }
                ValueType::from_signature(name).map_err(|_| {
                    ValueError::UnsupportedFormat(format!("unknown value type '{name}'"))
                })
            }
            Json::Object(object) if object.len() == 1 => {
                let (container, body) = object
                    .iter()
                    .next()
                    .ok_or_else(|| ValueError::UnsupportedFormat("empty type descriptor".to_owned()))?;
                let body = body.as_object().ok_or_else(|| {
                    ValueError::UnsupportedFormat(format!("'{container}' descriptor must be an object"))
                })?;
                match container.as_str() {
                    "array" => {
                        let element = self.descriptor_value_type(body, depth)?;
                        Ok(ValueType::Array(Box::new(element)))
                    }
                    "dict" => {
                        let key = match body.get(KEY_TYPE_FIELD) {
                            Some(raw) => key_type(raw)?,
                            None => PrimitiveType::Str,
                        };
                        let value = self.descriptor_value_type(body, depth)?;
                        Ok(ValueType::Dict(key, Box::new(value)))
                    }
                    "struct" => {
                        let fields = match body.get("fields") {
                            Some(Json::Array(fields)) => fields
                                .iter()
                                .map(|field| self.value_type(field, depth))
                                .collect::<Result<Vec<_>, _>>()?,
                            Some(_) => {
                                return Err(ValueError::UnsupportedFormat(
                                    "struct 'fields' must be an array".to_owned(),
                                ))
                            }
                            None => Vec::new(),
                        };
                        if fields.is_empty() {
                            return Err(ValueError::InvalidContainer(
                                "struct descriptor must have at least one field".to_owned(),
                            ));
                        }
                        Ok(ValueType::Struct(fields))
                    }
                    other => Err(ValueError::UnsupportedFormat(format!(
                        "unknown container type '{other}'"
                    ))),
                }
            }
            other => Err(ValueError::UnsupportedFormat(format!(
                "expected a type descriptor, found {}",
                kind_of(other)
            ))),
        }
    }

    fn descriptor_value_type(
        &self,
        body: &Map<String, Json>,
        depth: usize,
    ) -> Result<ValueType, ValueError> {
        match body.get(VALUE_TYPE_FIELD) {
            Some(raw) => self.value_type(raw, depth),
            None => Ok(ValueType::Variant),
        }
    }
}

enum Contents<'a> {
    Empty(&'a Json),
    Populated(&'a Json),
}

fn contents<'a>(object: &'a Map<String, Json>, container: &str) -> Result<Contents<'a>, ValueError> {
    match (object.get(VALUE_FIELD), object.get(VALUE_TYPE_FIELD)) {
        (Some(_), Some(_)) => Err(ValueError::InvalidContainer(format!(
            "{container} must carry either 'value' or 'valueType', not both"
        ))),
        (None, None) => Err(ValueError::InvalidContainer(format!(
            "{container} must carry 'value' or 'valueType'"
        ))),
        (Some(value), None) => Ok(Contents::Populated(value)),
        (None, Some(descriptor)) => Ok(Contents::Empty(descriptor)),
    }
}

fn required<'a>(
    object: &'a Map<String, Json>,
    container: &str,
    field: &'static str,
) -> Result<&'a Json, ValueError> {
    object.get(field).ok_or_else(|| ValueError::MissingField {
        container: container.to_owned(),
        field,
    })
}

fn key_type(raw: &Json) -> Result<PrimitiveType, ValueError> {
    let name = raw.as_str().ok_or_else(|| {
        ValueError::InvalidContainer("dict 'keyType' must name a basic type".to_owned())
    })?;
    PrimitiveType::from_name(name).ok_or_else(|| {
        ValueError::InvalidContainer(format!("dict key type '{name}' is not a basic type"))
    })
}

fn kind_of(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "an object",
    }
}

// ── Primitives ────────────────────────────────────────────────────────────────

fn decode_primitive(ty: PrimitiveType, raw: &Json) -> Result<DBusValue, ValueError> {
    Ok(match ty {
        PrimitiveType::U8 => DBusValue::U8(narrow(ty, integer(ty, raw)?)?),
        PrimitiveType::I16 => DBusValue::I16(narrow(ty, integer(ty, raw)?)?),
        PrimitiveType::U16 => DBusValue::U16(narrow(ty, integer(ty, raw)?)?),
        PrimitiveType::I32 => DBusValue::I32(narrow(ty, integer(ty, raw)?)?),
        PrimitiveType::U32 => DBusValue::U32(narrow(ty, integer(ty, raw)?)?),
        PrimitiveType::I64 => DBusValue::I64(narrow(ty, integer(ty, raw)?)?),
        PrimitiveType::U64 => DBusValue::U64(narrow(ty, integer(ty, raw)?)?),
        PrimitiveType::Fd => DBusValue::Fd(narrow(ty, integer(ty, raw)?)?),
        PrimitiveType::Bool => DBusValue::Bool(
            raw.as_bool()
                .ok_or_else(|| invalid(ty, format!("expected a boolean, found {}", kind_of(raw))))?,
        ),
        PrimitiveType::F64 => DBusValue::F64(
            raw.as_f64()
                .ok_or_else(|| invalid(ty, format!("expected a number, found {}", kind_of(raw))))?,
        ),
        PrimitiveType::Str => DBusValue::Str(text(ty, raw)?.to_owned()),
        PrimitiveType::Signature => DBusValue::Signature(Signature::new(text(ty, raw)?)?),
        PrimitiveType::ObjectPath => DBusValue::ObjectPath(ObjectPath::new(text(ty, raw)?)?),
    })
}

fn decode_key(ty: PrimitiveType, text: &str) -> Result<DBusValue, ValueError> {
    Ok(match ty {
        PrimitiveType::U8 => DBusValue::U8(narrow(ty, key_integer(ty, text)?)?),
        PrimitiveType::I16 => DBusValue::I16(narrow(ty, key_integer(ty, text)?)?),
        PrimitiveType::U16 => DBusValue::U16(narrow(ty, key_integer(ty, text)?)?),
        PrimitiveType::I32 => DBusValue::I32(narrow(ty, key_integer(ty, text)?)?),
        PrimitiveType::U32 => DBusValue::U32(narrow(ty, key_integer(ty, text)?)?),
        PrimitiveType::I64 => DBusValue::I64(narrow(ty, key_integer(ty, text)?)?),
        PrimitiveType::U64 => DBusValue::U64(narrow(ty, key_integer(ty, text)?)?),
        PrimitiveType::Fd => DBusValue::Fd(narrow(ty, key_integer(ty, text)?)?),
        PrimitiveType::Bool => match text {
            "true" => DBusValue::Bool(true),
            "false" => DBusValue::Bool(false),
            _ => return Err(invalid(ty, format!("dict key '{text}' is not a boolean"))),
        },
        PrimitiveType::F64 => DBusValue::F64(
            text.parse()
                .map_err(|_| invalid(ty, format!("dict key '{text}' is not a number")))?,
        ),
        PrimitiveType::Str => DBusValue::Str(text.to_owned()),
        PrimitiveType::Signature => DBusValue::Signature(Signature::new(text)?),
        PrimitiveType::ObjectPath => DBusValue::ObjectPath(ObjectPath::new(text)?),
    })
}

fn key_integer(ty: PrimitiveType, text: &str) -> Result<i128, ValueError> {
    text.parse()
        .map_err(|_| invalid(ty, format!("dict key '{text}' is not an integer")))
}

fn integer(ty: PrimitiveType, raw: &Json) -> Result<i128, ValueError> {
    if let Some(n) = raw.as_u64() {
        return Ok(i128::from(n));
    }
    if let Some(n) = raw.as_i64() {
        return Ok(i128::from(n));
    }
    match raw.as_f64() {
        Some(f) if f.fract() == 0.0 => Err(ValueError::OutOfRange {
            ty,
            value: raw.to_string(),
        }),
        Some(_) => Err(invalid(ty, format!("{raw} is not an integer"))),
        None => Err(invalid(ty, format!("expected an integer, found {}", kind_of(raw)))),
    }
}

fn narrow<T: TryFrom<i128>>(ty: PrimitiveType, n: i128) -> Result<T, ValueError> {
    T::try_from(n).map_err(|_| ValueError::OutOfRange {
        ty,
        value: n.to_string(),
    })
}

fn text(ty: PrimitiveType, raw: &Json) -> Result<&str, ValueError> {
    raw.as_str()
        .ok_or_else(|| invalid(ty, format!("expected a string, found {}", kind_of(raw))))
}

fn invalid(ty: PrimitiveType, reason: String) -> ValueError {
    ValueError::InvalidPrimitive { ty, reason }
}

// ── Encoding ──────────────────────────────────────────────────────────────────

/// Encodes a value in the format described in the module docs.
///
/// Empty containers are written with `valueType`, populated ones with
/// `value`.  `keyType` is omitted for populated string-keyed dicts.  A
/// non-finite `f64` is written as `null`.
pub fn encode_value(value: &DBusValue) -> Json {
    match value {
        DBusValue::Variant(inner) => json!({ TYPE_FIELD: "variant", VALUE_FIELD: encode_value(inner) }),
        DBusValue::Array {
            value_type,
            elements,
        } => {
            if elements.is_empty() {
                json!({ TYPE_FIELD: "array", VALUE_TYPE_FIELD: encode_value_type(value_type) })
            } else {
                let items: Vec<Json> = elements.iter().map(encode_value).collect();
                json!({ TYPE_FIELD: "array", VALUE_FIELD: items })
            }
        }
        DBusValue::Dict {
            key_type,
            value_type,
            entries,
        } => {
            if entries.is_empty() {
                return json!({
                    TYPE_FIELD: "dict",
                    KEY_TYPE_FIELD: key_type.name(),
                    VALUE_TYPE_FIELD: encode_value_type(value_type),
                });
            }
            let mut map = Map::with_capacity(entries.len());
            for (key, item) in entries {
                map.insert(key.to_key_string().unwrap_or_default(), encode_value(item));
            }
            let mut object = Map::new();
            object.insert(TYPE_FIELD.to_owned(), Json::from("dict"));
            if *key_type != PrimitiveType::Str {
                object.insert(KEY_TYPE_FIELD.to_owned(), Json::from(key_type.name()));
            }
            object.insert(VALUE_FIELD.to_owned(), Json::Object(map));
            Json::Object(object)
        }
        DBusValue::Struct(fields) => {
            let items: Vec<Json> = fields.iter().map(encode_value).collect();
            json!({ TYPE_FIELD: "struct", VALUE_FIELD: items })
        }
        DBusValue::U8(v) => tagged(PrimitiveType::U8, Json::from(*v)),
        DBusValue::Bool(v) => tagged(PrimitiveType::Bool, Json::from(*v)),
        DBusValue::I16(v) => tagged(PrimitiveType::I16, Json::from(*v)),
        DBusValue::U16(v) => tagged(PrimitiveType::U16, Json::from(*v)),
        DBusValue::I32(v) => tagged(PrimitiveType::I32, Json::from(*v)),
        DBusValue::U32(v) => tagged(PrimitiveType::U32, Json::from(*v)),
        DBusValue::I64(v) => tagged(PrimitiveType::I64, Json::from(*v)),
        DBusValue::U64(v) => tagged(PrimitiveType::U64, Json::from(*v)),
        DBusValue::F64(v) => tagged(PrimitiveType::F64, Json::from(*v)),
        DBusValue::Fd(v) => tagged(PrimitiveType::Fd, Json::from(*v)),
        DBusValue::Str(v) => tagged(PrimitiveType::Str, Json::from(v.as_str())),
        DBusValue::Signature(v) => tagged(PrimitiveType::Signature, Json::from(v.as_str())),
        DBusValue::ObjectPath(v) => tagged(PrimitiveType::ObjectPath, Json::from(v.as_str())),
    }
}

fn tagged(ty: PrimitiveType, raw: Json) -> Json {
    json!({ TYPE_FIELD: ty.name(), VALUE_FIELD: raw })
}

/// Encodes a type descriptor in the format described in the module docs.
pub fn encode_value_type(value_type: &ValueType) -> Json {
    match value_type {
        ValueType::Primitive(ty) => Json::from(ty.name()),
        ValueType::Variant => Json::from("variant"),
        ValueType::Array(element) => json!({ "array": { VALUE_TYPE_FIELD: encode_value_type(element) } }),
        ValueType::Dict(key, value) => json!({
            "dict": { KEY_TYPE_FIELD: key.name(), VALUE_TYPE_FIELD: encode_value_type(value) }
        }),
        ValueType::Struct(fields) => {
            let fields: Vec<Json> = fields.iter().map(encode_value_type).collect();
            json!({ "struct": { "fields": fields } })
        }
    }
}

// ── serde integration ─────────────────────────────────────────────────────────

impl Serialize for DBusValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        encode_value(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DBusValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = Json::deserialize(deserializer)?;
        decode_value(&json).map_err(serde::de::Error::custom)
    }
}

impl Serialize for ValueType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        encode_value_type(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ValueType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = Json::deserialize(deserializer)?;
        decode_value_type(&json).map_err(serde::de::Error::custom)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

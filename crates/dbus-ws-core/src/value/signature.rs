//! D-Bus type signature parser.
//!
//! A recursive-descent parser over the signature alphabet.  It enforces the
//! container limits of the D-Bus wire format: at most 32 nested arrays, at
//! most 32 nested structs, non-empty structs, and dict entries whose key is a
//! basic type.  Dict entries are only valid directly inside an array.

use super::{PrimitiveType, ValueType};

/// Maximum nesting of array types in one signature.
pub const MAX_ARRAY_DEPTH: usize = 32;

/// Maximum nesting of struct types in one signature.
pub const MAX_STRUCT_DEPTH: usize = 32;

/// Maximum length of a signature string.
pub const MAX_SIGNATURE_LEN: usize = 255;

/// Parses a signature made of zero or more complete types.
///
/// # Errors
///
/// Returns a human-readable reason when the signature is malformed.
pub fn parse_types(signature: &str) -> Result<Vec<ValueType>, String> {
    if signature.len() > MAX_SIGNATURE_LEN {
        return Err(format!("longer than {MAX_SIGNATURE_LEN} characters"));
    }

    let mut parser = Parser::new(signature);
    let mut types = Vec::new();
    while !parser.at_end() {
        types.push(parser.complete_type(0, 0)?);
    }
    Ok(types)
}

/// Parses a signature that must contain exactly one complete type.
///
/// # Errors
///
/// Returns a human-readable reason when the signature is malformed or does
/// not hold exactly one type.
pub fn parse_single(signature: &str) -> Result<ValueType, String> {
    let mut types = parse_types(signature)?;
    match types.len() {
        1 => Ok(types.remove(0)),
        0 => Err("empty signature".to_owned()),
        n => Err(format!("expected a single complete type, found {n}")),
    }
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(signature: &'a str) -> Self {
        Self {
            bytes: signature.as_bytes(),
            pos: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    fn complete_type(&mut self, arrays: usize, structs: usize) -> Result<ValueType, String> {
        let offset = self.pos;
        let code = self.bump().ok_or("unexpected end of signature")?;

        match code {
            b'v' => Ok(ValueType::Variant),
            b'a' => {
                if arrays >= MAX_ARRAY_DEPTH {
                    return Err(format!("more than {MAX_ARRAY_DEPTH} nested arrays"));
                }
                if self.peek() == Some(b'{') {
                    self.pos += 1;
                    self.dict_entry(arrays + 1, structs)
                } else {
                    let element = self.complete_type(arrays + 1, structs)?;
                    Ok(ValueType::Array(Box::new(element)))
                }
            }
            b'(' => {
                if structs >= MAX_STRUCT_DEPTH {
                    return Err(format!("more than {MAX_STRUCT_DEPTH} nested structs"));
                }
                let mut fields = Vec::new();
                loop {
                    match self.peek() {
                        Some(b')') => {
                            self.pos += 1;
                            break;
                        }
                        None => return Err(format!("unterminated struct opened at offset {offset}")),
                        Some(_) => fields.push(self.complete_type(arrays, structs + 1)?),
                    }
                }
                if fields.is_empty() {
                    return Err(format!("empty struct at offset {offset}"));
                }
                Ok(ValueType::Struct(fields))
            }
            other => PrimitiveType::from_code(char::from(other))
                .map(ValueType::Primitive)
                .ok_or_else(|| format!("unexpected '{}' at offset {offset}", char::from(other))),
        }
    }

    fn dict_entry(&mut self, arrays: usize, structs: usize) -> Result<ValueType, String> {
        let offset = self.pos;
        let key = match self.complete_type(arrays, structs)? {
            ValueType::Primitive(key) => key,
            other => {
                return Err(format!(
                    "dict key at offset {offset} must be a basic type, found '{other}'"
                ))
            }
        };
        let value = self.complete_type(arrays, structs)?;
        match self.bump() {
            Some(b'}') => Ok(ValueType::Dict(key, Box::new(value))),
            _ => Err(format!("dict entry opened before offset {offset} is not closed")),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Canonical numeric taxonomy and textual/numeric/enum coercion.

use std::collections::BTreeMap;
use std::fmt;

use crate::bigint::{BigDecimal, BigInt};
use crate::bitio::BitSet;
use crate::error::{Error, Result};

/// The closed set of wire/field data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Byte,
    Short,
    Integer,
    Long,
    Float,
    Double,
    BigInteger,
    BigDecimal,
    String,
    BitSet,
    Boolean,
}

impl DataType {
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Byte => "Byte",
            DataType::Short => "Short",
            DataType::Integer => "Integer",
            DataType::Long => "Long",
            DataType::Float => "Float",
            DataType::Double => "Double",
            DataType::BigInteger => "BigInteger",
            DataType::BigDecimal => "BigDecimal",
            DataType::String => "String",
            DataType::BitSet => "BitSet",
            DataType::Boolean => "Boolean",
        }
    }
}

/// The dynamic value an object's field can hold. Templates are built at
/// runtime, so decoded objects live as this tree rather than as
/// statically generated structs.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Byte(i8),
    Short(i16),
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    BigInteger(BigInt),
    BigDecimal(BigDecimal),
    String(String),
    BitSet(BitSet),
    Boolean(bool),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Object(ObjectValue),
    Null,
}

/// A dynamically-typed decoded (or to-be-encoded) message. `type_name`
/// is the stable key templates and choice alternatives are registered
/// under.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectValue {
    pub type_name: String,
    pub fields: BTreeMap<String, Value>,
}

impl ObjectValue {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Byte(v) => write!(f, "{v}"),
            Value::Short(v) => write!(f, "{v}"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::BigInteger(v) => write!(f, "{v}"),
            Value::BigDecimal(v) => write!(f, "{}", v.to_display_string()),
            Value::String(v) => write!(f, "{v}"),
            Value::BitSet(v) => write!(f, "BitSet({} bits)", v.len()),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Bytes(v) => write!(f, "{v:02x?}"),
            Value::Array(v) => write!(f, "{v:?}"),
            Value::Object(v) => write!(f, "{}{{..}}", v.type_name),
        }
    }
}

/// Converts between the canonical data types.
pub struct ValueCaster;

impl ValueCaster {
    /// Narrows a signed 128-bit integer decoded off the wire into the
    /// declared field's numeric `DataType`, if it fits.
    pub fn narrow_integer(value: i128, target: DataType) -> Result<Value> {
        match target {
            DataType::Byte => i8::try_from(value)
                .map(Value::Byte)
                .map_err(|_| Self::cast_err(value, "Long", target)),
            DataType::Short => i16::try_from(value)
                .map(Value::Short)
                .map_err(|_| Self::cast_err(value, "Long", target)),
            DataType::Integer => i32::try_from(value)
                .map(Value::Integer)
                .map_err(|_| Self::cast_err(value, "Long", target)),
            DataType::Long => i64::try_from(value)
                .map(Value::Long)
                .map_err(|_| Self::cast_err(value, "Long", target)),
            DataType::BigInteger => Ok(Value::BigInteger(BigInt::from_i128(value))),
            _ => Err(Self::cast_err(value, "Long", target)),
        }
    }

    /// Truncates a value read off the wire into the declared numeric
    /// `DataType`, reinterpreting bits rather than range-checking: the
    /// wire is read as an unsigned magnitude (`Binding::Integer`
    /// defaults to unsigned per spec §9 "default to unsigned unless the
    /// declared field type is a signed native integer"), but native Rust
    /// integer types are always signed, so a byte like `0xEE` must land
    /// as `-18i8`, not fail, the same way a Java narrowing cast
    /// (`(byte) 0xEE`) would.
    pub fn wrap_integer(value: i128, target: DataType) -> Result<Value> {
        match target {
            DataType::Byte => Ok(Value::Byte(value as i8)),
            DataType::Short => Ok(Value::Short(value as i16)),
            DataType::Integer => Ok(Value::Integer(value as i32)),
            DataType::Long => Ok(Value::Long(value as i64)),
            DataType::BigInteger => Ok(Value::BigInteger(BigInt::from_i128(value))),
            _ => Err(Self::cast_err(value, "Long", target)),
        }
    }

    fn cast_err(value: i128, from: &'static str, to: DataType) -> Error {
        Error::ValueCast {
            value: value.to_string(),
            from,
            to: to.name(),
        }
    }

    pub fn to_i128(value: &Value) -> Result<i128> {
        match value {
            Value::Byte(v) => Ok(*v as i128),
            Value::Short(v) => Ok(*v as i128),
            Value::Integer(v) => Ok(*v as i128),
            Value::Long(v) => Ok(*v as i128),
            Value::BigInteger(v) => v
                .to_i128()
                .ok_or_else(|| Self::cast_err(0, "BigInteger", DataType::Long)),
            Value::String(s) => BigInt::parse_decimal(s)
                .and_then(|b| b.to_i128())
                .ok_or_else(|| Error::ValueCast {
                    value: s.clone(),
                    from: "String",
                    to: "Long",
                }),
            other => Err(Error::ValueCast {
                value: other.to_string(),
                from: "?",
                to: "Long",
            }),
        }
    }

    /// Strict decimal-number detection grammar: optional sign, then one
    /// or more digits.
    pub fn looks_like_decimal(s: &str) -> bool {
        let s = s.trim();
        let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
        !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
    }

    pub fn parse_boolean(s: &str) -> Option<bool> {
        match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        }
    }

    /// Parses a string into the requested `DataType` (used by
    /// converters and the evaluator boundary).
    pub fn parse_string(s: &str, target: DataType) -> Result<Value> {
        match target {
            DataType::String => Ok(Value::String(s.to_string())),
            DataType::Boolean => Self::parse_boolean(s).map(Value::Boolean).ok_or_else(|| Error::ValueCast {
                value: s.to_string(),
                from: "String",
                to: "Boolean",
            }),
            DataType::BigInteger | DataType::BigDecimal if !Self::looks_like_decimal(s) && !s.contains('.') => {
                Err(Error::ValueCast {
                    value: s.to_string(),
                    from: "String",
                    to: target.name(),
                })
            }
            DataType::BigInteger => BigInt::parse_decimal(s)
                .map(Value::BigInteger)
                .ok_or_else(|| Error::ValueCast {
                    value: s.to_string(),
                    from: "String",
                    to: "BigInteger",
                }),
            DataType::BigDecimal => {
                let (int_part, frac_part) = s.split_once('.').unwrap_or((s, ""));
                let joined = format!("{int_part}{frac_part}");
                let mantissa = BigInt::parse_decimal(&joined).ok_or_else(|| Error::ValueCast {
                    value: s.to_string(),
                    from: "String",
                    to: "BigDecimal",
                })?;
                Ok(Value::BigDecimal(BigDecimal {
                    mantissa,
                    scale: frac_part.len() as i32,
                }))
            }
            _ if Self::looks_like_decimal(s) => {
                let big = BigInt::parse_decimal(s).ok_or_else(|| Error::ValueCast {
                    value: s.to_string(),
                    from: "String",
                    to: target.name(),
                })?;
                let as_i128 = big.to_i128().ok_or_else(|| Error::ValueCast {
                    value: s.to_string(),
                    from: "String",
                    to: target.name(),
                })?;
                Self::narrow_integer(as_i128, target)
            }
            _ => Err(Error::ValueCast {
                value: s.to_string(),
                from: "String",
                to: target.name(),
            }),
        }
    }
}

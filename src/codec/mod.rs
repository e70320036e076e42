//! Maps each binding kind to its decode/encode behavior. This is a
//! single closed match over [`Binding`] rather than a polymorphic
//! registry — there is exactly one Rust type per wire shape, so a
//! trait-object registry would buy nothing.
//!
//! This module holds the leaf codecs that only need a reader/writer and
//! an evaluator: integers, bit sets, strings, primitive array elements,
//! and choice-prefix selection. Object/Array/ListSeparated recursion
//! into a nested template's own field sequence is driven by
//! [`crate::engine::Engine`], since it needs the template registry.

pub mod choice;

use crate::bigint::BigInt;
use crate::bitio::{BitReader, BitWriter, ByteOrder, Charset};
use crate::error::{Error, Result};
use crate::evaluator::Evaluator;
use crate::value::{DataType, Value, ValueCaster};

pub fn primitive_bit_width(dt: DataType) -> Result<usize> {
    match dt {
        DataType::Byte => Ok(8),
        DataType::Short => Ok(16),
        DataType::Integer | DataType::Float => Ok(32),
        DataType::Long | DataType::Double => Ok(64),
        other => Err(Error::UnsupportedType(other.name())),
    }
}

pub fn decode_integer(reader: &mut BitReader, evaluator: &mut dyn Evaluator, root: &Value, size: &str, byte_order: ByteOrder, signed: bool, field_type: DataType) -> Result<Value> {
    let n_bits = evaluator.evaluate_size(size, root)?;
    if n_bits == 0 {
        return ValueCaster::wrap_integer(0, field_type);
    }
    let big = reader.read_big_integer(n_bits, byte_order, signed)?;
    match big.to_i128() {
        Some(v) if n_bits <= 64 => ValueCaster::wrap_integer(v, field_type),
        _ => Ok(Value::BigInteger(big)),
    }
}

pub fn encode_integer(writer: &mut BitWriter, evaluator: &mut dyn Evaluator, root: &Value, size: &str, byte_order: ByteOrder, value: &Value) -> Result<()> {
    let n_bits = evaluator.evaluate_size(size, root)?;
    if n_bits == 0 {
        return Ok(());
    }
    let big = match value {
        Value::BigInteger(b) => b.clone(),
        other => BigInt::from_i128(ValueCaster::to_i128(other)?),
    };
    writer.write_big_integer(&big, n_bits, byte_order);
    Ok(())
}

pub fn decode_bitset(reader: &mut BitReader, evaluator: &mut dyn Evaluator, root: &Value, size: &str) -> Result<Value> {
    let n_bits = evaluator.evaluate_size(size, root)?;
    Ok(Value::BitSet(reader.read_bits(n_bits)?))
}

pub fn encode_bitset(writer: &mut BitWriter, value: &Value) -> Result<()> {
    match value {
        Value::BitSet(set) => {
            writer.write_bits(set);
            Ok(())
        }
        other => Err(Error::ValueCast {
            value: other.to_string(),
            from: "?",
            to: "BitSet",
        }),
    }
}

pub fn decode_string_fixed(reader: &mut BitReader, evaluator: &mut dyn Evaluator, root: &Value, size: &str, charset: Charset, field_name: &str) -> Result<Value> {
    let n = evaluator.evaluate_size(size, root)?;
    reader
        .read_text(n, charset)
        .map(Value::String)
        .map_err(|_| Error::Charset { field: field_name.to_string() })
}

pub fn encode_string_fixed(writer: &mut BitWriter, charset: Charset, value: &Value) -> Result<()> {
    let text = value.to_string();
    writer.write_text(&text, charset);
    Ok(())
}

pub fn decode_string_terminated(reader: &mut BitReader, terminator: u8, consume: bool, charset: Charset, field_name: &str) -> Result<Value> {
    reader
        .read_text_until(terminator, charset, consume)
        .map(Value::String)
        .map_err(|_| Error::Charset { field: field_name.to_string() })
}

pub fn encode_string_terminated(writer: &mut BitWriter, terminator: u8, charset: Charset, value: &Value) -> Result<()> {
    let text = value.to_string();
    writer.write_text(&text, charset);
    writer.write_bytes(&[terminator]);
    Ok(())
}

pub fn decode_primitive_element(reader: &mut BitReader, element_type: DataType) -> Result<Value> {
    let width = primitive_bit_width(element_type)?;
    match element_type {
        DataType::Float => Ok(Value::Float(reader.read_float(ByteOrder::Big)?)),
        DataType::Double => Ok(Value::Double(reader.read_double(ByteOrder::Big)?)),
        other => {
            let big = reader.read_big_integer(width, ByteOrder::Big, true)?;
            ValueCaster::wrap_integer(big.to_i128().unwrap_or(0), other)
        }
    }
}

pub fn encode_primitive_element(writer: &mut BitWriter, element_type: DataType, value: &Value) -> Result<()> {
    match (element_type, value) {
        (DataType::Float, Value::Float(v)) => writer.write_float(*v, ByteOrder::Big),
        (DataType::Double, Value::Double(v)) => writer.write_double(*v, ByteOrder::Big),
        (other, value) => {
            let width = primitive_bit_width(other)?;
            writer.write_big_integer(&BigInt::from_i128(ValueCaster::to_i128(value)?), width, ByteOrder::Big);
        }
    }
    Ok(())
}

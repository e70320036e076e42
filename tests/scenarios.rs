//! End-to-end scenarios exercising the façade against its wire shapes:
//! binary framing with a checksum, ASCII terminator framing,
//! prefix-discriminated object choice, array bindings, and scanner
//! resynchronization.

use std::sync::Arc;

use assert_matches::assert_matches;
use tplcodec::bitio::{ByteOrder, Charset};
use tplcodec::checksum::ChecksumRegistry;
use tplcodec::convert::{ConvertRegistry, Validator};
use tplcodec::error::Error;
use tplcodec::evaluator::MapEvaluator;
use tplcodec::template::builder::{integer_be, string_fixed, string_terminated};
use tplcodec::template::{
    Binding, ChoiceAlternative, ChoiceSpec, SeparatedAlternative, SeparatedChoiceSpec, Template, TemplateBuilder,
};
use tplcodec::value::DataType;
use tplcodec::{Engine, EngineBuilder, ObjectValue, Value};

fn engine_for(templates: Vec<Template>) -> Engine {
    let mut builder = EngineBuilder::new().checksums(ChecksumRegistry::with_standard_presets());
    for template in templates {
        builder = builder.template(template);
    }
    builder.build().unwrap()
}

fn ack_template() -> Template {
    TemplateBuilder::new("Ack")
        .header(vec![b"+ACK".to_vec()], Charset::Ascii, None)
        .field("marker", DataType::String, string_fixed("4", Charset::Ascii))
        .add()
        .field("messageType", DataType::Byte, integer_be("8"))
        .add()
        .field("deviceTypeCode", DataType::Byte, integer_be("8"))
        .add()
        .field("correlationId", DataType::Integer, integer_be("16"))
        .add()
        .field(
            "checksum",
            DataType::Long,
            Binding::Checksum {
                algorithm: "bsd-16".to_string(),
                skip_start: 0,
                skip_end: 2,
                byte_order: ByteOrder::Big,
            },
        )
        .add()
        .build()
        .unwrap()
}

#[test]
fn binary_ack_round_trips_with_bsd16_checksum() {
    let engine = engine_for(vec![ack_template()]);
    let mut evaluator = MapEvaluator::new();

    let mut object = ObjectValue::new("Ack");
    object.set("marker", Value::String("+ACK".to_string()));
    object.set("messageType", Value::Byte(6));
    object.set("deviceTypeCode", Value::Byte(0x46));
    object.set("correlationId", Value::Integer(0xffff));
    object.set("checksum", Value::Long(0));

    let composed = engine.compose(&Value::Object(object), &mut evaluator).unwrap();
    assert_eq!(&composed[0..4], b"+ACK");

    let parsed = engine.parse(&composed, &mut evaluator);
    assert_eq!(parsed.len(), 1);
    let decoded = parsed[0].result.as_ref().expect("valid checksum decodes");
    match decoded {
        Value::Object(obj) => {
            assert_eq!(obj.get("marker"), Some(&Value::String("+ACK".to_string())));
            assert_eq!(obj.get("messageType"), Some(&Value::Byte(6)));
            assert_eq!(obj.get("correlationId"), Some(&Value::Integer(0xffff)));
        }
        other => panic!("expected object, got {other}"),
    }
}

fn ascii_ack_template() -> Template {
    TemplateBuilder::new("AsciiAck")
        .header(vec![b"+ACK:".to_vec()], Charset::Ascii, None)
        .field("marker", DataType::String, string_fixed("5", Charset::Ascii))
        .add()
        .field("command", DataType::String, string_terminated(b',', true, Charset::Ascii))
        .add()
        .field("imei", DataType::String, string_terminated(b',', true, Charset::Ascii))
        .add()
        .field("sequence", DataType::String, string_terminated(b',', true, Charset::Ascii))
        .add()
        .field("payload", DataType::String, string_terminated(b'$', true, Charset::Ascii))
        .add()
        .build()
        .unwrap()
}

#[test]
fn ascii_framed_message_round_trips_with_terminator_fields() {
    let engine = engine_for(vec![ascii_ack_template()]);
    let mut evaluator = MapEvaluator::new();

    let mut object = ObjectValue::new("AsciiAck");
    object.set("marker", Value::String("+ACK:".to_string()));
    object.set("command", Value::String("GTFRI".to_string()));
    object.set("imei", Value::String("123456789012345".to_string()));
    object.set("sequence", Value::String("0001".to_string()));
    object.set("payload", Value::String("20230401083639".to_string()));

    let composed = engine.compose(&Value::Object(object), &mut evaluator).unwrap();
    assert_eq!(
        String::from_utf8(composed.clone()).unwrap(),
        "+ACK:GTFRI,123456789012345,0001,20230401083639$"
    );

    let parsed = engine.parse(&composed, &mut evaluator);
    assert_eq!(parsed.len(), 1);
    let decoded = parsed[0].result.as_ref().unwrap();
    match decoded {
        Value::Object(obj) => {
            assert_eq!(obj.get("imei"), Some(&Value::String("123456789012345".to_string())));
            assert_eq!(obj.get("payload"), Some(&Value::String("20230401083639".to_string())));
        }
        other => panic!("expected object, got {other}"),
    }
}

fn choice_templates() -> Vec<Template> {
    let a = TemplateBuilder::new("AltA")
        .field("value", DataType::Integer, integer_be("8"))
        .add()
        .build()
        .unwrap();
    let b = TemplateBuilder::new("AltB")
        .field("value", DataType::Integer, integer_be("16"))
        .add()
        .build()
        .unwrap();

    let choice = ChoiceSpec {
        prefix_size: 2,
        byte_order: ByteOrder::Big,
        alternatives: vec![
            ChoiceAlternative {
                condition: Some("#prefix == 0".to_string()),
                prefix_value: Some(0),
                type_name: "AltA".to_string(),
            },
            ChoiceAlternative {
                condition: Some("#prefix == 1".to_string()),
                prefix_value: Some(1),
                type_name: "AltB".to_string(),
            },
        ],
        default_type: None,
    };

    let envelope = TemplateBuilder::new("Envelope")
        .header(vec![b"\xEE".to_vec()], Charset::Ascii, None)
        .field("marker", DataType::Byte, integer_be("8"))
        .add()
        .field(
            "body",
            DataType::String,
            Binding::Object {
                type_name: "AltA".to_string(),
                choice: Some(choice),
            },
        )
        .add()
        .build()
        .unwrap();

    vec![envelope, a, b]
}

#[test]
fn two_bit_prefix_choice_resolves_second_alternative() {
    let engine = engine_for(choice_templates());
    let mut evaluator = MapEvaluator::new();

    // marker byte (0xEE) + 2-bit prefix "01" then 16-bit payload, all
    // packed MSB-first starting a fresh byte for the body.
    let buf = [0xEEu8, 0b01_000000, 0x00, 0x2A];
    let parsed = engine.parse(&buf, &mut evaluator);
    assert_eq!(parsed.len(), 1);
    let decoded = parsed[0].result.as_ref().unwrap();
    match decoded {
        Value::Object(obj) => match obj.get("body") {
            Some(Value::Object(body)) => {
                assert_eq!(body.type_name, "AltB");
                assert_eq!(body.get("value"), Some(&Value::Integer(0x0280)));
            }
            other => panic!("expected nested object, got {other:?}"),
        },
        other => panic!("expected object, got {other}"),
    }
}

#[test]
fn choice_round_trips_through_encode() {
    let engine = engine_for(choice_templates());
    let mut evaluator = MapEvaluator::new();

    let mut body = ObjectValue::new("AltB");
    body.set("value", Value::Integer(0x1234));
    let mut envelope = ObjectValue::new("Envelope");
    envelope.set("marker", Value::Byte(0x01));
    envelope.set("body", Value::Object(body));

    let composed = engine.compose(&Value::Object(envelope), &mut evaluator).unwrap();
    let parsed = engine.parse(&composed, &mut evaluator);
    assert_eq!(parsed.len(), 1);
    let decoded = parsed[0].result.as_ref().unwrap();
    match decoded {
        Value::Object(obj) => match obj.get("body") {
            Some(Value::Object(body)) => {
                assert_eq!(body.type_name, "AltB");
                assert_eq!(body.get("value"), Some(&Value::Integer(0x1234)));
            }
            other => panic!("expected nested object, got {other:?}"),
        },
        other => panic!("expected object, got {other}"),
    }
}

fn list_separated_templates() -> Vec<Template> {
    let item = TemplateBuilder::new("Item")
        .header(vec![b"I:".to_vec()], Charset::Ascii, None)
        .field("marker", DataType::String, string_fixed("2", Charset::Ascii))
        .add()
        .field("value", DataType::Integer, integer_be("8"))
        .add()
        .build()
        .unwrap();

    let choice = SeparatedChoiceSpec {
        terminator: b';',
        charset: Charset::Ascii,
        alternatives: vec![SeparatedAlternative {
            condition: None,
            header_string: "I:".to_string(),
            type_name: "Item".to_string(),
        }],
    };

    let list = TemplateBuilder::new("ItemList")
        .header(vec![b"L:".to_vec()], Charset::Ascii, None)
        .field("marker", DataType::String, string_fixed("2", Charset::Ascii))
        .add()
        .field(
            "items",
            DataType::String,
            Binding::ListSeparated {
                type_name: "Item".to_string(),
                choice,
            },
        )
        .add()
        .build()
        .unwrap();

    vec![list, item]
}

#[test]
fn list_separated_decodes_until_unrecognized_header() {
    let engine = engine_for(list_separated_templates());
    let mut evaluator = MapEvaluator::new();

    let mut buf = b"L:".to_vec();
    buf.extend_from_slice(b"I:");
    buf.push(1);
    buf.push(b';');
    buf.extend_from_slice(b"I:");
    buf.push(2);
    buf.push(b';');
    buf.extend_from_slice(b"X:tail"); // not a recognized item header, stops the list

    let parsed = engine.parse(&buf, &mut evaluator);
    assert_eq!(parsed.len(), 1);
    let decoded = parsed[0].result.as_ref().unwrap();
    match decoded {
        Value::Object(obj) => match obj.get("items") {
            Some(Value::Array(items)) => assert_eq!(items.len(), 2),
            other => panic!("expected array, got {other:?}"),
        },
        other => panic!("expected object, got {other}"),
    }
}

fn array_primitive_template() -> Template {
    TemplateBuilder::new("Samples")
        .header(vec![b"S:".to_vec()], Charset::Ascii, None)
        .field("marker", DataType::String, string_fixed("2", Charset::Ascii))
        .add()
        .field("count", DataType::Byte, integer_be("8"))
        .add()
        .field(
            "samples",
            DataType::String,
            Binding::ArrayPrimitive {
                element_type: DataType::Byte,
                size: "count".to_string(),
            },
        )
        .add()
        .build()
        .unwrap()
}

#[test]
fn array_primitive_round_trips() {
    let engine = engine_for(vec![array_primitive_template()]);
    let mut evaluator = MapEvaluator::new();

    let mut object = ObjectValue::new("Samples");
    object.set("marker", Value::String("S:".to_string()));
    object.set("count", Value::Byte(3));
    object.set(
        "samples",
        Value::Array(vec![Value::Byte(1), Value::Byte(2), Value::Byte(3)]),
    );

    let composed = engine.compose(&Value::Object(object), &mut evaluator).unwrap();
    let parsed = engine.parse(&composed, &mut evaluator);
    assert_eq!(parsed.len(), 1);
    let decoded = parsed[0].result.as_ref().unwrap();
    match decoded {
        Value::Object(obj) => assert_eq!(
            obj.get("samples"),
            Some(&Value::Array(vec![Value::Byte(1), Value::Byte(2), Value::Byte(3)]))
        ),
        other => panic!("expected object, got {other}"),
    }
}

#[test]
fn scanner_finds_two_messages_and_reports_one_failure() {
    let engine = engine_for(vec![ack_template()]);
    let mut evaluator = MapEvaluator::new();

    let mut first = ObjectValue::new("Ack");
    first.set("marker", Value::String("+ACK".to_string()));
    first.set("messageType", Value::Byte(1));
    first.set("deviceTypeCode", Value::Byte(0x10));
    first.set("correlationId", Value::Integer(1));
    first.set("checksum", Value::Long(0));
    let mut first_bytes = engine.compose(&Value::Object(first.clone()), &mut evaluator).unwrap();
    let last = first_bytes.len() - 1;
    first_bytes[last] ^= 0xFF;

    let mut second = ObjectValue::new("Ack");
    second.set("marker", Value::String("+ACK".to_string()));
    second.set("messageType", Value::Byte(2));
    second.set("deviceTypeCode", Value::Byte(0x10));
    second.set("correlationId", Value::Integer(2));
    second.set("checksum", Value::Long(0));
    let second_bytes = engine.compose(&Value::Object(second), &mut evaluator).unwrap();

    let mut buf = first_bytes;
    buf.extend_from_slice(&second_bytes);

    let parsed = engine.parse(&buf, &mut evaluator);
    assert_eq!(parsed.len(), 2);
    assert!(parsed[0].result.is_err());
    assert_eq!(parsed[1].offset, buf.len() - second_bytes.len());
    assert!(parsed[1].result.is_ok());
}

#[test]
fn empty_buffer_yields_no_messages() {
    let engine = engine_for(vec![ack_template()]);
    let mut evaluator = MapEvaluator::new();
    assert!(engine.parse(&[], &mut evaluator).is_empty());
}

#[test]
fn unmatched_header_yields_no_messages() {
    let engine = engine_for(vec![ack_template()]);
    let mut evaluator = MapEvaluator::new();
    let parsed = engine.parse(b"no header here at all", &mut evaluator);
    assert!(parsed.is_empty());
}

/// CRC-32 of the payload `"123456789"` is the well known reference
/// vector `0xCBF43926`; a template whose checksum field covers the
/// whole payload must emit exactly those four bytes.
#[test]
fn crc32_checksum_matches_reference_vector() {
    let template = TemplateBuilder::new("Crc32Message")
        .field("payload", DataType::String, string_fixed("9", Charset::Ascii))
        .add()
        .field(
            "checksum",
            DataType::Long,
            Binding::Checksum {
                algorithm: "crc-32".to_string(),
                skip_start: 0,
                skip_end: 4,
                byte_order: ByteOrder::Big,
            },
        )
        .add()
        .build()
        .unwrap();

    let engine = engine_for(vec![template]);
    let mut evaluator = MapEvaluator::new();

    let mut object = ObjectValue::new("Crc32Message");
    object.set("payload", Value::String("123456789".to_string()));
    object.set("checksum", Value::Long(0));

    let composed = engine.compose(&Value::Object(object), &mut evaluator).unwrap();
    assert_eq!(composed, [b"123456789".as_slice(), &[0xCB, 0xF4, 0x39, 0x26]].concat());
}

/// When `skipStart + skipEnd >= totalLen` the checksum is computed over
/// a zero-byte range, which the CRC algorithm resolves to
/// `initial ^ xorOut` (here `0x0000 ^ 0x0000` for XMODEM).
#[test]
fn checksum_over_degenerate_range_uses_initial_xor_out() {
    let template = TemplateBuilder::new("TinyMessage")
        .field(
            "checksum",
            DataType::Long,
            Binding::Checksum {
                algorithm: "crc-16-ccitt-xmodem".to_string(),
                skip_start: 0,
                skip_end: 2,
                byte_order: ByteOrder::Big,
            },
        )
        .add()
        .build()
        .unwrap();

    let engine = engine_for(vec![template]);
    let mut evaluator = MapEvaluator::new();

    let mut object = ObjectValue::new("TinyMessage");
    object.set("checksum", Value::Long(0));
    let composed = engine.compose(&Value::Object(object), &mut evaluator).unwrap();
    assert_eq!(composed, vec![0x00, 0x00]);
}

/// A validator rejecting an out-of-range decoded value raises
/// `Error::Validation`.
struct MaxByteValidator(i8);

impl Validator for MaxByteValidator {
    fn is_valid(&self, value: &Value) -> tplcodec::Result<bool> {
        match value {
            Value::Byte(v) => Ok(*v <= self.0),
            _ => Ok(true),
        }
    }
}

#[test]
fn validator_rejection_surfaces_as_decode_error() {
    let template = TemplateBuilder::new("Bounded")
        .header(vec![b"B:".to_vec()], Charset::Ascii, None)
        .field("marker", DataType::String, string_fixed("2", Charset::Ascii))
        .add()
        .field("level", DataType::Byte, integer_be("8"))
        .validator("max-level")
        .add()
        .build()
        .unwrap();

    let mut converters = ConvertRegistry::new();
    converters.register_validator("max-level", Arc::new(MaxByteValidator(10)));

    let engine = EngineBuilder::new()
        .checksums(ChecksumRegistry::with_standard_presets())
        .converters(converters)
        .template(template)
        .build()
        .unwrap();
    let mut evaluator = MapEvaluator::new();

    let mut buf = b"B:".to_vec();
    buf.push(100);
    let parsed = engine.parse(&buf, &mut evaluator);
    assert_eq!(parsed.len(), 1);
    let positioned = parsed[0].result.as_ref().expect_err("expected validation error");
    assert_matches!(positioned.source, Error::Validation { .. });
}

/// Packs 8 bytes of BCD nibbles (16 digits) into a 15-digit IMEI
/// string, dropping the leading padding nibble; inverts on encode.
struct ImeiConverter;

impl tplcodec::convert::Converter for ImeiConverter {
    fn decode(&self, wire: &Value) -> tplcodec::Result<Value> {
        let bytes = match wire {
            Value::BitSet(set) => set.as_bytes().to_vec(),
            other => return Err(Error::Data(format!("imei converter expects a bit set, got {other}"))),
        };
        let mut digits = String::with_capacity(16);
        for byte in &bytes {
            digits.push((b'0' + (byte >> 4)) as char);
            digits.push((b'0' + (byte & 0x0F)) as char);
        }
        Ok(Value::String(digits[1..].to_string()))
    }

    fn encode(&self, field: &Value) -> tplcodec::Result<Value> {
        let text = match field {
            Value::String(s) => s,
            other => return Err(Error::Data(format!("imei converter expects a string, got {other}"))),
        };
        let padded = format!("0{text}");
        let digits: Vec<u8> = padded.bytes().map(|b| b - b'0').collect();
        let mut set = tplcodec::bitio::BitSet::with_len(64);
        let bytes: Vec<u8> = digits.chunks(2).map(|pair| (pair[0] << 4) | pair[1]).collect();
        for (i, byte) in bytes.iter().enumerate() {
            for bit in 0..8 {
                set.set(i * 8 + bit, (byte >> bit) & 1 != 0);
            }
        }
        Ok(Value::BitSet(set))
    }
}

/// A telematics-shaped message in the style of spec.md §8 scenario 1:
/// a header/type/mask preamble, a nested `protocolVersion {major,
/// minor}` object, a BCD-packed IMEI converted to its 15-digit
/// string form, and a trailing BSD-16 checksum.
fn telematics_ack_templates() -> Vec<Template> {
    let protocol_version = TemplateBuilder::new("ProtocolVersion")
        .field("major", DataType::Byte, integer_be("8"))
        .add()
        .field("minor", DataType::Byte, integer_be("8"))
        .add()
        .build()
        .unwrap();

    let ack = TemplateBuilder::new("TelematicsAck")
        .header(vec![b"+ACK".to_vec()], Charset::Ascii, None)
        .field("messageHeader", DataType::String, string_fixed("4", Charset::Ascii))
        .add()
        .field("messageType", DataType::Byte, integer_be("8"))
        .add()
        .field("deviceTypeCode", DataType::Byte, integer_be("8"))
        .add()
        .field(
            "protocolVersion",
            DataType::String,
            Binding::Object {
                type_name: "ProtocolVersion".to_string(),
                choice: None,
            },
        )
        .add()
        .field("imei", DataType::String, Binding::BitSet { size: "64".to_string() })
        .converter("imei")
        .add()
        .field("correlationId", DataType::Integer, integer_be("16"))
        .add()
        .field(
            "checksum",
            DataType::Long,
            Binding::Checksum {
                algorithm: "bsd-16".to_string(),
                skip_start: 0,
                skip_end: 2,
                byte_order: ByteOrder::Big,
            },
        )
        .add()
        .build()
        .unwrap();

    vec![ack, protocol_version]
}

#[test]
fn telematics_ack_round_trips_with_nested_object_and_imei_converter() {
    let mut converters = ConvertRegistry::new();
    converters.register_converter("imei", Arc::new(ImeiConverter));

    let mut builder = EngineBuilder::new()
        .checksums(ChecksumRegistry::with_standard_presets())
        .converters(converters);
    for template in telematics_ack_templates() {
        builder = builder.template(template);
    }
    let engine = builder.build().unwrap();
    let mut evaluator = MapEvaluator::new();

    let mut version = ObjectValue::new("ProtocolVersion");
    version.set("major", Value::Byte(1));
    version.set("minor", Value::Byte(10));

    let mut object = ObjectValue::new("TelematicsAck");
    object.set("messageHeader", Value::String("+ACK".to_string()));
    object.set("messageType", Value::Byte(6));
    object.set("deviceTypeCode", Value::Byte(0x46));
    object.set("protocolVersion", Value::Object(version));
    object.set("imei", Value::String("123456789012345".to_string()));
    object.set("correlationId", Value::Integer(0xffff));
    object.set("checksum", Value::Long(0));

    let composed = engine.compose(&Value::Object(object), &mut evaluator).unwrap();

    let parsed = engine.parse(&composed, &mut evaluator);
    assert_eq!(parsed.len(), 1);
    let decoded = parsed[0].result.as_ref().expect("valid checksum decodes");
    match decoded {
        Value::Object(obj) => {
            assert_eq!(obj.get("messageHeader"), Some(&Value::String("+ACK".to_string())));
            assert_eq!(obj.get("imei"), Some(&Value::String("123456789012345".to_string())));
            match obj.get("protocolVersion") {
                Some(Value::Object(version)) => {
                    assert_eq!(version.get("major"), Some(&Value::Byte(1)));
                    assert_eq!(version.get("minor"), Some(&Value::Byte(10)));
                }
                other => panic!("expected nested protocolVersion object, got {other:?}"),
            }
        }
        other => panic!("expected object, got {other}"),
    }
}

//! Parser/composer façade: the one entry point applications call. Owns
//! the sealed template, converter and checksum registries and drives
//! the per-field decode and encode sequence, including recursion into
//! nested templates and the checksum verify/patch lifecycle.

use std::sync::Arc;

use crate::bigint::BigInt;
use crate::bitio::{BitReader, BitWriter, ByteOrder};
use crate::checksum::ChecksumRegistry;
use crate::codec::{self, choice};
use crate::convert::{ConverterChoice, ConvertRegistry, NullConverter};
use crate::error::{Error, PositionedError, Result};
use crate::evaluator::Evaluator;
use crate::registry::TemplateRegistry;
use crate::template::{Binding, ChoiceSpec, SeparatedChoiceSpec, Template, TemplateField};
use crate::value::{ObjectValue, Value};

/// Crate-level knobs. `max_scan_advance` bounds how far the scanner
/// hunts for the next candidate header before giving up on a buffer
/// with no further matches.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub strict_checksum: bool,
    pub max_scan_advance: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strict_checksum: true,
            max_scan_advance: None,
        }
    }
}

/// One decoded (or failed) message, with the byte offset it started
/// at.
pub struct ParsedMessage {
    pub offset: usize,
    pub result: std::result::Result<Value, PositionedError>,
}

pub struct Engine {
    templates: TemplateRegistry,
    converters: ConvertRegistry,
    checksums: ChecksumRegistry,
    config: EngineConfig,
}

pub struct EngineBuilder {
    templates: Vec<Template>,
    converters: ConvertRegistry,
    checksums: ChecksumRegistry,
    config: EngineConfig,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            templates: Vec::new(),
            converters: ConvertRegistry::new(),
            checksums: ChecksumRegistry::with_standard_presets(),
            config: EngineConfig::default(),
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn template(mut self, template: Template) -> Self {
        self.templates.push(template);
        self
    }

    pub fn converters(mut self, converters: ConvertRegistry) -> Self {
        self.converters = converters;
        self
    }

    pub fn checksums(mut self, checksums: ChecksumRegistry) -> Self {
        self.checksums = checksums;
        self
    }

    /// Seals the registry, checking that every name a template
    /// references — converter, validator, checksum algorithm — resolves,
    /// and that header-start keys are unique across templates (checked
    /// inside [`TemplateRegistry::build`]).
    pub fn build(self) -> Result<Engine> {
        for template in &self.templates {
            for field in template.fields() {
                if let Some(name) = &field.converter_name {
                    if !self.converters.has_converter(name) {
                        return Err(Error::Annotation {
                            template: template.type_name().clone(),
                            message: format!("field {}: unknown converter {name}", field.name),
                        });
                    }
                }
                for choice in &field.converter_selector {
                    if !self.converters.has_converter(&choice.converter_name) {
                        return Err(Error::Annotation {
                            template: template.type_name().clone(),
                            message: format!("field {}: unknown converter {}", field.name, choice.converter_name),
                        });
                    }
                }
                if let Some(name) = &field.validator_name {
                    if !self.converters.has_validator(name) {
                        return Err(Error::Annotation {
                            template: template.type_name().clone(),
                            message: format!("field {}: unknown validator {name}", field.name),
                        });
                    }
                }
                if let Binding::Checksum { algorithm, .. } = &field.binding {
                    if self.checksums.get(algorithm).is_none() {
                        return Err(Error::Annotation {
                            template: template.type_name().clone(),
                            message: format!("field {}: unknown checksum algorithm {algorithm}", field.name),
                        });
                    }
                }
            }
        }

        Ok(Engine {
            templates: TemplateRegistry::build(self.templates)?,
            converters: self.converters,
            checksums: self.checksums,
            config: self.config,
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Bookkeeping for a checksum field discovered mid-decode/encode: its
/// declared range and where its placeholder bits live, resolved only
/// once the rest of the message is known.
struct PendingChecksum {
    field_name: String,
    algorithm: String,
    skip_start: usize,
    skip_end: usize,
    byte_order: ByteOrder,
    width_bits: u32,
    expected: Option<u64>,
    write_at: Option<usize>,
}

impl Engine {
    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    /// Scans `data` for consecutive messages, resyncing via
    /// [`TemplateRegistry::find_next_message_index`] after a decode
    /// failure or a no-match, never raising past the caller.
    pub fn parse(&self, data: &[u8], evaluator: &mut dyn Evaluator) -> Vec<ParsedMessage> {
        let mut out = Vec::new();
        let mut offset = 0usize;
        let mut advanced = 0usize;

        while offset < data.len() {
            let slice = &data[offset..];
            let mut reader = BitReader::new(slice);
            match self.templates.match_template(&reader) {
                Ok(template) => {
                    tracing::trace!(type_name = %template.type_name(), offset, "matched template");
                    match self.decode_template(template, &mut reader, evaluator) {
                        Ok(value) => {
                            let consumed = reader.position().max(1);
                            out.push(ParsedMessage { offset, result: Ok(value) });
                            offset += consumed;
                            advanced = 0;
                            continue;
                        }
                        Err(err) => {
                            tracing::warn!(offset, error = %err, "decode failed, resynchronizing");
                            out.push(ParsedMessage {
                                offset,
                                result: Err(PositionedError { offset, source: err }),
                            });
                        }
                    }
                }
                Err(_) => {
                    tracing::trace!(offset, "no template matched at offset");
                }
            }

            match self.templates.find_next_message_index(data, offset) {
                Some(next) => {
                    advanced += next - offset;
                    if let Some(limit) = self.config.max_scan_advance {
                        if advanced > limit {
                            tracing::warn!(offset, advanced, limit, "scan advance limit exceeded, giving up");
                            break;
                        }
                    }
                    offset = next;
                }
                None => break,
            }
        }

        out
    }

    pub fn compose(&self, value: &Value, evaluator: &mut dyn Evaluator) -> Result<Vec<u8>> {
        let object = match value {
            Value::Object(obj) => obj,
            other => {
                return Err(Error::Composition(format!("expected an object to compose, got {other}")));
            }
        };
        let template = self
            .templates
            .by_type_name(&object.type_name)
            .ok_or_else(|| Error::Composition(format!("no template registered for type {}", object.type_name)))?;
        let mut writer = BitWriter::new();
        self.encode_template(template, value, object, &mut writer, evaluator)?;
        let mut bytes = writer.into_bytes();
        if let Some(header) = template.header() {
            if let Some(end) = &header.end {
                bytes.extend_from_slice(end);
            }
        }
        Ok(bytes)
    }

    fn select_converter_for(&self, field: &TemplateField, evaluator: &mut dyn Evaluator, root: &Value) -> Result<Arc<dyn crate::convert::Converter>> {
        let fallback: Arc<dyn crate::convert::Converter> = match &field.converter_name {
            Some(name) => self.converters.converter(name).unwrap_or_else(|| Arc::new(NullConverter)),
            None => Arc::new(NullConverter),
        };
        if field.converter_selector.is_empty() {
            return Ok(fallback);
        }
        let choices: Vec<ConverterChoice> = field
            .converter_selector
            .iter()
            .filter_map(|c| {
                self.converters.converter(&c.converter_name).map(|converter| ConverterChoice {
                    condition: c.condition.clone(),
                    converter,
                })
            })
            .collect();
        crate::convert::select_converter(&choices, &fallback, evaluator, root)
    }

    fn decode_template(&self, template: &Template, reader: &mut BitReader, evaluator: &mut dyn Evaluator) -> Result<Value> {
        let mut object = ObjectValue::new(template.type_name().clone());
        let mut root = Value::Object(object.clone());
        let mut pending_checksum: Option<PendingChecksum> = None;

        for field in template.fields() {
            self.apply_skips(field, reader, evaluator, &root)?;

            if let Some(condition) = &field.condition {
                if !evaluator.evaluate_boolean(condition, &root)? {
                    continue;
                }
            }

            for (name, expr) in &field.context_parameters {
                let value = evaluator.evaluate(expr, &root, crate::value::DataType::Integer)?;
                evaluator.add_to_context(name, value);
            }

            let decoded = match &field.binding {
                Binding::Checksum { algorithm, skip_start, skip_end, byte_order } => {
                    let width = self
                        .checksums
                        .get(algorithm)
                        .ok_or_else(|| Error::Annotation {
                            template: template.type_name().clone(),
                            message: format!("unknown checksum algorithm {algorithm}"),
                        })?
                        .width_bits();
                    let raw = reader.read_u64(width as usize, *byte_order)?;
                    pending_checksum = Some(PendingChecksum {
                        field_name: field.name.clone(),
                        algorithm: algorithm.clone(),
                        skip_start: *skip_start,
                        skip_end: *skip_end,
                        byte_order: *byte_order,
                        width_bits: width,
                        expected: Some(raw),
                        write_at: None,
                    });
                    Value::Long(raw as i64)
                }
                other => self.decode_field_value(template, field, other, reader, evaluator, &root)?,
            };

            for (name, _) in &field.context_parameters {
                evaluator.remove_from_context(name);
            }

            let converted = self
                .select_converter_for(field, evaluator, &root)?
                .decode(&decoded)?;

            let value = match &field.post_process {
                Some(post) if post.value_decode.is_some() => {
                    let gate = match &post.condition {
                        Some(c) => evaluator.evaluate_boolean(c, &root)?,
                        None => true,
                    };
                    if gate {
                        evaluator.evaluate(post.value_decode.as_ref().unwrap(), &root, field.field_type)?
                    } else {
                        converted
                    }
                }
                _ => converted,
            };

            if let Some(name) = &field.validator_name {
                if let Some(validator) = self.converters.validator(name) {
                    if !validator.is_valid(&value)? {
                        return Err(Error::Validation {
                            template: template.type_name().clone(),
                            field: field.name.clone(),
                            message: "validator rejected decoded value".to_string(),
                        });
                    }
                }
            }

            object.set(field.name.clone(), value);
            root = Value::Object(object.clone());
        }

        for field in template.evaluated_fields() {
            let value = evaluator.evaluate(&field.expression, &root, field.field_type)?;
            object.set(field.name.clone(), value);
        }
        root = Value::Object(object.clone());

        if let Some(pending) = pending_checksum {
            let buffer = reader.full_buffer();
            let message_len = reader.position();
            let end = message_len.saturating_sub(pending.skip_end);
            let start = pending.skip_start.min(end);
            let algorithm = self.checksums.get(&pending.algorithm).expect("checked at build time");
            let computed = algorithm.compute(&buffer[start..end], 0);
            let expected = pending.expected.unwrap_or(0);
            if expected != computed {
                tracing::warn!(
                    template = %template.type_name(),
                    field = %pending.field_name,
                    expected,
                    computed,
                    "checksum mismatch"
                );
                if self.config.strict_checksum {
                    return Err(Error::Checksum {
                        template: template.type_name().clone(),
                        expected,
                        computed,
                    });
                }
            }
            let _ = pending.width_bits;
            let _ = pending.byte_order;
            let _ = pending.field_name;
        }

        Ok(root)
    }

    fn decode_field_value(
        &self,
        template: &Template,
        field: &TemplateField,
        binding: &Binding,
        reader: &mut BitReader,
        evaluator: &mut dyn Evaluator,
        root: &Value,
    ) -> Result<Value> {
        match binding {
            Binding::Integer { size, byte_order, signed } => {
                codec::decode_integer(reader, evaluator, root, size, *byte_order, *signed, field.field_type)
            }
            Binding::BitSet { size } => codec::decode_bitset(reader, evaluator, root, size),
            Binding::StringFixed { size, charset } => {
                codec::decode_string_fixed(reader, evaluator, root, size, *charset, &field.name)
            }
            Binding::StringTerminated { terminator, consume, charset } => {
                codec::decode_string_terminated(reader, *terminator, *consume, *charset, &field.name)
            }
            Binding::Object { type_name, choice } => {
                let resolved = self.resolve_object_type(choice, type_name, reader, evaluator, root, template, field)?;
                let sub_template = self
                    .templates
                    .by_type_name(&resolved)
                    .ok_or_else(|| Error::NotCodable(resolved.clone()))?;
                self.decode_template(sub_template, reader, evaluator)
            }
            Binding::ArrayPrimitive { element_type, size } => {
                let n = evaluator.evaluate_size(size, root)?;
                let mut items = Vec::with_capacity(n);
                for _ in 0..n {
                    items.push(codec::decode_primitive_element(reader, *element_type)?);
                }
                Ok(Value::Array(items))
            }
            Binding::Array { type_name, size, choice } => {
                let n = evaluator.evaluate_size(size, root)?;
                let mut items = Vec::with_capacity(n);
                for _ in 0..n {
                    let resolved = self.resolve_object_type(choice, type_name, reader, evaluator, root, template, field)?;
                    let sub_template = self
                        .templates
                        .by_type_name(&resolved)
                        .ok_or_else(|| Error::NotCodable(resolved.clone()))?;
                    items.push(self.decode_template(sub_template, reader, evaluator)?);
                }
                Ok(Value::Array(items))
            }
            Binding::ListSeparated { type_name, choice } => self.decode_list_separated(type_name, choice, reader, evaluator, root),
            Binding::Checksum { .. } => unreachable!("handled by the caller"),
        }
    }

    fn resolve_object_type(
        &self,
        choice: &Option<ChoiceSpec>,
        type_name: &str,
        reader: &mut BitReader,
        evaluator: &mut dyn Evaluator,
        root: &Value,
        template: &Template,
        field: &TemplateField,
    ) -> Result<String> {
        match choice {
            Some(choice) => choice::select_decode(choice, reader, evaluator, root, template.type_name(), &field.name),
            None => Ok(type_name.to_string()),
        }
    }

    fn decode_list_separated(
        &self,
        default_type: &str,
        choice: &SeparatedChoiceSpec,
        reader: &mut BitReader,
        evaluator: &mut dyn Evaluator,
        root: &Value,
    ) -> Result<Value> {
        let mut items = Vec::new();
        loop {
            match reader.peek_byte() {
                None => break,
                Some(b) if b == choice.terminator => {
                    reader.skip_bits(8)?;
                    break;
                }
                Some(_) => {
                    let remaining = reader.remaining_bytes();
                    let type_name = choice
                        .alternatives
                        .iter()
                        .find(|alt| match &alt.condition {
                            Some(cond) => evaluator.evaluate_boolean(cond, root).unwrap_or(false),
                            None => remaining.starts_with(alt.header_string.as_bytes()),
                        })
                        .map(|alt| alt.type_name.clone())
                        .unwrap_or_else(|| default_type.to_string());
                    let sub_template = self
                        .templates
                        .by_type_name(&type_name)
                        .ok_or_else(|| Error::NotCodable(type_name.clone()))?;
                    items.push(self.decode_template(sub_template, reader, evaluator)?);
                }
            }
        }
        Ok(Value::Array(items))
    }

    fn apply_skips(&self, field: &TemplateField, reader: &mut BitReader, evaluator: &mut dyn Evaluator, root: &Value) -> Result<()> {
        for skip in &field.skips {
            if let Some(cond) = &skip.condition {
                if !evaluator.evaluate_boolean(cond, root)? {
                    continue;
                }
            }
            match &skip.kind {
                crate::template::SkipKind::ByBits(expr) => {
                    let n = evaluator.evaluate_size(expr, root)?;
                    reader.skip_bits(n)?;
                }
                crate::template::SkipKind::UntilTerminator { terminator, consume } => {
                    reader.read_text_until(*terminator, crate::bitio::Charset::Ascii, *consume)?;
                }
            }
        }
        Ok(())
    }

    fn encode_template(
        &self,
        template: &Template,
        root: &Value,
        object: &ObjectValue,
        writer: &mut BitWriter,
        evaluator: &mut dyn Evaluator,
    ) -> Result<()> {
        let mut pending_checksum: Option<PendingChecksum> = None;

        for field in template.fields() {
            self.emit_skips(field, writer, evaluator, root)?;

            if let Some(condition) = &field.condition {
                if !evaluator.evaluate_boolean(condition, root)? {
                    continue;
                }
            }

            for (name, expr) in &field.context_parameters {
                let value = evaluator.evaluate(expr, root, crate::value::DataType::Integer)?;
                evaluator.add_to_context(name, value);
            }

            if let Binding::Checksum { algorithm, skip_start, skip_end, byte_order } = &field.binding {
                let width = self
                    .checksums
                    .get(algorithm)
                    .ok_or_else(|| Error::Annotation {
                        template: template.type_name().clone(),
                        message: format!("unknown checksum algorithm {algorithm}"),
                    })?
                    .width_bits();
                pending_checksum = Some(PendingChecksum {
                    field_name: field.name.clone(),
                    algorithm: algorithm.clone(),
                    skip_start: *skip_start,
                    skip_end: *skip_end,
                    byte_order: *byte_order,
                    width_bits: width,
                    expected: None,
                    write_at: Some(writer.position()),
                });
                writer.write_big_integer(&BigInt::zero(), width as usize, *byte_order);
                for (name, _) in &field.context_parameters {
                    evaluator.remove_from_context(name);
                }
                continue;
            }

            let raw_value = object.get(&field.name).cloned().unwrap_or(Value::Null);
            let to_encode = match &field.post_process {
                Some(post) if post.value_encode.is_some() => {
                    let gate = match &post.condition {
                        Some(c) => evaluator.evaluate_boolean(c, root)?,
                        None => true,
                    };
                    if gate {
                        evaluator.evaluate(post.value_encode.as_ref().unwrap(), root, field.field_type)?
                    } else {
                        raw_value
                    }
                }
                _ => raw_value,
            };
            let wire_value = self.select_converter_for(field, evaluator, root)?.encode(&to_encode)?;

            self.encode_field_value(template, field, &field.binding, &wire_value, writer, evaluator, root)?;

            for (name, _) in &field.context_parameters {
                evaluator.remove_from_context(name);
            }
        }

        if let Some(pending) = pending_checksum {
            let start = pending.skip_start.min(writer.bytes().len());
            let end = writer.bytes().len().saturating_sub(pending.skip_end);
            let algorithm = self.checksums.get(&pending.algorithm).expect("checked at build time");
            let computed = algorithm.compute(&writer.bytes()[start..end], 0);
            let mut placeholder = BitWriter::new();
            placeholder.write_big_integer(&BigInt::from_i128(computed as i128), pending.width_bits as usize, pending.byte_order);
            writer.patch_bytes(pending.write_at.expect("checksum field always records its offset"), &placeholder.into_bytes());
        }

        Ok(())
    }

    fn encode_field_value(
        &self,
        template: &Template,
        field: &TemplateField,
        binding: &Binding,
        value: &Value,
        writer: &mut BitWriter,
        evaluator: &mut dyn Evaluator,
        root: &Value,
    ) -> Result<()> {
        match binding {
            Binding::Integer { size, byte_order, .. } => codec::encode_integer(writer, evaluator, root, size, *byte_order, value),
            Binding::BitSet { .. } => codec::encode_bitset(writer, value),
            Binding::StringFixed { charset, .. } => {
                codec::encode_string_fixed(writer, *charset, value);
                Ok(())
            }
            Binding::StringTerminated { terminator, charset, .. } => codec::encode_string_terminated(writer, *terminator, *charset, value),
            Binding::Object { type_name, choice } => {
                let obj = match value {
                    Value::Object(o) => o,
                    other => {
                        return Err(Error::Encode {
                            template: template.type_name().clone(),
                            field: field.name.clone(),
                            message: format!("expected an object, got {other}"),
                        });
                    }
                };
                if let Some(choice) = choice {
                    choice::select_encode(choice, writer, evaluator, root, &obj.type_name, template.type_name(), &field.name)?;
                }
                let sub_template = self
                    .templates
                    .by_type_name(&obj.type_name)
                    .ok_or_else(|| Error::NotCodable(obj.type_name.clone()))?;
                let _ = type_name;
                self.encode_template(sub_template, value, obj, writer, evaluator)
            }
            Binding::ArrayPrimitive { element_type, .. } => {
                let items = match value {
                    Value::Array(items) => items,
                    other => {
                        return Err(Error::Encode {
                            template: template.type_name().clone(),
                            field: field.name.clone(),
                            message: format!("expected an array, got {other}"),
                        });
                    }
                };
                for item in items {
                    codec::encode_primitive_element(writer, *element_type, item)?;
                }
                Ok(())
            }
            Binding::Array { choice, .. } => {
                let items = match value {
                    Value::Array(items) => items,
                    other => {
                        return Err(Error::Encode {
                            template: template.type_name().clone(),
                            field: field.name.clone(),
                            message: format!("expected an array, got {other}"),
                        });
                    }
                };
                for item in items {
                    let obj = match item {
                        Value::Object(o) => o,
                        other => {
                            return Err(Error::Encode {
                                template: template.type_name().clone(),
                                field: field.name.clone(),
                                message: format!("expected an object element, got {other}"),
                            });
                        }
                    };
                    if let Some(choice) = choice {
                        choice::select_encode(choice, writer, evaluator, root, &obj.type_name, template.type_name(), &field.name)?;
                    }
                    let sub_template = self
                        .templates
                        .by_type_name(&obj.type_name)
                        .ok_or_else(|| Error::NotCodable(obj.type_name.clone()))?;
                    self.encode_template(sub_template, item, obj, writer, evaluator)?;
                }
                Ok(())
            }
            Binding::ListSeparated { choice, .. } => {
                let items = match value {
                    Value::Array(items) => items,
                    other => {
                        return Err(Error::Encode {
                            template: template.type_name().clone(),
                            field: field.name.clone(),
                            message: format!("expected an array, got {other}"),
                        });
                    }
                };
                for item in items {
                    let obj = match item {
                        Value::Object(o) => o,
                        other => {
                            return Err(Error::Encode {
                                template: template.type_name().clone(),
                                field: field.name.clone(),
                                message: format!("expected an object element, got {other}"),
                            });
                        }
                    };
                    let sub_template = self
                        .templates
                        .by_type_name(&obj.type_name)
                        .ok_or_else(|| Error::NotCodable(obj.type_name.clone()))?;
                    self.encode_template(sub_template, item, obj, writer, evaluator)?;
                }
                writer.write_bytes(&[choice.terminator]);
                Ok(())
            }
            Binding::Checksum { .. } => unreachable!("handled by the caller"),
        }
    }

    /// Mirrors [`Self::apply_skips`] on the write side: a skip read as
    /// padding on decode must be re-emitted as filler on encode so the
    /// composed bytes occupy the same positions.
    fn emit_skips(&self, field: &TemplateField, writer: &mut BitWriter, evaluator: &mut dyn Evaluator, root: &Value) -> Result<()> {
        for skip in &field.skips {
            if let Some(cond) = &skip.condition {
                if !evaluator.evaluate_boolean(cond, root)? {
                    continue;
                }
            }
            match &skip.kind {
                crate::template::SkipKind::ByBits(expr) => {
                    let n = evaluator.evaluate_size(expr, root)?;
                    writer.skip_bits(n);
                }
                crate::template::SkipKind::UntilTerminator { terminator, .. } => {
                    writer.write_bytes(&[*terminator]);
                }
            }
        }
        Ok(())
    }
}

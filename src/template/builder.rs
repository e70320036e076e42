//! Builder API that stands in for an annotation/reflection loader: it
//! performs the same load-time coherence checks a reflective loader
//! would, but against an explicitly assembled schema rather than
//! scanned annotations.

use crate::bitio::{ByteOrder, Charset};
use crate::error::{Error, Result};
use crate::value::DataType;

use super::{
    Binding, ChoiceSpec, EvaluatedField, HeaderSpec, PostProcess, Skip, SkipKind, Template, TemplateField,
};

#[derive(Debug, Default)]
pub struct TemplateBuilder {
    type_name: String,
    header: Option<HeaderSpec>,
    fields: Vec<TemplateField>,
    evaluated_fields: Vec<EvaluatedField>,
    saw_checksum: bool,
}

impl TemplateBuilder {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Default::default()
        }
    }

    pub fn header(mut self, starts: Vec<Vec<u8>>, charset: Charset, end: Option<Vec<u8>>) -> Self {
        self.header = Some(HeaderSpec { starts, charset, end });
        self
    }

    pub fn evaluated_field(mut self, name: impl Into<String>, field_type: DataType, expression: impl Into<String>) -> Self {
        self.evaluated_fields.push(EvaluatedField {
            name: name.into(),
            field_type,
            expression: expression.into(),
        });
        self
    }

    /// Starts a field description; call [`FieldBuilder::add`] to push it
    /// back onto this template builder.
    pub fn field(self, name: impl Into<String>, field_type: DataType, binding: Binding) -> FieldBuilder {
        FieldBuilder {
            template: self,
            field: TemplateField {
                name: name.into(),
                field_type,
                binding,
                skips: Vec::new(),
                condition: None,
                context_parameters: Vec::new(),
                post_process: None,
                validator_name: None,
                converter_name: None,
                converter_selector: Vec::new(),
            },
        }
    }

    fn check_choice(&self, field_name: &str, choice: &ChoiceSpec) -> Result<()> {
        if choice.prefix_size > 32 {
            return Err(Error::Annotation {
                template: self.type_name.clone(),
                message: format!("field {field_name}: prefixSize must be in [0, 32]"),
            });
        }
        choice.check_prefix_reference_invariant().map_err(|message| Error::Annotation {
            template: self.type_name.clone(),
            message: format!("field {field_name}: {message}"),
        })
    }

    /// Finalizes the template, enforcing its choice/checksum
    /// coherence checks. Registry-wide coherence (converter/validator
    /// names resolve, header-start uniqueness across templates) is
    /// checked later, when the template is registered.
    pub fn build(self) -> Result<Template> {
        for field in &self.fields {
            if let Binding::Object { choice: Some(choice), .. } | Binding::Array { choice: Some(choice), .. } =
                &field.binding
            {
                self.check_choice(&field.name, choice)?;
            }
        }

        let checksum_count = self
            .fields
            .iter()
            .filter(|f| matches!(f.binding, Binding::Checksum { .. }))
            .count();
        if checksum_count > 1 {
            return Err(Error::Annotation {
                template: self.type_name.clone(),
                message: "at most one Checksum field is allowed per template".to_string(),
            });
        }

        if self.fields.is_empty() {
            return Err(Error::NotCodable(self.type_name.clone()));
        }

        Ok(Template {
            type_name: self.type_name,
            header: self.header,
            fields: self.fields,
            evaluated_fields: self.evaluated_fields,
        })
    }
}

/// Fluent decoration of a single field before it is pushed back onto
/// the owning [`TemplateBuilder`].
pub struct FieldBuilder {
    template: TemplateBuilder,
    field: TemplateField,
}

impl FieldBuilder {
    pub fn condition(mut self, expr: impl Into<String>) -> Self {
        self.field.condition = Some(expr.into());
        self
    }

    pub fn skip_bits(mut self, size_expr: impl Into<String>) -> Self {
        self.field.skips.push(Skip {
            kind: SkipKind::ByBits(size_expr.into()),
            condition: None,
        });
        self
    }

    pub fn skip_until(mut self, terminator: u8, consume: bool) -> Self {
        self.field.skips.push(Skip {
            kind: SkipKind::UntilTerminator { terminator, consume },
            condition: None,
        });
        self
    }

    pub fn context_parameter(mut self, name: impl Into<String>, expr: impl Into<String>) -> Self {
        self.field.context_parameters.push((name.into(), expr.into()));
        self
    }

    pub fn post_process(mut self, post: PostProcess) -> Self {
        self.field.post_process = Some(post);
        self
    }

    pub fn validator(mut self, name: impl Into<String>) -> Self {
        self.field.validator_name = Some(name.into());
        self
    }

    pub fn converter(mut self, name: impl Into<String>) -> Self {
        self.field.converter_name = Some(name.into());
        self
    }

    /// Pushes this field onto the template and returns the builder so
    /// the next field can be added.
    pub fn add(mut self) -> TemplateBuilder {
        self.template.fields.push(self.field);
        self.template
    }
}

/// Convenience constructors for the common binding shapes.
pub fn integer_be(size_expr: impl Into<String>) -> Binding {
    Binding::Integer {
        size: size_expr.into(),
        byte_order: ByteOrder::Big,
        signed: false,
    }
}

pub fn integer_le(size_expr: impl Into<String>) -> Binding {
    Binding::Integer {
        size: size_expr.into(),
        byte_order: ByteOrder::Little,
        signed: false,
    }
}

pub fn string_fixed(size_expr: impl Into<String>, charset: Charset) -> Binding {
    Binding::StringFixed {
        size: size_expr.into(),
        charset,
    }
}

pub fn string_terminated(terminator: u8, consume: bool, charset: Charset) -> Binding {
    Binding::StringTerminated {
        terminator,
        consume,
        charset,
    }
}

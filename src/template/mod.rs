//! Immutable per-class schema. Templates are assembled once through
//! [`builder::TemplateBuilder`] and are read-only afterwards.

pub mod builder;

use derive_getters::Getters;

use crate::bitio::{ByteOrder, Charset};
use crate::value::DataType;

pub use builder::{FieldBuilder, TemplateBuilder};

/// `{ByBits(sizeExpr) | UntilTerminator(byte, consume)}`, applied
/// before a field.
#[derive(Debug, Clone)]
pub enum SkipKind {
    ByBits(String),
    UntilTerminator { terminator: u8, consume: bool },
}

#[derive(Debug, Clone)]
pub struct Skip {
    pub kind: SkipKind,
    pub condition: Option<String>,
}

/// One alternative of a prefix/condition-based object choice.
#[derive(Debug, Clone)]
pub struct ChoiceAlternative {
    pub condition: Option<String>,
    pub prefix_value: Option<u32>,
    pub type_name: String,
}

/// Prefix-based object discrimination.
#[derive(Debug, Clone)]
pub struct ChoiceSpec {
    pub prefix_size: u32,
    pub byte_order: ByteOrder,
    pub alternatives: Vec<ChoiceAlternative>,
    pub default_type: Option<String>,
}

impl ChoiceSpec {
    /// With a nonzero prefix, every alternative condition must
    /// reference the reserved prefix variable; with a zero-size
    /// prefix, none may.
    pub fn check_prefix_reference_invariant(&self) -> Result<(), String> {
        for alt in &self.alternatives {
            let references_prefix = alt.condition.as_deref().is_some_and(|c| c.contains("#prefix"));
            if self.prefix_size > 0 && !references_prefix && alt.condition.is_some() {
                return Err(format!(
                    "alternative for {} has a prefix but its condition never references #prefix",
                    alt.type_name
                ));
            }
            if self.prefix_size == 0 && references_prefix {
                return Err(format!(
                    "alternative for {} references #prefix but prefixSize is 0",
                    alt.type_name
                ));
            }
        }
        Ok(())
    }
}

/// Header-lookahead discriminated selection for `ListSeparated`.
#[derive(Debug, Clone)]
pub struct SeparatedAlternative {
    pub condition: Option<String>,
    pub header_string: String,
    pub type_name: String,
}

#[derive(Debug, Clone)]
pub struct SeparatedChoiceSpec {
    pub terminator: u8,
    pub charset: Charset,
    pub alternatives: Vec<SeparatedAlternative>,
}

/// One wire shape, tagged by the parameters it carries.
#[derive(Debug, Clone)]
pub enum Binding {
    Integer {
        size: String,
        byte_order: ByteOrder,
        signed: bool,
    },
    BitSet {
        size: String,
    },
    StringFixed {
        size: String,
        charset: Charset,
    },
    StringTerminated {
        terminator: u8,
        consume: bool,
        charset: Charset,
    },
    Object {
        type_name: String,
        choice: Option<ChoiceSpec>,
    },
    ArrayPrimitive {
        element_type: DataType,
        size: String,
    },
    Array {
        type_name: String,
        size: String,
        choice: Option<ChoiceSpec>,
    },
    ListSeparated {
        type_name: String,
        choice: SeparatedChoiceSpec,
    },
    Checksum {
        algorithm: String,
        skip_start: usize,
        skip_end: usize,
        byte_order: ByteOrder,
    },
}

impl Binding {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Binding::Integer { .. } => "Integer",
            Binding::BitSet { .. } => "BitSet",
            Binding::StringFixed { .. } => "StringFixed",
            Binding::StringTerminated { .. } => "StringTerminated",
            Binding::Object { .. } => "Object",
            Binding::ArrayPrimitive { .. } => "ArrayPrimitive",
            Binding::Array { .. } => "Array",
            Binding::ListSeparated { .. } => "ListSeparated",
            Binding::Checksum { .. } => "Checksum",
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(
            self,
            Binding::ArrayPrimitive { .. } | Binding::Array { .. } | Binding::ListSeparated { .. }
        )
    }
}

/// `{condition, valueDecode, valueEncode}` expressions that overwrite a
/// field's value pre-encode and/or post-decode.
#[derive(Debug, Clone, Default)]
pub struct PostProcess {
    pub condition: Option<String>,
    pub value_decode: Option<String>,
    pub value_encode: Option<String>,
}

/// `{condition, converterClass}` entries of a `converterSelector`.
#[derive(Debug, Clone)]
pub struct ConverterChoiceSpec {
    pub condition: String,
    pub converter_name: String,
}

/// Declaration-order field description.
#[derive(Debug, Clone)]
pub struct TemplateField {
    pub name: String,
    pub field_type: DataType,
    pub binding: Binding,
    pub skips: Vec<Skip>,
    pub condition: Option<String>,
    pub context_parameters: Vec<(String, String)>,
    pub post_process: Option<PostProcess>,
    pub validator_name: Option<String>,
    pub converter_name: Option<String>,
    pub converter_selector: Vec<ConverterChoiceSpec>,
}

/// A field assigned purely by expression, post-decode, with no wire
/// binding of its own.
#[derive(Debug, Clone)]
pub struct EvaluatedField {
    pub name: String,
    pub field_type: DataType,
    pub expression: String,
}

/// Header framing.
#[derive(Debug, Clone)]
pub struct HeaderSpec {
    pub starts: Vec<Vec<u8>>,
    pub charset: Charset,
    pub end: Option<Vec<u8>>,
}

/// Immutable per-class schema. Construct via [`TemplateBuilder`];
/// never mutated after [`TemplateBuilder::build`].
#[derive(Debug, Clone, Getters)]
pub struct Template {
    type_name: String,
    header: Option<HeaderSpec>,
    fields: Vec<TemplateField>,
    evaluated_fields: Vec<EvaluatedField>,
}

impl Template {
    /// A template can only be coded if it declares at least one
    /// wire-bound field.
    pub fn can_be_coded(&self) -> bool {
        !self.fields.is_empty()
    }

    /// The single field, if any, whose binding is `Checksum`.
    pub fn checksum_field(&self) -> Option<&TemplateField> {
        self.fields.iter().find(|f| matches!(f.binding, Binding::Checksum { .. }))
    }

    /// Fields overwritten pre-encode and/or post-decode by expression.
    pub fn post_process_fields(&self) -> impl Iterator<Item = &TemplateField> {
        self.fields.iter().filter(|f| f.post_process.is_some())
    }

    pub fn field(&self, name: &str) -> Option<&TemplateField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

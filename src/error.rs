use thiserror::Error;

pub type Result<A, E = Error> = std::result::Result<A, E>;

/// Closed error taxonomy for the codec engine.
#[derive(Debug, Error)]
pub enum Error {
    #[error("annotation error in template {template}: {message}")]
    Annotation { template: String, message: String },

    #[error("no template matches the input at the current offset")]
    NoMatch,
    #[error("duplicate header key {0}")]
    DuplicateKey(String),
    #[error("type {0} cannot be coded: no bindings")]
    NotCodable(String),

    #[error("unsupported wire type: {0}")]
    UnsupportedType(&'static str),
    #[error("cannot cast {value} from {from} to {to}")]
    ValueCast {
        value: String,
        from: &'static str,
        to: &'static str,
    },
    #[error("expression failed: {expression}")]
    Expression { expression: String, message: String },

    #[error("buffer underflow: needed {needed} bits, {available} available")]
    BufferUnderflow { needed: usize, available: usize },
    #[error("charset decode error for field {field}")]
    Charset { field: String },
    #[error("no alternative matched for field {field} in template {template}")]
    NoAlternative { template: String, field: String },
    #[error("validation rejected field {field} in template {template}: {message}")]
    Validation {
        template: String,
        field: String,
        message: String,
    },
    #[error("checksum mismatch in template {template}: expected {expected:#x}, computed {computed:#x}")]
    Checksum {
        template: String,
        expected: u64,
        computed: u64,
    },

    #[error("value incompatible with binding for field {field} in template {template}: {message}")]
    Encode {
        template: String,
        field: String,
        message: String,
    },
    #[error("composition failed: {0}")]
    Composition(String),

    #[error("data error: {0}")]
    Data(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A decode error paired with the byte offset at which the failing
/// message started. Returned in-line alongside successes by the
/// scanning façade.
#[derive(Debug, Error)]
#[error("at offset {offset}: {source}")]
pub struct PositionedError {
    pub offset: usize,
    #[source]
    pub source: Error,
}

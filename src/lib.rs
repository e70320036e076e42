//! A declarative, template-directed bit-stream message codec.
//!
//! Wire formats are described as immutable [`template::Template`]
//! values — ordered field bindings, skips, conditions, and checksums —
//! assembled through [`template::TemplateBuilder`]. An [`engine::Engine`]
//! seals a set of templates plus converter/validator/checksum registries
//! and exposes the two public entry points: [`engine::Engine::parse`]
//! decodes a byte buffer into a sequence of `(offset, result)` pairs,
//! resynchronizing past corrupt messages; [`engine::Engine::compose`]
//! encodes a decoded object back to bytes.
//!
//! The expression language referenced by conditions, sizes, and
//! post-process directives is not implemented here — callers supply an
//! [`evaluator::Evaluator`]. [`evaluator::MapEvaluator`] is a minimal
//! concrete evaluator good enough for this crate's own tests and demos.

pub mod bigint;
pub mod bitio;
pub mod checksum;
pub mod codec;
pub mod convert;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod registry;
pub mod template;
pub mod value;
pub mod version;

pub use engine::{Engine, EngineBuilder, EngineConfig, ParsedMessage};
pub use error::{Error, PositionedError, Result};
pub use evaluator::Evaluator;
pub use template::{Template, TemplateBuilder};
pub use value::{DataType, ObjectValue, Value};

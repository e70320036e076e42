//! Prefix/condition-based object discrimination. Decode reads an
//! optional prefix, pushes it into the evaluator scope under the
//! reserved name `prefix` (referenced as `#prefix` in conditions), then
//! picks the first alternative whose condition holds — first-declared
//! wins on ties.

use crate::bitio::{BitReader, BitWriter, ByteOrder};
use crate::error::{Error, Result};
use crate::evaluator::Evaluator;
use crate::template::ChoiceSpec;
use crate::value::Value;

pub const PREFIX_VAR: &str = "prefix";

/// Reads the discriminator prefix and picks the first matching
/// alternative, returning its type name.
pub fn select_decode(
    choice: &ChoiceSpec,
    reader: &mut BitReader,
    evaluator: &mut dyn Evaluator,
    root: &Value,
    template_name: &str,
    field_name: &str,
) -> Result<String> {
    let prefix = if choice.prefix_size > 0 {
        let value = reader.read_u64(choice.prefix_size as usize, choice.byte_order)? as u32;
        evaluator.add_to_context(PREFIX_VAR, Value::Integer(value as i32));
        Some(value)
    } else {
        None
    };

    let chosen = choice
        .alternatives
        .iter()
        .find(|alt| match &alt.condition {
            Some(cond) => evaluator.evaluate_boolean(cond, root).unwrap_or(false),
            None => prefix.is_some() && alt.prefix_value == prefix,
        })
        .map(|alt| alt.type_name.clone())
        .or_else(|| choice.default_type.clone());

    if choice.prefix_size > 0 {
        evaluator.remove_from_context(PREFIX_VAR);
    }

    chosen.ok_or_else(|| Error::NoAlternative {
        template: template_name.to_string(),
        field: field_name.to_string(),
    })
}

/// Encode-side inversion: the alternative is picked by matching
/// `value_type_name` against the declared
/// alternatives/default; when `prefixSize>0` the matching alternative's
/// declared `prefixValue` (or, absent that, its condition inverted) is
/// written before the sub-object.
pub fn select_encode(
    choice: &ChoiceSpec,
    writer: &mut BitWriter,
    evaluator: &mut dyn Evaluator,
    root: &Value,
    value_type_name: &str,
    template_name: &str,
    field_name: &str,
) -> Result<()> {
    let alt = choice
        .alternatives
        .iter()
        .find(|alt| alt.type_name == value_type_name)
        .ok_or_else(|| Error::NoAlternative {
            template: template_name.to_string(),
            field: field_name.to_string(),
        })?;

    if choice.prefix_size > 0 {
        let prefix_value = match alt.prefix_value {
            Some(v) => v,
            None => {
                // invert a condition of the shape `#prefix == N`.
                invert_prefix_condition(alt.condition.as_deref()).ok_or_else(|| Error::Encode {
                    template: template_name.to_string(),
                    field: field_name.to_string(),
                    message: "choice alternative has no prefixValue and its condition cannot be inverted".to_string(),
                })?
            }
        };
        let _ = evaluator; // reserved for selectors that need evaluation to invert richer conditions
        writer.write_big_integer(
            &crate::bigint::BigInt::from_i128(prefix_value as i128),
            choice.prefix_size as usize,
            choice.byte_order,
        );
    }
    let _ = root;
    Ok(())
}

fn invert_prefix_condition(condition: Option<&str>) -> Option<u32> {
    let condition = condition?;
    let (_, rhs) = condition.split_once("==")?;
    rhs.trim().parse::<u32>().ok()
}

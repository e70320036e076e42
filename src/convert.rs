//! User-supplied pre/post transforms between wire type and field type,
//! and post-decode invariants.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::evaluator::Evaluator;
use crate::value::Value;

/// Bidirectional mapping between wire representation and field
/// representation.
pub trait Converter: Send + Sync {
    fn decode(&self, wire: &Value) -> Result<Value>;
    fn encode(&self, field: &Value) -> Result<Value>;
}

/// A boolean invariant on the decoded value.
pub trait Validator: Send + Sync {
    fn is_valid(&self, value: &Value) -> Result<bool>;
}

/// Identity converter — the default when a field declares none.
pub struct NullConverter;

impl Converter for NullConverter {
    fn decode(&self, wire: &Value) -> Result<Value> {
        Ok(wire.clone())
    }

    fn encode(&self, field: &Value) -> Result<Value> {
        Ok(field.clone())
    }
}

/// Always-passing validator — the default when a field declares none.
pub struct NullValidator;

impl Validator for NullValidator {
    fn is_valid(&self, _value: &Value) -> Result<bool> {
        Ok(true)
    }
}

/// One `{condition, converter}` entry of a `converterSelector` list.
pub struct ConverterChoice {
    pub condition: String,
    pub converter: Arc<dyn Converter>,
}

/// Registered converters/validators, keyed by the name a template
/// references them by. Built once, then treated read-only.
#[derive(Default)]
pub struct ConvertRegistry {
    converters: HashMap<String, Arc<dyn Converter>>,
    validators: HashMap<String, Arc<dyn Validator>>,
}

impl ConvertRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_converter(&mut self, name: impl Into<String>, converter: Arc<dyn Converter>) {
        self.converters.insert(name.into(), converter);
    }

    pub fn register_validator(&mut self, name: impl Into<String>, validator: Arc<dyn Validator>) {
        self.validators.insert(name.into(), validator);
    }

    pub fn converter(&self, name: &str) -> Option<Arc<dyn Converter>> {
        self.converters.get(name).cloned()
    }

    pub fn validator(&self, name: &str) -> Option<Arc<dyn Validator>> {
        self.validators.get(name).cloned()
    }

    pub fn has_converter(&self, name: &str) -> bool {
        self.converters.contains_key(name)
    }

    pub fn has_validator(&self, name: &str) -> bool {
        self.validators.contains_key(name)
    }
}

/// Picks the first `ConverterChoice` whose condition holds against the
/// root object; falls back to `fallback` when no selector is
/// configured or none of its conditions hold.
pub fn select_converter(
    selector: &[ConverterChoice],
    fallback: &Arc<dyn Converter>,
    evaluator: &mut dyn Evaluator,
    root: &Value,
) -> Result<Arc<dyn Converter>> {
    for choice in selector {
        if evaluator.evaluate_boolean(&choice.condition, root)? {
            return Ok(choice.converter.clone());
        }
    }
    Ok(fallback.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use crate::error::Error;
    use crate::evaluator::MapEvaluator;
    use crate::value::ObjectValue;

    /// Maps a numeric wire code to a device-type name, rejecting unknown
    /// codes with `Error::Data`.
    struct DeviceTypeConverter;

    impl Converter for DeviceTypeConverter {
        fn decode(&self, wire: &Value) -> Result<Value> {
            match wire {
                Value::Byte(0x46) => Ok(Value::String("GV300".to_string())),
                Value::Byte(0x10) => Ok(Value::String("GV75".to_string())),
                other => Err(Error::Data(format!("unknown device type code {other}"))),
            }
        }

        fn encode(&self, field: &Value) -> Result<Value> {
            match field {
                Value::String(s) if s == "GV300" => Ok(Value::Byte(0x46)),
                Value::String(s) if s == "GV75" => Ok(Value::Byte(0x10)),
                other => Err(Error::Data(format!("unknown device type name {other}"))),
            }
        }
    }

    #[test]
    fn null_converter_round_trips_unchanged() {
        let converter = NullConverter;
        let value = Value::Integer(7);
        assert_eq!(converter.decode(&value).unwrap(), value);
        assert_eq!(converter.encode(&value).unwrap(), value);
    }

    #[test]
    fn null_validator_always_passes() {
        assert!(NullValidator.is_valid(&Value::Null).unwrap());
    }

    #[test]
    fn converter_raises_data_error_on_unknown_code() {
        let converter = DeviceTypeConverter;
        assert_eq!(converter.decode(&Value::Byte(0x46)).unwrap(), Value::String("GV300".to_string()));
        let err = converter.decode(&Value::Byte(0x99)).unwrap_err();
        assert_matches!(err, Error::Data(_));
    }

    #[test]
    fn selector_picks_first_matching_condition() {
        let fallback: Arc<dyn Converter> = Arc::new(NullConverter);
        let specific: Arc<dyn Converter> = Arc::new(DeviceTypeConverter);
        let selector = vec![ConverterChoice {
            condition: "kind == 1".to_string(),
            converter: specific,
        }];
        let mut evaluator = MapEvaluator::new();
        let mut obj = ObjectValue::new("t");
        obj.set("kind", Value::Integer(1));
        let root = Value::Object(obj);

        let chosen = select_converter(&selector, &fallback, &mut evaluator, &root).unwrap();
        assert_eq!(chosen.decode(&Value::Byte(0x10)).unwrap(), Value::String("GV75".to_string()));
    }

    #[test]
    fn selector_falls_back_when_no_condition_holds() {
        let fallback: Arc<dyn Converter> = Arc::new(NullConverter);
        let specific: Arc<dyn Converter> = Arc::new(DeviceTypeConverter);
        let selector = vec![ConverterChoice {
            condition: "kind == 1".to_string(),
            converter: specific,
        }];
        let mut evaluator = MapEvaluator::new();
        let mut obj = ObjectValue::new("t");
        obj.set("kind", Value::Integer(2));
        let root = Value::Object(obj);

        let chosen = select_converter(&selector, &fallback, &mut evaluator, &root).unwrap();
        let value = Value::Integer(42);
        assert_eq!(chosen.decode(&value).unwrap(), value);
    }
}

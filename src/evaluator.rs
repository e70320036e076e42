//! External `Evaluator` contract. The engine consumes this trait only;
//! the expression language itself is supplied by the caller.
//! `MapEvaluator` is a minimal concrete implementation good enough for
//! this crate's own tests and demos — not a substitute for a real
//! expression engine.

use crate::error::{Error, Result};
use crate::value::{DataType, Value, ValueCaster};

/// Evaluates boolean conditions, integer sizes, and value-producing
/// expressions against a context object (the root object currently
/// being decoded/encoded, plus any pushed context parameters).
pub trait Evaluator {
    fn add_to_context(&mut self, name: &str, value: Value);
    fn remove_from_context(&mut self, name: &str);

    /// Returns 0 for an empty/blank expression.
    fn evaluate_size(&mut self, expr: &str, root: &Value) -> Result<usize>;
    /// Returns `true` for an empty/blank expression.
    fn evaluate_boolean(&mut self, expr: &str, root: &Value) -> Result<bool>;
    fn evaluate(&mut self, expr: &str, root: &Value, expected: DataType) -> Result<Value>;
}

fn is_blank(expr: &str) -> bool {
    expr.trim().is_empty()
}

/// A small expression evaluator over dotted field paths, used by this
/// crate's own tests/demos. Supports:
/// - field lookups: `fieldName`, `parent.fieldName`
/// - the reserved prefix variable pushed during choice selection:
///   `#prefix`
/// - equality: `<lhs> == <rhs>`
/// - conjunction: `<a> && <b>`
/// - integer/string literals
#[derive(Debug, Default)]
pub struct MapEvaluator {
    context: Vec<(String, Value)>,
}

impl MapEvaluator {
    pub fn new() -> Self {
        Self { context: Vec::new() }
    }

    fn lookup(&self, name: &str, root: &Value) -> Option<Value> {
        if name == "self" {
            return Some(root.clone());
        }
        if let Some((_, v)) = self.context.iter().rev().find(|(n, _)| n == name) {
            return Some(v.clone());
        }
        if let Value::Object(obj) = root {
            return obj.get(name).cloned();
        }
        None
    }

    fn resolve_term(&self, term: &str, root: &Value) -> Result<Value> {
        let term = term.trim();
        if let Some(name) = term.strip_prefix('#') {
            return self
                .lookup(name, root)
                .ok_or_else(|| Self::undefined(term));
        }
        if let Ok(i) = term.parse::<i64>() {
            return Ok(Value::Integer(i as i32));
        }
        if let Some(stripped) = term.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
            return Ok(Value::String(stripped.to_string()));
        }
        if term == "true" {
            return Ok(Value::Boolean(true));
        }
        if term == "false" {
            return Ok(Value::Boolean(false));
        }
        self.lookup(term, root).ok_or_else(|| Self::undefined(term))
    }

    fn undefined(expr: &str) -> Error {
        Error::Expression {
            expression: expr.to_string(),
            message: "undefined reference".to_string(),
        }
    }

    fn values_equal(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Integer(x), Value::Integer(y)) => x == y,
            (Value::Long(x), Value::Long(y)) => x == y,
            (Value::Byte(x), Value::Byte(y)) => x == y,
            (Value::Short(x), Value::Short(y)) => x == y,
            (Value::String(x), Value::String(y)) => x == y,
            (Value::Boolean(x), Value::Boolean(y)) => x == y,
            (Value::Integer(x), Value::Long(y)) | (Value::Long(y), Value::Integer(x)) => *x as i64 == *y,
            _ => a == b,
        }
    }
}

impl Evaluator for MapEvaluator {
    fn add_to_context(&mut self, name: &str, value: Value) {
        self.context.push((name.to_string(), value));
    }

    fn remove_from_context(&mut self, name: &str) {
        if let Some(idx) = self.context.iter().rposition(|(n, _)| n == name) {
            self.context.remove(idx);
        }
    }

    fn evaluate_size(&mut self, expr: &str, root: &Value) -> Result<usize> {
        if is_blank(expr) {
            return Ok(0);
        }
        let value = self.resolve_term(expr, root)?;
        let as_int = ValueCaster::to_i128(&value)?;
        Ok(as_int.max(0) as usize)
    }

    fn evaluate_boolean(&mut self, expr: &str, root: &Value) -> Result<bool> {
        if is_blank(expr) {
            return Ok(true);
        }
        if let Some((lhs, rhs)) = expr.split_once("&&") {
            return Ok(self.evaluate_boolean(lhs, root)? && self.evaluate_boolean(rhs, root)?);
        }
        if let Some((lhs, rhs)) = expr.split_once("==") {
            let a = self.resolve_term(lhs, root)?;
            let b = self.resolve_term(rhs, root)?;
            return Ok(Self::values_equal(&a, &b));
        }
        if let Some((lhs, rhs)) = expr.split_once("!=") {
            let a = self.resolve_term(lhs, root)?;
            let b = self.resolve_term(rhs, root)?;
            return Ok(!Self::values_equal(&a, &b));
        }
        match self.resolve_term(expr, root)? {
            Value::Boolean(b) => Ok(b),
            other => Err(Error::Expression {
                expression: expr.to_string(),
                message: format!("not a boolean: {other}"),
            }),
        }
    }

    fn evaluate(&mut self, expr: &str, root: &Value, expected: DataType) -> Result<Value> {
        if is_blank(expr) {
            return Ok(Value::Null);
        }
        let value = self.resolve_term(expr, root)?;
        match (&value, expected) {
            (Value::String(s), dt) if dt != DataType::String => ValueCaster::parse_string(s, dt),
            _ => Ok(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ObjectValue;

    #[test]
    fn blank_expressions_use_defaults() {
        let mut ev = MapEvaluator::new();
        let root = Value::Object(ObjectValue::new("t"));
        assert_eq!(ev.evaluate_size("", &root).unwrap(), 0);
        assert!(ev.evaluate_boolean("  ", &root).unwrap());
    }

    #[test]
    fn prefix_condition_resolves_from_context() {
        let mut ev = MapEvaluator::new();
        ev.add_to_context("prefix", Value::Integer(1));
        let root = Value::Object(ObjectValue::new("t"));
        assert!(ev.evaluate_boolean("#prefix == 1", &root).unwrap());
        assert!(!ev.evaluate_boolean("#prefix == 0", &root).unwrap());
    }

    #[test]
    fn field_lookup_from_root_object() {
        let mut ev = MapEvaluator::new();
        let mut obj = ObjectValue::new("t");
        obj.set("id", Value::Integer(6));
        let root = Value::Object(obj);
        assert!(ev.evaluate_boolean("id == 6", &root).unwrap());
    }
}

//! Validator expressions, written in CEL and evaluated with
//! `cel-interpreter`.
//!
//! An expression sees exactly two variables: `model`, the whole model, and
//! `field`, the field descriptor with its current `value`. Sources are
//! compiled once and evaluated against a [`Scope`] as often as needed.

use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

use cel_interpreter::objects::Key;
use cel_interpreter::{Context, Program, Value as CelValue};
use serde_json::{Map, Number, Value};

use crate::error::ExpressionError;

#[derive(Clone, Copy, Debug)]
pub struct Scope<'a> {
    pub model: &'a Value,
    pub field: &'a Value,
}

#[derive(Clone)]
pub struct Expression {
    source: String,
    program: Arc<Program>,
}

impl Expression {
    pub fn compile(source: &str) -> Result<Self, ExpressionError> {
        let program = Program::compile(source).map_err(|error| ExpressionError::Parse {
            message: error.to_string(),
        })?;
        Ok(Self {
            source: source.to_string(),
            program: Arc::new(program),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn evaluate(&self, scope: &Scope<'_>) -> Result<Value, ExpressionError> {
        Ok(cel_to_json(&self.execute(scope)?))
    }

    /// Evaluates to a boolean. Numbers, strings and `null` follow the usual
    /// truthiness; lists, maps and other values are rejected.
    pub fn test(&self, scope: &Scope<'_>) -> Result<bool, ExpressionError> {
        let value = self.execute(scope)?;
        match &value {
            CelValue::Bool(flag) => Ok(*flag),
            CelValue::Int(number) => Ok(*number != 0),
            CelValue::UInt(number) => Ok(*number != 0),
            CelValue::Float(number) => Ok(*number != 0.0),
            CelValue::String(text) => Ok(!text.is_empty()),
            CelValue::Null => Ok(false),
            other => Err(ExpressionError::NotBoolean {
                found: format!("{other:?}"),
            }),
        }
    }

    fn execute(&self, scope: &Scope<'_>) -> Result<CelValue, ExpressionError> {
        let mut context = Context::default();
        bind(&mut context, "model", scope.model)?;
        bind(&mut context, "field", scope.field)?;
        self.program
            .execute(&context)
            .map_err(|error| ExpressionError::Execution {
                message: error.to_string(),
            })
    }
}

fn bind(context: &mut Context<'_>, name: &'static str, value: &Value) -> Result<(), ExpressionError> {
    context
        .add_variable(name, json_to_cel(value))
        .map_err(|error| ExpressionError::Binding {
            name,
            message: error.to_string(),
        })
}

fn json_to_cel(value: &Value) -> CelValue {
    match value {
        Value::Null => CelValue::Null,
        Value::Bool(flag) => CelValue::Bool(*flag),
        Value::Number(number) => number_to_cel(number),
        Value::String(text) => CelValue::String(Arc::new(text.clone())),
        Value::Array(items) => CelValue::List(items.iter().map(json_to_cel).collect::<Vec<_>>().into()),
        Value::Object(map) => CelValue::Map(
            map.iter()
                .map(|(key, value)| (key.clone(), json_to_cel(value)))
                .collect::<HashMap<String, CelValue>>()
                .into(),
        ),
    }
}

fn number_to_cel(number: &Number) -> CelValue {
    if let Some(value) = number.as_i64() {
        CelValue::Int(value)
    } else if let Some(value) = number.as_u64() {
        CelValue::UInt(value)
    } else {
        CelValue::Float(number.as_f64().unwrap_or(f64::NAN))
    }
}

fn cel_to_json(value: &CelValue) -> Value {
    match value {
        CelValue::Null => Value::Null,
        CelValue::Bool(flag) => Value::Bool(*flag),
        CelValue::Int(number) => Value::from(*number),
        CelValue::UInt(number) => Value::from(*number),
        CelValue::Float(number) => Number::from_f64(*number).map_or(Value::Null, Value::Number),
        CelValue::String(text) => Value::String(text.as_ref().clone()),
        CelValue::Bytes(bytes) => Value::from(bytes.as_ref().clone()),
        CelValue::List(items) => Value::Array(items.iter().map(cel_to_json).collect()),
        CelValue::Map(map) => Value::Object(
            map.map
                .iter()
                .map(|(key, value)| (key_to_string(key), cel_to_json(value)))
                .collect::<Map<String, Value>>(),
        ),
        other => Value::String(format!("{other:?}")),
    }
}

fn key_to_string(key: &Key) -> String {
    match key {
        Key::Int(number) => number.to_string(),
        Key::Uint(number) => number.to_string(),
        Key::Bool(flag) => flag.to_string(),
        Key::String(text) => text.to_string(),
    }
}

impl FromStr for Expression {
    type Err = ExpressionError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        Self::compile(source)
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

impl Debug for Expression {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Expression").field(&self.source).finish()
    }
}

use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::state::Model;
use super::validation::Done;
use crate::error::{FieldError, FieldResult};
use crate::wrapper::Wrapper;

pub type ValidatorFn = Arc<dyn Fn(&Field, &Model, Done) + Send + Sync>;

#[derive(Clone)]
pub enum Check {
    /// Source of an expression evaluated against `model` and `field`.
    Expression(String),
    /// Decides validity and reports it through the completion handle, either
    /// before returning or later.
    Callback(ValidatorFn),
}

impl Debug for Check {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Check::Expression(source) => f.debug_tuple("Expression").field(source).finish(),
            Check::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ValidatorSpec {
    pub check: Check,
    pub message: Option<String>,
}

impl ValidatorSpec {
    pub fn expression(source: impl Into<String>) -> Self {
        Self {
            check: Check::Expression(source.into()),
            message: None,
        }
    }

    pub fn callback(validator: impl Fn(&Field, &Model, Done) + Send + Sync + 'static) -> Self {
        Self {
            check: Check::Callback(Arc::new(validator)),
            message: None,
        }
    }

    pub fn message(mut self, template: impl Into<String>) -> Self {
        self.message = Some(template.into());
        self
    }
}

impl From<&str> for ValidatorSpec {
    fn from(source: &str) -> Self {
        Self::expression(source)
    }
}

impl From<String> for ValidatorSpec {
    fn from(source: String) -> Self {
        Self::expression(source)
    }
}

/// A validator as it can be written in data: a bare expression or an
/// expression paired with a message template.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValidatorDecl {
    Expression(String),
    Detailed {
        expression: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl From<ValidatorDecl> for ValidatorSpec {
    fn from(decl: ValidatorDecl) -> Self {
        match decl {
            ValidatorDecl::Expression(source) => Self::expression(source),
            ValidatorDecl::Detailed {
                expression,
                message,
            } => Self {
                check: Check::Expression(expression),
                message,
            },
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    pub key: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub template_options: Map<String, Value>,
    #[serde(default)]
    pub validators: BTreeMap<String, ValidatorDecl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrapper: Option<String>,
}

/// Declarative description of one form input.
#[derive(Clone)]
pub struct Field {
    key: String,
    field_type: String,
    required: bool,
    template_options: Map<String, Value>,
    validators: BTreeMap<String, ValidatorSpec>,
    wrapper: Option<Wrapper>,
}

impl Field {
    pub fn new(key: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            field_type: field_type.into(),
            required: false,
            template_options: Map::new(),
            validators: BTreeMap::new(),
            wrapper: None,
        }
    }

    pub fn from_json(value: Value) -> FieldResult<Self> {
        let descriptor: FieldDescriptor = serde_json::from_value(value)
            .map_err(|error| FieldError::InvalidDescriptor(error.to_string()))?;
        Self::try_from(descriptor)
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn template_option(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.template_options.insert(name.into(), value.into());
        self
    }

    pub fn template_options(&self) -> &Map<String, Value> {
        &self.template_options
    }

    pub fn with_template_options(mut self, options: Map<String, Value>) -> Self {
        self.template_options = options;
        self
    }

    pub fn validator(mut self, name: impl Into<String>, spec: impl Into<ValidatorSpec>) -> Self {
        self.validators.insert(name.into(), spec.into());
        self
    }

    pub fn wrapper(mut self, wrapper: impl Into<Wrapper>) -> Self {
        self.wrapper = Some(wrapper.into());
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn field_type(&self) -> &str {
        &self.field_type
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn validators(&self) -> &BTreeMap<String, ValidatorSpec> {
        &self.validators
    }

    pub fn wrapper_spec(&self) -> Option<&Wrapper> {
        self.wrapper.as_ref()
    }

    pub fn label(&self) -> Option<&str> {
        self.template_options.get("label").and_then(Value::as_str)
    }

    /// The descriptor as seen by expressions through `field`, with `value`
    /// holding the field's current model value (`null` when unset).
    pub fn to_context(&self, value: Option<&Value>) -> Value {
        json!({
            "key": self.key,
            "type": self.field_type,
            "required": self.required,
            "templateOptions": self.template_options,
            "value": value.cloned().unwrap_or(Value::Null),
        })
    }
}

impl TryFrom<FieldDescriptor> for Field {
    type Error = FieldError;

    fn try_from(descriptor: FieldDescriptor) -> Result<Self, Self::Error> {
        if descriptor.key.trim().is_empty() {
            return Err(FieldError::InvalidDescriptor(
                "field key must not be empty".to_string(),
            ));
        }
        Ok(Self {
            key: descriptor.key,
            field_type: descriptor.field_type,
            required: descriptor.required,
            template_options: descriptor.template_options,
            validators: descriptor
                .validators
                .into_iter()
                .map(|(name, decl)| (name, decl.into()))
                .collect(),
            wrapper: descriptor.wrapper.map(Wrapper::Markup),
        })
    }
}

impl Debug for Field {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("key", &self.key)
            .field("type", &self.field_type)
            .field("required", &self.required)
            .field("template_options", &self.template_options)
            .field("validators", &self.validators.keys().collect::<Vec<_>>())
            .field("wrapper", &self.wrapper)
            .finish()
    }
}

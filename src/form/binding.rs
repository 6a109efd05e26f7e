use std::sync::Arc;

use serde_json::{Map, Value};

use super::field::Field;
use super::state::{FieldErrors, Form, Model};
use crate::error::FieldResult;

/// What a field type receives when it renders: the shared form and model,
/// the field descriptor and its template options.
///
/// Reads and writes go through the shared model, so a value written here is
/// the value every other binding of the same key sees.
#[derive(Clone, Debug)]
pub struct FieldProps {
    form: Form,
    model: Model,
    field: Arc<Field>,
}

impl FieldProps {
    pub(crate) fn new(form: Form, model: Model, field: Arc<Field>) -> Self {
        Self { form, model, field }
    }

    pub fn form(&self) -> &Form {
        &self.form
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn field(&self) -> &Field {
        &self.field
    }

    pub fn key(&self) -> &str {
        self.field.key()
    }

    pub fn field_type(&self) -> &str {
        self.field.field_type()
    }

    pub fn template_options(&self) -> &Map<String, Value> {
        self.field.template_options()
    }

    pub fn option(&self, name: &str) -> Option<&Value> {
        self.field.template_options().get(name)
    }

    pub fn value(&self) -> FieldResult<Option<Value>> {
        self.model.get(self.field.key())
    }

    pub fn set_value(&self, value: impl Into<Value>) -> FieldResult<()> {
        self.model.set(self.field.key(), value)
    }

    pub fn errors(&self) -> FieldResult<FieldErrors> {
        Ok(self
            .form
            .field_errors(self.field.key())?
            .unwrap_or_default())
    }
}

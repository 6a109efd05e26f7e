pub use crate::element::Element;
pub use crate::error::{FieldError, FieldResult};
pub use crate::form::{
    Done, ErrorValue, Field, FieldController, FieldProps, Form, Lifecycle, Model, Resolution,
    ValidationMessages, ValidationPass, ValidatorSpec,
};
pub use crate::provider::{FieldOptions, FieldProvider, StaleResultPolicy};
pub use crate::registry::{FieldType, TypeRegistry};
pub use crate::wrapper::Wrapper;

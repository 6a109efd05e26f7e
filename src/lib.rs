//! Field resolution, two-way model binding and validation for declarative
//! forms.
//!
//! A host describes each input as a [`Field`] (key, type, template options,
//! validators, optional wrapper) and mounts it against a shared [`Form`] and
//! [`Model`] with a [`FieldController`]. The controller resolves the field's
//! renderer from the [`TypeRegistry`], keeps `form.$errors[key]` current as
//! the model changes and renders the field into its wrapper on request.

pub mod element;
pub mod error;
pub mod expression;
pub mod form;
pub mod prelude;
pub mod provider;
pub mod registry;
pub mod wrapper;

pub use element::Element;
pub use error::{ExpressionError, FieldError, FieldResult};
pub use expression::{Expression, Scope};
pub use form::{
    Done, ErrorValue, Field, FieldController, FieldDescriptor, FieldErrors, FieldProps, Form,
    Lifecycle, Model, Resolution, ValidationMessages, ValidationPass, ValidatorSpec,
};
pub use provider::{FieldOptions, FieldProvider, StaleResultPolicy};
pub use registry::{FieldType, TypeRegistry};
pub use wrapper::{Wrapper, compose};

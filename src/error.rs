use thiserror::Error;

pub type FieldResult<T> = Result<T, FieldError>;

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum FieldError {
    #[error("no field type registered under `{type_name}`")]
    UnknownType { type_name: String },

    #[error("validator `{validator}` has an invalid expression: {source}")]
    Expression {
        validator: String,
        #[source]
        source: ExpressionError,
    },

    #[error("invalid wrapper: {reason}")]
    InvalidWrapper { reason: String },

    #[error("field identity cannot change from {from} to {to}")]
    IdentityChanged { from: String, to: String },

    #[error("invalid field descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("field state lock poisoned while {0}")]
    StatePoisoned(&'static str),

    #[error("field controller has been destroyed")]
    Destroyed,
}

impl FieldError {
    pub(crate) fn invalid_wrapper(reason: impl Into<String>) -> Self {
        Self::InvalidWrapper {
            reason: reason.into(),
        }
    }
}

/// Failures raised while compiling or evaluating a validator expression.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum ExpressionError {
    #[error("cannot parse expression: {message}")]
    Parse { message: String },

    #[error("cannot bind `{name}` into the expression context: {message}")]
    Binding { name: &'static str, message: String },

    #[error("expression failed: {message}")]
    Execution { message: String },

    #[error("expression produced {found}, expected a boolean")]
    NotBoolean { found: String },
}

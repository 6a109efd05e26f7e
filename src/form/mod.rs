mod binding;
mod controller;
mod field;
mod message;
mod state;
mod validation;


pub use binding::FieldProps;
pub use controller::{FieldController, Lifecycle};
pub use field::{Check, Field, FieldDescriptor, ValidatorDecl, ValidatorFn, ValidatorSpec};
pub use message::{ValidationMessages, render as render_message};
pub use state::{ErrorValue, FieldErrors, Form, Model, WatchCallback, WatchId};
pub use validation::{Done, Resolution, ValidationPass, ValidationTicket};

pub(crate) use state::{read_lock, write_lock};

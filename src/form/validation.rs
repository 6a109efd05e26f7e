use std::sync::Weak;

use serde_json::Value;

use super::controller::ControllerInner;
use super::field::{Check, Field, ValidatorFn};
use crate::error::{FieldError, FieldResult};
use crate::expression::Expression;

pub(crate) const REQUIRED: &str = "required";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ValidationTicket(pub u64);

/// What happened to a validator result handed to a [`Done`] handle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Resolution {
    /// The result was written into the form's error registry.
    Applied,
    /// A newer run of the same validator was started; the result was dropped.
    Superseded,
    /// The field controller is gone; the result was dropped.
    Destroyed,
}

#[derive(Clone)]
pub(crate) enum Rule {
    Required,
    Expression(Expression),
    Callback(ValidatorFn),
}

#[derive(Clone)]
pub(crate) struct NormalizedValidator {
    pub(crate) name: String,
    pub(crate) rule: Rule,
    pub(crate) message: Option<String>,
}

/// Turns the declared validators of `field` into runnable rules.
///
/// A validator whose expression does not compile is left out and reported
/// in the returned failures; the others are unaffected. A required field
/// gets a built-in `required` rule unless it declares one itself.
pub(crate) fn normalize(field: &Field) -> (Vec<NormalizedValidator>, Vec<FieldError>) {
    let mut validators = Vec::with_capacity(field.validators().len() + 1);
    let mut failures = Vec::new();

    if field.is_required() && !field.validators().contains_key(REQUIRED) {
        validators.push(NormalizedValidator {
            name: REQUIRED.to_string(),
            rule: Rule::Required,
            message: None,
        });
    }

    for (name, spec) in field.validators() {
        let rule = match &spec.check {
            Check::Expression(source) => match Expression::compile(source) {
                Ok(expression) => Rule::Expression(expression),
                Err(source_error) => {
                    tracing::warn!(
                        field = field.key(),
                        validator = %name,
                        error = %source_error,
                        "validator expression does not compile"
                    );
                    failures.push(FieldError::Expression {
                        validator: name.clone(),
                        source: source_error,
                    });
                    continue;
                }
            },
            Check::Callback(callback) => Rule::Callback(callback.clone()),
        };
        validators.push(NormalizedValidator {
            name: name.clone(),
            rule,
            message: spec.message.clone(),
        });
    }

    (validators, failures)
}

pub(crate) fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(text)) => text.is_empty(),
        Some(_) => false,
    }
}

pub(crate) enum Outcome {
    Valid,
    Invalid,
    InvalidWith(String),
}

/// Completion handle given to callback validators.
///
/// It is consumed by [`Done::resolve`] or [`Done::reject_with`], so a run
/// reports at most once. Dropping it without resolving leaves the previous
/// entry in place and stops counting the run as pending.
#[must_use = "a validator run stays pending until its Done handle is resolved or dropped"]
pub struct Done {
    pub(super) controller: Weak<ControllerInner>,
    pub(super) validator: String,
    pub(super) ticket: ValidationTicket,
    pub(super) reported: bool,
}

impl Done {
    pub fn validator(&self) -> &str {
        &self.validator
    }

    pub fn ticket(&self) -> ValidationTicket {
        self.ticket
    }

    pub fn resolve(self, valid: bool) -> FieldResult<Resolution> {
        self.report(if valid {
            Outcome::Valid
        } else {
            Outcome::Invalid
        })
    }

    /// Reports the run as failed with a message template of its own, which
    /// takes precedence over the declared and global templates.
    pub fn reject_with(self, message: impl Into<String>) -> FieldResult<Resolution> {
        self.report(Outcome::InvalidWith(message.into()))
    }

    fn report(mut self, outcome: Outcome) -> FieldResult<Resolution> {
        self.reported = true;
        let Some(controller) = self.controller.upgrade() else {
            tracing::trace!(validator = %self.validator, "dropping result for a released field");
            return Ok(Resolution::Destroyed);
        };
        controller.complete(&self.validator, self.ticket, outcome)
    }
}

impl Drop for Done {
    fn drop(&mut self) {
        if self.reported {
            return;
        }
        tracing::trace!(
            validator = %self.validator,
            ticket = self.ticket.0,
            "validator run dropped without a result"
        );
        if let Some(controller) = self.controller.upgrade() {
            controller.abandon(&self.validator, self.ticket);
        }
    }
}

impl std::fmt::Debug for Done {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Done")
            .field("validator", &self.validator)
            .field("ticket", &self.ticket)
            .finish()
    }
}

/// Summary of one validation pass over a field's validators.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ValidationPass {
    /// Validators that reported (or gave up) before the pass returned.
    pub completed: Vec<String>,
    /// Callback validators still holding their completion handle.
    pub pending: Vec<String>,
    /// Validators recorded as satisfied without running because an optional
    /// field is empty.
    pub skipped: Vec<String>,
    /// Validators that could not be compiled and were left unset.
    pub failures: Vec<FieldError>,
}

impl ValidationPass {
    pub fn is_settled(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::field::ValidatorSpec;
    use serde_json::json;

    fn names(validators: &[NormalizedValidator]) -> Vec<&str> {
        validators.iter().map(|v| v.name.as_str()).collect()
    }

    #[test]
    fn required_field_gets_builtin_rule() {
        let field = Field::new("name", "input")
            .required(true)
            .validator("short", "size(field.value) < 10");
        let (validators, failures) = normalize(&field);
        assert!(failures.is_empty());
        assert_eq!(names(&validators), vec!["required", "short"]);
        assert!(matches!(validators[0].rule, Rule::Required));
    }

    #[test]
    fn declared_required_overrides_builtin() {
        let field = Field::new("name", "input").required(true).validator(
            "required",
            ValidatorSpec::expression("field.value != \"n/a\"").message("%l is required"),
        );
        let (validators, _) = normalize(&field);
        assert_eq!(validators.len(), 1);
        assert!(matches!(validators[0].rule, Rule::Expression(_)));
        assert_eq!(validators[0].message.as_deref(), Some("%l is required"));
    }

    #[test]
    fn broken_expression_is_reported_and_siblings_survive() {
        let field = Field::new("name", "input")
            .validator("broken", "model.name ==")
            .validator("fine", "model.name")
            .validator("check", ValidatorSpec::callback(|_, _, done| drop(done.resolve(true))));
        let (validators, failures) = normalize(&field);
        assert_eq!(names(&validators), vec!["check", "fine"]);
        assert!(matches!(
            failures.as_slice(),
            [FieldError::Expression { validator, .. }] if validator == "broken"
        ));
    }

    #[test]
    fn emptiness_covers_missing_null_and_empty_string() {
        assert!(is_empty(None));
        assert!(is_empty(Some(&Value::Null)));
        assert!(is_empty(Some(&json!(""))));
        assert!(!is_empty(Some(&json!(" "))));
        assert!(!is_empty(Some(&json!(0))));
        assert!(!is_empty(Some(&json!(false))));
        assert!(!is_empty(Some(&json!([]))));
    }
}

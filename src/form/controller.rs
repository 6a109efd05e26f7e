use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Debug, Formatter};
use std::mem;
use std::sync::{Arc, RwLock};

use futures_timer::Delay;

use super::binding::FieldProps;
use super::field::Field;
use super::message::render;
use super::state::{ErrorValue, Form, Model, WatchId, read_lock, write_lock};
use super::validation::{
    Done, NormalizedValidator, Outcome, Resolution, Rule, ValidationPass, ValidationTicket,
    is_empty, normalize,
};
use crate::element::Element;
use crate::error::{FieldError, FieldResult};
use crate::expression::Scope;
use crate::provider::{FieldProvider, StaleResultPolicy};
use crate::registry::FieldTypeHandle;
use crate::wrapper::compose;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Lifecycle {
    Mounted,
    /// At least one callback validator has not reported yet.
    Validating,
    Destroyed,
}

struct ControllerState {
    destroyed: bool,
    field: Arc<Field>,
    model: Model,
    validators: Arc<Vec<NormalizedValidator>>,
    compile_failures: Vec<FieldError>,
    tickets: BTreeMap<String, ValidationTicket>,
    pending: BTreeSet<(String, ValidationTicket)>,
    next_ticket: u64,
    watch: Option<WatchId>,
    last_pass: Option<ValidationPass>,
}

impl ControllerState {
    fn next_ticket(&mut self) -> ValidationTicket {
        self.next_ticket += 1;
        ValidationTicket(self.next_ticket)
    }
}

pub(crate) struct ControllerInner {
    key: String,
    provider: FieldProvider,
    form: Form,
    implementation: FieldTypeHandle,
    state: RwLock<ControllerState>,
}

/// Binds one field descriptor to a shared form and model.
///
/// Mounting resolves the field type, creates the field's slot in the form's
/// error registry and runs every validator once. Afterwards each write to
/// `model[field.key]` runs them again. Results are written only below the
/// field's own key, and nothing is written once the controller is destroyed.
///
/// Clones share the same controller.
#[derive(Clone)]
pub struct FieldController {
    inner: Arc<ControllerInner>,
}

impl FieldController {
    pub fn mount(
        provider: &FieldProvider,
        form: &Form,
        model: &Model,
        field: impl Into<Arc<Field>>,
    ) -> FieldResult<Self> {
        let field = field.into();
        if field.key().trim().is_empty() {
            return Err(FieldError::InvalidDescriptor(
                "field key must not be empty".to_string(),
            ));
        }
        let implementation = provider
            .types()
            .resolve(field.field_type())
            .inspect_err(|error| {
                tracing::warn!(field = field.key(), %error, "cannot mount field");
            })?;
        let (validators, compile_failures) = normalize(&field);
        form.ensure_field(field.key())?;

        let inner = Arc::new(ControllerInner {
            key: field.key().to_string(),
            provider: provider.clone(),
            form: form.clone(),
            implementation,
            state: RwLock::new(ControllerState {
                destroyed: false,
                field: field.clone(),
                model: model.clone(),
                validators: Arc::new(validators),
                compile_failures,
                tickets: BTreeMap::new(),
                pending: BTreeSet::new(),
                next_ticket: 0,
                watch: None,
                last_pass: None,
            }),
        });
        let watch = watch_model(&inner, model)?;
        write_lock(&inner.state, "storing model watcher")?.watch = Some(watch);

        tracing::debug!(
            field = field.key(),
            field_type = field.field_type(),
            validators = field.validators().len(),
            "mounted field"
        );
        let controller = Self { inner };
        controller.validate()?;
        Ok(controller)
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    pub fn form(&self) -> &Form {
        &self.inner.form
    }

    pub fn provider(&self) -> &FieldProvider {
        &self.inner.provider
    }

    pub fn field(&self) -> FieldResult<Arc<Field>> {
        Ok(read_lock(&self.inner.state, "reading field descriptor")?
            .field
            .clone())
    }

    pub fn model(&self) -> FieldResult<Model> {
        Ok(read_lock(&self.inner.state, "reading bound model")?
            .model
            .clone())
    }

    pub fn value(&self) -> FieldResult<Option<serde_json::Value>> {
        self.model()?.get(&self.inner.key)
    }

    /// Writes `model[field.key]`; validation follows through the model
    /// watcher like any other write.
    pub fn set_value(&self, value: impl Into<serde_json::Value>) -> FieldResult<()> {
        let model = {
            let state = read_lock(&self.inner.state, "reading model for write")?;
            if state.destroyed {
                return Err(FieldError::Destroyed);
            }
            state.model.clone()
        };
        model.set(&self.inner.key, value)
    }

    /// Runs every validator against the current model value.
    pub fn validate(&self) -> FieldResult<ValidationPass> {
        self.inner.run_pass()
    }

    pub fn lifecycle(&self) -> FieldResult<Lifecycle> {
        let state = read_lock(&self.inner.state, "reading lifecycle")?;
        Ok(if state.destroyed {
            Lifecycle::Destroyed
        } else if state.pending.is_empty() {
            Lifecycle::Mounted
        } else {
            Lifecycle::Validating
        })
    }

    pub fn is_validating(&self) -> FieldResult<bool> {
        Ok(self.lifecycle()? == Lifecycle::Validating)
    }

    /// Resolves once no validator run is pending.
    pub async fn settled(&self) -> FieldResult<()> {
        let interval = self.inner.provider.options().settle_poll_interval();
        while self.is_validating()? {
            Delay::new(interval).await;
        }
        Ok(())
    }

    pub fn last_pass(&self) -> FieldResult<Option<ValidationPass>> {
        Ok(read_lock(&self.inner.state, "reading last validation pass")?
            .last_pass
            .clone())
    }

    pub fn expression_failures(&self) -> FieldResult<Vec<FieldError>> {
        Ok(read_lock(&self.inner.state, "reading expression failures")?
            .compile_failures
            .clone())
    }

    /// Renders the field through its resolved type and places the result in
    /// the declared wrapper, if any.
    pub fn render(&self) -> FieldResult<Element> {
        let (field, model) = {
            let state = read_lock(&self.inner.state, "reading field for render")?;
            if state.destroyed {
                return Err(FieldError::Destroyed);
            }
            (state.field.clone(), state.model.clone())
        };
        let props = FieldProps::new(self.inner.form.clone(), model, field.clone());
        let element = self.inner.implementation.render(&props);
        compose(element, field.wrapper_spec()).inspect_err(|error| {
            tracing::warn!(field = field.key(), %error, "cannot wrap rendered field");
        })
    }

    /// Moves the binding to another model object and revalidates against it.
    pub fn rebind_model(&self, model: &Model) -> FieldResult<ValidationPass> {
        let (previous, watch) = {
            let mut state = write_lock(&self.inner.state, "rebinding model")?;
            if state.destroyed {
                return Err(FieldError::Destroyed);
            }
            let watch = state.watch.take();
            (mem::replace(&mut state.model, model.clone()), watch)
        };
        if let Some(id) = watch {
            previous.unwatch(id)?;
        }
        let watch = watch_model(&self.inner, model)?;
        write_lock(&self.inner.state, "storing model watcher")?.watch = Some(watch);
        tracing::debug!(field = %self.inner.key, "rebound field model");
        self.validate()
    }

    /// Swaps in a new descriptor for the same field.
    ///
    /// `key` and `type` must not change. Validators are normalized again,
    /// runs still in flight no longer count as current, and entries of
    /// validators that are gone are removed before revalidating.
    pub fn replace_field(&self, field: impl Into<Arc<Field>>) -> FieldResult<ValidationPass> {
        let field = field.into();
        let (validators, compile_failures) = normalize(&field);
        let names = validators
            .iter()
            .map(|validator| validator.name.clone())
            .collect::<Vec<_>>();
        {
            let mut state = write_lock(&self.inner.state, "replacing field descriptor")?;
            if state.destroyed {
                return Err(FieldError::Destroyed);
            }
            if state.field.key() != field.key() || state.field.field_type() != field.field_type()
            {
                return Err(FieldError::IdentityChanged {
                    from: identity(&state.field),
                    to: identity(&field),
                });
            }
            state.field = field;
            state.validators = Arc::new(validators);
            state.compile_failures = compile_failures;
            state.tickets.clear();
        }
        let names = names.iter().map(String::as_str).collect::<Vec<_>>();
        self.inner.form.retain_entries(&self.inner.key, &names)?;
        tracing::debug!(field = %self.inner.key, "replaced field descriptor");
        self.validate()
    }

    /// Stops the controller. Results reported afterwards are dropped and
    /// the field's entries in the form are left as they are.
    pub fn destroy(&self) -> FieldResult<()> {
        let (model, watch) = {
            let mut state = write_lock(&self.inner.state, "destroying field")?;
            if state.destroyed {
                return Ok(());
            }
            state.destroyed = true;
            state.pending.clear();
            state.tickets.clear();
            (state.model.clone(), state.watch.take())
        };
        if let Some(id) = watch {
            model.unwatch(id)?;
        }
        tracing::debug!(field = %self.inner.key, "destroyed field");
        Ok(())
    }
}

impl Debug for FieldController {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldController")
            .field("key", &self.inner.key)
            .field("lifecycle", &self.lifecycle().ok())
            .finish()
    }
}

fn identity(field: &Field) -> String {
    format!("`{}` ({})", field.key(), field.field_type())
}

fn watch_model(inner: &Arc<ControllerInner>, model: &Model) -> FieldResult<WatchId> {
    let controller = Arc::downgrade(inner);
    model.watch(inner.key.clone(), move |key, _| {
        let Some(controller) = controller.upgrade() else {
            return;
        };
        match controller.run_pass() {
            Ok(_) | Err(FieldError::Destroyed) => {}
            Err(error) => {
                tracing::warn!(field = key, %error, "revalidation after model change failed");
            }
        }
    })
}

impl ControllerInner {
    fn run_pass(self: &Arc<Self>) -> FieldResult<ValidationPass> {
        let (field, model, validators, failures) = {
            let state = read_lock(&self.state, "starting validation pass")?;
            if state.destroyed {
                return Err(FieldError::Destroyed);
            }
            (
                state.field.clone(),
                state.model.clone(),
                state.validators.clone(),
                state.compile_failures.clone(),
            )
        };
        let snapshot = model.snapshot()?;
        let value = snapshot.get(field.key());
        let skip = self.provider.options().skip_empty_optional
            && !field.is_required()
            && is_empty(value);

        let runs = {
            let mut state = write_lock(&self.state, "allocating validation tickets")?;
            if state.destroyed {
                return Err(FieldError::Destroyed);
            }
            let mut runs = Vec::with_capacity(validators.len());
            for validator in validators.iter() {
                let ticket = state.next_ticket();
                state.tickets.insert(validator.name.clone(), ticket);
                if !skip && matches!(validator.rule, Rule::Callback(_)) {
                    state.pending.insert((validator.name.clone(), ticket));
                }
                runs.push((validator, ticket));
            }
            runs
        };

        let mut pass = ValidationPass {
            failures,
            ..ValidationPass::default()
        };
        let mut errored = BTreeSet::new();

        if skip {
            for (validator, ticket) in &runs {
                self.apply(&validator.name, *ticket, ErrorValue::Flag(false))?;
                pass.skipped.push(validator.name.clone());
            }
        } else {
            let context = field.to_context(value);
            let scope = Scope {
                model: &snapshot,
                field: &context,
            };
            for (validator, ticket) in &runs {
                match &validator.rule {
                    Rule::Required => {
                        let outcome = if is_empty(value) {
                            Outcome::Invalid
                        } else {
                            Outcome::Valid
                        };
                        self.complete(&validator.name, *ticket, outcome)?;
                    }
                    Rule::Expression(expression) => match expression.test(&scope) {
                        Ok(valid) => {
                            let outcome = if valid {
                                Outcome::Valid
                            } else {
                                Outcome::Invalid
                            };
                            self.complete(&validator.name, *ticket, outcome)?;
                        }
                        Err(source) => {
                            tracing::warn!(
                                field = %self.key,
                                validator = %validator.name,
                                expression = %expression,
                                error = %source,
                                "validator expression failed"
                            );
                            pass.failures.push(FieldError::Expression {
                                validator: validator.name.clone(),
                                source,
                            });
                            errored.insert(validator.name.as_str());
                        }
                    },
                    Rule::Callback(callback) => {
                        self.mark_pending(&validator.name, *ticket)?;
                        let done = Done {
                            controller: Arc::downgrade(self),
                            validator: validator.name.clone(),
                            ticket: *ticket,
                            reported: false,
                        };
                        callback(field.as_ref(), &model, done);
                    }
                }
            }
        }

        let mut state = write_lock(&self.state, "recording validation pass")?;
        if !skip {
            for (validator, ticket) in &runs {
                if state.pending.contains(&(validator.name.clone(), *ticket)) {
                    pass.pending.push(validator.name.clone());
                } else if !errored.contains(validator.name.as_str()) {
                    pass.completed.push(validator.name.clone());
                }
            }
        }
        tracing::debug!(
            field = %self.key,
            completed = pass.completed.len(),
            pending = pass.pending.len(),
            skipped = pass.skipped.len(),
            failures = pass.failures.len(),
            "validation pass"
        );
        state.last_pass = Some(pass.clone());
        Ok(pass)
    }

    pub(super) fn complete(
        &self,
        validator: &str,
        ticket: ValidationTicket,
        outcome: Outcome,
    ) -> FieldResult<Resolution> {
        match self.entry_for(validator, outcome)? {
            Some(value) => self.apply(validator, ticket, value),
            None => {
                tracing::trace!(field = %self.key, validator, "dropping result for a destroyed field");
                Ok(Resolution::Destroyed)
            }
        }
    }

    /// The entry a run of `validator` ending in `outcome` writes, or `None`
    /// once the controller is destroyed.
    fn entry_for(&self, validator: &str, outcome: Outcome) -> FieldResult<Option<ErrorValue>> {
        let (field, model, declared) = {
            let state = read_lock(&self.state, "reading validator message")?;
            if state.destroyed {
                return Ok(None);
            }
            let declared = state
                .validators
                .iter()
                .find(|candidate| candidate.name == validator)
                .and_then(|candidate| candidate.message.clone());
            (state.field.clone(), state.model.clone(), declared)
        };

        let value = match outcome {
            Outcome::Valid => ErrorValue::Flag(false),
            Outcome::Invalid => {
                let template = match declared {
                    Some(template) => Some(template),
                    None => self.provider.messages().get(validator)?,
                };
                failure_value(template, &field, &model)?
            }
            Outcome::InvalidWith(template) => failure_value(Some(template), &field, &model)?,
        };
        Ok(Some(value))
    }

    /// A dispatched callback counts as failing until it reports.
    fn mark_pending(&self, validator: &str, ticket: ValidationTicket) -> FieldResult<()> {
        let Some(value) = self.entry_for(validator, Outcome::Invalid)? else {
            return Ok(());
        };
        let state = read_lock(&self.state, "marking pending validator")?;
        if state.destroyed || state.tickets.get(validator) != Some(&ticket) {
            return Ok(());
        }
        self.form.write_error(&self.key, validator, value)
    }

    fn apply(
        &self,
        validator: &str,
        ticket: ValidationTicket,
        value: ErrorValue,
    ) -> FieldResult<Resolution> {
        let mut state = write_lock(&self.state, "applying validator result")?;
        if state.destroyed {
            tracing::trace!(field = %self.key, validator, "dropping result for a destroyed field");
            return Ok(Resolution::Destroyed);
        }
        state.pending.remove(&(validator.to_string(), ticket));
        let current = state.tickets.get(validator).copied();
        let accepted = match self.provider.options().stale_results {
            StaleResultPolicy::DiscardSuperseded => current == Some(ticket),
            StaleResultPolicy::LastCompletedWins => current.is_some(),
        };
        if !accepted {
            tracing::trace!(
                field = %self.key,
                validator,
                ticket = ticket.0,
                "dropping superseded validator result"
            );
            return Ok(Resolution::Superseded);
        }
        self.form.write_error(&self.key, validator, value)?;
        Ok(Resolution::Applied)
    }

    pub(super) fn abandon(&self, validator: &str, ticket: ValidationTicket) {
        if let Ok(mut state) = self.state.write() {
            state.pending.remove(&(validator.to_string(), ticket));
        }
    }
}

impl Drop for ControllerInner {
    fn drop(&mut self) {
        let state = match self.state.get_mut() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(id) = state.watch.take()
            && let Err(error) = state.model.unwatch(id)
        {
            tracing::debug!(field = %self.key, %error, "could not release model watcher");
        }
    }
}

fn failure_value(template: Option<String>, field: &Field, model: &Model) -> FieldResult<ErrorValue> {
    Ok(match template {
        Some(template) => ErrorValue::Message(render(&template, field, &model.snapshot()?)),
        None => ErrorValue::Flag(true),
    })
}

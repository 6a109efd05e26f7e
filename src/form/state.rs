use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{FieldError, FieldResult};

/// One validator's entry in the error registry: a pass/fail flag where
/// `true` means the error is active, or the rendered message of a failing
/// validator.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorValue {
    Flag(bool),
    Message(String),
}

impl ErrorValue {
    pub fn is_active(&self) -> bool {
        matches!(self, ErrorValue::Flag(true) | ErrorValue::Message(_))
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            ErrorValue::Flag(flag) => Some(*flag),
            ErrorValue::Message(_) => None,
        }
    }

    pub fn as_message(&self) -> Option<&str> {
        match self {
            ErrorValue::Message(message) => Some(message),
            ErrorValue::Flag(_) => None,
        }
    }
}

pub type FieldErrors = BTreeMap<String, ErrorValue>;

#[derive(Debug)]
struct FormState {
    valid: bool,
    errors: BTreeMap<String, FieldErrors>,
}

/// Validity and per-field errors shared by every field bound to one form.
///
/// Each field controller writes only below its own key; the aggregate
/// `valid` flag is recomputed after every write and may also be set by the
/// host.
#[derive(Clone, Debug)]
pub struct Form {
    state: Arc<RwLock<FormState>>,
}

impl Default for Form {
    fn default() -> Self {
        Self::new()
    }
}

impl Form {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(FormState {
                valid: true,
                errors: BTreeMap::new(),
            })),
        }
    }

    pub fn is_valid(&self) -> FieldResult<bool> {
        Ok(read_lock(&self.state, "reading form validity")?.valid)
    }

    pub fn set_valid(&self, valid: bool) -> FieldResult<()> {
        write_lock(&self.state, "setting form validity")?.valid = valid;
        Ok(())
    }

    /// Recomputes `valid` from the registry: any active entry makes the form
    /// invalid.
    pub fn recompute_valid(&self) -> FieldResult<bool> {
        let mut state = write_lock(&self.state, "recomputing form validity")?;
        state.valid = aggregate_valid(&state.errors);
        Ok(state.valid)
    }

    pub fn errors(&self) -> FieldResult<BTreeMap<String, FieldErrors>> {
        Ok(read_lock(&self.state, "reading form errors")?.errors.clone())
    }

    pub fn field_errors(&self, key: &str) -> FieldResult<Option<FieldErrors>> {
        Ok(read_lock(&self.state, "reading field errors")?
            .errors
            .get(key)
            .cloned())
    }

    pub fn error(&self, key: &str, validator: &str) -> FieldResult<Option<ErrorValue>> {
        Ok(read_lock(&self.state, "reading validator error")?
            .errors
            .get(key)
            .and_then(|errors| errors.get(validator))
            .cloned())
    }

    pub fn to_json(&self) -> FieldResult<Value> {
        let state = read_lock(&self.state, "serializing form")?;
        Ok(json!({
            "$valid": state.valid,
            "$errors": state.errors,
        }))
    }

    pub fn same_form(&self, other: &Form) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    pub(crate) fn ensure_field(&self, key: &str) -> FieldResult<()> {
        write_lock(&self.state, "creating field error slot")?
            .errors
            .entry(key.to_string())
            .or_default();
        Ok(())
    }

    /// Drops entries of validators the field no longer declares.
    pub(crate) fn retain_entries(&self, key: &str, validators: &[&str]) -> FieldResult<()> {
        let mut state = write_lock(&self.state, "pruning validator entries")?;
        if let Some(errors) = state.errors.get_mut(key) {
            errors.retain(|name, _| validators.contains(&name.as_str()));
        }
        state.valid = aggregate_valid(&state.errors);
        Ok(())
    }

    pub(crate) fn write_error(&self, key: &str, validator: &str, value: ErrorValue) -> FieldResult<()> {
        let mut state = write_lock(&self.state, "writing validator result")?;
        state
            .errors
            .entry(key.to_string())
            .or_default()
            .insert(validator.to_string(), value);
        state.valid = aggregate_valid(&state.errors);
        Ok(())
    }
}

fn aggregate_valid(errors: &BTreeMap<String, FieldErrors>) -> bool {
    !errors
        .values()
        .flat_map(BTreeMap::values)
        .any(ErrorValue::is_active)
}

pub type WatchCallback = Arc<dyn Fn(&str, &Value) + Send + Sync>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct WatchId(u64);

struct ModelState {
    values: Map<String, Value>,
    watchers: BTreeMap<WatchId, (String, WatchCallback)>,
    next_watch: u64,
}

/// The host's data object, shared by reference between all fields bound to
/// it. Writes notify the watchers of the written key once the lock has been
/// released, so watchers may read or write the model again.
#[derive(Clone)]
pub struct Model {
    state: Arc<RwLock<ModelState>>,
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Map<String, Value>> for Model {
    fn from(values: Map<String, Value>) -> Self {
        Self {
            state: Arc::new(RwLock::new(ModelState {
                values,
                watchers: BTreeMap::new(),
                next_watch: 1,
            })),
        }
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.state.read() {
            Ok(state) => f
                .debug_struct("Model")
                .field("values", &state.values)
                .field("watchers", &state.watchers.len())
                .finish(),
            Err(_) => f.write_str("Model(<poisoned>)"),
        }
    }
}

impl Model {
    pub fn new() -> Self {
        Self::from(Map::new())
    }

    pub fn from_json(value: Value) -> FieldResult<Self> {
        match value {
            Value::Object(values) => Ok(Self::from(values)),
            other => Err(FieldError::InvalidDescriptor(format!(
                "a model must be a JSON object, got {other}"
            ))),
        }
    }

    pub fn get(&self, key: &str) -> FieldResult<Option<Value>> {
        Ok(read_lock(&self.state, "reading model value")?
            .values
            .get(key)
            .cloned())
    }

    pub fn snapshot(&self) -> FieldResult<Value> {
        Ok(Value::Object(
            read_lock(&self.state, "reading model snapshot")?
                .values
                .clone(),
        ))
    }

    pub fn set(&self, key: &str, value: impl Into<Value>) -> FieldResult<()> {
        let value = value.into();
        let watchers = {
            let mut state = write_lock(&self.state, "writing model value")?;
            if state.values.get(key) == Some(&value) {
                return Ok(());
            }
            state.values.insert(key.to_string(), value.clone());
            watchers_for(&state, key)
        };
        for watcher in watchers {
            watcher(key, &value);
        }
        Ok(())
    }

    pub fn remove(&self, key: &str) -> FieldResult<Option<Value>> {
        let (previous, watchers) = {
            let mut state = write_lock(&self.state, "removing model value")?;
            let Some(previous) = state.values.remove(key) else {
                return Ok(None);
            };
            (previous, watchers_for(&state, key))
        };
        for watcher in watchers {
            watcher(key, &Value::Null);
        }
        Ok(Some(previous))
    }

    pub fn watch(
        &self,
        key: impl Into<String>,
        callback: impl Fn(&str, &Value) + Send + Sync + 'static,
    ) -> FieldResult<WatchId> {
        let mut state = write_lock(&self.state, "registering model watcher")?;
        let id = WatchId(state.next_watch);
        state.next_watch += 1;
        state.watchers.insert(id, (key.into(), Arc::new(callback)));
        Ok(id)
    }

    pub fn unwatch(&self, id: WatchId) -> FieldResult<bool> {
        Ok(write_lock(&self.state, "removing model watcher")?
            .watchers
            .remove(&id)
            .is_some())
    }

    pub fn same_model(&self, other: &Model) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

fn watchers_for(state: &ModelState, key: &str) -> Vec<WatchCallback> {
    state
        .watchers
        .values()
        .filter(|(watched, _)| watched == key)
        .map(|(_, callback)| callback.clone())
        .collect()
}

pub(crate) fn read_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FieldResult<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| FieldError::StatePoisoned(context))
}

pub(crate) fn write_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FieldResult<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| FieldError::StatePoisoned(context))
}

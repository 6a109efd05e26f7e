use std::time::Duration;

use serde::Deserialize;

use crate::form::ValidationMessages;
use crate::registry::TypeRegistry;

/// How a result from an older run of a validator is treated once a newer run
/// of the same validator has started.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleResultPolicy {
    /// Only the most recently started run may write its result.
    #[default]
    DiscardSuperseded,
    /// Whichever run reports last wins, even if it was started earlier.
    LastCompletedWins,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(default)]
pub struct FieldOptions {
    pub stale_results: StaleResultPolicy,
    /// Record every validator of an empty, non-required field as satisfied
    /// without running it.
    pub skip_empty_optional: bool,
    pub settle_poll_interval_ms: u64,
}

impl Default for FieldOptions {
    fn default() -> Self {
        Self {
            stale_results: StaleResultPolicy::DiscardSuperseded,
            skip_empty_optional: true,
            settle_poll_interval_ms: 1,
        }
    }
}

impl FieldOptions {
    pub(crate) fn settle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.settle_poll_interval_ms.max(1))
    }
}

/// Configuration shared by every field controller mounted from it: the
/// field type registry, the default validation messages and the options.
///
/// Clones share the registry and the message table.
#[derive(Clone, Debug, Default)]
pub struct FieldProvider {
    types: TypeRegistry,
    messages: ValidationMessages,
    options: FieldOptions,
}

impl FieldProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_types(mut self, types: TypeRegistry) -> Self {
        self.types = types;
        self
    }

    pub fn with_messages(mut self, messages: ValidationMessages) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_options(mut self, options: FieldOptions) -> Self {
        self.options = options;
        self
    }

    pub fn set_options(mut self, configure: impl FnOnce(FieldOptions) -> FieldOptions) -> Self {
        self.options = configure(self.options);
        self
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn messages(&self) -> &ValidationMessages {
        &self.messages
    }

    pub fn options(&self) -> &FieldOptions {
        &self.options
    }
}

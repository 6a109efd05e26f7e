use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, RwLock};

use crate::element::Element;
use crate::error::{FieldError, FieldResult};
use crate::form::{FieldProps, read_lock, write_lock};

/// A pluggable renderer selected by a field's `type`.
///
/// Implementations receive the merged form/model/field context and may write
/// the field's value back through [`FieldProps::set_value`].
pub trait FieldType: Send + Sync {
    fn render(&self, props: &FieldProps) -> Element;
}

impl<F> FieldType for F
where
    F: Fn(&FieldProps) -> Element + Send + Sync,
{
    fn render(&self, props: &FieldProps) -> Element {
        (self)(props)
    }
}

pub type FieldTypeHandle = Arc<dyn FieldType>;

#[derive(Clone, Default)]
pub struct TypeRegistry {
    types: Arc<RwLock<BTreeMap<String, FieldTypeHandle>>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_type(
        &self,
        name: impl Into<String>,
        implementation: impl FieldType + 'static,
    ) -> FieldResult<()> {
        let name = name.into();
        let mut types = write_lock(&self.types, "registering field type")?;
        if types.insert(name.clone(), Arc::new(implementation)).is_some() {
            tracing::debug!(field_type = %name, "replaced registered field type");
        }
        Ok(())
    }

    pub fn unregister_type(&self, name: &str) -> FieldResult<bool> {
        Ok(write_lock(&self.types, "unregistering field type")?
            .remove(name)
            .is_some())
    }

    pub fn resolve(&self, name: &str) -> FieldResult<FieldTypeHandle> {
        read_lock(&self.types, "resolving field type")?
            .get(name)
            .cloned()
            .ok_or_else(|| FieldError::UnknownType {
                type_name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> FieldResult<bool> {
        Ok(read_lock(&self.types, "reading field types")?.contains_key(name))
    }

    pub fn type_names(&self) -> FieldResult<Vec<String>> {
        Ok(read_lock(&self.types, "listing field types")?
            .keys()
            .cloned()
            .collect())
    }
}

impl Debug for TypeRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let names = self.type_names().unwrap_or_default();
        f.debug_struct("TypeRegistry").field("types", &names).finish()
    }
}

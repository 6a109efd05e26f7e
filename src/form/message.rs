use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Deserializer};
use serde_json::{Number, Value};

use super::field::Field;
use super::state::{read_lock, write_lock};
use crate::error::FieldResult;

/// Default message templates keyed by validator name, used when a validator
/// declares no inline message. Clones share the same table.
#[derive(Clone, Debug, Default)]
pub struct ValidationMessages {
    templates: Arc<RwLock<BTreeMap<String, String>>>,
}

impl ValidationMessages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, validator: impl Into<String>, template: impl Into<String>) -> Self {
        if let Ok(mut templates) = self.templates.write() {
            templates.insert(validator.into(), template.into());
        }
        self
    }

    pub fn set(&self, validator: impl Into<String>, template: impl Into<String>) -> FieldResult<()> {
        write_lock(&self.templates, "setting validation message")?
            .insert(validator.into(), template.into());
        Ok(())
    }

    pub fn remove(&self, validator: &str) -> FieldResult<Option<String>> {
        Ok(write_lock(&self.templates, "removing validation message")?.remove(validator))
    }

    pub fn get(&self, validator: &str) -> FieldResult<Option<String>> {
        Ok(read_lock(&self.templates, "reading validation message")?
            .get(validator)
            .cloned())
    }
}

impl<K, V> FromIterator<(K, V)> for ValidationMessages
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let templates = iter
            .into_iter()
            .map(|(name, template)| (name.into(), template.into()))
            .collect::<BTreeMap<String, String>>();
        Self {
            templates: Arc::new(RwLock::new(templates)),
        }
    }
}

impl<'de> Deserialize<'de> for ValidationMessages {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        BTreeMap::<String, String>::deserialize(deserializer)
            .map(|templates| templates.into_iter().collect())
    }
}

/// Renders a message template for `field`: `%l` becomes the field's
/// `templateOptions.label` and `%v` the current `model[field.key]`.
/// Any other `%x` sequence is kept as written.
pub fn render(template: &str, field: &Field, model: &Value) -> String {
    let mut output = String::with_capacity(template.len());
    let mut cursor = 0;

    while cursor < template.len() {
        let tail = &template[cursor..];
        let Some(percent_rel) = tail.find('%') else {
            output.push_str(tail);
            break;
        };

        let percent = cursor + percent_rel;
        output.push_str(&template[cursor..percent]);

        match template[percent + 1..].chars().next() {
            Some('l') => {
                output.push_str(&display_value(field.template_options().get("label")));
                cursor = percent + 2;
            }
            Some('v') => {
                output.push_str(&display_value(model.get(field.key())));
                cursor = percent + 2;
            }
            Some(other) => {
                output.push('%');
                output.push(other);
                cursor = percent + 1 + other.len_utf8();
            }
            None => {
                output.push('%');
                cursor = percent + 1;
            }
        }
    }

    output
}

pub(crate) fn display_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => display_number(number),
        Some(other) => other.to_string(),
    }
}

/// Whole floats print without a fractional part, so `1.0` reads as `1`.
fn display_number(number: &Number) -> String {
    match number.as_f64() {
        Some(float)
            if number.is_f64() && float.fract() == 0.0 && float.abs() < 9_007_199_254_740_992.0 =>
        {
            (float as i64).to_string()
        }
        _ => number.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn labelled(label: Value) -> Field {
        Field::new("search", "test").template_option("label", label)
    }

    #[test]
    fn substitutes_label_and_value() {
        let field = labelled(json!("test"));
        let model = json!({ "search": "testing" });
        assert_eq!(render("%l and %v", &field, &model), "test and testing");
    }

    #[test]
    fn replaces_every_occurrence() {
        let field = labelled(json!("Age"));
        let model = json!({ "search": 7 });
        assert_eq!(render("%l: %v (%v)", &field, &model), "Age: 7 (7)");
    }

    #[test]
    fn whole_floats_render_like_integers() {
        let field = labelled(json!("Amount"));
        assert_eq!(render("%v", &field, &json!({ "search": 1.0 })), "1");
        assert_eq!(render("%v", &field, &json!({ "search": -20.0 })), "-20");
        assert_eq!(render("%v", &field, &json!({ "search": 1.5 })), "1.5");
        assert_eq!(render("%l %v", &labelled(json!(3.0)), &json!({})), "3 ");
    }

    #[test]
    fn missing_context_renders_empty() {
        let field = Field::new("search", "test");
        assert_eq!(render("[%l|%v]", &field, &json!({})), "[|]");
        assert_eq!(render("[%v]", &field, &json!({ "search": null })), "[]");
    }

    #[test]
    fn unknown_tokens_pass_through() {
        let field = labelled(json!("Name"));
        assert_eq!(
            render("100% of %x, %l%", &field, &json!({})),
            "100% of %x, Name%"
        );
    }

    #[test]
    fn registry_is_shared_and_deserializable() {
        let messages: ValidationMessages =
            serde_json::from_value(json!({ "required": "%l is required" })).expect("messages");
        let shared = messages.clone();
        shared.set("email", "not an email").expect("set");
        assert_eq!(
            messages.get("required").expect("get"),
            Some("%l is required".to_string())
        );
        assert_eq!(
            messages.get("email").expect("get"),
            Some("not an email".to_string())
        );
        assert_eq!(
            messages.remove("email").expect("remove"),
            Some("not an email".to_string())
        );
    }
}

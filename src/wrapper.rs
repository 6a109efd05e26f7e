use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::element::Element;
use crate::error::{FieldError, FieldResult};

/// A container a rendered field is placed into, given either as markup
/// (`<div class="row"></div>`) or as an already built element.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Wrapper {
    Markup(String),
    #[serde(skip)]
    Element(Element),
}

impl From<&str> for Wrapper {
    fn from(value: &str) -> Self {
        Self::Markup(value.to_string())
    }
}

impl From<String> for Wrapper {
    fn from(value: String) -> Self {
        Self::Markup(value)
    }
}

impl From<Element> for Wrapper {
    fn from(value: Element) -> Self {
        Self::Element(value)
    }
}

impl Wrapper {
    /// The empty container this wrapper describes.
    pub fn container(&self) -> FieldResult<Element> {
        let container = match self {
            Wrapper::Markup(markup) => parse_container(markup)?,
            Wrapper::Element(element) => element.clone(),
        };
        if container.tag.is_empty() {
            return Err(FieldError::invalid_wrapper("container has no tag name"));
        }
        if !container.is_empty() {
            return Err(FieldError::invalid_wrapper(format!(
                "<{}> must be empty to receive the field",
                container.tag
            )));
        }
        Ok(container)
    }
}

/// Places `element` as the only child of `wrapper`'s container, or returns it
/// untouched when there is no wrapper.
pub fn compose(element: Element, wrapper: Option<&Wrapper>) -> FieldResult<Element> {
    let Some(wrapper) = wrapper else {
        return Ok(element);
    };
    let mut container = wrapper.container()?;
    container.children = vec![element];
    Ok(container)
}

fn parse_container(markup: &str) -> FieldResult<Element> {
    let mut cursor = Cursor {
        input: markup,
        idx: 0,
    };
    cursor.skip_whitespace();
    if cursor.is_done() {
        return Err(FieldError::invalid_wrapper("markup is empty"));
    }
    cursor.expect('<')?;
    let tag = cursor.name()?;
    let mut attributes = BTreeMap::new();
    let self_closing = loop {
        cursor.skip_whitespace();
        if cursor.eat("/>") {
            break true;
        }
        if cursor.eat(">") {
            break false;
        }
        if cursor.is_done() {
            return Err(FieldError::invalid_wrapper(format!(
                "<{tag}> opening tag is not closed"
            )));
        }
        let name = cursor.name()?;
        cursor.skip_whitespace();
        let value = if cursor.eat("=") {
            cursor.skip_whitespace();
            cursor.quoted()?
        } else {
            String::new()
        };
        attributes.insert(name, value);
    };

    let mut text = String::new();
    if !self_closing {
        let close = format!("</{tag}");
        let Some(rel) = cursor.rest().find(&close) else {
            return Err(FieldError::invalid_wrapper(format!(
                "<{tag}> has no closing tag"
            )));
        };
        text.push_str(&cursor.rest()[..rel]);
        cursor.idx += rel + close.len();
        cursor.skip_whitespace();
        cursor.expect('>')?;
    }

    cursor.skip_whitespace();
    if !cursor.is_done() {
        return Err(FieldError::invalid_wrapper(format!(
            "expected a single root element, found trailing `{}`",
            cursor.rest()
        )));
    }
    if text.contains('<') {
        return Err(FieldError::invalid_wrapper(format!(
            "<{tag}> must not contain nested elements"
        )));
    }

    let trimmed = text.trim();
    Ok(Element {
        tag,
        attributes,
        text: (!trimmed.is_empty()).then(|| trimmed.to_string()),
        children: Vec::new(),
    })
}

struct Cursor<'a> {
    input: &'a str,
    idx: usize,
}

impl<'a> Cursor<'a> {
    fn rest(&self) -> &'a str {
        &self.input[self.idx..]
    }

    fn is_done(&self) -> bool {
        self.idx >= self.input.len()
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.idx += rest.len() - rest.trim_start().len();
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.idx += token.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> FieldResult<()> {
        match self.rest().chars().next() {
            Some(found) if found == c => {
                self.idx += c.len_utf8();
                Ok(())
            }
            Some(found) => Err(FieldError::invalid_wrapper(format!(
                "expected `{c}` at {}, found `{found}`",
                self.idx
            ))),
            None => Err(FieldError::invalid_wrapper(format!(
                "expected `{c}` at end of markup"
            ))),
        }
    }

    fn name(&mut self) -> FieldResult<String> {
        let rest = self.rest();
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.')))
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(FieldError::invalid_wrapper(format!(
                "expected a name at {}",
                self.idx
            )));
        }
        self.idx += len;
        Ok(rest[..len].to_string())
    }

    fn quoted(&mut self) -> FieldResult<String> {
        let rest = self.rest();
        let Some(quote) = rest.chars().next().filter(|c| matches!(c, '"' | '\'')) else {
            return Err(FieldError::invalid_wrapper(format!(
                "expected a quoted attribute value at {}",
                self.idx
            )));
        };
        let Some(end) = rest[1..].find(quote) else {
            return Err(FieldError::invalid_wrapper("unterminated attribute value"));
        };
        self.idx += end + 2;
        Ok(rest[1..=end].to_string())
    }
}

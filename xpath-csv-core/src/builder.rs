//! Assemble XPath expressions from a tag, predicates and a selection

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][\w.\-]*(:[A-Za-z_][\w.\-]*)?$").unwrap());

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuilderError {
    #[error("Invalid tag name: '{0}'")]
    InvalidTag(String),
    #[error("Invalid attribute name: '{0}'")]
    InvalidAttribute(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    AttributeExists(String),
    AttributeEquals(String, String),
    AttributeContains(String, String),
    TextEquals(String),
    TextContains(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
enum Selection {
    #[default]
    Element,
    Text,
    Attribute(String),
}

/// Builder for `//tag[...]` expressions
///
/// ```
/// use xpath_csv_core::XPathBuilder;
///
/// let xpath = XPathBuilder::new("book")
///     .attribute_equals("lang", "en")
///     .select_attribute("id")
///     .build()
///     .unwrap();
/// assert_eq!(xpath, "//book[@lang='en']/@id");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XPathBuilder {
    tag: String,
    predicates: Vec<Predicate>,
    selection: Selection,
}

impl XPathBuilder {
    pub fn new(tag: impl Into<String>) -> Self {
        XPathBuilder {
            tag: tag.into(),
            predicates: Vec::new(),
            selection: Selection::Element,
        }
    }

    pub fn attribute_exists(mut self, name: impl Into<String>) -> Self {
        self.predicates.push(Predicate::AttributeExists(name.into()));
        self
    }

    pub fn attribute_equals(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.predicates.push(Predicate::AttributeEquals(name.into(), value.into()));
        self
    }

    pub fn attribute_contains(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.predicates.push(Predicate::AttributeContains(name.into(), value.into()));
        self
    }

    pub fn text_equals(mut self, value: impl Into<String>) -> Self {
        self.predicates.push(Predicate::TextEquals(value.into()));
        self
    }

    pub fn text_contains(mut self, value: impl Into<String>) -> Self {
        self.predicates.push(Predicate::TextContains(value.into()));
        self
    }

    /// Select the element's text nodes
    pub fn select_text(mut self) -> Self {
        self.selection = Selection::Text;
        self
    }

    /// Select an attribute of the element
    pub fn select_attribute(mut self, name: impl Into<String>) -> Self {
        self.selection = Selection::Attribute(name.into());
        self
    }

    /// Select the element itself (the default)
    pub fn select_element(mut self) -> Self {
        self.selection = Selection::Element;
        self
    }

    pub fn build(&self) -> Result<String, BuilderError> {
        if !NAME_RE.is_match(&self.tag) {
            return Err(BuilderError::InvalidTag(self.tag.clone()));
        }

        let mut xpath = format!("//{}", self.tag);
        for predicate in &self.predicates {
            let condition = match predicate {
                Predicate::AttributeExists(name) => format!("@{}", attribute_name(name)?),
                Predicate::AttributeEquals(name, value) => {
                    format!("@{}={}", attribute_name(name)?, literal(value))
                }
                Predicate::AttributeContains(name, value) => {
                    format!("contains(@{}, {})", attribute_name(name)?, literal(value))
                }
                Predicate::TextEquals(value) => format!("text()={}", literal(value)),
                Predicate::TextContains(value) => format!("contains(text(), {})", literal(value)),
            };
            xpath.push('[');
            xpath.push_str(&condition);
            xpath.push(']');
        }

        match &self.selection {
            Selection::Element => {}
            Selection::Text => xpath.push_str("/text()"),
            Selection::Attribute(name) => {
                xpath.push_str("/@");
                xpath.push_str(attribute_name(name)?);
            }
        }
        Ok(xpath)
    }
}

fn attribute_name(name: &str) -> Result<&str, BuilderError> {
    let name = name.strip_prefix('@').unwrap_or(name);
    if NAME_RE.is_match(name) {
        Ok(name)
    } else {
        Err(BuilderError::InvalidAttribute(name.to_string()))
    }
}

/// XPath 1.0 string literal for `value`
///
/// Single quotes are preferred; a value containing both quote kinds is
/// spliced together with `concat()`.
pub fn literal(value: &str) -> String {
    if !value.contains('\'') {
        format!("'{}'", value)
    } else if !value.contains('"') {
        format!("\"{}\"", value)
    } else {
        let parts: Vec<String> = value
            .split('\'')
            .map(|part| format!("'{}'", part))
            .collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

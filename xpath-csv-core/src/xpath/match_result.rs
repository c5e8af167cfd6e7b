//! Match result types for XPath queries

/// What kind of item an XPath match was
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchNode {
    /// An element node; its value is the element's own leading text
    Element,
    /// An attribute node
    Attribute,
    /// A text node
    Text,
    /// Document, comment, processing instruction or namespace node
    Other,
    /// An atomic value such as a string or number
    Atomic,
}

/// A single item returned by an XPath evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XPathMatch {
    /// Kind of the matched item
    pub node: MatchNode,
    /// Untrimmed textual value
    pub value: String,
}

impl XPathMatch {
    pub fn new(node: MatchNode, value: impl Into<String>) -> Self {
        XPathMatch {
            node,
            value: value.into(),
        }
    }

    /// The value as it is written to a report cell: surrounding whitespace removed.
    ///
    /// For elements this is the text before the first child node, so
    /// `<item>foo<b>x</b></item>` yields `foo`.
    pub fn extracted_text(&self) -> &str {
        self.value.trim()
    }

    /// Whether the match carries a meaningful (non-blank) value
    pub fn has_text(&self) -> bool {
        !self.extracted_text().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracted_text_trims() {
        let m = XPathMatch::new(MatchNode::Text, "  foo \n");
        assert_eq!(m.extracted_text(), "foo");
        assert!(m.has_text());
    }

    #[test]
    fn test_blank_value_has_no_text() {
        let m = XPathMatch::new(MatchNode::Element, " \t ");
        assert!(!m.has_text());
    }
}

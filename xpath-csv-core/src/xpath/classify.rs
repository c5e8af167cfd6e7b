//! Decide how an expression's results are reported

use once_cell::sync::Lazy;
use regex::Regex;

static ATTRIBUTE_SELECT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/@\w+$").unwrap());

const TEXT_SELECT_SUFFIX: &str = "/text()";

/// How the matches of an expression end up in the report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchKind {
    /// Expression selects text or attribute values; each value is written out
    StringValue,
    /// Expression selects elements; only the number of matches is written
    Count,
}

impl MatchKind {
    /// The CSV column name used for an expression with the given header
    pub fn column_name(self, header: &str) -> String {
        match self {
            MatchKind::StringValue => header.to_string(),
            MatchKind::Count => format!("{} Match Count", header),
        }
    }
}

/// Classify an XPath expression by its literal text.
///
/// `//item/text()` and `//item/@id` are string-valued. Anything else, including
/// predicates such as `//item[@id='5']` or `//item[text()='x']`, selects
/// elements and is reported as a count.
pub fn classify(expression: &str) -> MatchKind {
    let expression = expression.trim();
    if expression.ends_with(TEXT_SELECT_SUFFIX) || ATTRIBUTE_SELECT_RE.is_match(expression) {
        MatchKind::StringValue
    } else {
        MatchKind::Count
    }
}

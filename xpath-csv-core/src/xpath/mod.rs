//! XPath 3.1 evaluation over XML files using xee-xpath
//!
//! This module loads XML documents, evaluates expressions against them, and
//! decides how the results of an expression should be reported.

mod classify;
mod engine;
mod match_result;

pub use classify::{classify, MatchKind};
pub use engine::{timing_stats, TimingStats, XPathEngine, XmlDocument};
pub use match_result::{MatchNode, XPathMatch};

use thiserror::Error;

/// Errors that can occur while loading XML or evaluating XPath
#[derive(Error, Debug)]
pub enum XPathError {
    #[error("Failed to compile XPath '{xpath}': {message}")]
    Compile { xpath: String, message: String },
    #[error("Failed to execute XPath '{xpath}': {message}")]
    Execute { xpath: String, message: String },
    #[error("Failed to read file: {0}")]
    FileRead(#[from] crate::encoding::ReadError),
    #[error("Failed to parse XML: {0}")]
    XmlParse(String),
}

//! Batch evaluation of XPath expressions over a folder of XML files
//!
//! The pieces, leaf first:
//! - [`generate_headers`]: CSV column set for a list of specs
//! - [`process_file`]: evaluate every spec against one file and shape the rows
//! - [`CsvSink`]: streaming CSV writer with a fixed header row
//! - [`Exporter`]: runs the whole folder on a worker pool and reports events

mod coordinator;
mod csv_writer;
mod events;
mod headers;
mod processor;

pub use coordinator::{ExportRequest, Exporter, RunStatus, RunSummary};
pub use csv_writer::CsvSink;
pub use events::{CancellationFlag, EventLog, EventSink, ExportEvent, LogSink};
pub use headers::{generate_headers, FILENAME_COLUMN};
pub use processor::process_file;

use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

use crate::xpath::{classify, MatchKind};

/// One output row: column name to cell text
pub type Row = HashMap<String, String>;

/// An XPath expression paired with the CSV header it reports under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XPathSpec {
    pub expression: String,
    pub header: String,
}

impl XPathSpec {
    pub fn new(expression: impl Into<String>, header: impl Into<String>) -> Self {
        XPathSpec {
            expression: expression.into(),
            header: header.into(),
        }
    }

    /// Use the expression text itself as the header
    pub fn with_default_header(expression: impl Into<String>) -> Self {
        let expression = expression.into();
        let header = expression.trim().to_string();
        XPathSpec { expression, header }
    }

    /// Pair up expressions and headers, which must have the same length
    pub fn zip(expressions: &[String], headers: &[String]) -> Result<Vec<XPathSpec>, ExportError> {
        if expressions.is_empty() || expressions.len() != headers.len() {
            return Err(ExportError::HeaderMismatch {
                expressions: expressions.len(),
                headers: headers.len(),
            });
        }
        Ok(expressions
            .iter()
            .zip(headers)
            .map(|(expression, header)| XPathSpec::new(expression.clone(), header.clone()))
            .collect())
    }

    pub fn kind(&self) -> MatchKind {
        classify(&self.expression)
    }

    /// Name of the CSV column this spec writes to
    pub fn column(&self) -> String {
        self.kind().column_name(&self.header)
    }
}

/// Everything one XML file contributed to the report
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileResult {
    /// Rows in match-index order; empty when the file had no matches
    pub rows: Vec<Row>,
    /// Matches across all specs
    pub total_matches: usize,
    /// Whether any spec matched at all
    pub had_matches: bool,
    /// Parse and evaluation problems met while processing the file
    pub diagnostics: Vec<String>,
}

impl FileResult {
    /// A result that contributes nothing
    pub fn empty() -> Self {
        Self::default()
    }

    fn skipped(diagnostic: String) -> Self {
        FileResult {
            diagnostics: vec![diagnostic],
            ..Self::default()
        }
    }
}

/// Running totals kept by the coordinator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTotals {
    pub total_sum_matches: usize,
    pub total_matching_files: usize,
    pub processed_files_count: usize,
    pub files_written: usize,
}

impl RunTotals {
    /// Fold one finished file into the totals. Returns whether rows were written.
    fn record(&mut self, result: &FileResult) -> bool {
        self.processed_files_count += 1;
        self.total_sum_matches += result.total_matches;
        if result.had_matches {
            self.total_matching_files += 1;
        }
        if result.rows.is_empty() {
            false
        } else {
            self.files_written += 1;
            true
        }
    }
}

/// Errors that end an export run
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Folder not found: {}", .0.display())]
    FolderNotFound(PathBuf),
    #[error("No output path given")]
    NoOutputPath,
    #[error("Number of headers ({headers}) does not match number of XPath expressions ({expressions})")]
    HeaderMismatch { expressions: usize, headers: usize },
    #[error("Failed to list XML files: {0}")]
    Listing(String),
    #[error("Failed to start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("Failed to write CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExportError {
    /// Whether the error was caught before any work started
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ExportError::FolderNotFound(_)
                | ExportError::NoOutputPath
                | ExportError::HeaderMismatch { .. }
                | ExportError::Listing(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zip_pairs_in_order() {
        let specs = XPathSpec::zip(
            &["//a/text()".to_string(), "//b".to_string()],
            &["A".to_string(), "B".to_string()],
        )
        .unwrap();
        assert_eq!(specs, vec![XPathSpec::new("//a/text()", "A"), XPathSpec::new("//b", "B")]);
    }

    #[test]
    fn test_zip_rejects_mismatch() {
        let err = XPathSpec::zip(&["//a".to_string()], &[]).unwrap_err();
        assert!(matches!(err, ExportError::HeaderMismatch { expressions: 1, headers: 0 }));
        assert!(err.is_configuration());
        assert!(err.to_string().contains("(0)"));
    }

    #[test]
    fn test_zip_rejects_empty() {
        assert!(XPathSpec::zip(&[], &[]).is_err());
    }

    #[test]
    fn test_default_header_is_expression() {
        let spec = XPathSpec::with_default_header(" //item/@id ");
        assert_eq!(spec.header, "//item/@id");
        assert_eq!(spec.column(), "//item/@id");
    }

    #[test]
    fn test_count_column() {
        assert_eq!(XPathSpec::new("//item", "Items").column(), "Items Match Count");
    }

    #[test]
    fn test_totals_record() {
        let mut totals = RunTotals::default();
        let mut row = Row::new();
        row.insert("Filename".to_string(), "a".to_string());
        let written = totals.record(&FileResult {
            rows: vec![row],
            total_matches: 3,
            had_matches: true,
            diagnostics: Vec::new(),
        });
        assert!(written);
        assert!(!totals.record(&FileResult::empty()));
        assert_eq!(
            totals,
            RunTotals {
                total_sum_matches: 3,
                total_matching_files: 1,
                processed_files_count: 2,
                files_written: 1,
            }
        );
    }
}

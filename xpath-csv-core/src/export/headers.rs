//! CSV column set for a run

use super::XPathSpec;

/// First column of every report
pub const FILENAME_COLUMN: &str = "Filename";

/// Build the report header row.
///
/// Starts with `Filename`, then one column per spec in order. A column name
/// that was already added is skipped, so specs sharing a header share a column.
pub fn generate_headers(specs: &[XPathSpec]) -> Vec<String> {
    let mut headers = vec![FILENAME_COLUMN.to_string()];
    for spec in specs {
        let column = spec.column();
        if !headers.contains(&column) {
            headers.push(column);
        }
    }
    headers
}

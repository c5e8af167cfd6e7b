//! Evaluate every spec against one XML file and shape the result into rows

use std::path::Path;

use log::{debug, warn};

use super::{CancellationFlag, FileResult, Row, XPathSpec, FILENAME_COLUMN};
use crate::xpath::{MatchKind, XPathEngine, XmlDocument};

/// What one spec produced for a file
enum Outcome {
    /// Non-empty extracted values, in document order
    Values(Vec<String>),
    /// Number of matched items
    Count(usize),
}

impl Outcome {
    fn empty(kind: MatchKind) -> Self {
        match kind {
            MatchKind::StringValue => Outcome::Values(Vec::new()),
            MatchKind::Count => Outcome::Count(0),
        }
    }

    fn matches(&self) -> usize {
        match self {
            Outcome::Values(values) => values.len(),
            Outcome::Count(count) => *count,
        }
    }

    /// Rows this outcome needs; a count only ever needs the first row
    fn rows_needed(&self) -> usize {
        match self {
            Outcome::Values(values) => values.len(),
            Outcome::Count(count) => (*count).min(1),
        }
    }

    fn cell(&self, row_index: usize) -> String {
        match self {
            Outcome::Values(values) => values.get(row_index).cloned().unwrap_or_default(),
            Outcome::Count(count) if row_index == 0 => count.to_string(),
            Outcome::Count(_) => String::new(),
        }
    }

    fn grouped_cell(&self) -> String {
        match self {
            Outcome::Values(values) => values.join(";"),
            Outcome::Count(count) => count.to_string(),
        }
    }
}

/// Evaluate all specs against `folder/file_name`.
///
/// Never fails: an unreadable or malformed file yields an empty result with a
/// diagnostic, and a failing expression counts as zero matches for that
/// expression only. When `cancel` is set before or during processing the
/// result is empty, never partial.
pub fn process_file(
    file_name: &str,
    folder: &Path,
    specs: &[XPathSpec],
    group_matches: bool,
    cancel: &CancellationFlag,
) -> FileResult {
    if cancel.is_cancelled() {
        return FileResult::empty();
    }

    let path = folder.join(file_name);
    let mut doc = match XmlDocument::from_file(&path) {
        Ok(doc) => doc,
        Err(e) => {
            warn!("{}: skipped: {}", file_name, e);
            return FileResult::skipped(format!("Skipped {}: {}", file_name, e));
        }
    };

    let engine = XPathEngine::new();
    let mut diagnostics = Vec::new();
    let mut outcomes = Vec::with_capacity(specs.len());

    for spec in specs {
        if cancel.is_cancelled() {
            debug!("{}: cancelled before '{}'", file_name, spec.expression);
            return FileResult::empty();
        }

        let kind = spec.kind();
        let outcome = match engine.evaluate(&mut doc, &spec.expression) {
            Ok(matches) => match kind {
                MatchKind::StringValue => Outcome::Values(
                    matches
                        .iter()
                        .filter(|m| m.has_text())
                        .map(|m| m.extracted_text().to_string())
                        .collect(),
                ),
                MatchKind::Count => Outcome::Count(matches.len()),
            },
            Err(e) => {
                warn!("{}: {}", file_name, e);
                diagnostics.push(format!("Error in {}: {}", file_name, e));
                Outcome::empty(kind)
            }
        };
        outcomes.push((spec, outcome));
    }

    let max_matches = outcomes
        .iter()
        .map(|(_, outcome)| outcome.rows_needed())
        .max()
        .unwrap_or(0);

    if max_matches == 0 {
        return FileResult {
            diagnostics,
            ..FileResult::default()
        };
    }

    let total_matches = outcomes.iter().map(|(_, outcome)| outcome.matches()).sum();
    let stem = file_stem(file_name);

    let rows = if group_matches {
        vec![build_row(&stem, &outcomes, Outcome::grouped_cell)]
    } else {
        (0..max_matches)
            .map(|i| build_row(&stem, &outcomes, |outcome| outcome.cell(i)))
            .collect()
    };

    FileResult {
        rows,
        total_matches,
        had_matches: true,
        diagnostics,
    }
}

fn build_row(stem: &str, outcomes: &[(&XPathSpec, Outcome)], cell: impl Fn(&Outcome) -> String) -> Row {
    let mut row = Row::with_capacity(outcomes.len() + 1);
    row.insert(FILENAME_COLUMN.to_string(), stem.to_string());
    for (spec, outcome) in outcomes {
        let value = cell(outcome);
        // Specs sharing a column: a later spec only replaces an earlier value when it has one
        let existing = row.entry(spec.column()).or_default();
        if existing.is_empty() || !value.is_empty() {
            *existing = value;
        }
    }
    row
}

/// Base name without extension
fn file_stem(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string())
}

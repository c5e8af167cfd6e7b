//! Export jobs stored as TOML
//!
//! ```toml
//! folder = "invoices"
//! output = "report.csv"
//! group_matches = false
//! workers = 4
//!
//! [[columns]]
//! xpath = "//invoice/@number"
//! header = "Invoice"
//!
//! [[columns]]
//! xpath = "//line"
//! ```
//!
//! A column without `header` reports under its expression text. Relative
//! paths in a job file are resolved against the file's own directory.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::export::{ExportRequest, XPathSpec};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read job file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid job file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Job has no columns")]
    NoColumns,
    #[error("Column {0} has an empty xpath")]
    EmptyExpression(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnConfig {
    pub xpath: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
}

impl ColumnConfig {
    pub fn to_spec(&self) -> XPathSpec {
        match &self.header {
            Some(header) => XPathSpec::new(self.xpath.clone(), header.clone()),
            None => XPathSpec::with_default_header(self.xpath.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExportJob {
    pub folder: PathBuf,
    pub output: PathBuf,
    #[serde(default)]
    pub group_matches: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    #[serde(default)]
    pub columns: Vec<ColumnConfig>,
}

impl ExportJob {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let job: ExportJob = toml::from_str(text)?;
        if job.columns.is_empty() {
            return Err(ConfigError::NoColumns);
        }
        if let Some(index) = job.columns.iter().position(|c| c.xpath.trim().is_empty()) {
            return Err(ConfigError::EmptyExpression(index + 1));
        }
        Ok(job)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        debug!("Loading job file {}", path.display());
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut job = Self::from_toml_str(&text)?;
        if let Some(base) = path.parent() {
            job.folder = base.join(&job.folder);
            job.output = base.join(&job.output);
        }
        Ok(job)
    }

    pub fn specs(&self) -> Vec<XPathSpec> {
        self.columns.iter().map(ColumnConfig::to_spec).collect()
    }

    pub fn into_request(self) -> ExportRequest {
        let specs = self.specs();
        let mut request = ExportRequest::new(self.folder, self.output)
            .with_specs(specs)
            .group_matches(self.group_matches);
        request.max_workers = self.workers;
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const JOB: &str = r#"
folder = "data"
output = "out.csv"
workers = 2

[[columns]]
xpath = "//item/@id"
header = "ID"

[[columns]]
xpath = " //item "
"#;

    #[test]
    fn test_parse_job() {
        let job = ExportJob::from_toml_str(JOB).unwrap();
        assert_eq!(job.folder, PathBuf::from("data"));
        assert!(!job.group_matches);
        assert_eq!(job.workers, Some(2));
        assert_eq!(
            job.specs(),
            vec![XPathSpec::new("//item/@id", "ID"), XPathSpec::new(" //item ", "//item")]
        );
    }

    #[test]
    fn test_into_request() {
        let request = ExportJob::from_toml_str(JOB).unwrap().into_request();
        assert_eq!(request.expressions.len(), 2);
        assert_eq!(request.headers, vec!["ID".to_string(), "//item".to_string()]);
        assert_eq!(request.max_workers, Some(2));
        assert_eq!(request.output_path, PathBuf::from("out.csv"));
    }

    #[test]
    fn test_rejects_bad_jobs() {
        assert!(matches!(
            ExportJob::from_toml_str("folder = \"a\"\noutput = \"b\"\n"),
            Err(ConfigError::NoColumns)
        ));
        assert!(matches!(
            ExportJob::from_toml_str("folder = \"a\"\noutput = \"b\"\n[[columns]]\nxpath = \"  \"\n"),
            Err(ConfigError::EmptyExpression(1))
        ));
        assert!(matches!(
            ExportJob::from_toml_str("folder = \"a\"\noutput = \"b\"\ncolour = 1\n"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(ExportJob::from_toml_str("folder = "), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_from_path_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.toml");
        fs::write(&path, JOB).unwrap();
        let job = ExportJob::from_path(&path).unwrap();
        assert_eq!(job.folder, dir.path().join("data"));
        assert_eq!(job.output, dir.path().join("out.csv"));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ExportJob::from_path(&dir.path().join("none.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}

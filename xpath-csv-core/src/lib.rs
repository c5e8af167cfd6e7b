//! xpath-csv-core: XPath-to-CSV extraction over folders of XML files
//!
//! This library provides:
//! - XPath 3.1 evaluation over XML documents (via xee-xpath)
//! - Parallel batch export of XPath results into a single CSV report
//! - Tag and attribute sampling to help discover expressions
//! - A small builder for common `//tag[...]` expressions
//! - TOML export job files

pub mod builder;
pub mod colors;
pub mod config;
pub mod encoding;
pub mod export;
pub mod files;
pub mod sample;
pub mod xpath;

pub use builder::{BuilderError, XPathBuilder};
pub use config::{ColumnConfig, ConfigError, ExportJob};
pub use export::{
    CancellationFlag, EventLog, EventSink, ExportError, ExportEvent, ExportRequest, Exporter, FileResult,
    LogSink, RunStatus, RunSummary, RunTotals, XPathSpec,
};
pub use files::list_xml_files;
pub use sample::{sample_folder, SampleError, TagSample};
pub use xpath::{classify, timing_stats, MatchKind, XPathEngine, XPathError, XmlDocument};

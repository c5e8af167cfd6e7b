//! XPath 3.1 query engine implementation

use super::{MatchNode, XPathError, XPathMatch};
use crate::encoding::read_xml;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use xee_xpath::{query::SequenceQuery, DocumentHandle, Documents, Queries, Query};
use xot::{Node, Value, Xot};

// Timing stats (in microseconds) for profiling
static TIMING_XML_LOAD: AtomicU64 = AtomicU64::new(0);
static TIMING_QUERY_EXEC: AtomicU64 = AtomicU64::new(0);
static TIMING_DOCUMENTS: AtomicU64 = AtomicU64::new(0);
static TIMING_QUERIES: AtomicU64 = AtomicU64::new(0);

/// Compiled queries kept per thread before the cache is reset
const MAX_CACHED_QUERIES: usize = 256;

/// Accumulated load/evaluate timings across all threads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimingStats {
    pub documents: u64,
    pub queries: u64,
    pub xml_load_micros: u64,
    pub query_exec_micros: u64,
}

impl fmt::Display for TimingStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let per_doc = |micros: u64| {
            if self.documents == 0 {
                0.0
            } else {
                micros as f64 / 1000.0 / self.documents as f64
            }
        };
        write!(
            f,
            "{} documents, {} queries; XML loading {:.2}ms ({:.2}ms/file), query exec {:.2}ms ({:.2}ms/file)",
            self.documents,
            self.queries,
            self.xml_load_micros as f64 / 1000.0,
            per_doc(self.xml_load_micros),
            self.query_exec_micros as f64 / 1000.0,
            per_doc(self.query_exec_micros),
        )
    }
}

/// Snapshot of the accumulated timing stats
pub fn timing_stats() -> TimingStats {
    TimingStats {
        documents: TIMING_DOCUMENTS.load(Ordering::Relaxed),
        queries: TIMING_QUERIES.load(Ordering::Relaxed),
        xml_load_micros: TIMING_XML_LOAD.load(Ordering::Relaxed),
        query_exec_micros: TIMING_QUERY_EXEC.load(Ordering::Relaxed),
    }
}

// Thread-local cache for compiled XPath queries.
// Every worker compiles each expression once and reuses it for all its files.
thread_local! {
    static QUERY_CACHE: RefCell<HashMap<String, SequenceQuery>> = RefCell::new(HashMap::new());
}

fn compile(xpath: &str) -> Result<SequenceQuery, XPathError> {
    let queries = Queries::default();
    queries.sequence(xpath).map_err(|e| XPathError::Compile {
        xpath: xpath.to_string(),
        message: e.to_string(),
    })
}

/// A parsed XML document ready to be queried
pub struct XmlDocument {
    documents: Documents,
    handle: DocumentHandle,
    path: PathBuf,
}

impl XmlDocument {
    /// Read and parse an XML file
    pub fn from_file(path: &Path) -> Result<Self, XPathError> {
        let xml = read_xml(path)?;
        Self::parse(&xml, path)
    }

    /// Parse XML text; `path` is only used for diagnostics
    pub fn parse(xml: &str, path: impl Into<PathBuf>) -> Result<Self, XPathError> {
        let t0 = Instant::now();
        let mut documents = Documents::new();
        let handle = documents
            .add_string("file:///document".try_into().unwrap(), xml)
            .map_err(|e| XPathError::XmlParse(e.to_string()))?;

        TIMING_XML_LOAD.fetch_add(t0.elapsed().as_micros() as u64, Ordering::Relaxed);
        TIMING_DOCUMENTS.fetch_add(1, Ordering::Relaxed);

        Ok(XmlDocument {
            documents,
            handle,
            path: path.into(),
        })
    }

    /// Path the document was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for XmlDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XmlDocument").field("path", &self.path).finish()
    }
}

/// XPath query engine using xee-xpath
///
/// Queries are cached per-thread, so evaluating the same expressions against
/// many files only compiles each expression once per worker.
#[derive(Debug, Clone, Copy, Default)]
pub struct XPathEngine;

impl XPathEngine {
    pub fn new() -> Self {
        XPathEngine
    }

    /// Check that an expression compiles
    pub fn check(&self, xpath: &str) -> Result<(), XPathError> {
        compile(xpath).map(|_| ())
    }

    /// Evaluate an expression against a document and return every item it yields
    pub fn evaluate(&self, doc: &mut XmlDocument, xpath: &str) -> Result<Vec<XPathMatch>, XPathError> {
        QUERY_CACHE.with(|cache| {
            let mut cache = cache.borrow_mut();

            if !cache.contains_key(xpath) {
                if cache.len() >= MAX_CACHED_QUERIES {
                    cache.clear();
                }
                let query = compile(xpath)?;
                cache.insert(xpath.to_string(), query);
            }
            let Some(query) = cache.get(xpath) else {
                return Err(XPathError::Compile {
                    xpath: xpath.to_string(),
                    message: "query cache miss".to_string(),
                });
            };

            let t0 = Instant::now();
            let results = query
                .execute(&mut doc.documents, doc.handle)
                .map_err(|e: xee_xpath::error::Error| XPathError::Execute {
                    xpath: xpath.to_string(),
                    message: e.to_string(),
                })?;

            let xot = doc.documents.xot();
            let mut matches = Vec::new();
            for item in results.iter() {
                match item {
                    xee_xpath::Item::Node(node) => matches.push(node_match(xot, node)),
                    xee_xpath::Item::Atomic(atomic) => {
                        let value = atomic.to_string().unwrap_or_default();
                        matches.push(XPathMatch::new(MatchNode::Atomic, value));
                    }
                    xee_xpath::Item::Function(_) => {}
                }
            }

            TIMING_QUERY_EXEC.fetch_add(t0.elapsed().as_micros() as u64, Ordering::Relaxed);
            TIMING_QUERIES.fetch_add(1, Ordering::Relaxed);

            Ok(matches)
        })
    }
}

fn node_match(xot: &Xot, node: Node) -> XPathMatch {
    match xot.value(node) {
        Value::Element(_) => XPathMatch::new(MatchNode::Element, leading_text(xot, node)),
        Value::Attribute(_) => XPathMatch::new(MatchNode::Attribute, xot.string_value(node)),
        Value::Text(_) => XPathMatch::new(MatchNode::Text, xot.string_value(node)),
        _ => XPathMatch::new(MatchNode::Other, xot.string_value(node)),
    }
}

/// Text that precedes the first child node of an element
fn leading_text(xot: &Xot, element: Node) -> String {
    match xot.first_child(element).map(|child| xot.value(child)) {
        Some(Value::Text(text)) => text.get().to_string(),
        _ => String::new(),
    }
}

//! Tag and attribute sampling across a folder of XML files
//!
//! Scans a limited number of files and records, per element path, how often it
//! occurs, which text values it carries and which attributes (with sample
//! values) appear on it. The result feeds the XPath builder and the `sample`
//! command.

mod tree;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;

use crate::encoding::read_xml;
use crate::files::{in_folder, list_xml_files};

/// Distinct values kept per path or attribute
pub const MAX_SAMPLE_VALUES: usize = 20;

/// Errors that prevent sampling a folder
#[derive(Error, Debug)]
pub enum SampleError {
    #[error("Folder not found: {}", .0.display())]
    FolderNotFound(PathBuf),
    #[error("Failed to list XML files: {0}")]
    Listing(#[from] glob::PatternError),
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("document has no root element or is not closed")]
    Incomplete,
}

/// Occurrences, text samples and attributes seen at one element path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct PathInfo {
    count: usize,
    values: Vec<String>,
    attributes: BTreeMap<String, Vec<String>>,
}

fn push_sample(values: &mut Vec<String>, value: &str) {
    if values.len() < MAX_SAMPLE_VALUES && !values.iter().any(|v| v == value) {
        values.push(value.to_string());
    }
}

/// One element path in serialisable form
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathEntry {
    pub path: String,
    pub count: usize,
    pub values: Vec<String>,
    pub attributes: BTreeMap<String, Vec<String>>,
}

/// Aggregated structure of the sampled files
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSample {
    paths: HashMap<Vec<String>, PathInfo>,
    files_sampled: usize,
    skipped_files: Vec<PathBuf>,
}

impl TagSample {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample one XML document. Malformed input leaves the sample untouched.
    pub fn collect_from_xml_string(&mut self, xml: &str) -> Result<(), SampleError> {
        let mut file_sample = TagSample::new();
        file_sample.collect(xml)?;
        file_sample.files_sampled = 1;
        self.merge(file_sample);
        Ok(())
    }

    fn collect(&mut self, xml: &str) -> Result<(), SampleError> {
        let mut stack: Vec<String> = Vec::new();
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);
        let mut saw_root = false;

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    stack.push(tag_name(&e));
                    self.record_element(&stack, &e);
                    saw_root = true;
                }
                Event::Empty(e) => {
                    stack.push(tag_name(&e));
                    self.record_element(&stack, &e);
                    stack.pop();
                    saw_root = true;
                }
                Event::End(_) => {
                    stack.pop();
                }
                Event::Text(e) => {
                    let text = e.unescape().unwrap_or_default().trim().to_string();
                    if !text.is_empty() && !stack.is_empty() {
                        if let Some(info) = self.paths.get_mut(&stack) {
                            push_sample(&mut info.values, &text);
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() || !saw_root {
            return Err(SampleError::Incomplete);
        }
        Ok(())
    }

    fn record_element(&mut self, stack: &[String], element: &BytesStart<'_>) {
        let info = self.paths.entry(stack.to_vec()).or_default();
        info.count += 1;
        for attribute in element.attributes().flatten() {
            let name = String::from_utf8_lossy(attribute.key.as_ref()).to_string();
            let value = attribute
                .unescape_value()
                .map(|v| v.trim().to_string())
                .unwrap_or_default();
            let values = info.attributes.entry(name).or_default();
            if !value.is_empty() {
                push_sample(values, &value);
            }
        }
    }

    /// Merge another sample into this one
    ///
    /// Used for parallel sampling: each worker samples its own file, then all
    /// samples are folded into the final result.
    pub fn merge(&mut self, other: TagSample) {
        for (path, other_info) in other.paths {
            let entry = self.paths.entry(path).or_default();
            entry.count += other_info.count;
            for value in &other_info.values {
                push_sample(&mut entry.values, value);
            }
            for (name, values) in other_info.attributes {
                let merged = entry.attributes.entry(name).or_default();
                for value in &values {
                    push_sample(merged, value);
                }
            }
        }
        self.files_sampled += other.files_sampled;
        self.skipped_files.extend(other.skipped_files);
    }

    pub fn files_sampled(&self) -> usize {
        self.files_sampled
    }

    /// Files that could not be read or were not well-formed
    pub fn skipped_files(&self) -> &[PathBuf] {
        &self.skipped_files
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Distinct tag names, sorted
    pub fn tags(&self) -> Vec<String> {
        let tags: BTreeSet<&String> = self.paths.keys().filter_map(|path| path.last()).collect();
        tags.into_iter().cloned().collect()
    }

    fn infos_for<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a PathInfo> + 'a {
        self.paths
            .iter()
            .filter(move |(path, _)| path.last().map(String::as_str) == Some(tag))
            .map(|(_, info)| info)
    }

    /// Attribute names seen on `tag`, sorted
    pub fn attributes(&self, tag: &str) -> Vec<String> {
        let names: BTreeSet<&String> = self.infos_for(tag).flat_map(|info| info.attributes.keys()).collect();
        names.into_iter().cloned().collect()
    }

    /// Sample values of `attribute` on `tag`, sorted
    pub fn attribute_values(&self, tag: &str, attribute: &str) -> Vec<String> {
        let values: BTreeSet<&String> = self
            .infos_for(tag)
            .filter_map(|info| info.attributes.get(attribute))
            .flatten()
            .collect();
        values.into_iter().cloned().collect()
    }

    /// Sample text values of `tag`, sorted
    pub fn text_values(&self, tag: &str) -> Vec<String> {
        let values: BTreeSet<&String> = self.infos_for(tag).flat_map(|info| info.values.iter()).collect();
        values.into_iter().cloned().collect()
    }

    /// All paths in document-path order
    pub fn entries(&self) -> Vec<PathEntry> {
        let mut entries: Vec<PathEntry> = self
            .paths
            .iter()
            .map(|(path, info)| PathEntry {
                path: path.join("/"),
                count: info.count,
                values: info.values.clone(),
                attributes: info.attributes.clone(),
            })
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        #[derive(Serialize)]
        struct Report<'a> {
            files_sampled: usize,
            skipped_files: &'a [PathBuf],
            paths: Vec<PathEntry>,
        }
        serde_json::to_string_pretty(&Report {
            files_sampled: self.files_sampled,
            skipped_files: &self.skipped_files,
            paths: self.entries(),
        })
    }
}

fn tag_name(element: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(element.name().as_ref()).to_string()
}

fn sample_file(path: &Path) -> TagSample {
    let mut sample = TagSample::new();
    let outcome = read_xml(path)
        .map_err(|e| e.to_string())
        .and_then(|xml| sample.collect_from_xml_string(&xml).map_err(|e| e.to_string()));
    if let Err(reason) = outcome {
        warn!("{}: not sampled: {}", path.display(), reason);
        sample.skipped_files.push(path.to_path_buf());
    }
    sample
}

/// Sample the first `max_files` XML files (by name) in `folder`
pub fn sample_folder(folder: &Path, max_files: usize) -> Result<TagSample, SampleError> {
    if !folder.is_dir() {
        return Err(SampleError::FolderNotFound(folder.to_path_buf()));
    }
    let mut names = list_xml_files(folder)?;
    names.truncate(max_files);
    debug!("Sampling {} files from {}", names.len(), folder.display());

    let sample = in_folder(folder, &names)
        .par_iter()
        .map(|path| sample_file(path))
        .reduce(TagSample::new, |mut acc, sample| {
            acc.merge(sample);
            acc
        });
    Ok(sample)
}

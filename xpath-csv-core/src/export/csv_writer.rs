//! Streaming CSV output with a fixed header row

use std::fs::File;
use std::io::Write;
use std::path::Path;

use csv::{QuoteStyle, Writer, WriterBuilder};
use log::debug;

use super::{ExportError, Row};

/// CSV writer bound to the header set chosen when it was opened.
///
/// Every field is quoted. Row keys that are not headers are ignored and
/// headers missing from a row are written as empty fields.
pub struct CsvSink<W: Write = File> {
    writer: Writer<W>,
    headers: Vec<String>,
    rows_written: usize,
}

impl CsvSink<File> {
    /// Create (or truncate) the output file and write the header row
    pub fn open(path: &Path, headers: Vec<String>) -> Result<Self, ExportError> {
        debug!("Opening CSV output {}", path.display());
        let file = File::create(path)?;
        Self::from_writer(file, headers)
    }
}

impl<W: Write> CsvSink<W> {
    /// Wrap any writer and write the header row
    pub fn from_writer(inner: W, headers: Vec<String>) -> Result<Self, ExportError> {
        let mut writer = WriterBuilder::new()
            .delimiter(b',')
            .quote_style(QuoteStyle::Always)
            .from_writer(inner);
        writer.write_record(&headers)?;
        writer.flush()?;
        Ok(CsvSink {
            writer,
            headers,
            rows_written: 0,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Data rows written so far (the header row is not counted)
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    pub fn write_row(&mut self, row: &Row) -> Result<(), ExportError> {
        let record = self
            .headers
            .iter()
            .map(|header| row.get(header).map(String::as_str).unwrap_or(""));
        self.writer.write_record(record)?;
        self.rows_written += 1;
        Ok(())
    }

    /// Write a file's rows and push them to disk
    pub fn write_rows(&mut self, rows: &[Row]) -> Result<(), ExportError> {
        for row in rows {
            self.write_row(row)?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Flush and hand back the underlying writer
    pub fn close(self) -> Result<W, ExportError> {
        self.writer
            .into_inner()
            .map_err(|e| ExportError::Io(e.into_error()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn render(sink: CsvSink<Vec<u8>>) -> String {
        String::from_utf8(sink.close().unwrap()).unwrap()
    }

    #[test]
    fn test_header_row_quoted() {
        let sink = CsvSink::from_writer(Vec::new(), headers(&["Filename", "A"])).unwrap();
        assert_eq!(render(sink), "\"Filename\",\"A\"\n");
    }

    #[test]
    fn test_rows_follow_header_order() {
        let mut sink = CsvSink::from_writer(Vec::new(), headers(&["Filename", "A", "B"])).unwrap();
        sink.write_row(&row(&[("B", "2"), ("Filename", "f"), ("A", "1")])).unwrap();
        assert_eq!(sink.rows_written(), 1);
        assert_eq!(render(sink), "\"Filename\",\"A\",\"B\"\n\"f\",\"1\",\"2\"\n");
    }

    #[test]
    fn test_unknown_keys_ignored_missing_keys_empty() {
        let mut sink = CsvSink::from_writer(Vec::new(), headers(&["Filename", "A"])).unwrap();
        sink.write_rows(&[row(&[("Filename", "f"), ("Extra", "x")])]).unwrap();
        assert_eq!(sink.headers(), &["Filename".to_string(), "A".to_string()]);
        assert_eq!(render(sink), "\"Filename\",\"A\"\n\"f\",\"\"\n");
    }

    #[test]
    fn test_embedded_delimiters_and_quotes() {
        let mut sink = CsvSink::from_writer(Vec::new(), headers(&["A"])).unwrap();
        sink.write_row(&row(&[("A", "x, \"y\"; z")])).unwrap();
        assert_eq!(render(sink), "\"A\"\n\"x, \"\"y\"\"; z\"\n");
    }

    #[test]
    fn test_utf8_preserved() {
        let mut sink = CsvSink::from_writer(Vec::new(), headers(&["Naam"])).unwrap();
        sink.write_row(&row(&[("Naam", "Ærø ñ 日本")])).unwrap();
        assert_eq!(render(sink), "\"Naam\"\n\"Ærø ñ 日本\"\n");
    }

    #[test]
    fn test_open_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut sink = CsvSink::open(&path, headers(&["Filename"])).unwrap();
        sink.write_rows(&[row(&[("Filename", "a")])]).unwrap();
        sink.close().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "\"Filename\"\n\"a\"\n");
    }
}

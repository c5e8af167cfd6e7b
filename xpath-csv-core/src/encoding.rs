//! Reading XML files in the encoding they declare
//!
//! The byte order mark wins, then the `encoding` pseudo-attribute of the XML
//! declaration, then UTF-8. The returned text is UTF-8 and its declaration (if
//! any) says so.

use std::borrow::Cow;
use std::fs;
use std::io;
use std::path::Path;

use encoding_rs::{Encoding, UTF_8};
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use thiserror::Error;

static DECL_ENCODING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\A<\?xml[^>]*?\sencoding\s*=\s*["']([A-Za-z0-9._:\-]+)["']"#).unwrap());

#[derive(Error, Debug)]
pub enum ReadError {
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("unsupported encoding '{0}'")]
    UnknownEncoding(String),
    #[error("content is not valid {0}")]
    Invalid(&'static str),
}

/// Read a file and decode it to text
pub fn read_xml(path: &Path) -> Result<String, ReadError> {
    let bytes = fs::read(path)?;
    decode_xml(&bytes).map(Cow::into_owned)
}

/// Decode raw XML bytes
pub fn decode_xml(bytes: &[u8]) -> Result<Cow<'_, str>, ReadError> {
    let (encoding, body) = match Encoding::for_bom(bytes) {
        Some((encoding, bom_len)) => (encoding, &bytes[bom_len..]),
        None => (declared_encoding(bytes)?.unwrap_or(UTF_8), bytes),
    };

    if encoding == UTF_8 {
        return std::str::from_utf8(body)
            .map(Cow::Borrowed)
            .map_err(|_| ReadError::Invalid(UTF_8.name()));
    }

    let text = encoding
        .decode_without_bom_handling_and_without_replacement(body)
        .ok_or(ReadError::Invalid(encoding.name()))?;
    Ok(Cow::Owned(mark_utf8(&text)))
}

fn declared_encoding(bytes: &[u8]) -> Result<Option<&'static Encoding>, ReadError> {
    let Some(caps) = DECL_ENCODING_RE.captures(bytes) else {
        return Ok(None);
    };
    let label = &caps[1];
    // A readable UTF-16 declaration means the bytes are ASCII-compatible after all
    Encoding::for_label(label)
        .map(|encoding| Some(encoding.output_encoding()))
        .ok_or_else(|| ReadError::UnknownEncoding(String::from_utf8_lossy(label).into_owned()))
}

/// Rewrite the declared encoding of already decoded text to UTF-8
fn mark_utf8(text: &str) -> String {
    match DECL_ENCODING_RE.captures(text.as_bytes()).and_then(|caps| caps.get(1)) {
        Some(label) => format!("{}UTF-8{}", &text[..label.start()], &text[label.end()..]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_utf8_borrowed() {
        let xml = "<r>Ærø</r>".as_bytes();
        assert!(matches!(decode_xml(xml).unwrap(), Cow::Borrowed("<r>Ærø</r>")));
    }

    #[test]
    fn test_utf8_bom_stripped() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"<r/>");
        assert_eq!(decode_xml(&bytes).unwrap(), "<r/>");
    }

    #[test]
    fn test_latin1_declaration() {
        let mut bytes = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><r>caf".to_vec();
        bytes.push(0xE9);
        bytes.extend_from_slice(b"</r>");
        assert_eq!(
            decode_xml(&bytes).unwrap(),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><r>café</r>"
        );
    }

    #[test]
    fn test_utf16_bom() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "<r>x</r>".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(decode_xml(&bytes).unwrap(), "<r>x</r>");
    }

    #[test]
    fn test_utf16_declaration_without_bom_read_as_utf8() {
        let xml = b"<?xml version=\"1.0\" encoding=\"UTF-16\"?><r>x</r>";
        assert_eq!(decode_xml(xml).unwrap(), "<?xml version=\"1.0\" encoding=\"UTF-16\"?><r>x</r>");
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        assert!(matches!(decode_xml(b"<r>\xE9</r>"), Err(ReadError::Invalid(_))));
    }

    #[test]
    fn test_unknown_encoding_rejected() {
        let err = decode_xml(b"<?xml version='1.0' encoding='klingon'?><r/>").unwrap_err();
        assert!(matches!(err, ReadError::UnknownEncoding(label) if label == "klingon"));
    }
}

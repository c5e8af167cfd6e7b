//! Locating XML files in a folder

use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use log::warn;

/// File names (not paths) of the `*.xml` files directly inside `folder`, sorted.
///
/// The extension match is case-insensitive; subfolders are not searched.
pub fn list_xml_files(folder: &Path) -> Result<Vec<String>, glob::PatternError> {
    let pattern = folder.join("*.xml");
    let pattern = escape_folder(folder, &pattern);
    let options = MatchOptions {
        case_sensitive: false,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };

    let mut files = Vec::new();
    for entry in glob::glob_with(&pattern, options)? {
        match entry {
            Ok(path) if path.is_file() => {
                if let Some(name) = path.file_name() {
                    files.push(name.to_string_lossy().into_owned());
                }
            }
            Ok(_) => {}
            Err(e) => warn!("Unreadable entry while listing {}: {}", folder.display(), e),
        }
    }
    files.sort();
    Ok(files)
}

/// Glob pattern text with any pattern characters in the folder part escaped
fn escape_folder(folder: &Path, pattern: &Path) -> String {
    let folder_text = folder.to_string_lossy();
    let pattern_text = pattern.to_string_lossy();
    match pattern_text.strip_prefix(folder_text.as_ref()) {
        Some(rest) => format!("{}{}", Pattern::escape(&folder_text), rest),
        None => pattern_text.into_owned(),
    }
}

/// Full paths for a set of file names in `folder`
pub fn in_folder(folder: &Path, names: &[String]) -> Vec<PathBuf> {
    names.iter().map(|name| folder.join(name)).collect()
}

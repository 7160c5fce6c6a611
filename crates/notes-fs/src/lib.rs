//! Path rules and note-format utilities for git-backed markdown notes
//!
//! Handles relative path validation, note extension rules, folder/name
//! derivation, front matter parsing and the favorites file format. These
//! are pure functions with no I/O - the filesystem and Git work lives in
//! `sync-core`.

mod favorites;
mod frontmatter;

pub use favorites::{format_favorites, parse_favorites, Favorites};
pub use frontmatter::{
    extract_tags, extract_title, parse_frontmatter, split_frontmatter, Frontmatter, ParsedNote,
};

/// Extensions recognized as notes when no explicit list is configured.
pub const DEFAULT_NOTE_EXTENSIONS: &[&str] = &["md", "txt"];

/// Validate that a relative path is safe (no directory traversal) and
/// normalize it to forward slashes without leading or trailing separators.
pub fn validate_relative_path(path: &str) -> Result<String, PathValidationError> {
    let unified = path.replace('\\', "/");

    if unified.starts_with("//") || has_drive_prefix(&unified) {
        return Err(PathValidationError::AbsolutePath);
    }

    let mut parts = Vec::new();
    for component in unified.split('/') {
        match component {
            "" | "." => continue,
            ".." => return Err(PathValidationError::DirectoryTraversal),
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        return Err(PathValidationError::Empty);
    }

    Ok(parts.join("/"))
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Whether any component of the relative path is hidden (`.git`, `.obsidian`, ...).
pub fn is_hidden_path(path: &str) -> bool {
    path.split('/').any(|c| c.starts_with('.') && c != "." && c != "..")
}

/// Whether the path carries one of the given note extensions (case-insensitive).
pub fn has_note_extension<S: AsRef<str>>(path: &str, extensions: &[S]) -> bool {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => extensions
            .iter()
            .any(|e| e.as_ref().eq_ignore_ascii_case(ext)),
        _ => false,
    }
}

/// Folder part of a relative path; the root folder is the empty string.
pub fn folder_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(pos) => &path[..pos],
        None => "",
    }
}

/// File name without its extension: `"journal/2024.md"` -> `"2024"`.
pub fn note_name(path: &str) -> &str {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathValidationError {
    DirectoryTraversal,
    AbsolutePath,
    Empty,
}

impl std::fmt::Display for PathValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathValidationError::DirectoryTraversal => {
                write!(f, "Path contains directory traversal")
            }
            PathValidationError::AbsolutePath => write!(f, "Path is absolute"),
            PathValidationError::Empty => write!(f, "Path is empty"),
        }
    }
}

impl std::error::Error for PathValidationError {}

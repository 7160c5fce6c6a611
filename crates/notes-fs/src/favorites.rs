//! Favorites file format.
//!
//! The favorites file is an ordinary note stored in the repository:
//! ```markdown
//! ---
//! kind: favorites
//! ---
//! ## Folders
//!
//! - /
//! - journal/2024
//!
//! ## Tags
//!
//! - work
//! ```
//!
//! Section headers are matched case-insensitively and `## Favorite Folders` /
//! `## Favorite Tags` are accepted as synonyms. Items may use `-` or `*`.
//! Any other `## ` header ends the current section. The folder value `/`
//! stands for the repository root, stored as the empty string.

use crate::frontmatter::split_frontmatter;

const ROOT_FOLDER_MARKER: &str = "/";

/// Favorite folders and tags, plus any front matter to carry through edits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Favorites {
    /// Raw YAML between the `---` delimiters, without them
    pub front_matter: Option<String>,
    /// Folder paths relative to the repository root; `""` is the root
    pub folders: Vec<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Folders,
    Tags,
}

fn section_for_header(header: &str) -> Option<Section> {
    match header.trim().to_lowercase().as_str() {
        "folders" | "favorite folders" => Some(Section::Folders),
        "tags" | "favorite tags" => Some(Section::Tags),
        _ => None,
    }
}

/// Parse a favorites file. Never fails: unrecognized lines are ignored.
pub fn parse_favorites(raw: &str) -> Favorites {
    let (front_matter, body) = split_frontmatter(raw);
    let mut favorites = Favorites {
        front_matter: front_matter.map(str::to_string),
        ..Favorites::default()
    };

    let mut section = None;
    for line in body.lines() {
        let line = line.trim();

        if let Some(header) = line.strip_prefix("## ") {
            section = section_for_header(header);
            continue;
        }

        let item = match line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
            Some(item) => item.trim(),
            None => continue,
        };
        if item.is_empty() {
            continue;
        }

        match section {
            Some(Section::Folders) => {
                let folder = if item == ROOT_FOLDER_MARKER {
                    String::new()
                } else {
                    item.to_string()
                };
                favorites.folders.push(folder);
            }
            Some(Section::Tags) => favorites.tags.push(item.to_string()),
            None => {}
        }
    }

    favorites
}

/// Serialize favorites back to the file format.
pub fn format_favorites(favorites: &Favorites) -> String {
    let mut out = String::new();

    if let Some(yaml) = &favorites.front_matter {
        out.push_str("---\n");
        out.push_str(yaml);
        if !yaml.is_empty() && !yaml.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("---\n");
    }

    out.push_str("## Folders\n\n");
    for folder in &favorites.folders {
        let value = if folder.is_empty() {
            ROOT_FOLDER_MARKER
        } else {
            folder.as_str()
        };
        out.push_str("- ");
        out.push_str(value);
        out.push('\n');
    }

    out.push_str("\n## Tags\n\n");
    for tag in &favorites.tags {
        out.push_str("- ");
        out.push_str(tag);
        out.push('\n');
    }

    out
}

//! YAML front matter parsing for markdown notes
//!
//! Parses the YAML block at the start of a note:
//! ```markdown
//! ---
//! title: My Note
//! tags: [rust, git]
//! ---
//!
//! Note content here...
//! ```

use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Parsed front matter as a map of string keys to JSON values.
pub type Frontmatter = HashMap<String, JsonValue>;

/// A parsed note with front matter separated from content.
///
/// `content` borrows from `raw`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedNote<'a> {
    /// The front matter key-value pairs, if present and valid YAML
    pub frontmatter: Option<Frontmatter>,
    /// The note content after the front matter
    pub content: &'a str,
    /// The raw file content
    pub raw: &'a str,
}

/// Split a note into the front matter YAML string and the content, without
/// parsing the YAML.
///
/// The block must open on the very first line and both delimiters must be
/// lines exactly equal to `---`. Returns `(None, raw)` otherwise.
pub fn split_frontmatter(raw: &str) -> (Option<&str>, &str) {
    let mut lines = raw.split_inclusive('\n');

    let first = match lines.next() {
        Some(line) => line,
        None => return (None, raw),
    };
    if trim_line_ending(first) != "---" || !first.ends_with('\n') {
        return (None, raw);
    }

    let yaml_start = first.len();
    let mut pos = yaml_start;
    for line in lines {
        if trim_line_ending(line) == "---" {
            let yaml = &raw[yaml_start..pos];
            let content = &raw[pos + line.len()..];
            return (Some(yaml), content);
        }
        pos += line.len();
    }

    (None, raw)
}

fn trim_line_ending(line: &str) -> &str {
    line.strip_suffix('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .unwrap_or(line)
}

/// Parse a note's raw content into front matter and content.
///
/// Invalid YAML is treated as "no front matter" rather than an error; the
/// content still starts after the closing delimiter.
pub fn parse_frontmatter(raw: &str) -> ParsedNote<'_> {
    let (yaml_str, content) = split_frontmatter(raw);

    let frontmatter = yaml_str.and_then(|yaml| {
        serde_yaml::from_str::<serde_yaml::Value>(yaml)
            .ok()
            .and_then(yaml_to_json_map)
    });

    ParsedNote {
        frontmatter,
        content,
        raw,
    }
}

/// Title of a note: the `title` front matter key, else the first `# `
/// heading of the content.
pub fn extract_title(parsed: &ParsedNote<'_>) -> Option<String> {
    if let Some(JsonValue::String(title)) = parsed.frontmatter.as_ref().and_then(|fm| fm.get("title")) {
        let title = title.trim();
        if !title.is_empty() {
            return Some(title.to_string());
        }
    }

    parsed
        .content
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("# "))
        .map(|heading| heading.trim().to_string())
        .filter(|heading| !heading.is_empty())
}

/// Tags of a note from the `tags` front matter key, either a YAML list or a
/// comma separated string. Leading `#` is dropped.
pub fn extract_tags(parsed: &ParsedNote<'_>) -> Vec<String> {
    let value = match parsed.frontmatter.as_ref().and_then(|fm| fm.get("tags")) {
        Some(v) => v,
        None => return Vec::new(),
    };

    let raw: Vec<String> = match value {
        JsonValue::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                JsonValue::String(s) => Some(s.clone()),
                JsonValue::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        JsonValue::String(s) => s.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    };

    raw.into_iter()
        .map(|t| t.trim().trim_start_matches('#').to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Top-level YAML mapping to a front matter map; `None` when empty or not a mapping.
fn yaml_to_json_map(yaml: serde_yaml::Value) -> Option<Frontmatter> {
    match yaml {
        serde_yaml::Value::Mapping(map) => {
            let result: Frontmatter = map
                .into_iter()
                .filter_map(|(k, v)| match k {
                    serde_yaml::Value::String(key) => Some((key, yaml_to_json(v))),
                    _ => None,
                })
                .collect();
            if result.is_empty() {
                None
            } else {
                Some(result)
            }
        }
        _ => None,
    }
}

fn yaml_to_json(yaml: serde_yaml::Value) -> JsonValue {
    match yaml {
        serde_yaml::Value::Null => JsonValue::Null,
        serde_yaml::Value::Bool(b) => JsonValue::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                JsonValue::Number(i.into())
            } else if let Some(f) = n.as_f64() {
                serde_json::Number::from_f64(f)
                    .map(JsonValue::Number)
                    .unwrap_or(JsonValue::Null)
            } else {
                JsonValue::Null
            }
        }
        serde_yaml::Value::String(s) => JsonValue::String(s),
        serde_yaml::Value::Sequence(seq) => JsonValue::Array(seq.into_iter().map(yaml_to_json).collect()),
        serde_yaml::Value::Mapping(map) => {
            let obj: serde_json::Map<String, JsonValue> = map
                .into_iter()
                .filter_map(|(k, v)| match k {
                    serde_yaml::Value::String(key) => Some((key, yaml_to_json(v))),
                    _ => None,
                })
                .collect();
            JsonValue::Object(obj)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_note_with_frontmatter() {
        let raw = "---\ntitle: Test\n---\n\nContent here";
        let (yaml, content) = split_frontmatter(raw);
        assert_eq!(yaml, Some("title: Test\n"));
        assert_eq!(content, "\nContent here");
    }

    #[test]
    fn split_note_with_crlf_line_endings() {
        let raw = "---\r\ntitle: Test\r\n---\r\nBody";
        let (yaml, content) = split_frontmatter(raw);
        assert_eq!(yaml, Some("title: Test\r\n"));
        assert_eq!(content, "Body");
    }

    #[test]
    fn split_requires_exact_delimiter_lines() {
        let raw = "--- \ntitle: Test\n---\nBody";
        assert_eq!(split_frontmatter(raw), (None, raw));

        let raw = "---\ntitle: Test\n----\nBody";
        assert_eq!(split_frontmatter(raw), (None, raw));
    }

    #[test]
    fn split_note_without_frontmatter() {
        let raw = "Just content, no frontmatter";
        let (yaml, content) = split_frontmatter(raw);
        assert!(yaml.is_none());
        assert_eq!(content, raw);
    }

    #[test]
    fn split_note_with_incomplete_frontmatter() {
        let raw = "---\ntitle: Test\nNo closing delimiter";
        let (yaml, content) = split_frontmatter(raw);
        assert!(yaml.is_none());
        assert_eq!(content, raw);
    }

    #[test]
    fn parse_simple_frontmatter() {
        let raw = "---\ntitle: My Note\ntags:\n  - rust\n  - git\n---\n\nNote content";
        let parsed = parse_frontmatter(raw);

        let fm = parsed.frontmatter.clone().unwrap();
        assert_eq!(fm.get("title"), Some(&JsonValue::String("My Note".to_string())));
        assert_eq!(fm.get("tags").unwrap().as_array().unwrap().len(), 2);
        assert_eq!(parsed.content, "\nNote content");
    }

    #[test]
    fn parse_empty_frontmatter() {
        let parsed = parse_frontmatter("---\n---\nContent");
        assert!(parsed.frontmatter.is_none());
        assert_eq!(parsed.content, "Content");
    }

    #[test]
    fn title_prefers_frontmatter() {
        let parsed = parse_frontmatter("---\ntitle: From Meta\n---\n# Heading\n");
        assert_eq!(extract_title(&parsed).as_deref(), Some("From Meta"));
    }

    #[test]
    fn title_falls_back_to_heading() {
        let parsed = parse_frontmatter("intro\n\n# Shopping list\n- milk\n");
        assert_eq!(extract_title(&parsed).as_deref(), Some("Shopping list"));

        let parsed = parse_frontmatter("no heading at all");
        assert_eq!(extract_title(&parsed), None);
    }

    #[test]
    fn tags_from_list_or_string() {
        let parsed = parse_frontmatter("---\ntags: [work, '#urgent']\n---\n");
        assert_eq!(extract_tags(&parsed), vec!["work", "urgent"]);

        let parsed = parse_frontmatter("---\ntags: a, b ,\n---\n");
        assert_eq!(extract_tags(&parsed), vec!["a", "b"]);

        let parsed = parse_frontmatter("plain");
        assert!(extract_tags(&parsed).is_empty());
    }
}

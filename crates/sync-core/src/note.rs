//! Notes and content hashes for optimistic locking.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One markdown file under the repository root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Path relative to the repository root, forward slashes.
    pub path: String,
    pub content: String,
    pub last_modified_millis: i64,
}

impl Note {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            last_modified_millis: 0,
        }
    }

    pub fn content_hash(&self) -> ContentHash {
        ContentHash::from_content(&self.content)
    }
}

/// A content hash representing file state at time of read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn from_content(content: &str) -> Self {
        Self::from_bytes(content.as_bytes())
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
